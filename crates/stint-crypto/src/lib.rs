//! Ed25519-based implementation of the stint token-signer contract.
//!
//! Tokens are `base64url(payload).base64url(signature)` with the expiry
//! stamped into the payload as an `exp` claim. Verification checks the
//! signature first and the expiry second; both failures surface as
//! [`TokenError::Verification`], never as an access-control decision.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use stint_directory::{SignedToken, TokenError, TokenSigner};

/// Claim carrying the token's expiry (seconds since the epoch).
const EXPIRY_CLAIM: &str = "exp";

/// Signs and verifies deferral tokens with an Ed25519 key pair.
pub struct Ed25519TokenSigner {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    validity: Duration,
}

impl Ed25519TokenSigner {
    pub fn new(signing_key: SigningKey, validity: Duration) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            validity,
        }
    }

    /// Generate a fresh key pair.
    pub fn generate(validity: Duration) -> Self {
        Self::new(SigningKey::generate(&mut rand::rngs::OsRng), validity)
    }

    pub fn from_key_bytes(bytes: &[u8; 32], validity: Duration) -> Self {
        Self::new(SigningKey::from_bytes(bytes), validity)
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }
}

#[async_trait::async_trait]
impl TokenSigner for Ed25519TokenSigner {
    async fn sign(&self, payload: &serde_json::Value) -> Result<SignedToken, TokenError> {
        let mut claims = match payload {
            serde_json::Value::Object(map) => map.clone(),
            _ => {
                return Err(TokenError::Signing(
                    "payload must be a JSON object".to_string(),
                ))
            }
        };

        let expiry = Utc::now() + self.validity;
        claims.insert(
            EXPIRY_CLAIM.to_string(),
            serde_json::Value::from(expiry.timestamp()),
        );

        let body = serde_json::to_vec(&claims)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        let signature = self.signing_key.sign(&body);

        let token = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );
        Ok(SignedToken { token, expiry })
    }

    async fn verify(&self, token: &str) -> Result<serde_json::Value, TokenError> {
        let (body_b64, signature_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signature_bytes = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| TokenError::Malformed)?;

        self.verifying_key
            .verify(&body, &signature)
            .map_err(|_| TokenError::Verification)?;

        let payload: serde_json::Value =
            serde_json::from_slice(&body).map_err(|_| TokenError::Malformed)?;

        let expiry = payload
            .get(EXPIRY_CLAIM)
            .and_then(serde_json::Value::as_i64)
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .ok_or(TokenError::Malformed)?;
        if expiry <= Utc::now() {
            return Err(TokenError::Verification);
        }

        Ok(payload)
    }
}
