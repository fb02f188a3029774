//! Change detection for provisioned role bindings.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use stint_policy::IamRoleBinding;

static DESCRIPTION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("#([a-f0-9]{2,8})$").expect("valid pattern"));

/// Checksum over a set of role bindings, embedded into the backing
/// group's description as a trailing `#hex` tag.
///
/// Per-binding checksums are combined with XOR, so the order of
/// bindings is insignificant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingChecksum(u32);

impl BindingChecksum {
    pub const ZERO: BindingChecksum = BindingChecksum(0);

    pub fn from_bindings<'a>(bindings: impl IntoIterator<Item = &'a IamRoleBinding>) -> Self {
        let mut checksum = 0u32;
        for binding in bindings {
            checksum ^= binding.checksum();
        }
        BindingChecksum(checksum)
    }

    /// Extract the checksum from a tagged description. A description
    /// without a tag reads as [`Self::ZERO`].
    pub fn from_tagged_description(description: &str) -> Self {
        DESCRIPTION_TAG
            .captures(description)
            .and_then(|captures| u32::from_str_radix(&captures[1], 16).ok())
            .map(BindingChecksum)
            .unwrap_or(BindingChecksum::ZERO)
    }

    /// Return the description with its trailing tag set to this
    /// checksum, appending one if absent.
    pub fn tag_description(&self, description: &str) -> String {
        if description.is_empty() {
            return format!("#{}", self);
        }
        match DESCRIPTION_TAG.captures(description) {
            Some(captures) => {
                let range = captures.get(1).expect("group 1 exists").range();
                let mut tagged = description.to_string();
                tagged.replace_range(range, &self.to_string());
                tagged
            }
            None => format!("{} #{}", description, self),
        }
    }
}

impl fmt::Display for BindingChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
