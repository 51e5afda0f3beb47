use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid address: {0}")]
pub struct AddressError(String);

/// A dot-segmented ILP address such as `example.eur-ledger.bob`.
///
/// Addresses are opaque apart from prefix matching: one address is a prefix
/// of another when it is a leading-segment match on a `.` boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: &str) -> Result<Self, AddressError> {
        if address.is_empty() {
            return Err(AddressError("empty".to_string()));
        }
        let valid = address
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'.' || c == b'_' || c == b'~' || c == b'-');
        if !valid {
            return Err(AddressError(address.to_string()));
        }
        Ok(Address(address.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segment-aware prefix test. A prefix that ends with `.` matches as a
    /// plain leading-string match; otherwise the match must end exactly at
    /// a segment boundary.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        if !self.0.starts_with(prefix) {
            return false;
        }
        if self.0.len() == prefix.len() || prefix.ends_with('.') {
            return true;
        }
        self.0.as_bytes()[prefix.len()] == b'.'
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::new(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}
