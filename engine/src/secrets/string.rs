use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Credential text that never shows up in `Debug` or `Display` output.
///
/// Serde reads and writes the plain value so the configuration file keeps
/// the key; everything else has to go through [`expose`](Self::expose).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The credential itself, for the request header
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when nothing but whitespace was configured
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Partially hidden form for log lines
    pub fn masked(&self) -> String {
        super::mask_secret(&self.0)
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
