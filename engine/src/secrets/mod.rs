//! Credential handling
//!
//! The model credential lives in the configuration file. Inside the engine it
//! is carried as a [`SecretString`] so it never reaches a log line by
//! accident, and [`mask_secret`] produces the partially hidden form used in
//! the startup log.

pub mod string;

pub use string::SecretString;

/// Number of leading characters left visible by [`mask_secret`]
const VISIBLE_PREFIX: usize = 5;

/// Number of trailing characters left visible by [`mask_secret`]
const VISIBLE_SUFFIX: usize = 3;

/// Mask a secret for display: first 5 and last 3 characters stay visible.
///
/// Secrets too short to hide anything that way are masked completely.
///
/// ```
/// use spassit_engine::secrets::mask_secret;
///
/// assert_eq!(mask_secret("sk-abcdefghij123"), "sk-ab********123");
/// assert_eq!(mask_secret("short"), "*****");
/// ```
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= VISIBLE_PREFIX + VISIBLE_SUFFIX {
        return "*".repeat(chars.len());
    }

    let hidden = chars.len() - VISIBLE_PREFIX - VISIBLE_SUFFIX;
    let mut masked: String = chars[..VISIBLE_PREFIX].iter().collect();
    masked.push_str(&"*".repeat(hidden));
    masked.extend(&chars[chars.len() - VISIBLE_SUFFIX..]);
    masked
}
