//! Password hashing for `userPassword` values.

use base64::{engine::general_purpose::STANDARD, Engine};
use sha1::{Digest, Sha1};
use std::str::FromStr;

use crate::Result;
use mailadmin_core::Error;

const SALT_LEN: usize = 8;
const SHA1_LEN: usize = 20;
const SSHA_PREFIX: &str = "{SSHA}";

/// Supported password storage schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordScheme {
    /// Salted SHA-1, stored as `{SSHA}base64(digest || salt)`.
    #[default]
    Ssha,
    /// Stored as given.
    Plain,
}

impl FromStr for PasswordScheme {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SSHA" => Ok(Self::Ssha),
            "PLAIN" | "CLEARTEXT" => Ok(Self::Plain),
            other => Err(Error::Validation(format!(
                "unsupported password scheme `{other}`"
            ))),
        }
    }
}

/// Hashes `password` with the given scheme.
///
/// `Ssha` draws a fresh 8-byte salt on every call, so two hashes of the same password differ.
#[must_use]
pub fn generate_password(password: &str, scheme: PasswordScheme) -> String {
    match scheme {
        PasswordScheme::Ssha => {
            let salt: [u8; SALT_LEN] = rand::random();
            ssha(password, &salt)
        }
        PasswordScheme::Plain => password.to_string(),
    }
}

/// Checks `password` against a stored value.
///
/// Values without a `{SCHEME}` prefix are compared as plain text.
///
/// # Errors
///
/// Returns [`Error::Validation`] for an unknown scheme prefix or a malformed `{SSHA}` value.
pub fn verify_password(password: &str, hashed: &str) -> Result<bool> {
    let Some(rest) = hashed.strip_prefix('{') else {
        return Ok(password == hashed);
    };
    let (scheme, encoded) = rest
        .split_once('}')
        .ok_or_else(|| Error::Validation("unterminated password scheme prefix".to_string()))?;

    match scheme.parse::<PasswordScheme>()? {
        PasswordScheme::Ssha => {
            let decoded = STANDARD
                .decode(encoded)
                .map_err(|e| Error::Validation(format!("invalid SSHA value: {e}")))?;
            if decoded.len() <= SHA1_LEN {
                return Err(Error::Validation("SSHA value is too short".to_string()));
            }
            let (digest, salt) = decoded.split_at(SHA1_LEN);
            Ok(salted_sha1(password, salt).as_slice() == digest)
        }
        PasswordScheme::Plain => Ok(password == encoded),
    }
}

fn ssha(password: &str, salt: &[u8]) -> String {
    let mut payload = salted_sha1(password, salt).to_vec();
    payload.extend_from_slice(salt);
    format!("{SSHA_PREFIX}{}", STANDARD.encode(payload))
}

fn salted_sha1(password: &str, salt: &[u8]) -> [u8; SHA1_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    let mut digest = [0u8; SHA1_LEN];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssha_layout() {
        let hashed = generate_password("secret", PasswordScheme::Ssha);
        let encoded = hashed.strip_prefix(SSHA_PREFIX).unwrap();
        assert_eq!(STANDARD.decode(encoded).unwrap().len(), SHA1_LEN + SALT_LEN);
    }

    #[test]
    fn ssha_known_salt() {
        let hashed = ssha("secret", b"12345678");
        assert!(verify_password("secret", &hashed).unwrap());
        assert!(!verify_password("Secret", &hashed).unwrap());
    }

    #[test]
    fn salts_differ() {
        let first = generate_password("secret", PasswordScheme::Ssha);
        let second = generate_password("secret", PasswordScheme::Ssha);
        assert_ne!(first, second);
        assert!(verify_password("secret", &first).unwrap());
        assert!(verify_password("secret", &second).unwrap());
    }

    #[test]
    fn plain_passes_through() {
        assert_eq!(generate_password("secret", PasswordScheme::Plain), "secret");
        assert!(verify_password("secret", "secret").unwrap());
        assert!(verify_password("secret", "{PLAIN}secret").unwrap());
    }

    #[test]
    fn scheme_names() {
        assert_eq!("ssha".parse::<PasswordScheme>().unwrap(), PasswordScheme::Ssha);
        assert_eq!("CLEARTEXT".parse::<PasswordScheme>().unwrap(), PasswordScheme::Plain);
        assert!(matches!(
            "MD5".parse::<PasswordScheme>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(verify_password("secret", "{SSHA}!!!").is_err());
        assert!(verify_password("secret", "{SSHA}c2hvcnQ=").is_err());
        assert!(verify_password("secret", "{CRYPT}abc").is_err());
        assert!(verify_password("secret", "{SSHA").is_err());
    }
}
