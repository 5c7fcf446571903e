//! Cryptographic utilities for Realmgate
//!
//! Password hashing and comparison, public key parsing and fingerprints,
//! and API key issuance.

use crate::{Error, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Pluggable comparison between a stored credential and a presented one
pub trait CredentialComparator: Send + Sync {
    /// Produce the stored form of a secret
    fn hash(&self, secret: &str) -> Result<String>;

    /// Compare a presented secret against the stored form.
    ///
    /// `stored` is `None` when the user or its credential does not exist;
    /// implementations should still spend comparable time and return false.
    fn verify(&self, stored: Option<&str>, presented: &str) -> bool;
}

/// Argon2id PHC-string hashing with default parameters
#[derive(Debug, Default, Clone)]
pub struct Argon2Comparator;

impl CredentialComparator for Argon2Comparator {
    fn hash(&self, secret: &str) -> Result<String> {
        hash_password(secret)
    }

    fn verify(&self, stored: Option<&str>, presented: &str) -> bool {
        match stored {
            Some(phc) => verify_password(phc, presented),
            None => {
                let _ = hash_password(presented);
                false
            }
        }
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;
    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string();
    Ok(phc)
}

pub fn verify_password(phc: &str, password: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut v: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes().iter()) {
        v |= x ^ y;
    }
    v == 0
}

// ============================================================================
// Public keys
// ============================================================================

const SSH_KEY_TYPES: &[&str] = &[
    "ssh-ed25519",
    "ssh-rsa",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

const GPG_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const GPG_FOOTER: &str = "-----END PGP PUBLIC KEY BLOCK-----";

/// A validated public key with its fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub key_type: String,
    pub fingerprint: String,
    /// Normalized key text
    pub payload: String,
    pub comment: Option<String>,
}

/// Parse an OpenSSH authorized_keys style line: `<type> <base64> [comment]`.
pub fn parse_ssh_public_key(text: &str) -> Result<ParsedKey> {
    let mut parts = text.split_whitespace();
    let key_type = parts
        .next()
        .ok_or_else(|| Error::InvalidInput("empty ssh public key".to_string()))?;
    if !SSH_KEY_TYPES.contains(&key_type) {
        return Err(Error::InvalidInput(format!(
            "unsupported ssh key type: {}",
            key_type
        )));
    }
    let encoded = parts
        .next()
        .ok_or_else(|| Error::InvalidInput("ssh public key has no key data".to_string()))?;
    let blob = STANDARD
        .decode(encoded)
        .map_err(|e| Error::InvalidInput(format!("ssh public key is not base64: {}", e)))?;

    // The blob starts with the length-prefixed key type; it must agree.
    let embedded = read_ssh_string(&blob)
        .ok_or_else(|| Error::InvalidInput("truncated ssh public key".to_string()))?;
    if embedded != key_type.as_bytes() {
        return Err(Error::InvalidInput(
            "ssh public key type does not match key data".to_string(),
        ));
    }

    let comment = parts.collect::<Vec<_>>().join(" ");
    let comment = if comment.is_empty() { None } else { Some(comment) };
    Ok(ParsedKey {
        key_type: key_type.to_string(),
        fingerprint: ssh_fingerprint(&blob),
        payload: format!("{} {}", key_type, encoded),
        comment,
    })
}

fn read_ssh_string(blob: &[u8]) -> Option<&[u8]> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    blob.get(4..4usize.checked_add(len)?)
}

/// OpenSSH-style `SHA256:<base64>` fingerprint
pub fn ssh_fingerprint(blob: &[u8]) -> String {
    let digest = Sha256::digest(blob);
    format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
}

/// Parse an ASCII-armored PGP public key block.
pub fn parse_gpg_public_key(text: &str) -> Result<ParsedKey> {
    let text = text.trim();
    let start = text
        .find(GPG_HEADER)
        .ok_or_else(|| Error::InvalidInput("gpg public key has no armor header".to_string()))?;
    let body_start = start + GPG_HEADER.len();
    let end = text[body_start..]
        .find(GPG_FOOTER)
        .map(|offset| body_start + offset)
        .ok_or_else(|| Error::InvalidInput("gpg public key has no armor footer".to_string()))?;

    let mut comment = None;
    let mut body = String::new();
    for line in text[body_start..end].lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('=') {
            continue;
        }
        if let Some((name, value)) = line.split_once(": ") {
            if name.eq_ignore_ascii_case("comment") {
                comment = Some(value.to_string());
            }
            continue;
        }
        body.push_str(line);
    }
    if body.is_empty() {
        return Err(Error::InvalidInput("gpg public key has no key data".to_string()));
    }
    let packets = STANDARD
        .decode(&body)
        .map_err(|e| Error::InvalidInput(format!("gpg public key is not base64: {}", e)))?;

    let fingerprint = hex::encode_upper(Sha256::digest(&packets))[..40].to_string();
    Ok(ParsedKey {
        key_type: "pgp".to_string(),
        fingerprint,
        payload: text[start..end + GPG_FOOTER.len()].to_string(),
        comment,
    })
}

// ============================================================================
// API keys
// ============================================================================

pub const API_KEY_PREFIX: &str = "rgk_";

/// Generate a fresh API key, returning `(secret, display_prefix)`.
pub fn generate_api_key() -> (String, String) {
    let mut raw = [0u8; 32];
    OsRng.fill_bytes(&mut raw);
    let secret = format!("{}{}", API_KEY_PREFIX, URL_SAFE_NO_PAD.encode(raw));
    let prefix = secret[..API_KEY_PREFIX.len() + 6].to_string();
    (secret, prefix)
}

pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ssh_key(seed: u8) -> String {
        let mut blob = Vec::new();
        blob.extend_from_slice(&(11u32).to_be_bytes());
        blob.extend_from_slice(b"ssh-ed25519");
        blob.extend_from_slice(&(32u32).to_be_bytes());
        blob.extend_from_slice(&[seed; 32]);
        format!("ssh-ed25519 {} user@host", STANDARD.encode(blob))
    }

    #[test]
    fn test_password_hash_verify() {
        let comparator = Argon2Comparator;
        let phc = comparator.hash("correct horse").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(comparator.verify(Some(&phc), "correct horse"));
        assert!(!comparator.verify(Some(&phc), "wrong horse"));
        assert!(!comparator.verify(None, "correct horse"));
        assert!(!comparator.verify(Some("not-a-phc"), "correct horse"));
    }

    #[test]
    fn test_parse_ssh_key() {
        let key = parse_ssh_public_key(&sample_ssh_key(7)).unwrap();
        assert_eq!(key.key_type, "ssh-ed25519");
        assert!(key.fingerprint.starts_with("SHA256:"));
        assert_eq!(key.comment.as_deref(), Some("user@host"));

        let other = parse_ssh_public_key(&sample_ssh_key(8)).unwrap();
        assert_ne!(key.fingerprint, other.fingerprint);
    }

    #[test]
    fn test_parse_ssh_key_rejects_garbage() {
        assert!(parse_ssh_public_key("").is_err());
        assert!(parse_ssh_public_key("ssh-dss AAAA").is_err());
        assert!(parse_ssh_public_key("ssh-ed25519 !!!notbase64").is_err());
        // valid base64 but the embedded type disagrees
        let lying = sample_ssh_key(1).replacen("ssh-ed25519", "ssh-rsa", 1);
        assert!(parse_ssh_public_key(&lying).is_err());
    }

    #[test]
    fn test_parse_gpg_key() {
        let armored = format!(
            "{}\nComment: alice key\n\n{}\n=abcd\n{}\n",
            GPG_HEADER,
            STANDARD.encode(b"pretend these are openpgp packets"),
            GPG_FOOTER
        );
        let key = parse_gpg_public_key(&armored).unwrap();
        assert_eq!(key.key_type, "pgp");
        assert_eq!(key.fingerprint.len(), 40);
        assert_eq!(key.comment.as_deref(), Some("alice key"));
        assert!(parse_gpg_public_key("not armored").is_err());
    }

    #[test]
    fn test_parse_gpg_key_overlapping_armor() {
        // footer dashes overlap the header's trailing dashes
        let fused = "-----BEGIN PGP PUBLIC KEY BLOCK-----END PGP PUBLIC KEY BLOCK-----";
        assert!(matches!(
            parse_gpg_public_key(fused),
            Err(Error::InvalidInput(_))
        ));
        let footer_first = format!("{}\n{}", GPG_FOOTER, GPG_HEADER);
        assert!(matches!(
            parse_gpg_public_key(&footer_first),
            Err(Error::InvalidInput(_))
        ));
        let empty = format!("{}\n{}", GPG_HEADER, GPG_FOOTER);
        assert!(matches!(
            parse_gpg_public_key(&empty),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_api_key_generation() {
        let (secret, prefix) = generate_api_key();
        assert!(secret.starts_with(API_KEY_PREFIX));
        assert!(secret.starts_with(&prefix));
        let (other, _) = generate_api_key();
        assert_ne!(secret, other);
        assert_eq!(hash_api_key(&secret), hash_api_key(&secret));
        assert_ne!(hash_api_key(&secret), hash_api_key(&other));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("123456", "123456"));
        assert!(!constant_time_eq("123456", "123457"));
        assert!(!constant_time_eq("123", "123456"));
    }
}
