//! Fixtures shared by the auth tests.

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// A well-formed ed25519 authorized_keys line; distinct seeds give distinct
/// fingerprints.
pub(crate) fn sample_ssh_key(seed: u8) -> String {
    let mut blob = Vec::new();
    blob.extend_from_slice(&(11u32).to_be_bytes());
    blob.extend_from_slice(b"ssh-ed25519");
    blob.extend_from_slice(&(32u32).to_be_bytes());
    blob.extend_from_slice(&[seed; 32]);
    format!("ssh-ed25519 {} test@realmgate", STANDARD.encode(blob))
}

pub(crate) fn sample_gpg_key(seed: u8) -> String {
    format!(
        "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n{}\n=AbCd\n-----END PGP PUBLIC KEY BLOCK-----",
        STANDARD.encode([seed; 48])
    )
}
