//! TOTP token handling (Google Authenticator compatible).

use realmgate_common::crypto::constant_time_eq;
use realmgate_common::{Error, Result};
use totp_rs::{Algorithm, Secret, TOTP};

const ISSUER: &str = "Realmgate";

pub const DEFAULT_PERIOD: u64 = 30;
pub const DEFAULT_DIGITS: usize = 6;
pub const MAX_PERIOD: u64 = 300;

pub fn parse_algorithm(name: Option<&str>) -> Result<(Algorithm, &'static str)> {
    match name.map(|s| s.to_ascii_lowercase()).as_deref() {
        None | Some("sha1") => Ok((Algorithm::SHA1, "sha1")),
        Some("sha256") => Ok((Algorithm::SHA256, "sha256")),
        Some("sha512") => Ok((Algorithm::SHA512, "sha512")),
        Some(other) => Err(Error::InvalidInput(format!(
            "unsupported totp algorithm: {}",
            other
        ))),
    }
}

pub fn totp_for_secret_b32(
    algorithm: Algorithm,
    digits: usize,
    period: u64,
    secret_b32: &str,
    label: &str,
) -> Result<TOTP> {
    if period == 0 || period > MAX_PERIOD {
        return Err(Error::InvalidInput(format!(
            "totp period must be between 1 and {} seconds, got {}",
            MAX_PERIOD, period
        )));
    }
    // totp-rs expects base32 secret; we store NOPAD base32.
    let secret = Secret::Encoded(secret_b32.trim().to_uppercase())
        .to_bytes()
        .map_err(|e| Error::InvalidInput(format!("invalid totp secret: {:?}", e)))?;
    TOTP::new(
        algorithm,
        digits,
        1,
        period,
        secret,
        Some(ISSUER.to_string()),
        label.to_string(),
    )
    .map_err(|e| Error::InvalidInput(format!("invalid totp parameters: {}", e)))
}

/// Accept the current code or one time-step either side for clock skew.
pub fn verify_totp_code(totp: &TOTP, code: &str) -> bool {
    let code = code.trim();
    if code.len() != totp.digits || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let now = chrono::Utc::now().timestamp();
    let step = totp.step as i64;
    for offset in [-step, 0, step] {
        let gen = totp.generate((now + offset).max(0) as u64);
        if constant_time_eq(&gen, code) {
            return true;
        }
    }
    false
}
