//! Slack request signing.
//!
//! Implements <https://api.slack.com/authentication/verifying-requests-from-slack>:
//! the signature is `v0=` followed by the hex HMAC-SHA256 of
//! `v0:{timestamp}:{raw body}` keyed with the app's signing secret.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "v0";
pub const SIGNATURE_PREFIX: &str = "v0=";

/// Maximum clock skew, in seconds, between the sender and this process.
/// A skew of exactly this many seconds is still accepted.
pub const REPLAY_WINDOW_SECS: u64 = 300;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("request timestamp `{timestamp}` is outside the replay window")]
    StaleRequest { timestamp: String },
    #[error("request signature does not match")]
    SignatureMismatch,
}

/// Authenticity check applied to every inbound webhook.
///
/// `validate` returns `Ok(false)` for a signature mismatch and
/// `Err(AuthenticationError::StaleRequest)` when the timestamp is unusable.
pub trait RequestValidator: Send + Sync {
    fn validate(
        &self,
        timestamp: &str,
        body: &[u8],
        signature: &str,
    ) -> Result<bool, AuthenticationError>;

    fn verify(
        &self,
        timestamp: &str,
        body: &[u8],
        signature: &str,
    ) -> Result<(), AuthenticationError> {
        if self.validate(timestamp, body, signature)? {
            Ok(())
        } else {
            Err(AuthenticationError::SignatureMismatch)
        }
    }
}

#[derive(Clone, Debug)]
pub struct SignatureValidator {
    signing_secret: SecretString,
}

impl SignatureValidator {
    pub fn new(signing_secret: SecretString) -> Self {
        Self { signing_secret }
    }

    /// Same as [`RequestValidator::validate`] with an explicit `now` in epoch seconds.
    pub fn validate_at(
        &self,
        now: i64,
        timestamp: &str,
        body: &[u8],
        signature: &str,
    ) -> Result<bool, AuthenticationError> {
        check_freshness(now, timestamp)?;

        let Some(expected) = self.expected_signature(timestamp, body) else {
            return Ok(false);
        };
        Ok(constant_time_eq(expected.as_bytes(), signature.as_bytes()))
    }

    /// Signature the sender is expected to attach for `timestamp` and `body`.
    pub fn expected_signature(&self, timestamp: &str, body: &[u8]) -> Option<String> {
        let mut mac =
            HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes()).ok()?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Some(format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
    }
}

impl RequestValidator for SignatureValidator {
    fn validate(
        &self,
        timestamp: &str,
        body: &[u8],
        signature: &str,
    ) -> Result<bool, AuthenticationError> {
        self.validate_at(Utc::now().timestamp(), timestamp, body, signature)
    }
}

fn check_freshness(now: i64, timestamp: &str) -> Result<(), AuthenticationError> {
    let stale = || AuthenticationError::StaleRequest { timestamp: timestamp.to_owned() };

    let sent_at = timestamp.parse::<i64>().map_err(|_| stale())?;
    let skew = now.checked_sub(sent_at).map(i64::unsigned_abs).ok_or_else(stale)?;
    if skew > REPLAY_WINDOW_SECS {
        return Err(stale());
    }

    Ok(())
}

/// Walks every byte of `expected` no matter how long `supplied` is.
fn constant_time_eq(expected: &[u8], supplied: &[u8]) -> bool {
    let mut equal = Choice::from(u8::from(expected.len() == supplied.len()));
    for (index, byte) in expected.iter().enumerate() {
        let other = supplied.get(index).copied().unwrap_or(0);
        equal &= byte.ct_eq(&other);
    }
    equal.into()
}
