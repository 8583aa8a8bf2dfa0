//! Signed-message verification with replay tolerance.
//!
//! Pairing messages and RPC envelopes are both checked here. A message is
//! accepted only if its timestamp is within `tolerance` of the local clock
//! *and* its Ed25519 signature verifies against the claimed public key. The
//! timestamp is checked first, so a stale message is rejected regardless of
//! its signature.

use crate::signatures::{Signature, VerifyingKey};
use std::time::Duration;

/// Separator used to build canonical signed strings.
pub const FIELD_SEPARATOR: char = '|';

/// Outcome of [`verify_signed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Timestamp fresh and signature valid.
    Valid,
    /// Timestamp outside the tolerance window.
    Stale {
        /// Absolute clock skew in milliseconds.
        skew_ms: u64,
    },
    /// Signature missing, malformed or not matching the message.
    BadSignature,
    /// Public key is not valid base64 or not a valid Ed25519 point.
    MalformedKey,
}

impl Verification {
    /// Whether the message should be accepted.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Short reason string for logs and failure events.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Stale { .. } => "timestamp outside tolerance",
            Self::BadSignature => "invalid signature",
            Self::MalformedKey => "malformed public key",
        }
    }
}

/// Join fields with `|` in the given order.
///
/// ```
/// use tether_crypto::verify::canonical;
/// assert_eq!(canonical(&["a", "b", "42"]), "a|b|42");
/// ```
#[must_use]
pub fn canonical(fields: &[&str]) -> String {
    let mut out = String::with_capacity(fields.iter().map(|f| f.len() + 1).sum());
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(FIELD_SEPARATOR);
        }
        out.push_str(field);
    }
    out
}

/// Verify a signed message.
///
/// `public_key` and `signature` are the standard-base64 forms carried on the
/// wire. Timestamps are milliseconds since the Unix epoch.
#[must_use]
pub fn verify_signed(
    message: &[u8],
    public_key: &str,
    signature: &str,
    timestamp_ms: i64,
    now_ms: i64,
    tolerance: Duration,
) -> Verification {
    let skew_ms = now_ms.abs_diff(timestamp_ms);
    if u128::from(skew_ms) > tolerance.as_millis() {
        return Verification::Stale { skew_ms };
    }

    let Ok(key) = VerifyingKey::from_base64(public_key) else {
        return Verification::MalformedKey;
    };
    let Ok(signature) = Signature::from_base64(signature) else {
        return Verification::BadSignature;
    };

    match key.verify(message, &signature) {
        Ok(()) => Verification::Valid,
        Err(_) => Verification::BadSignature,
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
