//! Payment reference generation, webhook authentication, and event
//! decoding for the onboarding fee flow.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::verification::ValidationError;

/// Fixed prefix carried by every checkout reference this engine mints.
pub const PAYMENT_REFERENCE_PREFIX: &str = "CMPAY";

/// Header carrying the provider signature on webhook deliveries.
pub const SIGNATURE_HEADER: &str = "x-carmel-signature";

const REFERENCE_SUFFIX_LEN: usize = 6;
const UPPER_ALNUM: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub(crate) fn random_upper_alnum(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| UPPER_ALNUM[rng.gen_range(0..UPPER_ALNUM.len())] as char)
        .collect()
}

/// Mint an idempotency reference: fixed prefix, millisecond timestamp, and
/// a random alphanumeric suffix. Collisions are statistically negligible
/// and are not checked against storage; the pending-payment insert still
/// carries a uniqueness guard as a backstop.
pub fn new_payment_reference(timestamp_millis: i64) -> String {
    let suffix = random_upper_alnum(REFERENCE_SUFFIX_LEN);
    format!("{PAYMENT_REFERENCE_PREFIX}-{timestamp_millis}-{suffix}")
}

/// Hex-encoded SHA-256 over the shared secret followed by the raw payload.
pub fn webhook_signature(secret: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Compare a presented signature against the expected one without
/// short-circuiting on the first differing byte.
pub fn signature_matches(secret: &str, payload: &[u8], presented: &str) -> bool {
    let expected = webhook_signature(secret, payload);
    if expected.len() != presented.len() {
        return false;
    }
    expected
        .bytes()
        .zip(presented.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Payment event as delivered by the provider webhook. The reported status
/// is recorded for audit but reconciliation always re-verifies the
/// transaction server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhookEvent {
    pub event_type: String,
    pub reference: String,
    pub transaction_id: String,
    pub amount: u32,
    pub status: String,
}

impl PaymentWebhookEvent {
    pub fn decode(payload: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(payload).map_err(|err| ValidationError::MalformedEvent {
            detail: err.to_string(),
        })
    }
}
