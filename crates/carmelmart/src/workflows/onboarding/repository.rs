use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{VendorId, VendorRegistration, VerificationKind};

/// Immutable proof of a successful identity-provider check. Written once
/// per verified step and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub kind: VerificationKind,
    pub subject_name: String,
    pub subject_number: String,
    pub provider_verification_id: String,
    pub verified_at: DateTime<Utc>,
}

/// Payment ledger entry, keyed by the client-generated reference that
/// doubles as the idempotency key for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub reference: String,
    pub vendor_id: VendorId,
    pub amount: u32,
    pub currency: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

/// Terminal update applied to a pending payment at most once.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub provider_reference: Option<String>,
    pub settled_at: DateTime<Utc>,
}

/// Result of the conditional settle operation.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// This call moved the payment to its terminal state.
    Applied(PaymentRecord),
    /// The payment was already terminal; the stored record is returned
    /// untouched so callers can report the original outcome.
    AlreadySettled(PaymentRecord),
}

/// Bonus ledger entry, unique per (referrer, referred) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub referrer_id: VendorId,
    pub referred_id: VendorId,
    pub bonus_amount: u32,
    pub status: ReferralStatus,
    pub credited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Completed,
}

/// Result of the conditional referral insert.
#[derive(Debug, Clone)]
pub enum ReferralApplication {
    /// The record was created and the referrer balance credited.
    Credited(ReferralRecord),
    /// A record for this (referrer, referred) pair already existed.
    AlreadyCredited(ReferralRecord),
}

/// Durable copy of an authenticated provider webhook delivery, persisted
/// before any downstream processing so deliveries can be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub reference: String,
    pub transaction_id: String,
    pub event_type: String,
    pub status: String,
    pub amount: u32,
    pub received_at: DateTime<Utc>,
}

/// Storage abstraction for the onboarding workflow. The workflow holds no
/// state of its own; the conditional semantics documented per method are
/// the only concurrency guards it relies on, so implementations must apply
/// them atomically (conditional update or unique constraint, not
/// read-then-write).
pub trait OnboardingStore: Send + Sync {
    /// Create a registration; `Conflict` when the vendor id is taken.
    fn insert_registration(
        &self,
        registration: VendorRegistration,
    ) -> Result<VendorRegistration, RepositoryError>;

    fn fetch_registration(
        &self,
        id: &VendorId,
    ) -> Result<Option<VendorRegistration>, RepositoryError>;

    fn update_registration(&self, registration: VendorRegistration)
        -> Result<(), RepositoryError>;

    fn find_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<VendorRegistration>, RepositoryError>;

    /// Persist the verification proof and flip the matching flag on the
    /// registration in one unit.
    fn record_verification(
        &self,
        id: &VendorId,
        record: VerificationRecord,
    ) -> Result<VendorRegistration, RepositoryError>;

    /// Create a pending payment; `Conflict` when the reference is taken.
    fn insert_payment(&self, payment: PaymentRecord) -> Result<PaymentRecord, RepositoryError>;

    fn fetch_payment(&self, reference: &str) -> Result<Option<PaymentRecord>, RepositoryError>;

    /// Apply a terminal settlement if and only if the payment is still
    /// pending. Must be check-and-set at the storage layer; concurrent
    /// callers get `AlreadySettled` with the record the winner wrote.
    fn settle_payment(
        &self,
        reference: &str,
        settlement: PaymentSettlement,
    ) -> Result<SettleOutcome, RepositoryError>;

    /// Insert the referral record and credit the referrer's balance as one
    /// committed unit, guarded by uniqueness on (referrer, referred).
    fn record_referral(
        &self,
        record: ReferralRecord,
    ) -> Result<ReferralApplication, RepositoryError>;

    /// Move the registration to `Active` with its freshly minted referral
    /// code and completion timestamp. A registration that is already
    /// active is returned unchanged.
    fn activate_registration(
        &self,
        id: &VendorId,
        referral_code: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<VendorRegistration, RepositoryError>;

    fn record_webhook_event(&self, event: WebhookEventRecord) -> Result<(), RepositoryError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
