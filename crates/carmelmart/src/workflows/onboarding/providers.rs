use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of a NIN lookup at the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NinReport {
    pub verified: bool,
    pub first_name: String,
    pub last_name: String,
    pub verification_id: String,
}

/// Outcome of a CAC lookup at the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacReport {
    pub verified: bool,
    pub company_name: String,
    pub company_status: String,
    pub verification_id: String,
}

/// External identity-verification collaborator (NIN and CAC lookups).
pub trait IdentityProvider: Send + Sync {
    fn verify_nin(&self, nin: &str) -> Result<NinReport, ProviderError>;
    fn verify_cac(&self, registration_number: &str) -> Result<CacReport, ProviderError>;
}

/// Checkout request handed to the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub reference: String,
    pub amount: u32,
    pub currency: String,
    pub customer_email: String,
    pub customer_name: String,
}

/// Hosted checkout session the UI redirects the vendor to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub reference: String,
    pub checkout_url: String,
    pub amount: u32,
    pub currency: String,
}

/// Charge result as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Successful,
    Failed,
    Cancelled,
}

/// Provider-side view of a transaction, fetched for server-side
/// verification. Client-reported outcomes are never trusted on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReport {
    pub transaction_id: String,
    pub reference: String,
    pub status: ChargeStatus,
    pub amount: u32,
    pub currency: String,
}

/// External payment collaborator: opens hosted checkout sessions and
/// answers server-side transaction lookups.
pub trait PaymentGateway: Send + Sync {
    fn initiate_checkout(&self, request: &CheckoutRequest)
        -> Result<CheckoutSession, ProviderError>;
    fn verify_transaction(&self, transaction_id: &str)
        -> Result<TransactionReport, ProviderError>;
}

/// Outbound notification payload (welcome mail, payment failure notices).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub template: String,
    pub recipient: String,
    pub details: BTreeMap<String, String>,
}

/// Fire-and-forget notification collaborator. Delivery failures are logged
/// by callers and never block workflow progress.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Upstream provider failures. Retryable from the caller's perspective: no
/// workflow state is committed before a provider call resolves.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
