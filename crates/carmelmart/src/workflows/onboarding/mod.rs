//! Vendor onboarding: tier selection, identity and business verification,
//! payment collection, referral settlement, and registration finalization.
//!
//! The engine holds no state beyond a single invocation. Every mutation
//! goes through the [`repository::OnboardingStore`] collaborator, whose
//! conditional operations carry all the idempotency guards: the payment
//! reference, the (referrer, referred) pair, and referral-code uniqueness.

pub mod domain;
pub mod payment;
pub mod providers;
pub mod referral;
pub mod repository;
pub mod router;
pub mod service;
pub mod verification;

#[cfg(test)]
mod tests;

pub use domain::{
    BankDetails, RegistrationStatus, RegistrationView, TierTerms, VendorId, VendorRegistration,
    VendorSignup, VerificationKind, VerificationTier,
};
pub use payment::{
    new_payment_reference, signature_matches, webhook_signature, PaymentWebhookEvent,
    PAYMENT_REFERENCE_PREFIX, SIGNATURE_HEADER,
};
pub use providers::{
    CacReport, ChargeStatus, CheckoutRequest, CheckoutSession, IdentityProvider, NinReport,
    Notification, Notifier, NotifyError, PaymentGateway, ProviderError, TransactionReport,
};
pub use referral::ReferralOutcome;
pub use repository::{
    OnboardingStore, PaymentRecord, PaymentSettlement, PaymentStatus, ReferralApplication,
    ReferralRecord, ReferralStatus, RepositoryError, SettleOutcome, VerificationRecord,
    WebhookEventRecord,
};
pub use router::onboarding_router;
pub use service::{
    OnboardingConfig, OnboardingError, OnboardingService, PaymentOutcome, VerificationOutcome,
    WebhookDisposition, REFERRAL_BONUS, REFERRAL_CODE_PREFIX,
};
pub use verification::{
    CacClaims, IdentityMismatch, NinClaims, ValidationError, VerificationRunner,
};
