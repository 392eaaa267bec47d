use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    RegistrationStatus, RegistrationView, TierTerms, VendorId, VendorRegistration, VendorSignup,
    VerificationKind, VerificationTier,
};
use super::payment::{
    new_payment_reference, random_upper_alnum, signature_matches, PaymentWebhookEvent,
};
use super::providers::{
    ChargeStatus, CheckoutRequest, CheckoutSession, IdentityProvider, Notification, Notifier,
    PaymentGateway, ProviderError, TransactionReport,
};
use super::referral::{self, ReferralOutcome};
use super::repository::{
    OnboardingStore, PaymentRecord, PaymentSettlement, PaymentStatus, RepositoryError,
    SettleOutcome, VerificationRecord, WebhookEventRecord,
};
use super::verification::{
    CacClaims, IdentityMismatch, NinClaims, ValidationError, VerificationFailure,
    VerificationRunner,
};

/// Fixed bonus credited to a referrer per completed signup, in minor
/// currency units.
pub const REFERRAL_BONUS: u32 = 500;

/// Prefix of every vendor referral code.
pub const REFERRAL_CODE_PREFIX: &str = "VND";

const REFERRAL_CODE_LEN: usize = 8;
const DEFAULT_CODE_ATTEMPTS: usize = 8;

fn new_referral_code() -> String {
    format!(
        "{REFERRAL_CODE_PREFIX}{}",
        random_upper_alnum(REFERRAL_CODE_LEN)
    )
}

/// Tunables for the onboarding workflow.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    pub currency: String,
    pub referral_bonus: u32,
    pub webhook_secret: String,
    pub max_referral_code_attempts: usize,
}

impl OnboardingConfig {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            currency: "NGN".to_string(),
            referral_bonus: REFERRAL_BONUS,
            webhook_secret: webhook_secret.into(),
            max_referral_code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }
}

/// Workflow-level failures surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    IdentityMismatch(#[from] IdentityMismatch),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("webhook signature did not match the shared secret")]
    BadSignature,
    #[error(
        "charge of {charged_amount} {charged_currency} does not cover the required \
         {required_amount} {required_currency}"
    )]
    AmountMismatch {
        required_amount: u32,
        required_currency: String,
        charged_amount: u32,
        charged_currency: String,
    },
    #[error("a verification tier must be selected first")]
    TierNotSelected,
    #[error("{missing} verification must be completed before payment")]
    VerificationIncomplete { missing: VerificationKind },
    #[error("{step} verification is not part of the {tier} tier")]
    StepNotInTier {
        step: VerificationKind,
        tier: VerificationTier,
    },
    #[error("the verification tier cannot change once verification has started")]
    TierLocked,
    #[error("registration is already active")]
    AlreadyActive,
    #[error("payment has not been confirmed for this registration")]
    PaymentNotConfirmed,
    #[error("no unique referral code found after {attempts} attempts")]
    ReferralCodeExhausted { attempts: usize },
}

impl From<VerificationFailure> for OnboardingError {
    fn from(failure: VerificationFailure) -> Self {
        match failure {
            VerificationFailure::Validation(err) => Self::Validation(err),
            VerificationFailure::Mismatch(err) => Self::IdentityMismatch(err),
            VerificationFailure::Provider(err) => Self::Provider(err),
        }
    }
}

/// Outcome of a verification submission.
#[derive(Debug, Clone)]
pub enum VerificationOutcome {
    /// The provider confirmed the claims and the proof was persisted.
    Verified {
        registration: VendorRegistration,
        record: VerificationRecord,
    },
    /// The step had already succeeded; nothing was re-run.
    AlreadyVerified { registration: VendorRegistration },
}

impl VerificationOutcome {
    pub fn registration(&self) -> &VendorRegistration {
        match self {
            VerificationOutcome::Verified { registration, .. } => registration,
            VerificationOutcome::AlreadyVerified { registration } => registration,
        }
    }

    pub fn already_verified(&self) -> bool {
        matches!(self, VerificationOutcome::AlreadyVerified { .. })
    }
}

/// Outcome of reconciling one payment event.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// The charge was verified and the registration moved forward.
    Completed {
        payment: PaymentRecord,
        registration: VendorRegistration,
        referral: Option<ReferralOutcome>,
    },
    /// The reference was already terminal; stored state returned unchanged.
    AlreadySettled {
        payment: PaymentRecord,
        registration: VendorRegistration,
    },
    /// The provider reported the charge failed or was cancelled.
    Declined {
        payment: PaymentRecord,
        registration: VendorRegistration,
    },
}

/// How a webhook delivery was handled after its durable write.
#[derive(Debug)]
pub enum WebhookDisposition {
    Processed(PaymentOutcome),
    /// The event is recorded but reconciliation failed; the delivery is
    /// safe to replay.
    Deferred { reference: String, detail: String },
}

/// Facade composing the verification runner, payment orchestration,
/// referral settlement, and registration finalization. Stateless per
/// invocation: every mutation goes through the store collaborator.
pub struct OnboardingService<S, I, G, N> {
    store: Arc<S>,
    runner: VerificationRunner<I>,
    gateway: Arc<G>,
    notifier: Arc<N>,
    config: OnboardingConfig,
}

impl<S, I, G, N> OnboardingService<S, I, G, N>
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        identity: Arc<I>,
        gateway: Arc<G>,
        notifier: Arc<N>,
        config: OnboardingConfig,
    ) -> Self {
        Self {
            store,
            runner: VerificationRunner::new(identity),
            gateway,
            notifier,
            config,
        }
    }

    /// Open a pending registration for a user who picked the vendor role.
    pub fn register(&self, signup: VendorSignup) -> Result<VendorRegistration, OnboardingError> {
        let registration = VendorRegistration::new(signup, Utc::now());
        let stored = self.store.insert_registration(registration)?;
        info!(vendor = %stored.vendor_id, "vendor registration opened");
        Ok(stored)
    }

    /// Record the vendor's tier choice and return the implied fee terms.
    /// The choice is free to change until a verification step completes.
    pub fn select_tier(
        &self,
        vendor_id: &VendorId,
        tier: VerificationTier,
    ) -> Result<TierTerms, OnboardingError> {
        let mut registration = self.fetch(vendor_id)?;
        if registration.status == RegistrationStatus::Active {
            return Err(OnboardingError::AlreadyActive);
        }
        if let Some(current) = registration.tier {
            if current != tier && registration.verification_started() {
                return Err(OnboardingError::TierLocked);
            }
        }
        if registration.tier != Some(tier) {
            registration.tier = Some(tier);
            self.store.update_registration(registration)?;
        }
        Ok(TierTerms::for_tier(tier))
    }

    pub fn submit_nin_verification(
        &self,
        vendor_id: &VendorId,
        claims: NinClaims,
    ) -> Result<VerificationOutcome, OnboardingError> {
        let registration = self.fetch(vendor_id)?;
        registration.tier.ok_or(OnboardingError::TierNotSelected)?;
        if registration.nin_verified {
            return Ok(VerificationOutcome::AlreadyVerified { registration });
        }
        let record = self.runner.run_nin(&claims, Utc::now())?;
        let registration = self.store.record_verification(vendor_id, record.clone())?;
        info!(vendor = %registration.vendor_id, "NIN verification confirmed");
        Ok(VerificationOutcome::Verified {
            registration,
            record,
        })
    }

    pub fn submit_cac_verification(
        &self,
        vendor_id: &VendorId,
        claims: CacClaims,
    ) -> Result<VerificationOutcome, OnboardingError> {
        let registration = self.fetch(vendor_id)?;
        let tier = registration.tier.ok_or(OnboardingError::TierNotSelected)?;
        if !tier.requires(VerificationKind::Cac) {
            return Err(OnboardingError::StepNotInTier {
                step: VerificationKind::Cac,
                tier,
            });
        }
        if registration.cac_verified {
            return Ok(VerificationOutcome::AlreadyVerified { registration });
        }
        let record = self.runner.run_cac(&claims, Utc::now())?;
        let registration = self.store.record_verification(vendor_id, record.clone())?;
        info!(vendor = %registration.vendor_id, "CAC verification confirmed");
        Ok(VerificationOutcome::Verified {
            registration,
            record,
        })
    }

    /// Open a checkout session once every required verification step is
    /// done. A registration that failed a previous payment re-enters the
    /// pending state here.
    pub fn initiate_payment(
        &self,
        vendor_id: &VendorId,
    ) -> Result<CheckoutSession, OnboardingError> {
        let mut registration = self.fetch(vendor_id)?;
        if registration.status == RegistrationStatus::Active {
            return Err(OnboardingError::AlreadyActive);
        }
        let tier = registration.tier.ok_or(OnboardingError::TierNotSelected)?;
        if let Some(missing) = registration.missing_step() {
            return Err(OnboardingError::VerificationIncomplete { missing });
        }

        let now = Utc::now();
        let reference = new_payment_reference(now.timestamp_millis());
        let payment = self.store.insert_payment(PaymentRecord {
            reference: reference.clone(),
            vendor_id: registration.vendor_id.clone(),
            amount: tier.fee(),
            currency: self.config.currency.clone(),
            status: PaymentStatus::Pending,
            transaction_id: None,
            provider_reference: None,
            created_at: now,
            settled_at: None,
        })?;

        if registration.status == RegistrationStatus::PaymentFailed {
            registration.status = RegistrationStatus::Pending;
            self.store.update_registration(registration.clone())?;
        }

        let session = self.gateway.initiate_checkout(&CheckoutRequest {
            reference: payment.reference.clone(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            customer_email: registration.email.clone(),
            customer_name: registration.business_name.clone(),
        })?;
        info!(
            vendor = %registration.vendor_id,
            reference = %payment.reference,
            amount = payment.amount,
            "checkout session opened"
        );
        Ok(session)
    }

    /// Client-side reconciliation trigger fired right after checkout. The
    /// claimed outcome is never trusted: the transaction is re-verified
    /// against the gateway before any state moves.
    pub fn handle_payment_callback(
        &self,
        reference: &str,
        transaction_id: &str,
    ) -> Result<PaymentOutcome, OnboardingError> {
        self.reconcile(reference, transaction_id)
    }

    /// Provider webhook trigger. The signature is checked before anything
    /// is read or written, and the event is recorded durably before
    /// reconciliation so a failed follow-up never loses the delivery.
    pub fn handle_webhook_event(
        &self,
        signature: &str,
        payload: &[u8],
    ) -> Result<WebhookDisposition, OnboardingError> {
        if !signature_matches(&self.config.webhook_secret, payload, signature) {
            warn!("webhook rejected: signature did not match the shared secret");
            return Err(OnboardingError::BadSignature);
        }
        let event = PaymentWebhookEvent::decode(payload)?;
        self.store.record_webhook_event(WebhookEventRecord {
            reference: event.reference.clone(),
            transaction_id: event.transaction_id.clone(),
            event_type: event.event_type.clone(),
            status: event.status.clone(),
            amount: event.amount,
            received_at: Utc::now(),
        })?;
        match self.reconcile(&event.reference, &event.transaction_id) {
            Ok(outcome) => Ok(WebhookDisposition::Processed(outcome)),
            Err(err) => {
                warn!(
                    reference = %event.reference,
                    error = %err,
                    "webhook recorded but reconciliation deferred"
                );
                Ok(WebhookDisposition::Deferred {
                    reference: event.reference,
                    detail: err.to_string(),
                })
            }
        }
    }

    /// Current externally visible state, so callers can always resume from
    /// the last completed step.
    pub fn registration_view(
        &self,
        vendor_id: &VendorId,
    ) -> Result<RegistrationView, OnboardingError> {
        Ok(self.fetch(vendor_id)?.status_view())
    }

    fn fetch(&self, vendor_id: &VendorId) -> Result<VendorRegistration, OnboardingError> {
        Ok(self
            .store
            .fetch_registration(vendor_id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    fn reconcile(
        &self,
        reference: &str,
        transaction_id: &str,
    ) -> Result<PaymentOutcome, OnboardingError> {
        let payment = self
            .store
            .fetch_payment(reference)?
            .ok_or(RepositoryError::NotFound)?;
        let registration = self.fetch(&payment.vendor_id)?;

        if payment.status.is_terminal() {
            // Duplicate delivery. A successful payment whose follow-on never
            // completed is repaired here; both follow-on steps are
            // idempotent, so a replay cannot double-apply them.
            let registration = if payment.status == PaymentStatus::Success
                && registration.status != RegistrationStatus::Active
            {
                self.follow_on(registration).0
            } else {
                registration
            };
            return Ok(PaymentOutcome::AlreadySettled {
                payment,
                registration,
            });
        }

        let report = self.gateway.verify_transaction(transaction_id)?;
        if report.reference != payment.reference {
            return Err(ValidationError::TransactionReferenceMismatch {
                transaction_id: report.transaction_id,
                reference: payment.reference,
            }
            .into());
        }

        match report.status {
            ChargeStatus::Successful => {
                if report.currency != payment.currency || report.amount < payment.amount {
                    self.mark_payment_failed(&payment, &report)?;
                    return Err(OnboardingError::AmountMismatch {
                        required_amount: payment.amount,
                        required_currency: payment.currency,
                        charged_amount: report.amount,
                        charged_currency: report.currency,
                    });
                }
                let settlement = PaymentSettlement {
                    status: PaymentStatus::Success,
                    transaction_id: Some(report.transaction_id.clone()),
                    provider_reference: Some(report.reference.clone()),
                    settled_at: Utc::now(),
                };
                match self.store.settle_payment(reference, settlement)? {
                    SettleOutcome::Applied(payment) => {
                        info!(
                            vendor = %registration.vendor_id,
                            reference = %payment.reference,
                            "payment confirmed"
                        );
                        let (registration, referral) = self.follow_on(registration);
                        Ok(PaymentOutcome::Completed {
                            payment,
                            registration,
                            referral,
                        })
                    }
                    // Lost the race with a concurrent delivery; the winning
                    // path runs the follow-on.
                    SettleOutcome::AlreadySettled(payment) => Ok(PaymentOutcome::AlreadySettled {
                        payment,
                        registration,
                    }),
                }
            }
            ChargeStatus::Failed | ChargeStatus::Cancelled => {
                let status = match report.status {
                    ChargeStatus::Cancelled => PaymentStatus::Cancelled,
                    _ => PaymentStatus::Failed,
                };
                let settlement = PaymentSettlement {
                    status,
                    transaction_id: Some(report.transaction_id.clone()),
                    provider_reference: Some(report.reference.clone()),
                    settled_at: Utc::now(),
                };
                match self.store.settle_payment(reference, settlement)? {
                    SettleOutcome::Applied(payment) => {
                        let mut registration = registration;
                        if registration.status != RegistrationStatus::Active {
                            registration.status = RegistrationStatus::PaymentFailed;
                            self.store.update_registration(registration.clone())?;
                        }
                        warn!(
                            vendor = %registration.vendor_id,
                            reference = %payment.reference,
                            status = payment.status.label(),
                            "payment declined"
                        );
                        self.notify_payment_failed(&registration, &payment.reference);
                        Ok(PaymentOutcome::Declined {
                            payment,
                            registration,
                        })
                    }
                    SettleOutcome::AlreadySettled(payment) => Ok(PaymentOutcome::AlreadySettled {
                        payment,
                        registration,
                    }),
                }
            }
        }
    }

    /// Post-confirmation steps: mark the registration paid, settle the
    /// referral, and finalize. Each step is isolated — a failure is logged
    /// and left for a later redelivery to repair, and none of them can
    /// undo the confirmed payment.
    fn follow_on(
        &self,
        mut registration: VendorRegistration,
    ) -> (VendorRegistration, Option<ReferralOutcome>) {
        if !registration.payment_verified {
            registration.payment_verified = true;
            if let Err(err) = self.store.update_registration(registration.clone()) {
                warn!(
                    vendor = %registration.vendor_id,
                    error = %err,
                    "could not record payment confirmation on the registration"
                );
            }
        }

        let referral = match referral::settle(
            self.store.as_ref(),
            &registration,
            self.config.referral_bonus,
            Utc::now(),
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(
                    vendor = %registration.vendor_id,
                    error = %err,
                    "referral settlement failed; a redelivery will retry it"
                );
                None
            }
        };

        let registration = match self.finalize(registration.clone()) {
            Ok(updated) => updated,
            Err(err) => {
                warn!(
                    vendor = %registration.vendor_id,
                    error = %err,
                    "finalization failed; a redelivery will retry it"
                );
                registration
            }
        };

        (registration, referral)
    }

    /// Activate the registration: mint its referral code, stamp the
    /// completion time, and send the welcome notice. Idempotent on an
    /// already-active registration.
    fn finalize(
        &self,
        registration: VendorRegistration,
    ) -> Result<VendorRegistration, OnboardingError> {
        if registration.status == RegistrationStatus::Active {
            return Ok(registration);
        }
        if let Some(missing) = registration.missing_step() {
            return Err(OnboardingError::VerificationIncomplete { missing });
        }
        if !registration.payment_verified {
            return Err(OnboardingError::PaymentNotConfirmed);
        }

        let code = self.allocate_referral_code()?;
        let registration =
            self.store
                .activate_registration(&registration.vendor_id, &code, Utc::now())?;
        info!(vendor = %registration.vendor_id, code = %code, "vendor registration activated");

        let mut details = BTreeMap::new();
        details.insert(
            "business_name".to_string(),
            registration.business_name.clone(),
        );
        details.insert("referral_code".to_string(), code);
        if let Err(err) = self.notifier.send(Notification {
            template: "vendor_welcome".to_string(),
            recipient: registration.email.clone(),
            details,
        }) {
            warn!(
                vendor = %registration.vendor_id,
                error = %err,
                "welcome notification failed"
            );
        }
        Ok(registration)
    }

    fn allocate_referral_code(&self) -> Result<String, OnboardingError> {
        let attempts = self.config.max_referral_code_attempts.max(1);
        for _ in 0..attempts {
            let code = new_referral_code();
            if self.store.find_by_referral_code(&code)?.is_none() {
                return Ok(code);
            }
        }
        Err(OnboardingError::ReferralCodeExhausted { attempts })
    }

    fn mark_payment_failed(
        &self,
        payment: &PaymentRecord,
        report: &TransactionReport,
    ) -> Result<(), OnboardingError> {
        let settlement = PaymentSettlement {
            status: PaymentStatus::Failed,
            transaction_id: Some(report.transaction_id.clone()),
            provider_reference: Some(report.reference.clone()),
            settled_at: Utc::now(),
        };
        if let SettleOutcome::Applied(_) = self.store.settle_payment(&payment.reference, settlement)?
        {
            if let Some(mut registration) = self.store.fetch_registration(&payment.vendor_id)? {
                if registration.status != RegistrationStatus::Active {
                    registration.status = RegistrationStatus::PaymentFailed;
                    self.store.update_registration(registration)?;
                }
            }
        }
        Ok(())
    }

    fn notify_payment_failed(&self, registration: &VendorRegistration, reference: &str) {
        let mut details = BTreeMap::new();
        details.insert("reference".to_string(), reference.to_string());
        if let Err(err) = self.notifier.send(Notification {
            template: "vendor_payment_failed".to_string(),
            recipient: registration.email.clone(),
            details,
        }) {
            warn!(
                vendor = %registration.vendor_id,
                error = %err,
                "payment-failure notification failed"
            );
        }
    }
}
