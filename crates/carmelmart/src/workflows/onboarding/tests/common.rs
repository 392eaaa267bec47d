use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::workflows::onboarding::domain::{
    BankDetails, RegistrationStatus, VendorId, VendorRegistration, VendorSignup, VerificationKind,
    VerificationTier,
};
use crate::workflows::onboarding::payment::webhook_signature;
use crate::workflows::onboarding::providers::{
    CacReport, ChargeStatus, CheckoutRequest, CheckoutSession, IdentityProvider, NinReport,
    Notification, Notifier, NotifyError, PaymentGateway, ProviderError, TransactionReport,
};
use crate::workflows::onboarding::repository::{
    OnboardingStore, PaymentRecord, PaymentSettlement, ReferralApplication, ReferralRecord,
    RepositoryError, SettleOutcome, VerificationRecord, WebhookEventRecord,
};
use crate::workflows::onboarding::service::{OnboardingConfig, OnboardingService, PaymentOutcome};
use crate::workflows::onboarding::verification::{CacClaims, NinClaims};
use crate::workflows::onboarding::{onboarding_router, PaymentWebhookEvent};

pub(super) const TEST_SECRET: &str = "test-webhook-secret";

pub(super) type TestService = OnboardingService<MemoryStore, StubIdentity, StubGateway, MemoryNotifier>;

pub(super) fn onboarding_config() -> OnboardingConfig {
    OnboardingConfig::new(TEST_SECRET)
}

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryStore>,
    Arc<StubIdentity>,
    Arc<StubGateway>,
    Arc<MemoryNotifier>,
) {
    let store = Arc::new(MemoryStore::default());
    let identity = Arc::new(StubIdentity::default());
    let gateway = Arc::new(StubGateway::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service = OnboardingService::new(
        store.clone(),
        identity.clone(),
        gateway.clone(),
        notifier.clone(),
        onboarding_config(),
    );
    (service, store, identity, gateway, notifier)
}

pub(super) fn signup(id: &str) -> VendorSignup {
    VendorSignup {
        vendor_id: VendorId(id.to_string()),
        email: format!("{id}@carmelmart.test"),
        phone: "+2348012345678".to_string(),
        business_name: "Ada Stores".to_string(),
        address: "12 Allen Avenue, Ikeja, Lagos".to_string(),
        bank: BankDetails {
            bank_name: "Zenith Bank".to_string(),
            account_number: "0123456789".to_string(),
            account_name: "Ada Stores".to_string(),
        },
        referred_by: None,
    }
}

pub(super) fn nin_claims() -> NinClaims {
    NinClaims {
        first_name: "Ada".to_string(),
        last_name: "Obi".to_string(),
        nin: "12345678901".to_string(),
    }
}

pub(super) fn matching_nin_report() -> NinReport {
    NinReport {
        verified: true,
        first_name: "ADA".to_string(),
        last_name: "OBI".to_string(),
        verification_id: "qid-nin-001".to_string(),
    }
}

pub(super) fn cac_claims() -> CacClaims {
    CacClaims {
        registration_number: "RC123456".to_string(),
        company_name: "Ada Stores".to_string(),
    }
}

pub(super) fn matching_cac_report() -> CacReport {
    CacReport {
        verified: true,
        company_name: "ADA STORES LIMITED".to_string(),
        company_status: "ACTIVE".to_string(),
        verification_id: "qid-cac-001".to_string(),
    }
}

/// Register a vendor, choose the standard tier, and pass NIN verification.
pub(super) fn verified_standard_vendor(
    service: &TestService,
    identity: &StubIdentity,
    id: &str,
) -> VendorRegistration {
    verified_standard_signup(service, identity, signup(id))
}

pub(super) fn verified_standard_signup(
    service: &TestService,
    identity: &StubIdentity,
    signup: VendorSignup,
) -> VendorRegistration {
    let vendor_id = signup.vendor_id.clone();
    service.register(signup).expect("registration opens");
    service
        .select_tier(&vendor_id, VerificationTier::Standard)
        .expect("tier recorded");
    identity.set_nin(matching_nin_report());
    service
        .submit_nin_verification(&vendor_id, nin_claims())
        .expect("NIN verifies")
        .registration()
        .clone()
}

/// Initiate a payment and script the gateway to confirm it, returning the
/// reference and transaction id ready for reconciliation.
pub(super) fn scripted_payment(
    service: &TestService,
    gateway: &StubGateway,
    vendor_id: &VendorId,
    amount: u32,
) -> (String, String) {
    let session = service.initiate_payment(vendor_id).expect("checkout opens");
    let transaction_id = format!("txn-{}", session.reference);
    gateway.script(TransactionReport {
        transaction_id: transaction_id.clone(),
        reference: session.reference.clone(),
        status: ChargeStatus::Successful,
        amount,
        currency: "NGN".to_string(),
    });
    (session.reference, transaction_id)
}

/// Drive a vendor through the whole standard flow until activation.
pub(super) fn activated_vendor(
    service: &TestService,
    identity: &StubIdentity,
    gateway: &StubGateway,
    id: &str,
) -> VendorRegistration {
    let registration = verified_standard_vendor(service, identity, id);
    let (reference, transaction_id) =
        scripted_payment(service, gateway, &registration.vendor_id, 5_000);
    match service
        .handle_payment_callback(&reference, &transaction_id)
        .expect("payment reconciles")
    {
        PaymentOutcome::Completed { registration, .. } => registration,
        other => panic!("expected completed payment, got {other:?}"),
    }
}

pub(super) fn signed_event(reference: &str, transaction_id: &str, amount: u32) -> (String, Vec<u8>) {
    let event = PaymentWebhookEvent {
        event_type: "charge.completed".to_string(),
        reference: reference.to_string(),
        transaction_id: transaction_id.to_string(),
        amount,
        status: "successful".to_string(),
    };
    let body = serde_json::to_vec(&event).expect("event serializes");
    let signature = webhook_signature(TEST_SECRET, &body);
    (signature, body)
}

pub(super) fn onboarding_router_with_service(service: TestService) -> axum::Router {
    onboarding_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[derive(Default, Clone)]
pub(super) struct MemoryStore {
    registrations: Arc<Mutex<HashMap<VendorId, VendorRegistration>>>,
    verifications: Arc<Mutex<Vec<(VendorId, VerificationRecord)>>>,
    payments: Arc<Mutex<HashMap<String, PaymentRecord>>>,
    referrals: Arc<Mutex<HashMap<(VendorId, VendorId), ReferralRecord>>>,
    balances: Arc<Mutex<HashMap<VendorId, u64>>>,
    webhook_events: Arc<Mutex<Vec<WebhookEventRecord>>>,
}

impl MemoryStore {
    pub(super) fn balance(&self, id: &VendorId) -> u64 {
        self.balances
            .lock()
            .expect("balance mutex poisoned")
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    pub(super) fn verification_count(&self, id: &VendorId) -> usize {
        self.verifications
            .lock()
            .expect("verification mutex poisoned")
            .iter()
            .filter(|(vendor, _)| vendor == id)
            .count()
    }

    pub(super) fn referral_count(&self) -> usize {
        self.referrals.lock().expect("referral mutex poisoned").len()
    }

    pub(super) fn payment(&self, reference: &str) -> Option<PaymentRecord> {
        self.payments
            .lock()
            .expect("payment mutex poisoned")
            .get(reference)
            .cloned()
    }

    pub(super) fn webhook_events(&self) -> Vec<WebhookEventRecord> {
        self.webhook_events
            .lock()
            .expect("event mutex poisoned")
            .clone()
    }

    pub(super) fn seed_registration(&self, registration: VendorRegistration) {
        self.registrations
            .lock()
            .expect("registration mutex poisoned")
            .insert(registration.vendor_id.clone(), registration);
    }
}

impl OnboardingStore for MemoryStore {
    fn insert_registration(
        &self,
        registration: VendorRegistration,
    ) -> Result<VendorRegistration, RepositoryError> {
        let mut guard = self
            .registrations
            .lock()
            .expect("registration mutex poisoned");
        if guard.contains_key(&registration.vendor_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(registration.vendor_id.clone(), registration.clone());
        Ok(registration)
    }

    fn fetch_registration(
        &self,
        id: &VendorId,
    ) -> Result<Option<VendorRegistration>, RepositoryError> {
        let guard = self
            .registrations
            .lock()
            .expect("registration mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update_registration(
        &self,
        registration: VendorRegistration,
    ) -> Result<(), RepositoryError> {
        let mut guard = self
            .registrations
            .lock()
            .expect("registration mutex poisoned");
        if guard.contains_key(&registration.vendor_id) {
            guard.insert(registration.vendor_id.clone(), registration);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn find_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<VendorRegistration>, RepositoryError> {
        let guard = self
            .registrations
            .lock()
            .expect("registration mutex poisoned");
        Ok(guard
            .values()
            .find(|registration| registration.referral_code.as_deref() == Some(code))
            .cloned())
    }

    fn record_verification(
        &self,
        id: &VendorId,
        record: VerificationRecord,
    ) -> Result<VendorRegistration, RepositoryError> {
        let mut guard = self
            .registrations
            .lock()
            .expect("registration mutex poisoned");
        let registration = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        match record.kind {
            VerificationKind::Nin => registration.nin_verified = true,
            VerificationKind::Cac => registration.cac_verified = true,
        }
        self.verifications
            .lock()
            .expect("verification mutex poisoned")
            .push((id.clone(), record));
        Ok(registration.clone())
    }

    fn insert_payment(&self, payment: PaymentRecord) -> Result<PaymentRecord, RepositoryError> {
        let mut guard = self.payments.lock().expect("payment mutex poisoned");
        if guard.contains_key(&payment.reference) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(payment.reference.clone(), payment.clone());
        Ok(payment)
    }

    fn fetch_payment(&self, reference: &str) -> Result<Option<PaymentRecord>, RepositoryError> {
        let guard = self.payments.lock().expect("payment mutex poisoned");
        Ok(guard.get(reference).cloned())
    }

    fn settle_payment(
        &self,
        reference: &str,
        settlement: PaymentSettlement,
    ) -> Result<SettleOutcome, RepositoryError> {
        let mut guard = self.payments.lock().expect("payment mutex poisoned");
        let payment = guard.get_mut(reference).ok_or(RepositoryError::NotFound)?;
        if payment.status.is_terminal() {
            return Ok(SettleOutcome::AlreadySettled(payment.clone()));
        }
        payment.status = settlement.status;
        payment.transaction_id = settlement.transaction_id;
        payment.provider_reference = settlement.provider_reference;
        payment.settled_at = Some(settlement.settled_at);
        Ok(SettleOutcome::Applied(payment.clone()))
    }

    fn record_referral(
        &self,
        record: ReferralRecord,
    ) -> Result<ReferralApplication, RepositoryError> {
        let mut guard = self.referrals.lock().expect("referral mutex poisoned");
        let key = (record.referrer_id.clone(), record.referred_id.clone());
        if let Some(existing) = guard.get(&key) {
            return Ok(ReferralApplication::AlreadyCredited(existing.clone()));
        }
        let mut balances = self.balances.lock().expect("balance mutex poisoned");
        *balances.entry(record.referrer_id.clone()).or_default() += u64::from(record.bonus_amount);
        guard.insert(key, record.clone());
        Ok(ReferralApplication::Credited(record))
    }

    fn activate_registration(
        &self,
        id: &VendorId,
        referral_code: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<VendorRegistration, RepositoryError> {
        let mut guard = self
            .registrations
            .lock()
            .expect("registration mutex poisoned");
        let registration = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if registration.status != RegistrationStatus::Active {
            registration.status = RegistrationStatus::Active;
            registration.referral_code = Some(referral_code.to_string());
            registration.registration_completed_at = Some(completed_at);
        }
        Ok(registration.clone())
    }

    fn record_webhook_event(&self, event: WebhookEventRecord) -> Result<(), RepositoryError> {
        self.webhook_events
            .lock()
            .expect("event mutex poisoned")
            .push(event);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct StubIdentity {
    nin_report: Arc<Mutex<Option<NinReport>>>,
    cac_report: Arc<Mutex<Option<CacReport>>>,
    nin_calls: Arc<Mutex<usize>>,
    cac_calls: Arc<Mutex<usize>>,
}

impl StubIdentity {
    pub(super) fn set_nin(&self, report: NinReport) {
        *self.nin_report.lock().expect("stub mutex poisoned") = Some(report);
    }

    pub(super) fn set_cac(&self, report: CacReport) {
        *self.cac_report.lock().expect("stub mutex poisoned") = Some(report);
    }

    pub(super) fn nin_calls(&self) -> usize {
        *self.nin_calls.lock().expect("stub mutex poisoned")
    }

    pub(super) fn cac_calls(&self) -> usize {
        *self.cac_calls.lock().expect("stub mutex poisoned")
    }
}

impl IdentityProvider for StubIdentity {
    fn verify_nin(&self, _nin: &str) -> Result<NinReport, ProviderError> {
        *self.nin_calls.lock().expect("stub mutex poisoned") += 1;
        self.nin_report
            .lock()
            .expect("stub mutex poisoned")
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("identity provider offline".to_string()))
    }

    fn verify_cac(&self, _registration_number: &str) -> Result<CacReport, ProviderError> {
        *self.cac_calls.lock().expect("stub mutex poisoned") += 1;
        self.cac_report
            .lock()
            .expect("stub mutex poisoned")
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("identity provider offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct StubGateway {
    reports: Arc<Mutex<HashMap<String, TransactionReport>>>,
    sessions: Arc<Mutex<Vec<CheckoutRequest>>>,
}

impl StubGateway {
    pub(super) fn script(&self, report: TransactionReport) {
        self.reports
            .lock()
            .expect("gateway mutex poisoned")
            .insert(report.transaction_id.clone(), report);
    }

    pub(super) fn sessions(&self) -> Vec<CheckoutRequest> {
        self.sessions.lock().expect("gateway mutex poisoned").clone()
    }
}

impl PaymentGateway for StubGateway {
    fn initiate_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.sessions
            .lock()
            .expect("gateway mutex poisoned")
            .push(request.clone());
        Ok(CheckoutSession {
            reference: request.reference.clone(),
            checkout_url: format!("https://checkout.test/{}", request.reference),
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }

    fn verify_transaction(&self, transaction_id: &str) -> Result<TransactionReport, ProviderError> {
        self.reports
            .lock()
            .expect("gateway mutex poisoned")
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!("unknown transaction {transaction_id}"))
            })
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<Notification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

/// Notifier whose transport always fails, for isolation tests.
pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}
