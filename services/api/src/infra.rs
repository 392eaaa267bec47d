use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use carmelmart::workflows::onboarding::{
    BankDetails, CacReport, ChargeStatus, CheckoutRequest, CheckoutSession, IdentityProvider,
    NinReport, Notification, Notifier, NotifyError, OnboardingStore, PaymentGateway,
    PaymentRecord, PaymentSettlement, ProviderError, ReferralApplication, ReferralRecord,
    RegistrationStatus, RepositoryError, SettleOutcome, TransactionReport, VendorId,
    VendorRegistration, VendorSignup, VerificationKind, VerificationRecord, WebhookEventRecord,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-memory reference implementation of the store contract. Conditional
/// semantics are upheld under one mutex per collection, which is enough
/// for a single-process deployment and for the demo command.
#[derive(Default, Clone)]
pub(crate) struct InMemoryOnboardingStore {
    registrations: Arc<Mutex<HashMap<VendorId, VendorRegistration>>>,
    verifications: Arc<Mutex<Vec<(VendorId, VerificationRecord)>>>,
    payments: Arc<Mutex<HashMap<String, PaymentRecord>>>,
    referrals: Arc<Mutex<HashMap<(VendorId, VendorId), ReferralRecord>>>,
    balances: Arc<Mutex<HashMap<VendorId, u64>>>,
    webhook_events: Arc<Mutex<Vec<WebhookEventRecord>>>,
}

impl InMemoryOnboardingStore {
    pub(crate) fn balance(&self, id: &VendorId) -> u64 {
        self.balances
            .lock()
            .expect("balance mutex poisoned")
            .get(id)
            .copied()
            .unwrap_or_default()
    }
}

impl OnboardingStore for InMemoryOnboardingStore {
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
        completed_at: chrono::DateTime<chrono::Utc>,
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

/// Identity provider backed by a fixed sandbox directory, standing in for
/// the hosted verification service outside production.
pub(crate) struct SandboxIdentityProvider {
    nins: HashMap<&'static str, (&'static str, &'static str)>,
    cacs: HashMap<&'static str, (&'static str, &'static str)>,
}

impl Default for SandboxIdentityProvider {
    fn default() -> Self {
        let mut nins = HashMap::new();
        nins.insert("12345678901", ("ADAEZE", "OKONKWO"));
        nins.insert("98765432109", ("EMEKA", "ADEBAYO"));

        let mut cacs = HashMap::new();
        cacs.insert("RC123456", ("ADAEZE TEXTILES LTD", "ACTIVE"));
        cacs.insert("BN987654", ("EMEKA FARMS VENTURES", "ACTIVE"));

        Self { nins, cacs }
    }
}

impl IdentityProvider for SandboxIdentityProvider {
    fn verify_nin(&self, nin: &str) -> Result<NinReport, ProviderError> {
        let entry = self.nins.get(nin);
        Ok(NinReport {
            verified: entry.is_some(),
            first_name: entry.map(|(first, _)| first.to_string()).unwrap_or_default(),
            last_name: entry.map(|(_, last)| last.to_string()).unwrap_or_default(),
            verification_id: format!("sandbox-nin-{nin}"),
        })
    }

    fn verify_cac(&self, registration_number: &str) -> Result<CacReport, ProviderError> {
        let entry = self.cacs.get(registration_number);
        Ok(CacReport {
            verified: entry.is_some(),
            company_name: entry.map(|(name, _)| name.to_string()).unwrap_or_default(),
            company_status: entry
                .map(|(_, status)| status.to_string())
                .unwrap_or_default(),
            verification_id: format!("sandbox-cac-{registration_number}"),
        })
    }
}

/// Payment gateway stand-in. Sessions are remembered by reference, and a
/// transaction id of the form `sandbox-<reference>` verifies as a
/// successful charge of the session amount.
#[derive(Default)]
pub(crate) struct SandboxPaymentGateway {
    sessions: Mutex<HashMap<String, CheckoutRequest>>,
}

impl PaymentGateway for SandboxPaymentGateway {
    fn initiate_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .insert(request.reference.clone(), request.clone());
        Ok(CheckoutSession {
            reference: request.reference.clone(),
            checkout_url: format!(
                "https://checkout.sandbox.carmelmart.test/{}",
                request.reference
            ),
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }

    fn verify_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionReport, ProviderError> {
        let reference = transaction_id.strip_prefix("sandbox-").ok_or_else(|| {
            ProviderError::InvalidResponse(format!("unknown transaction {transaction_id}"))
        })?;
        let sessions = self.sessions.lock().expect("session mutex poisoned");
        let request = sessions.get(reference).ok_or_else(|| {
            ProviderError::InvalidResponse(format!("no session for reference {reference}"))
        })?;
        Ok(TransactionReport {
            transaction_id: transaction_id.to_string(),
            reference: request.reference.clone(),
            status: ChargeStatus::Successful,
            amount: request.amount,
            currency: request.currency.clone(),
        })
    }
}

/// Notifier that records deliveries in the service log. Stands in for the
/// transactional mail collaborator.
#[derive(Default)]
pub(crate) struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            template = %notification.template,
            recipient = %notification.recipient,
            "notification dispatched"
        );
        Ok(())
    }
}

pub(crate) fn demo_signup(id: &str, referred_by: Option<String>) -> VendorSignup {
    VendorSignup {
        vendor_id: VendorId(id.to_string()),
        email: format!("{id}@example.com"),
        phone: "+2348011122233".to_string(),
        business_name: match id {
            "adaeze" => "Adaeze Textiles".to_string(),
            _ => "Emeka Farms".to_string(),
        },
        address: "21 Broad Street, Lagos".to_string(),
        bank: BankDetails {
            bank_name: "Access Bank".to_string(),
            account_number: "0055443322".to_string(),
            account_name: "CarmelMart Vendor".to_string(),
        },
        referred_by,
    }
}
