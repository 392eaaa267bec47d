use crate::infra::{
    demo_signup, InMemoryOnboardingStore, LogNotifier, SandboxIdentityProvider,
    SandboxPaymentGateway,
};
use carmelmart::error::AppError;
use carmelmart::workflows::onboarding::{
    webhook_signature, CacClaims, NinClaims, OnboardingConfig, OnboardingService, PaymentOutcome,
    PaymentWebhookEvent, VendorId, VerificationTier, WebhookDisposition,
};
use clap::Args;
use std::sync::Arc;

const DEMO_SECRET: &str = "carmelmart-demo-secret";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Onboard the second vendor on the premium tier (NIN + CAC) instead
    /// of the standard tier
    #[arg(long)]
    pub(crate) premium: bool,
}

type DemoService = OnboardingService<
    InMemoryOnboardingStore,
    SandboxIdentityProvider,
    SandboxPaymentGateway,
    LogNotifier,
>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryOnboardingStore::default());
    let service: DemoService = OnboardingService::new(
        store.clone(),
        Arc::new(SandboxIdentityProvider::default()),
        Arc::new(SandboxPaymentGateway::default()),
        Arc::new(LogNotifier),
        OnboardingConfig::new(DEMO_SECRET),
    );

    println!("Vendor onboarding demo");

    // First vendor completes the standard flow so their referral code
    // exists for the second signup.
    let referrer_id = VendorId("adaeze".to_string());
    service.register(demo_signup("adaeze", None))?;
    let terms = service.select_tier(&referrer_id, VerificationTier::Standard)?;
    println!(
        "\n[adaeze] tier {} selected: fee {} NGN, steps {:?}",
        terms.tier,
        terms.fee,
        terms
            .required_steps
            .iter()
            .map(|step| step.label())
            .collect::<Vec<_>>()
    );

    service.submit_nin_verification(
        &referrer_id,
        NinClaims {
            first_name: "Adaeze".to_string(),
            last_name: "Okonkwo".to_string(),
            nin: "12345678901".to_string(),
        },
    )?;
    println!("[adaeze] NIN verified");

    let session = service.initiate_payment(&referrer_id)?;
    println!(
        "[adaeze] checkout opened: {} ({} {})",
        session.checkout_url, session.amount, session.currency
    );
    let outcome =
        service.handle_payment_callback(&session.reference, &format!("sandbox-{}", session.reference))?;
    let referral_code = match outcome {
        PaymentOutcome::Completed { registration, .. } => {
            println!(
                "[adaeze] payment confirmed via client callback; status {}",
                registration.status.label()
            );
            registration.referral_code.unwrap_or_default()
        }
        other => {
            println!("[adaeze] unexpected payment outcome: {other:?}");
            String::new()
        }
    };
    println!("[adaeze] referral code minted: {referral_code}");

    // Second vendor signs up with the referral code and confirms through
    // the webhook path.
    let tier = if args.premium {
        VerificationTier::Premium
    } else {
        VerificationTier::Standard
    };
    let vendor_id = VendorId("emeka".to_string());
    service.register(demo_signup("emeka", Some(referral_code)))?;
    let terms = service.select_tier(&vendor_id, tier)?;
    println!(
        "\n[emeka] tier {} selected: fee {} NGN",
        terms.tier, terms.fee
    );

    service.submit_nin_verification(
        &vendor_id,
        NinClaims {
            first_name: "Emeka".to_string(),
            last_name: "Adebayo".to_string(),
            nin: "98765432109".to_string(),
        },
    )?;
    println!("[emeka] NIN verified");

    if args.premium {
        service.submit_cac_verification(
            &vendor_id,
            CacClaims {
                registration_number: "BN987654".to_string(),
                company_name: "Emeka Farms".to_string(),
            },
        )?;
        println!("[emeka] CAC verified");
    }

    let session = service.initiate_payment(&vendor_id)?;
    println!(
        "[emeka] checkout opened: {} ({} {})",
        session.checkout_url, session.amount, session.currency
    );

    let event = PaymentWebhookEvent {
        event_type: "charge.completed".to_string(),
        reference: session.reference.clone(),
        transaction_id: format!("sandbox-{}", session.reference),
        amount: session.amount,
        status: "successful".to_string(),
    };
    let body = serde_json::to_vec(&event).map_err(|err| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, err.to_string())
    })?;
    let signature = webhook_signature(DEMO_SECRET, &body);
    match service.handle_webhook_event(&signature, &body)? {
        WebhookDisposition::Processed(PaymentOutcome::Completed { registration, .. }) => {
            println!(
                "[emeka] webhook confirmed the payment; status {}, code {}",
                registration.status.label(),
                registration.referral_code.unwrap_or_default()
            );
        }
        other => println!("[emeka] webhook disposition: {other:?}"),
    }

    println!(
        "\n[adaeze] referral balance: {} NGN",
        store.balance(&referrer_id)
    );

    let view = service.registration_view(&vendor_id)?;
    println!(
        "[emeka] final state: status {}, nin {}, cac {}, payment {}",
        view.status, view.nin_verified, view.cac_verified, view.payment_verified
    );

    Ok(())
}
