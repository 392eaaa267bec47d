use chrono::Utc;

use super::common::*;
use crate::workflows::onboarding::domain::VendorRegistration;
use crate::workflows::onboarding::referral;
use crate::workflows::onboarding::service::{PaymentOutcome, REFERRAL_BONUS};

#[test]
fn absent_code_settles_to_none() {
    let (service, store, identity, gateway, _) = build_service();
    let registration = activated_vendor(&service, &identity, &gateway, "vendor-1");

    assert_eq!(store.referral_count(), 0);
    assert_eq!(store.balance(&registration.vendor_id), 0);
}

#[test]
fn unresolvable_code_never_fails_the_payment() {
    let (service, store, identity, gateway, _) = build_service();
    let mut referred = signup("vendor-1");
    referred.referred_by = Some("VNDNOSUCH01".to_string());
    let registration = verified_standard_signup(&service, &identity, referred);
    let (reference, transaction_id) =
        scripted_payment(&service, &gateway, &registration.vendor_id, 5_000);

    let outcome = service
        .handle_payment_callback(&reference, &transaction_id)
        .expect("payment still completes");
    match outcome {
        PaymentOutcome::Completed { referral, .. } => assert!(referral.is_none()),
        other => panic!("expected completed outcome, got {other:?}"),
    }
    assert_eq!(store.referral_count(), 0);
}

#[test]
fn valid_code_credits_the_fixed_bonus_exactly_once() {
    let (service, store, identity, gateway, _) = build_service();
    let referrer = activated_vendor(&service, &identity, &gateway, "referrer");
    let code = referrer.referral_code.clone().expect("code minted");

    let mut referred = signup("referred");
    referred.referred_by = Some(code);
    let registration = verified_standard_signup(&service, &identity, referred);
    let (reference, transaction_id) =
        scripted_payment(&service, &gateway, &registration.vendor_id, 5_000);

    let outcome = service
        .handle_payment_callback(&reference, &transaction_id)
        .expect("payment completes");
    match outcome {
        PaymentOutcome::Completed { referral, .. } => {
            let referral = referral.expect("referral settled");
            assert_eq!(referral.referrer_id, referrer.vendor_id);
            assert_eq!(referral.bonus_amount, REFERRAL_BONUS);
            assert!(referral.newly_credited);
        }
        other => panic!("expected completed outcome, got {other:?}"),
    }
    assert_eq!(store.referral_count(), 1);
    assert_eq!(
        store.balance(&referrer.vendor_id),
        u64::from(REFERRAL_BONUS)
    );
}

#[test]
fn duplicate_delivery_does_not_double_credit() {
    let (service, store, identity, gateway, _) = build_service();
    let referrer = activated_vendor(&service, &identity, &gateway, "referrer");
    let code = referrer.referral_code.clone().expect("code minted");

    let mut referred = signup("referred");
    referred.referred_by = Some(code);
    let registration = verified_standard_signup(&service, &identity, referred);
    let (reference, transaction_id) =
        scripted_payment(&service, &gateway, &registration.vendor_id, 5_000);

    service
        .handle_payment_callback(&reference, &transaction_id)
        .expect("first delivery");
    let (signature, body) = signed_event(&reference, &transaction_id, 5_000);
    service
        .handle_webhook_event(&signature, &body)
        .expect("second delivery");

    assert_eq!(store.referral_count(), 1);
    assert_eq!(
        store.balance(&referrer.vendor_id),
        u64::from(REFERRAL_BONUS)
    );
}

#[test]
fn settle_is_a_no_op_without_a_code() {
    let (_, store, _, _, _) = build_service();
    let registration = VendorRegistration::new(signup("vendor-1"), Utc::now());
    let outcome = referral::settle(store.as_ref(), &registration, REFERRAL_BONUS, Utc::now())
        .expect("settles");
    assert!(outcome.is_none());
    assert_eq!(store.referral_count(), 0);
}

#[test]
fn self_referral_is_ignored() {
    let (_, store, _, _, _) = build_service();
    let mut registration = VendorRegistration::new(signup("vendor-1"), Utc::now());
    registration.referral_code = Some("VNDSELF0001".to_string());
    registration.referred_by = Some("VNDSELF0001".to_string());
    store.seed_registration(registration.clone());

    let outcome = referral::settle(store.as_ref(), &registration, REFERRAL_BONUS, Utc::now())
        .expect("settles");
    assert!(outcome.is_none());
    assert_eq!(store.referral_count(), 0);
    assert_eq!(store.balance(&registration.vendor_id), 0);
}

#[test]
fn repeated_settlement_reports_the_existing_credit() {
    let (_, store, _, _, _) = build_service();
    let mut referrer = VendorRegistration::new(signup("referrer"), Utc::now());
    referrer.referral_code = Some("VNDAAAA1111".to_string());
    store.seed_registration(referrer.clone());

    let mut referred = VendorRegistration::new(signup("referred"), Utc::now());
    referred.referred_by = Some("VNDAAAA1111".to_string());
    store.seed_registration(referred.clone());

    let first = referral::settle(store.as_ref(), &referred, REFERRAL_BONUS, Utc::now())
        .expect("settles")
        .expect("credited");
    assert!(first.newly_credited);

    let second = referral::settle(store.as_ref(), &referred, REFERRAL_BONUS, Utc::now())
        .expect("settles")
        .expect("reported");
    assert!(!second.newly_credited);
    assert_eq!(store.balance(&referrer.vendor_id), u64::from(REFERRAL_BONUS));
}
