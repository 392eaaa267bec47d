//! Referral bonus settlement for confirmed onboarding payments.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{VendorId, VendorRegistration};
use super::repository::{
    OnboardingStore, ReferralApplication, ReferralRecord, ReferralStatus, RepositoryError,
};

/// Result of settling the referral attached to one confirmed signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferralOutcome {
    pub referrer_id: VendorId,
    pub bonus_amount: u32,
    pub newly_credited: bool,
}

/// Credit the referring vendor for a confirmed signup. Absent or
/// unresolvable codes settle to `None`; this path never fails the
/// enclosing payment reconciliation. The store applies the record insert
/// and the balance credit as one committed unit, guarded by uniqueness on
/// the (referrer, referred) pair, so re-settlement cannot double-credit.
pub fn settle<S: OnboardingStore>(
    store: &S,
    registration: &VendorRegistration,
    bonus_amount: u32,
    now: DateTime<Utc>,
) -> Result<Option<ReferralOutcome>, RepositoryError> {
    let Some(code) = registration.referred_by.as_deref() else {
        return Ok(None);
    };

    let Some(referrer) = store.find_by_referral_code(code)? else {
        warn!(vendor = %registration.vendor_id, code, "referral code did not resolve to a vendor");
        return Ok(None);
    };

    if referrer.vendor_id == registration.vendor_id {
        warn!(vendor = %registration.vendor_id, "ignoring self-referral");
        return Ok(None);
    }

    let record = ReferralRecord {
        referrer_id: referrer.vendor_id,
        referred_id: registration.vendor_id.clone(),
        bonus_amount,
        status: ReferralStatus::Completed,
        credited_at: now,
    };

    match store.record_referral(record)? {
        ReferralApplication::Credited(record) => {
            info!(
                referrer = %record.referrer_id,
                referred = %record.referred_id,
                bonus = record.bonus_amount,
                "referral bonus credited"
            );
            Ok(Some(ReferralOutcome {
                referrer_id: record.referrer_id,
                bonus_amount: record.bonus_amount,
                newly_credited: true,
            }))
        }
        ReferralApplication::AlreadyCredited(record) => Ok(Some(ReferralOutcome {
            referrer_id: record.referrer_id,
            bonus_amount: record.bonus_amount,
            newly_credited: false,
        })),
    }
}
