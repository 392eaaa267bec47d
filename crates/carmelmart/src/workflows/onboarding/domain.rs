use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for vendor accounts. The value is minted by the
/// external auth collaborator and treated as opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VendorId(pub String);

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Settlement account details collected at sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

/// Payload captured when a user picks the vendor role at sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSignup {
    pub vendor_id: VendorId,
    pub email: String,
    pub phone: String,
    pub business_name: String,
    pub address: String,
    pub bank: BankDetails,
    /// Referral code of the vendor who brought this one in. Captured once
    /// at sign-up and never changed afterwards.
    #[serde(default)]
    pub referred_by: Option<String>,
}

/// Identity checks the onboarding workflow can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    Nin,
    Cac,
}

impl VerificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationKind::Nin => "NIN",
            VerificationKind::Cac => "CAC",
        }
    }
}

impl fmt::Display for VerificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Verification level chosen by the vendor. The choice is locked once any
/// verification step has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTier {
    Standard,
    Premium,
}

impl VerificationTier {
    /// One-time onboarding fee, in minor currency units.
    pub const fn fee(self) -> u32 {
        match self {
            VerificationTier::Standard => 5_000,
            VerificationTier::Premium => 10_000,
        }
    }

    pub const fn required_steps(self) -> &'static [VerificationKind] {
        match self {
            VerificationTier::Standard => &[VerificationKind::Nin],
            VerificationTier::Premium => &[VerificationKind::Nin, VerificationKind::Cac],
        }
    }

    pub fn requires(self, step: VerificationKind) -> bool {
        self.required_steps().contains(&step)
    }

    pub const fn label(self) -> &'static str {
        match self {
            VerificationTier::Standard => "standard",
            VerificationTier::Premium => "premium",
        }
    }
}

impl fmt::Display for VerificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fee and step terms implied by a tier selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierTerms {
    pub tier: VerificationTier,
    pub fee: u32,
    pub required_steps: Vec<VerificationKind>,
}

impl TierTerms {
    pub fn for_tier(tier: VerificationTier) -> Self {
        Self {
            tier,
            fee: tier.fee(),
            required_steps: tier.required_steps().to_vec(),
        }
    }
}

/// Lifecycle of a vendor registration. `Active` is terminal; a failed
/// payment can be retried, which moves the registration back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    PaymentFailed,
    Active,
}

impl RegistrationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::PaymentFailed => "payment_failed",
            RegistrationStatus::Active => "active",
        }
    }
}

/// Persistent registration state for one vendor, mutated exclusively
/// through the store collaborator as the workflow advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRegistration {
    pub vendor_id: VendorId,
    pub email: String,
    pub phone: String,
    pub business_name: String,
    pub address: String,
    pub bank: BankDetails,
    pub tier: Option<VerificationTier>,
    pub nin_verified: bool,
    pub cac_verified: bool,
    pub payment_verified: bool,
    /// The vendor's own code, minted once at activation.
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub status: RegistrationStatus,
    pub created_at: DateTime<Utc>,
    pub registration_completed_at: Option<DateTime<Utc>>,
}

impl VendorRegistration {
    pub fn new(signup: VendorSignup, created_at: DateTime<Utc>) -> Self {
        Self {
            vendor_id: signup.vendor_id,
            email: signup.email,
            phone: signup.phone,
            business_name: signup.business_name,
            address: signup.address,
            bank: signup.bank,
            tier: None,
            nin_verified: false,
            cac_verified: false,
            payment_verified: false,
            referral_code: None,
            referred_by: signup.referred_by,
            status: RegistrationStatus::Pending,
            created_at,
            registration_completed_at: None,
        }
    }

    pub fn step_completed(&self, step: VerificationKind) -> bool {
        match step {
            VerificationKind::Nin => self.nin_verified,
            VerificationKind::Cac => self.cac_verified,
        }
    }

    /// First required step of the chosen tier that has not completed.
    pub fn missing_step(&self) -> Option<VerificationKind> {
        let tier = self.tier?;
        tier.required_steps()
            .iter()
            .copied()
            .find(|step| !self.step_completed(*step))
    }

    pub fn verification_complete(&self) -> bool {
        self.tier.is_some() && self.missing_step().is_none()
    }

    pub fn verification_started(&self) -> bool {
        self.nin_verified || self.cac_verified || self.payment_verified
    }

    pub fn status_view(&self) -> RegistrationView {
        RegistrationView {
            vendor_id: self.vendor_id.clone(),
            status: self.status.label(),
            tier: self.tier,
            nin_verified: self.nin_verified,
            cac_verified: self.cac_verified,
            payment_verified: self.payment_verified,
            referral_code: self.referral_code.clone(),
        }
    }
}

/// Sanitized representation of a registration's externally visible state,
/// enough for a caller to resume from the last completed step.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationView {
    pub vendor_id: VendorId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<VerificationTier>,
    pub nin_verified: bool,
    pub cac_verified: bool,
    pub payment_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
}
