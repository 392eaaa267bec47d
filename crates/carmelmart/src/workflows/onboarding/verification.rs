use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::VerificationKind;
use super::providers::{CacReport, IdentityProvider, NinReport, ProviderError};
use super::repository::VerificationRecord;

pub const NIN_LENGTH: usize = 11;

const CAC_PREFIXES: [&str; 4] = ["BN", "RC", "IT", "LLP"];

/// Claims submitted alongside a NIN verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NinClaims {
    pub first_name: String,
    pub last_name: String,
    pub nin: String,
}

impl NinClaims {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.first_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "first name",
            });
        }
        if self.last_name.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "last name" });
        }
        if self.nin.len() != NIN_LENGTH || !self.nin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::MalformedNin);
        }
        Ok(())
    }
}

/// Claims submitted alongside a CAC verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacClaims {
    pub registration_number: String,
    pub company_name: String,
}

impl CacClaims {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.company_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "company name",
            });
        }
        let number = self.normalized_number();
        let digits = CAC_PREFIXES
            .iter()
            .find_map(|prefix| number.strip_prefix(prefix));
        match digits {
            Some(rest) if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) => Ok(()),
            _ => Err(ValidationError::MalformedCacNumber {
                number: self.registration_number.clone(),
            }),
        }
    }

    pub fn normalized_number(&self) -> String {
        self.registration_number.trim().to_ascii_uppercase()
    }
}

/// Malformed input, rejected before any external call.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("NIN must be exactly 11 digits")]
    MalformedNin,
    #[error("CAC number '{number}' must be a BN, RC, IT, or LLP prefix followed by digits")]
    MalformedCacNumber { number: String },
    #[error("{field} must not be empty")]
    MissingField { field: &'static str },
    #[error("webhook payload could not be decoded: {detail}")]
    MalformedEvent { detail: String },
    #[error("transaction {transaction_id} does not belong to reference {reference}")]
    TransactionReferenceMismatch {
        transaction_id: String,
        reference: String,
    },
}

/// Provider data that does not corroborate the submitted claims. Nothing
/// is persisted when one of these is raised.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdentityMismatch {
    #[error("submitted names do not match the NIN record")]
    NinName,
    #[error("company name does not match the CAC record")]
    CacName,
    #[error("CAC registration is not active (status: {status})")]
    BusinessInactive { status: String },
    #[error("the identity provider could not verify the submission")]
    Unverified,
}

/// Failure modes of a single verification run.
#[derive(Debug, thiserror::Error)]
pub enum VerificationFailure {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mismatch(#[from] IdentityMismatch),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Both submitted names must appear in the name held by the provider.
fn nin_names_match(claims: &NinClaims, report: &NinReport) -> bool {
    let recorded = format!("{} {}", report.first_name, report.last_name);
    contains_ignore_case(&recorded, claims.first_name.trim())
        && contains_ignore_case(&recorded, claims.last_name.trim())
}

/// Company names match when either side contains the other.
fn company_names_match(submitted: &str, recorded: &str) -> bool {
    let submitted = submitted.trim();
    contains_ignore_case(recorded, submitted) || contains_ignore_case(submitted, recorded)
}

/// Runs identity checks against the provider and cross-checks the result
/// against the submitted claims. Nothing is persisted here; the caller
/// owns the store write, so a failed run commits no partial state.
pub struct VerificationRunner<I> {
    identity: Arc<I>,
}

impl<I> VerificationRunner<I>
where
    I: IdentityProvider,
{
    pub fn new(identity: Arc<I>) -> Self {
        Self { identity }
    }

    pub fn run_nin(
        &self,
        claims: &NinClaims,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, VerificationFailure> {
        claims.validate()?;
        let report = self.identity.verify_nin(&claims.nin)?;
        if !report.verified {
            return Err(IdentityMismatch::Unverified.into());
        }
        if !nin_names_match(claims, &report) {
            return Err(IdentityMismatch::NinName.into());
        }
        Ok(VerificationRecord {
            kind: VerificationKind::Nin,
            subject_name: format!("{} {}", claims.first_name.trim(), claims.last_name.trim()),
            subject_number: claims.nin.clone(),
            provider_verification_id: report.verification_id,
            verified_at: now,
        })
    }

    pub fn run_cac(
        &self,
        claims: &CacClaims,
        now: DateTime<Utc>,
    ) -> Result<VerificationRecord, VerificationFailure> {
        claims.validate()?;
        let number = claims.normalized_number();
        let report = self.identity.verify_cac(&number)?;
        if !report.verified {
            return Err(IdentityMismatch::Unverified.into());
        }
        if !company_names_match(&claims.company_name, &report.company_name) {
            return Err(IdentityMismatch::CacName.into());
        }
        if !report.company_status.eq_ignore_ascii_case("ACTIVE") {
            return Err(IdentityMismatch::BusinessInactive {
                status: report.company_status,
            }
            .into());
        }
        Ok(VerificationRecord {
            kind: VerificationKind::Cac,
            subject_name: claims.company_name.trim().to_string(),
            subject_number: number,
            provider_verification_id: report.verification_id,
            verified_at: now,
        })
    }
}
