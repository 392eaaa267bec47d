//! CarmelMart marketplace backend: vendor onboarding, identity and
//! business verification, payment collection, and referral settlement.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
