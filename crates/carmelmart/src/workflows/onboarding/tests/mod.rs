mod common;
mod referral;
