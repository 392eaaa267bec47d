//! Workflow engines orchestrated by the CarmelMart platform.

pub mod onboarding;
