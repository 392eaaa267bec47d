use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::domain::{VendorId, VendorSignup, VerificationTier};
use super::payment::SIGNATURE_HEADER;
use super::providers::{IdentityProvider, Notifier, PaymentGateway};
use super::repository::{OnboardingStore, RepositoryError};
use super::service::{
    OnboardingError, OnboardingService, PaymentOutcome, VerificationOutcome, WebhookDisposition,
};
use super::verification::{CacClaims, NinClaims};

/// Router builder exposing the onboarding HTTP endpoints.
pub fn onboarding_router<S, I, G, N>(service: Arc<OnboardingService<S, I, G, N>>) -> Router
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/vendors", post(register_handler::<S, I, G, N>))
        .route(
            "/api/v1/vendors/:vendor_id",
            get(status_handler::<S, I, G, N>),
        )
        .route(
            "/api/v1/vendors/:vendor_id/tier",
            post(tier_handler::<S, I, G, N>),
        )
        .route(
            "/api/v1/vendors/:vendor_id/verification/nin",
            post(nin_handler::<S, I, G, N>),
        )
        .route(
            "/api/v1/vendors/:vendor_id/verification/cac",
            post(cac_handler::<S, I, G, N>),
        )
        .route(
            "/api/v1/vendors/:vendor_id/payments",
            post(initiate_payment_handler::<S, I, G, N>),
        )
        .route(
            "/api/v1/payments/callback",
            post(callback_handler::<S, I, G, N>),
        )
        .route(
            "/api/v1/webhooks/payments",
            post(webhook_handler::<S, I, G, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct TierSelectionRequest {
    pub tier: VerificationTier,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentCallbackRequest {
    pub reference: String,
    pub transaction_id: String,
}

fn error_response(error: OnboardingError) -> Response {
    let status = match &error {
        OnboardingError::Validation(_)
        | OnboardingError::IdentityMismatch(_)
        | OnboardingError::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        OnboardingError::TierNotSelected
        | OnboardingError::VerificationIncomplete { .. }
        | OnboardingError::StepNotInTier { .. }
        | OnboardingError::TierLocked
        | OnboardingError::AlreadyActive
        | OnboardingError::PaymentNotConfirmed => StatusCode::CONFLICT,
        OnboardingError::BadSignature => StatusCode::UNAUTHORIZED,
        OnboardingError::Provider(_) => StatusCode::BAD_GATEWAY,
        OnboardingError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        OnboardingError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        OnboardingError::Repository(RepositoryError::Unavailable(_))
        | OnboardingError::ReferralCodeExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

fn verification_response(outcome: VerificationOutcome) -> Response {
    let payload = json!({
        "already_verified": outcome.already_verified(),
        "registration": outcome.registration().status_view(),
    });
    (StatusCode::OK, Json(payload)).into_response()
}

fn payment_response(outcome: PaymentOutcome) -> Response {
    let payload = match outcome {
        PaymentOutcome::Completed {
            payment,
            registration,
            referral,
        } => json!({
            "status": "completed",
            "payment_status": payment.status.label(),
            "registration": registration.status_view(),
            "referral": referral,
        }),
        PaymentOutcome::AlreadySettled {
            payment,
            registration,
        } => json!({
            "status": "already_settled",
            "payment_status": payment.status.label(),
            "registration": registration.status_view(),
        }),
        PaymentOutcome::Declined {
            payment,
            registration,
        } => json!({
            "status": "declined",
            "payment_status": payment.status.label(),
            "registration": registration.status_view(),
        }),
    };
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn register_handler<S, I, G, N>(
    State(service): State<Arc<OnboardingService<S, I, G, N>>>,
    Json(signup): Json<VendorSignup>,
) -> Response
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match service.register(signup) {
        Ok(registration) => {
            (StatusCode::CREATED, Json(registration.status_view())).into_response()
        }
        Err(OnboardingError::Repository(RepositoryError::Conflict)) => {
            let payload = json!({ "error": "vendor is already registered" });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

pub(crate) async fn status_handler<S, I, G, N>(
    State(service): State<Arc<OnboardingService<S, I, G, N>>>,
    Path(vendor_id): Path<String>,
) -> Response
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match service.registration_view(&VendorId(vendor_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn tier_handler<S, I, G, N>(
    State(service): State<Arc<OnboardingService<S, I, G, N>>>,
    Path(vendor_id): Path<String>,
    Json(request): Json<TierSelectionRequest>,
) -> Response
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match service.select_tier(&VendorId(vendor_id), request.tier) {
        Ok(terms) => (StatusCode::OK, Json(terms)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn nin_handler<S, I, G, N>(
    State(service): State<Arc<OnboardingService<S, I, G, N>>>,
    Path(vendor_id): Path<String>,
    Json(claims): Json<NinClaims>,
) -> Response
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match service.submit_nin_verification(&VendorId(vendor_id), claims) {
        Ok(outcome) => verification_response(outcome),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn cac_handler<S, I, G, N>(
    State(service): State<Arc<OnboardingService<S, I, G, N>>>,
    Path(vendor_id): Path<String>,
    Json(claims): Json<CacClaims>,
) -> Response
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match service.submit_cac_verification(&VendorId(vendor_id), claims) {
        Ok(outcome) => verification_response(outcome),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn initiate_payment_handler<S, I, G, N>(
    State(service): State<Arc<OnboardingService<S, I, G, N>>>,
    Path(vendor_id): Path<String>,
) -> Response
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match service.initiate_payment(&VendorId(vendor_id)) {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn callback_handler<S, I, G, N>(
    State(service): State<Arc<OnboardingService<S, I, G, N>>>,
    Json(request): Json<PaymentCallbackRequest>,
) -> Response
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match service.handle_payment_callback(&request.reference, &request.transaction_id) {
        Ok(outcome) => payment_response(outcome),
        Err(other) => error_response(other),
    }
}

/// Webhook endpoint. Deliveries are acked with 200 once the event has been
/// durably recorded, even when downstream reconciliation is deferred, so
/// the provider does not retry indefinitely.
pub(crate) async fn webhook_handler<S, I, G, N>(
    State(service): State<Arc<OnboardingService<S, I, G, N>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: OnboardingStore + 'static,
    I: IdentityProvider + 'static,
    G: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match service.handle_webhook_event(signature, &body) {
        Ok(WebhookDisposition::Processed(outcome)) => payment_response(outcome),
        Ok(WebhookDisposition::Deferred { reference, .. }) => {
            let payload = json!({ "status": "accepted", "reference": reference });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err @ OnboardingError::Validation(_)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}
