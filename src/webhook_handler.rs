use crate::consultation_store::SaveOutcome;
use crate::errors::{AppError, ErrorBody, ResultExt};
use crate::handlers::AppState;
use crate::metadata_chunks::reassemble_from_metadata;
use crate::models::{ConsultationAnswers, ConsultationRecord, WebhookAck};
use crate::signature::{self, SIGNATURE_HEADER};
use crate::webhook_models::{CheckoutSessionObject, ProviderEvent, CHECKOUT_SESSION_COMPLETED};
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use std::sync::Arc;

/// Payment provider webhook.
///
/// Verifies the `Stripe-Signature` header against the raw body before
/// anything else, then persists a consultation for every completed checkout.
/// Other event types are acknowledged and ignored.
///
/// Authentication: HMAC-SHA256 signature with the configured endpoint secret
#[utoipa::path(
    post,
    path = "/api/webhook-stripe",
    request_body(content = String, description = "Raw signed event", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Bad signature or payload", body = ErrorBody),
        (status = 500, description = "Consultation could not be stored", body = ErrorBody)
    )
)]
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    // 1. Verify signature on the raw bytes
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    signature::verify(
        &body,
        header,
        &state.config.stripe_webhook_secret,
        state.config.webhook_tolerance_secs,
        Utc::now().timestamp(),
    )?;

    // 2. Parse and dispatch
    let event: ProviderEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::PayloadParse(format!("Unreadable event: {}", e)))?;
    tracing::info!("Received webhook event {} ({})", event.id, event.event_type);

    if event.event_type != CHECKOUT_SESSION_COMPLETED {
        tracing::debug!("Ignoring webhook event type {}", event.event_type);
        return Ok(Json(WebhookAck { received: true }));
    }

    let session: CheckoutSessionObject = serde_json::from_value(event.data.object)
        .map_err(|e| AppError::PayloadParse(format!("Unreadable checkout session: {}", e)))?;

    // 3. Persist
    match record_consultation(&state, &session).await? {
        SaveOutcome::Inserted => {
            tracing::info!("✓ Consultation recorded for session {}", session.id)
        }
        SaveOutcome::Updated => {
            tracing::info!("✓ Consultation updated for session {}", session.id)
        }
        SaveOutcome::Duplicate => {
            tracing::info!("Session {} already recorded, skipping", session.id)
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Reads the answers back from the linked customer and writes the record.
/// Sessions already on file are reported as duplicates without a provider call.
async fn record_consultation(
    state: &AppState,
    session: &CheckoutSessionObject,
) -> Result<SaveOutcome, AppError> {
    if state
        .store
        .find_by_session(&session.id)
        .await
        .with_context(|| format!("Checking session {}", session.id))?
        .is_some()
    {
        return Ok(SaveOutcome::Duplicate);
    }

    let customer_id = session.customer.as_deref().ok_or_else(|| {
        AppError::PayloadParse(format!("Checkout session {} has no customer", session.id))
    })?;

    let customer = state
        .payments
        .retrieve_customer(customer_id)
        .await
        .with_context(|| format!("Loading customer {} for session {}", customer_id, session.id))?;

    let serialized = reassemble_from_metadata(&customer.metadata).ok_or_else(|| {
        AppError::PayloadParse(format!(
            "Customer {} has no consultation answers in its metadata",
            customer.id
        ))
    })?;
    let answers: ConsultationAnswers = serde_json::from_str(&serialized)
        .map_err(|e| AppError::PayloadParse(format!("Stored answers are not valid: {}", e)))?;

    let email = session
        .email()
        .map(str::to_string)
        .or_else(|| customer.email.clone());

    let record = ConsultationRecord::new(
        session.id.clone(),
        email,
        answers,
        session.payment_status.clone(),
    );

    state
        .store
        .save(record)
        .await
        .with_context(|| format!("Saving consultation for session {}", session.id))
}
