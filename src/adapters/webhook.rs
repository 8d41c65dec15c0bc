use {
    crate::{AppState, adapters::api_errors::ApiError, services::dispatcher},
    axum::{Json, body::Bytes, extract::State, http::HeaderMap},
};

/// Single inbound endpoint for processor deliveries. Returns a success
/// acknowledgment for every structurally valid request — including internal
/// no-ops — and 4xx/5xx only for verifier failures, the one class of error
/// redelivery can fix.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(event_id = tracing::field::Empty, event_kind = tracing::field::Empty)
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok());

    // No state is mutated until the signature over the raw bytes checks out.
    let event = state.verifier.verify(&body, signature)?;

    // The typed kind collapses unknown values; keep the raw string for logs.
    let raw_kind = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
        .unwrap_or_else(|| "unknown".to_string());

    tracing::Span::current()
        .record("event_id", tracing::field::display(&event.id))
        .record("event_kind", tracing::field::display(&raw_kind));

    let outcome = dispatcher::dispatch(&state.pool, &state.notifier, &event, &raw_kind).await;

    Ok(Json(serde_json::json!({"status": outcome.as_status()})))
}
