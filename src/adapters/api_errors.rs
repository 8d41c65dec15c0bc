use {
    crate::domain::error::BillingError,
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
};

/// Newtype over the domain error so the HTTP mapping lives in the adapter
/// layer, not in the domain.
pub struct ApiError(pub BillingError);

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            BillingError::SignatureMissing => (
                StatusCode::BAD_REQUEST,
                "signature_missing",
                "signature header missing".to_string(),
            ),
            BillingError::SignatureInvalid(_) => (
                StatusCode::BAD_REQUEST,
                "signature_invalid",
                "invalid webhook signature".to_string(),
            ),
            BillingError::PayloadMalformed(msg) => (
                StatusCode::BAD_REQUEST,
                "payload_malformed",
                msg.clone(),
            ),
            BillingError::ConfigMissing => {
                tracing::error!("webhook secret not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "config_missing",
                    "server misconfiguration".to_string(),
                )
            }
            BillingError::InvalidStateForDeletion => (
                StatusCode::BAD_REQUEST,
                "invalid_state_for_deletion",
                self.0.to_string(),
            ),
            BillingError::ConflictingActiveSubscription => (
                StatusCode::BAD_REQUEST,
                "conflicting_active_subscription",
                "you already have an active subscription".to_string(),
            ),
            BillingError::NoBillingAccount => {
                (StatusCode::NOT_FOUND, "no_billing_account", self.0.to_string())
            }
            BillingError::UnknownPlan => {
                (StatusCode::BAD_REQUEST, "unknown_plan", self.0.to_string())
            }
            BillingError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                msg.clone(),
            ),
            BillingError::Database(err) => {
                tracing::error!("database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            BillingError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
            BillingError::Gateway(msg) => {
                tracing::error!("gateway error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "gateway_error",
                    "payment processor unavailable".to_string(),
                )
            }
            // Absorbed inside handlers; reaching the HTTP boundary means a
            // handler leaked, so answer as an internal error.
            BillingError::UnmappedStatus(_) | BillingError::EntityNotFoundForUpdate { .. } => {
                tracing::error!("internal error leaked to HTTP boundary: {}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error_code": error_code,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
