use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::BillingError, payment::Payment, plan::Plan, subscription::Subscription},
        services::commands::{self, CreateSubscriptionRequest},
    },
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
    },
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionBody {
    pub plan_id: Uuid,
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSubscriptionResponse {
    pub subscription: Subscription,
    pub checkout_url: Option<String>,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionOverviewResponse {
    pub subscription: Option<Subscription>,
    pub recent_payments: Vec<Payment>,
    pub available_plans: Vec<Plan>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionBody {
    pub action: String,
    #[serde(default)]
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SubscriptionOverviewResponse>, ApiError> {
    let overview = commands::get_overview(&state.pool, user_id).await?;
    Ok(Json(SubscriptionOverviewResponse {
        subscription: overview.subscription,
        recent_payments: overview.recent_payments,
        available_plans: overview.available_plans,
    }))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<CreateSubscriptionBody>,
) -> Result<(StatusCode, Json<CreateSubscriptionResponse>), ApiError> {
    let created = commands::create_subscription(
        &state.pool,
        &state.gateway,
        CreateSubscriptionRequest {
            user_id,
            plan_id: body.plan_id,
            return_url: body.return_url,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSubscriptionResponse {
            subscription: created.subscription,
            checkout_url: created.checkout_url,
            continuation_token: created.continuation_token,
        }),
    ))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpdateSubscriptionBody>,
) -> Result<Json<PortalResponse>, ApiError> {
    if body.action != "portal" {
        return Err(
            BillingError::Validation(format!("unsupported action: {}", body.action)).into(),
        );
    }

    let session =
        commands::open_portal(&state.pool, &state.gateway, user_id, body.return_url).await?;
    Ok(Json(PortalResponse { url: session.url }))
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    commands::delete_incomplete(&state.pool, user_id).await?;
    Ok(Json(serde_json::json!({"status": "deleted"})))
}
