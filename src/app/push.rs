use crate::ports::{NotificationStore, PushSender};
use crate::push::delivery::DeliveryOutcome;
use crate::push::jwt;
use crate::push::payload::PushPayload;
use crate::state::{AppState, PushServices};
use crate::types::push::{DispatchSummary, Subscription};

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

const NOT_CONFIGURED: &str = "Push notifications are not configured.";

#[derive(Serialize)]
pub(crate) struct PublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub(crate) public_key: String,
}

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn services<S, P>(state: &AppState<S, P>) -> Result<&PushServices<S, P>, ApiError> {
    state
        .push
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, NOT_CONFIGURED))
}

pub(crate) async fn push_public_key<S, P>(
    State(state): State<AppState<S, P>>,
) -> Result<Json<PublicKeyResponse>, ApiError> {
    let public_key = state
        .public_key
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, NOT_CONFIGURED))?;
    Ok(Json(PublicKeyResponse { public_key }))
}

pub(crate) async fn push_dispatch<S, P>(
    State(state): State<AppState<S, P>>,
) -> Result<Json<DispatchSummary>, ApiError>
where
    S: NotificationStore,
    P: PushSender,
{
    let push = services(&state)?;
    match push.dispatcher.dispatch().await {
        Ok(summary) => Ok(Json(summary)),
        Err(err) => {
            tracing::error!(error = %err, "dispatch pass failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}

/// `PushSubscription.toJSON()` keys as sent by browsers.
#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionKeys {
    pub(crate) p256dh: String,
    pub(crate) auth: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionRequest {
    pub(crate) user_id: Uuid,
    pub(crate) endpoint: String,
    pub(crate) keys: SubscriptionKeys,
}

impl SubscriptionRequest {
    fn into_subscription(self) -> Result<Subscription, ApiError> {
        let endpoint = self.endpoint.trim();
        let p256dh = self.keys.p256dh.trim();
        let auth = self.keys.auth.trim();
        if endpoint.is_empty() || p256dh.is_empty() || auth.is_empty() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "endpoint, p256dh, and auth are required.",
            ));
        }
        if jwt::audience_for(endpoint).is_err() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "endpoint must be an absolute URL.",
            ));
        }
        Ok(Subscription {
            user_id: self.user_id,
            endpoint: endpoint.to_string(),
            p256dh: p256dh.to_string(),
            auth: auth.to_string(),
        })
    }
}

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    pub(crate) status: &'static str,
}

pub(crate) async fn subscription_upsert<S, P>(
    State(state): State<AppState<S, P>>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<Json<StatusResponse>, ApiError>
where
    S: NotificationStore,
    P: PushSender,
{
    let push = services(&state)?;
    let subscription = request.into_subscription()?;
    push.store
        .upsert_subscription(&subscription)
        .await
        .map_err(|err| {
            tracing::error!(user_id = %subscription.user_id, error = %err, "failed to save subscription");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save subscription.")
        })?;
    Ok(Json(StatusResponse { status: "saved" }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UnsubscribeRequest {
    pub(crate) user_id: Uuid,
    pub(crate) endpoint: String,
}

#[derive(Serialize)]
pub(crate) struct UnsubscribeResponse {
    pub(crate) removed: bool,
}

pub(crate) async fn subscription_delete<S, P>(
    State(state): State<AppState<S, P>>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<UnsubscribeResponse>, ApiError>
where
    S: NotificationStore,
    P: PushSender,
{
    let push = services(&state)?;
    let removed = push
        .store
        .delete_subscription(request.user_id, request.endpoint.trim())
        .await
        .map_err(|err| {
            tracing::error!(user_id = %request.user_id, error = %err, "failed to remove subscription");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to remove subscription.")
        })?;
    Ok(Json(UnsubscribeResponse { removed }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct TestPushRequest {
    pub(crate) endpoint: String,
    pub(crate) keys: SubscriptionKeys,
    pub(crate) title: Option<String>,
    pub(crate) body: Option<String>,
}

pub(crate) async fn push_test<S, P>(
    State(state): State<AppState<S, P>>,
    Json(request): Json<TestPushRequest>,
) -> Result<Json<StatusResponse>, ApiError>
where
    S: NotificationStore,
    P: PushSender,
{
    let push = services(&state)?;
    let subscription = SubscriptionRequest {
        user_id: Uuid::nil(),
        endpoint: request.endpoint,
        keys: request.keys,
    }
    .into_subscription()?;

    let payload = PushPayload {
        title: request
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| "Notificação de teste".to_string()),
        body: request
            .body
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| "As notificações estão funcionando!".to_string()),
        tag: "test".to_string(),
        icon: state.icon.clone(),
        badge: state.badge.clone(),
        url: "/".to_string(),
    };

    match push.sender.send(&subscription, &payload).await {
        DeliveryOutcome::Delivered => Ok(Json(StatusResponse { status: "sent" })),
        DeliveryOutcome::Gone => Err(api_error(
            StatusCode::GONE,
            "The push service no longer accepts this subscription.",
        )),
        DeliveryOutcome::Failed(reason) => {
            tracing::warn!(reason = %reason, "test notification failed");
            Err(api_error(
                StatusCode::BAD_GATEWAY,
                "Failed to send test notification.",
            ))
        }
    }
}
