use crate::ports::{NotificationStore, PushSender};
use crate::state;

use axum::Router;
use axum::http::Method;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod auth;
mod push;

pub fn app<S, P>(state: state::AppState<S, P>) -> Router
where
    S: NotificationStore,
    P: PushSender,
{
    let service_routes = Router::new()
        .route("/api/push/dispatch", post(push::push_dispatch::<S, P>))
        .route("/api/push/test", post(push::push_test::<S, P>))
        .route(
            "/api/push/subscriptions",
            post(push::subscription_upsert::<S, P>).delete(push::subscription_delete::<S, P>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::service_token_middleware::<S, P>,
        ));

    Router::new()
        .route("/api/push/public-key", get(push::push_public_key::<S, P>))
        .route("/health", get(health))
        .merge(service_routes)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Any origin may call the API. Callers authenticate with bearer tokens, never cookies.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

pub(crate) async fn health() -> &'static str {
    "ok"
}
