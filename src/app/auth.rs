use crate::state::AppState;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct AuthErrorResponse {
    error: &'static str,
}

/// Guards the service routes with `Authorization: Bearer <token>`. Without a
/// configured token the routes stay closed.
pub(crate) async fn service_token_middleware<S, P>(
    State(state): State<AppState<S, P>>,
    req: Request<Body>,
    next: Next,
) -> Response
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    let expected = match state.dispatch_token.as_deref() {
        Some(expected) => expected,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(AuthErrorResponse {
                    error: "service token not configured",
                }),
            )
                .into_response();
        }
    };

    if bearer_token(req.headers()).is_some_and(|token| token == expected) {
        return next.run(req).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(AuthErrorResponse {
            error: "unauthorized",
        }),
    )
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim())
}
