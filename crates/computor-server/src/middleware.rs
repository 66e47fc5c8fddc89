//! Per-request `request_id` span, generated or propagated from
//! `X-Request-Id`, and the bearer-token authentication middleware that
//! builds a cached [`Principal`] per request.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::Instrument;
use uuid::Uuid;

use computor_auth::principal::credential_cache_key;
use computor_core::{ApiError, Principal};

use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn request_id_span(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.headers_mut().insert(
        REQUEST_ID_HEADER,
        HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
    );

    let span = tracing::info_span!("request", request_id = %request_id, method = %request.method(), path = %request.uri().path());
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// The caller's built [`Principal`], inserted by [`auth_middleware`] and
/// pulled out of request extensions by any handler that needs it.
#[derive(Clone)]
pub struct CurrentPrincipal(pub Arc<Principal>);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentPrincipal>()
            .cloned()
            .ok_or_else(|| ApiError::authentication("missing authentication context"))
    }
}

const BEARER_PREFIX: &str = "Bearer ";

/// Resolves the `Authorization: Bearer` token to a cached or freshly
/// built [`Principal`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::authentication("missing Authorization header"))?;
    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or_else(|| ApiError::authentication("Authorization header is not a Bearer token"))?;

    let cache_key = credential_cache_key(token);
    let principal = match state.principal_cache.get(&cache_key) {
        Some(principal) => principal,
        None => {
            let user_id = state.sessions.validate_access(token).await?;
            let principal = state.principals.build(user_id).await?;
            state.principal_cache.put(cache_key, principal.clone());
            principal
        }
    };

    request.extensions_mut().insert(CurrentPrincipal(Arc::new(principal)));
    Ok(next.run(request).await.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_stripped() {
        assert_eq!("Bearer abc".strip_prefix(BEARER_PREFIX), Some("abc"));
    }
}
