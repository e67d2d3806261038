use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use gatehouse::{Gatehouse, RepositoryProvider};

use crate::error::ApiError;

pub struct AuthState<R: RepositoryProvider> {
    pub gatehouse: Arc<Gatehouse<R>>,
}

impl<R: RepositoryProvider> Clone for AuthState<R> {
    fn clone(&self) -> Self {
        Self {
            gatehouse: self.gatehouse.clone(),
        }
    }
}

const COOKIE_NAME: &str = "session_token";

/// Verify the session token, if any, and stash its claims in the request
/// extensions. Never rejects; handlers decide whether auth is required.
pub async fn auth_middleware<R>(
    State(state): State<AuthState<R>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response
where
    R: RepositoryProvider,
{
    let token = extract_bearer_token(&request)
        .or_else(|| jar.get(COOKIE_NAME).map(|cookie| cookie.value().to_string()));

    if let Some(token) = token {
        match state.gatehouse.verify_session(&token).await {
            Ok(claims) => {
                request.extensions_mut().insert(claims);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Invalid session token");
            }
        }
    }

    next.run(request).await
}

/// Reject outright unless the request carries a valid session token.
pub async fn require_auth<R>(
    State(state): State<AuthState<R>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    let token = extract_bearer_token(&request)
        .or_else(|| jar.get(COOKIE_NAME).map(|cookie| cookie.value().to_string()))
        .ok_or(ApiError::Unauthorized)?;

    state
        .gatehouse
        .verify_session(&token)
        .await
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(next.run(request).await)
}

fn extract_bearer_token(request: &Request) -> Option<String> {
    request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}
