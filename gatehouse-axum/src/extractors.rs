use std::net::{IpAddr, SocketAddr};

use axum::{
    Extension, RequestPartsExt,
    extract::{ConnectInfo, FromRequestParts},
    http::{StatusCode, request::Parts},
};
use axum_extra::{TypedHeader, extract::CookieJar, headers::UserAgent};

use gatehouse::SessionClaims;

use crate::{error::ApiError, types::ConnectionInfo};

const COOKIE_NAME: &str = "session_token";

impl<S> FromRequestParts<S> for ConnectionInfo
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .extract::<Option<TypedHeader<UserAgent>>>()
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid user agent header"))?
            .map(|ua| ua.to_string());

        // Behind a proxy the peer address is the proxy's; the client is the
        // first entry of X-Forwarded-For.
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|header| header.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|entry| entry.trim().parse::<IpAddr>().ok());

        let ip = match forwarded {
            Some(ip) => Some(ip),
            None => parts
                .extract::<ConnectInfo<SocketAddr>>()
                .await
                .ok()
                .map(|addr| addr.ip()),
        };

        Ok(ConnectionInfo { ip, user_agent })
    }
}

/// Claims of the authenticated caller. Rejects when the auth middleware
/// found no valid session.
pub struct AuthClaims(pub SessionClaims);

impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Extension(claims): Extension<SessionClaims> = parts
            .extract()
            .await
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthClaims(claims))
    }
}

pub struct OptionalAuthClaims(pub Option<SessionClaims>);

impl<S> FromRequestParts<S> for OptionalAuthClaims
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<SessionClaims>().cloned();

        Ok(OptionalAuthClaims(claims))
    }
}

/// Claims of an authenticated admin. Rejects with 403 for any other role.
pub struct AdminClaims(pub SessionClaims);

impl<S> FromRequestParts<S> for AdminClaims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthClaims(claims) = AuthClaims::from_request_parts(parts, state).await?;

        if !claims.role.is_admin() {
            return Err(ApiError::Forbidden);
        }

        Ok(AdminClaims(claims))
    }
}

/// The raw session token, from the `Authorization: Bearer` header first,
/// falling back to the session cookie.
pub struct SessionTokenFromRequest(pub Option<String>);

impl<S> FromRequestParts<S> for SessionTokenFromRequest
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(token) = parts
            .headers
            .get("Authorization")
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
        {
            return Ok(SessionTokenFromRequest(Some(token.to_string())));
        }

        let jar = parts
            .extract::<CookieJar>()
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid cookie header"))?;

        let token = jar.get(COOKIE_NAME).map(|cookie| cookie.value().to_string());

        Ok(SessionTokenFromRequest(token))
    }
}
