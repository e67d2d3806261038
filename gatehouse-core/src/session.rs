//! Stateless session tokens
//!
//! A successful flow ends with an [`IssuedSession`]: a signed JWT carrying
//! the claims every request needs, plus the redirect target the caller should
//! navigate to. Claims are re-derived from the user row at issue and refresh
//! time, so role or two-factor changes take effect on the next refresh.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::{CryptoError, SessionError},
    user::{Role, User},
};

/// Claims embedded in a session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User ID.
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub two_factor_enabled: bool,
    /// Whether the session was established through an OAuth provider.
    pub is_oauth: bool,
    pub email_verified: bool,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl SessionClaims {
    fn from_user(user: &User, is_oauth: bool, ttl: Duration, issuer: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            sub: user.id.as_str().to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            two_factor_enabled: user.two_factor_enabled,
            is_oauth,
            email_verified: user.is_email_verified(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: issuer,
        }
    }
}

/// The result of a successful sign-in: a session token and where to go next.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedSession {
    pub token: String,
    pub redirect_to: String,
}

#[async_trait]
pub trait SessionIssuer: Send + Sync {
    /// Issue a session for a freshly authenticated user.
    async fn issue(
        &self,
        user: &User,
        is_oauth: bool,
        redirect_to: &str,
    ) -> Result<IssuedSession, Error>;

    /// Re-sign a session with claims rebuilt from the current user row.
    async fn refresh(&self, user: &User, is_oauth: bool) -> Result<String, Error>;

    /// Verify a session token and return its claims.
    async fn verify(&self, token: &str) -> Result<SessionClaims, Error>;
}

/// Configuration for JWT-backed sessions.
#[derive(Clone)]
pub struct JwtConfig {
    secret: Vec<u8>,
    ttl: Duration,
    issuer: Option<String>,
}

impl JwtConfig {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::days(30),
            issuer: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// HS256 JWT session issuer.
pub struct JwtSessionIssuer {
    config: JwtConfig,
}

impl JwtSessionIssuer {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String, Error> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&self.config.secret),
        )
        .map_err(|e| Error::Crypto(CryptoError::JwtSigning(e.to_string())))
    }
}

#[async_trait]
impl SessionIssuer for JwtSessionIssuer {
    async fn issue(
        &self,
        user: &User,
        is_oauth: bool,
        redirect_to: &str,
    ) -> Result<IssuedSession, Error> {
        let claims = SessionClaims::from_user(
            user,
            is_oauth,
            self.config.ttl,
            self.config.issuer.clone(),
        );
        Ok(IssuedSession {
            token: self.sign(&claims)?,
            redirect_to: redirect_to.to_string(),
        })
    }

    async fn refresh(&self, user: &User, is_oauth: bool) -> Result<String, Error> {
        let claims = SessionClaims::from_user(
            user,
            is_oauth,
            self.config.ttl,
            self.config.issuer.clone(),
        );
        self.sign(&claims)
    }

    async fn verify(&self, token: &str) -> Result<SessionClaims, Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(&self.config.secret),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                Error::Session(SessionError::Expired)
            }
            _ => Error::Session(SessionError::InvalidToken(e.to_string())),
        })?;

        Ok(data.claims)
    }
}

/// Resolve the post-login redirect target.
///
/// A requested URL is honored only when it appears on the allow-list;
/// anything else (including no request) resolves to the default. This keeps
/// login links from being used as open redirectors.
pub fn validate_callback_url(requested: Option<&str>, allowed: &[String], default: &str) -> String {
    match requested {
        Some(url) if allowed.iter().any(|a| a == url) => url.to_string(),
        _ => default.to_string(),
    }
}
