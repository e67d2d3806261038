//! # Gatehouse Axum Integration
//!
//! Ready-to-use Axum routes for the Gatehouse authentication framework:
//! registration, login with optional two-factor authentication, email
//! verification, password reset, magic links, settings, and role-gated admin
//! endpoints.
//!
//! Every flow endpoint answers with one JSON shape: `{"success": "..."}`
//! for the happy and informative terminal states, `{"error": "..."}` for the
//! unhappy ones, or `{"twoFactor": true}` when a login needs a code.
//! Sessions are stateless JWTs delivered both as an `HttpOnly` cookie and in
//! the body-adjacent `Set-Cookie` header; requests may authenticate with the
//! cookie or an `Authorization: Bearer` header.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::Router;
//! use gatehouse::{AuthConfig, Gatehouse, JwtConfig, NullMailer, SqliteRepositoryProvider};
//! use gatehouse_axum::{CookieConfig, routes};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = sqlx::SqlitePool::connect("sqlite://auth.db").await.unwrap();
//!     let repositories = Arc::new(SqliteRepositoryProvider::new(pool));
//!     let gatehouse = Arc::new(Gatehouse::new(
//!         repositories,
//!         Arc::new(NullMailer),
//!         JwtConfig::new(b"change-me".to_vec()),
//!         AuthConfig::default(),
//!     ));
//!     gatehouse.migrate().await.unwrap();
//!
//!     let auth_routes = routes(gatehouse)
//!         .with_cookie_config(CookieConfig::development())
//!         .build();
//!     let app = Router::new().nest("/auth", auth_routes);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod error;
mod extractors;
mod middleware;
mod routes;
mod types;

pub use error::{ApiError, Result};
pub use extractors::{AdminClaims, AuthClaims, OptionalAuthClaims, SessionTokenFromRequest};
pub use middleware::{AuthState, auth_middleware, require_auth};
pub use routes::create_router;
pub use types::{
    ConnectionInfo, CookieConfig, CookieSameSite, FlowResponse, HealthResponse, LoginRequest,
    MagicLinkRequest, NewPasswordRequest, PasswordResetRequest, RegisterRequest, SessionResponse,
    SettingsRequest, VerifyEmailRequest, VerifyMagicLinkRequest,
};

use std::sync::Arc;

use axum::Router;
use gatehouse::{Gatehouse, RepositoryProvider};

/// Create authentication routes ready to nest into an application router.
pub fn routes<R>(gatehouse: Arc<Gatehouse<R>>) -> AuthRouterBuilder<R>
where
    R: RepositoryProvider + 'static,
{
    AuthRouterBuilder {
        gatehouse,
        cookie_config: CookieConfig::default(),
    }
}

/// Builder for configuring authentication routes.
pub struct AuthRouterBuilder<R: RepositoryProvider> {
    gatehouse: Arc<Gatehouse<R>>,
    cookie_config: CookieConfig,
}

impl<R: RepositoryProvider + 'static> AuthRouterBuilder<R> {
    pub fn with_cookie_config(mut self, config: CookieConfig) -> Self {
        self.cookie_config = config;
        self
    }

    pub fn build(self) -> Router {
        create_router(self.gatehouse, self.cookie_config)
    }
}

impl<R: RepositoryProvider + 'static> From<AuthRouterBuilder<R>> for Router {
    fn from(builder: AuthRouterBuilder<R>) -> Self {
        builder.build()
    }
}
