//! Repository traits for the data access layer
//!
//! Flows talk to storage through these traits only. Multi-step writes that
//! must be atomic (consume a token and apply the mutation it authorizes) are
//! single repository methods, so a backend can wrap them in one transaction
//! and a flow can never hold a half-applied state.
//!
//! # Trait hierarchy
//!
//! - Individual `*Repository` traits define the operations per data domain
//! - Individual `*RepositoryProvider` traits expose each repository
//! - [`RepositoryProvider`] is a supertrait combining the providers plus
//!   lifecycle methods (migrations, health check)

pub mod adapter;
pub mod oauth;
pub mod token;
pub mod user;

pub use adapter::{OAuthRepositoryAdapter, TokenRepositoryAdapter, UserRepositoryAdapter};
pub use oauth::OAuthRepository;
pub use token::TokenRepository;
pub use user::{LoginAuthData, ResetPasswordData, SettingsData, UserRepository};

use async_trait::async_trait;

use crate::Error;

/// Provider trait for user repository access.
pub trait UserRepositoryProvider: Send + Sync + 'static {
    /// The user repository implementation type
    type UserRepo: UserRepository;

    /// Get the user repository
    fn user(&self) -> &Self::UserRepo;
}

/// Provider trait for token repository access.
pub trait TokenRepositoryProvider: Send + Sync + 'static {
    /// The token repository implementation type
    type TokenRepo: TokenRepository;

    /// Get the token repository
    fn token(&self) -> &Self::TokenRepo;
}

/// Provider trait for OAuth repository access.
pub trait OAuthRepositoryProvider: Send + Sync + 'static {
    /// The OAuth repository implementation type
    type OAuthRepo: OAuthRepository;

    /// Get the OAuth repository
    fn oauth(&self) -> &Self::OAuthRepo;
}

/// Provider trait that storage implementations implement to expose all
/// repositories.
///
/// To implement a custom storage backend:
/// 1. Implement each individual `*Repository` trait
/// 2. Implement each individual `*RepositoryProvider` trait
/// 3. Implement `RepositoryProvider` with `migrate()` and `health_check()`
#[async_trait]
pub trait RepositoryProvider:
    UserRepositoryProvider + TokenRepositoryProvider + OAuthRepositoryProvider
{
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
