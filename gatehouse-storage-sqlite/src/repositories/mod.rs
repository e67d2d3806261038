//! Repository implementations for SQLite storage

pub mod oauth;
pub mod token;
pub mod user;

pub use oauth::SqliteOAuthRepository;
pub use token::SqliteTokenRepository;
pub use user::SqliteUserRepository;

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

use gatehouse_core::{
    Error,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::{
        OAuthRepositoryProvider, RepositoryProvider, TokenRepositoryProvider,
        UserRepositoryProvider,
    },
};

/// Repository provider implementation for SQLite
///
/// Implements the individual repository provider traits as well as the
/// unified `RepositoryProvider` trait with embedded migrations.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    user: Arc<SqliteUserRepository>,
    token: Arc<SqliteTokenRepository>,
    oauth: Arc<SqliteOAuthRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let user = Arc::new(SqliteUserRepository::new(pool.clone()));
        let token = Arc::new(SqliteTokenRepository::new(pool.clone()));
        let oauth = Arc::new(SqliteOAuthRepository::new(pool.clone()));

        Self {
            pool,
            user,
            token,
            oauth,
        }
    }
}

impl UserRepositoryProvider for SqliteRepositoryProvider {
    type UserRepo = SqliteUserRepository;

    fn user(&self) -> &Self::UserRepo {
        &self.user
    }
}

impl TokenRepositoryProvider for SqliteRepositoryProvider {
    type TokenRepo = SqliteTokenRepository;

    fn token(&self) -> &Self::TokenRepo {
        &self.token
    }
}

impl OAuthRepositoryProvider for SqliteRepositoryProvider {
    type OAuthRepo = SqliteOAuthRepository;

    fn oauth(&self) -> &Self::OAuthRepo {
        &self.oauth
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                Error::Storage(StorageError::Migration(e.to_string()))
            })
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_db_err()?;
        Ok(())
    }
}
