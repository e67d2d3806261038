//! SQLite storage backend for gatehouse
//!
//! Implements the `gatehouse-core` repository traits over an
//! `sqlx::SqlitePool`. All timestamps are stored as unix seconds. The
//! multi-step operations the core declares as atomic (consume a token plus
//! the mutation it authorizes) run inside a single transaction here.
//!
//! Migrations are embedded from the `migrations/` directory and applied by
//! [`SqliteRepositoryProvider::migrate`].
//!
//! [`SqliteRepositoryProvider::migrate`]: gatehouse_core::repositories::RepositoryProvider::migrate

mod repositories;

pub use repositories::{
    SqliteOAuthRepository, SqliteRepositoryProvider, SqliteTokenRepository, SqliteUserRepository,
};

use chrono::{DateTime, Utc};
use gatehouse_core::{
    AuthToken, Error, OAuthAccount, Role, TokenPurpose, User, UserId,
    error::utilities::DatabaseResultExt,
};

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default()
}

/// SQLite row shape for users.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SqliteUser {
    id: String,
    email: String,
    name: Option<String>,
    password_hash: Option<String>,
    email_verified_at: Option<i64>,
    role: String,
    two_factor_enabled: bool,
    registration_ip_hash: Option<String>,
    image: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<SqliteUser> for User {
    fn from(user: SqliteUser) -> Self {
        User {
            id: UserId::new(&user.id),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            email_verified_at: user.email_verified_at.map(timestamp_to_datetime),
            role: Role::parse(&user.role).unwrap_or_default(),
            two_factor_enabled: user.two_factor_enabled,
            registration_ip_hash: user.registration_ip_hash,
            image: user.image,
            created_at: timestamp_to_datetime(user.created_at),
            updated_at: timestamp_to_datetime(user.updated_at),
        }
    }
}

/// SQLite row shape for auth tokens.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SqliteAuthToken {
    id: String,
    purpose: String,
    token: String,
    email: String,
    user_id: Option<String>,
    requested_by: Option<String>,
    hashed_ip: Option<String>,
    expires_at: i64,
    created_at: i64,
}

impl SqliteAuthToken {
    fn into_token(self) -> Result<AuthToken, Error> {
        let purpose = TokenPurpose::parse(&self.purpose)
            .map_db_err_with_context(&format!("Corrupt token row {}", self.id))?;
        Ok(AuthToken {
            id: self.id,
            purpose,
            token: self.token,
            email: self.email,
            user_id: self.user_id.map(|id| UserId::new(&id)),
            requested_by: self.requested_by,
            hashed_ip: self.hashed_ip,
            expires_at: timestamp_to_datetime(self.expires_at),
            created_at: timestamp_to_datetime(self.created_at),
        })
    }
}

/// SQLite row shape for OAuth account links.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SqliteOAuthAccount {
    user_id: String,
    provider: String,
    subject: String,
    created_at: i64,
    updated_at: i64,
}

impl From<SqliteOAuthAccount> for OAuthAccount {
    fn from(account: SqliteOAuthAccount) -> Self {
        OAuthAccount {
            user_id: UserId::new(&account.user_id),
            provider: account.provider,
            subject: account.subject,
            created_at: timestamp_to_datetime(account.created_at),
            updated_at: timestamp_to_datetime(account.updated_at),
        }
    }
}
