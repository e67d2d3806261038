use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use gatehouse_core::{
    Error, User, UserId,
    error::{AuthError, StorageError, utilities::DatabaseResultExt},
    repositories::OAuthRepository,
    user::OAuthAccount,
};

use crate::{SqliteOAuthAccount, SqliteUser};

pub struct SqliteOAuthRepository {
    pool: SqlitePool,
}

impl SqliteOAuthRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthRepository for SqliteOAuthRepository {
    async fn link_account(
        &self,
        user_id: &UserId,
        provider: &str,
        subject: &str,
    ) -> Result<OAuthAccount, Error> {
        let now = Utc::now().timestamp();

        let account = sqlx::query_as::<_, SqliteOAuthAccount>(
            r#"
            INSERT INTO oauth_accounts (user_id, provider, subject, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            RETURNING *
            "#,
        )
        .bind(user_id.as_str())
        .bind(provider)
        .bind(subject)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|d| d.is_unique_violation())
            {
                Error::Auth(AuthError::AccountAlreadyLinked)
            } else {
                Error::Storage(StorageError::Database(e.to_string()))
            }
        })?;

        Ok(account.into())
    }

    async fn find_user_by_provider(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<User>, Error> {
        let user = sqlx::query_as::<_, SqliteUser>(
            r#"
            SELECT u.* FROM users u
            JOIN oauth_accounts a ON a.user_id = u.id
            WHERE a.provider = ?1 AND a.subject = ?2
            "#,
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        Ok(user.map(|u| u.into()))
    }

    async fn count_accounts(&self, user_id: &UserId) -> Result<i64, Error> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM oauth_accounts WHERE user_id = ?1")
                .bind(user_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_db_err()?;

        Ok(count)
    }
}
