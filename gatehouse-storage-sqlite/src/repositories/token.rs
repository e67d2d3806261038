use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};

use gatehouse_core::{
    Error, User, UserId,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::TokenRepository,
    token::{AuthToken, NewToken, TokenPurpose},
};

use crate::{SqliteAuthToken, SqliteUser};

pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Insert a token inside a transaction, removing any prior token for its
/// `(purpose, email)` key first. Shared with the user repository's
/// account-plus-token transaction.
pub(crate) async fn replace_token_tx(
    tx: &mut Transaction<'_, Sqlite>,
    token: &AuthToken,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM auth_tokens WHERE purpose = ?1 AND email = ?2")
        .bind(token.purpose.as_str())
        .bind(&token.email)
        .execute(&mut **tx)
        .await
        .map_db_err()?;

    sqlx::query(
        r#"
        INSERT INTO auth_tokens (
            id, purpose, token, email, user_id, requested_by, hashed_ip,
            expires_at, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&token.id)
    .bind(token.purpose.as_str())
    .bind(&token.token)
    .bind(&token.email)
    .bind(token.user_id.as_ref().map(|id| id.as_str().to_string()))
    .bind(&token.requested_by)
    .bind(&token.hashed_ip)
    .bind(token.expires_at.timestamp())
    .bind(token.created_at.timestamp())
    .execute(&mut **tx)
    .await
    .map_db_err()?;

    Ok(())
}

pub(crate) async fn delete_token_tx(
    tx: &mut Transaction<'_, Sqlite>,
    token_id: &str,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM auth_tokens WHERE id = ?1")
        .bind(token_id)
        .execute(&mut **tx)
        .await
        .map_db_err()?;
    Ok(())
}

#[async_trait]
impl TokenRepository for SqliteTokenRepository {
    async fn issue(&self, token: NewToken) -> Result<AuthToken, Error> {
        let token = token.into_token();
        let mut tx = self.pool.begin().await.map_db_err()?;
        replace_token_tx(&mut tx, &token).await?;
        tx.commit().await.map_db_err()?;
        Ok(token)
    }

    async fn get_active(
        &self,
        purpose: TokenPurpose,
        email: &str,
    ) -> Result<Option<AuthToken>, Error> {
        sqlx::query_as::<_, SqliteAuthToken>(
            r#"
            SELECT * FROM auth_tokens
            WHERE purpose = ?1 AND email = ?2 AND expires_at > ?3
            "#,
        )
        .bind(purpose.as_str())
        .bind(email)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?
        .map(|t| t.into_token())
        .transpose()
    }

    async fn find_valid(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<AuthToken>, Error> {
        sqlx::query_as::<_, SqliteAuthToken>(
            r#"
            SELECT * FROM auth_tokens
            WHERE purpose = ?1 AND token = ?2 AND expires_at > ?3
            "#,
        )
        .bind(purpose.as_str())
        .bind(token)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?
        .map(|t| t.into_token())
        .transpose()
    }

    async fn find_with_user(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<(AuthToken, User)>, Error> {
        let found = sqlx::query_as::<_, SqliteAuthToken>(
            "SELECT * FROM auth_tokens WHERE purpose = ?1 AND token = ?2",
        )
        .bind(purpose.as_str())
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        let Some(found) = found else {
            return Ok(None);
        };
        let found = found.into_token()?;

        // An email-change token is owned by the requesting account, a plain
        // verification token by the account holding the target email.
        let owner_email = found.requested_by.as_deref().unwrap_or(&found.email);
        let owner = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE email = ?1")
            .bind(owner_email)
            .fetch_optional(&self.pool)
            .await
            .map_db_err()?;

        Ok(owner.map(|user| (found, user.into())))
    }

    async fn get_active_email_change_request(
        &self,
        requested_by: &str,
    ) -> Result<Option<AuthToken>, Error> {
        sqlx::query_as::<_, SqliteAuthToken>(
            r#"
            SELECT * FROM auth_tokens
            WHERE purpose = 'email_verification'
              AND requested_by = ?1
              AND expires_at > ?2
            "#,
        )
        .bind(requested_by)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?
        .map(|t| t.into_token())
        .transpose()
    }

    async fn delete(&self, token_id: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM auth_tokens WHERE id = ?1")
            .bind(token_id)
            .execute(&self.pool)
            .await
            .map_db_err()?;
        Ok(())
    }

    async fn delete_expired(&self, purpose: TokenPurpose) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE purpose = ?1 AND expires_at <= ?2")
            .bind(purpose.as_str())
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_db_err()?;

        Ok(result.rows_affected())
    }

    async fn count_active_by_ip(
        &self,
        purpose: TokenPurpose,
        hashed_ip: &str,
    ) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM auth_tokens
            WHERE purpose = ?1 AND hashed_ip = ?2 AND expires_at > ?3
            "#,
        )
        .bind(purpose.as_str())
        .bind(hashed_ip)
        .bind(Utc::now().timestamp())
        .fetch_one(&self.pool)
        .await
        .map_db_err()?;

        Ok(count)
    }

    async fn consume_two_factor(&self, user_id: &UserId, token_id: &str) -> Result<(), Error> {
        let mut tx = self.pool.begin().await.map_db_err()?;

        // The losing side of a double-submit finds the token already gone.
        let deleted = sqlx::query("DELETE FROM auth_tokens WHERE id = ?1")
            .bind(token_id)
            .execute(&mut *tx)
            .await
            .map_db_err()?;
        if deleted.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound));
        }

        sqlx::query(
            r#"
            INSERT INTO two_factor_confirmations (user_id, created_at)
            VALUES (?1, ?2)
            ON CONFLICT (user_id) DO UPDATE SET created_at = excluded.created_at
            "#,
        )
        .bind(user_id.as_str())
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_db_err()?;

        tx.commit().await.map_db_err()?;
        Ok(())
    }

    async fn take_two_factor_confirmation(&self, user_id: &UserId) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM two_factor_confirmations WHERE user_id = ?1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err()?;

        Ok(result.rows_affected() > 0)
    }
}
