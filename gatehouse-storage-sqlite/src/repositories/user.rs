use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use gatehouse_core::{
    Error, User, UserId,
    error::{AuthError, StorageError, utilities::DatabaseResultExt},
    flows::settings::Changeset,
    repositories::{LoginAuthData, ResetPasswordData, SettingsData, UserRepository},
    token::{AuthToken, NewToken, TokenPurpose},
    user::NewUser,
};

use crate::{SqliteAuthToken, SqliteUser};

use super::token::{delete_token_tx, replace_token_tx};

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_user_insert_err(e: sqlx::Error) -> Error {
    if e.as_database_error()
        .is_some_and(|d| d.is_unique_violation())
    {
        Error::Auth(AuthError::UserAlreadyExists)
    } else {
        Error::Storage(StorageError::Database(e.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct LoginAuthRow {
    #[sqlx(flatten)]
    user: SqliteUser,
    oauth_account_count: i64,
    has_two_factor_confirmation: bool,
}

#[derive(sqlx::FromRow)]
struct ResetPasswordRow {
    user_id: String,
    has_password: bool,
    oauth_account_count: i64,
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    #[sqlx(flatten)]
    user: SqliteUser,
    is_oauth: bool,
}

const INSERT_USER: &str = r#"
    INSERT INTO users (
        id, email, name, password_hash, email_verified_at, role,
        two_factor_enabled, registration_ip_hash, image, created_at, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, 'USER', 0, ?6, ?7, ?8, ?8)
    RETURNING *
"#;

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let now = Utc::now().timestamp();

        let sqlite_user = sqlx::query_as::<_, SqliteUser>(INSERT_USER)
            .bind(user.id.as_str())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.email_verified_at.map(|dt| dt.timestamp()))
            .bind(&user.registration_ip_hash)
            .bind(&user.image)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_user_insert_err)?;

        Ok(sqlite_user.into())
    }

    async fn create_credentials_user(
        &self,
        user: NewUser,
        verification: NewToken,
    ) -> Result<(User, AuthToken), Error> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_db_err()?;

        let sqlite_user = sqlx::query_as::<_, SqliteUser>(INSERT_USER)
            .bind(user.id.as_str())
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .bind(user.email_verified_at.map(|dt| dt.timestamp()))
            .bind(&user.registration_ip_hash)
            .bind(&user.image)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_user_insert_err)?;

        let token = verification.into_token();
        replace_token_tx(&mut tx, &token).await?;

        tx.commit().await.map_db_err()?;
        Ok((sqlite_user.into(), token))
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        let sqlite_user = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_db_err()?;

        Ok(sqlite_user.map(|u| u.into()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let sqlite_user = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_db_err()?;

        Ok(sqlite_user.map(|u| u.into()))
    }

    async fn count_by_registration_ip(&self, hashed_ip: &str) -> Result<i64, Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE registration_ip_hash = ?1",
        )
        .bind(hashed_ip)
        .fetch_one(&self.pool)
        .await
        .map_db_err()?;

        Ok(count)
    }

    async fn mark_email_verified(
        &self,
        user_id: &UserId,
        email: &str,
        token_id: &str,
    ) -> Result<User, Error> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_db_err()?;

        let sqlite_user = sqlx::query_as::<_, SqliteUser>(
            r#"
            UPDATE users
            SET email = ?2,
                email_verified_at = COALESCE(email_verified_at, ?3),
                updated_at = ?3
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(user_id.as_str())
        .bind(email)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_db_err()?;

        delete_token_tx(&mut tx, token_id).await?;

        tx.commit().await.map_db_err()?;
        Ok(sqlite_user.into())
    }

    async fn reset_password(
        &self,
        user_id: &UserId,
        password_hash: &str,
        token_id: &str,
    ) -> Result<(), Error> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_db_err()?;

        let result =
            sqlx::query("UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(user_id.as_str())
                .bind(password_hash)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_db_err()?;
        if result.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound));
        }

        delete_token_tx(&mut tx, token_id).await?;

        tx.commit().await.map_db_err()?;
        Ok(())
    }

    async fn consume_magic_link(&self, email: &str, token_id: &str) -> Result<User, Error> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_db_err()?;

        // The token must still exist inside this transaction; a concurrent
        // redemption loses here instead of minting a second session.
        let deleted = sqlx::query("DELETE FROM auth_tokens WHERE id = ?1")
            .bind(token_id)
            .execute(&mut *tx)
            .await
            .map_db_err()?;
        if deleted.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound));
        }

        let existing = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await
            .map_db_err()?;

        let sqlite_user = match existing {
            Some(user) => {
                sqlx::query_as::<_, SqliteUser>(
                    r#"
                    UPDATE users
                    SET email_verified_at = COALESCE(email_verified_at, ?2), updated_at = ?2
                    WHERE id = ?1
                    RETURNING *
                    "#,
                )
                .bind(&user.id)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_db_err()?
            }
            None => {
                sqlx::query_as::<_, SqliteUser>(INSERT_USER)
                    .bind(UserId::new_random().as_str())
                    .bind(email)
                    .bind(None::<String>)
                    .bind(None::<String>)
                    .bind(Some(now))
                    .bind(None::<String>)
                    .bind(None::<String>)
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_user_insert_err)?
            }
        };

        tx.commit().await.map_db_err()?;
        Ok(sqlite_user.into())
    }

    async fn apply_settings(&self, user_id: &UserId, changes: &Changeset) -> Result<User, Error> {
        let now = Utc::now().timestamp();

        let sqlite_user = sqlx::query_as::<_, SqliteUser>(
            r#"
            UPDATE users
            SET name = COALESCE(?2, name),
                password_hash = COALESCE(?3, password_hash),
                two_factor_enabled = COALESCE(?4, two_factor_enabled),
                image = COALESCE(?5, image),
                updated_at = ?6
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(user_id.as_str())
        .bind(&changes.name)
        .bind(&changes.password_hash)
        .bind(changes.two_factor_enabled)
        .bind(&changes.image)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_db_err()?;

        Ok(sqlite_user.into())
    }

    async fn login_auth_data(&self, email: &str) -> Result<Option<LoginAuthData>, Error> {
        let row = sqlx::query_as::<_, LoginAuthRow>(
            r#"
            SELECT u.*,
                (SELECT COUNT(*) FROM oauth_accounts a WHERE a.user_id = u.id)
                    AS oauth_account_count,
                EXISTS (SELECT 1 FROM two_factor_confirmations c WHERE c.user_id = u.id)
                    AS has_two_factor_confirmation
            FROM users u
            WHERE u.email = ?1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let tokens = sqlx::query_as::<_, SqliteAuthToken>(
            r#"
            SELECT * FROM auth_tokens
            WHERE email = ?1
              AND purpose IN ('email_verification', 'two_factor')
              AND expires_at > ?2
            "#,
        )
        .bind(email)
        .bind(Utc::now().timestamp())
        .fetch_all(&self.pool)
        .await
        .map_db_err()?;

        let mut active_verification_token = None;
        let mut active_two_factor_token = None;
        for token in tokens {
            let token = token.into_token()?;
            match token.purpose {
                TokenPurpose::EmailVerification => active_verification_token = Some(token),
                TokenPurpose::TwoFactor => active_two_factor_token = Some(token),
                _ => {}
            }
        }

        Ok(Some(LoginAuthData {
            user: row.user.into(),
            active_verification_token,
            active_two_factor_token,
            has_two_factor_confirmation: row.has_two_factor_confirmation,
            oauth_account_count: row.oauth_account_count,
        }))
    }

    async fn reset_password_data(&self, email: &str) -> Result<Option<ResetPasswordData>, Error> {
        let row = sqlx::query_as::<_, ResetPasswordRow>(
            r#"
            SELECT u.id AS user_id,
                u.password_hash IS NOT NULL AS has_password,
                (SELECT COUNT(*) FROM oauth_accounts a WHERE a.user_id = u.id)
                    AS oauth_account_count
            FROM users u
            WHERE u.email = ?1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let active_reset_token = sqlx::query_as::<_, SqliteAuthToken>(
            r#"
            SELECT * FROM auth_tokens
            WHERE purpose = 'password_reset' AND email = ?1 AND expires_at > ?2
            "#,
        )
        .bind(email)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?
        .map(|t| t.into_token())
        .transpose()?;

        Ok(Some(ResetPasswordData {
            user_id: UserId::new(&row.user_id),
            has_password: row.has_password,
            oauth_account_count: row.oauth_account_count,
            active_reset_token,
        }))
    }

    async fn settings_data(&self, user_id: &UserId) -> Result<Option<SettingsData>, Error> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT u.*,
                (SELECT COUNT(*) FROM oauth_accounts a WHERE a.user_id = u.id) > 0 AS is_oauth
            FROM users u
            WHERE u.id = ?1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_db_err()?;

        Ok(row.map(|row| SettingsData {
            user: row.user.into(),
            is_oauth: row.is_oauth,
        }))
    }

    async fn delete(&self, id: &UserId) -> Result<(), Error> {
        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err()?;

        Ok(())
    }
}
