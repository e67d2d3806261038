//! Password reset flow: request a link, then complete with a new password

use std::sync::Arc;

use crate::{
    Error,
    config::AuthConfig,
    mailer::Mailer,
    password::hash_password,
    repositories::{TokenRepository, UserRepository},
    token::{NewToken, TokenPurpose},
    validation::{normalize_email, validate_email, validate_password, validate_token_format},
};

/// Terminal states of a reset request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetRequestOutcome {
    EmailSent,
    EmailNotFound,
    /// OAuth-only account; there is no password to reset.
    NoPasswordToReset,
    /// An unexpired reset link is already out; no new one is issued.
    TokenStillValid,
    /// The mail failed; the token was discarded so a retry starts clean.
    SendFailed,
    InvalidEmail,
}

/// Terminal states of a reset completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewPasswordOutcome {
    PasswordUpdated,
    /// Unknown and expired tokens are deliberately indistinguishable.
    TokenNotFound,
    MissingToken,
    InvalidInput(String),
}

pub struct PasswordResetService<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    users: Arc<U>,
    tokens: Arc<T>,
    mailer: Arc<dyn Mailer>,
    config: AuthConfig,
}

impl<U, T> PasswordResetService<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    pub fn new(
        users: Arc<U>,
        tokens: Arc<T>,
        mailer: Arc<dyn Mailer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            tokens,
            mailer,
            config,
        }
    }

    pub async fn request(&self, email: &str) -> Result<ResetRequestOutcome, Error> {
        if validate_email(email).is_err() {
            return Ok(ResetRequestOutcome::InvalidEmail);
        }
        let email = normalize_email(email);

        let Some(data) = self.users.reset_password_data(&email).await? else {
            return Ok(ResetRequestOutcome::EmailNotFound);
        };

        if !data.has_password && data.oauth_account_count > 0 {
            return Ok(ResetRequestOutcome::NoPasswordToReset);
        }

        if data.active_reset_token.is_some() {
            return Ok(ResetRequestOutcome::TokenStillValid);
        }

        let token = self
            .tokens
            .issue(NewToken::password_reset(&email, self.config.token_ttl))
            .await?;

        let body = format!("Reset your password with this code: {}", token.token);
        if let Err(e) = self.mailer.send(&email, "Reset your password", &body).await {
            tracing::warn!(error = %e, "Failed to send password reset email");
            self.tokens.delete(&token.id).await?;
            return Ok(ResetRequestOutcome::SendFailed);
        }

        Ok(ResetRequestOutcome::EmailSent)
    }

    pub async fn complete(
        &self,
        token_value: &str,
        new_password: &str,
    ) -> Result<NewPasswordOutcome, Error> {
        if token_value.is_empty() {
            return Ok(NewPasswordOutcome::MissingToken);
        }
        if validate_token_format(token_value).is_err() {
            return Ok(NewPasswordOutcome::TokenNotFound);
        }
        if let Err(e) = validate_password(new_password) {
            return Ok(NewPasswordOutcome::InvalidInput(e.to_string()));
        }

        let Some(token) = self
            .tokens
            .find_valid(TokenPurpose::PasswordReset, token_value)
            .await?
        else {
            return Ok(NewPasswordOutcome::TokenNotFound);
        };

        let Some(user) = self.users.find_by_email(&token.email).await? else {
            // Orphaned token; drop it so it stops resolving.
            self.tokens.delete(&token.id).await?;
            return Ok(NewPasswordOutcome::TokenNotFound);
        };

        let password_hash = hash_password(new_password)?;
        self.users
            .reset_password(&user.id, &password_hash, &token.id)
            .await?;

        Ok(NewPasswordOutcome::PasswordUpdated)
    }
}
