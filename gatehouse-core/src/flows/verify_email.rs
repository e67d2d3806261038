//! Email verification flow
//!
//! Redeems the tokens minted at registration, during login for unverified
//! accounts, and by the settings flow for email changes. An email-change
//! token swaps the account's address in the same transaction that stamps it
//! verified.

use std::sync::Arc;

use crate::{
    Error,
    config::AuthConfig,
    mailer::Mailer,
    repositories::{TokenRepository, UserRepository},
    token::{AuthToken, NewToken, TokenPurpose},
    validation::validate_token_format,
};

/// Terminal states of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyEmailOutcome {
    EmailVerified,
    /// The owner verified some other way first; the stale token is removed.
    EmailAlreadyVerified,
    /// Unknown token. Also covers a token whose owning account is gone.
    TokenNotFound,
    /// The token had expired; a replacement was issued and mailed.
    TokenExpiredNewEmailSent,
    /// The token had expired and the replacement mail failed; the
    /// replacement was rolled back so the caller can retry cleanly.
    ResendFailed,
    InvalidToken,
}

pub struct EmailVerificationService<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    users: Arc<U>,
    tokens: Arc<T>,
    mailer: Arc<dyn Mailer>,
    config: AuthConfig,
}

impl<U, T> EmailVerificationService<U, T>
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

    pub async fn verify(&self, token_value: &str) -> Result<VerifyEmailOutcome, Error> {
        if validate_token_format(token_value).is_err() {
            return Ok(VerifyEmailOutcome::InvalidToken);
        }

        let Some((token, user)) = self
            .tokens
            .find_with_user(TokenPurpose::EmailVerification, token_value)
            .await?
        else {
            return Ok(VerifyEmailOutcome::TokenNotFound);
        };

        // An email-change token belongs to an already-verified account; only
        // an initial verification can be stale this way.
        if !token.is_email_change() && user.is_email_verified() {
            self.tokens.delete(&token.id).await?;
            return Ok(VerifyEmailOutcome::EmailAlreadyVerified);
        }

        if token.is_expired() {
            return self.reissue(&token).await;
        }

        self.users
            .mark_email_verified(&user.id, &token.email, &token.id)
            .await?;
        Ok(VerifyEmailOutcome::EmailVerified)
    }

    /// Replace an expired token and mail the new one. `issue` removes the
    /// expired row as a side effect of the single-active-token rule.
    async fn reissue(&self, expired: &AuthToken) -> Result<VerifyEmailOutcome, Error> {
        let new_token = match &expired.requested_by {
            Some(requested_by) => {
                NewToken::email_change(&expired.email, requested_by, self.config.token_ttl)
            }
            None => NewToken::email_verification(&expired.email, self.config.token_ttl),
        };
        let token = self.tokens.issue(new_token).await?;

        let body = format!("Confirm your email address with this code: {}", token.token);
        if let Err(e) = self
            .mailer
            .send(&token.email, "Confirm your email", &body)
            .await
        {
            tracing::warn!(error = %e, "Failed to send replacement verification email");
            self.tokens.delete(&token.id).await?;
            return Ok(VerifyEmailOutcome::ResendFailed);
        }

        Ok(VerifyEmailOutcome::TokenExpiredNewEmailSent)
    }
}
