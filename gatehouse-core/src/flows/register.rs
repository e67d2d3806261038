//! Registration flow

use std::net::IpAddr;
use std::sync::Arc;

use crate::{
    Error,
    config::AuthConfig,
    error::AuthError,
    guard::AbuseGuard,
    mailer::Mailer,
    password::hash_password,
    repositories::{TokenRepository, UserRepository},
    token::NewToken,
    user::NewUser,
    validation::{normalize_email, validate_email, validate_name, validate_password},
};

/// Terminal states of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The account exists. `email_sent: false` means the verification mail
    /// failed and its token was discarded; the user can request another from
    /// the login flow.
    Success { email_sent: bool },
    EmailExists,
    /// Too many accounts registered from this address.
    AccountLimit,
    /// The requester's address could not be established.
    IpValidationFailed,
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub ip: Option<IpAddr>,
}

pub struct RegistrationService<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    users: Arc<U>,
    tokens: Arc<T>,
    guard: AbuseGuard<U, T>,
    mailer: Arc<dyn Mailer>,
    config: AuthConfig,
}

impl<U, T> RegistrationService<U, T>
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
        let guard = AbuseGuard::new(users.clone(), tokens.clone(), config.clone());
        Self {
            users,
            tokens,
            guard,
            mailer,
            config,
        }
    }

    /// Register a credentials account and dispatch its verification email.
    ///
    /// The account and its first verification token are created in one
    /// transaction. A mail failure after that point discards the token but
    /// keeps the account; it is reported in the outcome, not rolled back.
    pub async fn register(&self, input: RegisterInput) -> Result<RegisterOutcome, Error> {
        if let Err(e) = validate_email(&input.email)
            .and_then(|_| validate_password(&input.password))
            .and_then(|_| validate_name(input.name.as_deref()))
        {
            return Ok(RegisterOutcome::InvalidInput(e.to_string()));
        }

        let Some(hashed_ip) = self.guard.resolve_ip(input.ip) else {
            return Ok(RegisterOutcome::IpValidationFailed);
        };

        if !self.guard.registration_allowed(&hashed_ip).await? {
            return Ok(RegisterOutcome::AccountLimit);
        }

        let email = normalize_email(&input.email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Ok(RegisterOutcome::EmailExists);
        }

        let password_hash = hash_password(&input.password)?;
        let new_user = NewUser::new(email.clone())
            .with_name(input.name)
            .with_password_hash(password_hash)
            .with_registration_ip_hash(Some(hashed_ip));
        let verification = NewToken::email_verification(&email, self.config.token_ttl);

        let (_user, token) = match self.users.create_credentials_user(new_user, verification).await
        {
            Ok(created) => created,
            // Lost a race on the unique email constraint
            Err(Error::Auth(AuthError::UserAlreadyExists)) => {
                return Ok(RegisterOutcome::EmailExists);
            }
            Err(e) => return Err(e),
        };

        let body = format!(
            "Welcome! Confirm your email address with this code: {}",
            token.token
        );
        if let Err(e) = self.mailer.send(&email, "Confirm your email", &body).await {
            tracing::warn!(error = %e, "Failed to send verification email after registration");
            self.tokens.delete(&token.id).await?;
            return Ok(RegisterOutcome::Success { email_sent: false });
        }

        Ok(RegisterOutcome::Success { email_sent: true })
    }
}
