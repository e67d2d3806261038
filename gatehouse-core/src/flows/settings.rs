//! Account settings flow
//!
//! Updates are expressed as a typed diff against the current row: fields
//! equal to their current value are dropped, and an empty diff performs no
//! write at all. An email change never touches the row directly; it issues a
//! verification token for the new address and the swap happens when that
//! token is redeemed.

use std::sync::Arc;

use crate::{
    Error,
    config::AuthConfig,
    mailer::Mailer,
    password::{hash_password, verify_password},
    repositories::{TokenRepository, UserRepository},
    session::SessionIssuer,
    token::{NewToken, TokenPurpose},
    user::{User, UserId},
    validation::{normalize_email, validate_email, validate_name, validate_password},
};

/// Terminal states of a settings update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsOutcome {
    /// Changes persisted; `session_token` carries refreshed claims.
    Updated {
        changed: Vec<&'static str>,
        session_token: String,
    },
    /// Every submitted value matched the current one; nothing was written.
    NoChangesRequired,
    /// No account behind the session.
    Unauthorized,
    IncorrectPassword,
    /// The new password must differ from the current one.
    SamePassword,
    /// The stored hash is legacy; the password must go through reset.
    PasswordNeedsUpdate,
    EmailInUse,
    /// Verification mail for the new address is on its way; the email itself
    /// changes when the link is redeemed.
    VerificationEmailSent,
    /// The target address already holds an active verification token.
    VerificationEmailAlreadySent,
    /// This account already has an email change in flight.
    EmailChangeRequestExists,
    InvalidInput(String),
}

/// Submitted settings form. `None` means "leave as is".
#[derive(Debug, Clone, Default)]
pub struct SettingsInput {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Current password, required to set a new one.
    pub password: Option<String>,
    pub new_password: Option<String>,
    pub two_factor_enabled: Option<bool>,
    pub image: Option<String>,
}

/// The fields a settings update actually changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub two_factor_enabled: Option<bool>,
    pub image: Option<String>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.password_hash.is_none()
            && self.two_factor_enabled.is_none()
            && self.image.is_none()
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.password_hash.is_some() {
            fields.push("password");
        }
        if self.two_factor_enabled.is_some() {
            fields.push("two_factor_enabled");
        }
        if self.image.is_some() {
            fields.push("image");
        }
        fields
    }
}

pub struct SettingsService<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    users: Arc<U>,
    tokens: Arc<T>,
    mailer: Arc<dyn Mailer>,
    issuer: Arc<dyn SessionIssuer>,
    config: AuthConfig,
}

impl<U, T> SettingsService<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    pub fn new(
        users: Arc<U>,
        tokens: Arc<T>,
        mailer: Arc<dyn Mailer>,
        issuer: Arc<dyn SessionIssuer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            tokens,
            mailer,
            issuer,
            config,
        }
    }

    pub async fn update(
        &self,
        user_id: &UserId,
        mut input: SettingsInput,
    ) -> Result<SettingsOutcome, Error> {
        let Some(data) = self.users.settings_data(user_id).await? else {
            return Ok(SettingsOutcome::Unauthorized);
        };
        let user = data.user;

        // Email, password, and two-factor are managed by the provider for
        // OAuth-linked accounts; those fields are dropped, not rejected.
        if data.is_oauth {
            input.email = None;
            input.password = None;
            input.new_password = None;
            input.two_factor_enabled = None;
        }

        if let Some(new_email) = &input.email {
            let new_email = normalize_email(new_email);
            if new_email != user.email {
                return self.request_email_change(&user, &new_email).await;
            }
        }

        let mut changes = Changeset::default();

        if let (Some(password), Some(new_password)) = (&input.password, &input.new_password)
            && let Some(hash) = &user.password_hash
        {
            if let Err(e) = validate_password(new_password) {
                return Ok(SettingsOutcome::InvalidInput(e.to_string()));
            }

            let check = verify_password(password, hash);
            if check.needs_upgrade {
                return Ok(SettingsOutcome::PasswordNeedsUpdate);
            }
            if !check.is_valid {
                return Ok(SettingsOutcome::IncorrectPassword);
            }
            if password == new_password {
                return Ok(SettingsOutcome::SamePassword);
            }

            changes.password_hash = Some(hash_password(new_password)?);
        }

        if let Some(name) = input.name
            && user.name.as_deref() != Some(name.as_str())
        {
            if let Err(e) = validate_name(Some(&name)) {
                return Ok(SettingsOutcome::InvalidInput(e.to_string()));
            }
            changes.name = Some(name);
        }

        if let Some(two_factor_enabled) = input.two_factor_enabled
            && two_factor_enabled != user.two_factor_enabled
        {
            changes.two_factor_enabled = Some(two_factor_enabled);
        }

        if let Some(image) = input.image
            && user.image.as_deref() != Some(image.as_str())
        {
            changes.image = Some(image);
        }

        if changes.is_empty() {
            return Ok(SettingsOutcome::NoChangesRequired);
        }

        let changed = changes.changed_fields();
        let updated = self.users.apply_settings(&user.id, &changes).await?;
        let session_token = self.issuer.refresh(&updated, data.is_oauth).await?;

        Ok(SettingsOutcome::Updated {
            changed,
            session_token,
        })
    }

    async fn request_email_change(
        &self,
        user: &User,
        new_email: &str,
    ) -> Result<SettingsOutcome, Error> {
        if let Err(e) = validate_email(new_email) {
            return Ok(SettingsOutcome::InvalidInput(e.to_string()));
        }

        if self.users.find_by_email(new_email).await?.is_some() {
            return Ok(SettingsOutcome::EmailInUse);
        }

        if self
            .tokens
            .get_active(TokenPurpose::EmailVerification, new_email)
            .await?
            .is_some()
        {
            return Ok(SettingsOutcome::VerificationEmailAlreadySent);
        }

        if self
            .tokens
            .get_active_email_change_request(&user.email)
            .await?
            .is_some()
        {
            return Ok(SettingsOutcome::EmailChangeRequestExists);
        }

        let token = self
            .tokens
            .issue(NewToken::email_change(
                new_email,
                &user.email,
                self.config.token_ttl,
            ))
            .await?;

        let body = format!("Confirm your new email address with this code: {}", token.token);
        if let Err(e) = self.mailer.send(new_email, "Confirm your email", &body).await {
            tracing::error!(error = %e, "Failed to send email change verification");
            self.tokens.delete(&token.id).await?;
            return Err(e.into());
        }

        Ok(SettingsOutcome::VerificationEmailSent)
    }
}
