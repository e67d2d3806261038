//! User repository trait

use async_trait::async_trait;

use crate::{
    Error,
    flows::settings::Changeset,
    token::{AuthToken, NewToken},
    user::{NewUser, User, UserId},
};

/// Everything the login flow needs to decide, fetched in one read.
#[derive(Debug, Clone)]
pub struct LoginAuthData {
    pub user: User,
    /// Unexpired email-verification token for this email, if any.
    pub active_verification_token: Option<AuthToken>,
    /// Unexpired two-factor token for this email, if any.
    pub active_two_factor_token: Option<AuthToken>,
    /// Whether a two-factor confirmation is currently on file.
    pub has_two_factor_confirmation: bool,
    pub oauth_account_count: i64,
}

/// Everything the password-reset request flow needs in one read.
#[derive(Debug, Clone)]
pub struct ResetPasswordData {
    pub user_id: UserId,
    pub has_password: bool,
    pub oauth_account_count: i64,
    /// Unexpired reset token already issued for this email, if any.
    pub active_reset_token: Option<AuthToken>,
}

/// Everything the settings flow needs in one read.
#[derive(Debug, Clone)]
pub struct SettingsData {
    pub user: User,
    /// Whether the account is backed by at least one OAuth link. OAuth
    /// accounts cannot change email, password, or two-factor settings here.
    pub is_oauth: bool,
}

/// Storage operations on user accounts, including the transactional
/// composites that pair a user mutation with token consumption.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn create(&self, user: NewUser) -> Result<User, Error>;

    /// Create a credentials account and its first verification token in one
    /// transaction, so an account never exists without a way to verify it.
    async fn create_credentials_user(
        &self,
        user: NewUser,
        verification: NewToken,
    ) -> Result<(User, AuthToken), Error>;

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    /// Accounts registered from the given hashed IP.
    async fn count_by_registration_ip(&self, hashed_ip: &str) -> Result<i64, Error>;

    /// Stamp the user verified, set the (possibly new) email, and delete the
    /// verification token, all in one transaction.
    async fn mark_email_verified(
        &self,
        user_id: &UserId,
        email: &str,
        token_id: &str,
    ) -> Result<User, Error>;

    /// Replace the password hash and delete the reset token in one
    /// transaction.
    async fn reset_password(
        &self,
        user_id: &UserId,
        password_hash: &str,
        token_id: &str,
    ) -> Result<(), Error>;

    /// Consume a magic-link token: delete it, find or create the user for
    /// `email`, and stamp the email verified, all in one transaction.
    async fn consume_magic_link(&self, email: &str, token_id: &str) -> Result<User, Error>;

    /// Apply a settings changeset and return the updated user.
    async fn apply_settings(&self, user_id: &UserId, changes: &Changeset) -> Result<User, Error>;

    /// Composite read for the login flow. `None` when no account exists.
    async fn login_auth_data(&self, email: &str) -> Result<Option<LoginAuthData>, Error>;

    /// Composite read for the password-reset request flow.
    async fn reset_password_data(&self, email: &str) -> Result<Option<ResetPasswordData>, Error>;

    /// Composite read for the settings flow.
    async fn settings_data(&self, user_id: &UserId) -> Result<Option<SettingsData>, Error>;

    async fn delete(&self, id: &UserId) -> Result<(), Error>;
}
