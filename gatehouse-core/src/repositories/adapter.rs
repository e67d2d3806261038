//! Adapters from a [`RepositoryProvider`] to the individual repository traits
//!
//! Flows are generic over single repository traits; these adapters let one
//! provider back all of them without the flows knowing about the provider.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Error,
    flows::settings::Changeset,
    repositories::{
        LoginAuthData, OAuthRepository, RepositoryProvider, ResetPasswordData, SettingsData,
        TokenRepository, UserRepository,
    },
    token::{AuthToken, NewToken, TokenPurpose},
    user::{NewUser, OAuthAccount, User, UserId},
};

/// Wraps a provider and implements [`UserRepository`] by delegation.
pub struct UserRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> UserRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> UserRepository for UserRepositoryAdapter<R> {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        self.provider.user().create(user).await
    }

    async fn create_credentials_user(
        &self,
        user: NewUser,
        verification: NewToken,
    ) -> Result<(User, AuthToken), Error> {
        self.provider
            .user()
            .create_credentials_user(user, verification)
            .await
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        self.provider.user().find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.provider.user().find_by_email(email).await
    }

    async fn count_by_registration_ip(&self, hashed_ip: &str) -> Result<i64, Error> {
        self.provider.user().count_by_registration_ip(hashed_ip).await
    }

    async fn mark_email_verified(
        &self,
        user_id: &UserId,
        email: &str,
        token_id: &str,
    ) -> Result<User, Error> {
        self.provider
            .user()
            .mark_email_verified(user_id, email, token_id)
            .await
    }

    async fn reset_password(
        &self,
        user_id: &UserId,
        password_hash: &str,
        token_id: &str,
    ) -> Result<(), Error> {
        self.provider
            .user()
            .reset_password(user_id, password_hash, token_id)
            .await
    }

    async fn consume_magic_link(&self, email: &str, token_id: &str) -> Result<User, Error> {
        self.provider.user().consume_magic_link(email, token_id).await
    }

    async fn apply_settings(&self, user_id: &UserId, changes: &Changeset) -> Result<User, Error> {
        self.provider.user().apply_settings(user_id, changes).await
    }

    async fn login_auth_data(&self, email: &str) -> Result<Option<LoginAuthData>, Error> {
        self.provider.user().login_auth_data(email).await
    }

    async fn reset_password_data(&self, email: &str) -> Result<Option<ResetPasswordData>, Error> {
        self.provider.user().reset_password_data(email).await
    }

    async fn settings_data(&self, user_id: &UserId) -> Result<Option<SettingsData>, Error> {
        self.provider.user().settings_data(user_id).await
    }

    async fn delete(&self, id: &UserId) -> Result<(), Error> {
        self.provider.user().delete(id).await
    }
}

/// Wraps a provider and implements [`TokenRepository`] by delegation.
pub struct TokenRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> TokenRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> TokenRepository for TokenRepositoryAdapter<R> {
    async fn issue(&self, token: NewToken) -> Result<AuthToken, Error> {
        self.provider.token().issue(token).await
    }

    async fn get_active(
        &self,
        purpose: TokenPurpose,
        email: &str,
    ) -> Result<Option<AuthToken>, Error> {
        self.provider.token().get_active(purpose, email).await
    }

    async fn find_valid(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<AuthToken>, Error> {
        self.provider.token().find_valid(purpose, token).await
    }

    async fn find_with_user(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<(AuthToken, User)>, Error> {
        self.provider.token().find_with_user(purpose, token).await
    }

    async fn get_active_email_change_request(
        &self,
        requested_by: &str,
    ) -> Result<Option<AuthToken>, Error> {
        self.provider
            .token()
            .get_active_email_change_request(requested_by)
            .await
    }

    async fn delete(&self, token_id: &str) -> Result<(), Error> {
        self.provider.token().delete(token_id).await
    }

    async fn delete_expired(&self, purpose: TokenPurpose) -> Result<u64, Error> {
        self.provider.token().delete_expired(purpose).await
    }

    async fn count_active_by_ip(
        &self,
        purpose: TokenPurpose,
        hashed_ip: &str,
    ) -> Result<i64, Error> {
        self.provider.token().count_active_by_ip(purpose, hashed_ip).await
    }

    async fn consume_two_factor(&self, user_id: &UserId, token_id: &str) -> Result<(), Error> {
        self.provider.token().consume_two_factor(user_id, token_id).await
    }

    async fn take_two_factor_confirmation(&self, user_id: &UserId) -> Result<bool, Error> {
        self.provider.token().take_two_factor_confirmation(user_id).await
    }
}

/// Wraps a provider and implements [`OAuthRepository`] by delegation.
pub struct OAuthRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> OAuthRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> OAuthRepository for OAuthRepositoryAdapter<R> {
    async fn link_account(
        &self,
        user_id: &UserId,
        provider: &str,
        subject: &str,
    ) -> Result<OAuthAccount, Error> {
        self.provider.oauth().link_account(user_id, provider, subject).await
    }

    async fn find_user_by_provider(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<User>, Error> {
        self.provider.oauth().find_user_by_provider(provider, subject).await
    }

    async fn count_accounts(&self, user_id: &UserId) -> Result<i64, Error> {
        self.provider.oauth().count_accounts(user_id).await
    }
}
