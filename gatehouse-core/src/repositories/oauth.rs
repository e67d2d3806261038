//! OAuth account repository trait

use async_trait::async_trait;

use crate::{
    Error,
    user::{OAuthAccount, User, UserId},
};

/// Storage operations on provider account links.
#[async_trait]
pub trait OAuthRepository: Send + Sync + 'static {
    /// Link a provider account to a user. Fails on a duplicate
    /// `(provider, subject)` pair.
    async fn link_account(
        &self,
        user_id: &UserId,
        provider: &str,
        subject: &str,
    ) -> Result<OAuthAccount, Error>;

    /// The user linked to a provider account, if any.
    async fn find_user_by_provider(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<User>, Error>;

    /// Number of provider accounts linked to a user.
    async fn count_accounts(&self, user_id: &UserId) -> Result<i64, Error>;
}
