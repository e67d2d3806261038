//! Token repository trait

use async_trait::async_trait;

use crate::{
    Error,
    token::{AuthToken, NewToken, TokenPurpose},
    user::{User, UserId},
};

/// Storage operations on one-time tokens and two-factor confirmations.
///
/// At most one active token exists per `(purpose, email)`; [`issue`] enforces
/// this by deleting any existing row for the key before inserting, in one
/// transaction.
///
/// [`issue`]: TokenRepository::issue
#[async_trait]
pub trait TokenRepository: Send + Sync + 'static {
    /// Replace any existing token for `(purpose, email)` with a new one.
    async fn issue(&self, token: NewToken) -> Result<AuthToken, Error>;

    /// The unexpired token for `(purpose, email)`, if any.
    async fn get_active(
        &self,
        purpose: TokenPurpose,
        email: &str,
    ) -> Result<Option<AuthToken>, Error>;

    /// Look up a token by its secret value. Expired rows are not returned.
    async fn find_valid(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<AuthToken>, Error>;

    /// Look up a token by value together with its owning user, expired rows
    /// included (redemption flows reissue on expiry and need the owner to do
    /// it). For an email-change token the owner is the `requested_by`
    /// account, otherwise the account holding the token's email. `None` when
    /// the token is missing or orphaned.
    async fn find_with_user(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<(AuthToken, User)>, Error>;

    /// The unexpired email-change token requested by the given current email.
    async fn get_active_email_change_request(
        &self,
        requested_by: &str,
    ) -> Result<Option<AuthToken>, Error>;

    async fn delete(&self, token_id: &str) -> Result<(), Error>;

    /// Remove expired rows for a purpose. Returns the number deleted.
    async fn delete_expired(&self, purpose: TokenPurpose) -> Result<u64, Error>;

    /// Unexpired tokens issued to the given hashed IP.
    async fn count_active_by_ip(
        &self,
        purpose: TokenPurpose,
        hashed_ip: &str,
    ) -> Result<i64, Error>;

    /// Delete a verified two-factor token and record a confirmation for the
    /// user in one transaction. The confirmation is what lets the subsequent
    /// login attempt pass the two-factor gate.
    async fn consume_two_factor(&self, user_id: &UserId, token_id: &str) -> Result<(), Error>;

    /// Atomically remove the user's two-factor confirmation if present.
    /// Returns whether one existed. Single-use by construction.
    async fn take_two_factor_confirmation(&self, user_id: &UserId) -> Result<bool, Error>;
}
