//! Per-IP abuse caps
//!
//! Raw addresses never reach storage; every check operates on a SHA-256
//! digest of the address. A request whose address cannot be resolved (or
//! that claims loopback in production) fails the flow outright rather than
//! silently bypassing the caps.

use std::net::IpAddr;
use std::sync::Arc;

use crate::{
    Error,
    config::AuthConfig,
    crypto::hash_ip,
    repositories::{TokenRepository, UserRepository},
    token::TokenPurpose,
};

pub struct AbuseGuard<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    users: Arc<U>,
    tokens: Arc<T>,
    config: AuthConfig,
}

impl<U, T> AbuseGuard<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    pub fn new(users: Arc<U>, tokens: Arc<T>, config: AuthConfig) -> Self {
        Self {
            users,
            tokens,
            config,
        }
    }

    /// Hash a requester address for storage and counting.
    ///
    /// Returns `None` when no address is available, or when a production
    /// request claims a loopback address (a proxy misconfiguration, not a
    /// real client). Callers treat `None` as a terminal outcome.
    pub fn resolve_ip(&self, addr: Option<IpAddr>) -> Option<String> {
        let addr = addr?;
        if self.config.environment.is_production() && addr.is_loopback() {
            return None;
        }
        Some(hash_ip(&addr))
    }

    /// Whether a registration from this hashed IP is within the cap.
    ///
    /// The cap only applies in production so local development is never
    /// throttled.
    pub async fn registration_allowed(&self, hashed_ip: &str) -> Result<bool, Error> {
        if !self.config.environment.is_production() {
            return Ok(true);
        }

        let count = self.users.count_by_registration_ip(hashed_ip).await?;
        Ok(count < self.config.registration_ip_cap)
    }

    /// Whether this hashed IP may be issued another magic-link token.
    pub async fn magic_link_allowed(&self, hashed_ip: &str) -> Result<bool, Error> {
        let count = self
            .tokens
            .count_active_by_ip(TokenPurpose::MagicLink, hashed_ip)
            .await?;
        Ok(count < self.config.magic_link_ip_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Environment,
        test_support::{MemoryTokenRepository, MemoryUserRepository},
        token::NewToken,
        user::NewUser,
    };
    use chrono::Duration;

    fn guard(
        environment: Environment,
    ) -> AbuseGuard<MemoryUserRepository, MemoryTokenRepository> {
        AbuseGuard::new(
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemoryTokenRepository::new()),
            AuthConfig::new(environment),
        )
    }

    #[test]
    fn test_resolve_ip() {
        let dev = guard(Environment::Development);
        let prod = guard(Environment::Production);

        let public: IpAddr = "203.0.113.9".parse().unwrap();
        let loopback: IpAddr = "127.0.0.1".parse().unwrap();

        assert!(dev.resolve_ip(Some(public)).is_some());
        assert!(dev.resolve_ip(Some(loopback)).is_some());
        assert!(dev.resolve_ip(None).is_none());

        assert!(prod.resolve_ip(Some(public)).is_some());
        assert!(prod.resolve_ip(Some(loopback)).is_none());
        assert!(prod.resolve_ip(None).is_none());
    }

    #[tokio::test]
    async fn test_registration_cap_ignored_in_development() {
        let guard = guard(Environment::Development);
        let hashed = guard
            .resolve_ip(Some("203.0.113.9".parse().unwrap()))
            .unwrap();

        for i in 0..5 {
            let user = NewUser::new(format!("u{i}@example.com"))
                .with_registration_ip_hash(Some(hashed.clone()));
            guard.users.create(user).await.unwrap();
        }

        assert!(guard.registration_allowed(&hashed).await.unwrap());
    }

    #[tokio::test]
    async fn test_registration_cap_enforced_in_production() {
        let guard = guard(Environment::Production);
        let hashed = guard
            .resolve_ip(Some("203.0.113.9".parse().unwrap()))
            .unwrap();

        assert!(guard.registration_allowed(&hashed).await.unwrap());

        for i in 0..2 {
            let user = NewUser::new(format!("u{i}@example.com"))
                .with_registration_ip_hash(Some(hashed.clone()));
            guard.users.create(user).await.unwrap();
        }

        assert!(!guard.registration_allowed(&hashed).await.unwrap());
        // A different address is unaffected
        let other = guard
            .resolve_ip(Some("203.0.113.10".parse().unwrap()))
            .unwrap();
        assert!(guard.registration_allowed(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_magic_link_cap() {
        let guard = guard(Environment::Development);
        let hashed = guard
            .resolve_ip(Some("198.51.100.4".parse().unwrap()))
            .unwrap();

        assert!(guard.magic_link_allowed(&hashed).await.unwrap());

        for i in 0..2 {
            let token = NewToken::magic_link(
                &format!("m{i}@example.com"),
                Some(hashed.clone()),
                Duration::hours(1),
            );
            guard.tokens.issue(token).await.unwrap();
        }

        assert!(!guard.magic_link_allowed(&hashed).await.unwrap());
    }
}
