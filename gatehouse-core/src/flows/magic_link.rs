//! Magic-link flow: passwordless sign-in by emailed one-time link
//!
//! Issuance and delivery are kept consistent: the token is written first,
//! the mail is sent second, and a send failure deletes the token again.
//! Redemption consumes the token, finds or creates the account with the
//! email stamped verified, and issues a session.

use std::net::IpAddr;
use std::sync::Arc;

use crate::{
    Error,
    config::AuthConfig,
    guard::AbuseGuard,
    mailer::Mailer,
    repositories::{TokenRepository, UserRepository},
    session::{IssuedSession, SessionIssuer, validate_callback_url},
    token::{NewToken, TokenPurpose},
    validation::{normalize_email, validate_email, validate_token_format},
};

/// Terminal states of a magic-link request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicLinkOutcome {
    Sent,
    /// An unexpired link is already out for this email.
    AlreadySent,
    /// Too many active links issued to this address.
    IpLimit,
    /// The requester's address could not be established.
    IpUnresolved,
    /// The mail failed; the token was rolled back.
    SendFailed,
    InvalidEmail,
}

/// Terminal states of a magic-link redemption.
#[derive(Debug, Clone, PartialEq)]
pub enum MagicLinkVerifyOutcome {
    SignedIn(IssuedSession),
    /// Unknown and expired tokens are deliberately indistinguishable.
    TokenNotFound,
}

pub struct MagicLinkService<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    users: Arc<U>,
    tokens: Arc<T>,
    guard: AbuseGuard<U, T>,
    mailer: Arc<dyn Mailer>,
    issuer: Arc<dyn SessionIssuer>,
    config: AuthConfig,
}

impl<U, T> MagicLinkService<U, T>
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
        let guard = AbuseGuard::new(users.clone(), tokens.clone(), config.clone());
        Self {
            users,
            tokens,
            guard,
            mailer,
            issuer,
            config,
        }
    }

    pub async fn request(
        &self,
        email: &str,
        ip: Option<IpAddr>,
    ) -> Result<MagicLinkOutcome, Error> {
        if validate_email(email).is_err() {
            return Ok(MagicLinkOutcome::InvalidEmail);
        }
        let email = normalize_email(email);

        let Some(hashed_ip) = self.guard.resolve_ip(ip) else {
            return Ok(MagicLinkOutcome::IpUnresolved);
        };

        // Expired rows would otherwise count against nobody and pile up.
        self.tokens.delete_expired(TokenPurpose::MagicLink).await?;

        if !self.guard.magic_link_allowed(&hashed_ip).await? {
            return Ok(MagicLinkOutcome::IpLimit);
        }

        if self
            .tokens
            .get_active(TokenPurpose::MagicLink, &email)
            .await?
            .is_some()
        {
            return Ok(MagicLinkOutcome::AlreadySent);
        }

        let token = self
            .tokens
            .issue(NewToken::magic_link(
                &email,
                Some(hashed_ip),
                self.config.token_ttl,
            ))
            .await?;

        let body = format!("Sign in with this one-time code: {}", token.token);
        if let Err(e) = self.mailer.send(&email, "Your sign-in link", &body).await {
            tracing::warn!(error = %e, "Failed to send magic link email");
            self.tokens.delete(&token.id).await?;
            return Ok(MagicLinkOutcome::SendFailed);
        }

        Ok(MagicLinkOutcome::Sent)
    }

    pub async fn verify(
        &self,
        token_value: &str,
        callback_url: Option<&str>,
    ) -> Result<MagicLinkVerifyOutcome, Error> {
        if validate_token_format(token_value).is_err() {
            return Ok(MagicLinkVerifyOutcome::TokenNotFound);
        }

        let Some(token) = self
            .tokens
            .find_valid(TokenPurpose::MagicLink, token_value)
            .await?
        else {
            return Ok(MagicLinkVerifyOutcome::TokenNotFound);
        };

        // Deletes the token, finds or creates the account, and stamps the
        // email verified, all in one transaction.
        let user = self.users.consume_magic_link(&token.email, &token.id).await?;

        let redirect_to = validate_callback_url(
            callback_url,
            &self.config.allowed_callback_urls,
            &self.config.default_redirect,
        );
        let session = self.issuer.issue(&user, false, &redirect_to).await?;
        Ok(MagicLinkVerifyOutcome::SignedIn(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        session::{JwtConfig, JwtSessionIssuer},
        test_support::{FailingMailer, MemoryRepositories, RecordingMailer},
    };

    const IP: &str = "198.51.100.7";

    fn service(
        repos: &MemoryRepositories,
        mailer: Arc<dyn Mailer>,
    ) -> MagicLinkService<
        crate::test_support::MemoryUserRepository,
        crate::test_support::MemoryTokenRepository,
    > {
        MagicLinkService::new(
            repos.users.clone(),
            repos.tokens.clone(),
            mailer,
            Arc::new(JwtSessionIssuer::new(JwtConfig::new(
                b"magic-test-secret".to_vec(),
            ))),
            AuthConfig::default(),
        )
    }

    fn ip() -> Option<IpAddr> {
        Some(IP.parse().unwrap())
    }

    #[tokio::test]
    async fn test_request_then_verify_creates_verified_user() {
        let repos = MemoryRepositories::new();
        let mailer = Arc::new(RecordingMailer::default());
        let service = service(&repos, mailer.clone());

        let outcome = service.request("Link@Example.com", ip()).await.unwrap();
        assert_eq!(outcome, MagicLinkOutcome::Sent);

        let token = repos
            .tokens
            .get_active(TokenPurpose::MagicLink, "link@example.com")
            .await
            .unwrap()
            .expect("token issued");
        assert!(token.hashed_ip.is_some());

        let outcome = service.verify(&token.token, None).await.unwrap();
        let session = match outcome {
            MagicLinkVerifyOutcome::SignedIn(session) => session,
            other => panic!("Expected sign-in, got {other:?}"),
        };
        assert_eq!(session.redirect_to, "/settings");

        let user = repos
            .users
            .find_by_email("link@example.com")
            .await
            .unwrap()
            .expect("user created on redemption");
        assert!(user.is_email_verified());
        assert!(!user.has_password());

        // Token is single-use
        assert_eq!(
            service.verify(&token.token, None).await.unwrap(),
            MagicLinkVerifyOutcome::TokenNotFound
        );
    }

    #[tokio::test]
    async fn test_request_already_sent() {
        let repos = MemoryRepositories::new();
        let mailer = Arc::new(RecordingMailer::default());
        let service = service(&repos, mailer.clone());

        service.request("link@example.com", ip()).await.unwrap();
        let outcome = service.request("link@example.com", ip()).await.unwrap();
        assert_eq!(outcome, MagicLinkOutcome::AlreadySent);
        assert_eq!(mailer.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_request_ip_cap() {
        let repos = MemoryRepositories::new();
        let service = service(&repos, Arc::new(RecordingMailer::default()));

        for i in 0..2 {
            let outcome = service
                .request(&format!("m{i}@example.com"), ip())
                .await
                .unwrap();
            assert_eq!(outcome, MagicLinkOutcome::Sent);
        }

        let outcome = service.request("m2@example.com", ip()).await.unwrap();
        assert_eq!(outcome, MagicLinkOutcome::IpLimit);
    }

    #[tokio::test]
    async fn test_request_without_ip_fails() {
        let repos = MemoryRepositories::new();
        let service = service(&repos, Arc::new(RecordingMailer::default()));

        let outcome = service.request("m@example.com", None).await.unwrap();
        assert_eq!(outcome, MagicLinkOutcome::IpUnresolved);
    }

    #[tokio::test]
    async fn test_request_send_failure_rolls_back_token() {
        let repos = MemoryRepositories::new();
        let service = service(&repos, Arc::new(FailingMailer));

        let outcome = service.request("m@example.com", ip()).await.unwrap();
        assert_eq!(outcome, MagicLinkOutcome::SendFailed);
        assert!(
            repos
                .tokens
                .get_active(TokenPurpose::MagicLink, "m@example.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_verify_existing_user_is_not_duplicated() {
        let repos = MemoryRepositories::new();
        let service = service(&repos, Arc::new(RecordingMailer::default()));

        let existing = repos
            .users
            .create(crate::user::NewUser::new("known@example.com".to_string()))
            .await
            .unwrap();

        service.request("known@example.com", ip()).await.unwrap();
        let token = repos
            .tokens
            .get_active(TokenPurpose::MagicLink, "known@example.com")
            .await
            .unwrap()
            .unwrap();

        match service.verify(&token.token, None).await.unwrap() {
            MagicLinkVerifyOutcome::SignedIn(_) => {}
            other => panic!("Expected sign-in, got {other:?}"),
        }

        let user = repos
            .users
            .find_by_email("known@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, existing.id);
        assert!(user.is_email_verified());
    }
}
