#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gatehouse::core::repositories::{
    TokenRepository, TokenRepositoryProvider, UserRepository, UserRepositoryProvider,
};
use gatehouse::core::token::TokenPurpose;
use gatehouse::flows::{RegisterInput, RegisterOutcome, VerifyEmailOutcome};
use gatehouse::{
    AuthConfig, Gatehouse, JwtConfig, MailError, Mailer, SqliteRepositoryProvider, User,
};

pub const JWT_SECRET: &[u8] = b"this_is_a_test_secret_key_for_hs256_session_tokens_not_for_prod";
pub const IP: &str = "203.0.113.20";

pub fn ip() -> Option<IpAddr> {
    IP.parse().ok()
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Captures outgoing mail so tests can assert on delivery.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

pub async fn gatehouse() -> (Gatehouse<SqliteRepositoryProvider>, Arc<RecordingMailer>) {
    gatehouse_with(AuthConfig::default()).await
}

pub async fn gatehouse_with(
    config: AuthConfig,
) -> (Gatehouse<SqliteRepositoryProvider>, Arc<RecordingMailer>) {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let repositories = Arc::new(SqliteRepositoryProvider::new(pool));
    let mailer = Arc::new(RecordingMailer::default());

    let gatehouse = Gatehouse::new(
        repositories,
        mailer.clone(),
        JwtConfig::new(JWT_SECRET),
        config,
    );
    gatehouse.migrate().await.unwrap();

    (gatehouse, mailer)
}

/// The value of the single active token for `(purpose, email)`.
pub async fn active_token(
    gatehouse: &Gatehouse<SqliteRepositoryProvider>,
    purpose: TokenPurpose,
    email: &str,
) -> String {
    gatehouse
        .repositories()
        .token()
        .get_active(purpose, email)
        .await
        .unwrap()
        .expect("an active token should exist")
        .token
}

/// Register a credentials account and redeem its verification token.
pub async fn register_verified(
    gatehouse: &Gatehouse<SqliteRepositoryProvider>,
    email: &str,
    password: &str,
) -> User {
    let outcome = gatehouse
        .register(RegisterInput {
            email: email.to_string(),
            password: password.to_string(),
            name: None,
            ip: ip(),
        })
        .await
        .unwrap();
    assert_eq!(outcome, RegisterOutcome::Success { email_sent: true });

    let token = active_token(gatehouse, TokenPurpose::EmailVerification, email).await;
    let outcome = gatehouse.verify_email(&token).await.unwrap();
    assert_eq!(outcome, VerifyEmailOutcome::EmailVerified);

    gatehouse
        .repositories()
        .user()
        .find_by_email(email)
        .await
        .unwrap()
        .expect("the account should exist")
}
