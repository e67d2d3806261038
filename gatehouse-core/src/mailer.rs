//! Outbound mail abstraction
//!
//! Flows depend on this trait rather than a concrete transport so delivery
//! failures can be handled per flow: a failed verification mail during
//! registration is reported but does not undo the account, while a failed
//! magic-link mail rolls the token back.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// Discards all mail. Useful in tests and in deployments that surface tokens
/// some other way.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
        Ok(())
    }
}
