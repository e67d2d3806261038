//! One-time auth tokens
//!
//! All four token kinds share one shape and one table. A token is keyed by
//! `(purpose, email)` with at most one active row per key; issuing a new
//! token deletes the previous one first. Consumption is a delete performed in
//! the same transaction as the mutation the token authorizes, so a token can
//! never be spent twice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{generate_secure_token, generate_two_factor_code},
    error::ValidationError,
    id::generate_prefixed_id,
    user::UserId,
    validation::normalize_email,
};

pub const TOKEN_ID_PREFIX: &str = "tok";

/// What a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
    TwoFactor,
    MagicLink,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::TwoFactor => "two_factor",
            TokenPurpose::MagicLink => "magic_link",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "email_verification" => Ok(TokenPurpose::EmailVerification),
            "password_reset" => Ok(TokenPurpose::PasswordReset),
            "two_factor" => Ok(TokenPurpose::TwoFactor),
            "magic_link" => Ok(TokenPurpose::MagicLink),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown token purpose: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored one-time token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: String,
    pub purpose: TokenPurpose,
    /// The secret value delivered to the user (link token or 6-digit code).
    pub token: String,
    /// The email the token targets. For an email change this is the NEW
    /// address; `requested_by` carries the current one.
    pub email: String,
    pub user_id: Option<UserId>,
    /// Current email of the account requesting an email change.
    pub requested_by: Option<String>,
    /// Hashed requester IP, recorded for magic-link rate caps.
    pub hashed_ip: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Whether this email-verification token represents an email change
    /// rather than initial verification.
    pub fn is_email_change(&self) -> bool {
        self.requested_by.is_some()
    }
}

/// The data needed to issue a token. The secret value is generated here so
/// repositories only persist, never mint.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub purpose: TokenPurpose,
    pub token: String,
    pub email: String,
    pub user_id: Option<UserId>,
    pub requested_by: Option<String>,
    pub hashed_ip: Option<String>,
    pub expires_in: Duration,
}

impl NewToken {
    /// Token for verifying the address an account registered with.
    pub fn email_verification(email: &str, ttl: Duration) -> Self {
        Self {
            purpose: TokenPurpose::EmailVerification,
            token: generate_secure_token(),
            email: normalize_email(email),
            user_id: None,
            requested_by: None,
            hashed_ip: None,
            expires_in: ttl,
        }
    }

    /// Token for confirming a change to a new address. `new_email` receives
    /// the link; `current_email` identifies the requesting account.
    pub fn email_change(new_email: &str, current_email: &str, ttl: Duration) -> Self {
        Self {
            purpose: TokenPurpose::EmailVerification,
            token: generate_secure_token(),
            email: normalize_email(new_email),
            user_id: None,
            requested_by: Some(normalize_email(current_email)),
            hashed_ip: None,
            expires_in: ttl,
        }
    }

    pub fn password_reset(email: &str, ttl: Duration) -> Self {
        Self {
            purpose: TokenPurpose::PasswordReset,
            token: generate_secure_token(),
            email: normalize_email(email),
            user_id: None,
            requested_by: None,
            hashed_ip: None,
            expires_in: ttl,
        }
    }

    /// Six-digit code mailed during two-factor login.
    pub fn two_factor(email: &str, user_id: UserId, ttl: Duration) -> Self {
        Self {
            purpose: TokenPurpose::TwoFactor,
            token: generate_two_factor_code(),
            email: normalize_email(email),
            user_id: Some(user_id),
            requested_by: None,
            hashed_ip: None,
            expires_in: ttl,
        }
    }

    pub fn magic_link(email: &str, hashed_ip: Option<String>, ttl: Duration) -> Self {
        Self {
            purpose: TokenPurpose::MagicLink,
            token: generate_secure_token(),
            email: normalize_email(email),
            user_id: None,
            requested_by: None,
            hashed_ip,
            expires_in: ttl,
        }
    }

    /// Materialize the stored form, assigning an ID and concrete expiry.
    pub fn into_token(self) -> AuthToken {
        let now = Utc::now();
        AuthToken {
            id: generate_prefixed_id(TOKEN_ID_PREFIX),
            purpose: self.purpose,
            token: self.token,
            email: self.email,
            user_id: self.user_id,
            requested_by: self.requested_by,
            hashed_ip: self.hashed_ip,
            expires_at: now + self.expires_in,
            created_at: now,
        }
    }
}
