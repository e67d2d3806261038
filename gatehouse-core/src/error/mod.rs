pub mod utilities;

use thiserror::Error;

/// Infrastructure and programming errors.
///
/// Expected terminal states of a flow (wrong credentials, expired token,
/// account limit reached, ...) are NOT errors; they are variants of the
/// flow's outcome enum in [`crate::flows`]. An `Err` escaping a flow means
/// something the caller cannot recover from within the flow: the database is
/// unreachable, a constraint fired unexpectedly, or a key failed to sign.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Mail error: {0}")]
    Mail(#[from] crate::mailer::MailError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("Account already linked")]
    AccountAlreadyLinked,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("JWT signing failed: {0}")]
    JwtSigning(String),

    #[error("JWT verification failed: {0}")]
    JwtVerification(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// How an unhandled error should be reported to the caller.
///
/// Flows never leak raw database detail; the surface layer maps
/// `DbUnavailable` to a "try again later" message and everything else to a
/// generic one, logging the detail either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The database could not be reached or the statement failed.
    DbUnavailable,
    /// Anything else: a bug, a misconfiguration, a signing failure.
    Unexpected,
}

impl Error {
    /// Classify an error for user-facing reporting.
    pub fn classify(&self) -> FailureClass {
        match self {
            Error::Storage(StorageError::Database(_))
            | Error::Storage(StorageError::Connection(_)) => FailureClass::DbUnavailable,
            _ => FailureClass::Unexpected,
        }
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
