//! Core functionality for the gatehouse project
//!
//! This crate contains the domain types, repository traits, and flow services
//! that make up the authentication state machine: registration, login with
//! optional two-factor authentication, email verification, password reset,
//! magic-link sign-in, OAuth account linking, and session-bound settings
//! updates.
//!
//! Authentication state is never stored as an explicit status column. Each
//! flow is a single-pass evaluation over the persisted facts (user row plus
//! active tokens), and every flow returns a closed outcome enum rather than
//! surfacing errors for expected terminal states. [`Error`] is reserved for
//! infrastructure failures.
//!
//! Storage backends implement the traits in [`repositories`]; see the
//! `gatehouse-storage-sqlite` crate for the SQLite implementation.

pub mod config;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod guard;
pub mod id;
pub mod mailer;
pub mod password;
pub mod repositories;
pub mod session;
pub mod token;
pub mod user;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AuthConfig, Environment};
pub use error::Error;
pub use flows::{
    EmailVerificationService, LoginOutcome, LoginService, MagicLinkOutcome, MagicLinkService,
    MagicLinkVerifyOutcome, NewPasswordOutcome, OAuthService, PasswordResetService,
    RegisterOutcome, RegistrationService, ResetRequestOutcome, SettingsOutcome, SettingsService,
    VerifyEmailOutcome,
};
pub use mailer::{MailError, Mailer, NullMailer};
pub use session::{IssuedSession, JwtConfig, JwtSessionIssuer, SessionClaims, SessionIssuer};
pub use token::{AuthToken, NewToken, TokenPurpose};
pub use user::{NewUser, OAuthAccount, Role, User, UserId};
