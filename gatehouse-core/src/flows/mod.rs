//! Authentication flows
//!
//! Each flow is a request-scoped, single-pass evaluation over facts fetched
//! from the repositories. A flow returns `Ok(Outcome)` for every expected
//! terminal state, including the unhappy ones; `Err(Error)` always means
//! infrastructure failed mid-flight. There is no flow state stored anywhere;
//! re-running a flow re-derives its decision from the database.

pub mod login;
pub mod magic_link;
pub mod oauth;
pub mod password_reset;
pub mod register;
pub mod settings;
pub mod verify_email;

pub use login::{LoginInput, LoginOutcome, LoginService};
pub use magic_link::{MagicLinkOutcome, MagicLinkService, MagicLinkVerifyOutcome};
pub use oauth::{ExternalIdentity, OAuthService};
pub use password_reset::{NewPasswordOutcome, PasswordResetService, ResetRequestOutcome};
pub use register::{RegisterInput, RegisterOutcome, RegistrationService};
pub use settings::{Changeset, SettingsInput, SettingsOutcome, SettingsService};
pub use verify_email::{EmailVerificationService, VerifyEmailOutcome};
