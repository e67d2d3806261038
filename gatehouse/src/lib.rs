//! Gatehouse is an authentication framework for Rust that keeps you in
//! control of your users' data. It bundles credentials sign-in with email
//! verification, optional email two-factor authentication, password reset,
//! magic links, and OAuth account linking, all on top of storage you own.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatehouse::{AuthConfig, Gatehouse, JwtConfig, NullMailer, SqliteRepositoryProvider};
//! use gatehouse::flows::RegisterInput;
//! use sqlx::SqlitePool;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
//!     let repositories = Arc::new(SqliteRepositoryProvider::new(pool));
//!
//!     let gatehouse = Gatehouse::new(
//!         repositories,
//!         Arc::new(NullMailer),
//!         JwtConfig::new(b"secret-key".to_vec()),
//!         AuthConfig::default(),
//!     );
//!     gatehouse.migrate().await.unwrap();
//!
//!     let outcome = gatehouse
//!         .register(RegisterInput {
//!             email: "user@example.com".into(),
//!             password: "correct horse battery staple".into(),
//!             name: None,
//!             ip: "203.0.113.7".parse().ok(),
//!         })
//!         .await
//!         .unwrap();
//!     println!("{outcome:?}");
//! }
//! ```
//!
//! Every flow method returns `Ok(Outcome)` for expected terminal states
//! (wrong password, expired token, rate-limit hit) and reserves `Err` for
//! infrastructure failures, so callers match on a closed enum instead of
//! parsing error strings.

use std::net::IpAddr;
use std::sync::Arc;

use gatehouse_core::{
    flows::{
        EmailVerificationService, ExternalIdentity, LoginInput, LoginOutcome, LoginService,
        MagicLinkOutcome, MagicLinkService, MagicLinkVerifyOutcome, NewPasswordOutcome,
        OAuthService, PasswordResetService, RegisterInput, RegisterOutcome, RegistrationService,
        ResetRequestOutcome, SettingsInput, SettingsOutcome, SettingsService, VerifyEmailOutcome,
    },
    repositories::{
        OAuthRepositoryAdapter, TokenRepositoryAdapter, UserRepository, UserRepositoryAdapter,
        UserRepositoryProvider,
    },
};

pub use gatehouse_core::{
    self as core, AuthConfig, Environment, Error, IssuedSession, JwtConfig, JwtSessionIssuer,
    MailError, Mailer, NullMailer, Role, SessionClaims, SessionIssuer, User, UserId, flows,
    repositories::RepositoryProvider, session,
};

#[cfg(feature = "sqlite")]
pub use gatehouse_storage_sqlite::SqliteRepositoryProvider;

/// The main authentication service.
///
/// Generic over a [`RepositoryProvider`], which supplies the user, token,
/// and OAuth repositories. All flow services share the same provider through
/// adapter types, so a single storage backend powers every flow.
pub struct Gatehouse<R: RepositoryProvider> {
    repositories: Arc<R>,
    issuer: Arc<dyn SessionIssuer>,
    registration: RegistrationService<UserRepositoryAdapter<R>, TokenRepositoryAdapter<R>>,
    login: LoginService<UserRepositoryAdapter<R>, TokenRepositoryAdapter<R>>,
    verification: EmailVerificationService<UserRepositoryAdapter<R>, TokenRepositoryAdapter<R>>,
    password_reset: PasswordResetService<UserRepositoryAdapter<R>, TokenRepositoryAdapter<R>>,
    magic_link: MagicLinkService<UserRepositoryAdapter<R>, TokenRepositoryAdapter<R>>,
    oauth: OAuthService<UserRepositoryAdapter<R>, OAuthRepositoryAdapter<R>>,
    settings: SettingsService<UserRepositoryAdapter<R>, TokenRepositoryAdapter<R>>,
}

impl<R: RepositoryProvider> Gatehouse<R> {
    /// Create a new instance with JWT-backed sessions.
    pub fn new(
        repositories: Arc<R>,
        mailer: Arc<dyn Mailer>,
        jwt: JwtConfig,
        config: AuthConfig,
    ) -> Self {
        Self::with_issuer(
            repositories,
            mailer,
            Arc::new(JwtSessionIssuer::new(jwt)),
            config,
        )
    }

    /// Create a new instance with a custom session issuer.
    pub fn with_issuer(
        repositories: Arc<R>,
        mailer: Arc<dyn Mailer>,
        issuer: Arc<dyn SessionIssuer>,
        config: AuthConfig,
    ) -> Self {
        let users = Arc::new(UserRepositoryAdapter::new(repositories.clone()));
        let tokens = Arc::new(TokenRepositoryAdapter::new(repositories.clone()));
        let oauth_accounts = Arc::new(OAuthRepositoryAdapter::new(repositories.clone()));

        Self {
            repositories,
            issuer: issuer.clone(),
            registration: RegistrationService::new(
                users.clone(),
                tokens.clone(),
                mailer.clone(),
                config.clone(),
            ),
            login: LoginService::new(
                users.clone(),
                tokens.clone(),
                mailer.clone(),
                issuer.clone(),
                config.clone(),
            ),
            verification: EmailVerificationService::new(
                users.clone(),
                tokens.clone(),
                mailer.clone(),
                config.clone(),
            ),
            password_reset: PasswordResetService::new(
                users.clone(),
                tokens.clone(),
                mailer.clone(),
                config.clone(),
            ),
            magic_link: MagicLinkService::new(
                users.clone(),
                tokens.clone(),
                mailer.clone(),
                issuer.clone(),
                config.clone(),
            ),
            oauth: OAuthService::new(
                users.clone(),
                oauth_accounts,
                issuer.clone(),
                config.clone(),
            ),
            settings: SettingsService::new(users, tokens, mailer, issuer, config),
        }
    }

    /// The underlying repository provider.
    pub fn repositories(&self) -> &Arc<R> {
        &self.repositories
    }

    /// Run storage migrations.
    pub async fn migrate(&self) -> Result<(), Error> {
        self.repositories.migrate().await
    }

    /// Check that the storage backend is reachable.
    pub async fn health_check(&self) -> Result<(), Error> {
        self.repositories.health_check().await
    }

    /// Register a new credentials user and send the verification email.
    pub async fn register(&self, input: RegisterInput) -> Result<RegisterOutcome, Error> {
        self.registration.register(input).await
    }

    /// Sign in with email and password, walking verification and two-factor
    /// state as needed.
    pub async fn login(&self, input: LoginInput) -> Result<LoginOutcome, Error> {
        self.login.login(input).await
    }

    /// Redeem an email verification token (initial verification or an email
    /// change request).
    pub async fn verify_email(&self, token: &str) -> Result<VerifyEmailOutcome, Error> {
        self.verification.verify(token).await
    }

    /// Request a password reset email.
    pub async fn request_password_reset(&self, email: &str) -> Result<ResetRequestOutcome, Error> {
        self.password_reset.request(email).await
    }

    /// Redeem a password reset token and set the new password.
    pub async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<NewPasswordOutcome, Error> {
        self.password_reset.complete(token, new_password).await
    }

    /// Request a magic sign-in link for the given email.
    pub async fn request_magic_link(
        &self,
        email: &str,
        ip: Option<IpAddr>,
    ) -> Result<MagicLinkOutcome, Error> {
        self.magic_link.request(email, ip).await
    }

    /// Redeem a magic link token and sign the user in.
    pub async fn verify_magic_link(
        &self,
        token: &str,
        callback_url: Option<&str>,
    ) -> Result<MagicLinkVerifyOutcome, Error> {
        self.magic_link.verify(token, callback_url).await
    }

    /// Sign in with an identity asserted by an external OAuth provider,
    /// linking or creating the local account.
    pub async fn oauth_sign_in(
        &self,
        identity: ExternalIdentity,
        callback_url: Option<&str>,
    ) -> Result<IssuedSession, Error> {
        self.oauth.sign_in(identity, callback_url).await
    }

    /// Apply account settings changes for an authenticated user.
    pub async fn update_settings(
        &self,
        user_id: &UserId,
        input: SettingsInput,
    ) -> Result<SettingsOutcome, Error> {
        self.settings.update(user_id, input).await
    }

    /// Verify a session token and return its claims.
    pub async fn verify_session(&self, token: &str) -> Result<SessionClaims, Error> {
        self.issuer.verify(token).await
    }

    /// Look up a user by id.
    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, Error> {
        self.repositories.user().find_by_id(user_id).await
    }
}
