//! Credentials login flow
//!
//! The decision itself is the pure function [`evaluate`]: given the facts
//! fetched in one composite read and the caller's input, it names exactly one
//! next step. The service around it performs the I/O each step requires. The
//! check order is a security property: the password is verified before the
//! verification state or the two-factor state is disclosed, so an attacker
//! without the password learns nothing about the account.

use std::sync::Arc;

use crate::{
    Error,
    config::AuthConfig,
    crypto::constant_time_eq,
    error::StorageError,
    mailer::Mailer,
    password::{PasswordCheck, verify_password},
    repositories::{LoginAuthData, TokenRepository, UserRepository},
    session::{IssuedSession, SessionIssuer, validate_callback_url},
    token::NewToken,
    user::User,
    validation::{normalize_email, validate_email, validate_password, validate_two_factor_code},
};

/// Terminal states of a login attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Success(IssuedSession),
    /// Unknown email, missing password hash, or wrong password; deliberately
    /// indistinguishable.
    WrongCredentials,
    /// The stored hash is legacy or corrupt; the account must reset its
    /// password before it can sign in.
    PasswordNeedsUpdate,
    /// Email unverified and an unexpired verification token already exists.
    ConfirmationEmailAlreadySent,
    /// Email unverified; a fresh verification token was issued and sent.
    NewConfirmationEmailSent,
    /// A verification or two-factor email could not be sent; the token it
    /// carried was rolled back.
    ResendEmailError,
    /// Two-factor is enabled and no code was supplied; a code is on its way.
    TwoFactorRequired,
    /// A code was supplied but no active two-factor token exists.
    TwoFactorTokenMissing,
    TwoFactorCodeInvalid,
    InvalidInput(String),
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub two_factor_code: Option<String>,
    /// Requested post-login redirect; honored only when allow-listed.
    pub callback_url: Option<String>,
}

/// An unexpired two-factor token, reduced to what the decision needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTwoFactor {
    pub token_id: String,
    pub code: String,
}

/// The facts the login decision is made from. All of them come from one
/// composite read plus one password verification; [`evaluate`] does no I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginFacts {
    pub account_exists: bool,
    pub has_password: bool,
    pub password: PasswordCheck,
    pub email_verified: bool,
    pub has_active_verification_token: bool,
    pub two_factor_enabled: bool,
    pub active_two_factor: Option<ActiveTwoFactor>,
}

/// The single next step a login attempt takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginDecision {
    WrongCredentials,
    PasswordNeedsUpdate,
    ConfirmationAlreadySent,
    NeedNewConfirmationEmail,
    /// Send a two-factor code and stop. `reuse` names whether an unexpired
    /// code already exists or a fresh one must be issued.
    TwoFactorChallenge { reuse: bool },
    /// The supplied code matched; consume this token and proceed.
    TwoFactorVerify { token_id: String },
    TwoFactorTokenMissing,
    TwoFactorCodeInvalid,
    Authenticated,
}

/// Decide the next step of a login attempt.
///
/// Ordering is deliberate: credentials first, then verification state, then
/// two-factor. `needs_upgrade` is reported before validity so a legacy hash
/// is never half-verified.
pub fn evaluate(facts: &LoginFacts, two_factor_code: Option<&str>) -> LoginDecision {
    if !facts.account_exists || !facts.has_password {
        return LoginDecision::WrongCredentials;
    }

    if facts.password.needs_upgrade {
        return LoginDecision::PasswordNeedsUpdate;
    }
    if !facts.password.is_valid {
        return LoginDecision::WrongCredentials;
    }

    if !facts.email_verified {
        return if facts.has_active_verification_token {
            LoginDecision::ConfirmationAlreadySent
        } else {
            LoginDecision::NeedNewConfirmationEmail
        };
    }

    if facts.two_factor_enabled {
        return match two_factor_code {
            Some(code) => match &facts.active_two_factor {
                None => LoginDecision::TwoFactorTokenMissing,
                Some(active) => {
                    if constant_time_eq(code.as_bytes(), active.code.as_bytes()) {
                        LoginDecision::TwoFactorVerify {
                            token_id: active.token_id.clone(),
                        }
                    } else {
                        LoginDecision::TwoFactorCodeInvalid
                    }
                }
            },
            None => LoginDecision::TwoFactorChallenge {
                reuse: facts.active_two_factor.is_some(),
            },
        };
    }

    LoginDecision::Authenticated
}

/// Result of the sign-in gate, re-checked just before a session is minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInGate {
    Allowed,
    EmailUnverified,
    /// Two-factor is enabled but no confirmation is on file.
    ConfirmationMissing,
}

pub struct LoginService<U, T>
where
    U: UserRepository,
    T: TokenRepository,
{
    users: Arc<U>,
    tokens: Arc<T>,
    mailer: Arc<dyn Mailer>,
    issuer: Arc<dyn SessionIssuer>,
    config: AuthConfig,
}

impl<U, T> LoginService<U, T>
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
        Self {
            users,
            tokens,
            mailer,
            issuer,
            config,
        }
    }

    pub async fn login(&self, input: LoginInput) -> Result<LoginOutcome, Error> {
        if let Err(e) =
            validate_email(&input.email).and_then(|_| validate_password(&input.password))
        {
            return Ok(LoginOutcome::InvalidInput(e.to_string()));
        }
        if let Some(code) = &input.two_factor_code
            && validate_two_factor_code(code).is_err()
        {
            return Ok(LoginOutcome::TwoFactorCodeInvalid);
        }

        let email = normalize_email(&input.email);
        let data = self.users.login_auth_data(&email).await?;
        let facts = build_facts(data.as_ref(), &input.password);

        let decision = evaluate(&facts, input.two_factor_code.as_deref());
        let user = match (decision, data) {
            (LoginDecision::WrongCredentials, _) => return Ok(LoginOutcome::WrongCredentials),
            (LoginDecision::PasswordNeedsUpdate, _) => {
                return Ok(LoginOutcome::PasswordNeedsUpdate);
            }
            (LoginDecision::ConfirmationAlreadySent, _) => {
                return Ok(LoginOutcome::ConfirmationEmailAlreadySent);
            }
            (LoginDecision::NeedNewConfirmationEmail, _) => {
                return self.send_confirmation_email(&email).await;
            }
            (LoginDecision::TwoFactorTokenMissing, _) => {
                return Ok(LoginOutcome::TwoFactorTokenMissing);
            }
            (LoginDecision::TwoFactorCodeInvalid, _) => {
                return Ok(LoginOutcome::TwoFactorCodeInvalid);
            }
            (LoginDecision::TwoFactorChallenge { reuse }, Some(data)) => {
                return self.send_two_factor_code(&data.user, reuse).await;
            }
            (LoginDecision::TwoFactorVerify { token_id }, Some(data)) => {
                match self
                    .tokens
                    .consume_two_factor(&data.user.id, &token_id)
                    .await
                {
                    Ok(()) => data.user,
                    // A concurrent submit of the same code spent the token
                    // first; treat the loser like any other missing token.
                    Err(Error::Storage(StorageError::NotFound)) => {
                        return Ok(LoginOutcome::TwoFactorTokenMissing);
                    }
                    Err(e) => return Err(e),
                }
            }
            (LoginDecision::Authenticated, Some(data)) => data.user,
            // Every decision past credential checks implies an account row
            (_, None) => return Ok(LoginOutcome::WrongCredentials),
        };

        match self.authorize_sign_in(&user).await? {
            SignInGate::Allowed => {}
            SignInGate::EmailUnverified => {
                return Ok(LoginOutcome::ConfirmationEmailAlreadySent);
            }
            SignInGate::ConfirmationMissing => return Ok(LoginOutcome::TwoFactorTokenMissing),
        }

        let redirect_to = validate_callback_url(
            input.callback_url.as_deref(),
            &self.config.allowed_callback_urls,
            &self.config.default_redirect,
        );
        let session = self.issuer.issue(&user, false, &redirect_to).await?;
        Ok(LoginOutcome::Success(session))
    }

    /// Final gate before a session exists, independent of how the attempt got
    /// here: the email must be verified, and a two-factor account must hold a
    /// confirmation, which is spent on the spot so the next login
    /// re-challenges.
    pub async fn authorize_sign_in(&self, user: &User) -> Result<SignInGate, Error> {
        if !user.is_email_verified() {
            return Ok(SignInGate::EmailUnverified);
        }

        if user.two_factor_enabled
            && !self.tokens.take_two_factor_confirmation(&user.id).await?
        {
            return Ok(SignInGate::ConfirmationMissing);
        }

        Ok(SignInGate::Allowed)
    }

    async fn send_confirmation_email(&self, email: &str) -> Result<LoginOutcome, Error> {
        let token = self
            .tokens
            .issue(NewToken::email_verification(email, self.config.token_ttl))
            .await?;

        let body = format!("Confirm your email address with this code: {}", token.token);
        if let Err(e) = self.mailer.send(email, "Confirm your email", &body).await {
            tracing::warn!(error = %e, "Failed to send verification email during login");
            self.tokens.delete(&token.id).await?;
            return Ok(LoginOutcome::ResendEmailError);
        }

        Ok(LoginOutcome::NewConfirmationEmailSent)
    }

    async fn send_two_factor_code(&self, user: &User, reuse: bool) -> Result<LoginOutcome, Error> {
        let (code, token_id) = if reuse {
            match self
                .tokens
                .get_active(crate::token::TokenPurpose::TwoFactor, &user.email)
                .await?
            {
                Some(token) => (token.token, None),
                // Expired between the composite read and now; fall through to
                // issuing a fresh one.
                None => self.issue_two_factor(user).await?,
            }
        } else {
            self.issue_two_factor(user).await?
        };

        let body = format!("Your two-factor code is {code}. It expires in one hour.");
        if let Err(e) = self
            .mailer
            .send(&user.email, "Your two-factor code", &body)
            .await
        {
            tracing::warn!(error = %e, "Failed to send two-factor code");
            if let Some(token_id) = token_id {
                self.tokens.delete(&token_id).await?;
            }
            return Ok(LoginOutcome::ResendEmailError);
        }

        Ok(LoginOutcome::TwoFactorRequired)
    }

    async fn issue_two_factor(&self, user: &User) -> Result<(String, Option<String>), Error> {
        let token = self
            .tokens
            .issue(NewToken::two_factor(
                &user.email,
                user.id.clone(),
                self.config.token_ttl,
            ))
            .await?;
        Ok((token.token, Some(token.id)))
    }
}

fn build_facts(data: Option<&LoginAuthData>, password: &str) -> LoginFacts {
    match data {
        None => LoginFacts {
            account_exists: false,
            has_password: false,
            password: PasswordCheck {
                is_valid: false,
                needs_upgrade: false,
            },
            email_verified: false,
            has_active_verification_token: false,
            two_factor_enabled: false,
            active_two_factor: None,
        },
        Some(data) => {
            let password = match &data.user.password_hash {
                Some(hash) => verify_password(password, hash),
                None => PasswordCheck {
                    is_valid: false,
                    needs_upgrade: false,
                },
            };
            LoginFacts {
                account_exists: true,
                has_password: data.user.has_password(),
                password,
                email_verified: data.user.is_email_verified(),
                has_active_verification_token: data.active_verification_token.is_some(),
                two_factor_enabled: data.user.two_factor_enabled,
                active_two_factor: data.active_two_factor_token.as_ref().map(|t| {
                    ActiveTwoFactor {
                        token_id: t.id.clone(),
                        code: t.token.clone(),
                    }
                }),
            }
        }
    }
}


#[cfg(test)]
mod service_tests {
    use super::*;
    use crate::{
        password::hash_password,
        session::{JwtConfig, JwtSessionIssuer},
        test_support::{MemoryRepositories, MemoryTokenRepository, RecordingMailer},
        token::{AuthToken, TokenPurpose},
        user::{NewUser, UserId},
    };
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    struct Fixture {
        repos: MemoryRepositories,
        mailer: Arc<RecordingMailer>,
        service: LoginService<
            crate::test_support::MemoryUserRepository,
            crate::test_support::MemoryTokenRepository,
        >,
    }

    fn fixture() -> Fixture {
        let repos = MemoryRepositories::new();
        let mailer = Arc::new(RecordingMailer::default());
        let issuer = Arc::new(JwtSessionIssuer::new(JwtConfig::new(
            b"login-test-secret".to_vec(),
        )));
        let service = LoginService::new(
            repos.users.clone(),
            repos.tokens.clone(),
            mailer.clone(),
            issuer,
            AuthConfig::default(),
        );
        Fixture {
            repos,
            mailer,
            service,
        }
    }

    async fn seed_user(fixture: &Fixture, email: &str, verified: bool, two_factor: bool) {
        let mut user = NewUser::new(email.to_string())
            .with_password_hash(hash_password("hunter2hunter2").unwrap());
        if verified {
            user = user.with_email_verified_at(Utc::now());
        }
        let mut created = fixture.repos.users.create(user).await.unwrap();
        if two_factor {
            created.two_factor_enabled = true;
            fixture.repos.users.replace(created).await;
        }
    }

    fn login_input(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
            two_factor_code: None,
            callback_url: None,
        }
    }

    #[tokio::test]
    async fn test_login_happy_path() {
        let f = fixture();
        seed_user(&f, "in@example.com", true, false).await;

        let outcome = f
            .service
            .login(login_input("in@example.com", "hunter2hunter2"))
            .await
            .unwrap();

        match outcome {
            LoginOutcome::Success(session) => {
                assert_eq!(session.redirect_to, "/settings");
                assert!(!session.token.is_empty());
            }
            other => panic!("Expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let f = fixture();
        seed_user(&f, "in@example.com", true, false).await;

        let outcome = f
            .service
            .login(login_input("in@example.com", "not-the-password"))
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::WrongCredentials);

        // Unknown account is indistinguishable
        let outcome = f
            .service
            .login(login_input("nobody@example.com", "not-the-password"))
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::WrongCredentials);
    }

    #[tokio::test]
    async fn test_login_unverified_sends_confirmation() {
        let f = fixture();
        seed_user(&f, "fresh@example.com", false, false).await;

        let outcome = f
            .service
            .login(login_input("fresh@example.com", "hunter2hunter2"))
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::NewConfirmationEmailSent);
        assert_eq!(f.mailer.sent().await.len(), 1);

        // Second attempt finds the active token and does not resend
        let outcome = f
            .service
            .login(login_input("fresh@example.com", "hunter2hunter2"))
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::ConfirmationEmailAlreadySent);
        assert_eq!(f.mailer.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_login_two_factor_round_trip() {
        let f = fixture();
        seed_user(&f, "2fa@example.com", true, true).await;

        // First pass: challenged, code mailed
        let outcome = f
            .service
            .login(login_input("2fa@example.com", "hunter2hunter2"))
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::TwoFactorRequired);

        let code = f
            .repos
            .tokens
            .get_active(TokenPurpose::TwoFactor, "2fa@example.com")
            .await
            .unwrap()
            .expect("two-factor token issued")
            .token;

        // Wrong code
        let mut input = login_input("2fa@example.com", "hunter2hunter2");
        input.two_factor_code = Some(if code == "000000" { "000001" } else { "000000" }.to_string());
        let outcome = f.service.login(input).await.unwrap();
        assert_eq!(outcome, LoginOutcome::TwoFactorCodeInvalid);

        // Right code signs in and consumes both token and confirmation
        let mut input = login_input("2fa@example.com", "hunter2hunter2");
        input.two_factor_code = Some(code);
        let outcome = f.service.login(input).await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Success(_)));

        assert!(
            f.repos
                .tokens
                .get_active(TokenPurpose::TwoFactor, "2fa@example.com")
                .await
                .unwrap()
                .is_none()
        );

        // Confirmation was spent by the gate: a code-bearing retry is missing
        // its token again.
        let mut input = login_input("2fa@example.com", "hunter2hunter2");
        input.two_factor_code = Some("123456".to_string());
        let outcome = f.service.login(input).await.unwrap();
        assert_eq!(outcome, LoginOutcome::TwoFactorTokenMissing);
    }

    #[tokio::test]
    async fn test_login_callback_url_allow_list() {
        let repos = MemoryRepositories::new();
        let mailer = Arc::new(RecordingMailer::default());
        let issuer = Arc::new(JwtSessionIssuer::new(JwtConfig::new(
            b"login-test-secret".to_vec(),
        )));
        let config = AuthConfig::default()
            .with_allowed_callback_urls(vec!["/dashboard".to_string()]);
        let service = LoginService::new(
            repos.users.clone(),
            repos.tokens.clone(),
            mailer.clone(),
            issuer,
            config,
        );
        let f = Fixture {
            repos,
            mailer,
            service,
        };
        seed_user(&f, "cb@example.com", true, false).await;

        let mut input = login_input("cb@example.com", "hunter2hunter2");
        input.callback_url = Some("https://evil.example/phish".to_string());
        match f.service.login(input).await.unwrap() {
            LoginOutcome::Success(session) => assert_eq!(session.redirect_to, "/settings"),
            other => panic!("Expected success, got {other:?}"),
        }

        let mut input = login_input("cb@example.com", "hunter2hunter2");
        input.callback_url = Some("/dashboard".to_string());
        match f.service.login(input).await.unwrap() {
            LoginOutcome::Success(session) => assert_eq!(session.redirect_to, "/dashboard"),
            other => panic!("Expected success, got {other:?}"),
        }
    }

    /// Delegates to the in-memory store but always loses the consume race,
    /// as if a concurrent submit spent the token after the composite read.
    struct RacedTokens(Arc<MemoryTokenRepository>);

    #[async_trait]
    impl TokenRepository for RacedTokens {
        async fn issue(&self, token: NewToken) -> Result<AuthToken, Error> {
            self.0.issue(token).await
        }

        async fn get_active(
            &self,
            purpose: TokenPurpose,
            email: &str,
        ) -> Result<Option<AuthToken>, Error> {
            self.0.get_active(purpose, email).await
        }

        async fn find_valid(
            &self,
            purpose: TokenPurpose,
            token: &str,
        ) -> Result<Option<AuthToken>, Error> {
            self.0.find_valid(purpose, token).await
        }

        async fn find_with_user(
            &self,
            purpose: TokenPurpose,
            token: &str,
        ) -> Result<Option<(AuthToken, User)>, Error> {
            self.0.find_with_user(purpose, token).await
        }

        async fn get_active_email_change_request(
            &self,
            requested_by: &str,
        ) -> Result<Option<AuthToken>, Error> {
            self.0.get_active_email_change_request(requested_by).await
        }

        async fn delete(&self, token_id: &str) -> Result<(), Error> {
            self.0.delete(token_id).await
        }

        async fn delete_expired(&self, purpose: TokenPurpose) -> Result<u64, Error> {
            self.0.delete_expired(purpose).await
        }

        async fn count_active_by_ip(
            &self,
            purpose: TokenPurpose,
            hashed_ip: &str,
        ) -> Result<i64, Error> {
            self.0.count_active_by_ip(purpose, hashed_ip).await
        }

        async fn consume_two_factor(
            &self,
            _user_id: &UserId,
            _token_id: &str,
        ) -> Result<(), Error> {
            Err(Error::Storage(StorageError::NotFound))
        }

        async fn take_two_factor_confirmation(&self, user_id: &UserId) -> Result<bool, Error> {
            self.0.take_two_factor_confirmation(user_id).await
        }
    }

    #[tokio::test]
    async fn test_login_two_factor_double_submit_loser_is_missing_token() {
        let repos = MemoryRepositories::new();
        let mailer = Arc::new(RecordingMailer::default());
        let issuer = Arc::new(JwtSessionIssuer::new(JwtConfig::new(
            b"login-test-secret".to_vec(),
        )));
        let service = LoginService::new(
            repos.users.clone(),
            Arc::new(RacedTokens(repos.tokens.clone())),
            mailer,
            issuer,
            AuthConfig::default(),
        );

        let user = NewUser::new("race@example.com".to_string())
            .with_password_hash(hash_password("hunter2hunter2").unwrap())
            .with_email_verified_at(Utc::now());
        let mut created = repos.users.create(user).await.unwrap();
        created.two_factor_enabled = true;
        repos.users.replace(created.clone()).await;

        // The code is active in the composite read; consuming it fails.
        let token = repos
            .tokens
            .issue(NewToken::two_factor(
                "race@example.com",
                created.id,
                Duration::hours(1),
            ))
            .await
            .unwrap();

        let mut input = login_input("race@example.com", "hunter2hunter2");
        input.two_factor_code = Some(token.token);
        let outcome = service.login(input).await.unwrap();
        assert_eq!(outcome, LoginOutcome::TwoFactorTokenMissing);
    }
}
