//! In-memory repositories and mailers for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    Error,
    error::{AuthError, StorageError},
    flows::settings::Changeset,
    mailer::{MailError, Mailer},
    repositories::{
        LoginAuthData, OAuthRepository, ResetPasswordData, SettingsData, TokenRepository,
        UserRepository,
    },
    token::{AuthToken, NewToken, TokenPurpose},
    user::{NewUser, OAuthAccount, Role, User, UserId},
};

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    tokens: HashMap<String, AuthToken>,
    confirmations: HashSet<String>,
    oauth_accounts: Vec<OAuthAccount>,
}

impl State {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|u| u.email == email)
    }

    fn active_token(&self, purpose: TokenPurpose, email: &str) -> Option<&AuthToken> {
        self.tokens
            .values()
            .find(|t| t.purpose == purpose && t.email == email && !t.is_expired())
    }

    fn oauth_count(&self, user_id: &UserId) -> i64 {
        self.oauth_accounts
            .iter()
            .filter(|a| &a.user_id == user_id)
            .count() as i64
    }

    fn insert_user(&mut self, new_user: NewUser) -> Result<User, Error> {
        if self.user_by_email(&new_user.email).is_some() {
            return Err(Error::Auth(AuthError::UserAlreadyExists));
        }
        let now = Utc::now();
        let user = User {
            id: new_user.id,
            email: new_user.email,
            name: new_user.name,
            password_hash: new_user.password_hash,
            email_verified_at: new_user.email_verified_at,
            role: Role::User,
            two_factor_enabled: false,
            registration_ip_hash: new_user.registration_ip_hash,
            image: new_user.image,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id.as_str().to_string(), user.clone());
        Ok(user)
    }

    fn insert_token(&mut self, new_token: NewToken) -> AuthToken {
        let token = new_token.into_token();
        self.tokens
            .retain(|_, t| !(t.purpose == token.purpose && t.email == token.email));
        self.tokens.insert(token.id.clone(), token.clone());
        token
    }
}

type Shared = Arc<Mutex<State>>;

pub(crate) struct MemoryUserRepository {
    state: Shared,
}

pub(crate) struct MemoryTokenRepository {
    state: Shared,
}

pub(crate) struct MemoryOAuthRepository {
    state: Shared,
}

/// All three repositories over one shared state, like one database.
pub(crate) struct MemoryRepositories {
    pub users: Arc<MemoryUserRepository>,
    pub tokens: Arc<MemoryTokenRepository>,
    pub oauth: Arc<MemoryOAuthRepository>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        let state: Shared = Arc::new(Mutex::new(State::default()));
        Self {
            users: Arc::new(MemoryUserRepository {
                state: state.clone(),
            }),
            tokens: Arc::new(MemoryTokenRepository {
                state: state.clone(),
            }),
            oauth: Arc::new(MemoryOAuthRepository { state }),
        }
    }
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Test helper: overwrite a user row directly.
    pub async fn replace(&self, user: User) {
        self.state
            .lock()
            .await
            .users
            .insert(user.id.as_str().to_string(), user);
    }
}

impl MemoryTokenRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        self.state.lock().await.insert_user(user)
    }

    async fn create_credentials_user(
        &self,
        user: NewUser,
        verification: NewToken,
    ) -> Result<(User, AuthToken), Error> {
        let mut state = self.state.lock().await;
        let user = state.insert_user(user)?;
        let token = state.insert_token(verification);
        Ok((user, token))
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        Ok(self.state.lock().await.users.get(id.as_str()).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self.state.lock().await.user_by_email(email).cloned())
    }

    async fn count_by_registration_ip(&self, hashed_ip: &str) -> Result<i64, Error> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .filter(|u| u.registration_ip_hash.as_deref() == Some(hashed_ip))
            .count() as i64)
    }

    async fn mark_email_verified(
        &self,
        user_id: &UserId,
        email: &str,
        token_id: &str,
    ) -> Result<User, Error> {
        let mut state = self.state.lock().await;
        state.tokens.remove(token_id);
        let user = state
            .users
            .get_mut(user_id.as_str())
            .ok_or(Error::Storage(StorageError::NotFound))?;
        user.email = email.to_string();
        user.email_verified_at.get_or_insert_with(Utc::now);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn reset_password(
        &self,
        user_id: &UserId,
        password_hash: &str,
        token_id: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.tokens.remove(token_id);
        let user = state
            .users
            .get_mut(user_id.as_str())
            .ok_or(Error::Storage(StorageError::NotFound))?;
        user.password_hash = Some(password_hash.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn consume_magic_link(&self, email: &str, token_id: &str) -> Result<User, Error> {
        let mut state = self.state.lock().await;
        state
            .tokens
            .remove(token_id)
            .ok_or(Error::Storage(StorageError::NotFound))?;

        if state.user_by_email(email).is_none() {
            state.insert_user(NewUser::new(email.to_string()))?;
        }
        let id = state
            .user_by_email(email)
            .map(|u| u.id.as_str().to_string())
            .ok_or(Error::Storage(StorageError::NotFound))?;
        let user = state
            .users
            .get_mut(&id)
            .ok_or(Error::Storage(StorageError::NotFound))?;
        user.email_verified_at.get_or_insert_with(Utc::now);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn apply_settings(&self, user_id: &UserId, changes: &Changeset) -> Result<User, Error> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(user_id.as_str())
            .ok_or(Error::Storage(StorageError::NotFound))?;
        if let Some(name) = &changes.name {
            user.name = Some(name.clone());
        }
        if let Some(hash) = &changes.password_hash {
            user.password_hash = Some(hash.clone());
        }
        if let Some(two_factor_enabled) = changes.two_factor_enabled {
            user.two_factor_enabled = two_factor_enabled;
        }
        if let Some(image) = &changes.image {
            user.image = Some(image.clone());
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn login_auth_data(&self, email: &str) -> Result<Option<LoginAuthData>, Error> {
        let state = self.state.lock().await;
        let Some(user) = state.user_by_email(email).cloned() else {
            return Ok(None);
        };
        Ok(Some(LoginAuthData {
            active_verification_token: state
                .active_token(TokenPurpose::EmailVerification, email)
                .cloned(),
            active_two_factor_token: state.active_token(TokenPurpose::TwoFactor, email).cloned(),
            has_two_factor_confirmation: state.confirmations.contains(user.id.as_str()),
            oauth_account_count: state.oauth_count(&user.id),
            user,
        }))
    }

    async fn reset_password_data(&self, email: &str) -> Result<Option<ResetPasswordData>, Error> {
        let state = self.state.lock().await;
        let Some(user) = state.user_by_email(email) else {
            return Ok(None);
        };
        Ok(Some(ResetPasswordData {
            user_id: user.id.clone(),
            has_password: user.has_password(),
            oauth_account_count: state.oauth_count(&user.id),
            active_reset_token: state.active_token(TokenPurpose::PasswordReset, email).cloned(),
        }))
    }

    async fn settings_data(&self, user_id: &UserId) -> Result<Option<SettingsData>, Error> {
        let state = self.state.lock().await;
        let Some(user) = state.users.get(user_id.as_str()).cloned() else {
            return Ok(None);
        };
        let is_oauth = state.oauth_count(&user.id) > 0;
        Ok(Some(SettingsData { user, is_oauth }))
    }

    async fn delete(&self, id: &UserId) -> Result<(), Error> {
        self.state.lock().await.users.remove(id.as_str());
        Ok(())
    }
}

#[async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn issue(&self, token: NewToken) -> Result<AuthToken, Error> {
        Ok(self.state.lock().await.insert_token(token))
    }

    async fn get_active(
        &self,
        purpose: TokenPurpose,
        email: &str,
    ) -> Result<Option<AuthToken>, Error> {
        Ok(self.state.lock().await.active_token(purpose, email).cloned())
    }

    async fn find_valid(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<AuthToken>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .tokens
            .values()
            .find(|t| t.purpose == purpose && t.token == token && !t.is_expired())
            .cloned())
    }

    async fn find_with_user(
        &self,
        purpose: TokenPurpose,
        token: &str,
    ) -> Result<Option<(AuthToken, User)>, Error> {
        let state = self.state.lock().await;
        let Some(found) = state
            .tokens
            .values()
            .find(|t| t.purpose == purpose && t.token == token)
            .cloned()
        else {
            return Ok(None);
        };
        let owner_email = found.requested_by.as_deref().unwrap_or(&found.email);
        Ok(state
            .user_by_email(owner_email)
            .cloned()
            .map(|user| (found, user)))
    }

    async fn get_active_email_change_request(
        &self,
        requested_by: &str,
    ) -> Result<Option<AuthToken>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .tokens
            .values()
            .find(|t| {
                t.purpose == TokenPurpose::EmailVerification
                    && t.requested_by.as_deref() == Some(requested_by)
                    && !t.is_expired()
            })
            .cloned())
    }

    async fn delete(&self, token_id: &str) -> Result<(), Error> {
        self.state.lock().await.tokens.remove(token_id);
        Ok(())
    }

    async fn delete_expired(&self, purpose: TokenPurpose) -> Result<u64, Error> {
        let mut state = self.state.lock().await;
        let before = state.tokens.len();
        state
            .tokens
            .retain(|_, t| !(t.purpose == purpose && t.is_expired()));
        Ok((before - state.tokens.len()) as u64)
    }

    async fn count_active_by_ip(
        &self,
        purpose: TokenPurpose,
        hashed_ip: &str,
    ) -> Result<i64, Error> {
        Ok(self
            .state
            .lock()
            .await
            .tokens
            .values()
            .filter(|t| {
                t.purpose == purpose
                    && t.hashed_ip.as_deref() == Some(hashed_ip)
                    && !t.is_expired()
            })
            .count() as i64)
    }

    async fn consume_two_factor(&self, user_id: &UserId, token_id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state
            .tokens
            .remove(token_id)
            .ok_or(Error::Storage(StorageError::NotFound))?;
        state.confirmations.insert(user_id.as_str().to_string());
        Ok(())
    }

    async fn take_two_factor_confirmation(&self, user_id: &UserId) -> Result<bool, Error> {
        Ok(self.state.lock().await.confirmations.remove(user_id.as_str()))
    }
}

#[async_trait]
impl OAuthRepository for MemoryOAuthRepository {
    async fn link_account(
        &self,
        user_id: &UserId,
        provider: &str,
        subject: &str,
    ) -> Result<OAuthAccount, Error> {
        let mut state = self.state.lock().await;
        if state
            .oauth_accounts
            .iter()
            .any(|a| a.provider == provider && a.subject == subject)
        {
            return Err(Error::Auth(AuthError::AccountAlreadyLinked));
        }
        let now = Utc::now();
        let account = OAuthAccount {
            user_id: user_id.clone(),
            provider: provider.to_string(),
            subject: subject.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.oauth_accounts.push(account.clone());
        Ok(account)
    }

    async fn find_user_by_provider(
        &self,
        provider: &str,
        subject: &str,
    ) -> Result<Option<User>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .oauth_accounts
            .iter()
            .find(|a| a.provider == provider && a.subject == subject)
            .and_then(|a| state.users.get(a.user_id.as_str()).cloned()))
    }

    async fn count_accounts(&self, user_id: &UserId) -> Result<i64, Error> {
        Ok(self.state.lock().await.oauth_count(user_id))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Captures every mail for assertions.
#[derive(Default)]
pub(crate) struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        self.sent.lock().await.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Simulates a mail outage.
pub(crate) struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
        Err(MailError::Transport("simulated mail outage".to_string()))
    }
}
