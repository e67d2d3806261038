//! OAuth sign-in flow
//!
//! The provider handshake happens elsewhere; this flow takes an already
//! verified external identity and maps it onto a local account. Provider
//! emails are trusted, so accounts created or matched here are stamped
//! verified immediately.

use std::sync::Arc;

use crate::{
    Error,
    config::AuthConfig,
    repositories::{OAuthRepository, UserRepository},
    session::{IssuedSession, SessionIssuer, validate_callback_url},
    user::NewUser,
};
use chrono::Utc;

/// A verified identity handed over by an external provider.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub provider: String,
    /// The provider's stable subject identifier.
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

pub struct OAuthService<U, O>
where
    U: UserRepository,
    O: OAuthRepository,
{
    users: Arc<U>,
    oauth: Arc<O>,
    issuer: Arc<dyn SessionIssuer>,
    config: AuthConfig,
}

impl<U, O> OAuthService<U, O>
where
    U: UserRepository,
    O: OAuthRepository,
{
    pub fn new(
        users: Arc<U>,
        oauth: Arc<O>,
        issuer: Arc<dyn SessionIssuer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            oauth,
            issuer,
            config,
        }
    }

    /// Sign in with an external identity, linking or creating the local
    /// account as needed, and issue a session.
    pub async fn sign_in(
        &self,
        identity: ExternalIdentity,
        callback_url: Option<&str>,
    ) -> Result<IssuedSession, Error> {
        let user = match self
            .oauth
            .find_user_by_provider(&identity.provider, &identity.subject)
            .await?
        {
            Some(user) => user,
            None => {
                let user = match self.users.find_by_email(&identity.email).await? {
                    Some(existing) => existing,
                    None => {
                        self.users
                            .create(
                                NewUser::new(identity.email.clone())
                                    .with_name(identity.name.clone())
                                    .with_image(identity.image.clone())
                                    .with_email_verified_at(Utc::now()),
                            )
                            .await?
                    }
                };
                self.oauth
                    .link_account(&user.id, &identity.provider, &identity.subject)
                    .await?;
                user
            }
        };

        let redirect_to = validate_callback_url(
            callback_url,
            &self.config.allowed_callback_urls,
            &self.config.default_redirect,
        );
        self.issuer.issue(&user, true, &redirect_to).await
    }
}
