//! User domain types

use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::ValidationError,
    id::{generate_prefixed_id, validate_prefixed_id},
    validation::{normalize_email, validate_email, validate_name},
};

pub const USER_ID_PREFIX: &str = "usr";

/// Unique identifier for a user, `usr_` followed by base64url randomness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Generate a new random user ID.
    pub fn new_random() -> Self {
        Self(generate_prefixed_id(USER_ID_PREFIX))
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID has the expected prefix and entropy.
    pub fn is_valid(&self) -> bool {
        validate_prefixed_id(&self.0, USER_ID_PREFIX)
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Authorization role attached to a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown role: {other}"
            ))),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user account.
///
/// `password_hash` is `None` for accounts created through OAuth or magic link
/// that never set a password. `email_verified_at` being `None` blocks
/// credential login until the verification flow completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub role: Role,
    pub two_factor_enabled: bool,
    /// Hashed IP recorded at registration, used only for abuse caps.
    pub registration_ip_hash: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn builder() -> UserBuilder {
        UserBuilder::default()
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[derive(Default)]
pub struct UserBuilder {
    id: Option<UserId>,
    email: Option<String>,
    name: Option<String>,
    password_hash: Option<String>,
    email_verified_at: Option<DateTime<Utc>>,
    role: Role,
    two_factor_enabled: bool,
    registration_ip_hash: Option<String>,
    image: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl UserBuilder {
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn password_hash(mut self, password_hash: Option<String>) -> Self {
        self.password_hash = password_hash;
        self
    }

    pub fn email_verified_at(mut self, email_verified_at: Option<DateTime<Utc>>) -> Self {
        self.email_verified_at = email_verified_at;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn two_factor_enabled(mut self, two_factor_enabled: bool) -> Self {
        self.two_factor_enabled = two_factor_enabled;
        self
    }

    pub fn registration_ip_hash(mut self, registration_ip_hash: Option<String>) -> Self {
        self.registration_ip_hash = registration_ip_hash;
        self
    }

    pub fn image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn build(self) -> Result<User, Error> {
        let email = self
            .email
            .ok_or_else(|| ValidationError::MissingField("Email is required".to_string()))?;
        validate_email(&email)?;
        validate_name(self.name.as_deref())?;

        let now = Utc::now();
        Ok(User {
            id: self.id.unwrap_or_else(UserId::new_random),
            email: normalize_email(&email),
            name: self.name,
            password_hash: self.password_hash,
            email_verified_at: self.email_verified_at,
            role: self.role,
            two_factor_enabled: self.two_factor_enabled,
            registration_ip_hash: self.registration_ip_hash,
            image: self.image,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        })
    }
}

/// The data needed to create a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub registration_ip_hash: Option<String>,
    pub image: Option<String>,
}

impl NewUser {
    pub fn new(email: String) -> Self {
        Self {
            id: UserId::new_random(),
            email: normalize_email(&email),
            name: None,
            password_hash: None,
            email_verified_at: None,
            registration_ip_hash: None,
            image: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn with_password_hash(mut self, password_hash: String) -> Self {
        self.password_hash = Some(password_hash);
        self
    }

    pub fn with_email_verified_at(mut self, at: DateTime<Utc>) -> Self {
        self.email_verified_at = Some(at);
        self
    }

    pub fn with_registration_ip_hash(mut self, hashed_ip: Option<String>) -> Self {
        self.registration_ip_hash = hashed_ip;
        self
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = image;
        self
    }
}

/// A link between a user and an external identity provider account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthAccount {
    pub user_id: UserId,
    /// Provider name, e.g. `google` or `github`.
    pub provider: String,
    /// The provider's stable identifier for this account.
    pub subject: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_generation() {
        let id = UserId::new_random();
        assert!(id.as_str().starts_with("usr_"));
        assert!(id.is_valid());
        assert_ne!(id, UserId::new_random());
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::parse("ADMIN").unwrap(), Role::Admin);
        assert_eq!(Role::parse("USER").unwrap(), Role::User);
        assert!(Role::parse("ROOT").is_err());
        assert_eq!(Role::Admin.as_str(), "ADMIN");
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }

    #[test]
    fn test_user_builder() {
        let user = User::builder()
            .email("Test@Example.com".to_string())
            .name(Some("Test".to_string()))
            .build()
            .unwrap();

        assert_eq!(user.email, "test@example.com");
        assert!(user.id.is_valid());
        assert_eq!(user.role, Role::User);
        assert!(!user.is_email_verified());
        assert!(!user.has_password());
    }

    #[test]
    fn test_user_builder_rejects_bad_input() {
        assert!(User::builder().build().is_err());
        assert!(
            User::builder()
                .email("not-an-email".to_string())
                .build()
                .is_err()
        );
        assert!(
            User::builder()
                .email("a@b.com".to_string())
                .name(Some("  ".to_string()))
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_new_user_normalizes_email() {
        let new_user = NewUser::new(" Person@Example.COM".to_string());
        assert_eq!(new_user.email, "person@example.com");
        assert!(new_user.id.is_valid());
    }
}
