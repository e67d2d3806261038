//! Runtime configuration for the authentication flows

use chrono::Duration;

/// Deployment environment. Some abuse caps only apply in production so local
/// development is not throttled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Tunable policy shared by the flows.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    /// Lifetime of every one-time token (verification links, reset links,
    /// two-factor codes, magic links).
    pub token_ttl: Duration,
    /// Production-only cap on accounts registered from one hashed IP.
    pub registration_ip_cap: i64,
    /// Cap on unexpired magic-link tokens issued to one hashed IP.
    pub magic_link_ip_cap: i64,
    /// Post-login redirect targets callers may request. Anything else falls
    /// back to `default_redirect`.
    pub allowed_callback_urls: Vec<String>,
    pub default_redirect: String,
}

impl AuthConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Default::default()
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_registration_ip_cap(mut self, cap: i64) -> Self {
        self.registration_ip_cap = cap;
        self
    }

    pub fn with_magic_link_ip_cap(mut self, cap: i64) -> Self {
        self.magic_link_ip_cap = cap;
        self
    }

    pub fn with_allowed_callback_urls(mut self, urls: Vec<String>) -> Self {
        self.allowed_callback_urls = urls;
        self
    }

    pub fn with_default_redirect(mut self, redirect: impl Into<String>) -> Self {
        self.default_redirect = redirect.into();
        self
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            token_ttl: Duration::hours(1),
            registration_ip_cap: 2,
            magic_link_ip_cap: 2,
            allowed_callback_urls: Vec::new(),
            default_redirect: "/settings".to_string(),
        }
    }
}
