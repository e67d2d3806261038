use serde::{Deserialize, Serialize};

use gatehouse::SessionClaims;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyMagicLinkRequest {
    pub token: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    #[serde(default)]
    pub two_factor_enabled: Option<bool>,
    #[serde(default)]
    pub image: Option<String>,
}

/// The one body shape every flow endpoint answers with: a success message,
/// an error message, or a two-factor challenge. Sign-in successes carry the
/// post-login redirect as data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlowResponse {
    Success {
        success: String,
        #[serde(rename = "redirectTo", skip_serializing_if = "Option::is_none")]
        redirect_to: Option<String>,
    },
    Error {
        error: String,
    },
    TwoFactor {
        #[serde(rename = "twoFactor")]
        two_factor: bool,
    },
}

impl FlowResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Success {
            success: message.into(),
            redirect_to: None,
        }
    }

    pub fn signed_in(message: impl Into<String>, redirect_to: impl Into<String>) -> Self {
        Self::Success {
            success: message.into(),
            redirect_to: Some(redirect_to.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn two_factor() -> Self {
        Self::TwoFactor { two_factor: true }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub claims: SessionClaims,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// The caller's network identity, as seen by the abuse caps.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub ip: Option<std::net::IpAddr>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub name: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: CookieSameSite,
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "session_token".to_string(),
            http_only: true,
            secure: true,
            same_site: CookieSameSite::Lax,
            path: "/".to_string(),
        }
    }
}

impl CookieConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Like the default, but without `Secure` so plain-HTTP localhost works.
    pub fn development() -> Self {
        Self {
            secure: false,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum CookieSameSite {
    Strict,
    #[default]
    Lax,
    None,
}
