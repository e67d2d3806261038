use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use axum_extra::extract::cookie::{Cookie, SameSite};

use gatehouse::flows::{
    LoginInput, LoginOutcome, MagicLinkOutcome, MagicLinkVerifyOutcome, NewPasswordOutcome,
    RegisterInput, RegisterOutcome, ResetRequestOutcome, SettingsInput, SettingsOutcome,
    VerifyEmailOutcome,
};
use gatehouse::{Gatehouse, RepositoryProvider, UserId};

use crate::{
    error::{ApiError, Result},
    extractors::{AdminClaims, AuthClaims},
    middleware::{AuthState, auth_middleware},
    types::*,
};

pub fn create_router<R>(gatehouse: Arc<Gatehouse<R>>, cookie_config: CookieConfig) -> Router
where
    R: RepositoryProvider + 'static,
{
    let state = AuthState { gatehouse };

    Router::new()
        .route("/health", get(health_handler))
        .route("/session", get(get_session_handler))
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/verify-email", post(verify_email_handler))
        .route("/password-reset/request", post(password_reset_request_handler))
        .route("/password-reset/confirm", post(password_reset_confirm_handler))
        .route("/magic-link", post(magic_link_request_handler))
        .route("/magic-link/verify", post(magic_link_verify_handler))
        .route("/settings", patch(settings_handler))
        .route("/admin", get(admin_handler))
        .route("/admin/action", post(admin_action_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<R>,
        ))
        .with_state(state)
        .layer(axum::Extension(cookie_config))
}

fn session_cookie(config: &CookieConfig, token: &str) -> String {
    let same_site = match config.same_site {
        CookieSameSite::Strict => SameSite::Strict,
        CookieSameSite::Lax => SameSite::Lax,
        CookieSameSite::None => SameSite::None,
    };

    Cookie::build((config.name.clone(), token.to_string()))
        .path(config.path.clone())
        .http_only(config.http_only)
        .secure(config.secure)
        .same_site(same_site)
        .to_string()
}

async fn health_handler<R>(State(state): State<AuthState<R>>) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.gatehouse.health_check().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn get_session_handler(AuthClaims(claims): AuthClaims) -> Result<impl IntoResponse> {
    Ok(Json(SessionResponse { claims }))
}

async fn register_handler<R>(
    State(state): State<AuthState<R>>,
    connection_info: ConnectionInfo,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let outcome = state
        .gatehouse
        .register(RegisterInput {
            email: payload.email,
            password: payload.password,
            name: payload.name,
            ip: connection_info.ip,
        })
        .await?;

    let response = match outcome {
        RegisterOutcome::Success { email_sent: true } => {
            FlowResponse::success("Success! Check your inbox to verify your account")
        }
        RegisterOutcome::Success { email_sent: false } => FlowResponse::success(
            "Account created but Failed to send your email for email verification.",
        ),
        RegisterOutcome::EmailExists => FlowResponse::error("Email already registered!"),
        RegisterOutcome::AccountLimit => {
            FlowResponse::error("You are not allowed to register more accounts on this app preview")
        }
        RegisterOutcome::IpValidationFailed => {
            FlowResponse::error("Sorry! Something went wrong. Could not identify you as a human")
        }
        RegisterOutcome::InvalidInput(_) => FlowResponse::error("Invalid fields"),
    };

    Ok(Json(response))
}

async fn login_handler<R>(
    State(state): State<AuthState<R>>,
    axum::Extension(cookie_config): axum::Extension<CookieConfig>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response>
where
    R: RepositoryProvider,
{
    let outcome = state
        .gatehouse
        .login(LoginInput {
            email: payload.email,
            password: payload.password,
            two_factor_code: payload.code,
            callback_url: payload.callback_url,
        })
        .await?;

    let response = match outcome {
        LoginOutcome::Success(session) => {
            let cookie = session_cookie(&cookie_config, &session.token);
            return Ok((
                [(header::SET_COOKIE, cookie)],
                Json(FlowResponse::signed_in(
                    "Successfully logged in",
                    session.redirect_to,
                )),
            )
                .into_response());
        }
        LoginOutcome::WrongCredentials => FlowResponse::error("Invalid credentials"),
        LoginOutcome::PasswordNeedsUpdate => FlowResponse::error(
            "You need to reset your password. Please use the password reset option.",
        ),
        LoginOutcome::ConfirmationEmailAlreadySent => {
            FlowResponse::error("Confirmation email already sent! Check your inbox!")
        }
        LoginOutcome::NewConfirmationEmailSent => {
            FlowResponse::error("Sent new confirmation email! Check your inbox!")
        }
        LoginOutcome::ResendEmailError => {
            FlowResponse::error("Something went wrong while sending your email! Try again!")
        }
        LoginOutcome::TwoFactorRequired => FlowResponse::two_factor(),
        LoginOutcome::TwoFactorTokenMissing => {
            FlowResponse::error("Two-factor authentication code required")
        }
        LoginOutcome::TwoFactorCodeInvalid => FlowResponse::error("Invalid authentication code"),
        LoginOutcome::InvalidInput(_) => FlowResponse::error("Invalid fields!"),
    };

    Ok(Json(response).into_response())
}

async fn verify_email_handler<R>(
    State(state): State<AuthState<R>>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let outcome = state.gatehouse.verify_email(&payload.token).await?;

    let response = match outcome {
        VerifyEmailOutcome::EmailVerified => {
            FlowResponse::success("Email verified successfully! You can now login")
        }
        VerifyEmailOutcome::EmailAlreadyVerified => {
            FlowResponse::error("Your email is already verified")
        }
        VerifyEmailOutcome::TokenNotFound => {
            FlowResponse::error("Invalid request or email already verified")
        }
        VerifyEmailOutcome::TokenExpiredNewEmailSent => {
            FlowResponse::error("Expired - Check your inbox for a new link to confirm your email")
        }
        VerifyEmailOutcome::ResendFailed => FlowResponse::error("Expired"),
        VerifyEmailOutcome::InvalidToken => {
            FlowResponse::error("Error - Can not complete verification")
        }
    };

    Ok(Json(response))
}

async fn password_reset_request_handler<R>(
    State(state): State<AuthState<R>>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let outcome = state.gatehouse.request_password_reset(&payload.email).await?;

    let response = match outcome {
        ResetRequestOutcome::EmailSent => FlowResponse::success("Reset email sent!"),
        ResetRequestOutcome::EmailNotFound | ResetRequestOutcome::InvalidEmail => {
            FlowResponse::error("Invalid email!")
        }
        ResetRequestOutcome::NoPasswordToReset => {
            FlowResponse::error("Email registered with a provider! Login with your Email Provider!")
        }
        ResetRequestOutcome::TokenStillValid => {
            FlowResponse::error("Reset password email already sent! Check your inbox!")
        }
        ResetRequestOutcome::SendFailed => {
            FlowResponse::error("Error - Could not send you a email to reset your password")
        }
    };

    Ok(Json(response))
}

async fn password_reset_confirm_handler<R>(
    State(state): State<AuthState<R>>,
    Json(payload): Json<NewPasswordRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let outcome = state
        .gatehouse
        .complete_password_reset(&payload.token, &payload.password)
        .await?;

    let response = match outcome {
        NewPasswordOutcome::PasswordUpdated => {
            FlowResponse::success("Password updated successfully")
        }
        NewPasswordOutcome::TokenNotFound => {
            FlowResponse::error("Error - Please request a new Password Reset!")
        }
        NewPasswordOutcome::MissingToken => FlowResponse::error("No token provided!"),
        NewPasswordOutcome::InvalidInput(_) => FlowResponse::error("Invalid password format"),
    };

    Ok(Json(response))
}

async fn magic_link_request_handler<R>(
    State(state): State<AuthState<R>>,
    connection_info: ConnectionInfo,
    Json(payload): Json<MagicLinkRequest>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let outcome = state
        .gatehouse
        .request_magic_link(&payload.email, connection_info.ip)
        .await?;

    let response = match outcome {
        MagicLinkOutcome::Sent => {
            FlowResponse::success("Magic link sent! Click the link send to your email.")
        }
        MagicLinkOutcome::AlreadySent => {
            FlowResponse::error("Email already sent! Check your inbox!")
        }
        MagicLinkOutcome::IpLimit => FlowResponse::error("Too many attempts. Please try again later."),
        MagicLinkOutcome::IpUnresolved => {
            FlowResponse::error("Can not process more requests! Try again later!")
        }
        MagicLinkOutcome::SendFailed => {
            FlowResponse::error("Failed to send your link. Try again later!")
        }
        MagicLinkOutcome::InvalidEmail => FlowResponse::error("Invalid email address!"),
    };

    Ok(Json(response))
}

async fn magic_link_verify_handler<R>(
    State(state): State<AuthState<R>>,
    axum::Extension(cookie_config): axum::Extension<CookieConfig>,
    Json(payload): Json<VerifyMagicLinkRequest>,
) -> Result<Response>
where
    R: RepositoryProvider,
{
    let outcome = state
        .gatehouse
        .verify_magic_link(&payload.token, payload.callback_url.as_deref())
        .await?;

    match outcome {
        MagicLinkVerifyOutcome::SignedIn(session) => {
            let cookie = session_cookie(&cookie_config, &session.token);
            Ok((
                [(header::SET_COOKIE, cookie)],
                Json(FlowResponse::signed_in(
                    "Successfully logged in",
                    session.redirect_to,
                )),
            )
                .into_response())
        }
        MagicLinkVerifyOutcome::TokenNotFound => Ok(Json(FlowResponse::error(
            "Invalid or expired link! Request a new one.",
        ))
        .into_response()),
    }
}

async fn settings_handler<R>(
    State(state): State<AuthState<R>>,
    axum::Extension(cookie_config): axum::Extension<CookieConfig>,
    AuthClaims(claims): AuthClaims,
    Json(payload): Json<SettingsRequest>,
) -> Result<Response>
where
    R: RepositoryProvider,
{
    let user_id = UserId::from(claims.sub.as_str());
    let outcome = state
        .gatehouse
        .update_settings(
            &user_id,
            SettingsInput {
                name: payload.name,
                email: payload.email,
                password: payload.password,
                new_password: payload.new_password,
                two_factor_enabled: payload.two_factor_enabled,
                image: payload.image,
            },
        )
        .await?;

    let response = match outcome {
        SettingsOutcome::Updated { session_token, .. } => {
            // Claims changed; reissue the cookie alongside the result.
            let cookie = session_cookie(&cookie_config, &session_token);
            return Ok((
                [(header::SET_COOKIE, cookie)],
                Json(FlowResponse::success("Settings updated!")),
            )
                .into_response());
        }
        SettingsOutcome::NoChangesRequired => {
            FlowResponse::error("No changes required! Your settings are already perfect? ☜(ˆ▽ˆ)")
        }
        SettingsOutcome::Unauthorized => FlowResponse::error("Unauthorized!"),
        SettingsOutcome::IncorrectPassword => FlowResponse::error("Incorrect Password!"),
        SettingsOutcome::SamePassword => {
            FlowResponse::error("Your new password is equal to your old password")
        }
        SettingsOutcome::PasswordNeedsUpdate => FlowResponse::error(
            "You are currently in need of a password reset. Please proceed, and do a password reset.",
        ),
        SettingsOutcome::EmailInUse => FlowResponse::error("Email already in use!"),
        SettingsOutcome::VerificationEmailSent => {
            FlowResponse::success("Verification email sent!")
        }
        SettingsOutcome::VerificationEmailAlreadySent => {
            FlowResponse::error("Verification email already sent! Confirm your inbox!")
        }
        SettingsOutcome::EmailChangeRequestExists => FlowResponse::error(
            "You have already requested to change your email! You need to wait 1hour to change again",
        ),
        SettingsOutcome::InvalidInput(_) => FlowResponse::error("Invalid fields!"),
    };

    Ok(Json(response).into_response())
}

/// Admin-only route; the extractor rejects non-admin sessions with 403.
async fn admin_handler(AdminClaims(_claims): AdminClaims) -> Result<impl IntoResponse> {
    Ok(Json(FlowResponse::success("Allowed API Route")))
}

/// Admin-only action with the role check inline, answering 200 either way.
async fn admin_action_handler(AuthClaims(claims): AuthClaims) -> Result<impl IntoResponse> {
    let response = if claims.role.is_admin() {
        FlowResponse::success("Allowed Server Action!")
    } else {
        FlowResponse::error("Forbidden Server Action!")
    };

    Ok(Json(response))
}
