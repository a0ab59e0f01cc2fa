//! Authentication handlers

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::{
    config::AuthConfig,
    error::{AppError, Result},
    models::*,
    AppState,
};

use super::AuthUser;

/// Http-only cookie carrying the session token
fn session_cookie(config: &AuthConfig, token: &str) -> Result<Cookie<'static>> {
    let mut cookie = Cookie::parse(format!(
        "{}={}; Max-Age={}",
        config.cookie_name,
        token,
        config.token_ttl_days * 24 * 60 * 60
    ))
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build session cookie: {}", e)))?;

    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(config.secure_cookie);

    Ok(cookie)
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<ApiResponse<AuthResponse>>)> {
    let response = state.users.register(req).await?;
    let cookie = session_cookie(&state.config.auth, &response.token)?;

    Ok((
        StatusCode::CREATED,
        jar.add(cookie),
        Json(ApiResponse::ok("Registration successful", response)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<ApiResponse<AuthResponse>>)> {
    let response = state.users.login(req).await?;
    let cookie = session_cookie(&state.config.auth, &response.token)?;

    Ok((jar.add(cookie), Json(ApiResponse::ok("Login successful", response))))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse<()>>)> {
    state.users.logout(&auth.user_id).await?;
    tracing::info!("Session closed for {}", auth.email);

    let removal = Cookie::build((state.config.auth.cookie_name.clone(), "")).path("/");
    Ok((jar.remove(removal), Json(ApiResponse::message("Logout successful"))))
}

pub async fn me(State(state): State<AppState>, auth: AuthUser) -> Result<Json<ApiResponse<UserProfile>>> {
    let profile = state.users.get_profile(&auth.user_id).await?;
    Ok(Json(ApiResponse::ok("Current user", profile)))
}

/// Reissue a token for an already valid session
pub async fn refresh(
    State(state): State<AppState>,
    auth: AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse<AuthResponse>>)> {
    let response = state.users.refresh(&auth.user_id).await?;
    let cookie = session_cookie(&state.config.auth, &response.token)?;

    Ok((jar.add(cookie), Json(ApiResponse::ok("Token refreshed", response))))
}
