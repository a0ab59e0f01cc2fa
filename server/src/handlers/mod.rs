//! HTTP request handlers for Chatline Server

pub mod auth;
pub mod chats;
pub mod files;
pub mod friends;
pub mod health;
pub mod messages;
pub mod notifications;
pub mod users;

use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;

use crate::{auth::{bearer_token, verify_token}, error::AppError, AppState};

/// Authenticated user context extracted from request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Cookie first, then "Authorization: Bearer <token>". A stale cookie
        // must not shadow a valid bearer token.
        let jar = CookieJar::from_headers(&parts.headers);
        let candidates: Vec<String> = jar
            .get(&state.config.auth.cookie_name)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty())
            .into_iter()
            .chain(bearer_token(&parts.headers))
            .collect();

        if candidates.is_empty() {
            return Err(AppError::unauthorized("Authentication required"));
        }

        for token in candidates {
            let Ok(claims) = verify_token(&token, &state.config.auth.jwt_secret) else {
                continue;
            };

            // The user must still exist
            if state.storage.get_user(&claims.sub).await?.is_some() {
                return Ok(AuthUser {
                    user_id: claims.sub,
                    email: claims.email,
                });
            }
        }

        Err(AppError::unauthorized("Invalid or expired token"))
    }
}
