//! Accounts, sessions and profiles

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::auth;
use crate::config::Config;
use crate::crypto;
use crate::error::{AppError, Result};
use crate::models::*;
use crate::storage::Storage;

const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_NAME_LENGTH: usize = 100;
const MAX_BIO_LENGTH: usize = 500;

#[derive(Clone)]
pub struct UserService {
    storage: Arc<Storage>,
    config: Arc<Config>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::validation("Invalid email address"))
    }
}

fn validate_fullname(fullname: &str) -> Result<()> {
    let len = fullname.trim().chars().count();
    if !(2..=MAX_NAME_LENGTH).contains(&len) {
        return Err(AppError::validation(format!(
            "Full name must be between 2 and {} characters",
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

impl UserService {
    pub fn new(storage: Arc<Storage>, config: Arc<Config>) -> Self {
        Self { storage, config }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        validate_fullname(&req.fullname)?;
        let email = normalize_email(&req.email);
        validate_email(&email)?;
        if req.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }

        if self.storage.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::conflict("Email is already registered"));
        }

        let password_hash = crypto::hash_password(&req.password, self.config.auth.password_iterations)?;
        let user = self
            .storage
            .create_user(req.fullname.trim(), &email, &password_hash)
            .await?;

        tracing::info!("User registered: {}", user.id);
        self.auth_response(user)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse> {
        let email = normalize_email(&req.email);

        let user = self
            .storage
            .get_user_by_email(&email)
            .await?
            .filter(|u| crypto::verify_password(&req.password, &u.password_hash))
            .ok_or_else(|| AppError::unauthorized("Invalid email or password"))?;

        self.storage.set_user_status(&user.id, UserStatus::Online).await?;
        let user = self.get_user(&user.id).await?;

        tracing::info!("User logged in: {}", user.id);
        self.auth_response(user)
    }

    pub async fn logout(&self, user_id: &str) -> Result<()> {
        self.storage.set_user_status(user_id, UserStatus::Offline).await?;
        tracing::info!("User logged out: {}", user_id);
        Ok(())
    }

    /// Reissue a token for an already authenticated session
    pub async fn refresh(&self, user_id: &str) -> Result<AuthResponse> {
        let user = self.get_user(user_id).await?;
        self.auth_response(user)
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile> {
        Ok(self.get_user(user_id).await?.into())
    }

    pub async fn summary(&self, user_id: &str) -> Result<UserSummary> {
        self.storage
            .get_user_summary(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn search(&self, caller_id: &str, query: &str, page: PageParams) -> Result<Page<UserSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::validation("Search query is required"));
        }

        let (items, total) = self.storage.search_users(query, caller_id, page).await?;
        Ok(Page {
            items,
            pagination: Pagination::new(page, total),
        })
    }

    pub async fn update_profile(&self, user_id: &str, req: UpdateProfileRequest) -> Result<UserProfile> {
        if let Some(fullname) = &req.fullname {
            validate_fullname(fullname)?;
        }
        if let Some(bio) = &req.bio {
            if bio.chars().count() > MAX_BIO_LENGTH {
                return Err(AppError::validation(format!(
                    "Bio must be at most {} characters",
                    MAX_BIO_LENGTH
                )));
            }
        }

        self.storage
            .update_user_profile(
                user_id,
                req.fullname.as_deref().map(str::trim),
                req.bio.as_deref(),
                req.avatar.as_deref(),
            )
            .await?;

        self.get_profile(user_id).await
    }

    pub async fn update_status(&self, user_id: &str, status: UserStatus) -> Result<DateTime<Utc>> {
        self.get_user(user_id).await?;
        self.storage.set_user_status(user_id, status).await
    }

    async fn get_user(&self, user_id: &str) -> Result<User> {
        self.storage
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    fn auth_response(&self, user: User) -> Result<AuthResponse> {
        let (token, expires_at) = auth::issue_token(&user.id, &user.email, &self.config.auth)?;
        Ok(AuthResponse {
            user: user.into(),
            token,
            expires_at: expires_at.timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            fullname: "Alice Smith".to_string(),
            email: email.to_string(),
            password: "secret123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let state = testing::state().await;

        let registered = state.users.register(register_request("  Alice@Example.com ")).await.unwrap();
        assert_eq!(registered.user.email, "alice@example.com");
        let claims = auth::verify_token(&registered.token, &state.config.auth.jwt_secret).unwrap();
        assert_eq!(claims.sub, registered.user.id);

        let logged_in = state
            .users
            .login(LoginRequest {
                email: "alice@example.com".to_string(),
                password: "secret123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);
        assert_eq!(logged_in.user.status, UserStatus::Online);

        state.users.logout(&registered.user.id).await.unwrap();
        let profile = state.users.get_profile(&registered.user.id).await.unwrap();
        assert_eq!(profile.status, UserStatus::Offline);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let state = testing::state().await;
        state.users.register(register_request("bob@example.com")).await.unwrap();

        let err = state.users.register(register_request("BOB@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = state.users.register(register_request("not-an-email")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut req = register_request("carol@example.com");
        req.password = "123".to_string();
        assert!(matches!(state.users.register(req).await.unwrap_err(), AppError::Validation(_)));

        let mut req = register_request("dave@example.com");
        req.fullname = "D".to_string();
        assert!(matches!(state.users.register(req).await.unwrap_err(), AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let state = testing::state().await;
        state.users.register(register_request("erin@example.com")).await.unwrap();

        let err = state
            .users
            .login(LoginRequest {
                email: "erin@example.com".to_string(),
                password: "wrong-password".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Invalid email or password"));
    }

    #[tokio::test]
    async fn test_search_excludes_caller() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        testing::user(&state, "Alina").await;
        testing::user(&state, "Bob").await;

        let page = PageParams { page: 1, limit: 10 };
        let found = state.users.search(&alice.id, "ali", page).await.unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].fullname, "Alina");
        assert_eq!(found.pagination.total, 1);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;

        let profile = state
            .users
            .update_profile(
                &alice.id,
                UpdateProfileRequest {
                    fullname: None,
                    bio: Some("hello there".to_string()),
                    avatar: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.fullname, "Alice");
        assert_eq!(profile.bio, "hello there");
    }
}
