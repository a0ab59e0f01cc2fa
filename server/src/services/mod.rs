//! Service layer shared by the REST handlers and the real-time gateway

pub mod chat;
pub mod friend;
pub mod message;
pub mod notification;
pub mod user;

pub use chat::ChatService;
pub use friend::FriendService;
pub use message::MessageService;
pub use notification::NotificationService;
pub use user::UserService;

use crate::config::LimitsConfig;
use crate::error::{AppError, Result};
use crate::models::PageParams;

/// Resolve optional page/limit query values against the configured bounds
pub fn page_params(page: Option<u32>, limit: Option<u32>, limits: &LimitsConfig) -> Result<PageParams> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(limits.default_page_size);

    if page < 1 {
        return Err(AppError::validation("page must be at least 1"));
    }
    if limit < 1 || limit > limits.max_page_size {
        return Err(AppError::validation(format!(
            "limit must be between 1 and {}",
            limits.max_page_size
        )));
    }

    Ok(PageParams { page, limit })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::config::Config;
    use crate::models::User;
    use crate::storage::Storage;
    use crate::AppState;

    pub async fn state() -> AppState {
        let mut config = Config::default();
        config.auth.password_iterations = 1_000;
        let storage = Storage::in_memory().await.unwrap();
        AppState::new(Arc::new(config), Arc::new(storage))
    }

    pub async fn user(state: &AppState, name: &str) -> User {
        state
            .storage
            .create_user(name, &format!("{}@example.com", name.to_lowercase()), "hash")
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_page_params_bounds() {
        let limits = Config::default().limits;

        let p = page_params(None, None, &limits).unwrap();
        assert_eq!(p, PageParams { page: 1, limit: 50 });

        assert!(page_params(Some(0), None, &limits).is_err());
        assert!(page_params(None, Some(0), &limits).is_err());
        assert!(page_params(None, Some(101), &limits).is_err());
        assert_eq!(page_params(Some(3), Some(100), &limits).unwrap().offset(), 200);
    }
}
