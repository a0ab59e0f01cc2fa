//! Chatline Server
//!
//! This crate provides:
//! - Account registration and token sessions (cookie or bearer)
//! - Private and group chats with message requests
//! - Messages with replies, edits, deletion, read and delivery receipts
//! - Friends, blocking and notifications
//! - A WebSocket gateway for real-time events and presence

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod presence;
pub mod services;
pub mod storage;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::presence::PresenceRegistry;
use crate::services::{ChatService, FriendService, MessageService, NotificationService, UserService};
use crate::storage::Storage;

/// Application state shared across handlers and socket sessions
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<Storage>,
    pub presence: Arc<PresenceRegistry>,
    pub users: UserService,
    pub chats: ChatService,
    pub messages: MessageService,
    pub friends: FriendService,
    pub notifications: NotificationService,
}

impl AppState {
    pub fn new(config: Arc<Config>, storage: Arc<Storage>) -> Self {
        let presence = Arc::new(PresenceRegistry::new(storage.clone()));
        let notifications = NotificationService::new(storage.clone(), presence.clone());
        let chats = ChatService::new(storage.clone(), notifications.clone());
        let messages = MessageService::new(
            storage.clone(),
            presence.clone(),
            chats.clone(),
            notifications.clone(),
            config.limits.max_message_length,
        );
        let friends = FriendService::new(storage.clone(), notifications.clone());
        let users = UserService::new(storage.clone(), config.clone());

        Self {
            config,
            storage,
            presence,
            users,
            chats,
            messages,
            friends,
            notifications,
        }
    }
}

fn cors_layer(client_origin: &str) -> CorsLayer {
    if client_origin == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match client_origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!("Invalid client_origin {:?}, cross-origin requests disabled", client_origin);
            layer
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Multipart framing needs headroom above the raw file limit
    let body_limit = (state.config.limits.max_upload_size_mb as usize + 1) * 1024 * 1024;

    Router::new()
        .route("/health", get(handlers::health::health_check))

        // Authentication
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/me", get(handlers::auth::me))

        // Users
        .route("/api/users/search", get(handlers::users::search_users))
        .route("/api/users/profile", put(handlers::users::update_profile))
        .route("/api/users/status", put(handlers::users::update_status))
        .route("/api/users/:id", get(handlers::users::get_user))

        // Chats
        .route(
            "/api/chats",
            get(handlers::chats::list_chats).post(handlers::chats::create_chat),
        )
        .route("/api/chats/requests", get(handlers::chats::list_message_requests))
        .route(
            "/api/chats/:id",
            get(handlers::chats::get_chat)
                .put(handlers::chats::update_chat)
                .delete(handlers::chats::delete_chat),
        )
        .route("/api/chats/:id/participants", post(handlers::chats::add_participant))
        .route(
            "/api/chats/:id/participants/:user_id",
            delete(handlers::chats::remove_participant),
        )
        .route("/api/chats/:id/accept", post(handlers::chats::accept_request))
        .route("/api/chats/:id/decline", post(handlers::chats::decline_request))

        // Messages. GET takes a chat id, PUT/DELETE a message id.
        .route("/api/messages", post(handlers::messages::send_message))
        .route(
            "/api/messages/:id",
            get(handlers::messages::get_messages)
                .put(handlers::messages::edit_message)
                .delete(handlers::messages::delete_message),
        )
        .route("/api/messages/:id/read", post(handlers::messages::mark_as_read))
        .route("/api/messages/:id/delivered", post(handlers::messages::mark_as_delivered))

        // Friends and blocking
        .route("/api/friends", get(handlers::friends::list_friends))
        .route("/api/friends/requests", get(handlers::friends::received_requests))
        .route("/api/friends/requests/sent", get(handlers::friends::sent_requests))
        .route("/api/friends/request", post(handlers::friends::send_request))
        .route("/api/friends/request/:id", delete(handlers::friends::cancel_request))
        .route("/api/friends/request/:id/accept", post(handlers::friends::accept_request))
        .route("/api/friends/request/:id/reject", post(handlers::friends::reject_request))
        .route("/api/friends/blocked", get(handlers::friends::blocked_users))
        .route("/api/friends/block", post(handlers::friends::block_user))
        .route("/api/friends/block/:id", delete(handlers::friends::unblock_user))
        .route("/api/friends/:id", delete(handlers::friends::remove_friend))

        // Notifications
        .route("/api/notifications", get(handlers::notifications::list_notifications))
        .route("/api/notifications/read-all", put(handlers::notifications::mark_all_as_read))
        .route("/api/notifications/:id/read", put(handlers::notifications::mark_as_read))
        .route("/api/notifications/:id", delete(handlers::notifications::delete_notification))

        // Attachments
        .route("/api/upload", post(handlers::files::upload_file))
        .route(
            "/api/files/:id",
            get(handlers::files::download_file).delete(handlers::files::delete_file),
        )

        // Real-time gateway
        .route("/ws", get(gateway::websocket_handler))

        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.server.client_origin))
        .with_state(state)
}
