//! Data models for Chatline Server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Content stored in place of a message deleted for everyone
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
    Away,
    Busy,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "online",
            UserStatus::Offline => "offline",
            UserStatus::Away => "away",
            UserStatus::Busy => "busy",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub fullname: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: String,
    pub bio: String,
    pub status: UserStatus,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User as returned to clients (never carries the password hash)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub fullname: String,
    pub email: String,
    pub avatar: String,
    pub bio: String,
    pub status: UserStatus,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            fullname: user.fullname,
            email: user.email,
            avatar: user.avatar,
            bio: user.bio,
            status: user.status,
            last_seen: user.last_seen,
            created_at: user.created_at,
        }
    }
}

/// Compact user identity embedded in chats, messages and notifications
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub fullname: String,
    pub avatar: String,
    pub status: UserStatus,
    pub last_seen: DateTime<Utc>,
}

// ============================================================================
// Chat Models
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Chat {
    pub id: String,
    pub chat_type: ChatType,
    pub name: Option<String>,
    pub description: String,
    pub avatar: String,
    pub admin_id: Option<String>,
    pub last_message_id: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_message_request: bool,
    /// Participant who opened the message request
    pub requested_by: Option<String>,
    pub message_request_accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatParticipant {
    pub chat_id: String,
    pub user_id: String,
    pub unread_count: i64,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub id: String,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub name: Option<String>,
    pub description: String,
    pub avatar: String,
    pub admin: Option<String>,
    pub participants: Vec<UserSummary>,
    pub last_message: Option<MessageView>,
    pub last_message_at: DateTime<Utc>,
    /// user id -> unread count
    pub unread_count: BTreeMap<String, i64>,
    pub is_active: bool,
    pub is_message_request: bool,
    pub requested_by: Option<String>,
    pub message_request_accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Message Models
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub url: String,
    #[serde(default)]
    pub public_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Message {
    pub seq: i64,
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_public_id: Option<String>,
    pub media_file_name: Option<String>,
    pub media_file_size: Option<i64>,
    pub media_mime_type: Option<String>,
    pub reply_to: Option<String>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn media(&self) -> Option<Media> {
        self.media_url.as_ref().map(|url| Media {
            url: url.clone(),
            public_id: self.media_public_id.clone(),
            file_name: self.media_file_name.clone(),
            file_size: self.media_file_size,
            mime_type: self.media_mime_type.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: String,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: Option<String>,
}

/// Message with sender, reply preview and receipt lists resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub chat_id: String,
    pub sender: UserSummary,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: Option<String>,
    pub media: Option<Media>,
    pub reply_to: Option<ReplyPreview>,
    pub read_by: Vec<ReadReceipt>,
    pub delivered_to: Vec<String>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Social Graph Models
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub message: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestView {
    #[serde(flatten)]
    pub request: FriendRequest,
    pub sender: UserSummary,
    pub receiver: UserSummary,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlockedUser {
    pub blocker_id: String,
    pub blocked_id: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Notification Models
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationType {
    Message,
    FriendRequest,
    FriendAccept,
    GroupInvite,
    Mention,
    System,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub link: String,
    pub related_chat: Option<String>,
    pub related_message: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub sender: Option<UserSummary>,
}

/// Input for creating a notification
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub related_chat: Option<String>,
    pub related_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub items: Vec<NotificationView>,
    pub unread_count: i64,
    pub pagination: Pagination,
}

// ============================================================================
// File Models
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_id: String,
    pub uploader_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Pagination and Response Envelope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u32,
    pub limit: u32,
}

impl PageParams {
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(params: PageParams, total: i64) -> Self {
        let limit = params.limit.max(1) as i64;
        let total_pages = (total + limit - 1) / limit;
        Self {
            total,
            page: params.page,
            limit: params.limit,
            total_pages,
            has_next_page: (params.page as i64) < total_pages,
            has_prev_page: params.page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Uniform REST response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

// ============================================================================
// API Request/Response Models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub fullname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub fullname: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListChatsQuery {
    #[serde(default)]
    pub include_requests: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub participants: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChatRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

#[derive(Debug, Deserialize)]
pub struct GetMessagesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub before: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageQuery {
    #[serde(default)]
    pub for_everyone: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFriendRequestRequest {
    pub receiver_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUserRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub is_read: Option<bool>,
}

// ============================================================================
// Real-time Event Models
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    pub message_id: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPayload {
    pub message_id: String,
    pub chat_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePayload {
    pub message_id: String,
    pub chat_id: String,
    #[serde(default)]
    pub delete_for_everyone: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub status: UserStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRef {
    pub notification_id: String,
}

/// Events sent by a client over its socket
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "chat:join")]
    JoinChat(ChatRef),

    #[serde(rename = "chat:leave")]
    LeaveChat(ChatRef),

    #[serde(rename = "message:send")]
    SendMessage(SendMessageRequest),

    #[serde(rename = "message:read")]
    MessageRead(ReceiptPayload),

    #[serde(rename = "message:delivered")]
    MessageDelivered(ReceiptPayload),

    #[serde(rename = "message:edit")]
    EditMessage(EditPayload),

    #[serde(rename = "message:delete")]
    DeleteMessage(DeletePayload),

    #[serde(rename = "typing:start")]
    TypingStart(ChatRef),

    #[serde(rename = "typing:stop")]
    TypingStop(ChatRef),

    #[serde(rename = "status:update")]
    StatusUpdate(StatusPayload),

    #[serde(rename = "users:online")]
    OnlineUsers,

    #[serde(rename = "notification:read")]
    NotificationRead(NotificationRef),

    #[serde(rename = "notification:read_all")]
    NotificationReadAll,

    #[serde(rename = "ping")]
    Ping,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinChat(_) => "chat:join",
            ClientEvent::LeaveChat(_) => "chat:leave",
            ClientEvent::SendMessage(_) => "message:send",
            ClientEvent::MessageRead(_) => "message:read",
            ClientEvent::MessageDelivered(_) => "message:delivered",
            ClientEvent::EditMessage(_) => "message:edit",
            ClientEvent::DeleteMessage(_) => "message:delete",
            ClientEvent::TypingStart(_) => "typing:start",
            ClientEvent::TypingStop(_) => "typing:stop",
            ClientEvent::StatusUpdate(_) => "status:update",
            ClientEvent::OnlineUsers => "users:online",
            ClientEvent::NotificationRead(_) => "notification:read",
            ClientEvent::NotificationReadAll => "notification:read_all",
            ClientEvent::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    pub message_id: String,
    pub chat_id: String,
    pub deleted_by: String,
    pub delete_for_everyone: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptEventPayload {
    pub message_id: String,
    pub chat_id: String,
    pub user_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMemberPayload {
    pub user_id: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: String,
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersPayload {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReadPayload {
    pub notification_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

/// Events pushed by the server to connected clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "message:new")]
    MessageNew(MessageView),

    #[serde(rename = "message:edited")]
    MessageEdited(MessageView),

    #[serde(rename = "message:deleted")]
    MessageDeleted(MessageDeletedPayload),

    #[serde(rename = "message:read")]
    MessageRead(ReceiptEventPayload),

    #[serde(rename = "message:delivered")]
    MessageDelivered(ReceiptEventPayload),

    #[serde(rename = "typing:start")]
    TypingStart(ChatMemberPayload),

    #[serde(rename = "typing:stop")]
    TypingStop(ChatMemberPayload),

    #[serde(rename = "user:joined")]
    UserJoined(ChatMemberPayload),

    #[serde(rename = "user:left")]
    UserLeft(ChatMemberPayload),

    #[serde(rename = "user:online")]
    UserOnline(PresencePayload),

    #[serde(rename = "user:offline")]
    UserOffline(PresencePayload),

    #[serde(rename = "user:status")]
    StatusChanged(PresencePayload),

    #[serde(rename = "users:online")]
    OnlineUsers(OnlineUsersPayload),

    #[serde(rename = "notification:new")]
    NotificationNew(NotificationView),

    #[serde(rename = "notification:read")]
    NotificationRead(NotificationReadPayload),

    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "error")]
    Error(ErrorPayload),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_parsing() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"message:send","data":{"chatId":"c1","type":"text","content":"hi"}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::SendMessage(req) => {
                assert_eq!(req.chat_id, "c1");
                assert_eq!(req.message_type, MessageType::Text);
                assert_eq!(req.content.as_deref(), Some("hi"));
                assert!(req.reply_to.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }

        let event: ClientEvent = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(event.name(), "ping");

        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"message:delete","data":{"messageId":"m1","chatId":"c1"}}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            ClientEvent::DeleteMessage(DeletePayload { delete_for_everyone: false, .. })
        ));
    }

    #[test]
    fn test_client_event_rejects_bad_shape() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"chat:join","data":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"event":"nope","data":{}}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(
            r#"{"event":"status:update","data":{"status":"sleeping"}}"#
        )
        .is_err());
    }

    #[test]
    fn test_server_event_shape() {
        let event = ServerEvent::TypingStart(ChatMemberPayload {
            user_id: "u1".to_string(),
            chat_id: "c1".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "typing:start");
        assert_eq!(json["data"]["userId"], "u1");
        assert_eq!(json["data"]["chatId"], "c1");

        let json = serde_json::to_value(ServerEvent::Pong).unwrap();
        assert_eq!(json["event"], "pong");
    }

    #[test]
    fn test_pagination_math() {
        let p = Pagination::new(PageParams { page: 1, limit: 20 }, 45);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next_page);
        assert!(!p.has_prev_page);

        let p = Pagination::new(PageParams { page: 3, limit: 20 }, 45);
        assert!(!p.has_next_page);
        assert!(p.has_prev_page);

        let p = Pagination::new(PageParams { page: 1, limit: 20 }, 0);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next_page);
    }

    #[test]
    fn test_envelope_omits_empty_data() {
        let json = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "done");
        assert!(json.get("data").is_none());
    }
}
