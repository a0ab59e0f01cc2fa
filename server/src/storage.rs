//! Database storage layer for Chatline Server

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;

use crate::crypto;
use crate::error::Result;
use crate::models::*;

const USER_COLUMNS: &str = "id, fullname, email, password_hash, avatar, bio, status, last_seen, created_at, updated_at";
const SUMMARY_COLUMNS: &str = "id, fullname, avatar, status, last_seen";
const CHAT_COLUMNS: &str = "c.id, c.chat_type, c.name, c.description, c.avatar, c.admin_id, c.last_message_id, \
     c.last_message_at, c.is_active, c.is_message_request, c.requested_by, c.message_request_accepted_at, c.created_at, c.updated_at";
const MESSAGE_COLUMNS: &str = "seq, id, chat_id, sender_id, message_type, content, media_url, media_public_id, \
     media_file_name, media_file_size, media_mime_type, reply_to, is_edited, edited_at, is_deleted, deleted_at, \
     created_at, updated_at";
const FRIEND_REQUEST_COLUMNS: &str = "id, sender_id, receiver_id, message, status, created_at, updated_at";
const NOTIFICATION_COLUMNS: &str = "id, recipient_id, sender_id, notification_type, title, message, link, \
     related_chat, related_message, is_read, read_at, created_at";

/// Fields of a chat about to be created
#[derive(Debug, Clone)]
pub struct NewChat<'a> {
    pub chat_type: ChatType,
    pub name: Option<&'a str>,
    pub description: &'a str,
    pub admin_id: Option<&'a str>,
    pub participants: &'a [String],
    pub is_message_request: bool,
    pub requested_by: Option<&'a str>,
}

/// Fields of a message about to be persisted
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub chat_id: &'a str,
    pub sender_id: &'a str,
    pub message_type: MessageType,
    pub content: Option<&'a str>,
    pub media: Option<&'a Media>,
    pub reply_to: Option<&'a str>,
}

pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        // Ensure directory exists
        if let Some(parent) = Path::new(database_path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Private in-memory database. A single connection that never expires
    /// keeps the data alive for the lifetime of the pool.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                fullname TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                avatar TEXT NOT NULL DEFAULT '',
                bio TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'offline',
                last_seen TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                chat_type TEXT NOT NULL,
                name TEXT,
                description TEXT NOT NULL DEFAULT '',
                avatar TEXT NOT NULL DEFAULT '',
                admin_id TEXT,
                last_message_id TEXT,
                last_message_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_message_request INTEGER NOT NULL DEFAULT 0,
                requested_by TEXT,
                message_request_accepted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_participants (
                chat_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                unread_count INTEGER NOT NULL DEFAULT 0,
                joined_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, user_id),
                FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                chat_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                message_type TEXT NOT NULL,
                content TEXT,
                media_url TEXT,
                media_public_id TEXT,
                media_file_name TEXT,
                media_file_size INTEGER,
                media_mime_type TEXT,
                reply_to TEXT,
                is_edited INTEGER NOT NULL DEFAULT 0,
                edited_at TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
                FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS message_reads (
                message_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                read_at TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS message_deliveries (
                message_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                delivered_at TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS message_hidden (
                message_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                hidden_at TEXT NOT NULL,
                PRIMARY KEY (message_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS friend_requests (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (sender_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (receiver_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS blocked_users (
                blocker_id TEXT NOT NULL,
                blocked_id TEXT NOT NULL,
                reason TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                PRIMARY KEY (blocker_id, blocked_id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL,
                sender_id TEXT,
                notification_type TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                link TEXT NOT NULL DEFAULT '',
                related_chat TEXT,
                related_message TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                read_at TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (recipient_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS files (
                file_id TEXT PRIMARY KEY,
                uploader_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (uploader_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_participants_user ON chat_participants(user_id);
            CREATE INDEX IF NOT EXISTS idx_chats_last_message ON chats(last_message_at);
            CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, seq);
            CREATE INDEX IF NOT EXISTS idx_friend_requests_pair ON friend_requests(sender_id, receiver_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id, created_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    pub async fn create_user(&self, fullname: &str, email: &str, password_hash: &str) -> Result<User> {
        let id = crypto::generate_id();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO users (id, fullname, email, password_hash, status, last_seen, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'offline', ?, ?, ?)",
        )
        .bind(&id)
        .bind(fullname)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_user(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} missing after insert", id).into())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_summary(&self, user_id: &str) -> Result<Option<UserSummary>> {
        let user = sqlx::query_as::<_, UserSummary>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            SUMMARY_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    pub async fn search_users(
        &self,
        query: &str,
        exclude_id: &str,
        page: PageParams,
    ) -> Result<(Vec<UserSummary>, i64)> {
        let pattern = format!("%{}%", query.to_lowercase());

        let users = sqlx::query_as::<_, UserSummary>(&format!(
            "SELECT {} FROM users
             WHERE id != ? AND (LOWER(fullname) LIKE ? OR email LIKE ?)
             ORDER BY fullname ASC LIMIT ? OFFSET ?",
            SUMMARY_COLUMNS
        ))
        .bind(exclude_id)
        .bind(&pattern)
        .bind(&pattern)
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE id != ? AND (LOWER(fullname) LIKE ? OR email LIKE ?)",
        )
        .bind(exclude_id)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok((users, total.0))
    }

    pub async fn update_user_profile(
        &self,
        user_id: &str,
        fullname: Option<&str>,
        bio: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET
                fullname = COALESCE(?, fullname),
                bio = COALESCE(?, bio),
                avatar = COALESCE(?, avatar),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(fullname)
        .bind(bio)
        .bind(avatar)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set presence status and stamp last-seen
    pub async fn set_user_status(&self, user_id: &str, status: UserStatus) -> Result<DateTime<Utc>> {
        let now = Utc::now();

        sqlx::query("UPDATE users SET status = ?, last_seen = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(now)
    }

    // ========================================================================
    // Chat Operations
    // ========================================================================

    pub async fn create_chat(&self, new: NewChat<'_>) -> Result<Chat> {
        let id = crypto::generate_id();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO chats (id, chat_type, name, description, avatar, admin_id, last_message_at,
                                is_active, is_message_request, requested_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, '', ?, ?, 1, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(new.chat_type)
        .bind(new.name)
        .bind(new.description)
        .bind(new.admin_id)
        .bind(now)
        .bind(new.is_message_request)
        .bind(new.requested_by)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for user_id in new.participants {
            sqlx::query(
                "INSERT OR IGNORE INTO chat_participants (chat_id, user_id, unread_count, joined_at)
                 VALUES (?, ?, 0, ?)",
            )
            .bind(&id)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get_chat(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Chat {} missing after insert", id).into())
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(&format!("SELECT {} FROM chats c WHERE c.id = ?", CHAT_COLUMNS))
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(chat)
    }

    pub async fn find_private_chat(&self, user_a: &str, user_b: &str) -> Result<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {} FROM chats c
             WHERE c.chat_type = 'private'
               AND EXISTS (SELECT 1 FROM chat_participants p WHERE p.chat_id = c.id AND p.user_id = ?)
               AND EXISTS (SELECT 1 FROM chat_participants p WHERE p.chat_id = c.id AND p.user_id = ?)
             ORDER BY c.created_at ASC LIMIT 1",
            CHAT_COLUMNS
        ))
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    pub async fn list_chats_for_user(&self, user_id: &str, include_requests: bool) -> Result<Vec<Chat>> {
        let request_filter = if include_requests { "" } else { "AND c.is_message_request = 0" };

        let chats = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {} FROM chats c
             JOIN chat_participants p ON p.chat_id = c.id
             WHERE p.user_id = ? AND c.is_active = 1 {}
             ORDER BY c.last_message_at DESC",
            CHAT_COLUMNS, request_filter
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    pub async fn list_message_requests(&self, user_id: &str) -> Result<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {} FROM chats c
             JOIN chat_participants p ON p.chat_id = c.id
             WHERE p.user_id = ? AND c.is_active = 1 AND c.is_message_request = 1
             ORDER BY c.last_message_at DESC",
            CHAT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    pub async fn list_participants(&self, chat_id: &str) -> Result<Vec<ChatParticipant>> {
        let participants = sqlx::query_as::<_, ChatParticipant>(
            "SELECT chat_id, user_id, unread_count, joined_at
             FROM chat_participants WHERE chat_id = ? ORDER BY joined_at ASC, user_id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }

    pub async fn is_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM chat_participants WHERE chat_id = ? AND user_id = ?")
                .bind(chat_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    pub async fn set_chat_active(&self, chat_id: &str, active: bool) -> Result<()> {
        sqlx::query("UPDATE chats SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn accept_message_request(&self, chat_id: &str) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE chats SET is_message_request = 0, message_request_accepted_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_chat_details(
        &self,
        chat_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE chats SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                avatar = COALESCE(?, avatar),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(avatar)
        .bind(Utc::now())
        .bind(chat_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_chat_admin(&self, chat_id: &str, admin_id: &str) -> Result<()> {
        sqlx::query("UPDATE chats SET admin_id = ?, updated_at = ? WHERE id = ?")
            .bind(admin_id)
            .bind(Utc::now())
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Returns false if the user was already a participant
    pub async fn add_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO chat_participants (chat_id, user_id, unread_count, joined_at)
             VALUES (?, ?, 0, ?)",
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_participants WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn reset_unread(&self, chat_id: &str, user_id: &str) -> Result<()> {
        sqlx::query("UPDATE chat_participants SET unread_count = 0 WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Clear the pending-request flag on the private chat between two users
    pub async fn clear_private_message_request(&self, user_a: &str, user_b: &str) -> Result<()> {
        if let Some(chat) = self.find_private_chat(user_a, user_b).await? {
            if chat.is_message_request {
                self.accept_message_request(&chat.id).await?;
            }
        }

        Ok(())
    }

    pub async fn deactivate_private_chats(&self, user_a: &str, user_b: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE chats SET is_active = 0, updated_at = ?
             WHERE chat_type = 'private'
               AND id IN (SELECT chat_id FROM chat_participants WHERE user_id = ?)
               AND id IN (SELECT chat_id FROM chat_participants WHERE user_id = ?)",
        )
        .bind(Utc::now())
        .bind(user_a)
        .bind(user_b)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ========================================================================
    // Message Operations
    // ========================================================================

    /// Persist a message, move the chat's last-message pointer and bump every
    /// other participant's unread counter, all in one transaction.
    pub async fn insert_message(&self, new: NewMessage<'_>) -> Result<Message> {
        let id = crypto::generate_id();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender_id, message_type, content, media_url, media_public_id,
                                   media_file_name, media_file_size, media_mime_type, reply_to,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(new.chat_id)
        .bind(new.sender_id)
        .bind(new.message_type)
        .bind(new.content)
        .bind(new.media.map(|m| m.url.as_str()))
        .bind(new.media.and_then(|m| m.public_id.as_deref()))
        .bind(new.media.and_then(|m| m.file_name.as_deref()))
        .bind(new.media.and_then(|m| m.file_size))
        .bind(new.media.and_then(|m| m.mime_type.as_deref()))
        .bind(new.reply_to)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chats SET last_message_id = ?, last_message_at = ?, updated_at = ? WHERE id = ?")
            .bind(&id)
            .bind(now)
            .bind(now)
            .bind(new.chat_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE chat_participants SET unread_count = unread_count + 1
             WHERE chat_id = ? AND user_id != ?",
        )
        .bind(new.chat_id)
        .bind(new.sender_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_message(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Message {} missing after insert", id).into())
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Option<Message>> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "SELECT {} FROM messages WHERE id = ?",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    /// Newest-first page of a chat's messages as seen by `viewer_id`.
    ///
    /// Messages the viewer hid for themselves are excluded. `before_seq`
    /// narrows the set to strictly older messages before paging.
    pub async fn list_messages(
        &self,
        chat_id: &str,
        viewer_id: &str,
        before_seq: Option<i64>,
        page: PageParams,
    ) -> Result<(Vec<Message>, i64)> {
        let before = before_seq.unwrap_or(i64::MAX);

        let messages = sqlx::query_as::<_, Message>(&format!(
            "SELECT {} FROM messages m
             WHERE m.chat_id = ? AND m.seq < ?
               AND NOT EXISTS (SELECT 1 FROM message_hidden h WHERE h.message_id = m.id AND h.user_id = ?)
             ORDER BY m.seq DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        ))
        .bind(chat_id)
        .bind(before)
        .bind(viewer_id)
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages m
             WHERE m.chat_id = ? AND m.seq < ?
               AND NOT EXISTS (SELECT 1 FROM message_hidden h WHERE h.message_id = m.id AND h.user_id = ?)",
        )
        .bind(chat_id)
        .bind(before)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((messages, total.0))
    }

    pub async fn update_message_content(&self, message_id: &str, content: &str) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE messages SET content = ?, is_edited = 1, edited_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(content)
        .bind(now)
        .bind(now)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Global soft delete: the row stays, content becomes the placeholder
    pub async fn mark_message_deleted(&self, message_id: &str) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE messages SET is_deleted = 1, deleted_at = ?, updated_at = ?, content = ?,
                    media_url = NULL, media_public_id = NULL, media_file_name = NULL,
                    media_file_size = NULL, media_mime_type = NULL
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(DELETED_PLACEHOLDER)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn hide_message_for(&self, message_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO message_hidden (message_id, user_id, hidden_at) VALUES (?, ?, ?)",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn add_read_receipt(&self, message_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO message_reads (message_id, user_id, read_at) VALUES (?, ?, ?)",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn add_delivery(&self, message_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO message_deliveries (message_id, user_id, delivered_at) VALUES (?, ?, ?)",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_read_receipts(&self, message_id: &str) -> Result<Vec<ReadReceipt>> {
        let receipts = sqlx::query_as::<_, ReadReceipt>(
            "SELECT user_id, read_at FROM message_reads WHERE message_id = ? ORDER BY read_at ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(receipts)
    }

    pub async fn list_deliveries(&self, message_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM message_deliveries WHERE message_id = ? ORDER BY delivered_at ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    // ========================================================================
    // Friend and Block Operations
    // ========================================================================

    pub async fn create_friend_request(&self, sender_id: &str, receiver_id: &str, message: &str) -> Result<FriendRequest> {
        let id = crypto::generate_id();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO friend_requests (id, sender_id, receiver_id, message, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(sender_id)
        .bind(receiver_id)
        .bind(message)
        .bind(FriendRequestStatus::Pending)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_friend_request(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Friend request {} missing after insert", id).into())
    }

    pub async fn get_friend_request(&self, request_id: &str) -> Result<Option<FriendRequest>> {
        let request = sqlx::query_as::<_, FriendRequest>(&format!(
            "SELECT {} FROM friend_requests WHERE id = ?",
            FRIEND_REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    /// Latest pending or accepted request between two users, either direction
    pub async fn find_open_friend_request(&self, user_a: &str, user_b: &str) -> Result<Option<FriendRequest>> {
        let request = sqlx::query_as::<_, FriendRequest>(&format!(
            "SELECT {} FROM friend_requests
             WHERE ((sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?))
               AND status IN ('pending', 'accepted')
             ORDER BY created_at DESC LIMIT 1",
            FRIEND_REQUEST_COLUMNS
        ))
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    pub async fn set_friend_request_status(&self, request_id: &str, status: FriendRequestStatus) -> Result<()> {
        sqlx::query("UPDATE friend_requests SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(request_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_received_requests(&self, user_id: &str) -> Result<Vec<FriendRequest>> {
        let requests = sqlx::query_as::<_, FriendRequest>(&format!(
            "SELECT {} FROM friend_requests WHERE receiver_id = ? AND status = 'pending'
             ORDER BY created_at DESC",
            FRIEND_REQUEST_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    pub async fn list_sent_requests(&self, user_id: &str) -> Result<Vec<FriendRequest>> {
        let requests = sqlx::query_as::<_, FriendRequest>(&format!(
            "SELECT {} FROM friend_requests WHERE sender_id = ? AND status = 'pending'
             ORDER BY created_at DESC",
            FRIEND_REQUEST_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    pub async fn are_friends(&self, user_a: &str, user_b: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM friend_requests
             WHERE ((sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?))
               AND status = 'accepted'
             LIMIT 1",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    pub async fn list_friends(&self, user_id: &str, page: PageParams) -> Result<(Vec<UserSummary>, i64)> {
        let friends = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.fullname, u.avatar, u.status, u.last_seen
             FROM friend_requests f
             JOIN users u ON u.id = CASE WHEN f.sender_id = ? THEN f.receiver_id ELSE f.sender_id END
             WHERE (f.sender_id = ? OR f.receiver_id = ?) AND f.status = 'accepted'
             ORDER BY u.fullname ASC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM friend_requests
             WHERE (sender_id = ? OR receiver_id = ?) AND status = 'accepted'",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((friends, total.0))
    }

    /// Delete every friend request between two users; with `accepted_only`
    /// only the friendship edge is removed.
    pub async fn delete_friend_requests_between(&self, user_a: &str, user_b: &str, accepted_only: bool) -> Result<u64> {
        let status_filter = if accepted_only { "AND status = 'accepted'" } else { "" };

        let result = sqlx::query(&format!(
            "DELETE FROM friend_requests
             WHERE ((sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?)) {}",
            status_filter
        ))
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn is_blocked_either(&self, user_a: &str, user_b: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM blocked_users
             WHERE (blocker_id = ? AND blocked_id = ?) OR (blocker_id = ? AND blocked_id = ?)
             LIMIT 1",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Returns false if the block already existed
    pub async fn create_block(&self, blocker_id: &str, blocked_id: &str, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO blocked_users (blocker_id, blocked_id, reason, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(blocker_id)
        .bind(blocked_id)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_block(&self, blocker_id: &str, blocked_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blocked_users WHERE blocker_id = ? AND blocked_id = ?")
            .bind(blocker_id)
            .bind(blocked_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_blocked(&self, blocker_id: &str) -> Result<Vec<UserSummary>> {
        let users = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.fullname, u.avatar, u.status, u.last_seen
             FROM blocked_users b JOIN users u ON u.id = b.blocked_id
             WHERE b.blocker_id = ? ORDER BY b.created_at DESC",
        )
        .bind(blocker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    // ========================================================================
    // Notification Operations
    // ========================================================================

    pub async fn create_notification(&self, new: &NewNotification) -> Result<Notification> {
        let id = crypto::generate_id();

        sqlx::query(
            "INSERT INTO notifications (id, recipient_id, sender_id, notification_type, title, message, link,
                                        related_chat, related_message, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(&new.recipient_id)
        .bind(&new.sender_id)
        .bind(new.notification_type)
        .bind(&new.title)
        .bind(&new.message)
        .bind(new.link.as_deref().unwrap_or(""))
        .bind(&new.related_chat)
        .bind(&new.related_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_notification(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Notification {} missing after insert", id).into())
    }

    pub async fn get_notification(&self, notification_id: &str) -> Result<Option<Notification>> {
        let notification = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {} FROM notifications WHERE id = ?",
            NOTIFICATION_COLUMNS
        ))
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(notification)
    }

    pub async fn list_notifications(
        &self,
        user_id: &str,
        is_read: Option<bool>,
        page: PageParams,
    ) -> Result<(Vec<Notification>, i64)> {
        let (items, total) = if let Some(read) = is_read {
            let items = sqlx::query_as::<_, Notification>(&format!(
                "SELECT {} FROM notifications WHERE recipient_id = ? AND is_read = ?
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                NOTIFICATION_COLUMNS
            ))
            .bind(user_id)
            .bind(read)
            .bind(page.limit as i64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

            let total: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = ?")
                    .bind(user_id)
                    .bind(read)
                    .fetch_one(&self.pool)
                    .await?;

            (items, total.0)
        } else {
            let items = sqlx::query_as::<_, Notification>(&format!(
                "SELECT {} FROM notifications WHERE recipient_id = ?
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                NOTIFICATION_COLUMNS
            ))
            .bind(user_id)
            .bind(page.limit as i64)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

            let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE recipient_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

            (items, total.0)
        };

        Ok((items, total))
    }

    pub async fn count_unread_notifications(&self, user_id: &str) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    /// Returns false if no notification with that id belongs to the user
    pub async fn mark_notification_read(&self, notification_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?)
             WHERE id = ? AND recipient_id = ?",
        )
        .bind(Utc::now())
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ? WHERE recipient_id = ? AND is_read = 0",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_notification(&self, notification_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ? AND recipient_id = ?")
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // File Operations
    // ========================================================================

    pub async fn create_file_metadata(
        &self,
        uploader_id: &str,
        file_name: &str,
        file_size: i64,
        mime_type: &str,
    ) -> Result<FileMetadata> {
        let file_id = crypto::generate_file_id()?;

        sqlx::query(
            "INSERT INTO files (file_id, uploader_id, file_name, file_size, mime_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&file_id)
        .bind(uploader_id)
        .bind(file_name)
        .bind(file_size)
        .bind(mime_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_file_metadata(&file_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("File {} missing after insert", file_id).into())
    }

    pub async fn get_file_metadata(&self, file_id: &str) -> Result<Option<FileMetadata>> {
        let file = sqlx::query_as::<_, FileMetadata>(
            "SELECT file_id, uploader_id, file_name, file_size, mime_type, created_at
             FROM files WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    pub async fn delete_file_metadata(&self, file_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage_with_users(n: usize) -> (Storage, Vec<User>) {
        let storage = Storage::in_memory().await.unwrap();
        let mut users = Vec::new();
        for i in 0..n {
            let user = storage
                .create_user(&format!("User {}", i), &format!("user{}@example.com", i), "hash")
                .await
                .unwrap();
            users.push(user);
        }
        (storage, users)
    }

    #[tokio::test]
    async fn test_insert_message_bumps_other_counters() {
        let (storage, users) = storage_with_users(3).await;
        let ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();

        let chat = storage
            .create_chat(NewChat {
                chat_type: ChatType::Group,
                name: Some("trio"),
                description: "",
                admin_id: Some(&ids[0]),
                participants: &ids,
                is_message_request: false,
                requested_by: None,
            })
            .await
            .unwrap();

        for _ in 0..2 {
            storage
                .insert_message(NewMessage {
                    chat_id: &chat.id,
                    sender_id: &ids[0],
                    message_type: MessageType::Text,
                    content: Some("hello"),
                    media: None,
                    reply_to: None,
                })
                .await
                .unwrap();
        }

        let counts: Vec<(String, i64)> = storage
            .list_participants(&chat.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| (p.user_id, p.unread_count))
            .collect();

        for (user_id, count) in counts {
            if user_id == ids[0] {
                assert_eq!(count, 0);
            } else {
                assert_eq!(count, 2);
            }
        }
    }

    #[tokio::test]
    async fn test_receipts_are_idempotent() {
        let (storage, users) = storage_with_users(2).await;
        let ids: Vec<String> = users.iter().map(|u| u.id.clone()).collect();
        let chat = storage
            .create_chat(NewChat {
                chat_type: ChatType::Private,
                name: None,
                description: "",
                admin_id: None,
                participants: &ids,
                is_message_request: false,
                requested_by: None,
            })
            .await
            .unwrap();
        let message = storage
            .insert_message(NewMessage {
                chat_id: &chat.id,
                sender_id: &ids[0],
                message_type: MessageType::Text,
                content: Some("hi"),
                media: None,
                reply_to: None,
            })
            .await
            .unwrap();

        assert!(storage.add_read_receipt(&message.id, &ids[1]).await.unwrap());
        assert!(!storage.add_read_receipt(&message.id, &ids[1]).await.unwrap());
        assert_eq!(storage.list_read_receipts(&message.id).await.unwrap().len(), 1);

        assert!(storage.add_delivery(&message.id, &ids[1]).await.unwrap());
        assert!(!storage.add_delivery(&message.id, &ids[1]).await.unwrap());
        assert_eq!(storage.list_deliveries(&message.id).await.unwrap(), vec![ids[1].clone()]);

        assert!(storage.hide_message_for(&message.id, &ids[1]).await.unwrap());
        assert!(!storage.hide_message_for(&message.id, &ids[1]).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_private_chat_either_order() {
        let (storage, users) = storage_with_users(3).await;
        let pair = vec![users[0].id.clone(), users[1].id.clone()];
        let chat = storage
            .create_chat(NewChat {
                chat_type: ChatType::Private,
                name: None,
                description: "",
                admin_id: None,
                participants: &pair,
                is_message_request: true,
                requested_by: Some(&users[0].id),
            })
            .await
            .unwrap();

        let found = storage.find_private_chat(&users[1].id, &users[0].id).await.unwrap().unwrap();
        assert_eq!(found.id, chat.id);
        assert!(found.is_message_request);
        assert_eq!(found.requested_by.as_deref(), Some(users[0].id.as_str()));
        assert!(storage.find_private_chat(&users[0].id, &users[2].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_lookup_by_email() {
        let (storage, users) = storage_with_users(1).await;
        let found = storage.get_user_by_email("user0@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, users[0].id);
        assert_eq!(found.status, UserStatus::Offline);
        assert!(storage.get_user_by_email("missing@example.com").await.unwrap().is_none());
    }
}
