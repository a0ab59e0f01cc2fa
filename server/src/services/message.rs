//! Message lifecycle: send, history, edit, delete and receipts

use chrono::Utc;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::*;
use crate::presence::PresenceRegistry;
use crate::services::{ChatService, NotificationService};
use crate::storage::{NewMessage, Storage};

/// Resolve sender, reply preview and receipt lists for a stored message
pub async fn build_message_view(storage: &Storage, message: &Message) -> Result<MessageView> {
    let sender = storage
        .get_user_summary(&message.sender_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Sender {} of message {} missing", message.sender_id, message.id))?;

    let reply_to = match message.reply_to.as_deref() {
        Some(id) => storage.get_message(id).await?.map(|original| ReplyPreview {
            id: original.id,
            sender_id: original.sender_id,
            message_type: original.message_type,
            content: original.content,
        }),
        None => None,
    };

    Ok(MessageView {
        id: message.id.clone(),
        chat_id: message.chat_id.clone(),
        sender,
        message_type: message.message_type,
        content: message.content.clone(),
        media: message.media(),
        reply_to,
        read_by: storage.list_read_receipts(&message.id).await?,
        delivered_to: storage.list_deliveries(&message.id).await?,
        is_edited: message.is_edited,
        edited_at: message.edited_at,
        is_deleted: message.is_deleted,
        deleted_at: message.deleted_at,
        created_at: message.created_at,
        updated_at: message.updated_at,
    })
}

#[derive(Clone)]
pub struct MessageService {
    storage: Arc<Storage>,
    presence: Arc<PresenceRegistry>,
    chats: ChatService,
    notifications: NotificationService,
    max_message_length: usize,
}

impl MessageService {
    pub fn new(
        storage: Arc<Storage>,
        presence: Arc<PresenceRegistry>,
        chats: ChatService,
        notifications: NotificationService,
        max_message_length: usize,
    ) -> Self {
        Self {
            storage,
            presence,
            chats,
            notifications,
            max_message_length,
        }
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.chars().count() > self.max_message_length {
            return Err(AppError::validation(format!(
                "Message must be at most {} characters",
                self.max_message_length
            )));
        }
        Ok(())
    }

    pub async fn send_message(&self, sender_id: &str, req: SendMessageRequest) -> Result<MessageView> {
        let chat = self.chats.ensure_participant(&req.chat_id, sender_id).await?;

        let content = req.content.as_deref().map(str::trim).filter(|c| !c.is_empty());
        match req.message_type {
            MessageType::Text if content.is_none() => {
                return Err(AppError::validation("Text messages need content"));
            }
            MessageType::Text => {}
            _ if req.media.is_none() => {
                return Err(AppError::validation("Media messages need a media payload"));
            }
            _ => {}
        }
        if let Some(content) = content {
            self.validate_content(content)?;
        }

        if let Some(reply_id) = req.reply_to.as_deref() {
            let original = self.storage.get_message(reply_id).await?;
            if original.map(|m| m.chat_id != chat.id).unwrap_or(true) {
                return Err(AppError::validation("Reply target must be a message in the same chat"));
            }
        }

        let message = self
            .storage
            .insert_message(NewMessage {
                chat_id: &chat.id,
                sender_id,
                message_type: req.message_type,
                content,
                media: req.media.as_ref(),
                reply_to: req.reply_to.as_deref(),
            })
            .await?;

        let view = build_message_view(&self.storage, &message).await?;
        self.notify_offline_participants(&view).await;

        Ok(view)
    }

    /// Participants without a live connection get a persisted notification
    async fn notify_offline_participants(&self, view: &MessageView) {
        let participants = match self.storage.list_participants(&view.chat_id).await {
            Ok(participants) => participants,
            Err(e) => {
                tracing::warn!("Failed to load participants of chat {}: {}", view.chat_id, e);
                return;
            }
        };

        for participant in participants {
            if participant.user_id == view.sender.id || self.presence.is_online(&participant.user_id) {
                continue;
            }
            if let Err(e) = self
                .notifications
                .message_notification(&participant.user_id, &view.sender, &view.chat_id, &view.id)
                .await
            {
                tracing::warn!("Failed to notify {} of message {}: {}", participant.user_id, view.id, e);
            }
        }
    }

    /// A page of chat history in chronological order.
    ///
    /// `before` narrows the set to messages strictly older than the given
    /// message; `page`/`limit` then paginate within the narrowed set. An
    /// unknown cursor is ignored.
    pub async fn get_messages(
        &self,
        chat_id: &str,
        viewer_id: &str,
        page: PageParams,
        before: Option<&str>,
    ) -> Result<Page<MessageView>> {
        self.chats.ensure_participant(chat_id, viewer_id).await?;

        let before_seq = match before {
            Some(id) => self
                .storage
                .get_message(id)
                .await?
                .filter(|m| m.chat_id == chat_id)
                .map(|m| m.seq),
            None => None,
        };

        let (messages, total) = self
            .storage
            .list_messages(chat_id, viewer_id, before_seq, page)
            .await?;

        let mut items = Vec::with_capacity(messages.len());
        for message in messages.iter().rev() {
            items.push(build_message_view(&self.storage, message).await?);
        }

        Ok(Page {
            items,
            pagination: Pagination::new(page, total),
        })
    }

    pub async fn edit_message(&self, message_id: &str, user_id: &str, content: &str) -> Result<MessageView> {
        let message = self.get_message(message_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::forbidden("You can only edit your own messages"));
        }
        if message.is_deleted {
            return Err(AppError::validation("Deleted messages cannot be edited"));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation("Message content cannot be empty"));
        }
        self.validate_content(content)?;

        self.storage.update_message_content(message_id, content).await?;

        let message = self.get_message(message_id).await?;
        build_message_view(&self.storage, &message).await
    }

    /// Delete for everyone (sender only) or hide for the caller alone
    pub async fn delete_message(
        &self,
        message_id: &str,
        user_id: &str,
        delete_for_everyone: bool,
    ) -> Result<MessageDeletedPayload> {
        let message = self.get_message(message_id).await?;

        if delete_for_everyone {
            if message.sender_id != user_id {
                return Err(AppError::forbidden("Only the sender can delete a message for everyone"));
            }
            self.storage.mark_message_deleted(message_id).await?;
        } else {
            if !self.storage.is_participant(&message.chat_id, user_id).await? {
                return Err(AppError::forbidden("You are not a participant of this chat"));
            }
            self.storage.hide_message_for(message_id, user_id).await?;
        }

        Ok(MessageDeletedPayload {
            message_id: message.id,
            chat_id: message.chat_id,
            deleted_by: user_id.to_string(),
            delete_for_everyone,
        })
    }

    /// Record a read receipt and reset the reader's unread counter
    pub async fn mark_as_read(&self, message_id: &str, user_id: &str) -> Result<ReceiptEventPayload> {
        let message = self.get_message(message_id).await?;
        if !self.storage.is_participant(&message.chat_id, user_id).await? {
            return Err(AppError::forbidden("You are not a participant of this chat"));
        }

        self.storage.add_read_receipt(message_id, user_id).await?;
        self.storage.reset_unread(&message.chat_id, user_id).await?;

        Ok(ReceiptEventPayload {
            message_id: message.id,
            chat_id: message.chat_id,
            user_id: user_id.to_string(),
            at: Utc::now(),
        })
    }

    pub async fn mark_as_delivered(&self, message_id: &str, user_id: &str) -> Result<ReceiptEventPayload> {
        let message = self.get_message(message_id).await?;
        if !self.storage.is_participant(&message.chat_id, user_id).await? {
            return Err(AppError::forbidden("You are not a participant of this chat"));
        }

        self.storage.add_delivery(message_id, user_id).await?;

        Ok(ReceiptEventPayload {
            message_id: message.id,
            chat_id: message.chat_id,
            user_id: user_id.to_string(),
            at: Utc::now(),
        })
    }

    async fn get_message(&self, message_id: &str) -> Result<Message> {
        self.storage
            .get_message(message_id)
            .await?
            .ok_or_else(|| AppError::not_found("Message not found"))
    }
}
