//! Notification records and their live push

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::*;
use crate::presence::PresenceRegistry;
use crate::storage::Storage;

#[derive(Clone)]
pub struct NotificationService {
    storage: Arc<Storage>,
    presence: Arc<PresenceRegistry>,
}

impl NotificationService {
    pub fn new(storage: Arc<Storage>, presence: Arc<PresenceRegistry>) -> Self {
        Self { storage, presence }
    }

    /// Persist a notification and push it to every live connection of the
    /// recipient
    pub async fn create(&self, new: NewNotification) -> Result<NotificationView> {
        let notification = self.storage.create_notification(&new).await?;
        let view = self.view(notification).await?;

        self.presence
            .send_to_user(&new.recipient_id, ServerEvent::NotificationNew(view.clone()));

        Ok(view)
    }

    pub async fn message_notification(
        &self,
        recipient_id: &str,
        sender: &UserSummary,
        chat_id: &str,
        message_id: &str,
    ) -> Result<NotificationView> {
        self.create(NewNotification {
            recipient_id: recipient_id.to_string(),
            sender_id: Some(sender.id.clone()),
            notification_type: NotificationType::Message,
            title: "New message".to_string(),
            message: format!("{} sent you a message", sender.fullname),
            link: Some(format!("/chats/{}", chat_id)),
            related_chat: Some(chat_id.to_string()),
            related_message: Some(message_id.to_string()),
        })
        .await
    }

    pub async fn friend_request_notification(&self, recipient_id: &str, sender: &UserSummary) -> Result<NotificationView> {
        self.create(NewNotification {
            recipient_id: recipient_id.to_string(),
            sender_id: Some(sender.id.clone()),
            notification_type: NotificationType::FriendRequest,
            title: "Friend request".to_string(),
            message: format!("{} sent you a friend request", sender.fullname),
            link: Some("/friends/requests".to_string()),
            related_chat: None,
            related_message: None,
        })
        .await
    }

    pub async fn friend_accept_notification(&self, recipient_id: &str, sender: &UserSummary) -> Result<NotificationView> {
        self.create(NewNotification {
            recipient_id: recipient_id.to_string(),
            sender_id: Some(sender.id.clone()),
            notification_type: NotificationType::FriendAccept,
            title: "Friend request accepted".to_string(),
            message: format!("{} accepted your friend request", sender.fullname),
            link: Some(format!("/users/{}", sender.id)),
            related_chat: None,
            related_message: None,
        })
        .await
    }

    pub async fn group_invite_notification(
        &self,
        recipient_id: &str,
        sender: &UserSummary,
        chat: &Chat,
    ) -> Result<NotificationView> {
        let group = chat.name.as_deref().unwrap_or("a group");
        self.create(NewNotification {
            recipient_id: recipient_id.to_string(),
            sender_id: Some(sender.id.clone()),
            notification_type: NotificationType::GroupInvite,
            title: "Added to group".to_string(),
            message: format!("{} added you to {}", sender.fullname, group),
            link: Some(format!("/chats/{}", chat.id)),
            related_chat: Some(chat.id.clone()),
            related_message: None,
        })
        .await
    }

    pub async fn list(&self, user_id: &str, is_read: Option<bool>, page: PageParams) -> Result<NotificationPage> {
        let (notifications, total) = self.storage.list_notifications(user_id, is_read, page).await?;
        let unread_count = self.storage.count_unread_notifications(user_id).await?;

        let mut items = Vec::with_capacity(notifications.len());
        for notification in notifications {
            items.push(self.view(notification).await?);
        }

        Ok(NotificationPage {
            items,
            unread_count,
            pagination: Pagination::new(page, total),
        })
    }

    pub async fn mark_as_read(&self, notification_id: &str, user_id: &str) -> Result<()> {
        if !self.storage.mark_notification_read(notification_id, user_id).await? {
            return Err(AppError::not_found("Notification not found"));
        }
        Ok(())
    }

    pub async fn mark_all_as_read(&self, user_id: &str) -> Result<u64> {
        self.storage.mark_all_notifications_read(user_id).await
    }

    pub async fn delete(&self, notification_id: &str, user_id: &str) -> Result<()> {
        if !self.storage.delete_notification(notification_id, user_id).await? {
            return Err(AppError::not_found("Notification not found"));
        }
        Ok(())
    }

    async fn view(&self, notification: Notification) -> Result<NotificationView> {
        let sender = match notification.sender_id.as_deref() {
            Some(id) => self.storage.get_user_summary(id).await?,
            None => None,
        };
        Ok(NotificationView { notification, sender })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_create_pushes_to_every_connection() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        state.presence.register(&bob.id, "phone", tx1);
        state.presence.register(&bob.id, "laptop", tx2);

        let sender = state.storage.get_user_summary(&alice.id).await.unwrap().unwrap();
        let view = state
            .notifications
            .friend_request_notification(&bob.id, &sender)
            .await
            .unwrap();
        assert_eq!(view.notification.notification_type, NotificationType::FriendRequest);
        assert_eq!(view.sender.as_ref().map(|s| s.id.as_str()), Some(alice.id.as_str()));

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap() {
                ServerEvent::NotificationNew(pushed) => assert_eq!(pushed.notification.id, view.notification.id),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_read_state_and_ownership() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;
        let sender = state.storage.get_user_summary(&alice.id).await.unwrap().unwrap();

        let first = state.notifications.friend_accept_notification(&bob.id, &sender).await.unwrap();
        state.notifications.friend_accept_notification(&bob.id, &sender).await.unwrap();

        let page = PageParams { page: 1, limit: 20 };
        let listed = state.notifications.list(&bob.id, None, page).await.unwrap();
        assert_eq!(listed.items.len(), 2);
        assert_eq!(listed.unread_count, 2);

        // Only the recipient may touch a notification
        let err = state
            .notifications
            .mark_as_read(&first.notification.id, &alice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        state.notifications.mark_as_read(&first.notification.id, &bob.id).await.unwrap();
        let unread = state.notifications.list(&bob.id, Some(false), page).await.unwrap();
        assert_eq!(unread.items.len(), 1);
        assert_eq!(unread.unread_count, 1);

        assert_eq!(state.notifications.mark_all_as_read(&bob.id).await.unwrap(), 1);
        state.notifications.delete(&first.notification.id, &bob.id).await.unwrap();
        assert!(state.notifications.delete(&first.notification.id, &bob.id).await.is_err());

        let listed = state.notifications.list(&bob.id, None, page).await.unwrap();
        assert_eq!(listed.pagination.total, 1);
        assert_eq!(listed.unread_count, 0);
    }
}
