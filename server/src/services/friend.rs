//! Friend requests, friendships and blocking

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::*;
use crate::services::NotificationService;
use crate::storage::Storage;

#[derive(Clone)]
pub struct FriendService {
    storage: Arc<Storage>,
    notifications: NotificationService,
}

impl FriendService {
    pub fn new(storage: Arc<Storage>, notifications: NotificationService) -> Self {
        Self { storage, notifications }
    }

    pub async fn send_request(&self, sender_id: &str, receiver_id: &str, message: Option<&str>) -> Result<FriendRequestView> {
        if sender_id == receiver_id {
            return Err(AppError::conflict("You cannot send a friend request to yourself"));
        }
        self.summary(receiver_id).await?;

        if self.storage.is_blocked_either(sender_id, receiver_id).await? {
            return Err(AppError::forbidden("Cannot send a friend request to this user"));
        }
        if let Some(existing) = self.storage.find_open_friend_request(sender_id, receiver_id).await? {
            return Err(match existing.status {
                FriendRequestStatus::Accepted => AppError::conflict("You are already friends"),
                _ => AppError::conflict("A friend request is already pending"),
            });
        }

        let request = self
            .storage
            .create_friend_request(sender_id, receiver_id, message.unwrap_or(""))
            .await?;
        let view = self.view(request).await?;

        if let Err(e) = self
            .notifications
            .friend_request_notification(receiver_id, &view.sender)
            .await
        {
            tracing::warn!("Failed to create friend request notification: {}", e);
        }

        Ok(view)
    }

    /// Accept a pending request addressed to `user_id`. A pending message
    /// request between the two becomes a regular chat.
    pub async fn accept_request(&self, request_id: &str, user_id: &str) -> Result<FriendRequestView> {
        let request = self.pending_for_receiver(request_id, user_id).await?;

        self.storage
            .set_friend_request_status(&request.id, FriendRequestStatus::Accepted)
            .await?;
        self.storage
            .clear_private_message_request(&request.sender_id, &request.receiver_id)
            .await?;

        let view = self.reload(&request.id).await?;
        if let Err(e) = self
            .notifications
            .friend_accept_notification(&request.sender_id, &view.receiver)
            .await
        {
            tracing::warn!("Failed to create friend accept notification: {}", e);
        }

        Ok(view)
    }

    pub async fn reject_request(&self, request_id: &str, user_id: &str) -> Result<FriendRequestView> {
        let request = self.pending_for_receiver(request_id, user_id).await?;
        self.storage
            .set_friend_request_status(&request.id, FriendRequestStatus::Rejected)
            .await?;
        self.reload(&request.id).await
    }

    pub async fn cancel_request(&self, request_id: &str, user_id: &str) -> Result<()> {
        let request = self.get_request(request_id).await?;
        if request.sender_id != user_id {
            return Err(AppError::forbidden("Only the sender can cancel this request"));
        }
        if request.status != FriendRequestStatus::Pending {
            return Err(AppError::conflict("This request is no longer pending"));
        }
        self.storage
            .set_friend_request_status(&request.id, FriendRequestStatus::Cancelled)
            .await
    }

    pub async fn get_friend_requests(&self, user_id: &str) -> Result<Vec<FriendRequestView>> {
        let requests = self.storage.list_received_requests(user_id).await?;
        self.views(requests).await
    }

    pub async fn get_sent_requests(&self, user_id: &str) -> Result<Vec<FriendRequestView>> {
        let requests = self.storage.list_sent_requests(user_id).await?;
        self.views(requests).await
    }

    pub async fn get_friends(&self, user_id: &str, page: PageParams) -> Result<Page<UserSummary>> {
        let (items, total) = self.storage.list_friends(user_id, page).await?;
        Ok(Page {
            items,
            pagination: Pagination::new(page, total),
        })
    }

    pub async fn remove_friend(&self, user_id: &str, friend_id: &str) -> Result<()> {
        let removed = self
            .storage
            .delete_friend_requests_between(user_id, friend_id, true)
            .await?;
        if removed == 0 {
            return Err(AppError::not_found("You are not friends with this user"));
        }
        Ok(())
    }

    pub async fn are_friends(&self, user_a: &str, user_b: &str) -> Result<bool> {
        self.storage.are_friends(user_a, user_b).await
    }

    pub async fn is_blocked(&self, user_a: &str, user_b: &str) -> Result<bool> {
        self.storage.is_blocked_either(user_a, user_b).await
    }

    /// Block a user: friendship and pending requests between the two are
    /// dropped and their private chat is deactivated
    pub async fn block_user(&self, blocker_id: &str, blocked_id: &str, reason: Option<&str>) -> Result<()> {
        if blocker_id == blocked_id {
            return Err(AppError::validation("You cannot block yourself"));
        }
        self.summary(blocked_id).await?;

        if !self
            .storage
            .create_block(blocker_id, blocked_id, reason.unwrap_or(""))
            .await?
        {
            return Err(AppError::conflict("User is already blocked"));
        }

        self.storage
            .delete_friend_requests_between(blocker_id, blocked_id, false)
            .await?;
        self.storage.deactivate_private_chats(blocker_id, blocked_id).await?;

        tracing::info!("User {} blocked {}", blocker_id, blocked_id);
        Ok(())
    }

    pub async fn unblock_user(&self, blocker_id: &str, blocked_id: &str) -> Result<()> {
        if !self.storage.delete_block(blocker_id, blocked_id).await? {
            return Err(AppError::not_found("User is not blocked"));
        }
        Ok(())
    }

    pub async fn get_blocked_users(&self, user_id: &str) -> Result<Vec<UserSummary>> {
        self.storage.list_blocked(user_id).await
    }

    async fn pending_for_receiver(&self, request_id: &str, user_id: &str) -> Result<FriendRequest> {
        let request = self.get_request(request_id).await?;
        if request.receiver_id != user_id {
            return Err(AppError::forbidden("This request was not sent to you"));
        }
        if request.status != FriendRequestStatus::Pending {
            return Err(AppError::conflict("This request is no longer pending"));
        }
        Ok(request)
    }

    async fn get_request(&self, request_id: &str) -> Result<FriendRequest> {
        self.storage
            .get_friend_request(request_id)
            .await?
            .ok_or_else(|| AppError::not_found("Friend request not found"))
    }

    async fn reload(&self, request_id: &str) -> Result<FriendRequestView> {
        let request = self.get_request(request_id).await?;
        self.view(request).await
    }

    async fn summary(&self, user_id: &str) -> Result<UserSummary> {
        self.storage
            .get_user_summary(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    async fn view(&self, request: FriendRequest) -> Result<FriendRequestView> {
        let sender = self.summary(&request.sender_id).await?;
        let receiver = self.summary(&request.receiver_id).await?;
        Ok(FriendRequestView { request, sender, receiver })
    }

    async fn views(&self, requests: Vec<FriendRequest>) -> Result<Vec<FriendRequestView>> {
        let mut views = Vec::with_capacity(requests.len());
        for request in requests {
            views.push(self.view(request).await?);
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    const PAGE: PageParams = PageParams { page: 1, limit: 20 };

    #[tokio::test]
    async fn test_request_accept_flow() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;

        let chat = state.chats.create_or_get_private_chat(&alice.id, &bob.id).await.unwrap();
        assert!(chat.is_message_request);

        let request = state.friends.send_request(&alice.id, &bob.id, Some("hey")).await.unwrap();
        assert_eq!(request.request.status, FriendRequestStatus::Pending);

        let err = state.friends.send_request(&bob.id, &alice.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = state.friends.accept_request(&request.request.id, &alice.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let accepted = state.friends.accept_request(&request.request.id, &bob.id).await.unwrap();
        assert_eq!(accepted.request.status, FriendRequestStatus::Accepted);
        assert!(state.friends.are_friends(&bob.id, &alice.id).await.unwrap());

        let chat = state.storage.get_chat(&chat.id).await.unwrap().unwrap();
        assert!(!chat.is_message_request);
        assert!(chat.message_request_accepted_at.is_some());

        let friends = state.friends.get_friends(&alice.id, PAGE).await.unwrap();
        assert_eq!(friends.items.len(), 1);
        assert_eq!(friends.items[0].id, bob.id);

        // Bob was notified of the request, Alice of the acceptance
        let bob_notes = state.notifications.list(&bob.id, None, PAGE).await.unwrap();
        assert_eq!(bob_notes.items[0].notification.notification_type, NotificationType::FriendRequest);
        let alice_notes = state.notifications.list(&alice.id, None, PAGE).await.unwrap();
        assert_eq!(alice_notes.items[0].notification.notification_type, NotificationType::FriendAccept);

        let err = state.friends.send_request(&alice.id, &bob.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "You are already friends"));

        state.friends.remove_friend(&bob.id, &alice.id).await.unwrap();
        assert!(!state.friends.are_friends(&alice.id, &bob.id).await.unwrap());
        let err = state.friends.remove_friend(&bob.id, &alice.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reject_and_cancel() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;

        let request = state.friends.send_request(&alice.id, &bob.id, None).await.unwrap();
        assert_eq!(state.friends.get_sent_requests(&alice.id).await.unwrap().len(), 1);
        assert_eq!(state.friends.get_friend_requests(&bob.id).await.unwrap().len(), 1);

        let rejected = state.friends.reject_request(&request.request.id, &bob.id).await.unwrap();
        assert_eq!(rejected.request.status, FriendRequestStatus::Rejected);
        assert!(state.friends.get_friend_requests(&bob.id).await.unwrap().is_empty());

        // A rejected request does not block a new one
        let request = state.friends.send_request(&alice.id, &bob.id, None).await.unwrap();
        let err = state.friends.cancel_request(&request.request.id, &bob.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        state.friends.cancel_request(&request.request.id, &alice.id).await.unwrap();
        assert!(state.friends.get_sent_requests(&alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_severs_relationship() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;

        let request = state.friends.send_request(&alice.id, &bob.id, None).await.unwrap();
        state.friends.accept_request(&request.request.id, &bob.id).await.unwrap();
        let chat = state.chats.create_or_get_private_chat(&alice.id, &bob.id).await.unwrap();
        assert!(!chat.is_message_request);

        state.friends.block_user(&alice.id, &bob.id, Some("spam")).await.unwrap();
        assert!(state.friends.is_blocked(&bob.id, &alice.id).await.unwrap());
        assert!(!state.friends.are_friends(&alice.id, &bob.id).await.unwrap());
        assert!(state.chats.get_chats_for_user(&bob.id, true).await.unwrap().is_empty());

        let err = state.friends.block_user(&alice.id, &bob.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = state.friends.send_request(&bob.id, &alice.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let blocked = state.friends.get_blocked_users(&alice.id).await.unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].id, bob.id);

        state.friends.unblock_user(&alice.id, &bob.id).await.unwrap();
        let err = state.friends.unblock_user(&alice.id, &bob.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
