//! Chat membership, message requests and chat views

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::*;
use crate::services::message::build_message_view;
use crate::services::NotificationService;
use crate::storage::{NewChat, Storage};

const MAX_GROUP_NAME_LENGTH: usize = 100;

#[derive(Clone)]
pub struct ChatService {
    storage: Arc<Storage>,
    notifications: NotificationService,
}

impl ChatService {
    pub fn new(storage: Arc<Storage>, notifications: NotificationService) -> Self {
        Self { storage, notifications }
    }

    /// Load a chat and check that `user_id` participates in it
    pub async fn ensure_participant(&self, chat_id: &str, user_id: &str) -> Result<Chat> {
        let chat = self.get_chat(chat_id).await?;
        if !self.storage.is_participant(chat_id, user_id).await? {
            return Err(AppError::forbidden("You are not a participant of this chat"));
        }
        Ok(chat)
    }

    pub async fn create_or_get_private_chat(&self, user_id: &str, other_id: &str) -> Result<ChatView> {
        if user_id == other_id {
            return Err(AppError::validation("Cannot start a chat with yourself"));
        }
        if self.storage.get_user(other_id).await?.is_none() {
            return Err(AppError::not_found("User not found"));
        }
        if self.storage.is_blocked_either(user_id, other_id).await? {
            return Err(AppError::forbidden("Cannot chat with a blocked user"));
        }

        if let Some(chat) = self.storage.find_private_chat(user_id, other_id).await? {
            if !chat.is_active {
                self.storage.set_chat_active(&chat.id, true).await?;
            }
            let chat = self.get_chat(&chat.id).await?;
            return self.view(&chat).await;
        }

        let are_friends = self.storage.are_friends(user_id, other_id).await?;
        let participants = [user_id.to_string(), other_id.to_string()];
        let chat = self
            .storage
            .create_chat(NewChat {
                chat_type: ChatType::Private,
                name: None,
                description: "",
                admin_id: None,
                participants: &participants,
                is_message_request: !are_friends,
                requested_by: (!are_friends).then_some(user_id),
            })
            .await?;

        tracing::info!("Private chat {} created (message request: {})", chat.id, !are_friends);
        self.view(&chat).await
    }

    pub async fn create_group_chat(
        &self,
        admin_id: &str,
        name: &str,
        participant_ids: &[String],
        description: Option<&str>,
    ) -> Result<ChatView> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_GROUP_NAME_LENGTH {
            return Err(AppError::validation(format!(
                "Group name must be between 1 and {} characters",
                MAX_GROUP_NAME_LENGTH
            )));
        }

        let mut seen = HashSet::new();
        let mut participants = Vec::new();
        for id in std::iter::once(admin_id).chain(participant_ids.iter().map(String::as_str)) {
            if seen.insert(id) {
                participants.push(id.to_string());
            }
        }
        if participants.len() < 2 {
            return Err(AppError::validation("A group needs at least 2 participants"));
        }

        for id in &participants {
            if self.storage.get_user(id).await?.is_none() {
                return Err(AppError::not_found(format!("User {} not found", id)));
            }
        }

        let chat = self
            .storage
            .create_chat(NewChat {
                chat_type: ChatType::Group,
                name: Some(name),
                description: description.unwrap_or(""),
                admin_id: Some(admin_id),
                participants: &participants,
                is_message_request: false,
                requested_by: None,
            })
            .await?;

        tracing::info!("Group chat {} created by {}", chat.id, admin_id);
        self.view(&chat).await
    }

    pub async fn get_chats_for_user(&self, user_id: &str, include_message_requests: bool) -> Result<Vec<ChatView>> {
        let chats = self.storage.list_chats_for_user(user_id, include_message_requests).await?;
        self.views(&chats).await
    }

    pub async fn get_message_requests(&self, user_id: &str) -> Result<Vec<ChatView>> {
        let chats = self.storage.list_message_requests(user_id).await?;
        self.views(&chats).await
    }

    pub async fn accept_message_request(&self, chat_id: &str, user_id: &str) -> Result<ChatView> {
        let chat = self.ensure_participant(chat_id, user_id).await?;
        if chat.is_message_request {
            if chat.requested_by.as_deref() == Some(user_id) {
                return Err(AppError::forbidden("Only the recipient can accept a message request"));
            }
            self.storage.accept_message_request(chat_id).await?;
        }

        let chat = self.get_chat(chat_id).await?;
        self.view(&chat).await
    }

    pub async fn decline_message_request(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.ensure_participant(chat_id, user_id).await?;
        self.storage.set_chat_active(chat_id, false).await
    }

    pub async fn get_chat_by_id(&self, chat_id: &str, user_id: &str) -> Result<ChatView> {
        let chat = self.ensure_participant(chat_id, user_id).await?;
        self.view(&chat).await
    }

    pub async fn update_chat(&self, chat_id: &str, user_id: &str, req: UpdateChatRequest) -> Result<ChatView> {
        let chat = self.ensure_participant(chat_id, user_id).await?;
        if chat.chat_type == ChatType::Group && chat.admin_id.as_deref() != Some(user_id) {
            return Err(AppError::forbidden("Only the group admin can update the group"));
        }

        let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        if let Some(name) = name {
            if name.chars().count() > MAX_GROUP_NAME_LENGTH {
                return Err(AppError::validation(format!(
                    "Group name must be between 1 and {} characters",
                    MAX_GROUP_NAME_LENGTH
                )));
            }
        }

        self.storage
            .update_chat_details(
                chat_id,
                name,
                req.description.as_deref().filter(|d| !d.is_empty()),
                req.avatar.as_deref().filter(|a| !a.is_empty()),
            )
            .await?;

        let chat = self.get_chat(chat_id).await?;
        self.view(&chat).await
    }

    /// Soft-deactivate a chat. Groups can only be removed by their admin.
    pub async fn delete_chat(&self, chat_id: &str, user_id: &str) -> Result<()> {
        let chat = self.ensure_participant(chat_id, user_id).await?;
        if chat.chat_type == ChatType::Group && chat.admin_id.as_deref() != Some(user_id) {
            return Err(AppError::forbidden("Only the group admin can delete the group"));
        }

        self.storage.set_chat_active(chat_id, false).await?;
        tracing::info!("Chat {} deactivated by {}", chat_id, user_id);
        Ok(())
    }

    pub async fn add_participant(&self, chat_id: &str, user_id: &str, new_participant_id: &str) -> Result<ChatView> {
        let chat = self.get_chat(chat_id).await?;
        if chat.chat_type != ChatType::Group {
            return Err(AppError::forbidden("Participants can only be added to groups"));
        }
        if chat.admin_id.as_deref() != Some(user_id) {
            return Err(AppError::forbidden("Only the group admin can add participants"));
        }
        if self.storage.get_user(new_participant_id).await?.is_none() {
            return Err(AppError::not_found("User not found"));
        }

        if self.storage.add_participant(chat_id, new_participant_id).await? {
            let admin = self
                .storage
                .get_user_summary(user_id)
                .await?
                .ok_or_else(|| AppError::not_found("User not found"))?;
            if let Err(e) = self
                .notifications
                .group_invite_notification(new_participant_id, &admin, &chat)
                .await
            {
                tracing::warn!("Failed to create group invite notification: {}", e);
            }
        }

        let chat = self.get_chat(chat_id).await?;
        self.view(&chat).await
    }

    /// Remove a group member. The admin may remove anyone; members may
    /// remove themselves. An admin who leaves hands the group to the
    /// longest-standing remaining member.
    pub async fn remove_participant(&self, chat_id: &str, user_id: &str, participant_id: &str) -> Result<()> {
        let chat = self.get_chat(chat_id).await?;
        if chat.chat_type != ChatType::Group {
            return Err(AppError::forbidden("Participants can only be removed from groups"));
        }

        let is_admin = chat.admin_id.as_deref() == Some(user_id);
        if !is_admin && user_id != participant_id {
            return Err(AppError::forbidden("Only the group admin or the member themselves can do this"));
        }

        let participants = self.storage.list_participants(chat_id).await?;
        if !participants.iter().any(|p| p.user_id == participant_id) {
            return Err(AppError::not_found("User is not a participant of this chat"));
        }
        if participants.len() <= 2 {
            return Err(AppError::validation("A group needs at least 2 participants"));
        }

        self.storage.remove_participant(chat_id, participant_id).await?;

        if chat.admin_id.as_deref() == Some(participant_id) {
            if let Some(successor) = participants.iter().find(|p| p.user_id != participant_id) {
                self.storage.set_chat_admin(chat_id, &successor.user_id).await?;
            }
        }

        Ok(())
    }

    pub async fn view(&self, chat: &Chat) -> Result<ChatView> {
        let participants = self.storage.list_participants(&chat.id).await?;

        let mut summaries = Vec::with_capacity(participants.len());
        let mut unread_count = BTreeMap::new();
        for participant in participants {
            if let Some(summary) = self.storage.get_user_summary(&participant.user_id).await? {
                summaries.push(summary);
            }
            unread_count.insert(participant.user_id, participant.unread_count);
        }

        let last_message = match chat.last_message_id.as_deref() {
            Some(id) => match self.storage.get_message(id).await? {
                Some(message) => Some(build_message_view(&self.storage, &message).await?),
                None => None,
            },
            None => None,
        };

        Ok(ChatView {
            id: chat.id.clone(),
            chat_type: chat.chat_type,
            name: chat.name.clone(),
            description: chat.description.clone(),
            avatar: chat.avatar.clone(),
            admin: chat.admin_id.clone(),
            participants: summaries,
            last_message,
            last_message_at: chat.last_message_at,
            unread_count,
            is_active: chat.is_active,
            is_message_request: chat.is_message_request,
            requested_by: chat.requested_by.clone(),
            message_request_accepted_at: chat.message_request_accepted_at,
            created_at: chat.created_at,
        })
    }

    async fn views(&self, chats: &[Chat]) -> Result<Vec<ChatView>> {
        let mut views = Vec::with_capacity(chats.len());
        for chat in chats {
            views.push(self.view(chat).await?);
        }
        Ok(views)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Chat> {
        self.storage
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| AppError::not_found("Chat not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    #[tokio::test]
    async fn test_blocked_users_cannot_open_private_chat() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;

        state.friends.block_user(&bob.id, &alice.id, None).await.unwrap();

        let err = state
            .chats
            .create_or_get_private_chat(&alice.id, &bob.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(state.storage.find_private_chat(&alice.id, &bob.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_message_request_flow() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;

        let chat = state.chats.create_or_get_private_chat(&alice.id, &bob.id).await.unwrap();
        assert!(chat.is_message_request);
        assert!(chat.message_request_accepted_at.is_none());

        let listed = state.chats.get_chats_for_user(&bob.id, false).await.unwrap();
        assert!(listed.is_empty());
        let requests = state.chats.get_message_requests(&bob.id).await.unwrap();
        assert_eq!(requests.len(), 1);

        assert_eq!(chat.requested_by.as_deref(), Some(alice.id.as_str()));

        // The sender cannot approve their own request
        let err = state.chats.accept_message_request(&chat.id, &alice.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(state.chats.get_chat_by_id(&chat.id, &alice.id).await.unwrap().is_message_request);

        let accepted = state.chats.accept_message_request(&chat.id, &bob.id).await.unwrap();
        assert!(!accepted.is_message_request);
        assert!(accepted.message_request_accepted_at.is_some());

        let listed = state.chats.get_chats_for_user(&bob.id, false).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, chat.id);
    }

    #[tokio::test]
    async fn test_private_chat_is_reused_and_reactivated() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;

        let first = state.chats.create_or_get_private_chat(&alice.id, &bob.id).await.unwrap();
        state.chats.delete_chat(&first.id, &alice.id).await.unwrap();
        assert!(state.chats.get_chats_for_user(&alice.id, true).await.unwrap().is_empty());

        let again = state.chats.create_or_get_private_chat(&bob.id, &alice.id).await.unwrap();
        assert_eq!(again.id, first.id);
        assert!(again.is_active);
        assert_eq!(again.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_private_chat_with_self_or_unknown() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;

        let err = state
            .chats
            .create_or_get_private_chat(&alice.id, &alice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = state
            .chats
            .create_or_get_private_chat(&alice.id, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_group_membership_rules() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;
        let carol = testing::user(&state, "Carol").await;

        let err = state
            .chats
            .create_group_chat(&alice.id, "solo", &[alice.id.clone()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let group = state
            .chats
            .create_group_chat(&alice.id, "friends", &[bob.id.clone()], Some("weekend plans"))
            .await
            .unwrap();
        assert_eq!(group.admin.as_deref(), Some(alice.id.as_str()));
        assert_eq!(group.participants.len(), 2);

        // Only the admin adds members
        let err = state
            .chats
            .add_participant(&group.id, &bob.id, &carol.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let group = state.chats.add_participant(&group.id, &alice.id, &carol.id).await.unwrap();
        assert_eq!(group.participants.len(), 3);
        assert_eq!(group.unread_count.get(&carol.id), Some(&0));

        // Adding again is a no-op
        let group = state.chats.add_participant(&group.id, &alice.id, &carol.id).await.unwrap();
        assert_eq!(group.participants.len(), 3);

        // Carol got exactly one invite
        let page = PageParams { page: 1, limit: 10 };
        let invites = state.notifications.list(&carol.id, None, page).await.unwrap();
        assert_eq!(invites.items.len(), 1);
        assert_eq!(invites.items[0].notification.notification_type, NotificationType::GroupInvite);

        // Bob cannot remove Carol, but can leave
        let err = state
            .chats
            .remove_participant(&group.id, &bob.id, &carol.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        state.chats.remove_participant(&group.id, &bob.id, &bob.id).await.unwrap();

        // Two members remain, no further removals
        let err = state
            .chats
            .remove_participant(&group.id, &alice.id, &carol.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = state.chats.get_chat_by_id(&group.id, &bob.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_only_admin_updates_group() {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;

        let group = state
            .chats
            .create_group_chat(&alice.id, "team", &[bob.id.clone()], None)
            .await
            .unwrap();

        let update = || UpdateChatRequest {
            name: Some("renamed".to_string()),
            description: None,
            avatar: None,
        };

        let err = state.chats.update_chat(&group.id, &bob.id, update()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let updated = state.chats.update_chat(&group.id, &alice.id, update()).await.unwrap();
        assert_eq!(updated.name.as_deref(), Some("renamed"));

        let err = state.chats.delete_chat(&group.id, &bob.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
