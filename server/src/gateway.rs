//! Real-time WebSocket gateway
//!
//! A connection is authenticated once, at the upgrade request. Every frame
//! after that is trusted as coming from the token's user. Each inbound event
//! maps to one service call; failures are reported to the originating
//! connection as an `error` event and never close the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use axum_extra::extract::CookieJar;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    auth, crypto,
    error::{AppError, Result},
    models::*,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
}

/// Upgrade handler. The token may come from `?token=`, a bearer header or
/// the session cookie; anything else is rejected with 401 before upgrading.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| auth::bearer_token(&headers))
        .or_else(|| jar.get(&state.config.auth.cookie_name).map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::unauthorized("Authentication token required"))?;

    let claims = auth::verify_token(&token, &state.config.auth.jwt_secret)?;
    if state.storage.get_user(&claims.sub).await?.is_none() {
        return Err(AppError::unauthorized("Invalid or expired token"));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims.sub)))
}

struct Session {
    state: AppState,
    user_id: String,
    connection_id: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let connection_id = match crypto::generate_connection_id() {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to allocate connection id: {:?}", e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending events to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Forward events from the channel to the socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("Failed to serialize event: {}", e),
            }
        }
    });

    if let Err(e) = state.presence.set_online(&user_id, &connection_id, tx.clone()).await {
        tracing::error!("Failed to mark user {} online: {}", user_id, e);
    }

    let session = Session {
        state: state.clone(),
        user_id,
        connection_id,
        tx,
    };

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => session.handle_frame(&text).await,
            Ok(Message::Binary(_)) => {
                session.send_error("Binary frames are not supported", None);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Handled by the WebSocket library
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error on {}: {}", session.connection_id, e);
                break;
            }
        }
    }

    // Cleanup
    if let Err(e) = state.presence.set_offline(&session.connection_id).await {
        tracing::error!("Failed to mark connection {} offline: {}", session.connection_id, e);
    }

    send_task.abort();
}

impl Session {
    fn send(&self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("Connection {} is closed", self.connection_id);
        }
    }

    fn send_error(&self, message: &str, event: Option<&str>) {
        self.send(ServerEvent::Error(ErrorPayload {
            message: message.to_string(),
            event: event.map(str::to_string),
        }));
    }

    async fn handle_frame(&self, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                let name = serde_json::from_str::<serde_json::Value>(text)
                    .ok()
                    .and_then(|v| v.get("event").and_then(|e| e.as_str()).map(str::to_string));
                tracing::warn!("Malformed event from {}: {}", self.connection_id, e);
                self.send_error("Invalid event or payload", name.as_deref());
                return;
            }
        };

        let name = event.name();
        if let Err(e) = self.dispatch(event).await {
            tracing::warn!("Event {} from user {} failed: {}", name, self.user_id, e);
            self.send_error(&e.public_message(), Some(name));
        }
    }

    async fn dispatch(&self, event: ClientEvent) -> Result<()> {
        let state = &self.state;
        let presence = &state.presence;

        match event {
            ClientEvent::JoinChat(ChatRef { chat_id }) => {
                state.chats.ensure_participant(&chat_id, &self.user_id).await?;
                presence.join_room(&chat_id, &self.connection_id);
                presence.broadcast_to_room(
                    &chat_id,
                    ServerEvent::UserJoined(self.member(&chat_id)),
                    Some(&self.connection_id),
                );
                tracing::info!("User {} joined chat {}", self.user_id, chat_id);
            }

            ClientEvent::LeaveChat(ChatRef { chat_id }) => {
                presence.leave_room(&chat_id, &self.connection_id);
                presence.broadcast_to_room(&chat_id, ServerEvent::UserLeft(self.member(&chat_id)), None);
                tracing::info!("User {} left chat {}", self.user_id, chat_id);
            }

            ClientEvent::SendMessage(req) => {
                let view = state.messages.send_message(&self.user_id, req).await?;
                let chat_id = view.chat_id.clone();
                let joined = presence.room_members(&chat_id).contains(&self.connection_id);

                presence.broadcast_to_room(&chat_id, ServerEvent::MessageNew(view.clone()), None);
                if !joined {
                    self.send(ServerEvent::MessageNew(view));
                }
            }

            ClientEvent::MessageRead(ReceiptPayload { message_id, .. }) => {
                let receipt = state.messages.mark_as_read(&message_id, &self.user_id).await?;
                let chat_id = receipt.chat_id.clone();
                presence.broadcast_to_room(&chat_id, ServerEvent::MessageRead(receipt), Some(&self.connection_id));
            }

            ClientEvent::MessageDelivered(ReceiptPayload { message_id, .. }) => {
                let receipt = state.messages.mark_as_delivered(&message_id, &self.user_id).await?;
                let chat_id = receipt.chat_id.clone();
                presence.broadcast_to_room(
                    &chat_id,
                    ServerEvent::MessageDelivered(receipt),
                    Some(&self.connection_id),
                );
            }

            ClientEvent::EditMessage(EditPayload { message_id, content, .. }) => {
                let view = state.messages.edit_message(&message_id, &self.user_id, &content).await?;
                let chat_id = view.chat_id.clone();
                presence.broadcast_to_room(&chat_id, ServerEvent::MessageEdited(view), None);
            }

            ClientEvent::DeleteMessage(DeletePayload {
                message_id,
                delete_for_everyone,
                ..
            }) => {
                let deleted = state
                    .messages
                    .delete_message(&message_id, &self.user_id, delete_for_everyone)
                    .await?;
                if delete_for_everyone {
                    let chat_id = deleted.chat_id.clone();
                    presence.broadcast_to_room(&chat_id, ServerEvent::MessageDeleted(deleted), None);
                } else {
                    presence.send_to_user(&self.user_id, ServerEvent::MessageDeleted(deleted));
                }
            }

            ClientEvent::TypingStart(ChatRef { chat_id }) => {
                presence.broadcast_to_room(
                    &chat_id,
                    ServerEvent::TypingStart(self.member(&chat_id)),
                    Some(&self.connection_id),
                );
            }

            ClientEvent::TypingStop(ChatRef { chat_id }) => {
                presence.broadcast_to_room(
                    &chat_id,
                    ServerEvent::TypingStop(self.member(&chat_id)),
                    Some(&self.connection_id),
                );
            }

            ClientEvent::StatusUpdate(StatusPayload { status }) => {
                let at = state.users.update_status(&self.user_id, status).await?;
                presence.broadcast_all(ServerEvent::StatusChanged(PresencePayload {
                    user_id: self.user_id.clone(),
                    status,
                    timestamp: Some(at),
                    last_seen: None,
                }));
                tracing::info!("User {} set status {}", self.user_id, status.as_str());
            }

            ClientEvent::OnlineUsers => {
                self.send(presence.online_users_event());
            }

            ClientEvent::NotificationRead(NotificationRef { notification_id }) => {
                state.notifications.mark_as_read(&notification_id, &self.user_id).await?;
                presence.send_to_user(
                    &self.user_id,
                    ServerEvent::NotificationRead(NotificationReadPayload {
                        notification_id: Some(notification_id),
                    }),
                );
            }

            ClientEvent::NotificationReadAll => {
                state.notifications.mark_all_as_read(&self.user_id).await?;
                presence.send_to_user(
                    &self.user_id,
                    ServerEvent::NotificationRead(NotificationReadPayload { notification_id: None }),
                );
            }

            ClientEvent::Ping => self.send(ServerEvent::Pong),
        }

        Ok(())
    }

    fn member(&self, chat_id: &str) -> ChatMemberPayload {
        ChatMemberPayload {
            user_id: self.user_id.clone(),
            chat_id: chat_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    struct Harness {
        state: AppState,
        alice: Session,
        alice_rx: mpsc::UnboundedReceiver<ServerEvent>,
        bob: Session,
        bob_rx: mpsc::UnboundedReceiver<ServerEvent>,
        chat_id: String,
    }

    async fn session(state: &AppState, user_id: &str, connection_id: &str) -> (Session, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        state.presence.set_online(user_id, connection_id, tx.clone()).await.unwrap();
        let session = Session {
            state: state.clone(),
            user_id: user_id.to_string(),
            connection_id: connection_id.to_string(),
            tx,
        };
        (session, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn harness() -> Harness {
        let state = testing::state().await;
        let alice = testing::user(&state, "Alice").await;
        let bob = testing::user(&state, "Bob").await;
        let chat = state.chats.create_or_get_private_chat(&alice.id, &bob.id).await.unwrap();

        let (alice_session, mut alice_rx) = session(&state, &alice.id, "conn-alice").await;
        let (bob_session, mut bob_rx) = session(&state, &bob.id, "conn-bob").await;

        let join = format!(r#"{{"event":"chat:join","data":{{"chatId":"{}"}}}}"#, chat.id);
        alice_session.handle_frame(&join).await;
        bob_session.handle_frame(&join).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        Harness {
            state,
            alice: alice_session,
            alice_rx,
            bob: bob_session,
            bob_rx,
            chat_id: chat.id,
        }
    }

    async fn send_text(h: &Harness, content: &str) -> MessageView {
        h.state
            .messages
            .send_message(
                &h.alice.user_id,
                SendMessageRequest {
                    chat_id: h.chat_id.clone(),
                    message_type: MessageType::Text,
                    content: Some(content.to_string()),
                    media: None,
                    reply_to: None,
                },
            )
            .await
            .unwrap()
    }

    async fn notify(h: &Harness, recipient_id: &str) -> NotificationView {
        h.state
            .notifications
            .create(NewNotification {
                recipient_id: recipient_id.to_string(),
                sender_id: None,
                notification_type: NotificationType::FriendRequest,
                title: "Friend request".to_string(),
                message: "Someone sent you a friend request".to_string(),
                link: None,
                related_chat: None,
                related_message: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_broadcasts_to_room() {
        let mut h = harness().await;

        let frame = format!(
            r#"{{"event":"message:send","data":{{"chatId":"{}","type":"text","content":"hi"}}}}"#,
            h.chat_id
        );
        h.alice.handle_frame(&frame).await;

        for rx in [&mut h.alice_rx, &mut h.bob_rx] {
            let events = drain(rx);
            assert!(matches!(
                events.as_slice(),
                [ServerEvent::MessageNew(m)] if m.content.as_deref() == Some("hi")
            ));
        }
    }

    #[tokio::test]
    async fn test_typing_excludes_sender() {
        let mut h = harness().await;

        let frame = format!(r#"{{"event":"typing:start","data":{{"chatId":"{}"}}}}"#, h.chat_id);
        h.alice.handle_frame(&frame).await;

        assert!(drain(&mut h.alice_rx).is_empty());
        let events = drain(&mut h.bob_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::TypingStart(p)] if p.user_id == h.alice.user_id
        ));
    }

    #[tokio::test]
    async fn test_failures_reach_only_the_sender() {
        let mut h = harness().await;
        let outsider = testing::user(&h.state, "Mallory").await;
        let (mallory, mut mallory_rx) = session(&h.state, &outsider.id, "conn-mallory").await;
        drain(&mut h.alice_rx);
        drain(&mut h.bob_rx);
        drain(&mut mallory_rx);

        let frame = format!(
            r#"{{"event":"message:send","data":{{"chatId":"{}","type":"text","content":"spam"}}}}"#,
            h.chat_id
        );
        mallory.handle_frame(&frame).await;

        let events = drain(&mut mallory_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::Error(e)] if e.event.as_deref() == Some("message:send")
        ));
        assert!(drain(&mut h.alice_rx).is_empty());
        assert!(drain(&mut h.bob_rx).is_empty());

        // Malformed frames are reported the same way
        mallory.handle_frame(r#"{"event":"chat:join","data":{}}"#).await;
        mallory.handle_frame("not json").await;
        let events = drain(&mut mallory_rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServerEvent::Error(e) if e.event.as_deref() == Some("chat:join")));
        assert!(matches!(&events[1], ServerEvent::Error(e) if e.event.is_none()));
    }

    #[tokio::test]
    async fn test_read_receipt_relay() {
        let mut h = harness().await;
        let sent = h
            .state
            .messages
            .send_message(
                &h.alice.user_id,
                SendMessageRequest {
                    chat_id: h.chat_id.clone(),
                    message_type: MessageType::Text,
                    content: Some("hello".to_string()),
                    media: None,
                    reply_to: None,
                },
            )
            .await
            .unwrap();

        let frame = format!(
            r#"{{"event":"message:read","data":{{"messageId":"{}","chatId":"{}"}}}}"#,
            sent.id, h.chat_id
        );
        h.bob.handle_frame(&frame).await;

        assert!(drain(&mut h.bob_rx).is_empty());
        let events = drain(&mut h.alice_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::MessageRead(r)] if r.user_id == h.bob.user_id && r.message_id == sent.id
        ));
    }

    #[tokio::test]
    async fn test_ping_and_online_users() {
        let mut h = harness().await;

        h.alice.handle_frame(r#"{"event":"ping"}"#).await;
        h.alice.handle_frame(r#"{"event":"users:online"}"#).await;

        let events = drain(&mut h.alice_rx);
        assert!(matches!(events[0], ServerEvent::Pong));
        match &events[1] {
            ServerEvent::OnlineUsers(p) => {
                assert_eq!(p.user_ids.len(), 2);
                assert!(p.user_ids.contains(&h.bob.user_id));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_edit_broadcasts_to_room() {
        let mut h = harness().await;
        let sent = send_text(&h, "helo").await;
        drain(&mut h.alice_rx);
        drain(&mut h.bob_rx);

        let frame = format!(
            r#"{{"event":"message:edit","data":{{"messageId":"{}","chatId":"{}","content":"hello"}}}}"#,
            sent.id, h.chat_id
        );
        h.alice.handle_frame(&frame).await;

        for rx in [&mut h.alice_rx, &mut h.bob_rx] {
            let events = drain(rx);
            assert!(matches!(
                events.as_slice(),
                [ServerEvent::MessageEdited(m)] if m.id == sent.id && m.content.as_deref() == Some("hello")
            ));
        }
    }

    #[tokio::test]
    async fn test_delete_for_everyone_reaches_room() {
        let mut h = harness().await;
        let sent = send_text(&h, "oops").await;
        drain(&mut h.alice_rx);
        drain(&mut h.bob_rx);

        let frame = format!(
            r#"{{"event":"message:delete","data":{{"messageId":"{}","chatId":"{}","deleteForEveryone":true}}}}"#,
            sent.id, h.chat_id
        );
        h.alice.handle_frame(&frame).await;

        for rx in [&mut h.alice_rx, &mut h.bob_rx] {
            let events = drain(rx);
            assert!(matches!(
                events.as_slice(),
                [ServerEvent::MessageDeleted(d)] if d.message_id == sent.id && d.delete_for_everyone
            ));
        }
    }

    #[tokio::test]
    async fn test_delete_for_me_reaches_only_caller() {
        let mut h = harness().await;
        let sent = send_text(&h, "private thought").await;
        drain(&mut h.alice_rx);
        drain(&mut h.bob_rx);

        let frame = format!(
            r#"{{"event":"message:delete","data":{{"messageId":"{}","chatId":"{}","deleteForEveryone":false}}}}"#,
            sent.id, h.chat_id
        );
        h.bob.handle_frame(&frame).await;

        let events = drain(&mut h.bob_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::MessageDeleted(d)] if d.deleted_by == h.bob.user_id && !d.delete_for_everyone
        ));
        assert!(drain(&mut h.alice_rx).is_empty());

        // Alice keeps her copy
        let message = h.state.storage.get_message(&sent.id).await.unwrap().unwrap();
        assert!(!message.is_deleted);
    }

    #[tokio::test]
    async fn test_status_update_reaches_everyone() {
        let mut h = harness().await;

        h.bob.handle_frame(r#"{"event":"status:update","data":{"status":"busy"}}"#).await;

        for rx in [&mut h.alice_rx, &mut h.bob_rx] {
            let events = drain(rx);
            assert!(matches!(
                events.as_slice(),
                [ServerEvent::StatusChanged(p)] if p.user_id == h.bob.user_id && p.status == UserStatus::Busy
            ));
        }

        let bob = h.state.storage.get_user(&h.bob.user_id).await.unwrap().unwrap();
        assert_eq!(bob.status, UserStatus::Busy);
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_members() {
        let mut h = harness().await;

        let frame = format!(r#"{{"event":"chat:leave","data":{{"chatId":"{}"}}}}"#, h.chat_id);
        h.bob.handle_frame(&frame).await;

        let events = drain(&mut h.alice_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::UserLeft(p)] if p.user_id == h.bob.user_id && p.chat_id == h.chat_id
        ));
        assert!(drain(&mut h.bob_rx).is_empty());
        assert_eq!(h.state.presence.room_members(&h.chat_id), vec!["conn-alice".to_string()]);

        // Bob no longer hears typing in the room
        let frame = format!(r#"{{"event":"typing:start","data":{{"chatId":"{}"}}}}"#, h.chat_id);
        h.alice.handle_frame(&frame).await;
        assert!(drain(&mut h.bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_notification_read_and_read_all() {
        let mut h = harness().await;
        let first = notify(&h, &h.bob.user_id).await;
        let second = notify(&h, &h.bob.user_id).await;
        drain(&mut h.bob_rx);

        let frame = format!(
            r#"{{"event":"notification:read","data":{{"notificationId":"{}"}}}}"#,
            first.notification.id
        );
        h.bob.handle_frame(&frame).await;

        let events = drain(&mut h.bob_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::NotificationRead(p)] if p.notification_id.as_deref() == Some(first.notification.id.as_str())
        ));
        let stored = h.state.storage.get_notification(&first.notification.id).await.unwrap().unwrap();
        assert!(stored.is_read);
        let stored = h.state.storage.get_notification(&second.notification.id).await.unwrap().unwrap();
        assert!(!stored.is_read);

        h.bob.handle_frame(r#"{"event":"notification:read_all"}"#).await;

        let events = drain(&mut h.bob_rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::NotificationRead(p)] if p.notification_id.is_none()
        ));
        assert_eq!(h.state.storage.count_unread_notifications(&h.bob.user_id).await.unwrap(), 0);
        assert!(drain(&mut h.alice_rx).is_empty());
    }
}
