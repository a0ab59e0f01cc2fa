//! Presence registry and broadcast groups
//!
//! Tracks every live socket by connection id, the set of connections each
//! user holds, and the chat groups each connection has joined. All pushes to
//! clients go through here.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;
use crate::models::{OnlineUsersPayload, PresencePayload, ServerEvent, UserStatus};
use crate::storage::Storage;

/// Represents an active socket connection
#[derive(Clone)]
pub struct Connection {
    pub connection_id: String,
    pub user_id: String,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

pub struct PresenceRegistry {
    storage: Arc<Storage>,
    /// connection_id -> Connection
    connections: DashMap<String, Connection>,
    /// user_id -> connection ids, oldest first
    user_connections: DashMap<String, Vec<String>>,
    /// chat_id -> joined connection ids
    rooms: DashMap<String, HashSet<String>>,
    /// Serializes online/offline transitions with their persisted status
    transitions: Mutex<()>,
}

impl PresenceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            connections: DashMap::new(),
            user_connections: DashMap::new(),
            rooms: DashMap::new(),
            transitions: Mutex::new(()),
        }
    }

    /// Register a connection for a user, persist the online status and
    /// announce it to every connected client.
    pub async fn set_online(
        &self,
        user_id: &str,
        connection_id: &str,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<()> {
        let _transition = self.transitions.lock().await;
        let first = self.register(user_id, connection_id, sender);

        self.storage.set_user_status(user_id, UserStatus::Online).await?;

        if first {
            self.broadcast_all(ServerEvent::UserOnline(PresencePayload {
                user_id: user_id.to_string(),
                status: UserStatus::Online,
                timestamp: Some(Utc::now()),
                last_seen: None,
            }));
            tracing::info!("User {} is now online", user_id);
        }

        Ok(())
    }

    /// Drop a connection. When it was the user's last one the user goes
    /// offline: status and last-seen are persisted and `user:offline` is
    /// broadcast.
    pub async fn set_offline(&self, connection_id: &str) -> Result<()> {
        let _transition = self.transitions.lock().await;
        let Some((user_id, last)) = self.unregister(connection_id) else {
            return Ok(());
        };

        if last {
            let last_seen = self.storage.set_user_status(&user_id, UserStatus::Offline).await?;

            self.broadcast_all(ServerEvent::UserOffline(PresencePayload {
                user_id: user_id.clone(),
                status: UserStatus::Offline,
                timestamp: None,
                last_seen: Some(last_seen),
            }));
            tracing::info!("User {} is now offline", user_id);
        }

        Ok(())
    }

    /// Returns true when this is the user's first live connection
    pub fn register(&self, user_id: &str, connection_id: &str, sender: mpsc::UnboundedSender<ServerEvent>) -> bool {
        self.connections.insert(
            connection_id.to_string(),
            Connection {
                connection_id: connection_id.to_string(),
                user_id: user_id.to_string(),
                sender,
            },
        );

        let mut ids = self.user_connections.entry(user_id.to_string()).or_default();
        ids.push(connection_id.to_string());
        let first = ids.len() == 1;
        drop(ids);

        tracing::info!("Connection registered: user={}, connection={}", user_id, connection_id);
        first
    }

    /// Remove a connection from the registry and from every room.
    /// Returns the owning user and whether it was their last connection.
    pub fn unregister(&self, connection_id: &str) -> Option<(String, bool)> {
        let (_, connection) = self.connections.remove(connection_id)?;
        let user_id = connection.user_id;

        for mut room in self.rooms.iter_mut() {
            room.remove(connection_id);
        }
        self.rooms.retain(|_, members| !members.is_empty());

        if let Some(mut ids) = self.user_connections.get_mut(&user_id) {
            ids.retain(|id| id != connection_id);
        }
        // A concurrent register may have refilled the list
        self.user_connections.remove_if(&user_id, |_, ids| ids.is_empty());
        let last = !self.is_online(&user_id);

        tracing::info!("Connection unregistered: user={}, connection={}", user_id, connection_id);
        Some((user_id, last))
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.user_connections
            .get(user_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    /// The user's most recent connection
    pub fn resolve(&self, user_id: &str) -> Option<String> {
        self.user_connections
            .get(user_id)
            .and_then(|ids| ids.last().cloned())
    }

    /// Every live connection of the user, oldest first
    pub fn resolve_all(&self, user_id: &str) -> Vec<String> {
        self.user_connections
            .get(user_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default()
    }

    pub fn online_users(&self) -> Vec<String> {
        self.user_connections.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn online_users_event(&self) -> ServerEvent {
        let mut user_ids = self.online_users();
        user_ids.sort();
        ServerEvent::OnlineUsers(OnlineUsersPayload { user_ids })
    }

    // ========================================================================
    // Chat groups
    // ========================================================================

    pub fn join_room(&self, chat_id: &str, connection_id: &str) {
        self.rooms
            .entry(chat_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    pub fn leave_room(&self, chat_id: &str, connection_id: &str) {
        let empty = match self.rooms.get_mut(chat_id) {
            Some(mut members) => {
                members.remove(connection_id);
                members.is_empty()
            }
            None => false,
        };
        if empty {
            self.rooms.remove_if(chat_id, |_, members| members.is_empty());
        }
    }

    pub fn room_members(&self, chat_id: &str) -> Vec<String> {
        self.rooms
            .get(chat_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Send an event to a single connection
    pub fn send_to_connection(&self, connection_id: &str, event: ServerEvent) {
        let sender = self.connections.get(connection_id).map(|c| c.sender.clone());
        if let Some(sender) = sender {
            if let Err(e) = sender.send(event) {
                tracing::warn!("Failed to send to connection {}: {}", connection_id, e);
            }
        }
    }

    /// Send an event to every connection of a user
    pub fn send_to_user(&self, user_id: &str, event: ServerEvent) {
        for connection_id in self.resolve_all(user_id) {
            self.send_to_connection(&connection_id, event.clone());
        }
    }

    /// Send an event to every connection joined to a chat, optionally
    /// skipping the originating connection
    pub fn broadcast_to_room(&self, chat_id: &str, event: ServerEvent, exclude_connection: Option<&str>) {
        for connection_id in self.room_members(chat_id) {
            if Some(connection_id.as_str()) == exclude_connection {
                continue;
            }
            self.send_to_connection(&connection_id, event.clone());
        }
    }

    /// Send an event to every live connection
    pub fn broadcast_all(&self, event: ServerEvent) {
        let senders: Vec<(String, mpsc::UnboundedSender<ServerEvent>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.sender.clone()))
            .collect();

        for (connection_id, sender) in senders {
            if let Err(e) = sender.send(event.clone()) {
                tracing::warn!("Failed to send to connection {}: {}", connection_id, e);
            }
        }
    }
}
