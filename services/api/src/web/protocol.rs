//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the
//! API server for the live presence channel.

use crate::presence::PresenceEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The user began a live study activity. Broadcast-only; nothing is
    /// persisted until the session is stopped through the REST path.
    StartStudying { subject: Option<String> },

    /// The user finished the live activity. The server replies with the
    /// elapsed duration and notifies friends.
    StopStudying,

    /// Asks which of the user's friends currently hold a live connection.
    OnlineFriends,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the presence channel is registered.
    Connected { user_id: Uuid },

    /// A friend's connection came online.
    FriendOnline { user_id: Uuid },

    /// A friend's connection went away.
    FriendOffline { user_id: Uuid },

    /// A friend began a live study activity.
    FriendStartedStudying {
        user_id: Uuid,
        subject: String,
        started_at: DateTime<Utc>,
    },

    /// A friend finished a live study activity.
    FriendStoppedStudying { user_id: Uuid, duration_ms: i64 },

    /// Reply to `StopStudying` with the elapsed time; `duration_ms` is absent
    /// when no activity was in progress.
    StoppedStudying { duration_ms: Option<i64> },

    /// Reply to `OnlineFriends`.
    OnlineFriends { user_ids: Vec<Uuid> },

    /// Reports a fatal error to the client, which should display a message.
    Error { message: String },
}

impl From<PresenceEvent> for ServerMessage {
    fn from(event: PresenceEvent) -> Self {
        match event {
            PresenceEvent::FriendOnline { user_id } => ServerMessage::FriendOnline { user_id },
            PresenceEvent::FriendOffline { user_id } => ServerMessage::FriendOffline { user_id },
            PresenceEvent::FriendStartedStudying {
                user_id,
                subject,
                started_at,
            } => ServerMessage::FriendStartedStudying {
                user_id,
                subject,
                started_at,
            },
            PresenceEvent::FriendStoppedStudying {
                user_id,
                duration_ms,
            } => ServerMessage::FriendStoppedStudying {
                user_id,
                duration_ms,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_decode_from_tagged_json() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"start_studying","subject":"Physics"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::StartStudying { subject: Some(s) } if s == "Physics"
        ));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"stop_studying"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StopStudying));
    }

    #[test]
    fn server_messages_encode_with_snake_case_tags() {
        let user_id = Uuid::new_v4();
        let json = serde_json::to_string(&ServerMessage::FriendOnline { user_id }).unwrap();
        assert!(json.contains(r#""type":"friend_online""#));
        assert!(json.contains(&user_id.to_string()));
    }
}
