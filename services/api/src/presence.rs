//! services/api/src/presence.rs
//!
//! The presence and activity fan-out registry. Tracks which users currently
//! hold a live WebSocket connection and relays study-activity transitions to
//! each user's declared friend set.
//!
//! All state here is process-local and memory-only: it is created when the
//! server starts, rebuilt as clients reconnect, and never persisted.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// An event delivered to a connected user about one of their friends.
///
/// Events for a single originating user arrive in the order that user issued
/// them, because publication happens synchronously inside the registry call.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    FriendOnline {
        user_id: Uuid,
    },
    FriendOffline {
        user_id: Uuid,
    },
    FriendStartedStudying {
        user_id: Uuid,
        subject: String,
        started_at: DateTime<Utc>,
    },
    FriendStoppedStudying {
        user_id: Uuid,
        duration_ms: i64,
    },
}

/// A transient "currently studying" marker. Separate from the persisted
/// session records: it exists only for broadcast and dies with the entry.
#[derive(Debug, Clone)]
pub struct LiveActivity {
    pub subject: String,
    pub started_at: DateTime<Utc>,
}

struct PresenceEntry {
    sender: mpsc::UnboundedSender<PresenceEvent>,
    friends: HashSet<Uuid>,
    live: Option<LiveActivity>,
}

/// The process-owned registry of connected users.
///
/// Injected into the web layer through `AppState`; its lifecycle is bound to
/// server start/stop, not to module load.
#[derive(Default)]
pub struct PresenceRegistry {
    entries: RwLock<HashMap<Uuid, PresenceEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for `user_id` and announces it to every
    /// currently-connected friend. Returns the receiving half of the user's
    /// private event channel.
    ///
    /// Reconnects are last-writer-wins: a prior entry for the same user is
    /// replaced and its channel dropped.
    pub async fn connect(
        &self,
        user_id: Uuid,
        friend_ids: Vec<Uuid>,
    ) -> mpsc::UnboundedReceiver<PresenceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let friends: HashSet<Uuid> = friend_ids.into_iter().collect();

        let mut entries = self.entries.write().await;
        publish(&entries, &friends, PresenceEvent::FriendOnline { user_id });
        entries.insert(
            user_id,
            PresenceEntry {
                sender: tx,
                friends,
                live: None,
            },
        );
        debug!(%user_id, online = entries.len(), "user connected");
        rx
    }

    /// Removes the user's entry and announces the departure to friends.
    pub async fn disconnect(&self, user_id: Uuid) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.remove(&user_id) {
            publish(
                &entries,
                &entry.friends,
                PresenceEvent::FriendOffline { user_id },
            );
            debug!(%user_id, online = entries.len(), "user disconnected");
        }
    }

    /// Records a live "currently studying" marker and tells the user's
    /// friends. No persisted data is touched.
    pub async fn start_activity(&self, user_id: Uuid, subject: String, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&user_id) else {
            return;
        };
        entry.live = Some(LiveActivity {
            subject: subject.clone(),
            started_at: now,
        });
        let friends = entry.friends.clone();
        publish(
            &entries,
            &friends,
            PresenceEvent::FriendStartedStudying {
                user_id,
                subject,
                started_at: now,
            },
        );
    }

    /// Clears the live marker, tells the user's friends, and returns the
    /// elapsed duration in milliseconds. No-op returning `None` if the user
    /// has no marker.
    pub async fn stop_activity(&self, user_id: Uuid, now: DateTime<Utc>) -> Option<i64> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&user_id)?;
        let live = entry.live.take()?;
        let duration_ms = (now - live.started_at).num_milliseconds().max(0);
        let friends = entry.friends.clone();
        publish(
            &entries,
            &friends,
            PresenceEvent::FriendStoppedStudying {
                user_id,
                duration_ms,
            },
        );
        Some(duration_ms)
    }

    /// Returns the subset of `candidate_ids` currently connected. Pure read.
    pub async fn online_friends(&self, candidate_ids: &[Uuid]) -> Vec<Uuid> {
        let entries = self.entries.read().await;
        candidate_ids
            .iter()
            .copied()
            .filter(|id| entries.contains_key(id))
            .collect()
    }
}

/// Sends `event` to every listed friend that currently holds an entry.
/// A closed channel (receiver mid-teardown) is ignored.
fn publish(entries: &HashMap<Uuid, PresenceEntry>, friends: &HashSet<Uuid>, event: PresenceEvent) {
    for friend_id in friends {
        if let Some(friend) = entries.get(friend_id) {
            let _ = friend.sender.send(event.clone());
        }
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn connect_announces_to_connected_friends_only() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();

        let mut bob_rx = registry.connect(bob, vec![alice]).await;
        let mut carol_rx = registry.connect(carol, vec![]).await;

        // Alice is friends with Bob but not Carol.
        let _alice_rx = registry.connect(alice, vec![bob]).await;

        assert_eq!(
            bob_rx.try_recv().unwrap(),
            PresenceEvent::FriendOnline { user_id: alice }
        );
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn activity_events_carry_subject_and_duration() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut bob_rx = registry.connect(bob, vec![alice]).await;
        let _alice_rx = registry.connect(alice, vec![bob]).await;
        bob_rx.try_recv().unwrap(); // drain the online event

        let started = now();
        registry
            .start_activity(alice, "Linear Algebra".to_string(), started)
            .await;
        let elapsed = registry
            .stop_activity(alice, started + Duration::minutes(25))
            .await;

        assert_eq!(elapsed, Some(25 * 60_000));
        assert_eq!(
            bob_rx.try_recv().unwrap(),
            PresenceEvent::FriendStartedStudying {
                user_id: alice,
                subject: "Linear Algebra".to_string(),
                started_at: started,
            }
        );
        assert_eq!(
            bob_rx.try_recv().unwrap(),
            PresenceEvent::FriendStoppedStudying {
                user_id: alice,
                duration_ms: 25 * 60_000,
            }
        );
    }

    #[tokio::test]
    async fn stop_without_marker_is_a_noop() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut bob_rx = registry.connect(bob, vec![alice]).await;
        let _alice_rx = registry.connect(alice, vec![bob]).await;
        bob_rx.try_recv().unwrap();

        assert_eq!(registry.stop_activity(alice, now()).await, None);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn online_friends_returns_the_connected_subset() {
        let registry = PresenceRegistry::new();
        let user = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let _user_rx = registry.connect(user, vec![a, b, c]).await;
        let _b_rx = registry.connect(b, vec![user]).await;

        let online = registry.online_friends(&[a, b, c]).await;
        assert_eq!(online, vec![b]);
    }

    #[tokio::test]
    async fn reconnect_replaces_the_previous_entry() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut bob_rx = registry.connect(bob, vec![alice]).await;
        let _stale_rx = registry.connect(alice, vec![bob]).await;
        let _fresh_rx = registry.connect(alice, vec![bob]).await;
        while bob_rx.try_recv().is_ok() {}

        // The replacement dropped the stale marker, so a stop is a no-op.
        assert_eq!(registry.stop_activity(alice, now()).await, None);
        assert_eq!(registry.online_friends(&[alice]).await, vec![alice]);
    }

    #[tokio::test]
    async fn disconnect_announces_offline_and_clears_the_entry() {
        let registry = PresenceRegistry::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut bob_rx = registry.connect(bob, vec![alice]).await;
        let _alice_rx = registry.connect(alice, vec![bob]).await;
        bob_rx.try_recv().unwrap();

        registry.disconnect(alice).await;
        assert_eq!(
            bob_rx.try_recv().unwrap(),
            PresenceEvent::FriendOffline { user_id: alice }
        );
        assert!(registry.online_friends(&[alice]).await.is_empty());

        // A second disconnect publishes nothing.
        registry.disconnect(alice).await;
        assert!(bob_rx.try_recv().is_err());
    }
}
