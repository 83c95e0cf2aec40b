//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::presence::PresenceRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use studycircle_core::ports::DatabaseService;
use tokio::sync::Mutex;
use uuid::Uuid;

/// The shared application state, created once at startup and passed to all
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub presence: Arc<PresenceRegistry>,
    pub user_locks: Arc<UserLocks>,
}

/// Hands out one mutex per user id so same-user ledger writes serialize
/// instead of racing under last-write-wins persistence.
///
/// Entries live for the process lifetime; the map is bounded by the number of
/// distinct users seen since startup.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding writes for `user_id`, creating it on first
    /// use.
    pub async fn for_user(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
