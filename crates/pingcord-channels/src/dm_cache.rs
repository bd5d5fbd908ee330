//! DM channel cache — user id → resolved direct-message channel.
//!
//! Each key is written at most once per run. Concurrent lookups for the same
//! uncached user share one resolution: the first caller runs the resolver,
//! the rest wait for its result. Entries never expire.
//!
//! A resolution that returns no channel id is cached as `Unresolved`, so a
//! user who cannot be messaged costs one API call per run, not one per message.
//! A resolver *error* (transport failure) is not cached and the next caller
//! tries again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::error::SendError;

/// Outcome of resolving a user's DM channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DmChannel {
    Resolved(String),
    /// The platform answered without a channel id.
    Unresolved,
}

impl DmChannel {
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            DmChannel::Resolved(id) => Some(id),
            DmChannel::Unresolved => None,
        }
    }
}

/// Write-once-per-key cache of DM channels, owned by one client instance.
#[derive(Debug, Default)]
pub struct DmChannelCache {
    slots: Mutex<HashMap<String, Arc<OnceCell<DmChannel>>>>,
}

impl DmChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached channel for `user_id`, running `resolve` on a miss.
    ///
    /// `resolve` runs at most once per key unless it fails with an error.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        user_id: &str,
        resolve: F,
    ) -> Result<Option<String>, SendError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>, SendError>>,
    {
        let cell = {
            let mut slots = self.slots.lock().await;
            slots.entry(user_id.to_string()).or_default().clone()
        };

        let slot = cell
            .get_or_try_init(move || async move {
                let resolved = match resolve().await? {
                    Some(id) => {
                        debug!(user_id, channel_id = %id, "cached dm channel");
                        DmChannel::Resolved(id)
                    }
                    None => {
                        warn!(user_id, "dm channel could not be resolved, skipping user for this run");
                        DmChannel::Unresolved
                    }
                };
                Ok::<_, SendError>(resolved)
            })
            .await?;

        Ok(slot.channel_id().map(String::from))
    }

    /// Cached entry for `user_id`, without resolving.
    pub async fn get(&self, user_id: &str) -> Option<DmChannel> {
        let slots = self.slots.lock().await;
        slots.get(user_id).and_then(|cell| cell.get().cloned())
    }

    /// Number of users with a settled entry.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
