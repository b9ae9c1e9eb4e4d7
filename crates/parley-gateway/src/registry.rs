use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::events::ChannelEvent;

/// A live connection handle. Events queued here are drained by the owning
/// connection's send task; a closed receiver marks the subscriber as dead.
struct Subscriber {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

/// Process-local registry of live conversation channels:
/// conversation id -> user id -> connection handle.
///
/// Purely ephemeral — rebuilt from nothing on restart and never consulted for
/// authorization (membership is always re-checked against storage).
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RwLock<HashMap<Uuid, HashMap<i64, Subscriber>>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a connection on a channel. A prior handle for the same
    /// (channel, user) is silently replaced — last connect wins.
    /// Returns the connection id and the receiving end of the handle.
    pub async fn join(
        &self,
        channel: Uuid,
        user_id: i64,
    ) -> (Uuid, mpsc::UnboundedReceiver<ChannelEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .write()
            .await
            .entry(channel)
            .or_default()
            .insert(user_id, Subscriber { conn_id, tx });
        info!("user {} joined channel {}", user_id, channel);
        (conn_id, rx)
    }

    /// Remove a connection, but only if `conn_id` still owns the slot — a
    /// newer connection for the same user keeps it. Empty channels are
    /// dropped so the map never leaks entries.
    pub async fn leave(&self, channel: Uuid, user_id: i64, conn_id: Uuid) {
        let mut channels = self.inner.write().await;
        let Some(users) = channels.get_mut(&channel) else {
            return;
        };
        let is_current = users.get(&user_id).map_or(false, |s| s.conn_id == conn_id);
        if is_current {
            users.remove(&user_id);
            info!("user {} left channel {}", user_id, channel);
        }
        if users.is_empty() {
            channels.remove(&channel);
        }
    }

    /// Best-effort targeted send; no-op if the user has no live handle.
    pub async fn send_to_user(&self, channel: Uuid, user_id: i64, event: ChannelEvent) {
        let channels = self.inner.read().await;
        if let Some(sub) = channels.get(&channel).and_then(|users| users.get(&user_id)) {
            let _ = sub.tx.send(event);
        }
    }

    /// Deliver an event to every live handle on the channel, except
    /// `exclude_user` if given. Delivery failures mark that one subscriber
    /// dead and evict it; the rest of the fan-out is unaffected.
    pub async fn broadcast(&self, channel: Uuid, event: ChannelEvent, exclude_user: Option<i64>) {
        // Snapshot under the read lock; sends happen lock-free so a slow or
        // dead subscriber cannot stall joins and leaves.
        let snapshot: Vec<(i64, Uuid, mpsc::UnboundedSender<ChannelEvent>)> = {
            let channels = self.inner.read().await;
            match channels.get(&channel) {
                Some(users) => users
                    .iter()
                    .map(|(uid, sub)| (*uid, sub.conn_id, sub.tx.clone()))
                    .collect(),
                None => return,
            }
        };

        let mut dead = Vec::new();
        for (user_id, conn_id, tx) in snapshot {
            if exclude_user == Some(user_id) {
                continue;
            }
            if tx.send(event.clone()).is_err() {
                dead.push((user_id, conn_id));
            }
        }

        for (user_id, conn_id) in dead {
            warn!("dropping dead subscriber {} on channel {}", user_id, channel);
            self.leave(channel, user_id, conn_id).await;
        }
        debug!("broadcast on channel {}", channel);
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::events::ChannelEvent;

    fn probe() -> ChannelEvent {
        ChannelEvent::Error {
            detail: "probe".into(),
        }
    }

    fn detail(event: &ChannelEvent) -> &str {
        match event {
            ChannelEvent::Error { detail } => detail,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber_exactly_once() {
        let registry = ChannelRegistry::new();
        let channel = Uuid::new_v4();
        let (_c1, mut rx1) = registry.join(channel, 1).await;
        let (_c2, mut rx2) = registry.join(channel, 2).await;
        let (_c3, mut rx3) = registry.join(channel, 3).await;

        registry.broadcast(channel, probe(), None).await;

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            let event = rx.try_recv().expect("one event");
            assert_eq!(detail(&event), "probe");
            assert!(rx.try_recv().is_err(), "no duplicate delivery");
        }
    }

    #[tokio::test]
    async fn dead_subscriber_is_evicted_without_blocking_the_rest() {
        let registry = ChannelRegistry::new();
        let channel = Uuid::new_v4();
        let (_c1, mut rx1) = registry.join(channel, 1).await;
        let (_c2, rx2) = registry.join(channel, 2).await;
        let (_c3, mut rx3) = registry.join(channel, 3).await;
        drop(rx2);

        registry.broadcast(channel, probe(), None).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx3.try_recv().is_ok());
        assert_eq!(registry.inner.read().await.get(&channel).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exclude_user_is_skipped() {
        let registry = ChannelRegistry::new();
        let channel = Uuid::new_v4();
        let (_c1, mut rx1) = registry.join(channel, 1).await;
        let (_c2, mut rx2) = registry.join(channel, 2).await;

        registry.broadcast(channel, probe(), Some(1)).await;

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn last_connect_wins_for_the_same_user() {
        let registry = ChannelRegistry::new();
        let channel = Uuid::new_v4();
        let (old_conn, mut old_rx) = registry.join(channel, 7).await;
        let (_new_conn, mut new_rx) = registry.join(channel, 7).await;

        registry.broadcast(channel, probe(), None).await;
        assert!(new_rx.try_recv().is_ok());
        // the replaced handle's sender was dropped on insert
        assert!(matches!(
            old_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        // a stale leave from the replaced connection must not evict the new one
        registry.leave(channel, 7, old_conn).await;
        registry.broadcast(channel, probe(), None).await;
        assert!(new_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn empty_channels_are_removed() {
        let registry = ChannelRegistry::new();
        let channel = Uuid::new_v4();
        let (conn, _rx) = registry.join(channel, 1).await;

        registry.leave(channel, 1, conn).await;

        assert!(registry.inner.read().await.is_empty());
    }

    #[tokio::test]
    async fn send_to_user_is_best_effort() {
        let registry = ChannelRegistry::new();
        let channel = Uuid::new_v4();
        // no panic, no state change
        registry.send_to_user(channel, 42, probe()).await;
        assert!(registry.inner.read().await.is_empty());

        let (_conn, mut rx) = registry.join(channel, 42).await;
        registry.send_to_user(channel, 42, probe()).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_on_unknown_channel_is_a_noop() {
        let registry = ChannelRegistry::new();
        registry.broadcast(Uuid::new_v4(), probe(), None).await;
    }
}
