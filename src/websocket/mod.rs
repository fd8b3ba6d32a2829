use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

pub mod events;
pub mod handlers;

/// Unique identifier for one registered connection.
///
/// Lets `unregister` remove exactly the subscriber that closed, even when the
/// same user holds several live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

/// One realtime push addressed to every live connection of one user.
///
/// Services produce these instead of touching the transport; the gateway
/// executes them. The direct return value of an operation and its push list
/// are two separate outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub user_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
}

impl PushMessage {
    pub fn new(user_id: Uuid, event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            user_id,
            event: event.into(),
            payload,
        }
    }
}

/// Narrow push capability consumed by the notification side.
///
/// Keeps the service layer off the transport: the registry implements this,
/// the lifecycle code depends on services only through inbound dispatch.
pub trait PushDelivery: Send + Sync {
    /// Best-effort fan-out to every live connection of the user. A user with
    /// zero connections is a well-defined no-op, never an error.
    fn deliver_to_user(&self, user_id: Uuid, event: &str, payload: &serde_json::Value);

    /// Identities with at least one live connection right now.
    fn connected_user_ids(&self) -> Vec<Uuid>;
}

/// Wire frame for every server-pushed event.
pub fn outbound_frame(event: &str, payload: &serde_json::Value) -> String {
    serde_json::json!({
        "type": event,
        "timestamp": Utc::now().to_rfc3339(),
        "data": payload,
    })
    .to_string()
}

/// In-memory user -> live connections map.
///
/// Presence is ephemeral: state is rebuilt purely from live connections and
/// lost on restart. All operations are synchronous; the shard lock is only
/// ever held across the in-memory mutation (an unbounded send cannot block),
/// so concurrent connect/disconnect races cannot corrupt the map.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<DashMap<Uuid, Vec<Subscriber>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for a user, creating the entry on first connect.
    pub fn register(&self, user_id: Uuid) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();
        self.inner.entry(user_id).or_default().push(Subscriber {
            id: subscriber_id,
            sender: tx,
        });
        tracing::debug!(%user_id, "connection registered");
        (subscriber_id, rx)
    }

    /// Remove one connection; the user's entry is dropped once empty.
    pub fn unregister(&self, user_id: Uuid, subscriber_id: SubscriberId) {
        let mut emptied = false;
        if let Some(mut subscribers) = self.inner.get_mut(&user_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            emptied = subscribers.is_empty();
        }
        if emptied {
            // Re-checks emptiness under the lock so a concurrent register
            // between the two steps is never thrown away.
            self.inner.remove_if(&user_id, |_, subs| subs.is_empty());
        }
        tracing::debug!(%user_id, "connection unregistered");
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner.get(&user_id).map(|subs| subs.len()).unwrap_or(0)
    }

    /// Send an event frame to every live connection of a user. Dead senders
    /// are cleaned up on the spot; an offline user is a silent no-op.
    pub fn deliver(&self, user_id: Uuid, event: &str, payload: &serde_json::Value) {
        let frame = outbound_frame(event, payload);
        let mut emptied = false;
        if let Some(mut subscribers) = self.inner.get_mut(&user_id) {
            subscribers.retain(|s| s.sender.send(frame.clone()).is_ok());
            emptied = subscribers.is_empty();
        }
        if emptied {
            self.inner.remove_if(&user_id, |_, subs| subs.is_empty());
        }
    }

    pub fn execute(&self, pushes: &[PushMessage]) {
        for push in pushes {
            self.deliver(push.user_id, &push.event, &push.payload);
        }
    }
}

impl PushDelivery for ConnectionRegistry {
    fn deliver_to_user(&self, user_id: Uuid, event: &str, payload: &serde_json::Value) {
        self.deliver(user_id, event, payload);
    }

    fn connected_user_ids(&self) -> Vec<Uuid> {
        self.inner
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect()
    }
}
