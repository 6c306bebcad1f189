//! Topic membership and the subscribe/unsubscribe control flow.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::{Event, EventType};
use tracing::debug;

use crate::supervisor::ConnectionSupervisor;

/// The set of topics this client has asked the server to stream.
///
/// Topics are event types, so legacy spellings collapse onto their canonical
/// form (`item_created` and `item:created` are one member), matching how the
/// server keys subscriptions.
#[derive(Debug, Default)]
pub struct TopicMembership {
    topics: Mutex<BTreeSet<EventType>>,
}

impl TopicMembership {
    /// Create an empty membership set.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a topic. Returns `false` if already a member.
    pub fn insert(&self, topic: &EventType) -> bool {
        self.topics.lock().insert(topic.clone())
    }

    /// Remove a topic. Returns `false` if it was not a member.
    pub fn remove(&self, topic: &EventType) -> bool {
        self.topics.lock().remove(topic)
    }

    /// Whether `topic` is a member.
    pub fn contains(&self, topic: &EventType) -> bool {
        self.topics.lock().contains(topic)
    }

    /// Current members in canonical form, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        self.topics
            .lock()
            .iter()
            .map(|t| t.as_str().to_owned())
            .collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_empty()
    }
}

/// Keeps [`TopicMembership`] and the server in step.
pub struct SubscriptionManager {
    membership: Arc<TopicMembership>,
    supervisor: Arc<ConnectionSupervisor>,
}

impl SubscriptionManager {
    /// Manage `membership` over `supervisor`'s socket.
    pub fn new(membership: Arc<TopicMembership>, supervisor: Arc<ConnectionSupervisor>) -> Self {
        Self {
            membership,
            supervisor,
        }
    }

    /// Join `topic`, sending one `subscribe` if it was not already joined.
    ///
    /// While disconnected the request is not queued; the supervisor re-sends
    /// every member topic when the next socket opens.
    pub fn subscribe_to_topic(&self, topic: &str) -> bool {
        let topic = EventType::from(topic);
        if !self.membership.insert(&topic) {
            debug!(topic = %topic, "already subscribed");
            return false;
        }
        let _ = self
            .supervisor
            .send(&Event::subscribe(topic.as_str()).stamp_now());
        true
    }

    /// Leave `topic`, sending one `unsubscribe` if it was joined.
    pub fn unsubscribe_from_topic(&self, topic: &str) -> bool {
        let topic = EventType::from(topic);
        if !self.membership.remove(&topic) {
            debug!(topic = %topic, "not subscribed");
            return false;
        }
        let _ = self
            .supervisor
            .send(&Event::unsubscribe(topic.as_str()).stamp_now());
        true
    }

    /// Current members, sorted.
    pub fn topics(&self) -> Vec<String> {
        self.membership.snapshot()
    }
}
