//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Publishing is synchronous, so plain OS threads (the status
//! poller, the Ctrl-C handler) can publish without a runtime.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Inbound`] | Transport messages for the robot (`/joy` frames, pass-through requests) |
//! | [`Topic::Outbound`] | Echoes and forwarded messages for supervisory clients |
//! | [`Topic::Status`] | Periodic [`RobotStatus`][g1bridge_types::RobotStatus] snapshots |
//! | [`Topic::Alerts`] | Command faults and emergency stops |

use g1bridge_types::{BridgeError, Event};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Messages delivered to the robot from the transport.
    Inbound,
    /// Messages the robot sends back out to the transport.
    Outbound,
    /// Status snapshots published by the poller.
    Status,
    /// Faults and emergency stops.
    Alerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    inbound: broadcast::Sender<Event>,
    outbound: broadcast::Sender<Event>,
    status: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (inbound, _) = broadcast::channel(capacity);
        let (outbound, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            inbound,
            outbound,
            status,
            alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`BridgeError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, BridgeError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| BridgeError::Channel(format!("no subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// A send-only handle for one topic.
    ///
    /// Unlike a clone of the whole bus, it keeps no other topic alive, so a
    /// component holding only publishers does not prevent the inbound
    /// channel from closing.
    pub fn publisher(&self, topic: Topic) -> TopicPublisher {
        TopicPublisher {
            topic,
            sender: self.topic_sender(topic).clone(),
        }
    }

    /// Number of receivers currently attached to `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Inbound => &self.inbound,
            Topic::Outbound => &self.outbound,
            Topic::Status => &self.status,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Single-topic publisher
// ---------------------------------------------------------------------------

/// A sender bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::publisher`].
#[derive(Clone, Debug)]
pub struct TopicPublisher {
    topic: Topic,
    sender: broadcast::Sender<Event>,
}

impl TopicPublisher {
    /// Same contract as [`EventBus::publish_to`].
    pub fn publish(&self, event: Event) -> Result<usize, BridgeError> {
        let topic = self.topic;
        self.sender
            .send(event)
            .map_err(|_| BridgeError::Channel(format!("no subscribers for topic {topic:?}")))
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Block the current (non-async) thread until the next event arrives.
    ///
    /// Lagged gaps are logged and skipped.  Returns `None` once every sender
    /// has been dropped.  Must not be called from inside a Tokio runtime.
    pub fn blocking_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Return the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
