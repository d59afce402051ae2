//! `g1bridge-middleware` – the in-process message bus between the transport,
//! the robot bridge and supervisory clients.

pub mod bus;

pub use bus::{EventBus, Topic, TopicPublisher, TopicReceiver};
