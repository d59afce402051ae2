//! [`MessageRouter`] – the bridge's side of the transport.
//!
//! Consumes [`Topic::Inbound`][g1bridge_middleware::Topic::Inbound]
//! messages.  `/joy` payloads become [`JoyFrame`]s for the
//! [`Dispatcher`]; any other topic is answered with a `callback_` echo
//! addressed to `all`.  Every inbound message is then forwarded unchanged on
//! the outbound topic for supervisory clients.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use g1bridge_middleware::{TopicPublisher, TopicReceiver};
use g1bridge_types::{BridgeError, Event, EventPayload, JoyFrame, Message};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchOutcome, Dispatcher};

const SOURCE: &str = "g1bridge-kernel::router";

/// Topic carrying joystick frames.
pub const JOY_TOPIC: &str = "/joy";

/// Build the echo reply for a non-joystick message.
pub fn echo(message: &Message) -> Message {
    let value = match &message.value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Message {
        topic: format!("callback_{}", message.topic),
        value: Value::String(format!("callback_{value}")),
        target: Some("all".to_string()),
    }
}

pub struct MessageRouter {
    dispatcher: Arc<Dispatcher>,
    outbound: TopicPublisher,
}

impl MessageRouter {
    pub fn new(dispatcher: Arc<Dispatcher>, outbound: TopicPublisher) -> Self {
        Self { dispatcher, outbound }
    }

    /// Handle one inbound message.  Returns the dispatch outcome for `/joy`.
    pub fn route(&self, message: &Message) -> Option<DispatchOutcome> {
        let outcome = if message.topic == JOY_TOPIC {
            if !message.value.is_object() {
                let err = BridgeError::MalformedInput(format!("{JOY_TOPIC} value is not an object"));
                warn!(error = %err, "dispatching empty frame");
            }
            Some(self.dispatcher.handle_frame(&JoyFrame::from_value(&message.value)))
        } else {
            self.send(echo(message));
            None
        };
        self.send(message.clone());
        outcome
    }

    fn send(&self, message: Message) {
        if let Err(err) = self.outbound.publish(Event::new(SOURCE, EventPayload::Message(message))) {
            debug!(error = %err, "outbound message dropped");
        }
    }

    /// Route messages from `inbound` until the bus closes.
    pub fn run(&self, mut inbound: TopicReceiver) {
        info!("message router started");
        while let Some(event) = inbound.blocking_recv() {
            match event.payload {
                EventPayload::Message(ref message) => {
                    self.route(message);
                }
                other => debug!(payload = ?other, "ignoring non-message inbound event"),
            }
        }
        info!("message router stopped: inbound closed");
    }

    /// Run the router on its own thread.
    pub fn spawn(self, inbound: TopicReceiver) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("g1bridge-router".to_string())
            .spawn(move || self.run(inbound))
    }
}

#[cfg(test)]
mod tests {
    use g1bridge_hal::sim::SimLoco;
    use g1bridge_hal::{LocoExecutor, LocoNative, LocoOp};
    use g1bridge_middleware::{EventBus, Topic};
    use serde_json::json;

    use super::*;
    use crate::dispatcher::MotionDefaults;

    fn router(bus: &EventBus) -> (Arc<SimLoco>, MessageRouter) {
        let sim = Arc::new(SimLoco::new());
        let loco = Arc::new(LocoExecutor::new(sim.clone() as Arc<dyn LocoNative>, "eth0"));
        loco.connect().unwrap();
        let dispatcher = Arc::new(Dispatcher::new(loco, MotionDefaults::default()));
        (sim, MessageRouter::new(dispatcher, bus.publisher(Topic::Outbound)))
    }

    fn message(topic: &str, value: Value) -> Message {
        Message {
            topic: topic.to_string(),
            value,
            target: None,
        }
    }

    fn outbound_message(rx: &mut TopicReceiver) -> Message {
        match rx.try_recv().expect("outbound event").payload {
            EventPayload::Message(m) => m,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn echo_prefixes_topic_and_value() {
        let reply = echo(&message("/ping", json!("hello")));
        assert_eq!(reply.topic, "callback_/ping");
        assert_eq!(reply.value, json!("callback_hello"));
        assert_eq!(reply.target.as_deref(), Some("all"));
    }

    #[test]
    fn joy_message_reaches_dispatcher_and_is_forwarded() {
        let bus = EventBus::default();
        let mut out = bus.subscribe_to(Topic::Outbound);
        let (sim, router) = router(&bus);

        let msg = message(JOY_TOPIC, json!({"axes": [0.0, 0.0], "buttons": [0, 0, 0, 1]}));
        let outcome = router.route(&msg);

        assert!(matches!(outcome, Some(DispatchOutcome::Executed { op: LocoOp::StopMove, .. })));
        assert_eq!(sim.calls("stop_move"), 1);
        assert_eq!(outbound_message(&mut out), msg);
        assert!(out.try_recv().is_err());
    }

    #[test]
    fn other_topics_are_echoed_then_forwarded() {
        let bus = EventBus::default();
        let mut out = bus.subscribe_to(Topic::Outbound);
        let (sim, router) = router(&bus);

        let msg = message("/chat", json!("hi"));
        assert!(router.route(&msg).is_none());

        assert_eq!(outbound_message(&mut out).topic, "callback_/chat");
        assert_eq!(outbound_message(&mut out), msg);
        assert_eq!(sim.calls("set_velocity"), 0);
    }

    #[test]
    fn non_object_joy_value_still_hits_fail_safe() {
        let bus = EventBus::default();
        let (sim, router) = router(&bus);
        let outcome = router.route(&message(JOY_TOPIC, json!(42)));
        assert_eq!(outcome, Some(DispatchOutcome::NoMatch));
        assert_eq!(sim.calls("set_velocity"), 1);
    }

    #[test]
    fn spawned_router_exits_when_bus_drops() {
        let bus = EventBus::default();
        let inbound = bus.subscribe_to(Topic::Inbound);
        let (sim, router) = router(&bus);
        let handle = router.spawn(inbound).unwrap();

        bus.publish_to(
            Topic::Inbound,
            Event::new("test", EventPayload::Message(message(JOY_TOPIC, json!({"buttons": [0, 0, 0, 0, 0, 1]})))),
        )
        .unwrap();
        drop(bus);

        handle.join().unwrap();
        assert_eq!(sim.calls("stand_up"), 1);
    }
}
