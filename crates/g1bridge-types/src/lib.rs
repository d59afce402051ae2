//! `g1bridge-types` – shared vocabulary of the G1 command bridge.
//!
//! Everything that crosses a crate boundary lives here: the actuator
//! [`Domain`]s, the [`BridgeError`] taxonomy, the [`RobotStatus`] snapshot,
//! raw [`JoyFrame`] input and the [`Event`] envelope routed over the bus.
//!
//! The Error Translator is in [`codes`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub mod codes;

pub use codes::ErrorCategory;

/// One of the two independent actuator subsystems reachable through the
/// native SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    /// Lower body: walking, posture, FSM and gait parameters.
    Locomotion,
    /// Upper body: pre-programmed arm gestures.
    Arm,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Locomotion => write!(f, "locomotion"),
            Domain::Arm => write!(f, "arm"),
        }
    }
}

/// Error taxonomy for every bridge operation.
///
/// [`HandleCreationFailed`][BridgeError::HandleCreationFailed] and
/// [`InitializationFailed`][BridgeError::InitializationFailed] are fatal to
/// their domain until the caller reconnects; everything else is recoverable.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("{domain} handle creation failed on interface '{interface}'")]
    HandleCreationFailed { domain: Domain, interface: String },

    #[error("{domain} initialization failed - code {code}: {category}")]
    InitializationFailed {
        domain: Domain,
        code: i32,
        category: ErrorCategory,
    },

    #[error("{0} not connected; call connect() first")]
    NotConnected(Domain),

    #[error("{domain} '{op}' failed - code {code}: {category}")]
    NativeFault {
        domain: Domain,
        op: String,
        code: i32,
        category: ErrorCategory,
    },

    #[error("unknown action '{name}'. Available: {}", available.join(", "))]
    UnknownCommand { name: String, available: Vec<String> },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("{0} capability unavailable")]
    CapabilityUnavailable(Domain),

    #[error("event bus error: {0}")]
    Channel(String),
}

impl BridgeError {
    /// `true` for handle creation and initialization failures.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            BridgeError::HandleCreationFailed { .. } | BridgeError::InitializationFailed { .. }
        )
    }

    /// Build a [`BridgeError::NativeFault`] with the translated category.
    pub fn native(domain: Domain, op: &str, code: i32) -> Self {
        BridgeError::NativeFault {
            domain,
            op: op.to_string(),
            code,
            category: codes::translate(domain, code),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot status snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Static identity of the robot, taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotIdentity {
    pub id: String,
    pub model: String,
    pub category: String,
}

impl Default for RobotIdentity {
    fn default() -> Self {
        Self {
            id: "unitree_g1".to_string(),
            model: "unitree_g1".to_string(),
            category: "sample".to_string(),
        }
    }
}

/// Planar pose placeholder (the native SDK does not report odometry here).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f32,
    pub y: f32,
    pub th: f32,
}

/// Motion-state label derived from the last FSM poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    /// Nothing polled yet.
    #[default]
    Idle,
    /// The FSM query succeeded with this id.
    Fsm(i32),
    /// The FSM query returned a nonzero code.
    Unknown,
    /// No live locomotion handle.
    Disconnected,
    /// The poll itself panicked; the poller is backing off.
    Error,
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionState::Idle => write!(f, "idle"),
            MotionState::Fsm(id) => write!(f, "fsm_id_{id}"),
            MotionState::Unknown => write!(f, "unknown"),
            MotionState::Disconnected => write!(f, "disconnected"),
            MotionState::Error => write!(f, "error"),
        }
    }
}

/// Latest known robot state, refreshed by the status poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotStatus {
    pub identity: RobotIdentity,
    pub pose: Pose2D,
    pub motion_state: MotionState,
    pub updated_at: DateTime<Utc>,
}

impl RobotStatus {
    pub fn new(identity: RobotIdentity) -> Self {
        Self {
            identity,
            pose: Pose2D::default(),
            motion_state: MotionState::Idle,
            updated_at: Utc::now(),
        }
    }

    /// The FSM id of the last successful poll, if any.
    pub fn fsm_id(&self) -> Option<i32> {
        match self.motion_state {
            MotionState::Fsm(id) => Some(id),
            _ => None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Input frames
// ────────────────────────────────────────────────────────────────────────────

/// Which array of a [`JoyFrame`] a mapping entry inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputChannel {
    #[serde(rename = "axes")]
    Axis,
    #[serde(rename = "buttons")]
    Button,
}

impl fmt::Display for InputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputChannel::Axis => write!(f, "axes"),
            InputChannel::Button => write!(f, "buttons"),
        }
    }
}

/// One snapshot of joystick axes and buttons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoyFrame {
    #[serde(default)]
    pub axes: Vec<f32>,
    #[serde(default)]
    pub buttons: Vec<f32>,
}

impl JoyFrame {
    /// Build a frame from an untyped bus payload.
    ///
    /// Parsing is lenient so that a damaged frame still reaches the
    /// dispatcher (and therefore its fail-safe): a missing or non-array
    /// field becomes empty, a non-numeric element becomes `NaN`, which
    /// compares unequal to every expected value.
    pub fn from_value(value: &Value) -> Self {
        fn numbers(field: Option<&Value>) -> Vec<f32> {
            match field.and_then(Value::as_array) {
                Some(items) => items
                    .iter()
                    .map(|v| v.as_f64().map(|n| n as f32).unwrap_or(f32::NAN))
                    .collect(),
                None => Vec::new(),
            }
        }
        Self {
            axes: numbers(value.get("axes")),
            buttons: numbers(value.get("buttons")),
        }
    }

    /// The values of the given channel.
    pub fn channel(&self, channel: InputChannel) -> &[f32] {
        match channel {
            InputChannel::Axis => &self.axes,
            InputChannel::Button => &self.buttons,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Pass-through message shape exchanged with the transport,
/// e.g. `{"topic": "/joy", "value": {...}, "target": "all"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Unified event wrapper for the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"g1bridge-kernel::poller"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Transport message (inbound from operators or outbound echo).
    Message(Message),
    /// Periodic status snapshot.
    Status(RobotStatus),
    /// A native call failed; carries the translated category.
    CommandFault {
        domain: Domain,
        command: String,
        code: i32,
        category: ErrorCategory,
    },
    /// An operator or the process requested an emergency stop.
    EmergencyStop { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joy_frame_from_value_reads_both_channels() {
        let frame = JoyFrame::from_value(&json!({"axes": [0.0, -1.0], "buttons": [0, 0, 0, 1]}));
        assert_eq!(frame.axes, vec![0.0, -1.0]);
        assert_eq!(frame.buttons, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(frame.channel(InputChannel::Button)[3], 1.0);
    }

    #[test]
    fn joy_frame_missing_fields_are_empty() {
        let frame = JoyFrame::from_value(&json!({"buttons": [1]}));
        assert!(frame.axes.is_empty());
        let frame = JoyFrame::from_value(&json!("not a frame"));
        assert_eq!(frame, JoyFrame::default());
    }

    #[test]
    fn joy_frame_non_numeric_values_never_match() {
        let frame = JoyFrame::from_value(&json!({"buttons": ["x", 1]}));
        assert!(frame.buttons[0].is_nan());
        assert_eq!(frame.buttons[1], 1.0);
    }

    #[test]
    fn motion_state_labels() {
        assert_eq!(MotionState::Fsm(801).to_string(), "fsm_id_801");
        assert_eq!(MotionState::Disconnected.to_string(), "disconnected");
        assert_eq!(MotionState::Error.to_string(), "error");
        assert_eq!(MotionState::default().to_string(), "idle");
    }

    #[test]
    fn native_error_carries_domain_code_and_category() {
        let err = BridgeError::native(Domain::Locomotion, "stop_move", 3107);
        let text = err.to_string();
        assert!(text.contains("locomotion"));
        assert!(text.contains("3107"));
        assert!(text.contains("ROBOT_EMERGENCY_STOP"));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn unknown_command_lists_alternatives() {
        let err = BridgeError::UnknownCommand {
            name: "moonwalk".to_string(),
            available: vec!["clap".to_string(), "hug".to_string()],
        };
        assert_eq!(err.to_string(), "unknown action 'moonwalk'. Available: clap, hug");
    }

    #[test]
    fn message_roundtrip_keeps_target() {
        let msg = Message {
            topic: "/joy".to_string(),
            value: json!({"axes": [1.0]}),
            target: Some("all".to_string()),
        };
        let text = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn status_event_roundtrip() {
        let event = Event::new(
            "g1bridge-kernel::poller",
            EventPayload::Status(RobotStatus::new(RobotIdentity::default())),
        );
        let text = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, event.id);
        assert!(matches!(back.payload, EventPayload::Status(_)));
    }
}
