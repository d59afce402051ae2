//! `g1bridge-kernel` – runtime services layered on the HAL.
//!
//! - [`poller`]: background FSM polling into a shared [`StatusBoard`].
//! - [`dispatcher`]: joystick frames → one locomotion command, with
//!   fail-safes.
//! - [`router`]: inbound bus messages → dispatcher / echo / pass-through.
//! - [`bridge`]: [`RobotBridge`], the composition root tying them together.

pub mod bridge;
pub mod dispatcher;
pub mod poller;
pub mod router;

pub use bridge::{BridgeSettings, RobotBridge};
pub use dispatcher::{
    Binding, DEFAULT_MAPPING, DispatchOutcome, DispatchState, Dispatcher, FailReason, JoyCommand, MappingEntry,
    MotionDefaults, resolve,
};
pub use poller::{Cadence, PollerConfig, StatusBoard, StatusPoller};
pub use router::{JOY_TOPIC, MessageRouter};
