//! `g1bridge-hal` – the native actuator boundary of the G1 bridge.
//!
//! - [`native`]: function-table traits mirroring the vendor C wrappers.
//! - [`connection`]: one owned handle per domain, with rollback and
//!   guaranteed teardown.
//! - [`executor`]: typed locomotion and arm commands, serialised per domain.
//! - [`gestures`]: the built-in arm gesture catalogue.
//! - [`sim`]: instrumented in-memory stubs for tests.
//! - `ffi` (feature `native`): the real library bindings.

pub mod connection;
pub mod executor;
#[cfg(feature = "native")]
pub mod ffi;
pub mod gestures;
pub mod native;
pub mod sim;

pub use connection::{ARM_DEFAULT_TIMEOUT, Connection, DEFAULT_INTERFACE, LOCO_DEFAULT_TIMEOUT};
pub use executor::{ArmExecutor, DEFAULT_VELOCITY_DURATION, LocoExecutor, LocoOp, Reply};
pub use gestures::{GESTURES, Gesture, gesture_id, gesture_names};
pub use native::{ArmNative, LocoNative, NativeReply, NativeSession, RawHandle};
