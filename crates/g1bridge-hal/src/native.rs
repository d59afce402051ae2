//! Native actuator boundary.
//!
//! The motion-control SDK is reachable only through a C function table per
//! domain: an opaque handle plus typed get/set/action calls that return a
//! bare status code or a `{code, value}` pair.  These traits mirror that
//! table one-to-one so the rest of the bridge can run against the real
//! library ([`crate::ffi`], feature `native`) or the in-memory
//! [`crate::sim`] stubs without change.
//!
//! Implementations are *not* required to be internally synchronised beyond
//! `Send + Sync`; [`Connection`][crate::connection::Connection] serialises
//! every call against one handle.

use std::num::NonZeroUsize;

use g1bridge_types::Domain;

/// Opaque, non-null session handle returned by a native `create` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonZeroUsize);

impl RawHandle {
    /// Wrap a handle address; `None` for the null handle.
    pub fn from_addr(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Self)
    }

    /// The address originally returned by the native layer.
    pub fn addr(self) -> usize {
        self.0.get()
    }
}

/// A `{code, value}` pair returned by native getters.
///
/// `value` is only meaningful when `code == 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeReply<T> {
    pub code: i32,
    pub value: T,
}

/// Lifecycle half of a native function table, shared by both domains.
pub trait NativeSession: Send + Sync {
    /// Which subsystem this table drives.
    fn domain(&self) -> Domain;

    /// Construct a session bound to `interface` (e.g. `"eth0"`).
    /// `None` is the null handle.
    fn create(&self, interface: &str) -> Option<RawHandle>;

    /// Release a session.  Never called twice for the same handle.
    fn destroy(&self, handle: RawHandle);

    /// Initialise a freshly created session; `0` on success.
    fn init(&self, handle: RawHandle) -> i32;

    /// Set the per-call transport timeout in seconds; `0` on success.
    fn set_timeout(&self, handle: RawHandle, seconds: f32) -> i32;
}

/// Locomotion function table (`libg1_loco_wrapper`).
pub trait LocoNative: NativeSession {
    fn get_fsm_id(&self, handle: RawHandle) -> NativeReply<i32>;
    fn get_fsm_mode(&self, handle: RawHandle) -> NativeReply<i32>;
    fn get_balance_mode(&self, handle: RawHandle) -> NativeReply<i32>;
    fn get_swing_height(&self, handle: RawHandle) -> NativeReply<f32>;
    fn get_stand_height(&self, handle: RawHandle) -> NativeReply<f32>;

    fn set_fsm_id(&self, handle: RawHandle, fsm_id: i32) -> i32;
    fn set_balance_mode(&self, handle: RawHandle, balance_mode: i32) -> i32;
    fn set_swing_height(&self, handle: RawHandle, swing_height: f32) -> i32;
    fn set_stand_height(&self, handle: RawHandle, stand_height: f32) -> i32;
    fn set_velocity(&self, handle: RawHandle, vx: f32, vy: f32, omega: f32, duration: f32) -> i32;
    fn set_task_id(&self, handle: RawHandle, task_id: i32) -> i32;
    fn set_speed_mode(&self, handle: RawHandle, speed_mode: i32) -> i32;

    fn damp(&self, handle: RawHandle) -> i32;
    fn start(&self, handle: RawHandle) -> i32;
    fn stand_up(&self, handle: RawHandle) -> i32;
    fn squat(&self, handle: RawHandle) -> i32;
    fn sit(&self, handle: RawHandle) -> i32;
    fn zero_torque(&self, handle: RawHandle) -> i32;
    fn stop_move(&self, handle: RawHandle) -> i32;
    fn high_stand(&self, handle: RawHandle) -> i32;
    fn low_stand(&self, handle: RawHandle) -> i32;
    fn balance_stand(&self, handle: RawHandle) -> i32;
    fn continuous_gait(&self, handle: RawHandle, enable: bool) -> i32;
    fn switch_move_mode(&self, handle: RawHandle, continuous: bool) -> i32;
    fn move_robot(&self, handle: RawHandle, vx: f32, vy: f32, vyaw: f32) -> i32;
    fn wave_hand(&self, handle: RawHandle, turn: bool) -> i32;
    fn shake_hand(&self, handle: RawHandle, stage: i32) -> i32;
}

/// Arm gesture function table (`libg1_arm_wrapper`).
pub trait ArmNative: NativeSession {
    fn execute_action(&self, handle: RawHandle, action_id: i32) -> i32;

    /// Raw action list as reported by the firmware (a JSON document).
    fn get_action_list(&self, handle: RawHandle) -> NativeReply<Option<String>>;
}
