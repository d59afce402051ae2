//! In-process native stubs for headless tests and CI without a robot.
//!
//! [`SimLoco`] and [`SimArm`] implement the native function tables in
//! memory.  Both share a [`SimHarness`] that
//!
//! - journals every call as an [`SimCall::Enter`] / [`SimCall::Exit`] pair,
//!   so tests can prove calls on one handle never interleave;
//! - counts created and destroyed handles, so tests can prove no handle
//!   leaks and none is destroyed twice;
//! - injects faults: a null `create`, a nonzero code from any operation
//!   (including `init`), added latency, or a panic inside an operation.
//!
//! Calls against a handle that is not live return `-1`, the wrapper's
//! generic failure code.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use g1bridge_hal::{LocoExecutor, LocoNative, sim::SimLoco};
//!
//! let sim = Arc::new(SimLoco::new().with_fault("sit", 3104));
//! let loco = LocoExecutor::new(sim.clone() as Arc<dyn LocoNative>, "eth0");
//! loco.connect().unwrap();
//!
//! assert!(loco.sit().is_err());
//! assert_eq!(sim.calls("sit"), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use g1bridge_types::Domain;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::gestures;
use crate::native::{ArmNative, LocoNative, NativeReply, NativeSession, RawHandle};

const FIRST_HANDLE_ADDR: usize = 0x1000;

/// One journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCall {
    Enter(&'static str),
    Exit(&'static str),
}

#[derive(Debug, Default)]
struct Faults {
    null_create: bool,
    codes: HashMap<&'static str, i32>,
    panics: HashSet<&'static str>,
    latency: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Shared harness
// ────────────────────────────────────────────────────────────────────────────

/// Bookkeeping and fault injection shared by every simulated table.
#[derive(Debug)]
pub struct SimHarness {
    domain: Domain,
    journal: Mutex<Vec<SimCall>>,
    faults: Mutex<Faults>,
    live: Mutex<HashSet<usize>>,
    next_addr: AtomicUsize,
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl SimHarness {
    fn new(domain: Domain) -> Self {
        Self {
            domain,
            journal: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            live: Mutex::new(HashSet::new()),
            next_addr: AtomicUsize::new(FIRST_HANDLE_ADDR),
            created: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        }
    }

    /// Make `op` return `code` instead of running.
    pub fn set_fault(&self, op: &'static str, code: i32) {
        self.faults.lock().codes.insert(op, code);
    }

    /// Make `op` panic on its next and every later call.
    pub fn panic_on(&self, op: &'static str) {
        self.faults.lock().panics.insert(op);
    }

    /// Remove every injected code and panic (latency and null-create stay).
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.codes.clear();
        faults.panics.clear();
    }

    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().latency = latency;
    }

    pub fn set_null_create(&self, null: bool) {
        self.faults.lock().null_create = null;
    }

    /// Copy of the full call journal.
    pub fn journal(&self) -> Vec<SimCall> {
        self.journal.lock().clone()
    }

    /// How many times `op` was entered.
    pub fn calls(&self, op: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|call| matches!(call, SimCall::Enter(name) if *name == op))
            .count()
    }

    /// `true` when no two calls overlap in the journal.
    pub fn calls_serialized(&self) -> bool {
        let journal = self.journal.lock();
        let mut open: Option<&'static str> = None;
        for call in journal.iter() {
            match (*call, open) {
                (SimCall::Enter(op), None) => open = Some(op),
                (SimCall::Exit(op), Some(current)) if op == current => open = None,
                _ => return false,
            }
        }
        true
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.live.lock().len()
    }

    /// Journal the entry of `op`, then apply latency and panic faults.
    /// Returns the injected code, if any.  No lock is held when panicking.
    fn enter(&self, op: &'static str) -> Option<i32> {
        self.journal.lock().push(SimCall::Enter(op));
        let (latency, panics, code) = {
            let faults = self.faults.lock();
            (faults.latency, faults.panics.contains(op), faults.codes.get(op).copied())
        };
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        if panics {
            panic!("simulated native panic in {}::{op}", self.domain);
        }
        code
    }

    fn exit(&self, op: &'static str) {
        self.journal.lock().push(SimCall::Exit(op));
    }

    /// Run a handle-bound call: injected code first, then liveness, then `body`.
    fn run(&self, op: &'static str, handle: RawHandle, body: impl FnOnce() -> i32) -> i32 {
        let injected = self.enter(op);
        let code = match injected {
            Some(code) => code,
            None if !self.live.lock().contains(&handle.addr()) => {
                warn!(domain = %self.domain, op, handle = handle.addr(), "call on dead handle");
                -1
            }
            None => body(),
        };
        self.exit(op);
        code
    }

    fn query<T>(&self, op: &'static str, handle: RawHandle, read: impl FnOnce() -> T, fallback: T) -> NativeReply<T> {
        let mut value = None;
        let code = self.run(op, handle, || {
            value = Some(read());
            0
        });
        NativeReply {
            code,
            value: value.unwrap_or(fallback),
        }
    }

    fn create(&self, interface: &str) -> Option<RawHandle> {
        self.enter("create");
        let handle = if self.faults.lock().null_create {
            None
        } else {
            let addr = self.next_addr.fetch_add(0x10, Ordering::SeqCst);
            self.live.lock().insert(addr);
            self.created.fetch_add(1, Ordering::SeqCst);
            RawHandle::from_addr(addr)
        };
        debug!(domain = %self.domain, interface, handle = ?handle, "sim create");
        self.exit("create");
        handle
    }

    fn destroy(&self, handle: RawHandle) {
        self.enter("destroy");
        if self.live.lock().remove(&handle.addr()) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        } else {
            warn!(domain = %self.domain, handle = handle.addr(), "destroy of dead handle");
        }
        self.exit("destroy");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Locomotion stub
// ────────────────────────────────────────────────────────────────────────────

/// Observable state of [`SimLoco`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimLocoState {
    pub fsm_id: i32,
    pub fsm_mode: i32,
    pub balance_mode: i32,
    pub swing_height: f32,
    pub stand_height: f32,
    pub speed_mode: i32,
    pub task_id: i32,
    pub continuous_gait: bool,
    pub continuous_move: bool,
    /// Last commanded `(vx, vy, yaw rate)`.
    pub velocity: (f32, f32, f32),
    pub velocity_duration: f32,
    pub timeout_s: f32,
    /// Name of the last posture command (`"sit"`, `"damp"`, …).
    pub posture: Option<&'static str>,
}

impl Default for SimLocoState {
    fn default() -> Self {
        Self {
            fsm_id: 0,
            fsm_mode: 0,
            balance_mode: 0,
            swing_height: 0.08,
            stand_height: 0.78,
            speed_mode: 0,
            task_id: -1,
            continuous_gait: false,
            continuous_move: false,
            velocity: (0.0, 0.0, 0.0),
            velocity_duration: 0.0,
            timeout_s: 0.0,
            posture: None,
        }
    }
}

/// Simulated `libg1_loco_wrapper`.  Every command succeeds unless a fault is
/// injected.
#[derive(Debug)]
pub struct SimLoco {
    harness: SimHarness,
    state: Mutex<SimLocoState>,
}

impl SimLoco {
    pub fn new() -> Self {
        Self {
            harness: SimHarness::new(Domain::Locomotion),
            state: Mutex::new(SimLocoState::default()),
        }
    }

    /// `create` returns the null handle.
    pub fn with_null_create(self) -> Self {
        self.harness.set_null_create(true);
        self
    }

    /// `init` returns `code`.
    pub fn with_init_code(self, code: i32) -> Self {
        self.harness.set_fault("init", code);
        self
    }

    /// `op` returns `code`.
    pub fn with_fault(self, op: &'static str, code: i32) -> Self {
        self.harness.set_fault(op, code);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.harness.set_latency(latency);
        self
    }

    /// Copy of the current simulated state.
    pub fn snapshot(&self) -> SimLocoState {
        self.state.lock().clone()
    }

    fn posture(&self, op: &'static str, handle: RawHandle, fsm_id: Option<i32>) -> i32 {
        self.harness.run(op, handle, || {
            let mut state = self.state.lock();
            state.posture = Some(op);
            if let Some(id) = fsm_id {
                state.fsm_id = id;
            }
            0
        })
    }

    fn update(&self, op: &'static str, handle: RawHandle, apply: impl FnOnce(&mut SimLocoState)) -> i32 {
        self.harness.run(op, handle, || {
            apply(&mut self.state.lock());
            0
        })
    }
}

impl Default for SimLoco {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SimLoco {
    type Target = SimHarness;

    fn deref(&self) -> &SimHarness {
        &self.harness
    }
}

impl NativeSession for SimLoco {
    fn domain(&self) -> Domain {
        Domain::Locomotion
    }

    fn create(&self, interface: &str) -> Option<RawHandle> {
        self.harness.create(interface)
    }

    fn destroy(&self, handle: RawHandle) {
        self.harness.destroy(handle);
    }

    fn init(&self, handle: RawHandle) -> i32 {
        self.harness.run("init", handle, || 0)
    }

    fn set_timeout(&self, handle: RawHandle, seconds: f32) -> i32 {
        self.update("set_timeout", handle, |s| s.timeout_s = seconds)
    }
}

impl LocoNative for SimLoco {
    fn get_fsm_id(&self, handle: RawHandle) -> NativeReply<i32> {
        self.harness.query("get_fsm_id", handle, || self.state.lock().fsm_id, 0)
    }

    fn get_fsm_mode(&self, handle: RawHandle) -> NativeReply<i32> {
        self.harness.query("get_fsm_mode", handle, || self.state.lock().fsm_mode, 0)
    }

    fn get_balance_mode(&self, handle: RawHandle) -> NativeReply<i32> {
        self.harness.query("get_balance_mode", handle, || self.state.lock().balance_mode, 0)
    }

    fn get_swing_height(&self, handle: RawHandle) -> NativeReply<f32> {
        self.harness.query("get_swing_height", handle, || self.state.lock().swing_height, 0.0)
    }

    fn get_stand_height(&self, handle: RawHandle) -> NativeReply<f32> {
        self.harness.query("get_stand_height", handle, || self.state.lock().stand_height, 0.0)
    }

    fn set_fsm_id(&self, handle: RawHandle, fsm_id: i32) -> i32 {
        self.update("set_fsm_id", handle, |s| s.fsm_id = fsm_id)
    }

    fn set_balance_mode(&self, handle: RawHandle, balance_mode: i32) -> i32 {
        self.update("set_balance_mode", handle, |s| s.balance_mode = balance_mode)
    }

    fn set_swing_height(&self, handle: RawHandle, swing_height: f32) -> i32 {
        self.update("set_swing_height", handle, |s| s.swing_height = swing_height)
    }

    fn set_stand_height(&self, handle: RawHandle, stand_height: f32) -> i32 {
        self.update("set_stand_height", handle, |s| s.stand_height = stand_height)
    }

    fn set_velocity(&self, handle: RawHandle, vx: f32, vy: f32, omega: f32, duration: f32) -> i32 {
        self.update("set_velocity", handle, |s| {
            s.velocity = (vx, vy, omega);
            s.velocity_duration = duration;
        })
    }

    fn set_task_id(&self, handle: RawHandle, task_id: i32) -> i32 {
        self.update("set_task_id", handle, |s| s.task_id = task_id)
    }

    fn set_speed_mode(&self, handle: RawHandle, speed_mode: i32) -> i32 {
        self.update("set_speed_mode", handle, |s| s.speed_mode = speed_mode)
    }

    fn damp(&self, handle: RawHandle) -> i32 {
        self.posture("damp", handle, Some(1))
    }

    fn start(&self, handle: RawHandle) -> i32 {
        self.posture("start", handle, Some(500))
    }

    fn stand_up(&self, handle: RawHandle) -> i32 {
        self.posture("stand_up", handle, Some(4))
    }

    fn squat(&self, handle: RawHandle) -> i32 {
        self.posture("squat", handle, Some(2))
    }

    fn sit(&self, handle: RawHandle) -> i32 {
        self.posture("sit", handle, Some(3))
    }

    fn zero_torque(&self, handle: RawHandle) -> i32 {
        self.posture("zero_torque", handle, Some(0))
    }

    fn stop_move(&self, handle: RawHandle) -> i32 {
        self.update("stop_move", handle, |s| {
            s.velocity = (0.0, 0.0, 0.0);
            s.velocity_duration = 0.0;
        })
    }

    fn high_stand(&self, handle: RawHandle) -> i32 {
        self.posture("high_stand", handle, None)
    }

    fn low_stand(&self, handle: RawHandle) -> i32 {
        self.posture("low_stand", handle, None)
    }

    fn balance_stand(&self, handle: RawHandle) -> i32 {
        self.posture("balance_stand", handle, None)
    }

    fn continuous_gait(&self, handle: RawHandle, enable: bool) -> i32 {
        self.update("continuous_gait", handle, |s| s.continuous_gait = enable)
    }

    fn switch_move_mode(&self, handle: RawHandle, continuous: bool) -> i32 {
        self.update("switch_move_mode", handle, |s| s.continuous_move = continuous)
    }

    fn move_robot(&self, handle: RawHandle, vx: f32, vy: f32, vyaw: f32) -> i32 {
        self.update("move", handle, |s| s.velocity = (vx, vy, vyaw))
    }

    fn wave_hand(&self, handle: RawHandle, turn: bool) -> i32 {
        self.update("wave_hand", handle, |s| s.task_id = i32::from(turn))
    }

    fn shake_hand(&self, handle: RawHandle, stage: i32) -> i32 {
        self.update("shake_hand", handle, |s| {
            // Stage -1 alternates between reaching out (2) and withdrawing (3).
            s.task_id = match stage {
                0 => 2,
                1 => 3,
                _ if s.task_id == 2 => 3,
                _ => 2,
            };
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Arm stub
// ────────────────────────────────────────────────────────────────────────────

/// Simulated `libg1_arm_wrapper`.
#[derive(Debug)]
pub struct SimArm {
    harness: SimHarness,
    executed: Mutex<Vec<i32>>,
    action_list: Mutex<Option<String>>,
}

impl SimArm {
    /// A stub whose action list reports the built-in gesture table.
    pub fn new() -> Self {
        let list = serde_json::json!({
            "actions": gestures::GESTURES
                .iter()
                .map(|g| serde_json::json!({"name": g.name, "id": g.id}))
                .collect::<Vec<_>>()
        });
        Self {
            harness: SimHarness::new(Domain::Arm),
            executed: Mutex::new(Vec::new()),
            action_list: Mutex::new(Some(list.to_string())),
        }
    }

    pub fn with_null_create(self) -> Self {
        self.harness.set_null_create(true);
        self
    }

    pub fn with_init_code(self, code: i32) -> Self {
        self.harness.set_fault("init", code);
        self
    }

    pub fn with_fault(self, op: &'static str, code: i32) -> Self {
        self.harness.set_fault(op, code);
        self
    }

    /// Replace the raw list returned by `get_action_list`.
    pub fn with_action_list(self, list: Option<String>) -> Self {
        *self.action_list.lock() = list;
        self
    }

    /// Ids passed to successful `execute_action` calls, in order.
    pub fn executed(&self) -> Vec<i32> {
        self.executed.lock().clone()
    }
}

impl Default for SimArm {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SimArm {
    type Target = SimHarness;

    fn deref(&self) -> &SimHarness {
        &self.harness
    }
}

impl NativeSession for SimArm {
    fn domain(&self) -> Domain {
        Domain::Arm
    }

    fn create(&self, interface: &str) -> Option<RawHandle> {
        self.harness.create(interface)
    }

    fn destroy(&self, handle: RawHandle) {
        self.harness.destroy(handle);
    }

    fn init(&self, handle: RawHandle) -> i32 {
        self.harness.run("init", handle, || 0)
    }

    fn set_timeout(&self, handle: RawHandle, _seconds: f32) -> i32 {
        self.harness.run("set_timeout", handle, || 0)
    }
}

impl ArmNative for SimArm {
    fn execute_action(&self, handle: RawHandle, action_id: i32) -> i32 {
        self.harness.run("execute_action", handle, || {
            self.executed.lock().push(action_id);
            0
        })
    }

    fn get_action_list(&self, handle: RawHandle) -> NativeReply<Option<String>> {
        self.harness
            .query("get_action_list", handle, || self.action_list.lock().clone(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_tracked() {
        let sim = SimLoco::new();
        let a = NativeSession::create(&sim, "eth0").unwrap();
        let b = NativeSession::create(&sim, "eth0").unwrap();
        assert_ne!(a, b);
        assert_eq!(sim.live_handles(), 2);
        NativeSession::destroy(&sim, a);
        NativeSession::destroy(&sim, a);
        assert_eq!(sim.destroyed(), 1);
        assert_eq!(sim.live_handles(), 1);
    }

    #[test]
    fn dead_handle_calls_fail() {
        let sim = SimLoco::new();
        let handle = NativeSession::create(&sim, "eth0").unwrap();
        NativeSession::destroy(&sim, handle);
        assert_eq!(sim.sit(handle), -1);
        assert_eq!(sim.get_fsm_id(handle).code, -1);
    }

    #[test]
    fn injected_code_replaces_effect() {
        let sim = SimLoco::new().with_fault("set_fsm_id", 3106);
        let handle = NativeSession::create(&sim, "eth0").unwrap();
        assert_eq!(sim.set_fsm_id(handle, 801), 3106);
        assert_eq!(sim.snapshot().fsm_id, 0);
        sim.clear_faults();
        assert_eq!(sim.set_fsm_id(handle, 801), 0);
        assert_eq!(sim.get_fsm_id(handle), NativeReply { code: 0, value: 801 });
    }

    #[test]
    fn journal_pairs_enter_and_exit() {
        let sim = SimLoco::new();
        let handle = NativeSession::create(&sim, "eth0").unwrap();
        sim.stop_move(handle);
        let journal = sim.journal();
        assert_eq!(
            &journal[journal.len() - 2..],
            &[SimCall::Enter("stop_move"), SimCall::Exit("stop_move")]
        );
        assert!(sim.calls_serialized());
    }

    #[test]
    fn shake_hand_toggles_stage() {
        let sim = SimLoco::new();
        let handle = NativeSession::create(&sim, "eth0").unwrap();
        sim.shake_hand(handle, -1);
        assert_eq!(sim.snapshot().task_id, 2);
        sim.shake_hand(handle, -1);
        assert_eq!(sim.snapshot().task_id, 3);
    }

    #[test]
    fn arm_lists_builtin_gestures() {
        let sim = SimArm::new();
        let handle = NativeSession::create(&sim, "eth0").unwrap();
        let reply = sim.get_action_list(handle);
        assert_eq!(reply.code, 0);
        assert!(reply.value.unwrap().contains("shake_hand"));
    }
}
