//! Command Executor – typed, serialised commands over a live connection.
//!
//! Every operation resolves its handle through
//! [`Connection::with_handle`], so commands on one domain never interleave
//! and a disconnected domain fails fast with
//! [`BridgeError::NotConnected`] without touching the native layer.  Only
//! code `0` counts as success; anything else becomes a
//! [`BridgeError::NativeFault`] carrying the translated category.
//!
//! Locomotion commands can also be issued as data through [`LocoOp`], which
//! is what the input dispatcher binds its mapping table to.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use g1bridge_types::{BridgeError, Domain};
use tracing::{debug, warn};

use crate::connection::{ARM_DEFAULT_TIMEOUT, Connection, LOCO_DEFAULT_TIMEOUT};
use crate::gestures;
use crate::native::{ArmNative, LocoNative, NativeReply, RawHandle};

/// Default `duration` argument of [`LocoExecutor::set_velocity`], seconds.
pub const DEFAULT_VELOCITY_DURATION: f32 = 1.0;

fn check(domain: Domain, op: &str, code: i32) -> Result<(), BridgeError> {
    if code == 0 {
        debug!(%domain, op, "ok");
        Ok(())
    } else {
        let err = BridgeError::native(domain, op, code);
        warn!(%domain, op, code, error = %err, "native call failed");
        Err(err)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Locomotion
// ────────────────────────────────────────────────────────────────────────────

/// A locomotion command expressed as data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocoOp {
    Move { vx: f32, vy: f32, vyaw: f32 },
    SetVelocity { vx: f32, vy: f32, omega: f32, duration: f32 },
    StopMove,
    Start,
    StandUp,
    Sit,
    Squat,
    Damp,
    ZeroTorque,
    HighStand,
    LowStand,
    BalanceStand,
    SetFsmId(i32),
    SetBalanceMode(i32),
    SetSwingHeight(f32),
    SetStandHeight(f32),
    SetSpeedMode(i32),
    SetTaskId(i32),
    ContinuousGait(bool),
    SwitchMoveMode(bool),
    WaveHand { turn: bool },
    ShakeHand { stage: i32 },
    GetFsmId,
    GetFsmMode,
    GetBalanceMode,
    GetSwingHeight,
    GetStandHeight,
}

impl LocoOp {
    /// Native operation name, as used in logs and fault reports.
    pub fn name(&self) -> &'static str {
        match self {
            LocoOp::Move { .. } => "move",
            LocoOp::SetVelocity { .. } => "set_velocity",
            LocoOp::StopMove => "stop_move",
            LocoOp::Start => "start",
            LocoOp::StandUp => "stand_up",
            LocoOp::Sit => "sit",
            LocoOp::Squat => "squat",
            LocoOp::Damp => "damp",
            LocoOp::ZeroTorque => "zero_torque",
            LocoOp::HighStand => "high_stand",
            LocoOp::LowStand => "low_stand",
            LocoOp::BalanceStand => "balance_stand",
            LocoOp::SetFsmId(_) => "set_fsm_id",
            LocoOp::SetBalanceMode(_) => "set_balance_mode",
            LocoOp::SetSwingHeight(_) => "set_swing_height",
            LocoOp::SetStandHeight(_) => "set_stand_height",
            LocoOp::SetSpeedMode(_) => "set_speed_mode",
            LocoOp::SetTaskId(_) => "set_task_id",
            LocoOp::ContinuousGait(_) => "continuous_gait",
            LocoOp::SwitchMoveMode(_) => "switch_move_mode",
            LocoOp::WaveHand { .. } => "wave_hand",
            LocoOp::ShakeHand { .. } => "shake_hand",
            LocoOp::GetFsmId => "get_fsm_id",
            LocoOp::GetFsmMode => "get_fsm_mode",
            LocoOp::GetBalanceMode => "get_balance_mode",
            LocoOp::GetSwingHeight => "get_swing_height",
            LocoOp::GetStandHeight => "get_stand_height",
        }
    }
}

impl fmt::Display for LocoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocoOp::Move { vx, vy, vyaw } => write!(f, "move({vx}, {vy}, {vyaw})"),
            LocoOp::SetVelocity { vx, vy, omega, duration } => {
                write!(f, "set_velocity({vx}, {vy}, {omega}, {duration})")
            }
            LocoOp::SetFsmId(v) | LocoOp::SetBalanceMode(v) | LocoOp::SetSpeedMode(v) | LocoOp::SetTaskId(v) => {
                write!(f, "{}({v})", self.name())
            }
            LocoOp::SetSwingHeight(v) | LocoOp::SetStandHeight(v) => write!(f, "{}({v})", self.name()),
            LocoOp::ContinuousGait(v) | LocoOp::SwitchMoveMode(v) => write!(f, "{}({v})", self.name()),
            LocoOp::WaveHand { turn } => write!(f, "wave_hand({turn})"),
            LocoOp::ShakeHand { stage } => write!(f, "shake_hand({stage})"),
            other => write!(f, "{}()", other.name()),
        }
    }
}

/// Value returned by [`LocoExecutor::execute`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Done,
    Int(i32),
    Float(f32),
}

/// Locomotion command surface over one [`Connection`].
pub struct LocoExecutor {
    conn: Connection<dyn LocoNative>,
}

impl LocoExecutor {
    /// Executor on `interface` with the default 3 s command timeout.
    pub fn new(driver: Arc<dyn LocoNative>, interface: &str) -> Self {
        Self::with_timeout(driver, interface, LOCO_DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(driver: Arc<dyn LocoNative>, interface: &str, timeout: Duration) -> Self {
        Self {
            conn: Connection::new(driver, interface, timeout),
        }
    }

    pub fn connect(&self) -> Result<(), BridgeError> {
        self.conn.connect()
    }

    pub fn disconnect(&self) {
        self.conn.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn connection(&self) -> &Connection<dyn LocoNative> {
        &self.conn
    }

    fn command(
        &self,
        op: &'static str,
        call: impl FnOnce(&dyn LocoNative, RawHandle) -> i32,
    ) -> Result<(), BridgeError> {
        let code = self.conn.with_handle(|d, h| call(d, h))?;
        check(Domain::Locomotion, op, code)
    }

    fn query<T>(
        &self,
        op: &'static str,
        call: impl FnOnce(&dyn LocoNative, RawHandle) -> NativeReply<T>,
    ) -> Result<T, BridgeError> {
        let reply = self.conn.with_handle(|d, h| call(d, h))?;
        check(Domain::Locomotion, op, reply.code)?;
        Ok(reply.value)
    }

    /// Run `op` and wrap its result.
    pub fn execute(&self, op: LocoOp) -> Result<Reply, BridgeError> {
        let done = |r: Result<(), BridgeError>| r.map(|()| Reply::Done);
        match op {
            LocoOp::Move { vx, vy, vyaw } => done(self.move_robot(vx, vy, vyaw)),
            LocoOp::SetVelocity { vx, vy, omega, duration } => done(self.set_velocity(vx, vy, omega, duration)),
            LocoOp::StopMove => done(self.stop_move()),
            LocoOp::Start => done(self.start()),
            LocoOp::StandUp => done(self.stand_up()),
            LocoOp::Sit => done(self.sit()),
            LocoOp::Squat => done(self.squat()),
            LocoOp::Damp => done(self.damp()),
            LocoOp::ZeroTorque => done(self.zero_torque()),
            LocoOp::HighStand => done(self.high_stand()),
            LocoOp::LowStand => done(self.low_stand()),
            LocoOp::BalanceStand => done(self.balance_stand()),
            LocoOp::SetFsmId(id) => done(self.set_fsm_id(id)),
            LocoOp::SetBalanceMode(mode) => done(self.set_balance_mode(mode)),
            LocoOp::SetSwingHeight(h) => done(self.set_swing_height(h)),
            LocoOp::SetStandHeight(h) => done(self.set_stand_height(h)),
            LocoOp::SetSpeedMode(mode) => done(self.set_speed_mode(mode)),
            LocoOp::SetTaskId(id) => done(self.set_task_id(id)),
            LocoOp::ContinuousGait(enable) => done(self.continuous_gait(enable)),
            LocoOp::SwitchMoveMode(continuous) => done(self.switch_move_mode(continuous)),
            LocoOp::WaveHand { turn } => done(self.wave_hand(turn)),
            LocoOp::ShakeHand { stage } => done(self.shake_hand(stage)),
            LocoOp::GetFsmId => self.fsm_id().map(Reply::Int),
            LocoOp::GetFsmMode => self.fsm_mode().map(Reply::Int),
            LocoOp::GetBalanceMode => self.balance_mode().map(Reply::Int),
            LocoOp::GetSwingHeight => self.swing_height().map(Reply::Float),
            LocoOp::GetStandHeight => self.stand_height().map(Reply::Float),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    pub fn fsm_id(&self) -> Result<i32, BridgeError> {
        self.query("get_fsm_id", |d, h| d.get_fsm_id(h))
    }

    pub fn fsm_mode(&self) -> Result<i32, BridgeError> {
        self.query("get_fsm_mode", |d, h| d.get_fsm_mode(h))
    }

    pub fn balance_mode(&self) -> Result<i32, BridgeError> {
        self.query("get_balance_mode", |d, h| d.get_balance_mode(h))
    }

    pub fn swing_height(&self) -> Result<f32, BridgeError> {
        self.query("get_swing_height", |d, h| d.get_swing_height(h))
    }

    pub fn stand_height(&self) -> Result<f32, BridgeError> {
        self.query("get_stand_height", |d, h| d.get_stand_height(h))
    }

    // ── Parameters ──────────────────────────────────────────────────────────

    pub fn set_fsm_id(&self, fsm_id: i32) -> Result<(), BridgeError> {
        self.command("set_fsm_id", |d, h| d.set_fsm_id(h, fsm_id))
    }

    pub fn set_balance_mode(&self, mode: i32) -> Result<(), BridgeError> {
        self.command("set_balance_mode", |d, h| d.set_balance_mode(h, mode))
    }

    pub fn set_swing_height(&self, height: f32) -> Result<(), BridgeError> {
        self.command("set_swing_height", |d, h| d.set_swing_height(h, height))
    }

    pub fn set_stand_height(&self, height: f32) -> Result<(), BridgeError> {
        self.command("set_stand_height", |d, h| d.set_stand_height(h, height))
    }

    /// Command a body velocity held for `duration` seconds
    /// (see [`DEFAULT_VELOCITY_DURATION`]).
    pub fn set_velocity(&self, vx: f32, vy: f32, omega: f32, duration: f32) -> Result<(), BridgeError> {
        self.command("set_velocity", |d, h| d.set_velocity(h, vx, vy, omega, duration))
    }

    pub fn set_task_id(&self, task_id: i32) -> Result<(), BridgeError> {
        self.command("set_task_id", |d, h| d.set_task_id(h, task_id))
    }

    pub fn set_speed_mode(&self, mode: i32) -> Result<(), BridgeError> {
        self.command("set_speed_mode", |d, h| d.set_speed_mode(h, mode))
    }

    // ── Postures and motion ─────────────────────────────────────────────────

    pub fn damp(&self) -> Result<(), BridgeError> {
        self.command("damp", |d, h| d.damp(h))
    }

    pub fn start(&self) -> Result<(), BridgeError> {
        self.command("start", |d, h| d.start(h))
    }

    pub fn stand_up(&self) -> Result<(), BridgeError> {
        self.command("stand_up", |d, h| d.stand_up(h))
    }

    pub fn squat(&self) -> Result<(), BridgeError> {
        self.command("squat", |d, h| d.squat(h))
    }

    pub fn sit(&self) -> Result<(), BridgeError> {
        self.command("sit", |d, h| d.sit(h))
    }

    pub fn zero_torque(&self) -> Result<(), BridgeError> {
        self.command("zero_torque", |d, h| d.zero_torque(h))
    }

    pub fn stop_move(&self) -> Result<(), BridgeError> {
        self.command("stop_move", |d, h| d.stop_move(h))
    }

    pub fn high_stand(&self) -> Result<(), BridgeError> {
        self.command("high_stand", |d, h| d.high_stand(h))
    }

    pub fn low_stand(&self) -> Result<(), BridgeError> {
        self.command("low_stand", |d, h| d.low_stand(h))
    }

    pub fn balance_stand(&self) -> Result<(), BridgeError> {
        self.command("balance_stand", |d, h| d.balance_stand(h))
    }

    pub fn continuous_gait(&self, enable: bool) -> Result<(), BridgeError> {
        self.command("continuous_gait", |d, h| d.continuous_gait(h, enable))
    }

    pub fn switch_move_mode(&self, continuous: bool) -> Result<(), BridgeError> {
        self.command("switch_move_mode", |d, h| d.switch_move_mode(h, continuous))
    }

    pub fn move_robot(&self, vx: f32, vy: f32, vyaw: f32) -> Result<(), BridgeError> {
        self.command("move", |d, h| d.move_robot(h, vx, vy, vyaw))
    }

    pub fn wave_hand(&self, turn: bool) -> Result<(), BridgeError> {
        self.command("wave_hand", |d, h| d.wave_hand(h, turn))
    }

    /// `stage` 0 reaches out, 1 withdraws, -1 toggles.
    pub fn shake_hand(&self, stage: i32) -> Result<(), BridgeError> {
        self.command("shake_hand", |d, h| d.shake_hand(h, stage))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Arm
// ────────────────────────────────────────────────────────────────────────────

/// Arm gesture surface over one [`Connection`].
pub struct ArmExecutor {
    conn: Connection<dyn ArmNative>,
}

impl ArmExecutor {
    /// Executor on `interface` with the default 10 s command timeout.
    pub fn new(driver: Arc<dyn ArmNative>, interface: &str) -> Self {
        Self::with_timeout(driver, interface, ARM_DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(driver: Arc<dyn ArmNative>, interface: &str, timeout: Duration) -> Self {
        Self {
            conn: Connection::new(driver, interface, timeout),
        }
    }

    pub fn connect(&self) -> Result<(), BridgeError> {
        self.conn.connect()
    }

    pub fn disconnect(&self) {
        self.conn.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn connection(&self) -> &Connection<dyn ArmNative> {
        &self.conn
    }

    /// Run the gesture with firmware id `action_id`.
    pub fn execute_action(&self, action_id: i32) -> Result<(), BridgeError> {
        let code = self.conn.with_handle(|d, h| d.execute_action(h, action_id))?;
        check(Domain::Arm, "execute_action", code)
    }

    /// Run a gesture from the built-in catalogue by name and return its id.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownCommand`] for a name outside the catalogue; the
    /// native layer is not called in that case.
    pub fn execute_action_by_name(&self, name: &str) -> Result<i32, BridgeError> {
        let id = gestures::gesture_id(name).ok_or_else(|| BridgeError::UnknownCommand {
            name: name.to_string(),
            available: gestures::gesture_names().into_iter().map(str::to_string).collect(),
        })?;
        self.execute_action(id)?;
        Ok(id)
    }

    /// The raw action list reported by the firmware; empty when the
    /// firmware returns no document.
    pub fn list_actions(&self) -> Result<String, BridgeError> {
        let reply = self.conn.with_handle(|d, h| d.get_action_list(h))?;
        check(Domain::Arm, "get_action_list", reply.code)?;
        Ok(reply.value.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use g1bridge_types::ErrorCategory;

    use super::*;
    use crate::sim::{SimArm, SimLoco};

    fn loco(sim: &Arc<SimLoco>) -> LocoExecutor {
        let exec = LocoExecutor::new(sim.clone() as Arc<dyn LocoNative>, "eth0");
        exec.connect().unwrap();
        exec
    }

    fn arm(sim: &Arc<SimArm>) -> ArmExecutor {
        let exec = ArmExecutor::new(sim.clone() as Arc<dyn ArmNative>, "eth0");
        exec.connect().unwrap();
        exec
    }

    #[test]
    fn stand_height_round_trip() {
        let sim = Arc::new(SimLoco::new());
        let exec = loco(&sim);
        exec.set_stand_height(0.55).unwrap();
        assert!((exec.stand_height().unwrap() - 0.55).abs() < f32::EPSILON);
    }

    #[test]
    fn nonzero_code_becomes_native_fault() {
        let sim = Arc::new(SimLoco::new().with_fault("stop_move", 3107));
        let exec = loco(&sim);
        let err = exec.stop_move().unwrap_err();
        assert_eq!(
            err,
            BridgeError::NativeFault {
                domain: Domain::Locomotion,
                op: "stop_move".to_string(),
                code: 3107,
                category: ErrorCategory::EmergencyStop,
            }
        );
    }

    #[test]
    fn positive_code_is_a_failure() {
        let sim = Arc::new(SimLoco::new().with_fault("get_fsm_id", 1));
        let exec = loco(&sim);
        assert!(matches!(
            exec.fsm_id(),
            Err(BridgeError::NativeFault { category: ErrorCategory::Unknown(1), .. })
        ));
    }

    #[test]
    fn commands_before_connect_are_rejected() {
        let sim = Arc::new(SimLoco::new());
        let exec = LocoExecutor::new(sim.clone() as Arc<dyn LocoNative>, "eth0");
        assert_eq!(exec.sit(), Err(BridgeError::NotConnected(Domain::Locomotion)));
        assert_eq!(sim.calls("sit"), 0);
    }

    #[test]
    fn execute_dispatches_ops_as_data() {
        let sim = Arc::new(SimLoco::new());
        let exec = loco(&sim);
        assert_eq!(exec.execute(LocoOp::SetFsmId(801)).unwrap(), Reply::Done);
        assert_eq!(exec.execute(LocoOp::GetFsmId).unwrap(), Reply::Int(801));
        exec.execute(LocoOp::Move { vx: 0.3, vy: 0.0, vyaw: 0.0 }).unwrap();
        assert_eq!(sim.snapshot().velocity, (0.3, 0.0, 0.0));
        assert_eq!(LocoOp::Move { vx: 0.3, vy: 0.0, vyaw: 0.0 }.name(), "move");
        assert_eq!(LocoOp::StopMove.to_string(), "stop_move()");
    }

    #[test]
    fn concurrent_commands_never_interleave() {
        let sim = Arc::new(SimLoco::new().with_latency(Duration::from_millis(2)));
        let exec = Arc::new(loco(&sim));

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let exec = exec.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        if i % 2 == 0 {
                            let _ = exec.move_robot(0.1, 0.0, 0.0);
                        } else {
                            let _ = exec.fsm_id();
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(sim.calls_serialized());
        assert_eq!(sim.calls("move"), 10);
        assert_eq!(sim.calls("get_fsm_id"), 10);
    }

    #[test]
    fn disconnect_waits_for_in_flight_command() {
        let sim = Arc::new(SimLoco::new().with_latency(Duration::from_millis(30)));
        let exec = Arc::new(loco(&sim));

        let worker = {
            let exec = exec.clone();
            thread::spawn(move || exec.sit())
        };
        while sim.calls("sit") == 0 {
            thread::yield_now();
        }
        exec.disconnect();

        assert!(worker.join().unwrap().is_ok());
        assert!(sim.calls_serialized());
        assert_eq!(sim.live_handles(), 0);
    }

    #[test]
    fn shake_hand_by_name_runs_id_27() {
        let sim = Arc::new(SimArm::new());
        let exec = arm(&sim);
        assert_eq!(exec.execute_action_by_name("shake_hand").unwrap(), 27);
        assert_eq!(sim.executed(), vec![27]);
    }

    #[test]
    fn unknown_gesture_never_reaches_native() {
        let sim = Arc::new(SimArm::new());
        let exec = arm(&sim);
        let err = exec.execute_action_by_name("moonwalk").unwrap_err();
        match err {
            BridgeError::UnknownCommand { name, available } => {
                assert_eq!(name, "moonwalk");
                assert_eq!(available.len(), gestures::GESTURES.len());
                assert!(available.contains(&"shake_hand".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sim.calls("execute_action"), 0);
    }

    #[test]
    fn holding_object_is_translated() {
        let sim = Arc::new(SimArm::new().with_fault("execute_action", -6));
        let exec = arm(&sim);
        assert!(matches!(
            exec.execute_action(19),
            Err(BridgeError::NativeFault {
                domain: Domain::Arm,
                category: ErrorCategory::HoldingObject,
                ..
            })
        ));
    }

    #[test]
    fn missing_action_list_is_empty() {
        let sim = Arc::new(SimArm::new().with_action_list(None));
        let exec = arm(&sim);
        assert_eq!(exec.list_actions().unwrap(), "");
    }
}
