//! [`Dispatcher`] – joystick frames to at most one locomotion command.
//!
//! The mapping table is an ordered list of [`MappingEntry`]s.  Each frame is
//! resolved against it with [`resolve`], a pure first-match scan: the first
//! entry whose binding matches is the only one that fires.  An index past the
//! end of a short or missing array simply does not match.
//!
//! Fail-safes, applied on every frame:
//!
//! - no entry matches → `set_velocity(0, 0, 0, 0)`;
//! - the chosen command fails or panics → `stop_move`.
//!
//! Neither path lets an error escape [`Dispatcher::handle_frame`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use g1bridge_hal::{LocoExecutor, LocoOp};
use g1bridge_middleware::TopicPublisher;
use g1bridge_types::{BridgeError, Event, EventPayload, InputChannel, JoyFrame};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

const SOURCE: &str = "g1bridge-kernel::dispatcher";

// ────────────────────────────────────────────────────────────────────────────
// Mapping table
// ────────────────────────────────────────────────────────────────────────────

/// One `(channel, index, expected value)` predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binding {
    pub channel: InputChannel,
    pub index: usize,
    pub value: f32,
}

impl Binding {
    pub const fn axis(index: usize, value: f32) -> Self {
        Self {
            channel: InputChannel::Axis,
            index,
            value,
        }
    }

    pub const fn button(index: usize) -> Self {
        Self {
            channel: InputChannel::Button,
            index,
            value: 1.0,
        }
    }

    /// Exact comparison; `NaN` and out-of-range indices never match.
    pub fn matches(&self, frame: &JoyFrame) -> bool {
        frame
            .channel(self.channel)
            .get(self.index)
            .is_some_and(|v| *v == self.value)
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] = {}", self.channel, self.index, self.value)
    }
}

/// Default linear and angular speed used by the motion commands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionDefaults {
    /// m/s
    pub linear: f32,
    /// rad/s
    pub angular: f32,
}

impl Default for MotionDefaults {
    fn default() -> Self {
        Self {
            linear: 0.3,
            angular: 0.5,
        }
    }
}

/// Logical command bound to a mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoyCommand {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    TurnLeft,
    TurnRight,
    StopMotion,
    SitDown,
    StandUp,
    EnableMotion,
    SetFsm(i32),
    WaveHand,
    ShakeHand,
    Damp,
    ZeroTorque,
    Squat,
    BalanceStand,
    MoveMode(bool),
    HighStand,
    LowStand,
}

impl JoyCommand {
    /// The locomotion operation this command issues.
    pub fn to_op(self, speed: &MotionDefaults) -> LocoOp {
        let (v, w) = (speed.linear, speed.angular);
        let walk = |vx, vy, vyaw| LocoOp::Move { vx, vy, vyaw };
        match self {
            JoyCommand::MoveForward => walk(v, 0.0, 0.0),
            JoyCommand::MoveBackward => walk(-v, 0.0, 0.0),
            JoyCommand::MoveLeft => walk(0.0, v, 0.0),
            JoyCommand::MoveRight => walk(0.0, -v, 0.0),
            JoyCommand::TurnLeft => walk(0.0, 0.0, w),
            JoyCommand::TurnRight => walk(0.0, 0.0, -w),
            JoyCommand::StopMotion => LocoOp::StopMove,
            JoyCommand::SitDown => LocoOp::Sit,
            JoyCommand::StandUp => LocoOp::StandUp,
            JoyCommand::EnableMotion => LocoOp::Start,
            JoyCommand::SetFsm(id) => LocoOp::SetFsmId(id),
            JoyCommand::WaveHand => LocoOp::WaveHand { turn: false },
            JoyCommand::ShakeHand => LocoOp::ShakeHand { stage: -1 },
            JoyCommand::Damp => LocoOp::Damp,
            JoyCommand::ZeroTorque => LocoOp::ZeroTorque,
            JoyCommand::Squat => LocoOp::Squat,
            JoyCommand::BalanceStand => LocoOp::BalanceStand,
            JoyCommand::MoveMode(continuous) => LocoOp::SwitchMoveMode(continuous),
            JoyCommand::HighStand => LocoOp::HighStand,
            JoyCommand::LowStand => LocoOp::LowStand,
        }
    }
}

/// One row of the mapping table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappingEntry {
    pub binding: Binding,
    pub command: JoyCommand,
    pub description: &'static str,
}

const fn entry(binding: Binding, command: JoyCommand, description: &'static str) -> MappingEntry {
    MappingEntry {
        binding,
        command,
        description,
    }
}

/// Gamepad layout of the G1 teleoperation console, in priority order.
pub const DEFAULT_MAPPING: &[MappingEntry] = &[
    entry(Binding::axis(1, 1.0), JoyCommand::MoveBackward, "Move Backward"),
    entry(Binding::axis(1, -1.0), JoyCommand::MoveForward, "Move Forward"),
    entry(Binding::axis(0, 1.0), JoyCommand::MoveRight, "Move Right"),
    entry(Binding::axis(0, -1.0), JoyCommand::MoveLeft, "Move Left"),
    entry(Binding::button(1), JoyCommand::TurnRight, "Turn Right"),
    entry(Binding::button(2), JoyCommand::TurnLeft, "Turn Left"),
    entry(Binding::button(3), JoyCommand::StopMotion, "Stop Motion"),
    entry(Binding::button(4), JoyCommand::SitDown, "Sit Down"),
    entry(Binding::button(5), JoyCommand::StandUp, "Stand Up"),
    entry(Binding::button(0), JoyCommand::EnableMotion, "Enable Motion"),
    entry(Binding::button(6), JoyCommand::SetFsm(1), "Set FSM ID 1"),
    entry(Binding::button(7), JoyCommand::SetFsm(4), "Set FSM ID 4"),
    entry(Binding::button(8), JoyCommand::SetFsm(500), "Set FSM ID 500"),
    entry(Binding::button(9), JoyCommand::SetFsm(801), "Set FSM ID 801"),
    entry(Binding::button(10), JoyCommand::WaveHand, "Wave Hand"),
    entry(Binding::button(11), JoyCommand::ShakeHand, "Shake Hand"),
    entry(Binding::button(12), JoyCommand::Damp, "Damp Mode"),
    entry(Binding::button(13), JoyCommand::ZeroTorque, "Zero Torque"),
    entry(Binding::button(14), JoyCommand::Squat, "Squat"),
    entry(Binding::button(15), JoyCommand::BalanceStand, "Balance Stand"),
    entry(Binding::axis(2, 1.0), JoyCommand::MoveMode(true), "Switch Move Mode ON"),
    entry(Binding::axis(2, -1.0), JoyCommand::MoveMode(false), "Switch Move Mode OFF"),
    entry(Binding::axis(3, 1.0), JoyCommand::HighStand, "High Stand"),
    entry(Binding::axis(3, -1.0), JoyCommand::LowStand, "Low Stand"),
];

/// First entry of `table` whose binding matches `frame`.
pub fn resolve<'t>(table: &'t [MappingEntry], frame: &JoyFrame) -> Option<&'t MappingEntry> {
    table.iter().find(|entry| entry.binding.matches(frame))
}

// ────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    Dispatching,
}

/// Why a chosen command did not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum FailReason {
    Error(BridgeError),
    Panicked(String),
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::Error(err) => write!(f, "{err}"),
            FailReason::Panicked(msg) => write!(f, "driver panicked: {msg}"),
        }
    }
}

/// Result of one [`Dispatcher::handle_frame`] pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Executed {
        description: &'static str,
        op: LocoOp,
    },
    /// The command failed; `stop_move` was issued afterwards.
    Failed {
        description: &'static str,
        op: LocoOp,
        reason: FailReason,
    },
    /// Nothing matched; zero velocity was commanded.
    NoMatch,
}

/// Applies the mapping table to incoming frames.
pub struct Dispatcher {
    loco: Arc<LocoExecutor>,
    table: Vec<MappingEntry>,
    speed: MotionDefaults,
    state: Mutex<DispatchState>,
    alerts: Option<TopicPublisher>,
}

impl Dispatcher {
    /// Dispatcher over [`DEFAULT_MAPPING`].
    pub fn new(loco: Arc<LocoExecutor>, speed: MotionDefaults) -> Self {
        Self::with_table(loco, speed, DEFAULT_MAPPING.to_vec())
    }

    pub fn with_table(loco: Arc<LocoExecutor>, speed: MotionDefaults, table: Vec<MappingEntry>) -> Self {
        Self {
            loco,
            table,
            speed,
            state: Mutex::new(DispatchState::Idle),
            alerts: None,
        }
    }

    /// Publish command faults on `alerts`.
    pub fn with_alerts(mut self, alerts: TopicPublisher) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn table(&self) -> &[MappingEntry] {
        &self.table
    }

    pub fn state(&self) -> DispatchState {
        *self.state.lock()
    }

    /// One human-readable line per mapping entry, in priority order.
    pub fn describe_mappings(&self) -> Vec<String> {
        self.table
            .iter()
            .map(|e| format!("{} → {}", e.binding, e.description))
            .collect()
    }

    /// Resolve `frame` and execute at most one command.
    pub fn handle_frame(&self, frame: &JoyFrame) -> DispatchOutcome {
        let Some(entry) = resolve(&self.table, frame) else {
            debug!("no mapping matched; commanding zero velocity");
            self.fail_safe(LocoOp::SetVelocity {
                vx: 0.0,
                vy: 0.0,
                omega: 0.0,
                duration: 0.0,
            });
            return DispatchOutcome::NoMatch;
        };

        let op = entry.command.to_op(&self.speed);
        let description = entry.description;
        info!(description, %op, "dispatching");

        *self.state.lock() = DispatchState::Dispatching;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.loco.execute(op)));
        let outcome = match result {
            Ok(Ok(_)) => DispatchOutcome::Executed { description, op },
            Ok(Err(err)) => {
                match &err {
                    BridgeError::NotConnected(_) => warn!(description, "skipped: locomotion not connected"),
                    other => warn!(description, error = %other, "command failed"),
                }
                self.report(&err);
                self.fail_safe(LocoOp::StopMove);
                DispatchOutcome::Failed {
                    description,
                    op,
                    reason: FailReason::Error(err),
                }
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(description, panic = %msg, "command panicked");
                self.fail_safe(LocoOp::StopMove);
                DispatchOutcome::Failed {
                    description,
                    op,
                    reason: FailReason::Panicked(msg),
                }
            }
        };
        *self.state.lock() = DispatchState::Idle;
        outcome
    }

    /// Best-effort safety command; failures are logged only.
    fn fail_safe(&self, op: LocoOp) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.loco.execute(op))) {
            Ok(Ok(_)) => debug!(%op, "fail-safe applied"),
            Ok(Err(err)) => warn!(%op, error = %err, "fail-safe command failed"),
            Err(payload) => error!(%op, panic = %panic_message(payload.as_ref()), "fail-safe command panicked"),
        }
    }

    fn report(&self, err: &BridgeError) {
        let (Some(alerts), BridgeError::NativeFault { domain, op, code, category }) = (&self.alerts, err) else {
            return;
        };
        let event = Event::new(
            SOURCE,
            EventPayload::CommandFault {
                domain: *domain,
                command: op.clone(),
                code: *code,
                category: *category,
            },
        );
        if let Err(e) = alerts.publish(event) {
            debug!(error = %e, "fault alert not delivered");
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
