//! [`StatusPoller`] – background refresh of the robot status snapshot.
//!
//! One OS thread queries the FSM id through the locomotion executor at a
//! fixed period and stores the derived [`MotionState`] on a shared
//! [`StatusBoard`]:
//!
//! | Query result | Stored state |
//! |---|---|
//! | `Ok(id)` | [`MotionState::Fsm`] |
//! | [`BridgeError::NotConnected`] | [`MotionState::Disconnected`] |
//! | any other error | [`MotionState::Unknown`] |
//! | panic inside the driver | [`MotionState::Error`], cadence drops to degraded |
//!
//! The query runs before the board lock is taken, so readers never wait on a
//! native round-trip.  The loop never exits on error; it only stops when the
//! poller is stopped or dropped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use g1bridge_hal::LocoExecutor;
use g1bridge_middleware::TopicPublisher;
use g1bridge_types::{BridgeError, Event, EventPayload, MotionState, RobotIdentity, RobotStatus};
use parking_lot::RwLock;
use tracing::{debug, error, info, trace};

const SOURCE: &str = "g1bridge-kernel::poller";

/// Polling periods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollerConfig {
    /// Normal tick period (10 Hz).
    pub period: Duration,
    /// Back-off period after a panicking poll (1 Hz).
    pub degraded_period: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            degraded_period: Duration::from_millis(1000),
        }
    }
}

/// Which period the loop is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Normal,
    Degraded,
}

// ────────────────────────────────────────────────────────────────────────────
// Status board
// ────────────────────────────────────────────────────────────────────────────

/// Shared status snapshot.  Cheap to clone; all clones see the same state.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    inner: Arc<RwLock<RobotStatus>>,
}

impl StatusBoard {
    pub fn new(identity: RobotIdentity) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RobotStatus::new(identity))),
        }
    }

    /// Copy of the latest snapshot.
    pub fn snapshot(&self) -> RobotStatus {
        self.inner.read().clone()
    }

    pub fn motion_state(&self) -> MotionState {
        self.inner.read().motion_state
    }

    pub(crate) fn store(&self, state: MotionState) -> RobotStatus {
        let mut status = self.inner.write();
        status.motion_state = state;
        status.updated_at = Utc::now();
        status.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Poller
// ────────────────────────────────────────────────────────────────────────────

/// Derive the motion state from one FSM query.
pub fn poll_once(loco: &LocoExecutor) -> MotionState {
    match loco.fsm_id() {
        Ok(id) => MotionState::Fsm(id),
        Err(BridgeError::NotConnected(_)) => MotionState::Disconnected,
        Err(err) => {
            debug!(error = %err, "fsm query failed");
            MotionState::Unknown
        }
    }
}

/// Handle to the running poll thread.  Dropping it stops and joins the
/// thread.
pub struct StatusPoller {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    degraded: Arc<AtomicBool>,
}

impl StatusPoller {
    /// Start polling `loco` into `board`.  When `status_out` is given, every
    /// snapshot is also published there while it has subscribers.
    pub fn spawn(
        loco: Arc<LocoExecutor>,
        board: StatusBoard,
        config: PollerConfig,
        status_out: Option<TopicPublisher>,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let degraded = Arc::new(AtomicBool::new(false));

        let handle = {
            let shutdown = shutdown.clone();
            let degraded = degraded.clone();
            thread::Builder::new()
                .name("g1bridge-poller".to_string())
                .spawn(move || poll_loop(&loco, &board, config, status_out.as_ref(), &shutdown, &degraded))
        };

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(error = %err, "failed to spawn status poller thread");
                None
            }
        };

        Self {
            handle,
            shutdown,
            degraded,
        }
    }

    pub fn cadence(&self) -> Cadence {
        if self.degraded.load(Ordering::Acquire) {
            Cadence::Degraded
        } else {
            Cadence::Normal
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for the thread.  Idempotent.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
            info!("status poller stopped");
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    loco: &LocoExecutor,
    board: &StatusBoard,
    config: PollerConfig,
    status_out: Option<&TopicPublisher>,
    shutdown: &AtomicBool,
    degraded: &AtomicBool,
) {
    info!(period_ms = config.period.as_millis() as u64, "status poller started");

    while !shutdown.load(Ordering::Acquire) {
        let state = match panic::catch_unwind(AssertUnwindSafe(|| poll_once(loco))) {
            Ok(state) => {
                if degraded.swap(false, Ordering::AcqRel) {
                    info!("status poll recovered; back to normal cadence");
                }
                state
            }
            Err(_) => {
                if !degraded.swap(true, Ordering::AcqRel) {
                    error!(
                        period_ms = config.degraded_period.as_millis() as u64,
                        "status poll panicked; backing off"
                    );
                }
                MotionState::Error
            }
        };

        let snapshot = board.store(state);
        trace!(state = %snapshot.motion_state, "status updated");

        if let Some(out) = status_out
            && out.has_subscribers()
            && let Err(err) = out.publish(Event::new(SOURCE, EventPayload::Status(snapshot)))
        {
            debug!(error = %err, "status snapshot not delivered");
        }

        let period = if degraded.load(Ordering::Acquire) {
            config.degraded_period
        } else {
            config.period
        };
        thread::park_timeout(period);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use g1bridge_hal::LocoNative;
    use g1bridge_hal::sim::SimLoco;
    use g1bridge_middleware::{EventBus, Topic};

    use super::*;

    fn fast() -> PollerConfig {
        PollerConfig {
            period: Duration::from_millis(5),
            degraded_period: Duration::from_millis(50),
        }
    }

    fn executor(sim: &Arc<SimLoco>) -> Arc<LocoExecutor> {
        Arc::new(LocoExecutor::new(sim.clone() as Arc<dyn LocoNative>, "eth0"))
    }

    fn wait_for(board: &StatusBoard, want: MotionState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if board.motion_state() == want {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn poll_once_maps_query_results() {
        let sim = Arc::new(SimLoco::new());
        let loco = executor(&sim);
        assert_eq!(poll_once(&loco), MotionState::Disconnected);

        loco.connect().unwrap();
        loco.set_fsm_id(801).unwrap();
        assert_eq!(poll_once(&loco), MotionState::Fsm(801));

        sim.set_fault("get_fsm_id", 3105);
        assert_eq!(poll_once(&loco), MotionState::Unknown);
    }

    #[test]
    fn poller_tracks_fsm_changes() {
        let sim = Arc::new(SimLoco::new());
        let loco = executor(&sim);
        loco.connect().unwrap();
        let board = StatusBoard::new(RobotIdentity::default());
        let mut poller = StatusPoller::spawn(loco.clone(), board.clone(), fast(), None);

        assert!(wait_for(&board, MotionState::Fsm(0)));
        loco.set_fsm_id(500).unwrap();
        assert!(wait_for(&board, MotionState::Fsm(500)));

        loco.disconnect();
        assert!(wait_for(&board, MotionState::Disconnected));

        poller.stop();
        assert!(!poller.is_running());
    }

    #[test]
    fn panic_degrades_then_recovers() {
        let sim = Arc::new(SimLoco::new());
        let loco = executor(&sim);
        loco.connect().unwrap();
        sim.panic_on("get_fsm_id");

        let board = StatusBoard::new(RobotIdentity::default());
        let poller = StatusPoller::spawn(loco.clone(), board.clone(), fast(), None);

        assert!(wait_for(&board, MotionState::Error));
        assert_eq!(poller.cadence(), Cadence::Degraded);
        assert!(poller.is_running());

        sim.clear_faults();
        assert!(wait_for(&board, MotionState::Fsm(0)));
        assert_eq!(poller.cadence(), Cadence::Normal);
    }

    #[test]
    fn degraded_cadence_slows_polling() {
        let sim = Arc::new(SimLoco::new());
        let loco = executor(&sim);
        loco.connect().unwrap();
        sim.panic_on("get_fsm_id");

        let board = StatusBoard::new(RobotIdentity::default());
        let config = PollerConfig {
            period: Duration::from_millis(1),
            degraded_period: Duration::from_millis(200),
        };
        let _poller = StatusPoller::spawn(loco, board, config, None);
        thread::sleep(Duration::from_millis(300));

        let polls = sim.calls("get_fsm_id");
        assert!((1..=3).contains(&polls), "polled {polls} times while degraded");
    }

    #[test]
    fn snapshots_are_published_when_subscribed() {
        let sim = Arc::new(SimLoco::new());
        let loco = executor(&sim);
        loco.connect().unwrap();

        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Status);
        let board = StatusBoard::new(RobotIdentity::default());
        let _poller = StatusPoller::spawn(loco, board, fast(), Some(bus.publisher(Topic::Status)));

        let event = rx.blocking_recv().expect("status event");
        assert_eq!(event.source, SOURCE);
        assert!(matches!(event.payload, EventPayload::Status(ref s) if s.motion_state == MotionState::Fsm(0)));
    }

    #[test]
    fn drop_stops_thread() {
        let sim = Arc::new(SimLoco::new());
        let loco = executor(&sim);
        let board = StatusBoard::new(RobotIdentity::default());
        let poller = StatusPoller::spawn(loco, board, PollerConfig::default(), None);
        let started = Instant::now();
        drop(poller);
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
