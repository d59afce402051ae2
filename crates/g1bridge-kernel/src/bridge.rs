//! [`RobotBridge`] – owns both domains, the poller and the dispatcher.
//!
//! Connect order: locomotion (fatal on failure), one FSM probe, the arm
//! (optional; a failure leaves the capability absent), then the poller.
//! The arm capability is decided once here and never re-probed.

use std::sync::Arc;
use std::time::Duration;

use g1bridge_hal::{
    ARM_DEFAULT_TIMEOUT, ArmExecutor, ArmNative, DEFAULT_INTERFACE, LOCO_DEFAULT_TIMEOUT, LocoExecutor, LocoNative,
};
use g1bridge_middleware::{EventBus, Topic, TopicPublisher};
use g1bridge_types::{BridgeError, Domain, Event, EventPayload, MotionState, RobotIdentity, RobotStatus};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, MotionDefaults};
use crate::poller::{PollerConfig, StatusBoard, StatusPoller};

const SOURCE: &str = "g1bridge-kernel::bridge";

/// Everything needed to bring the bridge up.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub identity: RobotIdentity,
    pub interface: String,
    pub loco_timeout: Duration,
    pub arm_timeout: Duration,
    pub enable_arm: bool,
    pub motion: MotionDefaults,
    pub poller: PollerConfig,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            identity: RobotIdentity::default(),
            interface: DEFAULT_INTERFACE.to_string(),
            loco_timeout: LOCO_DEFAULT_TIMEOUT,
            arm_timeout: ARM_DEFAULT_TIMEOUT,
            enable_arm: true,
            motion: MotionDefaults::default(),
            poller: PollerConfig::default(),
        }
    }
}

pub struct RobotBridge {
    loco: Arc<LocoExecutor>,
    arm: Option<ArmExecutor>,
    board: StatusBoard,
    poller: Mutex<Option<StatusPoller>>,
    dispatcher: Arc<Dispatcher>,
    alerts: Option<TopicPublisher>,
    status_out: Option<TopicPublisher>,
}

impl RobotBridge {
    /// Bring the bridge up without a bus.
    pub fn connect(
        settings: BridgeSettings,
        loco_driver: Arc<dyn LocoNative>,
        arm_driver: Option<Arc<dyn ArmNative>>,
    ) -> Result<Self, BridgeError> {
        Self::open(settings, loco_driver, arm_driver, None)
    }

    /// Bring the bridge up and publish status, faults and stops on `bus`.
    pub fn connect_with_bus(
        settings: BridgeSettings,
        loco_driver: Arc<dyn LocoNative>,
        arm_driver: Option<Arc<dyn ArmNative>>,
        bus: &EventBus,
    ) -> Result<Self, BridgeError> {
        Self::open(settings, loco_driver, arm_driver, Some(bus))
    }

    fn open(
        settings: BridgeSettings,
        loco_driver: Arc<dyn LocoNative>,
        arm_driver: Option<Arc<dyn ArmNative>>,
        bus: Option<&EventBus>,
    ) -> Result<Self, BridgeError> {
        let loco = Arc::new(LocoExecutor::with_timeout(
            loco_driver,
            &settings.interface,
            settings.loco_timeout,
        ));
        loco.connect()?;

        match loco.fsm_id() {
            Ok(id) => info!(fsm_id = id, "locomotion ready"),
            Err(err) => warn!(error = %err, "initial fsm probe failed"),
        }

        let arm = match (settings.enable_arm, arm_driver) {
            (true, Some(driver)) => {
                let arm = ArmExecutor::with_timeout(driver, &settings.interface, settings.arm_timeout);
                match arm.connect() {
                    Ok(()) => Some(arm),
                    Err(err) => {
                        warn!(error = %err, "arm unavailable; continuing with locomotion only");
                        None
                    }
                }
            }
            (true, None) => {
                warn!("no arm driver; continuing with locomotion only");
                None
            }
            (false, _) => {
                info!("arm disabled by configuration");
                None
            }
        };

        let alerts = bus.map(|b| b.publisher(Topic::Alerts));
        let mut dispatcher = Dispatcher::new(loco.clone(), settings.motion);
        if let Some(alerts) = &alerts {
            dispatcher = dispatcher.with_alerts(alerts.clone());
        }

        let board = StatusBoard::new(settings.identity.clone());
        let status_out = bus.map(|b| b.publisher(Topic::Status));
        let poller = StatusPoller::spawn(loco.clone(), board.clone(), settings.poller, status_out.clone());

        info!(
            robot = %settings.identity.id,
            interface = %settings.interface,
            arm = arm.is_some(),
            "bridge connected"
        );

        Ok(Self {
            loco,
            arm,
            board,
            poller: Mutex::new(Some(poller)),
            dispatcher: Arc::new(dispatcher),
            alerts,
            status_out,
        })
    }

    /// Latest poller snapshot.
    pub fn status(&self) -> RobotStatus {
        self.board.snapshot()
    }

    /// Query the FSM id directly, bypassing the snapshot.
    pub fn fsm_status(&self) -> Result<i32, BridgeError> {
        self.loco.fsm_id()
    }

    /// Stop all motion and announce it on the alerts topic.
    pub fn emergency_stop(&self, reason: &str) -> Result<(), BridgeError> {
        warn!(reason, "emergency stop");
        if let Some(alerts) = &self.alerts {
            let event = Event::new(
                SOURCE,
                EventPayload::EmergencyStop {
                    reason: reason.to_string(),
                },
            );
            if let Err(err) = alerts.publish(event) {
                debug!(error = %err, "emergency stop alert not delivered");
            }
        }
        self.loco.stop_move()
    }

    pub fn has_arm(&self) -> bool {
        self.arm.is_some()
    }

    fn arm(&self) -> Result<&ArmExecutor, BridgeError> {
        self.arm.as_ref().ok_or(BridgeError::CapabilityUnavailable(Domain::Arm))
    }

    /// Run a named arm gesture; returns its id.
    pub fn gesture(&self, name: &str) -> Result<i32, BridgeError> {
        self.arm()?.execute_action_by_name(name)
    }

    /// The firmware's raw action list.
    pub fn list_actions(&self) -> Result<String, BridgeError> {
        self.arm()?.list_actions()
    }

    pub fn loco(&self) -> &LocoExecutor {
        &self.loco
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Stop the poller, release the arm and locomotion handles, then mark
    /// the snapshot disconnected.  Idempotent.
    pub fn disconnect(&self) {
        if let Some(mut poller) = self.poller.lock().take() {
            poller.stop();
        }
        if let Some(arm) = &self.arm {
            arm.disconnect();
        }
        self.loco.disconnect();

        let snapshot = self.board.store(MotionState::Disconnected);
        if let Some(out) = &self.status_out
            && out.has_subscribers()
            && let Err(err) = out.publish(Event::new(SOURCE, EventPayload::Status(snapshot)))
        {
            debug!(error = %err, "final status snapshot not delivered");
        }
    }
}

impl Drop for RobotBridge {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use g1bridge_hal::sim::{SimArm, SimLoco};
    use g1bridge_types::ErrorCategory;

    use super::*;

    fn settings() -> BridgeSettings {
        BridgeSettings {
            poller: PollerConfig {
                period: Duration::from_millis(5),
                degraded_period: Duration::from_millis(50),
            },
            ..BridgeSettings::default()
        }
    }

    fn drivers() -> (Arc<SimLoco>, Arc<SimArm>) {
        (Arc::new(SimLoco::new()), Arc::new(SimArm::new()))
    }

    fn bridge(loco: &Arc<SimLoco>, arm: &Arc<SimArm>) -> RobotBridge {
        RobotBridge::connect(
            settings(),
            loco.clone() as Arc<dyn LocoNative>,
            Some(arm.clone() as Arc<dyn ArmNative>),
        )
        .unwrap()
    }

    #[test]
    fn connect_brings_up_both_domains() {
        let (loco, arm) = drivers();
        let bridge = bridge(&loco, &arm);
        assert!(bridge.has_arm());
        assert_eq!(loco.live_handles(), 1);
        assert_eq!(arm.live_handles(), 1);
        assert_eq!(bridge.fsm_status().unwrap(), 0);
    }

    #[test]
    fn loco_failure_is_fatal() {
        let loco = Arc::new(SimLoco::new().with_init_code(3105));
        let arm = Arc::new(SimArm::new());
        let err = RobotBridge::connect(
            settings(),
            loco.clone() as Arc<dyn LocoNative>,
            Some(arm.clone() as Arc<dyn ArmNative>),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            BridgeError::InitializationFailed {
                domain: Domain::Locomotion,
                category: ErrorCategory::CommunicationTimeout,
                ..
            }
        ));
        assert_eq!(loco.live_handles(), 0);
        assert_eq!(arm.created(), 0);
    }

    #[test]
    fn arm_failure_leaves_capability_absent() {
        let loco = Arc::new(SimLoco::new());
        let arm = Arc::new(SimArm::new().with_null_create());
        let bridge = bridge(&loco, &arm);
        assert!(!bridge.has_arm());
        assert_eq!(
            bridge.gesture("clap"),
            Err(BridgeError::CapabilityUnavailable(Domain::Arm))
        );
        assert_eq!(bridge.list_actions(), Err(BridgeError::CapabilityUnavailable(Domain::Arm)));
    }

    #[test]
    fn disabled_arm_is_never_created() {
        let (loco, arm) = drivers();
        let bridge = RobotBridge::connect(
            BridgeSettings {
                enable_arm: false,
                ..settings()
            },
            loco.clone() as Arc<dyn LocoNative>,
            Some(arm.clone() as Arc<dyn ArmNative>),
        )
        .unwrap();
        assert!(!bridge.has_arm());
        assert_eq!(arm.created(), 0);
    }

    #[test]
    fn gesture_runs_through_arm() {
        let (loco, arm) = drivers();
        let bridge = bridge(&loco, &arm);
        assert_eq!(bridge.gesture("heart").unwrap(), 20);
        assert_eq!(arm.executed(), vec![20]);
        assert!(bridge.list_actions().unwrap().contains("heart"));
    }

    #[test]
    fn status_follows_poller() {
        let (loco, arm) = drivers();
        let bridge = bridge(&loco, &arm);
        bridge.loco().set_fsm_id(801).unwrap();
        for _ in 0..200 {
            if bridge.status().motion_state == MotionState::Fsm(801) {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("status never reached fsm_id_801");
    }

    #[test]
    fn emergency_stop_stops_and_alerts() {
        let (loco, arm) = drivers();
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        let bridge = RobotBridge::connect_with_bus(
            settings(),
            loco.clone() as Arc<dyn LocoNative>,
            Some(arm.clone() as Arc<dyn ArmNative>),
            &bus,
        )
        .unwrap();

        bridge.emergency_stop("operator").unwrap();

        assert_eq!(loco.calls("stop_move"), 1);
        let event = alerts.try_recv().unwrap();
        assert!(matches!(event.payload, EventPayload::EmergencyStop { ref reason } if reason == "operator"));
    }

    #[test]
    fn disconnect_is_idempotent_and_releases_everything() {
        let (loco, arm) = drivers();
        let bridge = bridge(&loco, &arm);
        bridge.disconnect();
        bridge.disconnect();
        assert_eq!(loco.live_handles(), 0);
        assert_eq!(arm.live_handles(), 0);
        assert_eq!(loco.destroyed(), 1);
        assert_eq!(bridge.fsm_status(), Err(BridgeError::NotConnected(Domain::Locomotion)));
    }

    #[test]
    fn disconnect_marks_status_disconnected() {
        let (loco, arm) = drivers();
        let bus = EventBus::default();
        let bridge = RobotBridge::connect_with_bus(
            settings(),
            loco.clone() as Arc<dyn LocoNative>,
            Some(arm.clone() as Arc<dyn ArmNative>),
            &bus,
        )
        .unwrap();
        bridge.loco().set_fsm_id(801).unwrap();
        for _ in 0..200 {
            if bridge.status().motion_state == MotionState::Fsm(801) {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(bridge.status().motion_state, MotionState::Fsm(801));

        let mut status = bus.subscribe_to(Topic::Status);
        bridge.disconnect();
        assert_eq!(bridge.status().motion_state, MotionState::Disconnected);

        // The poller is joined, so the last event on the topic is the final one.
        let mut last = None;
        while let Ok(event) = status.try_recv() {
            last = Some(event);
        }
        let last = last.expect("final status event");
        assert!(matches!(last.payload, EventPayload::Status(ref s) if s.motion_state == MotionState::Disconnected));

        thread::sleep(Duration::from_millis(30));
        assert_eq!(bridge.status().motion_state, MotionState::Disconnected);
    }

    #[test]
    fn drop_releases_handles() {
        let (loco, arm) = drivers();
        drop(bridge(&loco, &arm));
        assert_eq!(loco.live_handles(), 0);
        assert_eq!(arm.live_handles(), 0);
    }
}
