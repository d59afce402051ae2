//! Error Translator – maps native result codes to an [`ErrorCategory`].
//!
//! The locomotion and arm subsystems report failures through two disjoint
//! code spaces.  [`translate`] is pure and total: every `(domain, code)` pair
//! maps to exactly one category, and codes outside the known tables come back
//! as [`ErrorCategory::Unknown`] carrying the raw value.
//!
//! | Domain | Code | Category |
//! |---|---|---|
//! | Locomotion | 3104 | [`ErrorCategory::RobotNotReady`] |
//! | Locomotion | 3105 | [`ErrorCategory::CommunicationTimeout`] |
//! | Locomotion | 3106 | [`ErrorCategory::InvalidCommand`] |
//! | Locomotion | 3107 | [`ErrorCategory::EmergencyStop`] |
//! | Locomotion | 3108 | [`ErrorCategory::MotorError`] |
//! | Locomotion | 3109 | [`ErrorCategory::SensorError`] |
//! | Locomotion | 3110 | [`ErrorCategory::BatteryLow`] |
//! | Locomotion | 3111 | [`ErrorCategory::Overload`] |
//! | Locomotion | 3112 | [`ErrorCategory::CalibrationRequired`] |
//! | Locomotion | -1 | [`ErrorCategory::GeneralError`] |
//! | Arm | -5 | [`ErrorCategory::ArmSdkError`] |
//! | Arm | -6 | [`ErrorCategory::HoldingObject`] |
//! | Arm | -7 | [`ErrorCategory::InvalidActionId`] |
//! | Arm | -8 | [`ErrorCategory::InvalidFsmForAction`] |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Domain;

/// Actionable classification of a nonzero native result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    // ── Locomotion ──────────────────────────────────────────────────────────
    /// Power or motor state not ready for motion.
    RobotNotReady,
    CommunicationTimeout,
    InvalidCommand,
    /// The robot is latched in emergency stop.
    EmergencyStop,
    MotorError,
    SensorError,
    BatteryLow,
    Overload,
    CalibrationRequired,
    /// Wrapper-level failure (`-1`), usually a caught SDK exception.
    GeneralError,

    // ── Arm ─────────────────────────────────────────────────────────────────
    /// The arm SDK interface itself reported an error.
    ArmSdkError,
    /// The robot is holding an object and refuses the gesture.
    HoldingObject,
    InvalidActionId,
    /// Gestures are only accepted in FSM 500, 501 and 801.
    InvalidFsmForAction,

    /// Any code outside the tables above; the raw value is kept for
    /// operator diagnosis.
    Unknown(i32),
}

/// Map a native result code to its [`ErrorCategory`].
///
/// The tables of the two domains are never cross-applied: `-5` is an
/// [`ErrorCategory::ArmSdkError`] for the arm but `Unknown(-5)` for
/// locomotion.
///
/// ```
/// use g1bridge_types::{Domain, ErrorCategory, codes::translate};
///
/// assert_eq!(translate(Domain::Locomotion, 3107), ErrorCategory::EmergencyStop);
/// assert_eq!(translate(Domain::Arm, 3107), ErrorCategory::Unknown(3107));
/// ```
pub fn translate(domain: Domain, code: i32) -> ErrorCategory {
    match domain {
        Domain::Locomotion => match code {
            3104 => ErrorCategory::RobotNotReady,
            3105 => ErrorCategory::CommunicationTimeout,
            3106 => ErrorCategory::InvalidCommand,
            3107 => ErrorCategory::EmergencyStop,
            3108 => ErrorCategory::MotorError,
            3109 => ErrorCategory::SensorError,
            3110 => ErrorCategory::BatteryLow,
            3111 => ErrorCategory::Overload,
            3112 => ErrorCategory::CalibrationRequired,
            -1 => ErrorCategory::GeneralError,
            other => ErrorCategory::Unknown(other),
        },
        Domain::Arm => match code {
            -5 => ErrorCategory::ArmSdkError,
            -6 => ErrorCategory::HoldingObject,
            -7 => ErrorCategory::InvalidActionId,
            -8 => ErrorCategory::InvalidFsmForAction,
            other => ErrorCategory::Unknown(other),
        },
    }
}

impl ErrorCategory {
    /// Short operator hint describing what to check.
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorCategory::RobotNotReady => "check power and motor state",
            ErrorCategory::CommunicationTimeout => "check the network link to the robot",
            ErrorCategory::InvalidCommand => "command rejected by the locomotion service",
            ErrorCategory::EmergencyStop => "release the emergency stop",
            ErrorCategory::MotorError => "inspect motor diagnostics",
            ErrorCategory::SensorError => "inspect sensor diagnostics",
            ErrorCategory::BatteryLow => "charge or swap the battery",
            ErrorCategory::Overload => "reduce load and retry",
            ErrorCategory::CalibrationRequired => "run joint calibration",
            ErrorCategory::GeneralError => "native wrapper raised an exception",
            ErrorCategory::ArmSdkError => "arm SDK interface error",
            ErrorCategory::HoldingObject => "release the held object first",
            ErrorCategory::InvalidActionId => "gesture id not supported by this firmware",
            ErrorCategory::InvalidFsmForAction => "switch to FSM 500, 501 or 801 first",
            ErrorCategory::Unknown(_) => "unrecognized code",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCategory::RobotNotReady => "ROBOT_NOT_READY",
            ErrorCategory::CommunicationTimeout => "COMMUNICATION_TIMEOUT",
            ErrorCategory::InvalidCommand => "INVALID_COMMAND",
            ErrorCategory::EmergencyStop => "ROBOT_EMERGENCY_STOP",
            ErrorCategory::MotorError => "MOTOR_ERROR",
            ErrorCategory::SensorError => "SENSOR_ERROR",
            ErrorCategory::BatteryLow => "BATTERY_LOW",
            ErrorCategory::Overload => "OVERLOAD",
            ErrorCategory::CalibrationRequired => "CALIBRATION_REQUIRED",
            ErrorCategory::GeneralError => "GENERAL_ERROR",
            ErrorCategory::ArmSdkError => "ARM_SDK_ERROR",
            ErrorCategory::HoldingObject => "HOLDING_ERROR",
            ErrorCategory::InvalidActionId => "INVALID_ACTION_ID",
            ErrorCategory::InvalidFsmForAction => "INVALID_FSM_ID",
            ErrorCategory::Unknown(code) => return write!(f, "UNKNOWN_ERROR_{code}"),
        };
        write!(f, "{label} ({})", self.hint())
    }
}
