//! Protocol status and alarm codes.
//!
//! Every dispatcher entry point ends in a [`Status`] plus an [`Alarm`]
//! (condition + severity). These are the only two things the host framework
//! sees of a handler's outcome, so errors anywhere in the layer are folded
//! into them instead of escaping as panics or `Err`s.

use serde::{Deserialize, Serialize};

// =============================================================================
// Operation Status
// =============================================================================

/// Completion status of a read, write or subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The request completed.
    #[default]
    Success,
    /// The device did not answer in time.
    Timeout,
    /// The value did not fit into the caller's buffer.
    Overflow,
    /// Generic failure.
    Error,
    /// The device is not connected.
    Disconnected,
    /// The device or port is disabled.
    Disabled,
    /// The channel exists but has no handler for the requested operation.
    Unsupported,
}

impl Status {
    /// True for [`Status::Success`].
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Status::Success => "success",
            Status::Timeout => "timeout",
            Status::Overflow => "overflow",
            Status::Error => "error",
            Status::Disconnected => "disconnected",
            Status::Disabled => "disabled",
            Status::Unsupported => "unsupported",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Alarms
// =============================================================================

/// Alarm condition forwarded to the host alongside a value.
///
/// The discriminants are the integer codes the host framework stores in the
/// parameter's alarm status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
#[allow(missing_docs)]
pub enum AlarmStatus {
    #[default]
    NoAlarm = 0,
    Read = 1,
    Write = 2,
    HiHi = 3,
    High = 4,
    LoLo = 5,
    Low = 6,
    State = 7,
    Cos = 8,
    Comm = 9,
    Timeout = 10,
    HwLimit = 11,
    Calc = 12,
    Scan = 13,
    Link = 14,
    Soft = 15,
    BadSub = 16,
    Udf = 17,
    Disable = 18,
    Simm = 19,
    ReadAccess = 20,
    WriteAccess = 21,
}

impl AlarmStatus {
    /// Integer code as stored by the host.
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Alarm severity, ordered from harmless to invalid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u16)]
#[allow(missing_docs)]
pub enum AlarmSeverity {
    #[default]
    NoAlarm = 0,
    Minor = 1,
    Major = 2,
    Invalid = 3,
}

impl AlarmSeverity {
    /// Integer code as stored by the host.
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// The alarm pair attached to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Alarm {
    pub status: AlarmStatus,
    pub severity: AlarmSeverity,
}

impl Alarm {
    /// No alarm.
    pub const NONE: Alarm = Alarm {
        status: AlarmStatus::NoAlarm,
        severity: AlarmSeverity::NoAlarm,
    };

    /// The pair reported when the layer itself rejects a request.
    pub const SOFT_INVALID: Alarm = Alarm {
        status: AlarmStatus::Soft,
        severity: AlarmSeverity::Invalid,
    };

    /// Alarm with the given condition and severity.
    pub fn new(status: AlarmStatus, severity: AlarmSeverity) -> Self {
        Self { status, severity }
    }

    /// True when the severity is anything but [`AlarmSeverity::NoAlarm`].
    pub fn is_raised(&self) -> bool {
        self.severity != AlarmSeverity::NoAlarm
    }
}

// =============================================================================
// Propagation Directive
// =============================================================================

/// Whether a completed read or write should also be pushed to interrupt
/// subscribers of the same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagate {
    /// Always notify subscribers.
    On,
    /// Never notify subscribers.
    Off,
    /// Follow the driver's `auto_interrupts` option.
    #[default]
    Default,
}

impl Propagate {
    /// Resolve the directive against the driver-wide default.
    pub fn resolve(self, auto_interrupts: bool) -> bool {
        match self {
            Propagate::On => true,
            Propagate::Off => false,
            Propagate::Default => auto_interrupts,
        }
    }
}
