//! Host framework boundary.
//!
//! The layer never talks to a record database, a scan list or a transport
//! directly. Everything it needs from the host framework goes through
//! [`HostFramework`]; the driver owns one implementation behind its lock.
//!
//! ```text
//! ┌──────────────────────────── Driver ────────────────────────────┐
//! │  registry ── handlers ── subscriptions                         │
//! │                    │                                           │
//! │          Mutex<H: HostFramework>                               │
//! └────────────────────┼───────────────────────────────────────────┘
//!                      ▼
//!   create_param / set_param_value / set_param_alarm
//!   call_param_callbacks / do_array_callbacks
//!   register_interrupt / cancel_interrupt / interrupt_handles
//! ```

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::status::Alarm;
use crate::types::{DataType, ParamValue};

/// Host-assigned identifier of a channel's parameter.
///
/// Stable for the lifetime of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(pub usize);

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host-assigned identifier of one interrupt subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterruptId(pub u64);

impl std::fmt::Display for InterruptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Primitives the layer consumes from the host framework.
///
/// All methods are called with the driver lock held, so implementations do
/// not need interior synchronization.
pub trait HostFramework: Send + 'static {
    /// Allocate a parameter named `name` of the given type.
    fn create_param(&mut self, name: &str, data_type: DataType) -> Result<Handle, HostError>;

    /// Undo [`HostFramework::create_param`] after a failed resolution.
    fn discard_param(&mut self, handle: Handle);

    /// Store a scalar or octet value. Digital values only touch the bits in
    /// their mask.
    fn set_param_value(&mut self, handle: Handle, value: ParamValue<'_>) -> Result<(), HostError>;

    /// Store the alarm pair of a parameter.
    fn set_param_alarm(&mut self, handle: Handle, alarm: Alarm) -> Result<(), HostError>;

    /// Deliver the stored value of a scalar or octet parameter to its
    /// interrupt subscribers.
    fn call_param_callbacks(&mut self, handle: Handle) -> Result<(), HostError>;

    /// Deliver an array value to the interrupt subscribers of a parameter.
    fn do_array_callbacks(&mut self, handle: Handle, value: ParamValue<'_>)
        -> Result<(), HostError>;

    /// Native subscribe entry point of the interface for `data_type`.
    fn register_interrupt(
        &mut self,
        handle: Handle,
        data_type: DataType,
    ) -> Result<InterruptId, HostError>;

    /// Native unsubscribe entry point. Returns the handle the subscription
    /// was attached to.
    fn cancel_interrupt(
        &mut self,
        id: InterruptId,
        data_type: DataType,
    ) -> Result<Handle, HostError>;

    /// Handles with at least one active subscription on the interface for
    /// `data_type`, in the host's list order. May contain duplicates.
    fn interrupt_handles(&self, data_type: DataType) -> Vec<Handle>;
}
