//! `autoparam-core`
//!
//! Dynamic channel registry, typed handler dispatch and interrupt reference
//! counting for port drivers whose set of channels is not known up front.
//!
//! A host framework addresses channels by free-form strings such as
//! `"SUM set 5"`. The driver registers handlers per *function name* (the
//! first word) and data kind; everything after that is an argument the
//! handlers interpret themselves.
//!
//! ## Flow
//!
//! ```text
//! host ──resolve("SUM set 5")──▶ ChannelRegistry ──parse/dedupe/create──▶ Handle
//! host ──read_int32(handle)────▶ dispatch ──▶ Handlers<S, Int32>::read ──▶ Reply
//! host ──subscribe::<Int32>────▶ SubscriptionTracker ──0→1──▶ on_interrupt(slot, true)
//! ```
//!
//! ## Key Types
//!
//! - [`DriverBuilder`] / [`Driver`]: construction and the host-facing entry points
//! - [`Handlers`]: read/write/interrupt handlers of one function, typed by a
//!   [`kind`] marker
//! - [`Channel`] and [`Slot`]: the per-channel object handlers receive
//! - [`HostFramework`]: everything the layer needs from the host
//! - [`AutoparamError`]: error taxonomy, folded into [`Status`] + [`Alarm`]
//!   at the host boundary
//!
//! ## Example
//!
//! ```rust,ignore
//! use autoparam_core::kind::Int32;
//! use autoparam_core::{DriverBuilder, ReadResult};
//!
//! let driver = DriverBuilder::plain("PORT", host)
//!     .with_handlers::<Int32>("ANSWER", |h| h.read(|_| ReadResult::ok(42)))
//!     .build();
//! let handle = driver.resolve("ANSWER")?;
//! assert_eq!(driver.read_int32(handle).value, Some(42));
//! ```

pub mod channel;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod handler;
pub mod host;
pub mod init_hook;
pub mod kind;
pub mod options;
pub mod registry;
pub mod status;
pub mod subscription;
pub mod types;

#[cfg(test)]
mod testing;

pub use channel::{
    Channel, ChannelKey, ChannelParser, DefaultParser, Materialize, PlainChannels, Slot,
};
pub use dispatch::Reply;
pub use driver::{Driver, DriverBuilder};
pub use error::{AutoparamError, AutoparamResult, HostError, ParseError};
pub use handler::{HandlerResult, HandlerTables, Handlers, ReadResult, WriteResult};
pub use host::{Handle, HostFramework, InterruptId};
pub use init_hook::{AfterInit, InitHooks};
pub use kind::{ArrayKind, HandlerKind, ScalarKind};
pub use options::DriverOptions;
pub use registry::{ChannelRegistry, Resolved};
pub use status::{Alarm, AlarmSeverity, AlarmStatus, Propagate, Status};
pub use subscription::SubscriptionTracker;
pub use types::{ArrayBuf, DataType, ParamValue};
