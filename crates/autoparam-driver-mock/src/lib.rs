//! Mock host framework and devices for autoparam drivers.
//!
//! This crate lets drivers built on `autoparam-core` run without a real
//! control-system host:
//!
//! - [`MockHost`] - in-memory parameter table, interrupt lists, a delivery
//!   log and per-primitive fault injection
//! - [`sum_driver`] - `SUM` accumulator, one independent total per channel
//! - [`instrument_driver`] - one channel per interface family
//!   (`LONG`, `VOLTS`, `WAVE`, `BITS`, `NAME`)
//!
//! ```rust,ignore
//! use autoparam_core::DriverOptions;
//! use autoparam_driver_mock::sum_driver;
//!
//! let (driver, _device) = sum_driver("SUMS", DriverOptions::default());
//! let handle = driver.resolve("SUM 1")?;
//! driver.write_int32(handle, 5);
//! assert_eq!(driver.read_int32(handle).value, Some(5));
//! ```

pub mod accumulator;
pub mod host;
pub mod instrument;

pub use accumulator::{sum_driver, SumChannel, SumDevice};
pub use host::{Delivery, HostOperation, MockHost, MockParam, StoredValue};
pub use instrument::{instrument_driver, InstrumentState};
