//! # autoparam
//!
//! Facade over the autoparam workspace:
//!
//! - **core** (re-exported at the root): channel registry, typed handler
//!   dispatch, interrupt refcounting, driver options and init hooks. See
//!   [`autoparam_core`].
//! - **`mock`**: in-memory host framework plus the `SUM` accumulator and test
//!   instrument drivers. See [`autoparam_driver_mock`].
//! - **`logging`**: tracing subscriber setup used by the CLI.

pub mod logging;

pub use autoparam_core::*;
pub use autoparam_driver_mock as mock;
