//! Accumulator device.
//!
//! One function, `SUM` (Int32). Every distinct channel string is its own
//! accumulator: writes add to the running total, reads return it.
//!
//! ```text
//! "SUM 1"      ──▶ handle 0, total 0
//! "SUM set 5"  ──▶ handle 1, total 0
//! "SUM  1"     ──▶ handle 0 (same channel as "SUM 1")
//! ```
//!
//! An optional `reset` argument makes a channel zero its total after every
//! read, e.g. `"SUM pulses reset"`.

use std::sync::Arc;

use autoparam_core::kind::Int32;
use autoparam_core::{
    Channel, Driver, DriverBuilder, DriverOptions, Handle, ReadResult, Slot, Status, WriteResult,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::host::MockHost;

/// Activate/deactivate notifications seen by the device.
#[derive(Debug, Default)]
pub struct SumDevice {
    events: Mutex<Vec<(Handle, bool)>>,
    polling: Mutex<Vec<Handle>>,
}

impl SumDevice {
    /// Interrupt callback invocations, in order.
    pub fn events(&self) -> Vec<(Handle, bool)> {
        self.events.lock().clone()
    }

    /// Channels the init hook started polling.
    pub fn polling(&self) -> Vec<Handle> {
        self.polling.lock().clone()
    }
}

/// Slot of one `SUM` channel.
#[derive(Debug)]
pub struct SumChannel {
    base: Channel,
    total: Mutex<i32>,
    reset_on_read: bool,
    device: Arc<SumDevice>,
}

impl SumChannel {
    fn new(base: Channel, device: Arc<SumDevice>) -> Self {
        let reset_on_read = base.arguments().iter().any(|arg| arg == "reset");
        Self {
            base,
            total: Mutex::new(0),
            reset_on_read,
            device,
        }
    }

    /// Current accumulated value.
    pub fn total(&self) -> i32 {
        *self.total.lock()
    }

    fn take(&self) -> i32 {
        let mut total = self.total.lock();
        let value = *total;
        if self.reset_on_read {
            *total = 0;
        }
        value
    }

    fn add(&self, value: i32) -> WriteResult {
        let mut total = self.total.lock();
        match total.checked_add(value) {
            Some(sum) => {
                *total = sum;
                WriteResult::success()
            }
            None => WriteResult::failed(Status::Overflow),
        }
    }
}

impl Slot for SumChannel {
    fn channel(&self) -> &Channel {
        &self.base
    }
}

/// Build an accumulator driver on a fresh [`MockHost`].
pub fn sum_driver(
    port: &str,
    options: DriverOptions,
) -> (Arc<Driver<SumChannel, MockHost>>, Arc<SumDevice>) {
    let device = Arc::new(SumDevice::default());
    let host = MockHost::new(port, &options);

    let for_slots = Arc::clone(&device);
    let driver = DriverBuilder::new(port, host, move |base: Channel| {
        Some(SumChannel::new(base, Arc::clone(&for_slots)))
    })
    .options(options)
    .with_handlers::<Int32>("SUM", |h| {
        h.read(|slot| ReadResult::ok(slot.take()))
            .write(|slot, value| slot.add(value))
            .on_interrupt(|slot, active| {
                debug!(handle = %slot.base.handle(), active, "SUM interrupt transition");
                slot.device.events.lock().push((slot.base.handle(), active));
                Status::Success
            })
    })
    .init_hook(|driver| {
        for slot in driver.interrupt_subscribed_slots() {
            slot.device.polling.lock().push(slot.base.handle());
        }
    })
    .build();

    (driver, device)
}
