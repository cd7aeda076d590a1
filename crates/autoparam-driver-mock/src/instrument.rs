//! Test instrument with one channel per interface family.
//!
//! | Function | Type          | Read                          | Write                    |
//! |----------|---------------|-------------------------------|--------------------------|
//! | `LONG`   | Int32         | always 42                     | always fails             |
//! | `VOLTS`  | Float64       | unsupported                   | stores the setpoint      |
//! | `WAVE`   | Float32Array  | ramp, length from argument    | unsupported              |
//! | `BITS`   | UInt32Digital | register, masked              | masked register update   |
//! | `NAME`   | Octet         | instrument name               | renames the instrument   |
//!
//! `WAVE` takes an optional sample count (`"WAVE 16"`, default 8) and
//! tracks whether anyone is subscribed to it.

use std::sync::Arc;

use autoparam_core::kind::{Float32Array, Float64, Int32, Octet, UInt32Digital};
use autoparam_core::{
    Channel, Driver, DriverBuilder, DriverOptions, ReadResult, Status, WriteResult,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::host::MockHost;

const DEFAULT_WAVE_LEN: usize = 8;

/// Shared device state behind the handlers.
#[derive(Debug)]
pub struct InstrumentState {
    setpoint: Mutex<Option<f64>>,
    bits: Mutex<u32>,
    name: Mutex<String>,
    streaming: Mutex<bool>,
}

impl Default for InstrumentState {
    fn default() -> Self {
        Self {
            setpoint: Mutex::new(None),
            bits: Mutex::new(0),
            name: Mutex::new("autoparam-test".to_string()),
            streaming: Mutex::new(false),
        }
    }
}

impl InstrumentState {
    /// Last value written to `VOLTS`.
    pub fn setpoint(&self) -> Option<f64> {
        *self.setpoint.lock()
    }

    /// Current `BITS` register.
    pub fn bits(&self) -> u32 {
        *self.bits.lock()
    }

    /// Current `NAME` string.
    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    /// True while `WAVE` has at least one subscriber.
    pub fn streaming(&self) -> bool {
        *self.streaming.lock()
    }
}

fn wave_len(slot: &Channel) -> Result<usize, Status> {
    match slot.arguments().first() {
        None => Ok(DEFAULT_WAVE_LEN),
        Some(arg) => arg.parse().map_err(|_| Status::Error),
    }
}

/// Build the test instrument on a fresh [`MockHost`].
pub fn instrument_driver(
    port: &str,
    options: DriverOptions,
) -> (Arc<Driver<Channel, MockHost>>, Arc<InstrumentState>) {
    let state = Arc::new(InstrumentState::default());
    let host = MockHost::new(port, &options);

    let volts = Arc::clone(&state);
    let streaming = Arc::clone(&state);
    let bits_read = Arc::clone(&state);
    let bits_write = Arc::clone(&state);
    let name_read = Arc::clone(&state);
    let name_write = Arc::clone(&state);

    let driver = DriverBuilder::plain(port, host)
        .options(options)
        .with_handlers::<Int32>("LONG", |h| {
            h.read(|_| ReadResult::ok(42))
                .write(|_, _| WriteResult::failed(Status::Error))
        })
        .with_handlers::<Float64>("VOLTS", |h| {
            h.write(move |_, value| {
                *volts.setpoint.lock() = Some(value);
                WriteResult::success()
            })
        })
        .with_handlers::<Float32Array>("WAVE", |h| {
            h.read(|slot, buf| {
                let len = match wave_len(slot) {
                    Ok(len) => len,
                    Err(status) => return ReadResult::failed(status),
                };
                let n = buf.set_len(len);
                for (i, sample) in buf.storage_mut()[..n].iter_mut().enumerate() {
                    *sample = i as f32 * 0.5;
                }
                ReadResult::success()
            })
            .on_interrupt(move |slot, active| {
                debug!(channel = %slot.key(), active, "WAVE streaming");
                *streaming.streaming.lock() = active;
                Status::Success
            })
        })
        .with_handlers::<UInt32Digital>("BITS", |h| {
            h.read(move |_, _mask| ReadResult::ok(*bits_read.bits.lock()))
                .write(move |_, value, mask| {
                    let mut bits = bits_write.bits.lock();
                    *bits = (*bits & !mask) | (value & mask);
                    WriteResult::success()
                })
        })
        .with_handlers::<Octet>("NAME", |h| {
            h.read(move |_, buf| {
                let name = name_read.name.lock();
                if buf.fill_from(name.as_bytes()) < name.len() {
                    return ReadResult::failed(Status::Overflow);
                }
                ReadResult::success()
            })
            .write(move |_, value| {
                *name_write.name.lock() = value.to_string();
                WriteResult::success()
            })
        })
        .build();

    (driver, state)
}
