//! Read and write entry points of the host interfaces.
//!
//! Every entry point runs the same sequence:
//!
//! 1. look up the slot and check it was declared with this interface's type,
//! 2. pick the handler registered for the slot's function (a missing one
//!    yields [`Status::Unsupported`] with a soft/invalid alarm),
//! 3. call the handler without holding the host lock,
//! 4. apply the handler's alarm to the parameter, and on success its value,
//! 5. notify subscribers if the handler's [`crate::Propagate`] directive
//!    resolves to on.
//!
//! Nothing here returns `Err` or panics; every failure ends up in the
//! [`Reply`] status and alarm.

use tracing::{debug, warn};

use crate::channel::Slot;
use crate::driver::Driver;
use crate::error::{AutoparamError, HostError};
use crate::handler::HandlerResult;
use crate::host::{Handle, HostFramework};
use crate::kind::{
    ArrayKind, Float32Array, Float64, Float64Array, Int16Array, Int32, Int32Array, Int64,
    Int64Array, Int8Array, Octet, ScalarKind, UInt32Digital,
};
use crate::status::{Alarm, AlarmSeverity, AlarmStatus, Status};
use crate::types::{ArrayBuf, DataType, ParamValue};

/// What the host receives back from a read or write.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    /// Completion status.
    pub status: Status,
    /// Alarm pair for the requesting record.
    pub alarm: Alarm,
    /// Value read (scalars) or number of elements written into the
    /// caller's buffer (arrays, octets). `None` unless `status` is success.
    pub value: Option<T>,
}

impl<T> Reply<T> {
    fn rejected(err: &AutoparamError) -> Self {
        Self {
            status: err.status(),
            alarm: Alarm::SOFT_INVALID,
            value: None,
        }
    }

    /// True when the status is [`Status::Success`].
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Read,
    Write,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
        }
    }

    /// Alarm used when a handler fails without raising one itself.
    fn failure_alarm(self) -> Alarm {
        let status = match self {
            Operation::Read => AlarmStatus::Read,
            Operation::Write => AlarmStatus::Write,
        };
        Alarm::new(status, AlarmSeverity::Invalid)
    }
}

macro_rules! scalar_entry_points {
    ($($kind:ident, $value:ty, $read:ident, $write:ident;)*) => {
        $(
            #[doc = concat!("Read entry point of the `", stringify!($kind), "` interface.")]
            pub fn $read(&self, handle: Handle) -> Reply<$value> {
                self.read_scalar::<$kind>(handle)
            }

            #[doc = concat!("Write entry point of the `", stringify!($kind), "` interface.")]
            pub fn $write(&self, handle: Handle, value: $value) -> Reply<()> {
                self.write_scalar::<$kind>(handle, value)
            }
        )*
    };
}

macro_rules! array_entry_points {
    ($($kind:ident, $elem:ty, $read:ident, $write:ident;)*) => {
        $(
            #[doc = concat!("Read entry point of the `", stringify!($kind), "` interface.")]
            pub fn $read(&self, handle: Handle, out: &mut [$elem]) -> Reply<usize> {
                self.read_array::<$kind>(handle, out)
            }

            #[doc = concat!("Write entry point of the `", stringify!($kind), "` interface.")]
            pub fn $write(&self, handle: Handle, value: &[$elem]) -> Reply<()> {
                self.write_array::<$kind>(handle, value)
            }
        )*
    };
}

impl<S: Slot, H: HostFramework> Driver<S, H> {
    // -------------------------------------------------------------------------
    // Generic paths
    // -------------------------------------------------------------------------

    /// Read a scalar channel through the interface of kind `K`.
    pub fn read_scalar<K: ScalarKind<S>>(&self, handle: Handle) -> Reply<K::Value> {
        let slot = match self.typed_slot(handle, K::DATA_TYPE) {
            Ok(slot) => slot,
            Err(err) => return Reply::rejected(&err),
        };
        let result = match self
            .handlers
            .get::<K>(slot.channel().function())
            .and_then(|h| h.read.as_ref())
        {
            Some(reader) => K::call_read(reader, &*slot),
            None => self.unsupported(&*slot, Operation::Read),
        };
        let notify = result.propagate.resolve(self.options.auto_interrupts);
        let value = result.value;
        let (status, alarm) = self.complete(handle, Operation::Read, &result, |host| {
            host.set_param_value(handle, K::param_value(value))?;
            if notify {
                host.call_param_callbacks(handle)?;
            }
            Ok(())
        });
        Reply {
            status,
            alarm,
            value: status.is_success().then_some(value),
        }
    }

    /// Write a scalar channel through the interface of kind `K`.
    pub fn write_scalar<K: ScalarKind<S>>(&self, handle: Handle, value: K::Value) -> Reply<()> {
        let slot = match self.typed_slot(handle, K::DATA_TYPE) {
            Ok(slot) => slot,
            Err(err) => return Reply::rejected(&err),
        };
        let result = match self
            .handlers
            .get::<K>(slot.channel().function())
            .and_then(|h| h.write.as_ref())
        {
            Some(writer) => K::call_write(writer, &*slot, value),
            None => self.unsupported(&*slot, Operation::Write),
        };
        let notify = result.propagate.resolve(self.options.auto_interrupts);
        let (status, alarm) = self.complete(handle, Operation::Write, &result, |host| {
            host.set_param_value(handle, K::param_value(value))?;
            if notify {
                host.call_param_callbacks(handle)?;
            }
            Ok(())
        });
        Reply::done(status, alarm)
    }

    /// Read an array channel into `out`. On success the reply carries the
    /// number of elements written, never more than `out.len()`.
    pub fn read_array<K: ArrayKind<S>>(
        &self,
        handle: Handle,
        out: &mut [K::Elem],
    ) -> Reply<usize> {
        let slot = match self.typed_slot(handle, K::DATA_TYPE) {
            Ok(slot) => slot,
            Err(err) => return Reply::rejected(&err),
        };
        let mut buf = ArrayBuf::new(out);
        let result = match self
            .handlers
            .get::<K>(slot.channel().function())
            .and_then(|h| h.read.as_ref())
        {
            Some(reader) => K::call_read(reader, &*slot, &mut buf),
            None => self.unsupported(&*slot, Operation::Read),
        };
        let notify = result.propagate.resolve(self.options.auto_interrupts);
        let (status, alarm) = self.complete(handle, Operation::Read, &result, |host| {
            if notify {
                host.do_array_callbacks(handle, K::param_value(buf.as_slice()))?;
            }
            Ok(())
        });
        Reply {
            status,
            alarm,
            value: status.is_success().then_some(buf.len()),
        }
    }

    /// Write an array channel.
    pub fn write_array<K: ArrayKind<S>>(&self, handle: Handle, value: &[K::Elem]) -> Reply<()> {
        let slot = match self.typed_slot(handle, K::DATA_TYPE) {
            Ok(slot) => slot,
            Err(err) => return Reply::rejected(&err),
        };
        let result = match self
            .handlers
            .get::<K>(slot.channel().function())
            .and_then(|h| h.write.as_ref())
        {
            Some(writer) => K::call_write(writer, &*slot, value),
            None => self.unsupported(&*slot, Operation::Write),
        };
        let notify = result.propagate.resolve(self.options.auto_interrupts);
        let (status, alarm) = self.complete(handle, Operation::Write, &result, |host| {
            if notify {
                host.do_array_callbacks(handle, K::param_value(value))?;
            }
            Ok(())
        });
        Reply::done(status, alarm)
    }

    // -------------------------------------------------------------------------
    // Digital and octet
    // -------------------------------------------------------------------------

    /// Read the bits selected by `mask`. Bits outside the mask are always
    /// zero in the reply.
    pub fn read_uint32_digital(&self, handle: Handle, mask: u32) -> Reply<u32> {
        let slot = match self.typed_slot(handle, DataType::UInt32Digital) {
            Ok(slot) => slot,
            Err(err) => return Reply::rejected(&err),
        };
        let result = match self
            .handlers
            .get::<UInt32Digital>(slot.channel().function())
            .and_then(|h| h.read.as_ref())
        {
            Some(reader) => reader(&*slot, mask),
            None => self.unsupported(&*slot, Operation::Read),
        };
        let notify = result.propagate.resolve(self.options.auto_interrupts);
        let value = result.value & mask;
        let (status, alarm) = self.complete(handle, Operation::Read, &result, |host| {
            host.set_param_value(handle, ParamValue::UInt32Digital { value, mask })?;
            if notify {
                host.call_param_callbacks(handle)?;
            }
            Ok(())
        });
        Reply {
            status,
            alarm,
            value: status.is_success().then_some(value),
        }
    }

    /// Write the bits of `value` selected by `mask`.
    pub fn write_uint32_digital(&self, handle: Handle, value: u32, mask: u32) -> Reply<()> {
        let slot = match self.typed_slot(handle, DataType::UInt32Digital) {
            Ok(slot) => slot,
            Err(err) => return Reply::rejected(&err),
        };
        let result = match self
            .handlers
            .get::<UInt32Digital>(slot.channel().function())
            .and_then(|h| h.write.as_ref())
        {
            Some(writer) => writer(&*slot, value, mask),
            None => self.unsupported(&*slot, Operation::Write),
        };
        let notify = result.propagate.resolve(self.options.auto_interrupts);
        let (status, alarm) = self.complete(handle, Operation::Write, &result, |host| {
            host.set_param_value(handle, ParamValue::UInt32Digital { value, mask })?;
            if notify {
                host.call_param_callbacks(handle)?;
            }
            Ok(())
        });
        Reply::done(status, alarm)
    }

    /// Read a string channel into `out`, returning the number of bytes.
    pub fn read_octet(&self, handle: Handle, out: &mut [u8]) -> Reply<usize> {
        let slot = match self.typed_slot(handle, DataType::Octet) {
            Ok(slot) => slot,
            Err(err) => return Reply::rejected(&err),
        };
        let mut buf = ArrayBuf::new(out);
        let result = match self
            .handlers
            .get::<Octet>(slot.channel().function())
            .and_then(|h| h.read.as_ref())
        {
            Some(reader) => reader(&*slot, &mut buf),
            None => self.unsupported(&*slot, Operation::Read),
        };
        let notify = result.propagate.resolve(self.options.auto_interrupts);
        let (status, alarm) = self.complete(handle, Operation::Read, &result, |host| {
            let text = String::from_utf8_lossy(buf.as_slice());
            host.set_param_value(handle, ParamValue::Octet(&text))?;
            if notify {
                host.call_param_callbacks(handle)?;
            }
            Ok(())
        });
        Reply {
            status,
            alarm,
            value: status.is_success().then_some(buf.len()),
        }
    }

    /// Write a string channel.
    pub fn write_octet(&self, handle: Handle, value: &str) -> Reply<()> {
        let slot = match self.typed_slot(handle, DataType::Octet) {
            Ok(slot) => slot,
            Err(err) => return Reply::rejected(&err),
        };
        let result = match self
            .handlers
            .get::<Octet>(slot.channel().function())
            .and_then(|h| h.write.as_ref())
        {
            Some(writer) => writer(&*slot, value),
            None => self.unsupported(&*slot, Operation::Write),
        };
        let notify = result.propagate.resolve(self.options.auto_interrupts);
        let (status, alarm) = self.complete(handle, Operation::Write, &result, |host| {
            host.set_param_value(handle, ParamValue::Octet(value))?;
            if notify {
                host.call_param_callbacks(handle)?;
            }
            Ok(())
        });
        Reply::done(status, alarm)
    }

    // -------------------------------------------------------------------------
    // Per-interface entry points
    // -------------------------------------------------------------------------

    scalar_entry_points! {
        Int32, i32, read_int32, write_int32;
        Int64, i64, read_int64, write_int64;
        Float64, f64, read_float64, write_float64;
    }

    array_entry_points! {
        Int8Array, i8, read_int8_array, write_int8_array;
        Int16Array, i16, read_int16_array, write_int16_array;
        Int32Array, i32, read_int32_array, write_int32_array;
        Int64Array, i64, read_int64_array, write_int64_array;
        Float32Array, f32, read_float32_array, write_float32_array;
        Float64Array, f64, read_float64_array, write_float64_array;
    }

    // -------------------------------------------------------------------------
    // Shared steps
    // -------------------------------------------------------------------------

    fn unsupported<T: Default>(&self, slot: &S, operation: Operation) -> HandlerResult<T> {
        let channel = slot.channel();
        let err = AutoparamError::MissingHandler {
            function: channel.function().to_string(),
            operation: operation.name(),
            data_type: channel.data_type(),
        };
        warn!(port = %self.port, handle = %channel.handle(), error = %err, "Unsupported operation");
        HandlerResult::unsupported()
    }

    /// Apply the handler outcome to the host parameter. The alarm is always
    /// stored; `apply` (value update and notification) only runs on success.
    /// When the host rejects the update, the elevated alarm replaces the
    /// stored one before the host lock is released.
    fn complete<T>(
        &self,
        handle: Handle,
        operation: Operation,
        result: &HandlerResult<T>,
        apply: impl FnOnce(&mut H) -> Result<(), HostError>,
    ) -> (Status, Alarm) {
        let mut status = result.status;
        let mut alarm = result.alarm;
        if !status.is_success() && !alarm.is_raised() {
            alarm = operation.failure_alarm();
        }

        let mut host = self.host.lock();
        let applied = host.set_param_alarm(handle, alarm).and_then(|()| {
            if status.is_success() {
                apply(&mut *host)
            } else {
                Ok(())
            }
        });

        if let Err(err) = applied {
            warn!(
                port = %self.port,
                %handle,
                operation = operation.name(),
                error = %err,
                "Host rejected parameter update"
            );
            status = err.status;
            if !alarm.is_raised() {
                alarm = operation.failure_alarm();
            }
            if let Err(err) = host.set_param_alarm(handle, alarm) {
                warn!(port = %self.port, %handle, error = %err, "Failed to store elevated alarm");
            }
        } else if !status.is_success() {
            debug!(port = %self.port, %handle, operation = operation.name(), %status, "Handler failed");
        }
        (status, alarm)
    }
}

impl Reply<()> {
    fn done(status: Status, alarm: Alarm) -> Self {
        Self {
            status,
            alarm,
            value: status.is_success().then_some(()),
        }
    }
}
