//! Handler results, handler sets and the per-type handler tables.
//!
//! A driver registers, per function name, a [`Handlers`] set for exactly one
//! data kind:
//!
//! ```rust,ignore
//! use autoparam_core::kind::Int32;
//! use autoparam_core::{Handlers, ReadResult, WriteResult, Status};
//!
//! builder.register::<Int32>("SUM", |h| {
//!     h.read(|slot| ReadResult::ok(slot.total()))
//!         .write(|slot, value| {
//!             slot.add(value);
//!             WriteResult::success()
//!         })
//!         .on_interrupt(|slot, active| {
//!             slot.set_polling(active);
//!             Status::Success
//!         })
//! })?;
//! ```
//!
//! The reader/writer signatures depend on the kind (see [`crate::kind`]), so
//! a handler for the wrong kind is a compile error rather than a runtime
//! dispatch failure.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, error};

use crate::channel::Slot;
use crate::error::{AutoparamError, AutoparamResult};
use crate::kind::{
    Float32Array, Float64, Float64Array, HandlerKind, Int16Array, Int32, Int32Array, Int64,
    Int64Array, Int8Array, Octet, UInt32Digital,
};
use crate::status::{Alarm, Propagate, Status};
use crate::types::{ArrayBuf, DataType};

// =============================================================================
// Handler Results
// =============================================================================

/// Outcome of a user handler.
///
/// `value` is the scalar read back for scalar reads and `()` everywhere else
/// (array reads fill the caller's [`ArrayBuf`] instead).
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResult<T = ()> {
    /// Operation status.
    pub status: Status,
    /// Alarm pair to apply to the parameter.
    pub alarm: Alarm,
    /// Whether to also notify interrupt subscribers.
    pub propagate: Propagate,
    /// Value read, if any.
    pub value: T,
}

/// Result of a read handler.
pub type ReadResult<T = ()> = HandlerResult<T>;

/// Result of a write handler.
pub type WriteResult = HandlerResult<()>;

impl<T: Default> Default for HandlerResult<T> {
    fn default() -> Self {
        Self::ok(T::default())
    }
}

impl<T> HandlerResult<T> {
    /// Successful result carrying `value`, no alarm, default propagation.
    pub fn ok(value: T) -> Self {
        Self {
            status: Status::Success,
            alarm: Alarm::NONE,
            propagate: Propagate::Default,
            value,
        }
    }

    /// Override the status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Raise `alarm` on the channel.
    pub fn with_alarm(mut self, alarm: Alarm) -> Self {
        self.alarm = alarm;
        self
    }

    /// Override interrupt propagation for this call.
    pub fn with_propagate(mut self, propagate: Propagate) -> Self {
        self.propagate = propagate;
        self
    }

    /// True when the handler reported success.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl<T: Default> HandlerResult<T> {
    /// Successful result with a default value.
    pub fn success() -> Self {
        Self::default()
    }

    /// Failed result. The value is left at its default and never applied.
    pub fn failed(status: Status) -> Self {
        Self::default().with_status(status)
    }

    /// What the dispatcher substitutes when no handler is registered.
    pub(crate) fn unsupported() -> Self {
        Self::failed(Status::Unsupported).with_alarm(Alarm::SOFT_INVALID)
    }
}

// =============================================================================
// Handler Signatures
// =============================================================================

/// Scalar read handler.
pub type ScalarReader<S, T> = Arc<dyn Fn(&S) -> ReadResult<T> + Send + Sync>;
/// Scalar write handler.
pub type ScalarWriter<S, T> = Arc<dyn Fn(&S, T) -> WriteResult + Send + Sync>;
/// Digital read handler; receives the mask of bits the caller is interested in.
pub type DigitalReader<S> = Arc<dyn Fn(&S, u32) -> ReadResult<u32> + Send + Sync>;
/// Digital write handler; receives value and mask.
pub type DigitalWriter<S> = Arc<dyn Fn(&S, u32, u32) -> WriteResult + Send + Sync>;
/// Array (and octet) read handler filling a bounded buffer.
pub type ArrayReader<S, T> = Arc<dyn Fn(&S, &mut ArrayBuf<'_, T>) -> ReadResult + Send + Sync>;
/// Array write handler.
pub type ArrayWriter<S, T> = Arc<dyn Fn(&S, &[T]) -> WriteResult + Send + Sync>;
/// Octet write handler.
pub type OctetWriter<S> = Arc<dyn Fn(&S, &str) -> WriteResult + Send + Sync>;
/// Interrupt subscription callback: `true` on the first subscriber, `false`
/// when the last one goes away.
pub type InterruptCallback<S> = Arc<dyn Fn(&S, bool) -> Status + Send + Sync>;

// =============================================================================
// Handler Sets
// =============================================================================

/// Read, write and interrupt handlers of one function name. Any of them may
/// be absent.
pub struct Handlers<S: Slot, K: HandlerKind<S>> {
    pub(crate) read: Option<K::Reader>,
    pub(crate) write: Option<K::Writer>,
    pub(crate) interrupt: Option<InterruptCallback<S>>,
    _kind: PhantomData<fn() -> K>,
}

impl<S: Slot, K: HandlerKind<S>> Handlers<S, K> {
    /// Empty set: reads and writes are unsupported, subscriptions are only
    /// counted.
    pub fn new() -> Self {
        Self {
            read: None,
            write: None,
            interrupt: None,
            _kind: PhantomData,
        }
    }

    /// Callback run on the 0→1 (`true`) and 1→0 (`false`) subscriber
    /// transitions of a channel.
    pub fn on_interrupt(
        mut self,
        callback: impl Fn(&S, bool) -> Status + Send + Sync + 'static,
    ) -> Self {
        self.interrupt = Some(Arc::new(callback));
        self
    }

    /// A read handler is set.
    pub fn has_read(&self) -> bool {
        self.read.is_some()
    }

    /// A write handler is set.
    pub fn has_write(&self) -> bool {
        self.write.is_some()
    }

    /// An interrupt callback is set.
    pub fn has_interrupt(&self) -> bool {
        self.interrupt.is_some()
    }
}

impl<S: Slot, K: HandlerKind<S>> Default for Handlers<S, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Slot, K: HandlerKind<S>> Clone for Handlers<S, K> {
    fn clone(&self) -> Self {
        Self {
            read: self.read.clone(),
            write: self.write.clone(),
            interrupt: self.interrupt.clone(),
            _kind: PhantomData,
        }
    }
}

impl<S: Slot, K: HandlerKind<S>> fmt::Debug for Handlers<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("data_type", &K::DATA_TYPE)
            .field("read", &self.has_read())
            .field("write", &self.has_write())
            .field("interrupt", &self.has_interrupt())
            .finish()
    }
}

// =============================================================================
// Handler Tables
// =============================================================================

/// Function name → handler set, for one kind.
pub type HandlerMap<S, K> = HashMap<String, Handlers<S, K>>;

/// One handler map per data kind plus the function → type index that makes
/// every function name belong to exactly one kind.
///
/// Written only while the driver is being built, read-only afterwards.
pub struct HandlerTables<S: Slot> {
    function_types: HashMap<String, DataType>,
    pub(crate) int32: HandlerMap<S, Int32>,
    pub(crate) int64: HandlerMap<S, Int64>,
    pub(crate) digital: HandlerMap<S, UInt32Digital>,
    pub(crate) float64: HandlerMap<S, Float64>,
    pub(crate) octet: HandlerMap<S, Octet>,
    pub(crate) int8_array: HandlerMap<S, Int8Array>,
    pub(crate) int16_array: HandlerMap<S, Int16Array>,
    pub(crate) int32_array: HandlerMap<S, Int32Array>,
    pub(crate) int64_array: HandlerMap<S, Int64Array>,
    pub(crate) float32_array: HandlerMap<S, Float32Array>,
    pub(crate) float64_array: HandlerMap<S, Float64Array>,
}

impl<S: Slot> HandlerTables<S> {
    /// Empty tables.
    pub fn new() -> Self {
        Self {
            function_types: HashMap::new(),
            int32: HashMap::new(),
            int64: HashMap::new(),
            digital: HashMap::new(),
            float64: HashMap::new(),
            octet: HashMap::new(),
            int8_array: HashMap::new(),
            int16_array: HashMap::new(),
            int32_array: HashMap::new(),
            int64_array: HashMap::new(),
            float32_array: HashMap::new(),
            float64_array: HashMap::new(),
        }
    }

    /// Register `handlers` for `function` under kind `K`.
    ///
    /// Registering the same function again under the same kind replaces the
    /// handlers. Registering it under a different kind is refused, logged,
    /// and leaves the existing registration untouched.
    pub fn register<K: HandlerKind<S>>(
        &mut self,
        function: &str,
        handlers: Handlers<S, K>,
    ) -> AutoparamResult<()> {
        let requested = K::DATA_TYPE;
        if let Some(&registered) = self.function_types.get(function) {
            if registered != requested {
                error!(
                    function,
                    %registered,
                    %requested,
                    "Refusing to register handlers under a second data type"
                );
                return Err(AutoparamError::TypeConflict {
                    function: function.to_string(),
                    registered,
                    requested,
                });
            }
        }

        debug!(function, data_type = %requested, ?handlers, "Registering handlers");
        self.function_types.insert(function.to_string(), requested);
        K::table_mut(self).insert(function.to_string(), handlers);
        Ok(())
    }

    /// Declared type a function is registered under.
    pub fn data_type_of(&self, function: &str) -> Option<DataType> {
        self.function_types.get(function).copied()
    }

    /// Handler set of `function` for kind `K`.
    pub fn get<K: HandlerKind<S>>(&self, function: &str) -> Option<&Handlers<S, K>> {
        K::table(self).get(function)
    }

    /// Registered functions and their types, sorted by name.
    pub fn functions(&self) -> Vec<(&str, DataType)> {
        let mut list: Vec<_> = self
            .function_types
            .iter()
            .map(|(name, ty)| (name.as_str(), *ty))
            .collect();
        list.sort_unstable();
        list
    }

    /// Number of registered functions.
    pub fn len(&self) -> usize {
        self.function_types.len()
    }

    /// True when nothing is registered yet.
    pub fn is_empty(&self) -> bool {
        self.function_types.is_empty()
    }

    /// Interrupt callback of `function`, looked up in the table for
    /// `data_type`.
    pub fn interrupt_callback(
        &self,
        data_type: DataType,
        function: &str,
    ) -> Option<InterruptCallback<S>> {
        match data_type {
            DataType::Int32 => self.interrupt_for::<Int32>(function),
            DataType::Int64 => self.interrupt_for::<Int64>(function),
            DataType::UInt32Digital => self.interrupt_for::<UInt32Digital>(function),
            DataType::Float64 => self.interrupt_for::<Float64>(function),
            DataType::Octet => self.interrupt_for::<Octet>(function),
            DataType::Int8Array => self.interrupt_for::<Int8Array>(function),
            DataType::Int16Array => self.interrupt_for::<Int16Array>(function),
            DataType::Int32Array => self.interrupt_for::<Int32Array>(function),
            DataType::Int64Array => self.interrupt_for::<Int64Array>(function),
            DataType::Float32Array => self.interrupt_for::<Float32Array>(function),
            DataType::Float64Array => self.interrupt_for::<Float64Array>(function),
        }
    }

    fn interrupt_for<K: HandlerKind<S>>(&self, function: &str) -> Option<InterruptCallback<S>> {
        self.get::<K>(function)
            .and_then(|handlers| handlers.interrupt.clone())
    }
}

impl<S: Slot> Default for HandlerTables<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Slot> fmt::Debug for HandlerTables<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.functions()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_second_type_is_rejected_and_first_kept() {
        let mut tables = HandlerTables::<Channel>::new();
        tables
            .register("X", Handlers::<Channel, Int32>::new().read(|_| ReadResult::ok(1)))
            .unwrap();

        let err = tables
            .register("X", Handlers::<Channel, Float64>::new().read(|_| ReadResult::ok(2.0)))
            .unwrap_err();
        assert!(matches!(
            err,
            AutoparamError::TypeConflict {
                registered: DataType::Int32,
                requested: DataType::Float64,
                ..
            }
        ));

        assert_eq!(tables.data_type_of("X"), Some(DataType::Int32));
        assert!(tables.get::<Int32>("X").is_some_and(|h| h.has_read()));
        assert!(tables.get::<Float64>("X").is_none());
        assert!(logs_contain("Refusing to register handlers under a second data type"));
    }

    #[test]
    fn test_same_type_registration_is_idempotent() {
        let mut tables = HandlerTables::<Channel>::new();
        for _ in 0..2 {
            tables
                .register(
                    "COUNT",
                    Handlers::<Channel, Int64>::new().write(|_, _| WriteResult::success()),
                )
                .unwrap();
        }
        assert_eq!(tables.len(), 1);
        assert!(tables.get::<Int64>("COUNT").is_some_and(|h| h.has_write()));
    }

    #[test]
    fn test_interrupt_callback_lookup_uses_type_table() {
        let mut tables = HandlerTables::<Channel>::new();
        tables
            .register(
                "WAVE",
                Handlers::<Channel, Float32Array>::new().on_interrupt(|_, _| Status::Success),
            )
            .unwrap();
        tables
            .register("LONG", Handlers::<Channel, Int32>::new())
            .unwrap();

        assert!(tables
            .interrupt_callback(DataType::Float32Array, "WAVE")
            .is_some());
        assert!(tables.interrupt_callback(DataType::Int32, "WAVE").is_none());
        assert!(tables.interrupt_callback(DataType::Int32, "LONG").is_none());
        assert_eq!(
            tables.functions(),
            vec![("LONG", DataType::Int32), ("WAVE", DataType::Float32Array)]
        );
    }

    #[test]
    fn test_result_builders() {
        let unsupported = ReadResult::<i32>::unsupported();
        assert_eq!(unsupported.status, Status::Unsupported);
        assert_eq!(unsupported.alarm, Alarm::SOFT_INVALID);

        let result = ReadResult::ok(3.5).with_propagate(Propagate::On);
        assert!(result.is_success());
        assert_eq!(result.value, 3.5);
        assert_eq!(result.propagate, Propagate::On);

        let failed = WriteResult::failed(Status::Timeout);
        assert!(!failed.is_success());
    }
}
