//! Compile-time handler kinds.
//!
//! Each of the eleven declared types has a zero-sized marker type here. The
//! marker implements [`HandlerKind`], which fixes the read/write handler
//! signatures for that type and points at the matching map inside
//! [`HandlerTables`]. Two family traits share the dispatch code:
//!
//! | Family        | Kinds                                   | Read handler              | Write handler        |
//! |---------------|-----------------------------------------|---------------------------|----------------------|
//! | [`ScalarKind`]| `Int32`, `Int64`, `Float64`             | `Fn(&S) -> ReadResult<T>` | `Fn(&S, T)`          |
//! | [`ArrayKind`] | `Int8Array` … `Float64Array`            | `Fn(&S, &mut ArrayBuf<T>)`| `Fn(&S, &[T])`       |
//! | (own)         | `UInt32Digital`                         | `Fn(&S, mask)`            | `Fn(&S, value, mask)`|
//! | (own)         | `Octet`                                 | `Fn(&S, &mut ArrayBuf<u8>)`| `Fn(&S, &str)`      |

use std::fmt::Debug;
use std::sync::Arc;

use crate::channel::Slot;
use crate::handler::{
    ArrayReader, ArrayWriter, DigitalReader, DigitalWriter, HandlerMap, HandlerTables, Handlers,
    OctetWriter, ReadResult, ScalarReader, ScalarWriter, WriteResult,
};
use crate::types::{ArrayBuf, DataType, ParamValue};

/// A data kind handlers can be registered for.
pub trait HandlerKind<S: Slot>: Sized + Send + Sync + 'static {
    /// Runtime tag of this kind.
    const DATA_TYPE: DataType;
    /// Read handler signature.
    type Reader: Clone + Send + Sync;
    /// Write handler signature.
    type Writer: Clone + Send + Sync;

    /// The map holding this kind's handlers.
    fn table(tables: &HandlerTables<S>) -> &HandlerMap<S, Self>;
    /// Mutable access to the map holding this kind's handlers.
    fn table_mut(tables: &mut HandlerTables<S>) -> &mut HandlerMap<S, Self>;
}

/// Kinds whose handlers exchange a single `Copy` value.
pub trait ScalarKind<S: Slot>: HandlerKind<S> {
    /// Rust type of the value.
    type Value: Copy + Default + Debug + Send + 'static;

    fn call_read(reader: &Self::Reader, slot: &S) -> ReadResult<Self::Value>;
    fn call_write(writer: &Self::Writer, slot: &S, value: Self::Value) -> WriteResult;
    fn param_value(value: Self::Value) -> ParamValue<'static>;
}

/// Kinds whose handlers exchange a slice of elements.
pub trait ArrayKind<S: Slot>: HandlerKind<S> {
    /// Rust type of one element.
    type Elem: Copy + Default + Debug + Send + Sync + 'static;

    fn call_read(reader: &Self::Reader, slot: &S, buf: &mut ArrayBuf<'_, Self::Elem>)
        -> ReadResult;
    fn call_write(writer: &Self::Writer, slot: &S, value: &[Self::Elem]) -> WriteResult;
    fn param_value(value: &[Self::Elem]) -> ParamValue<'_>;
}

macro_rules! scalar_kind {
    ($(#[$doc:meta])* $kind:ident, $value:ty, $field:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $kind;

        impl<S: Slot> HandlerKind<S> for $kind {
            const DATA_TYPE: DataType = DataType::$kind;
            type Reader = ScalarReader<S, $value>;
            type Writer = ScalarWriter<S, $value>;

            fn table(tables: &HandlerTables<S>) -> &HandlerMap<S, Self> {
                &tables.$field
            }

            fn table_mut(tables: &mut HandlerTables<S>) -> &mut HandlerMap<S, Self> {
                &mut tables.$field
            }
        }

        impl<S: Slot> ScalarKind<S> for $kind {
            type Value = $value;

            fn call_read(reader: &Self::Reader, slot: &S) -> ReadResult<$value> {
                reader(slot)
            }

            fn call_write(writer: &Self::Writer, slot: &S, value: $value) -> WriteResult {
                writer(slot, value)
            }

            fn param_value(value: $value) -> ParamValue<'static> {
                ParamValue::$kind(value)
            }
        }

        impl<S: Slot> Handlers<S, $kind> {
            /// Set the read handler.
            pub fn read(
                mut self,
                handler: impl Fn(&S) -> ReadResult<$value> + Send + Sync + 'static,
            ) -> Self {
                self.read = Some(Arc::new(handler));
                self
            }

            /// Set the write handler.
            pub fn write(
                mut self,
                handler: impl Fn(&S, $value) -> WriteResult + Send + Sync + 'static,
            ) -> Self {
                self.write = Some(Arc::new(handler));
                self
            }
        }
    };
}

macro_rules! array_kind {
    ($(#[$doc:meta])* $kind:ident, $elem:ty, $field:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $kind;

        impl<S: Slot> HandlerKind<S> for $kind {
            const DATA_TYPE: DataType = DataType::$kind;
            type Reader = ArrayReader<S, $elem>;
            type Writer = ArrayWriter<S, $elem>;

            fn table(tables: &HandlerTables<S>) -> &HandlerMap<S, Self> {
                &tables.$field
            }

            fn table_mut(tables: &mut HandlerTables<S>) -> &mut HandlerMap<S, Self> {
                &mut tables.$field
            }
        }

        impl<S: Slot> ArrayKind<S> for $kind {
            type Elem = $elem;

            fn call_read(
                reader: &Self::Reader,
                slot: &S,
                buf: &mut ArrayBuf<'_, $elem>,
            ) -> ReadResult {
                reader(slot, buf)
            }

            fn call_write(writer: &Self::Writer, slot: &S, value: &[$elem]) -> WriteResult {
                writer(slot, value)
            }

            fn param_value(value: &[$elem]) -> ParamValue<'_> {
                ParamValue::$kind(value)
            }
        }

        impl<S: Slot> Handlers<S, $kind> {
            /// Set the read handler. It fills the caller's bounded buffer.
            pub fn read(
                mut self,
                handler: impl Fn(&S, &mut ArrayBuf<'_, $elem>) -> ReadResult + Send + Sync + 'static,
            ) -> Self {
                self.read = Some(Arc::new(handler));
                self
            }

            /// Set the write handler.
            pub fn write(
                mut self,
                handler: impl Fn(&S, &[$elem]) -> WriteResult + Send + Sync + 'static,
            ) -> Self {
                self.write = Some(Arc::new(handler));
                self
            }
        }
    };
}

scalar_kind!(
    /// 32-bit signed integer.
    Int32, i32, int32
);
scalar_kind!(
    /// 64-bit signed integer.
    Int64, i64, int64
);
scalar_kind!(
    /// 64-bit float.
    Float64, f64, float64
);

array_kind!(
    /// Array of `i8`.
    Int8Array, i8, int8_array
);
array_kind!(
    /// Array of `i16`.
    Int16Array, i16, int16_array
);
array_kind!(
    /// Array of `i32`.
    Int32Array, i32, int32_array
);
array_kind!(
    /// Array of `i64`.
    Int64Array, i64, int64_array
);
array_kind!(
    /// Array of `f32`.
    Float32Array, f32, float32_array
);
array_kind!(
    /// Array of `f64`.
    Float64Array, f64, float64_array
);

// =============================================================================
// Digital
// =============================================================================

/// 32-bit unsigned value qualified by a bit mask.
#[derive(Debug, Clone, Copy, Default)]
pub struct UInt32Digital;

impl<S: Slot> HandlerKind<S> for UInt32Digital {
    const DATA_TYPE: DataType = DataType::UInt32Digital;
    type Reader = DigitalReader<S>;
    type Writer = DigitalWriter<S>;

    fn table(tables: &HandlerTables<S>) -> &HandlerMap<S, Self> {
        &tables.digital
    }

    fn table_mut(tables: &mut HandlerTables<S>) -> &mut HandlerMap<S, Self> {
        &mut tables.digital
    }
}

impl<S: Slot> Handlers<S, UInt32Digital> {
    /// Set the read handler. It receives the mask of requested bits; bits
    /// outside the mask are cleared from whatever it returns.
    pub fn read(
        mut self,
        handler: impl Fn(&S, u32) -> ReadResult<u32> + Send + Sync + 'static,
    ) -> Self {
        self.read = Some(Arc::new(handler));
        self
    }

    /// Set the write handler. It receives the value and the mask of bits to
    /// change.
    pub fn write(
        mut self,
        handler: impl Fn(&S, u32, u32) -> WriteResult + Send + Sync + 'static,
    ) -> Self {
        self.write = Some(Arc::new(handler));
        self
    }
}

// =============================================================================
// Octet
// =============================================================================

/// Character string, read into a bounded byte buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Octet;

impl<S: Slot> HandlerKind<S> for Octet {
    const DATA_TYPE: DataType = DataType::Octet;
    type Reader = ArrayReader<S, u8>;
    type Writer = OctetWriter<S>;

    fn table(tables: &HandlerTables<S>) -> &HandlerMap<S, Self> {
        &tables.octet
    }

    fn table_mut(tables: &mut HandlerTables<S>) -> &mut HandlerMap<S, Self> {
        &mut tables.octet
    }
}

impl<S: Slot> Handlers<S, Octet> {
    /// Set the read handler. It writes bytes into the caller's buffer.
    pub fn read(
        mut self,
        handler: impl Fn(&S, &mut ArrayBuf<'_, u8>) -> ReadResult + Send + Sync + 'static,
    ) -> Self {
        self.read = Some(Arc::new(handler));
        self
    }

    /// Set the write handler.
    pub fn write(
        mut self,
        handler: impl Fn(&S, &str) -> WriteResult + Send + Sync + 'static,
    ) -> Self {
        self.write = Some(Arc::new(handler));
        self
    }
}
