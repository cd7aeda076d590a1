//! Data kinds understood by the host framework.
//!
//! [`DataType`] is the runtime tag a channel is declared with, [`ParamValue`]
//! is a borrowed value of any of those kinds on its way to the host, and
//! [`ArrayBuf`] is the bounded view array and octet read handlers fill in.

use serde::{Deserialize, Serialize};

// =============================================================================
// Declared Type
// =============================================================================

/// Declared type of a channel. Fixed for the lifetime of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum DataType {
    Int32,
    Int64,
    UInt32Digital,
    Float64,
    Octet,
    Int8Array,
    Int16Array,
    Int32Array,
    Int64Array,
    Float32Array,
    Float64Array,
}

impl DataType {
    /// Every declared type, in the order the host enumerates its interfaces.
    pub const ALL: [DataType; 11] = [
        DataType::Octet,
        DataType::UInt32Digital,
        DataType::Int32,
        DataType::Int64,
        DataType::Float64,
        DataType::Int8Array,
        DataType::Int16Array,
        DataType::Int32Array,
        DataType::Int64Array,
        DataType::Float32Array,
        DataType::Float64Array,
    ];

    /// Human readable name used in log messages.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::UInt32Digital => "UInt32Digital",
            DataType::Float64 => "Float64",
            DataType::Octet => "Octet",
            DataType::Int8Array => "Int8Array",
            DataType::Int16Array => "Int16Array",
            DataType::Int32Array => "Int32Array",
            DataType::Int64Array => "Int64Array",
            DataType::Float32Array => "Float32Array",
            DataType::Float64Array => "Float64Array",
        }
    }

    /// True for the six array kinds.
    pub fn is_array(self) -> bool {
        matches!(
            self,
            DataType::Int8Array
                | DataType::Int16Array
                | DataType::Int32Array
                | DataType::Int64Array
                | DataType::Float32Array
                | DataType::Float64Array
        )
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Values
// =============================================================================

/// A value of one of the declared types, borrowed for the duration of a host
/// call.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum ParamValue<'a> {
    Int32(i32),
    Int64(i64),
    /// Only the bits set in `mask` are meaningful.
    UInt32Digital {
        value: u32,
        mask: u32,
    },
    Float64(f64),
    Octet(&'a str),
    Int8Array(&'a [i8]),
    Int16Array(&'a [i16]),
    Int32Array(&'a [i32]),
    Int64Array(&'a [i64]),
    Float32Array(&'a [f32]),
    Float64Array(&'a [f64]),
}

impl ParamValue<'_> {
    /// The declared type this value belongs to.
    pub fn data_type(&self) -> DataType {
        match self {
            ParamValue::Int32(_) => DataType::Int32,
            ParamValue::Int64(_) => DataType::Int64,
            ParamValue::UInt32Digital { .. } => DataType::UInt32Digital,
            ParamValue::Float64(_) => DataType::Float64,
            ParamValue::Octet(_) => DataType::Octet,
            ParamValue::Int8Array(_) => DataType::Int8Array,
            ParamValue::Int16Array(_) => DataType::Int16Array,
            ParamValue::Int32Array(_) => DataType::Int32Array,
            ParamValue::Int64Array(_) => DataType::Int64Array,
            ParamValue::Float32Array(_) => DataType::Float32Array,
            ParamValue::Float64Array(_) => DataType::Float64Array,
        }
    }
}

// =============================================================================
// Bounded Read Buffer
// =============================================================================

/// Caller-owned buffer handed to array and octet read handlers.
///
/// The handler writes elements directly into the caller's storage and sets
/// the logical length, which can never exceed [`ArrayBuf::capacity`]. This
/// lets the host enforce its own record size limits without an extra copy.
#[derive(Debug)]
pub struct ArrayBuf<'a, T> {
    data: &'a mut [T],
    len: usize,
}

impl<'a, T: Copy> ArrayBuf<'a, T> {
    /// Wrap the caller's storage. The logical length starts at zero.
    pub fn new(data: &'a mut [T]) -> Self {
        Self { data, len: 0 }
    }

    /// Maximum number of elements the caller accepts.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current logical length.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no elements have been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the logical length, clamped to the capacity. Returns the length
    /// actually applied.
    pub fn set_len(&mut self, len: usize) -> usize {
        self.len = len.min(self.data.len());
        self.len
    }

    /// Copy as much of `src` as fits and set the length accordingly.
    /// Returns the number of elements copied.
    pub fn fill_from(&mut self, src: &[T]) -> usize {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        self.len = n;
        n
    }

    /// The whole underlying storage, for handlers that fill in place before
    /// calling [`ArrayBuf::set_len`].
    pub fn storage_mut(&mut self) -> &mut [T] {
        &mut self.data[..]
    }

    /// The elements written so far.
    pub fn as_slice(&self) -> &[T] {
        &self.data[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_buf_fill_truncates_to_capacity() {
        let mut storage = [0i16; 4];
        let mut buf = ArrayBuf::new(&mut storage);
        assert!(buf.is_empty());
        assert_eq!(buf.fill_from(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_array_buf_set_len_clamps() {
        let mut storage = [0.0f32; 3];
        let mut buf = ArrayBuf::new(&mut storage);
        buf.storage_mut()[0] = 1.5;
        assert_eq!(buf.set_len(10), 3);
        assert_eq!(buf.set_len(1), 1);
        assert_eq!(buf.as_slice(), &[1.5]);
    }

    #[test]
    fn test_data_type_names_and_values() {
        assert_eq!(DataType::Float32Array.to_string(), "Float32Array");
        assert!(DataType::Int8Array.is_array());
        assert!(!DataType::Octet.is_array());
        assert_eq!(ParamValue::Octet("x").data_type(), DataType::Octet);
        assert_eq!(
            ParamValue::UInt32Digital { value: 1, mask: 1 }.data_type(),
            DataType::UInt32Digital
        );
        assert_eq!(DataType::ALL.len(), 11);
    }
}
