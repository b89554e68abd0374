//! TypedArray views
//!
//! A typed array is a fixed-kind window over an ArrayBuffer. It never copies
//! data; reads and writes go straight to the buffer's backing store.

use std::sync::Arc;

use crate::array_buffer::JsArrayBuffer;
use crate::convert::{to_bigint, to_number};
use crate::element_kind::ElementKind;
use crate::error::{VmError, VmResult};
use crate::value::Value;

/// A JavaScript TypedArray
#[derive(Debug)]
pub struct JsTypedArray {
    /// The underlying buffer
    buffer: Arc<JsArrayBuffer>,
    /// Byte offset into the buffer
    byte_offset: usize,
    /// Number of elements (not bytes)
    length: usize,
    /// Element kind
    kind: ElementKind,
}

impl JsTypedArray {
    /// Create a view of `length` elements starting at `byte_offset`.
    pub fn new(
        buffer: Arc<JsArrayBuffer>,
        kind: ElementKind,
        byte_offset: usize,
        length: usize,
    ) -> VmResult<Self> {
        let elem_size = kind.element_size();
        if byte_offset % elem_size != 0 {
            return Err(VmError::range_error(format!(
                "start offset of {} should be a multiple of {}",
                kind, elem_size
            )));
        }
        let end = length
            .checked_mul(elem_size)
            .and_then(|bytes| bytes.checked_add(byte_offset))
            .ok_or_else(|| VmError::range_error("Invalid typed array length"))?;
        if end > buffer.byte_length() {
            return Err(VmError::range_error(format!(
                "Invalid typed array length: {}",
                length
            )));
        }
        Ok(Self {
            buffer,
            byte_offset,
            length,
            kind,
        })
    }

    /// Element kind
    #[inline]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// The viewed buffer
    #[inline]
    pub fn buffer(&self) -> &Arc<JsArrayBuffer> {
        &self.buffer
    }

    /// Whether the underlying buffer is detached
    pub fn is_detached(&self) -> bool {
        self.buffer.is_detached()
    }

    /// Byte offset into the buffer (0 if detached)
    pub fn byte_offset(&self) -> usize {
        if self.is_detached() { 0 } else { self.byte_offset }
    }

    /// Number of elements (0 if detached)
    pub fn length(&self) -> usize {
        if self.is_detached() { 0 } else { self.length }
    }

    /// Number of bytes covered (0 if detached)
    pub fn byte_length(&self) -> usize {
        self.length() * self.kind.element_size()
    }

    /// Byte index of element `index` within the buffer
    #[inline]
    pub(crate) fn element_byte_index(&self, index: usize) -> usize {
        self.byte_offset + index * self.kind.element_size()
    }

    /// IsValidIntegerIndex
    pub fn is_valid_integer_index(&self, index: f64) -> bool {
        if self.is_detached() || index.fract() != 0.0 || !index.is_finite() {
            return false;
        }
        if index == 0.0 && index.is_sign_negative() {
            return false;
        }
        index >= 0.0 && index < self.length as f64
    }

    /// IntegerIndexedElementGet; `None` for detached buffers or
    /// out-of-range indices.
    pub fn get_element(&self, index: usize) -> Option<Value> {
        if index >= self.length {
            return None;
        }
        self.buffer.get_value(self.element_byte_index(index), self.kind)
    }

    /// IntegerIndexedElementSet.
    ///
    /// The value is converted first (which may run user code); the store is
    /// skipped silently if the index is no longer valid afterwards.
    pub fn set_element(&self, index: f64, value: &Value) -> VmResult<()> {
        let numeric = to_numeric_for(self.kind, value)?;
        if self.is_valid_integer_index(index) {
            self.buffer
                .set_value(self.element_byte_index(index as usize), self.kind, &numeric);
        }
        Ok(())
    }
}

/// Convert `value` to the Number or BigInt that elements of `kind` hold.
pub fn to_numeric_for(kind: ElementKind, value: &Value) -> VmResult<Value> {
    if kind.is_bigint() {
        Ok(Value::bigint(to_bigint(value)?))
    } else {
        Ok(Value::number(to_number(value)?))
    }
}
