//! ArrayBuffer and SharedArrayBuffer
//!
//! Both flavours share one type: a length, a `shared` flag and a slot
//! holding the [`DataBlock`]. Detaching empties the slot; shared buffers
//! can never be detached, so their block lives as long as the buffer.

use std::sync::Arc;

use num_bigint::BigInt;
use parking_lot::RwLock;
use tracing::debug;

use crate::agent::Agent;
use crate::convert::{
    bigint_to_i64_wrapping, bigint_to_u64_wrapping, f64_to_int8, f64_to_int16, f64_to_int32,
    f64_to_uint8, f64_to_uint8_clamp, f64_to_uint16, f64_to_uint32,
};
use crate::data_block::DataBlock;
use crate::element_kind::ElementKind;
use crate::error::{VmError, VmResult};
use crate::value::Value;

/// A JavaScript ArrayBuffer or SharedArrayBuffer
pub struct JsArrayBuffer {
    /// The backing store. `None` once detached.
    data: RwLock<Option<Arc<DataBlock>>>,
    /// Length at allocation time
    byte_length: usize,
    /// SharedArrayBuffer
    shared: bool,
}

impl std::fmt::Debug for JsArrayBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsArrayBuffer")
            .field("byte_length", &self.byte_length())
            .field("shared", &self.shared)
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl JsArrayBuffer {
    /// Wrap an already allocated block
    pub fn from_block(block: DataBlock, shared: bool) -> Self {
        let byte_length = block.byte_length();
        Self {
            data: RwLock::new(Some(Arc::new(block))),
            byte_length,
            shared,
        }
    }

    /// Whether this is a SharedArrayBuffer
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Check if the buffer is detached
    pub fn is_detached(&self) -> bool {
        self.data.read().is_none()
    }

    /// Get the byte length (0 if detached)
    pub fn byte_length(&self) -> usize {
        if self.is_detached() { 0 } else { self.byte_length }
    }

    /// Borrow the backing store for the duration of one operation.
    ///
    /// The returned block stays valid even if the buffer is detached while
    /// it is held; callers must not retain it past the current operation.
    pub fn data(&self) -> Option<Arc<DataBlock>> {
        self.data.read().clone()
    }

    /// DetachArrayBuffer. Detaching twice is a no-op.
    pub fn detach(&self) -> VmResult<()> {
        if self.shared {
            return Err(VmError::type_error("Cannot detach a SharedArrayBuffer"));
        }
        if self.data.write().take().is_some() {
            debug!(byte_length = self.byte_length, "array buffer detached");
        }
        Ok(())
    }

    /// GetValueFromBuffer (unordered)
    pub fn get_value(&self, byte_index: usize, kind: ElementKind) -> Option<Value> {
        let block = self.data()?;
        get_value_from_block(&block, byte_index, kind)
    }

    /// SetValueInBuffer (unordered). `numeric` must already be a Number or
    /// BigInt matching the content type of `kind`.
    pub fn set_value(&self, byte_index: usize, kind: ElementKind, numeric: &Value) -> bool {
        match self.data() {
            Some(block) => set_value_in_block(&block, byte_index, kind, numeric),
            None => false,
        }
    }
}

/// AllocateArrayBuffer
pub fn allocate_array_buffer(agent: &Agent, byte_length: u64) -> VmResult<Arc<JsArrayBuffer>> {
    allocate(agent, byte_length, false)
}

/// AllocateSharedArrayBuffer
pub fn allocate_shared_array_buffer(
    agent: &Agent,
    byte_length: u64,
) -> VmResult<Arc<JsArrayBuffer>> {
    allocate(agent, byte_length, true)
}

fn allocate(agent: &Agent, byte_length: u64, shared: bool) -> VmResult<Arc<JsArrayBuffer>> {
    let limit = agent.config().max_array_buffer_byte_length;
    let byte_length = usize::try_from(byte_length)
        .ok()
        .filter(|len| *len <= limit)
        .ok_or_else(|| VmError::range_error("Out of range"))?;
    let block = DataBlock::new(byte_length, agent.memory_manager().clone()).map_err(|err| {
        debug!(byte_length, %err, "array buffer allocation failed");
        match err {
            VmError::OutOfMemory => VmError::range_error("Array buffer allocation failed"),
            other => other,
        }
    })?;
    debug!(byte_length, shared, "array buffer allocated");
    Ok(Arc::new(JsArrayBuffer::from_block(block, shared)))
}

/// CloneArrayBuffer: a fresh non-shared buffer holding
/// `src[src_byte_offset..src_byte_offset + byte_length]`.
pub fn clone_array_buffer(
    agent: &Agent,
    src: &JsArrayBuffer,
    src_byte_offset: usize,
    byte_length: usize,
) -> VmResult<Arc<JsArrayBuffer>> {
    let src_block = src
        .data()
        .ok_or_else(|| VmError::type_error("Cannot clone a detached ArrayBuffer"))?;
    let target = allocate_array_buffer(agent, byte_length as u64)?;
    let mut bytes = vec![0u8; byte_length];
    if !src_block.read_bytes(src_byte_offset, &mut bytes) {
        return Err(VmError::range_error("Source range is out of bounds"));
    }
    if let Some(block) = target.data() {
        block.write_bytes(0, &bytes);
    }
    Ok(target)
}

/// Decode one element of `kind` at `byte_index`
pub fn get_value_from_block(block: &DataBlock, byte_index: usize, kind: ElementKind) -> Option<Value> {
    let value = match kind {
        ElementKind::Int8 => Value::int32(block.get::<i8>(byte_index)?.into()),
        ElementKind::Uint8 | ElementKind::Uint8Clamped => {
            Value::int32(block.get::<u8>(byte_index)?.into())
        }
        ElementKind::Int16 => Value::int32(block.get::<i16>(byte_index)?.into()),
        ElementKind::Uint16 => Value::int32(block.get::<u16>(byte_index)?.into()),
        ElementKind::Int32 => Value::int32(block.get::<i32>(byte_index)?),
        ElementKind::Uint32 => Value::number(block.get::<u32>(byte_index)?.into()),
        ElementKind::Float32 => {
            Value::number(f32::from_bits(block.get::<u32>(byte_index)?).into())
        }
        ElementKind::Float64 => Value::number(f64::from_bits(block.get::<u64>(byte_index)?)),
        ElementKind::BigInt64 => Value::bigint(BigInt::from(block.get::<i64>(byte_index)?)),
        ElementKind::BigUint64 => Value::bigint(BigInt::from(block.get::<u64>(byte_index)?)),
    };
    Some(value)
}

/// Encode an already converted Number/BigInt as one element of `kind`
pub fn set_value_in_block(
    block: &DataBlock,
    byte_index: usize,
    kind: ElementKind,
    numeric: &Value,
) -> bool {
    if kind.is_bigint() {
        let Some(n) = numeric.as_bigint() else {
            return false;
        };
        return match kind {
            ElementKind::BigInt64 => block.set::<i64>(byte_index, bigint_to_i64_wrapping(n)),
            _ => block.set::<u64>(byte_index, bigint_to_u64_wrapping(n)),
        };
    }
    let n = numeric.as_number().unwrap_or(f64::NAN);
    match kind {
        ElementKind::Int8 => block.set::<i8>(byte_index, f64_to_int8(n)),
        ElementKind::Uint8 => block.set::<u8>(byte_index, f64_to_uint8(n)),
        ElementKind::Uint8Clamped => block.set::<u8>(byte_index, f64_to_uint8_clamp(n)),
        ElementKind::Int16 => block.set::<i16>(byte_index, f64_to_int16(n)),
        ElementKind::Uint16 => block.set::<u16>(byte_index, f64_to_uint16(n)),
        ElementKind::Int32 => block.set::<i32>(byte_index, f64_to_int32(n)),
        ElementKind::Uint32 => block.set::<u32>(byte_index, f64_to_uint32(n)),
        ElementKind::Float32 => block.set::<u32>(byte_index, (n as f32).to_bits()),
        ElementKind::Float64 => block.set::<u64>(byte_index, n.to_bits()),
        ElementKind::BigInt64 | ElementKind::BigUint64 => unreachable!("handled above"),
    }
}
