//! Validation and dispatch shared by every `Atomics` operation
//!
//! Validation, address resolution and value conversion happen here in safe
//! code. The memory access itself is one call into [`DataBlock`], picked by
//! element kind and monomorphized over the native integer type.

use std::sync::Arc;

use num_bigint::BigInt;

use crate::convert::{
    bigint_to_i64_wrapping, bigint_to_u64_wrapping, f64_to_int8, f64_to_int16, f64_to_int32,
    f64_to_uint8, f64_to_uint16, f64_to_uint32, to_bigint, to_index, to_integer_or_infinity,
};
use crate::data_block::{AtomicElement, DataBlock, RmwOp};
use crate::element_kind::ElementKind;
use crate::error::{VmError, VmResult};
use crate::typed_array::JsTypedArray;
use crate::typed_array_helper::validate_typed_array;
use crate::value::Value;

/// Expands `$body` once per integer element kind with `$t` bound to the
/// native type that stores it.
macro_rules! dispatch_integer_kind {
    ($kind:expr, $t:ident => $body:expr) => {
        match $kind {
            ElementKind::Int8 => {
                type $t = i8;
                $body
            }
            ElementKind::Uint8 => {
                type $t = u8;
                $body
            }
            ElementKind::Int16 => {
                type $t = i16;
                $body
            }
            ElementKind::Uint16 => {
                type $t = u16;
                $body
            }
            ElementKind::Int32 => {
                type $t = i32;
                $body
            }
            ElementKind::Uint32 => {
                type $t = u32;
                $body
            }
            ElementKind::BigInt64 => {
                type $t = i64;
                $body
            }
            ElementKind::BigUint64 => {
                type $t = u64;
                $body
            }
            other @ (ElementKind::Uint8Clamped | ElementKind::Float32 | ElementKind::Float64) => {
                unreachable!("{} passed integer typed array validation", other)
            }
        }
    };
}

/// A converted operand: an integer (possibly infinite) or a BigInt
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Result of ToIntegerOrInfinity
    Integer(f64),
    /// Result of ToBigInt
    BigInt(BigInt),
}

impl Operand {
    /// Convert `value` for an element of `kind`. May run user code.
    pub fn convert(kind: ElementKind, value: &Value) -> VmResult<Self> {
        if kind.is_bigint() {
            Ok(Operand::BigInt(to_bigint(value)?))
        } else {
            Ok(Operand::Integer(to_integer_or_infinity(value)?))
        }
    }

    /// The operand as a script value
    pub fn to_value(&self) -> Value {
        match self {
            Operand::Integer(n) => Value::number(*n),
            Operand::BigInt(b) => Value::bigint(b.clone()),
        }
    }
}

/// Native integer types that back atomics-capable element kinds
pub trait AtomicsNative: AtomicElement {
    /// Truncate or wrap an operand into this type
    fn from_operand(operand: &Operand) -> Self;
    /// Convert back to a Number or BigInt
    fn into_value(self) -> Value;
}

macro_rules! impl_number_native {
    ($($int:ty => $convert:ident),* $(,)?) => {
        $(
            impl AtomicsNative for $int {
                fn from_operand(operand: &Operand) -> Self {
                    match operand {
                        Operand::Integer(n) => $convert(*n),
                        Operand::BigInt(b) => bigint_to_u64_wrapping(b) as $int,
                    }
                }

                fn into_value(self) -> Value {
                    Value::number(self.into())
                }
            }
        )*
    };
}

impl_number_native! {
    i8 => f64_to_int8,
    u8 => f64_to_uint8,
    i16 => f64_to_int16,
    u16 => f64_to_uint16,
    i32 => f64_to_int32,
    u32 => f64_to_uint32,
}

impl AtomicsNative for i64 {
    fn from_operand(operand: &Operand) -> Self {
        match operand {
            Operand::BigInt(b) => bigint_to_i64_wrapping(b),
            Operand::Integer(n) => *n as i64,
        }
    }

    fn into_value(self) -> Value {
        Value::bigint(BigInt::from(self))
    }
}

impl AtomicsNative for u64 {
    fn from_operand(operand: &Operand) -> Self {
        match operand {
            Operand::BigInt(b) => bigint_to_u64_wrapping(b),
            Operand::Integer(n) => *n as u64,
        }
    }

    fn into_value(self) -> Value {
        Value::bigint(BigInt::from(self))
    }
}

fn index_overflow() -> VmError {
    VmError::range_error("Index is overflow")
}

fn detached() -> VmError {
    VmError::type_error("The ArrayBuffer of this value is detached buffer.")
}

/// ValidateIntegerTypedArray.
///
/// With `waitable` only Int32 and BigInt64 are accepted; otherwise any
/// wrapping integer kind or BigInt kind.
pub fn validate_integer_typed_array(value: &Value, waitable: bool) -> VmResult<&Arc<JsTypedArray>> {
    let ta = validate_typed_array(value)?;
    let kind = ta.kind();
    if waitable {
        if !kind.is_waitable() {
            return Err(VmError::type_error(format!(
                "{} is not an Int32Array or BigInt64Array",
                kind
            )));
        }
    } else if !kind.is_unclamped_integer() && !kind.is_bigint() {
        return Err(VmError::type_error(format!(
            "{} is not an integer typed array",
            kind
        )));
    }
    Ok(ta)
}

/// ValidateAtomicAccess: the byte index of element `request_index`.
pub fn validate_atomic_access(ta: &JsTypedArray, request_index: &Value) -> VmResult<usize> {
    let access_index = to_index(request_index)?;
    if access_index >= ta.length() as u64 {
        return Err(index_overflow());
    }
    Ok(access_index as usize * ta.kind().element_size() + ta.byte_offset())
}

/// Borrow the backing store again after user code may have run, checking
/// both detachment and that `byte_index` is still inside the view.
pub(crate) fn revalidate(ta: &JsTypedArray, byte_index: usize) -> VmResult<Arc<DataBlock>> {
    let block = ta.buffer().data().ok_or_else(detached)?;
    let view_end = ta.byte_offset() + ta.byte_length();
    if byte_index + ta.kind().element_size() > view_end {
        return Err(index_overflow());
    }
    Ok(block)
}

fn read_modify_write<T: AtomicsNative>(
    block: &DataBlock,
    byte_index: usize,
    op: RmwOp,
    operand: &Operand,
) -> VmResult<Value> {
    block
        .read_modify_write::<T>(byte_index, op, T::from_operand(operand))
        .map(T::into_value)
        .ok_or_else(index_overflow)
}

fn compare_exchange<T: AtomicsNative>(
    block: &DataBlock,
    byte_index: usize,
    expected: &Operand,
    replacement: &Operand,
) -> VmResult<Value> {
    block
        .compare_exchange::<T>(
            byte_index,
            T::from_operand(expected),
            T::from_operand(replacement),
        )
        .map(T::into_value)
        .ok_or_else(index_overflow)
}

fn store<T: AtomicsNative>(block: &DataBlock, byte_index: usize, operand: &Operand) -> VmResult<()> {
    if block.store::<T>(byte_index, T::from_operand(operand)) {
        Ok(())
    } else {
        Err(index_overflow())
    }
}

fn load<T: AtomicsNative>(block: &DataBlock, byte_index: usize) -> VmResult<Value> {
    block
        .load::<T>(byte_index)
        .map(T::into_value)
        .ok_or_else(index_overflow)
}

/// AtomicReadModifyWrite: apply `op` and return the previous element value.
pub fn atomic_read_modify_write(
    typed_array: &Value,
    index: &Value,
    value: &Value,
    op: RmwOp,
) -> VmResult<Value> {
    let ta = validate_integer_typed_array(typed_array, false)?;
    let byte_index = validate_atomic_access(ta, index)?;
    let kind = ta.kind();
    let operand = Operand::convert(kind, value)?;
    let block = revalidate(ta, byte_index)?;
    dispatch_integer_kind!(kind, T => read_modify_write::<T>(&block, byte_index, op, &operand))
}

/// AtomicCompareExchange: returns the value observed before the swap,
/// whether or not the swap happened.
pub fn atomic_compare_exchange(
    typed_array: &Value,
    index: &Value,
    expected: &Value,
    replacement: &Value,
) -> VmResult<Value> {
    let ta = validate_integer_typed_array(typed_array, false)?;
    let byte_index = validate_atomic_access(ta, index)?;
    let kind = ta.kind();
    let expected = Operand::convert(kind, expected)?;
    let replacement = Operand::convert(kind, replacement)?;
    let block = revalidate(ta, byte_index)?;
    dispatch_integer_kind!(kind, T => compare_exchange::<T>(&block, byte_index, &expected, &replacement))
}

/// AtomicStore: returns the converted value, not the truncated one.
pub fn atomic_store(typed_array: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    let ta = validate_integer_typed_array(typed_array, false)?;
    let byte_index = validate_atomic_access(ta, index)?;
    let kind = ta.kind();
    let operand = Operand::convert(kind, value)?;
    let block = revalidate(ta, byte_index)?;
    dispatch_integer_kind!(kind, T => store::<T>(&block, byte_index, &operand))?;
    Ok(operand.to_value())
}

/// AtomicLoad
pub fn atomic_load(typed_array: &Value, index: &Value) -> VmResult<Value> {
    let ta = validate_integer_typed_array(typed_array, false)?;
    let byte_index = validate_atomic_access(ta, index)?;
    let kind = ta.kind();
    let block = revalidate(ta, byte_index)?;
    dispatch_integer_kind!(kind, T => load::<T>(&block, byte_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentConfig};
    use crate::array_buffer::allocate_array_buffer;
    use crate::object::{JsObject, PropertyKey};
    use crate::typed_array_helper::{allocate_typed_array, create_from_array_buffer};

    fn typed(kind: ElementKind, len: u64) -> Value {
        let agent = Agent::new(AgentConfig::default());
        Value::typed_array(allocate_typed_array(&agent, kind, len).unwrap())
    }

    #[test]
    fn test_validate_integer_kinds() {
        for kind in ElementKind::ALL {
            let ta = typed(kind, 1);
            let plain = validate_integer_typed_array(&ta, false).is_ok();
            let waitable = validate_integer_typed_array(&ta, true).is_ok();
            assert_eq!(plain, kind.is_unclamped_integer() || kind.is_bigint(), "{}", kind);
            assert_eq!(waitable, kind.is_waitable(), "{}", kind);
        }
        let err = validate_integer_typed_array(&Value::object(JsObject::new()), false).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_validate_atomic_access_offsets() {
        let agent = Agent::new(AgentConfig::default());
        let buffer = allocate_array_buffer(&agent, 32).unwrap();
        let view = create_from_array_buffer(ElementKind::Int32, &buffer, &Value::int32(8), &Value::int32(4)).unwrap();
        for i in 0..4 {
            assert_eq!(validate_atomic_access(&view, &Value::int32(i)).unwrap(), i as usize * 4 + 8);
        }
        assert!(validate_atomic_access(&view, &Value::int32(4)).unwrap_err().is_range_error());
        assert!(validate_atomic_access(&view, &Value::int32(-1)).unwrap_err().is_range_error());
        assert_eq!(validate_atomic_access(&view, &Value::number(1.9)).unwrap(), 12);
    }

    #[test]
    fn test_rmw_returns_previous() {
        let ta = typed(ElementKind::Int16, 2);
        let idx = Value::int32(1);
        let prev = atomic_read_modify_write(&ta, &idx, &Value::int32(5), RmwOp::Add).unwrap();
        assert_eq!(prev.as_number(), Some(0.0));
        let prev = atomic_read_modify_write(&ta, &idx, &Value::int32(7), RmwOp::Sub).unwrap();
        assert_eq!(prev.as_number(), Some(5.0));
        assert_eq!(atomic_load(&ta, &idx).unwrap().as_number(), Some(-2.0));
    }

    #[test]
    fn test_store_returns_converted_value() {
        let ta = typed(ElementKind::Uint8, 1);
        let idx = Value::int32(0);
        let stored = atomic_store(&ta, &idx, &Value::number(256.7)).unwrap();
        assert_eq!(stored.as_number(), Some(256.0));
        assert_eq!(atomic_load(&ta, &idx).unwrap().as_number(), Some(0.0));

        let stored = atomic_store(&ta, &idx, &Value::number(-0.0)).unwrap();
        let n = stored.as_number().unwrap();
        assert!(n == 0.0 && n.is_sign_positive());

        let stored = atomic_store(&ta, &idx, &Value::number(f64::INFINITY)).unwrap();
        assert_eq!(stored.as_number(), Some(f64::INFINITY));
        assert_eq!(atomic_load(&ta, &idx).unwrap().as_number(), Some(0.0));
    }

    #[test]
    fn test_bigint_store_wraps() {
        let ta = typed(ElementKind::BigUint64, 1);
        let idx = Value::int32(0);
        let stored = atomic_store(&ta, &idx, &Value::bigint(BigInt::from(-1))).unwrap();
        assert_eq!(stored.as_bigint(), Some(&BigInt::from(-1)));
        assert_eq!(atomic_load(&ta, &idx).unwrap().as_bigint(), Some(&BigInt::from(u64::MAX)));
        assert!(atomic_store(&ta, &idx, &Value::int32(1)).unwrap_err().is_type_error());
    }

    #[test]
    fn test_compare_exchange() {
        let ta = typed(ElementKind::Int32, 1);
        let idx = Value::int32(0);
        atomic_store(&ta, &idx, &Value::int32(3)).unwrap();
        let seen = atomic_compare_exchange(&ta, &idx, &Value::int32(2), &Value::int32(9)).unwrap();
        assert_eq!(seen.as_number(), Some(3.0));
        assert_eq!(atomic_load(&ta, &idx).unwrap().as_number(), Some(3.0));
        let seen = atomic_compare_exchange(&ta, &idx, &Value::int32(3), &Value::int32(9)).unwrap();
        assert_eq!(seen.as_number(), Some(3.0));
        assert_eq!(atomic_load(&ta, &idx).unwrap().as_number(), Some(9.0));
    }

    #[test]
    fn test_compare_exchange_truncates_expected() {
        let ta = typed(ElementKind::Uint8, 1);
        let idx = Value::int32(0);
        atomic_store(&ta, &idx, &Value::int32(1)).unwrap();
        // 257 wraps to 1 and matches.
        atomic_compare_exchange(&ta, &idx, &Value::int32(257), &Value::int32(2)).unwrap();
        assert_eq!(atomic_load(&ta, &idx).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn test_detach_during_conversion_prevents_write() {
        let agent = Agent::new(AgentConfig::default());
        let ta = allocate_typed_array(&agent, ElementKind::Int32, 1).unwrap();
        let buffer = ta.buffer().clone();
        let held = buffer.data().unwrap();
        let value = JsObject::new();
        value.set(
            PropertyKey::from("valueOf"),
            Value::native_function("valueOf", move |_, _| {
                buffer.detach()?;
                Ok(Value::int32(5))
            }),
        );
        let ta = Value::typed_array(ta);
        let err = atomic_store(&ta, &Value::int32(0), &Value::object(value)).unwrap_err();
        assert!(err.is_type_error());
        assert_eq!(held.get::<i32>(0), Some(0));
    }

    #[test]
    fn test_detached_rejects_everything() {
        let agent = Agent::new(AgentConfig::default());
        let ta = allocate_typed_array(&agent, ElementKind::Int8, 4).unwrap();
        ta.buffer().detach().unwrap();
        let ta = Value::typed_array(ta);
        let idx = Value::int32(0);
        assert!(atomic_load(&ta, &idx).unwrap_err().is_type_error());
        assert!(atomic_store(&ta, &idx, &Value::int32(1)).unwrap_err().is_type_error());
        assert!(atomic_read_modify_write(&ta, &idx, &Value::int32(1), RmwOp::Or).unwrap_err().is_type_error());
    }
}
