//! Typed array construction, validation and sorting
//!
//! The four `new XArray(...)` paths (length, typed array, buffer, object),
//! `ValidateTypedArray`, and the `SortCompare` comparator used by
//! `%TypedArray%.prototype.sort`.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::agent::Agent;
use crate::array_buffer::{
    JsArrayBuffer, allocate_array_buffer, clone_array_buffer, get_value_from_block,
    set_value_in_block,
};
use crate::convert::{to_index, to_number};
use crate::element_kind::ElementKind;
use crate::error::{VmError, VmResult};
use crate::object::{self, PropertyKey, get_method, iterable_to_list, length_of_array_like};
use crate::typed_array::JsTypedArray;
use crate::value::Value;

/// Largest element count a typed array may be created with
pub const MAX_TYPED_ARRAY_LENGTH: u64 = u32::MAX as u64;

const DETACHED_MESSAGE: &str = "The ArrayBuffer of this value is detached buffer.";

/// `new <constructor_name>(...args)`.
pub fn typed_array_constructor(
    agent: &Agent,
    constructor_name: &str,
    new_target: &Value,
    args: &[Value],
) -> VmResult<Value> {
    let kind = ElementKind::from_name(constructor_name).ok_or_else(|| {
        VmError::internal(format!("{} is not a typed array constructor", constructor_name))
    })?;
    construct(agent, kind, new_target, args).map(Value::typed_array)
}

/// Construct a typed array of `kind` from constructor arguments.
pub fn construct(
    agent: &Agent,
    kind: ElementKind,
    new_target: &Value,
    args: &[Value],
) -> VmResult<Arc<JsTypedArray>> {
    if new_target.is_undefined() {
        return Err(VmError::type_error(format!(
            "Constructor {} requires 'new'",
            kind
        )));
    }
    let undefined = Value::undefined();
    let first = args.first().unwrap_or(&undefined);

    if !first.is_object() {
        let element_length = to_index(first)?;
        return allocate_typed_array(agent, kind, element_length);
    }
    if let Some(src) = first.as_typed_array() {
        return create_from_typed_array(agent, kind, src);
    }
    if let Some(buffer) = first.as_array_buffer() {
        let byte_offset = args.get(1).unwrap_or(&undefined);
        let length = args.get(2).unwrap_or(&undefined);
        return create_from_array_buffer(kind, buffer, byte_offset, length);
    }
    create_from_ordinary_object(agent, kind, first)
}

/// AllocateTypedArray with a fresh zero-filled buffer
pub fn allocate_typed_array(
    agent: &Agent,
    kind: ElementKind,
    length: u64,
) -> VmResult<Arc<JsTypedArray>> {
    if length > MAX_TYPED_ARRAY_LENGTH {
        return Err(VmError::range_error(format!(
            "Invalid typed array length: {}",
            length
        )));
    }
    let byte_length = length * kind.element_size() as u64;
    let buffer = allocate_array_buffer(agent, byte_length)?;
    Ok(Arc::new(JsTypedArray::new(buffer, kind, 0, length as usize)?))
}

/// `new XArray(typedArray)`
pub fn create_from_typed_array(
    agent: &Agent,
    kind: ElementKind,
    src: &JsTypedArray,
) -> VmResult<Arc<JsTypedArray>> {
    let src_buffer = src.buffer();
    if src_buffer.is_detached() {
        return Err(VmError::type_error(DETACHED_MESSAGE));
    }
    let src_kind = src.kind();
    let element_length = src.length();
    let src_byte_offset = src.byte_offset();
    let byte_length = element_length * kind.element_size();

    if src_kind == kind {
        let data = clone_array_buffer(agent, src_buffer, src_byte_offset, byte_length)?;
        return Ok(Arc::new(JsTypedArray::new(data, kind, 0, element_length)?));
    }

    let data = allocate_array_buffer(agent, byte_length as u64)?;
    let src_block = src_buffer
        .data()
        .ok_or_else(|| VmError::type_error(DETACHED_MESSAGE))?;
    if src_kind.content_type() != kind.content_type() {
        return Err(VmError::type_error(format!(
            "Cannot mix BigInt and other types: {} from {}",
            kind, src_kind
        )));
    }
    if let Some(dst_block) = data.data() {
        let src_size = src_kind.element_size();
        let dst_size = kind.element_size();
        for i in 0..element_length {
            if let Some(v) = get_value_from_block(&src_block, src_byte_offset + i * src_size, src_kind) {
                set_value_in_block(&dst_block, i * dst_size, kind, &v);
            }
        }
    }
    Ok(Arc::new(JsTypedArray::new(data, kind, 0, element_length)?))
}

/// `new XArray(buffer, byteOffset, length)`
pub fn create_from_array_buffer(
    kind: ElementKind,
    buffer: &Arc<JsArrayBuffer>,
    byte_offset: &Value,
    length: &Value,
) -> VmResult<Arc<JsTypedArray>> {
    let elem_size = kind.element_size() as u64;
    let offset = to_index(byte_offset)?;
    if offset % elem_size != 0 {
        return Err(VmError::range_error(format!(
            "start offset of {} should be a multiple of {}",
            kind, elem_size
        )));
    }
    let new_length = if length.is_undefined() {
        None
    } else {
        Some(to_index(length)?)
    };
    if buffer.is_detached() {
        return Err(VmError::type_error(DETACHED_MESSAGE));
    }
    let buffer_byte_length = buffer.byte_length() as u64;

    let new_byte_length = match new_length {
        None => {
            if buffer_byte_length % elem_size != 0 {
                return Err(VmError::range_error(format!(
                    "byte length of {} should be a multiple of {}",
                    kind, elem_size
                )));
            }
            buffer_byte_length.checked_sub(offset).ok_or_else(|| {
                VmError::range_error(format!(
                    "Start offset {} is outside the bounds of the buffer",
                    offset
                ))
            })?
        }
        Some(len) => len
            .checked_mul(elem_size)
            .filter(|bytes| offset.saturating_add(*bytes) <= buffer_byte_length)
            .ok_or_else(|| VmError::range_error(format!("Invalid typed array length: {}", len)))?,
    };

    let view = JsTypedArray::new(
        buffer.clone(),
        kind,
        offset as usize,
        (new_byte_length / elem_size) as usize,
    )?;
    Ok(Arc::new(view))
}

/// `new XArray(object)`: iterable or array-like source
pub fn create_from_ordinary_object(
    agent: &Agent,
    kind: ElementKind,
    source: &Value,
) -> VmResult<Arc<JsTypedArray>> {
    if let Some(method) = get_method(source, &PropertyKey::iterator())? {
        let values = iterable_to_list(source, &method)?;
        let ta = allocate_typed_array(agent, kind, values.len() as u64)?;
        for (k, value) in values.iter().enumerate() {
            ta.set_element(k as f64, value)?;
        }
        return Ok(ta);
    }

    let len = length_of_array_like(source)?;
    let ta = allocate_typed_array(agent, kind, len)?;
    for k in 0..len {
        let value = object::get(source, &PropertyKey::Index(k as u32));
        ta.set_element(k as f64, &value)?;
    }
    Ok(ta)
}

/// ValidateTypedArray: `value` must be a typed array over an attached buffer.
pub fn validate_typed_array(value: &Value) -> VmResult<&Arc<JsTypedArray>> {
    let ta = value
        .as_typed_array()
        .ok_or_else(|| VmError::type_error("this is not a typed array."))?;
    if ta.is_detached() {
        return Err(VmError::type_error(DETACHED_MESSAGE));
    }
    Ok(ta)
}

/// SortCompare for typed array elements.
///
/// `comparator` is `undefined` or a callable. A comparator that detaches
/// `buffer` makes the comparison fail.
pub fn sort_compare(
    comparator: &Value,
    buffer: &JsArrayBuffer,
    x: &Value,
    y: &Value,
) -> VmResult<Ordering> {
    if !comparator.is_undefined() {
        let result = comparator.call(&Value::undefined(), &[x.clone(), y.clone()])?;
        let v = to_number(&result)?;
        if buffer.is_detached() {
            return Err(VmError::type_error(DETACHED_MESSAGE));
        }
        return Ok(if v < 0.0 {
            Ordering::Less
        } else if v > 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        });
    }

    if let (Some(a), Some(b)) = (x.as_bigint(), y.as_bigint()) {
        return Ok(a.cmp(b));
    }

    let a = x.as_number().unwrap_or(f64::NAN);
    let b = y.as_number().unwrap_or(f64::NAN);
    Ok(match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            if a < b {
                Ordering::Less
            } else if a > b {
                Ordering::Greater
            } else if a == 0.0 && b == 0.0 {
                match (a.is_sign_negative(), b.is_sign_negative()) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                }
            } else {
                Ordering::Equal
            }
        }
    })
}

/// `%TypedArray%.prototype.sort(comparator)`, in place and stable.
///
/// Errors raised by the comparator abort the sort before anything is
/// written back.
pub fn sort_typed_array(this: &Value, comparator: &Value) -> VmResult<Value> {
    if !comparator.is_undefined() && !comparator.is_callable() {
        return Err(VmError::type_error(
            "The comparison function must be either a function or undefined",
        ));
    }
    let ta = validate_typed_array(this)?;
    let buffer = ta.buffer().clone();
    let items: Vec<Value> = (0..ta.length()).filter_map(|i| ta.get_element(i)).collect();

    let mut compare = |x: &Value, y: &Value| sort_compare(comparator, &buffer, x, y);
    let sorted = merge_sort(items, &mut compare)?;

    for (i, value) in sorted.iter().enumerate() {
        ta.set_element(i as f64, value)?;
    }
    Ok(this.clone())
}

fn merge_sort<F>(mut items: Vec<Value>, compare: &mut F) -> VmResult<Vec<Value>>
where
    F: FnMut(&Value, &Value) -> VmResult<Ordering>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, compare)?;
    let right = merge_sort(right, compare)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if compare(&right[j], &left[i])? == Ordering::Less {
            out.push(right[j].clone());
            j += 1;
        } else {
            out.push(left[i].clone());
            i += 1;
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
    Ok(out)
}
