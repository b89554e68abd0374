//! Abstract conversion operations
//!
//! ToPrimitive, ToNumber, ToIndex, the fixed-width integer conversions and
//! the BigInt conversions used by typed arrays and atomics. Any of these may
//! call back into user code (`valueOf`/`toString`) and propagate whatever
//! that code throws.

use num_bigint::{BigInt, Sign};
use num_traits::Zero;

use crate::error::{VmError, VmResult};
use crate::object::{self, PropertyKey};
use crate::value::Value;

/// 2^53 - 1
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

// ============================================================================
// ToPrimitive / ToString
// ============================================================================

/// ToPrimitive with hint "number".
///
/// Own `valueOf` then `toString` are tried first; objects without them fall
/// back to the built-in `Object.prototype` / `Array.prototype` behaviour.
pub fn to_primitive(value: &Value) -> VmResult<Value> {
    if !value.is_object() {
        return Ok(value.clone());
    }
    for name in ["valueOf", "toString"] {
        let key = PropertyKey::from(name);
        let own = value.as_object().is_some_and(|obj| obj.has(&key));
        if own {
            let method = object::get(value, &key);
            if method.is_callable() {
                let result = method.call(value, &[])?;
                if !result.is_object() {
                    return Ok(result);
                }
            }
        } else if name == "toString" {
            return builtin_to_string(value);
        }
    }
    Err(VmError::type_error("Cannot convert object to primitive value"))
}

/// Built-in `toString` of objects that do not override it
fn builtin_to_string(value: &Value) -> VmResult<Value> {
    if let Some(obj) = value.as_object() {
        if obj.is_array() {
            return Ok(Value::string(&join_array_like(value)?));
        }
        return Ok(Value::string("[object Object]"));
    }
    if let Some(ta) = value.as_typed_array() {
        let parts: Vec<String> = (0..ta.length())
            .map(|i| match ta.get_element(i) {
                Some(v) => primitive_to_string(&v),
                None => Ok(String::new()),
            })
            .collect::<VmResult<_>>()?;
        return Ok(Value::string(&parts.join(",")));
    }
    if value.as_array_buffer().is_some() {
        return Ok(Value::string("[object ArrayBuffer]"));
    }
    Ok(Value::string(&format!("{:?}", value)))
}

fn join_array_like(value: &Value) -> VmResult<String> {
    let len = object::length_of_array_like(value)?;
    let mut parts = Vec::new();
    for i in 0..len.min(u64::from(u32::MAX)) {
        let element = object::get(value, &PropertyKey::Index(i as u32));
        if element.is_nullish() {
            parts.push(String::new());
        } else {
            parts.push(to_string(&element)?);
        }
    }
    Ok(parts.join(","))
}

/// ToString
pub fn to_string(value: &Value) -> VmResult<String> {
    let prim = to_primitive(value)?;
    primitive_to_string(&prim)
}

fn primitive_to_string(value: &Value) -> VmResult<String> {
    if value.is_undefined() {
        return Ok("undefined".to_string());
    }
    if value.is_null() {
        return Ok("null".to_string());
    }
    if let Some(b) = value.as_boolean() {
        return Ok(b.to_string());
    }
    if let Some(n) = value.as_number() {
        return Ok(number_to_string(n));
    }
    if let Some(s) = value.as_str() {
        return Ok(s.to_string());
    }
    if let Some(b) = value.as_bigint() {
        return Ok(b.to_string());
    }
    Err(VmError::type_error("Cannot convert object to primitive value"))
}

/// Number::toString(10)
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        // Shortest round-trip digits, exponent form outside 1e-7..1e21
        ryu_js::Buffer::new().format(n).to_string()
    }
}

// ============================================================================
// ToNumber and integer conversions
// ============================================================================

/// ToNumber
pub fn to_number(value: &Value) -> VmResult<f64> {
    if let Some(n) = value.as_number() {
        return Ok(n);
    }
    if value.is_undefined() {
        return Ok(f64::NAN);
    }
    if value.is_null() {
        return Ok(0.0);
    }
    if let Some(b) = value.as_boolean() {
        return Ok(if b { 1.0 } else { 0.0 });
    }
    if let Some(s) = value.as_str() {
        return Ok(string_to_number(s));
    }
    if value.is_bigint() {
        return Err(VmError::type_error("Cannot convert a BigInt value to a number"));
    }
    let prim = to_primitive(value)?;
    to_number(&prim)
}

fn is_js_whitespace(c: char) -> bool {
    c.is_whitespace() || c == '\u{FEFF}'
}

/// StringToNumber
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim_matches(is_js_whitespace);
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &s[2..];
        if digits.is_empty() {
            return f64::NAN;
        }
        let mut acc = 0.0_f64;
        for c in digits.chars() {
            match c.to_digit(radix) {
                Some(d) => acc = acc * f64::from(radix) + f64::from(d),
                None => return f64::NAN,
            }
        }
        return acc;
    }
    // Rust accepts "inf" and "nan" spellings that JS does not.
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return f64::NAN;
    }
    s.parse::<f64>().unwrap_or(f64::NAN)
}

/// ToIntegerOrInfinity
pub fn to_integer_or_infinity(value: &Value) -> VmResult<f64> {
    let n = to_number(value)?;
    Ok(integer_or_infinity(n))
}

/// ToIntegerOrInfinity on an already converted number; never returns `-0`.
pub fn integer_or_infinity(n: f64) -> f64 {
    if n.is_nan() {
        return 0.0;
    }
    if n.is_infinite() {
        return n;
    }
    n.trunc() + 0.0
}

/// ToIndex
pub fn to_index(value: &Value) -> VmResult<u64> {
    if value.is_undefined() {
        return Ok(0);
    }
    let integer = to_integer_or_infinity(value)?;
    if !(0.0..=MAX_SAFE_INTEGER).contains(&integer) {
        return Err(VmError::range_error("Invalid index"));
    }
    Ok(integer as u64)
}

/// ToLength
pub fn to_length(value: &Value) -> VmResult<u64> {
    let len = to_integer_or_infinity(value)?;
    if len <= 0.0 {
        return Ok(0);
    }
    Ok(len.min(MAX_SAFE_INTEGER) as u64)
}

/// `n` modulo 2^bits, after truncation. NaN and infinities map to 0.
fn modulo_pow2(n: f64, bits: u32) -> u64 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulus = (1_u64 << bits) as f64;
    n.trunc().rem_euclid(modulus) as u64
}

/// ToInt8 on a number
pub fn f64_to_int8(n: f64) -> i8 {
    modulo_pow2(n, 8) as u8 as i8
}

/// ToUint8 on a number
pub fn f64_to_uint8(n: f64) -> u8 {
    modulo_pow2(n, 8) as u8
}

/// ToUint8Clamp on a number (ties round to even)
pub fn f64_to_uint8_clamp(n: f64) -> u8 {
    if n.is_nan() || n <= 0.0 {
        return 0;
    }
    if n >= 255.0 {
        return 255;
    }
    let f = n.floor();
    if f + 0.5 < n {
        return (f + 1.0) as u8;
    }
    if n < f + 0.5 {
        return f as u8;
    }
    let f = f as u8;
    if f % 2 == 0 { f } else { f + 1 }
}

/// ToInt16 on a number
pub fn f64_to_int16(n: f64) -> i16 {
    modulo_pow2(n, 16) as u16 as i16
}

/// ToUint16 on a number
pub fn f64_to_uint16(n: f64) -> u16 {
    modulo_pow2(n, 16) as u16
}

/// ToInt32 on a number
pub fn f64_to_int32(n: f64) -> i32 {
    modulo_pow2(n, 32) as u32 as i32
}

/// ToUint32 on a number
pub fn f64_to_uint32(n: f64) -> u32 {
    modulo_pow2(n, 32) as u32
}

/// ToInt32
pub fn to_int32(value: &Value) -> VmResult<i32> {
    Ok(f64_to_int32(to_number(value)?))
}

// ============================================================================
// BigInt conversions
// ============================================================================

/// ToBigInt
pub fn to_bigint(value: &Value) -> VmResult<BigInt> {
    let prim = to_primitive(value)?;
    if let Some(b) = prim.as_bigint() {
        return Ok(b.clone());
    }
    if let Some(b) = prim.as_boolean() {
        return Ok(BigInt::from(u8::from(b)));
    }
    if let Some(s) = prim.as_str() {
        return string_to_bigint(s)
            .ok_or_else(|| VmError::syntax_error(format!("Cannot convert {} to a BigInt", s)));
    }
    if let Some(n) = prim.as_number() {
        return Err(VmError::type_error(format!(
            "Cannot convert {} to a BigInt",
            number_to_string(n)
        )));
    }
    Err(VmError::type_error(format!(
        "Cannot convert {:?} to a BigInt",
        prim
    )))
}

/// StringToBigInt; `None` when the string is not a valid literal
pub fn string_to_bigint(s: &str) -> Option<BigInt> {
    let s = s.trim_matches(is_js_whitespace);
    if s.is_empty() {
        return Some(BigInt::zero());
    }
    let radix = match s.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &s[2..];
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return None;
        }
        return BigInt::parse_bytes(digits.as_bytes(), radix);
    }
    let (negative, digits) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n = BigInt::parse_bytes(digits.as_bytes(), 10)?;
    Some(if negative { -n } else { n })
}

/// `n` modulo 2^64 as raw bits
pub fn bigint_to_u64_wrapping(n: &BigInt) -> u64 {
    let (sign, digits) = n.to_u64_digits();
    let low = digits.first().copied().unwrap_or(0);
    if sign == Sign::Minus {
        low.wrapping_neg()
    } else {
        low
    }
}

/// BigInt::asIntN(64, n)
pub fn bigint_to_i64_wrapping(n: &BigInt) -> i64 {
    bigint_to_u64_wrapping(n) as i64
}

/// ToBigInt64
pub fn to_big_int64(value: &Value) -> VmResult<i64> {
    Ok(bigint_to_i64_wrapping(&to_bigint(value)?))
}
