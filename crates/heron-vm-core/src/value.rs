//! JavaScript values with NaN-boxing
//!
//! Primitive values live entirely in a 64-bit payload that uses the
//! IEEE 754 quiet-NaN space for tags. Heap values additionally carry an
//! `Arc` so the referenced object stays alive while the value does.
//!
//! ## Encoding Scheme
//!
//! ```text
//! - Double:     stored directly (except NaN)
//! - NaN:        0x7FFA_0000_0000_0000 (canonical NaN, distinct from undefined)
//! - Integer:    0x7FF8_0001_XXXX_XXXX (32-bit signed in lower bits)
//! - Pointer:    0x7FFC_XXXX_XXXX_XXXX (48-bit address, identity only)
//! - Undefined:  0x7FF8_0000_0000_0000
//! - Null:       0x7FF8_0000_0000_0001
//! - True:       0x7FF8_0000_0000_0002
//! - False:      0x7FF8_0000_0000_0003
//! ```

use std::sync::Arc;

use num_bigint::BigInt;

use crate::array_buffer::JsArrayBuffer;
use crate::error::{VmError, VmResult};
use crate::object::JsObject;
use crate::typed_array::JsTypedArray;

// NaN-boxing constants
const QUIET_NAN: u64 = 0x7FF8_0000_0000_0000;
const TAGGED_MASK: u64 = 0xFFF8_0000_0000_0000;
const INT32_TAG_MASK: u64 = 0xFFFF_FFFF_0000_0000;
const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

const TAG_UNDEFINED: u64 = 0x7FF8_0000_0000_0000;
const TAG_NULL: u64 = 0x7FF8_0000_0000_0001;
const TAG_TRUE: u64 = 0x7FF8_0000_0000_0002;
const TAG_FALSE: u64 = 0x7FF8_0000_0000_0003;
const TAG_NAN: u64 = 0x7FFA_0000_0000_0000;
const TAG_INT32: u64 = 0x7FF8_0001_0000_0000;
const TAG_POINTER: u64 = 0x7FFC_0000_0000_0000;

/// Native function handler type.
///
/// Receives the `this` value and the positional arguments.
pub type NativeFn = Arc<dyn Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// A function implemented in Rust.
pub struct NativeFunctionObject {
    /// Function name, used in error messages
    pub name: Arc<str>,
    /// The native function handler
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunctionObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "function {}() {{ [native code] }}", self.name)
    }
}

/// Reference to heap-allocated data
#[derive(Clone)]
pub enum HeapRef {
    /// String value
    String(Arc<str>),
    /// BigInt
    BigInt(Arc<BigInt>),
    /// Ordinary object or array
    Object(Arc<JsObject>),
    /// Native function
    NativeFunction(Arc<NativeFunctionObject>),
    /// ArrayBuffer or SharedArrayBuffer
    ArrayBuffer(Arc<JsArrayBuffer>),
    /// TypedArray (view over an ArrayBuffer)
    TypedArray(Arc<JsTypedArray>),
}

impl std::fmt::Debug for HeapRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeapRef::String(s) => f.debug_tuple("String").field(s).finish(),
            HeapRef::BigInt(b) => f.debug_tuple("BigInt").field(b).finish(),
            HeapRef::Object(o) => f.debug_tuple("Object").field(o).finish(),
            HeapRef::NativeFunction(n) => f.debug_tuple("NativeFunction").field(n).finish(),
            HeapRef::ArrayBuffer(a) => f.debug_tuple("ArrayBuffer").field(a).finish(),
            HeapRef::TypedArray(t) => f.debug_tuple("TypedArray").field(t).finish(),
        }
    }
}

/// A JavaScript value using NaN-boxing for efficient storage
///
/// This type is `Send + Sync`: all heap-allocated data is behind `Arc` and
/// uses thread-safe interior mutability.
#[derive(Clone)]
pub struct Value {
    bits: u64,
    heap_ref: Option<HeapRef>,
}

impl Value {
    /// `undefined`
    #[inline]
    pub const fn undefined() -> Self {
        Self {
            bits: TAG_UNDEFINED,
            heap_ref: None,
        }
    }

    /// `null`
    #[inline]
    pub const fn null() -> Self {
        Self {
            bits: TAG_NULL,
            heap_ref: None,
        }
    }

    /// Boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self {
            bits: if b { TAG_TRUE } else { TAG_FALSE },
            heap_ref: None,
        }
    }

    /// 32-bit integer value
    #[inline]
    pub const fn int32(n: i32) -> Self {
        Self {
            bits: TAG_INT32 | (n as u32 as u64),
            heap_ref: None,
        }
    }

    /// Number value
    ///
    /// Integral values that fit in an `i32` are stored as int32, except `-0`.
    pub fn number(n: f64) -> Self {
        if n.is_nan() {
            return Self {
                bits: TAG_NAN,
                heap_ref: None,
            };
        }
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            return Self::int32(n as i32);
        }
        Self {
            bits: n.to_bits(),
            heap_ref: None,
        }
    }

    /// NaN
    #[inline]
    pub const fn nan() -> Self {
        Self {
            bits: TAG_NAN,
            heap_ref: None,
        }
    }

    /// String value
    pub fn string(s: &str) -> Self {
        Self::from_heap(HeapRef::String(Arc::from(s)))
    }

    /// BigInt value
    pub fn bigint(n: BigInt) -> Self {
        Self::from_heap(HeapRef::BigInt(Arc::new(n)))
    }

    /// Object value
    pub fn object(obj: Arc<JsObject>) -> Self {
        Self::from_heap(HeapRef::Object(obj))
    }

    /// ArrayBuffer value
    pub fn array_buffer(buf: Arc<JsArrayBuffer>) -> Self {
        Self::from_heap(HeapRef::ArrayBuffer(buf))
    }

    /// TypedArray value
    pub fn typed_array(ta: Arc<JsTypedArray>) -> Self {
        Self::from_heap(HeapRef::TypedArray(ta))
    }

    /// Native function value
    pub fn native_function<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        Self::from_heap(HeapRef::NativeFunction(Arc::new(NativeFunctionObject {
            name: Arc::from(name),
            func: Arc::new(func),
        })))
    }

    fn from_heap(heap_ref: HeapRef) -> Self {
        let addr = match &heap_ref {
            HeapRef::String(s) => Arc::as_ptr(s) as *const u8 as usize,
            HeapRef::BigInt(b) => Arc::as_ptr(b) as usize,
            HeapRef::Object(o) => Arc::as_ptr(o) as usize,
            HeapRef::NativeFunction(n) => Arc::as_ptr(n) as usize,
            HeapRef::ArrayBuffer(a) => Arc::as_ptr(a) as usize,
            HeapRef::TypedArray(t) => Arc::as_ptr(t) as usize,
        };
        Self {
            bits: TAG_POINTER | (addr as u64 & PAYLOAD_MASK),
            heap_ref: Some(heap_ref),
        }
    }

    #[inline]
    fn is_double(&self) -> bool {
        (self.bits & TAGGED_MASK) != QUIET_NAN
    }

    /// Is `undefined`
    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.bits == TAG_UNDEFINED
    }

    /// Is `null`
    #[inline]
    pub fn is_null(&self) -> bool {
        self.bits == TAG_NULL
    }

    /// Is `undefined` or `null`
    #[inline]
    pub fn is_nullish(&self) -> bool {
        self.is_undefined() || self.is_null()
    }

    /// Is a boolean
    #[inline]
    pub fn is_boolean(&self) -> bool {
        self.bits == TAG_TRUE || self.bits == TAG_FALSE
    }

    /// Get as boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self.bits {
            TAG_TRUE => Some(true),
            TAG_FALSE => Some(false),
            _ => None,
        }
    }

    /// Is stored as int32
    #[inline]
    pub fn is_int32(&self) -> bool {
        (self.bits & INT32_TAG_MASK) == TAG_INT32
    }

    /// Get as int32 (only if stored as int32)
    pub fn as_int32(&self) -> Option<i32> {
        if self.is_int32() {
            Some(self.bits as u32 as i32)
        } else {
            None
        }
    }

    /// Is a number (int32, double or NaN)
    #[inline]
    pub fn is_number(&self) -> bool {
        self.is_double() || self.is_int32() || self.bits == TAG_NAN
    }

    /// Get as f64 (works for both int32 and double)
    pub fn as_number(&self) -> Option<f64> {
        if self.is_int32() {
            Some(self.bits as u32 as i32 as f64)
        } else if self.bits == TAG_NAN {
            Some(f64::NAN)
        } else if self.is_double() {
            Some(f64::from_bits(self.bits))
        } else {
            None
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match &self.heap_ref {
            Some(HeapRef::String(s)) => Some(&**s),
            _ => None,
        }
    }

    /// Is a BigInt
    pub fn is_bigint(&self) -> bool {
        matches!(self.heap_ref, Some(HeapRef::BigInt(_)))
    }

    /// Get as BigInt
    pub fn as_bigint(&self) -> Option<&BigInt> {
        match &self.heap_ref {
            Some(HeapRef::BigInt(b)) => Some(&**b),
            _ => None,
        }
    }

    /// Is an object of any kind (ordinary, function, buffer, typed array)
    pub fn is_object(&self) -> bool {
        matches!(
            self.heap_ref,
            Some(
                HeapRef::Object(_)
                    | HeapRef::NativeFunction(_)
                    | HeapRef::ArrayBuffer(_)
                    | HeapRef::TypedArray(_)
            )
        )
    }

    /// Get as ordinary object
    pub fn as_object(&self) -> Option<&Arc<JsObject>> {
        match &self.heap_ref {
            Some(HeapRef::Object(o)) => Some(o),
            _ => None,
        }
    }

    /// Get as ArrayBuffer
    pub fn as_array_buffer(&self) -> Option<&Arc<JsArrayBuffer>> {
        match &self.heap_ref {
            Some(HeapRef::ArrayBuffer(a)) => Some(a),
            _ => None,
        }
    }

    /// Get as TypedArray
    pub fn as_typed_array(&self) -> Option<&Arc<JsTypedArray>> {
        match &self.heap_ref {
            Some(HeapRef::TypedArray(t)) => Some(t),
            _ => None,
        }
    }

    /// Get as native function
    pub fn as_native_function(&self) -> Option<&Arc<NativeFunctionObject>> {
        match &self.heap_ref {
            Some(HeapRef::NativeFunction(n)) => Some(n),
            _ => None,
        }
    }

    /// Is callable
    pub fn is_callable(&self) -> bool {
        self.as_native_function().is_some()
    }

    /// Call this value as a function.
    pub fn call(&self, this: &Value, args: &[Value]) -> VmResult<Value> {
        match self.as_native_function() {
            Some(f) => (f.func)(this, args),
            None => Err(VmError::type_error(format!(
                "{} is not a function",
                self.type_of()
            ))),
        }
    }

    /// ToBoolean
    pub fn to_boolean(&self) -> bool {
        if let Some(b) = self.as_boolean() {
            return b;
        }
        if let Some(n) = self.as_number() {
            return n != 0.0 && !n.is_nan();
        }
        match &self.heap_ref {
            Some(HeapRef::String(s)) => !s.is_empty(),
            Some(HeapRef::BigInt(b)) => b.sign() != num_bigint::Sign::NoSign,
            Some(_) => true,
            None => false,
        }
    }

    /// The `typeof` string of this value
    pub fn type_of(&self) -> &'static str {
        if self.is_undefined() {
            return "undefined";
        }
        if self.is_null() {
            return "object";
        }
        if self.is_boolean() {
            return "boolean";
        }
        if self.is_number() {
            return "number";
        }
        match &self.heap_ref {
            Some(HeapRef::String(_)) => "string",
            Some(HeapRef::BigInt(_)) => "bigint",
            Some(HeapRef::NativeFunction(_)) => "function",
            _ => "object",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::undefined()
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_undefined() {
            return write!(f, "undefined");
        }
        if self.is_null() {
            return write!(f, "null");
        }
        if let Some(b) = self.as_boolean() {
            return write!(f, "{}", b);
        }
        if let Some(n) = self.as_number() {
            return write!(f, "{}", n);
        }
        match &self.heap_ref {
            Some(HeapRef::String(s)) => write!(f, "{:?}", s),
            Some(HeapRef::BigInt(b)) => write!(f, "{}n", b),
            Some(other) => write!(f, "{:?}", other),
            None => write!(f, "<invalid>"),
        }
    }
}
