//! Ordinary JavaScript objects
//!
//! A deliberately small object model: a flat property table, array objects
//! with a `length` property, and the iterator protocol on top of it. Typed
//! array construction reads array-likes and iterables through this module.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::convert::to_length;
use crate::error::{VmError, VmResult};
use crate::value::Value;

/// Well-known symbols understood by the object model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WellKnownSymbol {
    /// `Symbol.iterator`
    Iterator,
}

/// Property key (string, integer index or well-known symbol)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Integer index (for arrays)
    Index(u32),
    /// Well-known symbol key
    Symbol(WellKnownSymbol),
}

impl PropertyKey {
    /// Create a string property key.
    ///
    /// Canonical array index strings ("0", "17") become [`PropertyKey::Index`].
    pub fn string(s: &str) -> Self {
        if let Ok(n) = s.parse::<u32>()
            && n != u32::MAX
            && n.to_string() == s
        {
            return Self::Index(n);
        }
        Self::String(Arc::from(s))
    }

    /// `@@iterator`
    pub fn iterator() -> Self {
        Self::Symbol(WellKnownSymbol::Iterator)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

/// A JavaScript object
pub struct JsObject {
    properties: RwLock<FxHashMap<PropertyKey, Value>>,
    is_array: bool,
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsObject")
            .field("is_array", &self.is_array)
            .field("properties", &self.properties.read().len())
            .finish()
    }
}

impl JsObject {
    /// Create an empty ordinary object
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            properties: RwLock::new(FxHashMap::default()),
            is_array: false,
        })
    }

    /// Create an array object holding `values`.
    ///
    /// The array gets a `length` property and an `@@iterator` method that
    /// walks indices `0..length` on every call to `next`.
    pub fn array(values: Vec<Value>) -> Arc<Self> {
        let mut props = FxHashMap::default();
        props.insert(PropertyKey::from("length"), Value::number(values.len() as f64));
        for (i, v) in values.into_iter().enumerate() {
            props.insert(PropertyKey::Index(i as u32), v);
        }
        props.insert(
            PropertyKey::iterator(),
            Value::native_function("[Symbol.iterator]", |this, _args| {
                Ok(create_list_iterator(this.clone()))
            }),
        );
        Arc::new(Self {
            properties: RwLock::new(props),
            is_array: true,
        })
    }

    /// Whether this object was created as an array
    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// Get a property; missing properties read as `undefined`
    pub fn get(&self, key: &PropertyKey) -> Value {
        self.properties
            .read()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Set a property
    pub fn set(&self, key: PropertyKey, value: Value) {
        self.properties.write().insert(key, value);
    }

    /// Has own property
    pub fn has(&self, key: &PropertyKey) -> bool {
        self.properties.read().contains_key(key)
    }
}

/// Get a property from any value.
///
/// Only ordinary objects carry properties in this model; everything else
/// reads as `undefined`.
pub fn get(value: &Value, key: &PropertyKey) -> Value {
    match value.as_object() {
        Some(obj) => obj.get(key),
        None => Value::undefined(),
    }
}

/// GetMethod: `undefined` when absent, `TypeError` when not callable.
pub fn get_method(value: &Value, key: &PropertyKey) -> VmResult<Option<Value>> {
    let func = get(value, key);
    if func.is_nullish() {
        return Ok(None);
    }
    if !func.is_callable() {
        return Err(VmError::type_error(format!(
            "{:?} is not a function",
            key
        )));
    }
    Ok(Some(func))
}

/// LengthOfArrayLike
pub fn length_of_array_like(value: &Value) -> VmResult<u64> {
    let len = get(value, &PropertyKey::from("length"));
    to_length(&len)
}

// ============================================================================
// Iterator protocol
// ============================================================================

/// Build `{ value, done }`
pub fn create_iter_result_object(value: Value, done: bool) -> Value {
    let obj = JsObject::new();
    obj.set(PropertyKey::from("value"), value);
    obj.set(PropertyKey::from("done"), Value::boolean(done));
    Value::object(obj)
}

/// Iterator over an array-like, reading `length` afresh on every step.
fn create_list_iterator(target: Value) -> Value {
    let cursor = Arc::new(AtomicU32::new(0));
    let iter = JsObject::new();
    iter.set(
        PropertyKey::from("next"),
        Value::native_function("next", move |_this, _args| {
            let index = cursor.load(Ordering::Relaxed);
            let len = length_of_array_like(&target)?;
            if u64::from(index) >= len {
                return Ok(create_iter_result_object(Value::undefined(), true));
            }
            cursor.store(index + 1, Ordering::Relaxed);
            let value = get(&target, &PropertyKey::Index(index));
            Ok(create_iter_result_object(value, false))
        }),
    );
    Value::object(iter)
}

/// IterableToList using an already-resolved `@@iterator` method.
pub fn iterable_to_list(iterable: &Value, method: &Value) -> VmResult<Vec<Value>> {
    let iterator = method.call(iterable, &[])?;
    if !iterator.is_object() {
        return Err(VmError::type_error("Result of the Symbol.iterator method is not an object"));
    }
    let next = get(&iterator, &PropertyKey::from("next"));

    let mut values = Vec::new();
    loop {
        let result = next.call(&iterator, &[])?;
        if !result.is_object() {
            return Err(VmError::type_error(format!(
                "Iterator result {:?} is not an object",
                result
            )));
        }
        if get(&result, &PropertyKey::from("done")).to_boolean() {
            break;
        }
        values.push(get(&result, &PropertyKey::from("value")));
    }
    Ok(values)
}
