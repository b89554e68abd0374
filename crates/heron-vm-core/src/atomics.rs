//! The `Atomics` namespace object
//!
//! Arithmetic, bitwise, exchange, load and store operations delegate to
//! [`atomic_helper`](crate::atomic_helper). `wait` and `notify` park and wake
//! agents through the agent's [`WaiterList`](crate::waiter::WaiterList).

use std::time::Duration;

use tracing::debug;

use crate::agent::Agent;
use crate::atomic_helper::{
    atomic_compare_exchange, atomic_load, atomic_read_modify_write, atomic_store, revalidate,
    validate_atomic_access, validate_integer_typed_array,
};
use crate::convert::{to_big_int64, to_int32, to_integer_or_infinity, to_number};
use crate::data_block::RmwOp;
use crate::element_kind::ElementKind;
use crate::error::{VmError, VmResult};
use crate::object::{JsObject, PropertyKey};
use crate::value::Value;
use crate::waiter::WaitResult;

/// `Atomics.add(typedArray, index, value)`
pub fn add(typed_array: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    atomic_read_modify_write(typed_array, index, value, RmwOp::Add)
}

/// `Atomics.sub(typedArray, index, value)`
pub fn sub(typed_array: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    atomic_read_modify_write(typed_array, index, value, RmwOp::Sub)
}

/// `Atomics.and(typedArray, index, value)`
pub fn and(typed_array: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    atomic_read_modify_write(typed_array, index, value, RmwOp::And)
}

/// `Atomics.or(typedArray, index, value)`
pub fn or(typed_array: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    atomic_read_modify_write(typed_array, index, value, RmwOp::Or)
}

/// `Atomics.xor(typedArray, index, value)`
pub fn xor(typed_array: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    atomic_read_modify_write(typed_array, index, value, RmwOp::Xor)
}

/// `Atomics.exchange(typedArray, index, value)`
pub fn exchange(typed_array: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    atomic_read_modify_write(typed_array, index, value, RmwOp::Exchange)
}

/// `Atomics.compareExchange(typedArray, index, expected, replacement)`
pub fn compare_exchange(
    typed_array: &Value,
    index: &Value,
    expected: &Value,
    replacement: &Value,
) -> VmResult<Value> {
    atomic_compare_exchange(typed_array, index, expected, replacement)
}

/// `Atomics.store(typedArray, index, value)`
pub fn store(typed_array: &Value, index: &Value, value: &Value) -> VmResult<Value> {
    atomic_store(typed_array, index, value)
}

/// `Atomics.load(typedArray, index)`
pub fn load(typed_array: &Value, index: &Value) -> VmResult<Value> {
    atomic_load(typed_array, index)
}

/// `Atomics.isLockFree(size)`
pub fn is_lock_free(size: &Value) -> VmResult<bool> {
    let n = to_integer_or_infinity(size)?;
    Ok(n == 1.0 || n == 2.0 || n == 4.0 || n == 8.0)
}

/// Timeout argument of `Atomics.wait`, in milliseconds. `None` waits forever.
fn wait_timeout(timeout: &Value) -> VmResult<Option<Duration>> {
    if timeout.is_undefined() {
        return Ok(None);
    }
    let ms = to_number(timeout)?;
    if ms.is_nan() || ms == f64::INFINITY {
        return Ok(None);
    }
    if ms <= 0.0 {
        return Ok(Some(Duration::ZERO));
    }
    Ok(Duration::try_from_secs_f64(ms / 1000.0).ok())
}

/// `Atomics.wait(typedArray, index, value, timeout)`
///
/// Only Int32Array and BigInt64Array views of a SharedArrayBuffer can be
/// waited on, and only by an agent allowed to block.
pub fn wait(
    agent: &Agent,
    typed_array: &Value,
    index: &Value,
    value: &Value,
    timeout: &Value,
) -> VmResult<WaitResult> {
    let ta = validate_integer_typed_array(typed_array, true)?;
    let byte_index = validate_atomic_access(ta, index)?;
    if !ta.buffer().is_shared() {
        return Err(VmError::type_error("buffer is not sharedArrayBuffer"));
    }
    let is_bigint = ta.kind() == ElementKind::BigInt64;
    let (expected32, expected64) = if is_bigint {
        (0, to_big_int64(value)?)
    } else {
        (to_int32(value)?, 0)
    };
    let timeout = wait_timeout(timeout)?;
    if !agent.can_block() {
        return Err(VmError::cannot_suspend(
            "Atomics.wait cannot be called in this context",
        ));
    }

    let block = revalidate(ta, byte_index)?;
    let waiters = agent.waiter_list();
    let result = if is_bigint {
        waiters.wait::<i64>(&block, byte_index, expected64, timeout)
    } else {
        waiters.wait::<i32>(&block, byte_index, expected32, timeout)
    };
    debug!(byte_index, result = result.as_str(), "Atomics.wait");
    Ok(result)
}

/// `Atomics.notify(typedArray, index, count)`: the number of agents woken
pub fn notify(agent: &Agent, typed_array: &Value, index: &Value, count: &Value) -> VmResult<u64> {
    let ta = validate_integer_typed_array(typed_array, true)?;
    let byte_index = validate_atomic_access(ta, index)?;
    let count = if count.is_undefined() {
        None
    } else {
        let c = to_integer_or_infinity(count)?.max(0.0);
        if c.is_infinite() { None } else { Some(c as u64) }
    };
    if !ta.buffer().is_shared() {
        return Ok(0);
    }
    let block = revalidate(ta, byte_index)?;
    Ok(agent.waiter_list().notify(&block, byte_index, count))
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// Build the `Atomics` namespace object, with `wait` and `notify` bound to
/// `agent`.
pub fn create_atomics_object(agent: &Agent) -> Value {
    let atomics = JsObject::new();
    let define = |name: &str, value: Value| {
        atomics.set(PropertyKey::from(name), value);
    };

    macro_rules! ternary {
        ($name:literal, $func:path) => {
            define(
                $name,
                Value::native_function($name, |_, args| {
                    $func(&arg(args, 0), &arg(args, 1), &arg(args, 2))
                }),
            )
        };
    }

    ternary!("add", add);
    ternary!("and", and);
    ternary!("exchange", exchange);
    ternary!("or", or);
    ternary!("store", store);
    ternary!("sub", sub);
    ternary!("xor", xor);

    define(
        "compareExchange",
        Value::native_function("compareExchange", |_, args| {
            compare_exchange(&arg(args, 0), &arg(args, 1), &arg(args, 2), &arg(args, 3))
        }),
    );
    define(
        "isLockFree",
        Value::native_function("isLockFree", |_, args| {
            is_lock_free(&arg(args, 0)).map(Value::boolean)
        }),
    );
    define(
        "load",
        Value::native_function("load", |_, args| load(&arg(args, 0), &arg(args, 1))),
    );

    let waiter = agent.clone();
    define(
        "wait",
        Value::native_function("wait", move |_, args| {
            wait(&waiter, &arg(args, 0), &arg(args, 1), &arg(args, 2), &arg(args, 3))
                .map(|r| Value::string(r.as_str()))
        }),
    );
    let notifier = agent.clone();
    define(
        "notify",
        Value::native_function("notify", move |_, args| {
            notify(&notifier, &arg(args, 0), &arg(args, 1), &arg(args, 2))
                .map(|n| Value::number(n as f64))
        }),
    );

    Value::object(atomics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentConfig;
    use crate::array_buffer::allocate_shared_array_buffer;
    use crate::object::get;
    use crate::typed_array_helper::{allocate_typed_array, create_from_array_buffer};

    fn agent() -> Agent {
        Agent::new(AgentConfig::default())
    }

    fn shared(kind: ElementKind, len: i32) -> Value {
        let agent = agent();
        let buffer =
            allocate_shared_array_buffer(&agent, (len as usize * kind.element_size()) as u64).unwrap();
        Value::typed_array(
            create_from_array_buffer(kind, &buffer, &Value::undefined(), &Value::undefined()).unwrap(),
        )
    }

    #[test]
    fn test_wait_timeout_conversion() {
        assert_eq!(wait_timeout(&Value::undefined()).unwrap(), None);
        assert_eq!(wait_timeout(&Value::nan()).unwrap(), None);
        assert_eq!(wait_timeout(&Value::number(f64::INFINITY)).unwrap(), None);
        assert_eq!(wait_timeout(&Value::int32(-5)).unwrap(), Some(Duration::ZERO));
        assert_eq!(
            wait_timeout(&Value::number(f64::NEG_INFINITY)).unwrap(),
            Some(Duration::ZERO)
        );
        assert_eq!(wait_timeout(&Value::int32(1500)).unwrap(), Some(Duration::from_millis(1500)));
        assert_eq!(wait_timeout(&Value::number(1e300)).unwrap(), None);
    }

    #[test]
    fn test_is_lock_free() {
        for (size, expected) in [(1, true), (2, true), (3, false), (4, true), (8, true), (16, false)] {
            assert_eq!(is_lock_free(&Value::int32(size)).unwrap(), expected, "{}", size);
        }
        assert!(is_lock_free(&Value::number(4.5)).unwrap());
        assert!(!is_lock_free(&Value::undefined()).unwrap());
    }

    #[test]
    fn test_wait_not_equal() {
        let ta = shared(ElementKind::Int32, 2);
        store(&ta, &Value::int32(1), &Value::int32(3)).unwrap();
        let result = wait(&agent(), &ta, &Value::int32(1), &Value::int32(0), &Value::undefined()).unwrap();
        assert_eq!(result, WaitResult::NotEqual);
    }

    #[test]
    fn test_wait_checks_order() {
        let main = Agent::new(AgentConfig {
            can_block: false,
            ..AgentConfig::default()
        });
        let ta = shared(ElementKind::Int32, 1);
        // Index validation precedes the blocking check.
        let err = wait(&main, &ta, &Value::int32(1), &Value::int32(0), &Value::int32(0)).unwrap_err();
        assert!(err.is_range_error());
        let err = wait(&main, &ta, &Value::int32(0), &Value::int32(0), &Value::int32(0)).unwrap_err();
        assert!(err.is_type_error());
        assert!(matches!(err, VmError::CannotSuspend(_)));

        let plain = Value::typed_array(allocate_typed_array(&agent(), ElementKind::Int32, 1).unwrap());
        let err = wait(&agent(), &plain, &Value::int32(0), &Value::int32(0), &Value::int32(0)).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_notify_non_shared_returns_zero() {
        let plain = Value::typed_array(allocate_typed_array(&agent(), ElementKind::Int32, 1).unwrap());
        assert_eq!(notify(&agent(), &plain, &Value::int32(0), &Value::undefined()).unwrap(), 0);
        assert!(notify(&agent(), &plain, &Value::int32(1), &Value::undefined()).unwrap_err().is_range_error());
    }

    #[test]
    fn test_namespace_object() {
        let atomics = create_atomics_object(&agent());
        for name in [
            "add",
            "and",
            "compareExchange",
            "exchange",
            "isLockFree",
            "load",
            "notify",
            "or",
            "store",
            "sub",
            "wait",
            "xor",
        ] {
            assert!(get(&atomics, &PropertyKey::from(name)).is_callable(), "{}", name);
        }

        let ta = shared(ElementKind::Uint16, 1);
        let call = |name: &str, args: &[Value]| {
            get(&atomics, &PropertyKey::from(name)).call(&atomics, args).unwrap()
        };
        call("store", &[ta.clone(), Value::int32(0), Value::int32(10)]);
        let prev = call("add", &[ta.clone(), Value::int32(0), Value::int32(5)]);
        assert_eq!(prev.as_number(), Some(10.0));
        assert_eq!(call("load", &[ta.clone(), Value::int32(0)]).as_number(), Some(15.0));
        assert_eq!(call("isLockFree", &[Value::int32(4)]).as_boolean(), Some(true));

        let ta = shared(ElementKind::Int32, 1);
        let r = call("wait", &[ta.clone(), Value::int32(0), Value::int32(1), Value::int32(0)]);
        assert_eq!(r.as_str(), Some("not-equal"));
        let r = call("wait", &[ta.clone(), Value::int32(0), Value::int32(0), Value::int32(0)]);
        assert_eq!(r.as_str(), Some("timed-out"));
        let n = call("notify", &[ta, Value::int32(0)]);
        assert_eq!(n.as_number(), Some(0.0));
    }
}
