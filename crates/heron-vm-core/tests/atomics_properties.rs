//! Property tests for element truncation, access bounds and compareExchange

use heron_vm_core::atomic_helper::validate_atomic_access;
use heron_vm_core::array_buffer::allocate_array_buffer;
use heron_vm_core::convert::f64_to_uint8_clamp;
use heron_vm_core::typed_array_helper::{allocate_typed_array, create_from_array_buffer};
use heron_vm_core::{Agent, AgentConfig, ElementKind, Value, atomics};
use proptest::prelude::*;

const SAFE: i64 = 1 << 53;

fn agent() -> Agent {
    Agent::new(AgentConfig::default())
}

fn integer_kind() -> impl Strategy<Value = ElementKind> {
    prop::sample::select(vec![
        ElementKind::Int8,
        ElementKind::Uint8,
        ElementKind::Int16,
        ElementKind::Uint16,
        ElementKind::Int32,
        ElementKind::Uint32,
    ])
}

/// Two's complement wrap of `n` into `kind`
fn wrapped(kind: ElementKind, n: i64) -> f64 {
    match kind {
        ElementKind::Int8 => (n as i8).into(),
        ElementKind::Uint8 => (n as u8).into(),
        ElementKind::Int16 => (n as i16).into(),
        ElementKind::Uint16 => (n as u16).into(),
        ElementKind::Int32 => (n as i32).into(),
        ElementKind::Uint32 => (n as u32).into(),
        other => panic!("{} is not a wrapping kind", other),
    }
}

proptest! {
    #[test]
    fn prop_store_then_load_wraps(kind in integer_kind(), n in -SAFE..SAFE) {
        let ta = Value::typed_array(allocate_typed_array(&agent(), kind, 1).unwrap());
        let idx = Value::int32(0);
        let stored = atomics::store(&ta, &idx, &Value::number(n as f64)).unwrap();
        prop_assert_eq!(stored.as_number(), Some(n as f64));
        let loaded = atomics::load(&ta, &idx).unwrap();
        prop_assert_eq!(loaded.as_number(), Some(wrapped(kind, n)));
    }

    #[test]
    fn prop_add_wraps(kind in integer_kind(), a in -SAFE..SAFE, b in -SAFE..SAFE) {
        let ta = Value::typed_array(allocate_typed_array(&agent(), kind, 1).unwrap());
        let idx = Value::int32(0);
        atomics::store(&ta, &idx, &Value::number(a as f64)).unwrap();
        let prev = atomics::add(&ta, &idx, &Value::number(b as f64)).unwrap();
        prop_assert_eq!(prev.as_number(), Some(wrapped(kind, a)));
        let loaded = atomics::load(&ta, &idx).unwrap();
        prop_assert_eq!(loaded.as_number(), Some(wrapped(kind, a.wrapping_add(b))));
    }

    #[test]
    fn prop_uint8_clamp_rounds_and_clamps(f in -1000.0f64..1000.0) {
        let expected = f.clamp(0.0, 255.0).round_ties_even();
        prop_assert_eq!(f64::from(f64_to_uint8_clamp(f)), expected);
    }

    #[test]
    fn prop_access_bounds(
        kind in integer_kind(),
        len in 1usize..32,
        offset_elements in 0usize..4,
        index in -8i32..40,
    ) {
        let size = kind.element_size();
        let buffer = allocate_array_buffer(&agent(), ((len + offset_elements) * size) as u64).unwrap();
        let ta = create_from_array_buffer(
            kind,
            &buffer,
            &Value::number((offset_elements * size) as f64),
            &Value::number(len as f64),
        )
        .unwrap();
        let result = validate_atomic_access(&ta, &Value::int32(index));
        if index >= 0 && (index as usize) < len {
            prop_assert_eq!(result.unwrap(), index as usize * size + offset_elements * size);
        } else {
            prop_assert!(result.unwrap_err().is_range_error());
        }
    }

    #[test]
    fn prop_compare_exchange(initial in any::<i32>(), other in any::<i32>(), hit in any::<bool>(), replacement in any::<i32>()) {
        let expected = if hit { initial } else { other };
        let ta = Value::typed_array(allocate_typed_array(&agent(), ElementKind::Int32, 1).unwrap());
        let idx = Value::int32(0);
        atomics::store(&ta, &idx, &Value::int32(initial)).unwrap();
        let seen = atomics::compare_exchange(&ta, &idx, &Value::int32(expected), &Value::int32(replacement)).unwrap();
        prop_assert_eq!(seen.as_number(), Some(initial as f64));
        let after = atomics::load(&ta, &idx).unwrap().as_number();
        if expected == initial {
            prop_assert_eq!(after, Some(replacement as f64));
        } else {
            prop_assert_eq!(after, Some(initial as f64));
        }
    }
}
