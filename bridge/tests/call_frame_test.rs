//! Call frame discipline: arity checks, result adjustment and the
//! stack-height invariant across nested calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use bridge::{
    Arity, ControlFlowOps, NativeFunction, NativeRegistry, Results, Runtime, RuntimeError, Value,
};
use proptest::prelude::*;

// ============================================================================
// Natives under test
// ============================================================================

static GUARDED_CALLS: AtomicUsize = AtomicUsize::new(0);

/// Declared `[2,2] -> 0`; counts how often its body runs. Only called by
/// the arity test.
fn guarded(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    GUARDED_CALLS.fetch_add(1, Ordering::SeqCst);
    let _: i64 = rt.next_arg()?;
    Ok(0)
}

/// Declared `[2,2] -> 1`.
fn pair(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let a: i64 = rt.next_arg()?;
    let b: i64 = rt.next_arg()?;
    rt.push(a + b)?;
    Ok(1)
}

/// Pushes every argument back plus junk below, claiming only the arguments.
fn echo(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let n = rt.gettop();
    rt.push("junk")?;
    for i in 1..=n {
        let v = rt.value_at(i as i32);
        rt.push_value(v)?;
    }
    Ok(n)
}

/// Declared to return two values, pushes three; only the first two claimed
/// results are kept.
fn three_for_two(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    rt.push(1i64)?;
    rt.push(2i64)?;
    rt.push(3i64)?;
    Ok(3)
}

/// Declared to return two values but only produces one.
fn short_change(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    rt.push(1i64)?;
    Ok(1)
}

/// Claims more results than it pushed.
fn liar(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    rt.push(1i64)?;
    Ok(5)
}

/// Calls `pair(x, 10)` through the runtime and returns its result plus
/// the frame depth observed before and after.
fn reenter(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    let x: i64 = rt.next_arg()?;
    let before = rt.depth() as i64;
    rt.push_global("pair")?;
    rt.push(x)?;
    rt.push(10i64)?;
    rt.call(2, Some(1))?;
    let after = rt.depth() as i64;
    // Own arguments are still addressable after the nested call.
    let again: i64 = rt.check_integer(1)?;
    rt.push(before)?;
    rt.push(after)?;
    rt.push(again)?;
    Ok(4)
}

/// Recurses through the runtime until the depth limit stops it.
fn recurse(rt: &mut Runtime) -> Result<usize, RuntimeError> {
    rt.push_global("recurse")?;
    rt.call(0, Some(0))?;
    Ok(0)
}

const GUARDED: NativeFunction =
    NativeFunction::new("guarded", guarded, Arity::exact(2), Results::Fixed(0));
const PAIR: NativeFunction = NativeFunction::new("pair", pair, Arity::exact(2), Results::Fixed(1));
const ECHO: NativeFunction = NativeFunction::new("echo", echo, Arity::ANY, Results::Variable);
const THREE: NativeFunction =
    NativeFunction::new("three_for_two", three_for_two, Arity::ANY, Results::Fixed(2));
const SHORT: NativeFunction =
    NativeFunction::new("short_change", short_change, Arity::ANY, Results::Fixed(2));
const LIAR: NativeFunction = NativeFunction::new("liar", liar, Arity::ANY, Results::Variable);
const REENTER: NativeFunction =
    NativeFunction::new("reenter", reenter, Arity::exact(1), Results::Fixed(4));
const RECURSE: NativeFunction =
    NativeFunction::new("recurse", recurse, Arity::ANY, Results::Fixed(0));

fn runtime() -> Runtime {
    let mut rt = Runtime::new();
    for native in [GUARDED, PAIR, ECHO, THREE, SHORT, LIAR, REENTER, RECURSE] {
        rt.set_native_global(native);
    }
    rt
}

// ============================================================================
// Arity
// ============================================================================

#[test]
fn test_arity_checked_before_body_runs() {
    let mut rt = runtime();

    rt.push_global("guarded").unwrap();
    // A table would be a type error; arity must win.
    rt.create_table(0, 0).unwrap();
    let err = rt.call(1, None).unwrap_err();

    assert_eq!(
        err,
        RuntimeError::Arity {
            function: "guarded".into(),
            expected: Arity::exact(2),
            actual: 1
        }
    );
    assert_eq!(
        err.to_string(),
        "wrong number of arguments to 'guarded' (expected [2,2], got 1)"
    );
    assert_eq!(GUARDED_CALLS.load(Ordering::SeqCst), 0);
    assert_eq!(rt.gettop(), 0);
}

#[test]
fn test_call_non_function() {
    let mut rt = runtime();
    rt.push(1i64).unwrap();
    let err = rt.call(0, None).unwrap_err();
    assert!(err.to_string().contains("attempt to call a non-function value (integer)"), "{err}");
    assert_eq!(rt.gettop(), 0);
}

#[test]
fn test_call_without_enough_values() {
    let mut rt = runtime();
    rt.push_global("pair").unwrap();
    assert!(rt.call(2, None).is_err());
}

// ============================================================================
// Result adjustment
// ============================================================================

#[test]
fn test_fixed_results_discard_surplus() {
    let mut rt = runtime();
    rt.push_global("three_for_two").unwrap();
    assert_eq!(rt.call(0, None).unwrap(), 2);
    assert_eq!(rt.frame_values(), &[Value::int(1), Value::int(2)]);
}

#[test]
fn test_fixed_results_short_is_error() {
    let mut rt = runtime();
    rt.push("below").unwrap();
    rt.push_global("short_change").unwrap();
    let err = rt.call(0, None).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::ResultCount {
            function: "short_change".into(),
            expected: 2,
            actual: 1
        }
    );
    assert_eq!(rt.gettop(), 1);
}

#[test]
fn test_claiming_missing_results_is_error() {
    let mut rt = runtime();
    rt.push_global("liar").unwrap();
    assert!(matches!(rt.call(0, None), Err(RuntimeError::ResultCount { .. })));
    assert_eq!(rt.gettop(), 0);
}

#[test]
fn test_variable_results_drop_junk_below_claimed() {
    let mut rt = runtime();
    rt.push_global("echo").unwrap();
    rt.push(1i64).unwrap();
    rt.push(2i64).unwrap();
    assert_eq!(rt.call(2, None).unwrap(), 2);
    assert_eq!(rt.frame_values(), &[Value::int(1), Value::int(2)]);
}

#[test]
fn test_want_pads_with_nil_and_truncates() {
    let mut rt = runtime();
    rt.push_global("echo").unwrap();
    rt.push(7i64).unwrap();
    assert_eq!(rt.call(1, Some(3)).unwrap(), 3);
    assert_eq!(rt.frame_values(), &[Value::int(7), Value::Nil, Value::Nil]);

    rt.settop(0).unwrap();
    rt.push_global("echo").unwrap();
    rt.push(1i64).unwrap();
    rt.push(2i64).unwrap();
    rt.push(3i64).unwrap();
    assert_eq!(rt.call(3, Some(1)).unwrap(), 1);
    assert_eq!(rt.frame_values(), &[Value::int(1)]);
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[test]
fn test_nested_call_restores_caller_frame() {
    let mut rt = runtime();
    rt.push_global("reenter").unwrap();
    rt.push(5i64).unwrap();
    assert_eq!(rt.call(1, None).unwrap(), 4);
    assert_eq!(
        rt.frame_values(),
        &[Value::int(15), Value::int(1), Value::int(1), Value::int(5)]
    );
    assert_eq!(rt.depth(), 0);
}

#[test]
fn test_call_depth_is_bounded() {
    let mut rt = runtime();
    rt.push_global("recurse").unwrap();
    let err = rt.call(0, None).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::ResourceExhausted {
            what: "call depth",
            limit: 200
        }
    );
    assert_eq!(rt.depth(), 0);
    assert_eq!(rt.gettop(), 0);
}

#[test]
fn test_define_native_is_deduplicated() {
    let mut rt = Runtime::new();
    let a = rt.define_native(PAIR);
    let b = rt.define_native(PAIR);
    assert_eq!(a, b);
}

// ============================================================================
// Stack-height invariant
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_height_is_caller_plus_results(
        below in 0usize..5,
        args in proptest::collection::vec(any::<i64>(), 0..6),
        want in proptest::option::of(0usize..6),
    ) {
        let mut rt = runtime();
        for i in 0..below {
            rt.push(i as i64).unwrap();
        }
        rt.push_global("echo").unwrap();
        for &a in &args {
            rt.push(a).unwrap();
        }
        let n = rt.call(args.len(), want).unwrap();
        prop_assert_eq!(n, want.unwrap_or(args.len()));
        prop_assert_eq!(rt.gettop(), below + n);
    }

    #[test]
    fn prop_fixed_arity_pair(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
        let mut rt = runtime();
        rt.push("anchor").unwrap();
        rt.push_global("pair").unwrap();
        rt.push(a).unwrap();
        rt.push(b).unwrap();
        prop_assert_eq!(rt.call(2, None).unwrap(), 1);
        prop_assert_eq!(rt.gettop(), 2);
        prop_assert_eq!(rt.value_at(-1), Value::int(a + b));
    }
}
