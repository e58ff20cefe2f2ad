//! Tests for resource limits.
//!
//! Memory exhaustion is uncatchable: "try" and "has" helpers must propagate it, and
//! every operation that fails on it must give back what it had taken.

use objproto::{
    ArgBuilder, CallArgs, ExcType, HeapId, ResourceLimits, RunResult, Runtime, TypeSpec, Value, capi,
};
use pretty_assertions::assert_eq;

fn limited(max_allocations: usize) -> Runtime {
    Runtime::builder()
        .limits(ResourceLimits::new().max_allocations(max_allocations))
        .build()
}

fn first_arg(rt: &mut Runtime, args: CallArgs<'_>) -> RunResult<Value> {
    match args.positional().first() {
        Some(&arg) => Ok(rt.retain(arg)),
        None => Ok(rt.none()),
    }
}

fn allocating_get(rt: &mut Runtime, _obj: HeapId) -> RunResult<Value> {
    rt.new_str("fresh")
}

// =============================================================================
// 1. Configuration
// =============================================================================

/// Limits load from JSON; missing keys mean "no limit".
#[test]
fn limits_from_json() {
    let limits = ResourceLimits::from_json(r#"{"max_allocations": 3, "max_recursion_depth": 10}"#).unwrap();
    assert_eq!(
        limits,
        ResourceLimits {
            max_allocations: Some(3),
            max_memory: None,
            max_recursion_depth: Some(10),
        }
    );
    assert_eq!(ResourceLimits::from_json("{}").unwrap(), ResourceLimits::default());
    assert!(ResourceLimits::from_json("{max_memory}").is_err());
}

/// Unlimited runtimes report no counters.
#[test]
fn unlimited_runtime_has_no_counters() {
    let mut rt = Runtime::new();
    let value = rt.new_int(1).unwrap();
    assert_eq!(rt.allocation_count(), None);
    assert_eq!(rt.current_memory_bytes(), None);
    rt.release(value);
}

// =============================================================================
// 2. Allocation Limits
// =============================================================================

/// Exceeding the allocation limit is an uncatchable `MemoryError`.
#[test]
fn allocation_limit_is_uncatchable() {
    let mut rt = limited(2);
    let _a = rt.new_int(1).unwrap();
    let _b = rt.new_int(2).unwrap();

    let err = rt.new_int(3).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);
    assert!(!err.is_catchable());
    assert!(!err.matches(ExcType::MemoryError), "uncatchable errors match no handler");
}

/// The memory limit counts live bytes, so freeing makes room again.
#[test]
fn memory_limit_is_refunded_on_free() {
    let mut rt = Runtime::builder()
        .limits(ResourceLimits::new().max_memory(200))
        .build();

    let big = rt.new_str(&"x".repeat(120)).unwrap();
    let err = rt.new_str(&"y".repeat(120)).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);

    rt.release(big);
    let again = rt.new_str(&"y".repeat(120)).unwrap();
    assert_eq!(rt.var_size(again.id()), Some(120));
}

/// `has_attr_string` propagates a memory error hit while boxing the name.
#[test]
fn has_attr_propagates_memory_error() {
    let mut rt = limited(1);
    let object = std::rc::Rc::clone(&rt.types().object);
    let obj = rt.new_instance(&object).unwrap();

    let err = rt.has_attr_string(obj.id(), "anything").unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);

    assert_eq!(capi::object_has_attr_string(&mut rt, obj.id(), "anything"), -1);
    assert!(rt.err_occurred().is_some_and(|err| !err.is_catchable()));
    rt.err_clear();
}

/// `try_get_attr` propagates a memory error raised by a getter.
#[test]
fn try_get_attr_propagates_memory_error() {
    let mut rt = limited(2);
    let ty = TypeSpec::new("Greedy")
        .base(&rt.types().object)
        .getset("fresh", Some(allocating_get), None)
        .build();
    let obj = rt.new_instance(&ty).unwrap();
    let name = rt.new_str("fresh").unwrap();

    let err = rt.try_get_attr(obj.id(), name.id()).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);
    assert!(rt.has_attr(obj.id(), name.id()).is_err());
}

/// A failed argument build releases what it had already built.
#[test]
fn failed_argument_build_releases_partial_values() {
    let mut rt = limited(2);
    let func = rt.new_function("first", first_arg).unwrap();
    let live = rt.live_objects();

    let err = rt
        .call_function(func.id(), ArgBuilder::new().int(1).int(2))
        .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);
    assert_eq!(rt.live_objects(), live);
}

// =============================================================================
// 3. Keyword Flattening Under Pressure
// =============================================================================

/// Builds `func`, `(1,)` and `{"b": 2}`: six allocations in total.
fn kwargs_call_setup(rt: &mut Runtime) -> (Value, Value, Value, HeapId) {
    let func = rt.new_function("first", first_arg).unwrap();
    let one = rt.new_int(1).unwrap();
    let args = rt.new_tuple_from_ids(&[one.id()]).unwrap();
    let two = rt.new_int(2).unwrap();
    let kwargs = rt.new_dict().unwrap();
    rt.dict_set_item(kwargs.id(), "b", two.id()).unwrap();
    let one_id = one.id();
    rt.release(one);
    rt.release(two);
    (func, args, kwargs, one_id)
}

/// When the flattening buffer cannot be charged, nothing has been retained.
#[test]
fn buffer_charge_failure_leaves_refcounts_intact() {
    let mut rt = limited(6);
    let (func, args, kwargs, one) = kwargs_call_setup(&mut rt);
    let before = (rt.refcount(one), rt.live_objects());

    let err = rt.call(func.id(), args.id(), Some(kwargs.id())).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);
    assert_eq!((rt.refcount(one), rt.live_objects()), before);
}

/// When the kwnames tuple cannot be allocated, the retained arguments and the buffer
/// charge are given back.
#[test]
fn kwnames_failure_releases_flattened_frame() {
    let mut rt = limited(7);
    let (func, args, kwargs, one) = kwargs_call_setup(&mut rt);
    let before = (rt.refcount(one), rt.live_objects(), rt.current_memory_bytes());

    let err = rt.call(func.id(), args.id(), Some(kwargs.id())).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::MemoryError);
    assert_eq!((rt.refcount(one), rt.live_objects(), rt.current_memory_bytes()), before);
    assert_eq!(rt.allocation_count(), Some(7), "the buffer itself was charged");
}

/// With room to spare the same call succeeds.
#[test]
fn kwargs_call_succeeds_with_headroom() {
    let mut rt = limited(8);
    let (func, args, kwargs, one) = kwargs_call_setup(&mut rt);

    let result = rt.call(func.id(), args.id(), Some(kwargs.id())).unwrap();
    assert_eq!(result.id(), one);
}
