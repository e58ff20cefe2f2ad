//! Tests for rich comparison, truthiness and hashing.

use std::{cell::RefCell, rc::Rc};

use objproto::{
    CompareOp, ExcType, HeapData, HeapId, RecordingTracer, ResourceLimits, RunResult, Runtime, SimpleException,
    TraceEvent, TypeObject, TypeSlots, TypeSpec, Value, capi, py_hash,
};
use pretty_assertions::assert_eq;

fn base_compare(rt: &mut Runtime, _left: HeapId, _right: HeapId, op: CompareOp) -> RunResult<Value> {
    rt.new_str(&format!("base {op}"))
}

fn derived_compare(rt: &mut Runtime, _left: HeapId, _right: HeapId, op: CompareOp) -> RunResult<Value> {
    rt.new_str(&format!("derived {op}"))
}

fn declining_compare(rt: &mut Runtime, _left: HeapId, _right: HeapId, _op: CompareOp) -> RunResult<Value> {
    Ok(rt.not_implemented())
}

fn failing_compare(_rt: &mut Runtime, _left: HeapId, _right: HeapId, _op: CompareOp) -> RunResult<Value> {
    Err(SimpleException::new_msg(ExcType::ValueError, "cannot compare").into())
}

fn always_equal(rt: &mut Runtime, _left: HeapId, _right: HeapId, op: CompareOp) -> RunResult<Value> {
    Ok(rt.new_bool(matches!(op, CompareOp::Eq | CompareOp::Le | CompareOp::Ge)))
}

fn constant_hash(_rt: &mut Runtime, _obj: HeapId) -> RunResult<i64> {
    Ok(42)
}

fn looping_compare(rt: &mut Runtime, left: HeapId, right: HeapId, op: CompareOp) -> RunResult<Value> {
    rt.rich_compare(left, right, op)
}

fn comparing_type(name: &str, base: &Rc<TypeObject>, compare: objproto::types::RichCompareFn) -> Rc<TypeObject> {
    TypeSpec::new(name)
        .base(base)
        .slots(TypeSlots {
            richcompare: Some(compare),
            ..TypeSlots::default()
        })
        .build()
}

fn instance(rt: &mut Runtime, ty: &Rc<TypeObject>) -> Value {
    rt.object_new(ty, HeapData::Empty).unwrap()
}

fn str_result(rt: &mut Runtime, value: RunResult<Value>) -> String {
    let value = value.unwrap();
    let text = rt.str_value(value.id()).unwrap().to_owned();
    rt.release(value);
    text
}

// =============================================================================
// 1. Dispatch Order
// =============================================================================

/// Built-in ints answer every operator.
#[test]
fn int_comparisons() {
    let mut rt = Runtime::new();
    let one = rt.new_int(1).unwrap();
    let two = rt.new_int(2).unwrap();

    let cases = [
        (CompareOp::Lt, true),
        (CompareOp::Le, true),
        (CompareOp::Eq, false),
        (CompareOp::Ne, true),
        (CompareOp::Gt, false),
        (CompareOp::Ge, false),
    ];
    for (op, expected) in cases {
        assert_eq!(rt.rich_compare_bool(one.id(), two.id(), op).unwrap(), expected, "1 {op} 2");
    }
}

/// A right operand of a proper subtype gets the first, reflected, try.
#[test]
fn subtype_reflected_operation_goes_first() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let base = comparing_type("Base", &object, base_compare);
    let derived = comparing_type("Derived", &base, derived_compare);
    let b = instance(&mut rt, &base);
    let d = instance(&mut rt, &derived);

    let result = rt.rich_compare(b.id(), d.id(), CompareOp::Lt);
    assert_eq!(str_result(&mut rt, result), "derived >");

    let result = rt.rich_compare(d.id(), b.id(), CompareOp::Lt);
    assert_eq!(str_result(&mut rt, result), "derived <");
}

/// Unrelated types: left operand first, then the reflected operation on the right.
#[test]
fn not_implemented_falls_through_to_reflected() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let shy = comparing_type("Shy", &object, declining_compare);
    let eager = comparing_type("Eager", &object, base_compare);
    let s = instance(&mut rt, &shy);
    let e = instance(&mut rt, &eager);

    let result = rt.rich_compare(s.id(), e.id(), CompareOp::Le);
    assert_eq!(str_result(&mut rt, result), "base >=");
    let result = rt.rich_compare(e.id(), s.id(), CompareOp::Le);
    assert_eq!(str_result(&mut rt, result), "base <=");
}

/// With nobody answering, equality falls back to identity.
#[test]
fn equality_falls_back_to_identity() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let shy = comparing_type("Shy", &object, declining_compare);
    let a = instance(&mut rt, &shy);
    let b = instance(&mut rt, &shy);

    let eq = rt.rich_compare(a.id(), b.id(), CompareOp::Eq).unwrap();
    assert_eq!(eq.id(), rt.false_id());
    let ne = rt.rich_compare(a.id(), b.id(), CompareOp::Ne).unwrap();
    assert_eq!(ne.id(), rt.true_id());
    let same = rt.rich_compare(a.id(), a.id(), CompareOp::Eq).unwrap();
    assert_eq!(same.id(), rt.true_id());
}

/// With nobody answering, orderings are a `TypeError` naming both types.
#[test]
fn unorderable_types_raise_type_error() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let obj = rt.new_instance(&object).unwrap();
    let one = rt.new_int(1).unwrap();

    let err = rt.rich_compare(obj.id(), one.id(), CompareOp::Lt).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(
        err.exception().arg(),
        Some("'<' not supported between instances of 'object' and 'int'")
    );
}

/// Tuples compare lexicographically through their items.
#[test]
fn tuples_compare_lexicographically() {
    let mut rt = Runtime::new();
    let make = |rt: &mut Runtime, items: &[i64]| {
        let values = items.iter().map(|&v| rt.new_int(v).unwrap()).collect();
        rt.new_tuple(values).unwrap()
    };
    let a = make(&mut rt, &[1, 2]);
    let b = make(&mut rt, &[1, 3]);
    let c = make(&mut rt, &[1, 2]);
    let short = make(&mut rt, &[1]);

    assert!(rt.rich_compare_bool(a.id(), b.id(), CompareOp::Lt).unwrap());
    assert!(rt.rich_compare_bool(a.id(), c.id(), CompareOp::Eq).unwrap());
    assert!(rt.rich_compare_bool(short.id(), a.id(), CompareOp::Lt).unwrap());
    assert!(!rt.rich_compare_bool(b.id(), a.id(), CompareOp::Le).unwrap());
}

// =============================================================================
// 2. Boolean Comparison
// =============================================================================

/// Identical operands are equal without consulting any slot.
#[test]
fn identity_shortcut_skips_slots() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let failing = comparing_type("Failing", &object, failing_compare);
    let obj = instance(&mut rt, &failing);

    assert!(rt.rich_compare_bool(obj.id(), obj.id(), CompareOp::Eq).unwrap());
    assert!(!rt.rich_compare_bool(obj.id(), obj.id(), CompareOp::Ne).unwrap());
    let err = rt.rich_compare_bool(obj.id(), obj.id(), CompareOp::Lt).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ValueError);
}

/// A failing comparison is an error, reported as `-1` with a pending error at the C
/// boundary.
#[test]
fn failing_comparison_reports_error() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let failing = comparing_type("Failing", &object, failing_compare);
    let a = instance(&mut rt, &failing);
    let b = instance(&mut rt, &failing);

    let err = rt.rich_compare_bool(a.id(), b.id(), CompareOp::Eq).unwrap_err();
    assert_eq!(err.exception().arg(), Some("cannot compare"));

    assert_eq!(capi::object_rich_compare_bool(&mut rt, a.id(), b.id(), 2), -1);
    assert!(rt.err_matches(ExcType::ValueError));
    rt.err_clear();
}

/// A result whose truth value fails makes the boolean comparison fail.
#[test]
fn untruthy_result_propagates() {
    fn raising_bool(_rt: &mut Runtime, _obj: HeapId) -> RunResult<bool> {
        Err(SimpleException::new_msg(ExcType::TypeError, "no truth").into())
    }
    fn answer_with_raising(rt: &mut Runtime, _left: HeapId, _right: HeapId, _op: CompareOp) -> RunResult<Value> {
        let ty = TypeSpec::new("Undecided")
            .slots(TypeSlots {
                bool: Some(raising_bool),
                ..TypeSlots::default()
            })
            .build();
        rt.object_new(&ty, HeapData::Empty)
    }

    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let ty = comparing_type("Odd", &object, answer_with_raising);
    let a = instance(&mut rt, &ty);
    let b = instance(&mut rt, &ty);
    let baseline = rt.live_objects();

    let err = rt.rich_compare_bool(a.id(), b.id(), CompareOp::Eq).unwrap_err();
    assert_eq!(err.exception().arg(), Some("no truth"));
    assert_eq!(rt.live_objects(), baseline, "the comparison result is released");
}

/// Re-entrant comparisons are bounded by the recursion guard.
#[test]
fn runaway_comparison_is_bounded() {
    let mut rt = Runtime::builder()
        .limits(ResourceLimits::new().max_recursion_depth(Some(50)))
        .build();
    let object = Rc::clone(&rt.types().object);
    let ty = comparing_type("Loop", &object, looping_compare);
    let a = instance(&mut rt, &ty);
    let b = instance(&mut rt, &ty);

    let err = rt.rich_compare(a.id(), b.id(), CompareOp::Eq).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::RecursionError);
    assert_eq!(err.exception().arg(), Some("maximum recursion depth exceeded in comparison"));
    assert_eq!(rt.recursion_depth(), 0);
}

/// The C-level entry point rejects operator numbers outside `0..=5`.
#[test]
fn invalid_operator_number_is_rejected() {
    let mut rt = Runtime::new();
    let one = rt.new_int(1).unwrap();

    assert!(capi::object_rich_compare(&mut rt, one.id(), one.id(), 6).is_none());
    assert!(rt.err_matches(ExcType::SystemError));
    rt.err_clear();
    assert_eq!(capi::object_rich_compare_bool(&mut rt, one.id(), one.id(), 0), 0);
    assert_eq!(capi::object_rich_compare_bool(&mut rt, one.id(), one.id(), 1), 1);
}

// =============================================================================
// 3. Truthiness
// =============================================================================

/// Truth comes from the `bool` slot, then `len`, then defaults to true.
#[test]
fn truthiness_fallback_chain() {
    let mut rt = Runtime::new();
    let zero = rt.new_int(0).unwrap();
    let empty_str = rt.new_str("").unwrap();
    let text = rt.new_str("x").unwrap();
    let empty_tuple = rt.new_tuple(vec![]).unwrap();
    let object = Rc::clone(&rt.types().object);
    let obj = rt.new_instance(&object).unwrap();

    assert!(!rt.is_true(rt.none_id()).unwrap());
    assert!(!rt.is_true(rt.false_id()).unwrap());
    assert!(rt.is_true(rt.true_id()).unwrap());
    assert!(!rt.is_true(zero.id()).unwrap());
    assert!(!rt.is_true(empty_str.id()).unwrap());
    assert!(rt.is_true(text.id()).unwrap());
    assert!(!rt.is_true(empty_tuple.id()).unwrap());
    assert!(rt.is_true(obj.id()).unwrap());
    assert!(rt.not_(zero.id()).unwrap());
}

/// `NotImplemented` is truthy but warns.
#[test]
fn not_implemented_truthiness_warns() {
    let tracer = Rc::new(RefCell::new(RecordingTracer::new()));
    let mut rt = Runtime::builder().tracer(Rc::clone(&tracer)).build();

    assert!(rt.is_true(rt.not_implemented_id()).unwrap());
    let warnings: Vec<TraceEvent> = tracer
        .borrow()
        .events()
        .iter()
        .filter(|e| matches!(e, TraceEvent::Warning { .. }))
        .cloned()
        .collect();
    assert_eq!(
        warnings,
        vec![TraceEvent::Warning {
            category: ExcType::DeprecationWarning,
            message: "NotImplemented should not be used in a boolean context".to_owned(),
        }]
    );
}

// =============================================================================
// 4. Hashing
// =============================================================================

/// `hash_not_implemented` fails for any object it is called on.
#[test]
fn hash_not_implemented_always_fails() {
    let mut rt = Runtime::new();
    let dict = rt.new_dict().unwrap();
    let one = rt.new_int(1).unwrap();

    let err = rt.hash(dict.id()).unwrap_err();
    assert_eq!(err.exception().arg(), Some("unhashable type: 'dict'"));
    let err = rt.hash_not_implemented(one.id()).unwrap_err();
    assert_eq!(err.exception().arg(), Some("unhashable type: 'int'"));

    assert_eq!(capi::object_hash(&mut rt, dict.id()), py_hash::HASH_ERROR);
    assert!(rt.err_matches(ExcType::TypeError));
    rt.err_clear();
}

/// Hashes never equal the error sentinel.
#[test]
fn hash_never_returns_error_sentinel() {
    let mut rt = Runtime::new();
    let minus_one = rt.new_int(-1).unwrap();
    let object = Rc::clone(&rt.types().object);
    let obj = rt.new_instance(&object).unwrap();
    let empty = rt.new_str("").unwrap();

    assert_eq!(rt.hash(minus_one.id()).unwrap(), -2);
    assert_eq!(rt.hash(empty.id()).unwrap(), 0);
    assert_ne!(rt.hash(obj.id()).unwrap(), py_hash::HASH_ERROR);
    assert_eq!(rt.hash(obj.id()).unwrap(), rt.hash(obj.id()).unwrap());
}

/// A type that defines equality without a hash does not keep `object`'s identity
/// hash, so two equal instances can never hash differently.
#[test]
fn equality_without_hash_is_unhashable() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let ty = comparing_type("Equal", &object, always_equal);
    let a = instance(&mut rt, &ty);
    let b = instance(&mut rt, &ty);

    assert!(rt.rich_compare_bool(a.id(), b.id(), CompareOp::Eq).unwrap());
    let err = rt.hash(a.id()).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(err.exception().arg(), Some("unhashable type: 'Equal'"));

    let pair = rt.new_tuple_from_ids(&[a.id()]).unwrap();
    assert!(rt.hash(pair.id()).is_err(), "a tuple holding it is unhashable too");
}

/// Defining both slots keeps the type hashable, and subclasses inherit the pair.
#[test]
fn equality_with_hash_is_inherited_together() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let ty = TypeSpec::new("Hashed")
        .base(&object)
        .slots(TypeSlots {
            richcompare: Some(always_equal),
            hash: Some(constant_hash),
            ..TypeSlots::default()
        })
        .build();
    let sub = TypeSpec::new("SubHashed").base(&ty).build();
    let a = instance(&mut rt, &ty);
    let b = instance(&mut rt, &sub);

    assert_eq!(rt.hash(a.id()).unwrap(), 42);
    assert_eq!(rt.hash(b.id()).unwrap(), 42);
}

/// Plain instances of `object` subclasses hash by identity.
#[test]
fn plain_instances_hash_by_identity() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let plain = TypeSpec::new("Plain").base(&object).build();
    let a = instance(&mut rt, &plain);
    let b = instance(&mut rt, &plain);

    assert_eq!(rt.hash(a.id()).unwrap(), py_hash::hash_identity(a.id().index()));
    assert_ne!(rt.hash(a.id()).unwrap(), rt.hash(b.id()).unwrap());
}

/// Equal tuples hash equally.
#[test]
fn equal_tuples_hash_equally() {
    let mut rt = Runtime::new();
    let make = |rt: &mut Runtime| {
        let a = rt.new_int(1).unwrap();
        let b = rt.new_str("b").unwrap();
        rt.new_tuple(vec![a, b]).unwrap()
    };
    let first = make(&mut rt);
    let second = make(&mut rt);
    assert_ne!(first.id(), second.id());
    assert_eq!(rt.hash(first.id()).unwrap(), rt.hash(second.id()).unwrap());
}
