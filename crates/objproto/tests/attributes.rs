//! Tests for the attribute protocol.
//!
//! Exercises the slot fallback chain (object-keyed slot, legacy string slot, error),
//! the generic resolver's descriptor/dict precedence, the "try" and "has" error
//! policies, and type readying.

use std::rc::Rc;

use objproto::{
    ConstValue, ExcType, HeapData, HeapId, RunResult, Runtime, SimpleException, TypeObject, TypeSlots, TypeSpec,
    Value,
};
use pretty_assertions::assert_eq;

fn kind_get(rt: &mut Runtime, _obj: HeapId) -> RunResult<Value> {
    rt.new_str("point")
}

fn secret_set(_rt: &mut Runtime, _obj: HeapId, _value: Option<HeapId>) -> RunResult<()> {
    Ok(())
}

fn broken_get(_rt: &mut Runtime, _obj: HeapId) -> RunResult<Value> {
    Err(SimpleException::new_msg(ExcType::ValueError, "broken getter").into())
}

fn vanishing_get(_rt: &mut Runtime, _obj: HeapId) -> RunResult<Value> {
    Err(SimpleException::new_msg(ExcType::AttributeError, "gone").into())
}

fn norm(rt: &mut Runtime, receiver: HeapId, _args: objproto::CallArgs<'_>) -> RunResult<Value> {
    let x = rt.get_attr_string(receiver, "x")?;
    let value = rt.int_value(x.id()).unwrap_or_default().abs();
    rt.release(x);
    rt.new_int(value)
}

/// A dict-carrying type with one member of every kind.
fn point_type(rt: &Runtime) -> Rc<TypeObject> {
    TypeSpec::new("Point")
        .base(&rt.types().object)
        .with_dict()
        .getset("kind", Some(kind_get), None)
        .getset("secret", None, Some(secret_set))
        .getset("broken", Some(broken_get), None)
        .getset("vanishing", Some(vanishing_get), None)
        .method("norm", norm)
        .constant("dims", ConstValue::Int(2))
        .build()
}

fn name(rt: &mut Runtime, text: &str) -> Value {
    rt.new_str(text).unwrap()
}

fn message(err: &objproto::RunError) -> &str {
    err.exception().arg().unwrap_or_default()
}

// =============================================================================
// 1. Attribute Names
// =============================================================================

/// Non-`str` names are a `TypeError` whatever the target object is.
#[test]
fn non_str_name_is_type_error() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let five = rt.new_int(5).unwrap();
    let targets = [point.id(), five.id(), rt.none_id()];

    for target in targets {
        let err = rt.get_attr(target, five.id()).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::TypeError);
        assert_eq!(message(&err), "attribute name must be string, not 'int'");

        let err = rt.set_attr(target, five.id(), Some(five.id())).unwrap_err();
        assert_eq!(message(&err), "attribute name must be string, not 'int'");

        let err = rt.try_get_attr(target, five.id()).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::TypeError);
    }
}

/// `has_attr` reports a bad name as "absent" rather than failing.
#[test]
fn has_attr_swallows_bad_name() {
    let mut rt = Runtime::new();
    let five = rt.new_int(5).unwrap();
    assert!(!rt.has_attr(five.id(), five.id()).unwrap());
    assert!(rt.err_occurred().is_none());
}

// =============================================================================
// 2. Generic Resolution
// =============================================================================

/// Assigned attributes land in the instance dict and read back.
#[test]
fn instance_dict_round_trip() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let x = name(&mut rt, "x");
    let seven = rt.new_int(7).unwrap();

    rt.set_attr(point.id(), x.id(), Some(seven.id())).unwrap();
    let value = rt.get_attr(point.id(), x.id()).unwrap();
    assert_eq!(value.id(), seven.id());

    let dict = rt.instance_dict(point.id()).unwrap();
    assert_eq!(rt.dict(dict).unwrap().get("x"), Some(seven.id()));

    rt.del_attr(point.id(), x.id()).unwrap();
    let err = rt.get_attr(point.id(), x.id()).unwrap_err();
    assert_eq!(message(&err), "'Point' object has no attribute 'x'");
}

/// Deleting an attribute that is not there is an `AttributeError`.
#[test]
fn deleting_missing_attribute_fails() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();

    let err = rt.set_attr_string(point.id(), "nope", None).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
    assert_eq!(message(&err), "'Point' object has no attribute 'nope'");
}

/// Data descriptors win over instance dict entries of the same name.
#[test]
fn data_descriptor_precedes_instance_dict() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let shadow = rt.new_int(0).unwrap();
    let dict = rt.instance_dict(point.id()).unwrap();
    rt.dict_set_item(dict, "kind", shadow.id()).unwrap();

    let value = rt.get_attr_string(point.id(), "kind").unwrap();
    assert_eq!(rt.str_value(value.id()), Some("point"));
}

/// Instance dict entries win over methods and constants.
#[test]
fn instance_dict_precedes_methods_and_constants() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let three = rt.new_int(3).unwrap();

    let dims = rt.get_attr_string(point.id(), "dims").unwrap();
    assert_eq!(rt.int_value(dims.id()), Some(2));

    rt.set_attr_string(point.id(), "dims", Some(three.id())).unwrap();
    rt.set_attr_string(point.id(), "norm", Some(three.id())).unwrap();
    let dims = rt.get_attr_string(point.id(), "dims").unwrap();
    let norm = rt.get_attr_string(point.id(), "norm").unwrap();
    assert_eq!(dims.id(), three.id());
    assert_eq!(norm.id(), three.id());
}

/// A getset without a setter is read-only and one without a getter is write-only.
#[test]
fn getset_access_rules() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let one = rt.new_int(1).unwrap();

    let err = rt.set_attr_string(point.id(), "kind", Some(one.id())).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
    assert_eq!(message(&err), "attribute 'kind' of 'Point' objects is not writable");

    rt.set_attr_string(point.id(), "secret", Some(one.id())).unwrap();
    let err = rt.get_attr_string(point.id(), "secret").unwrap_err();
    assert_eq!(message(&err), "attribute 'secret' of 'Point' objects is not readable");
}

/// Methods come back bound to the instance and are callable.
#[test]
fn methods_bind_to_instance() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let minus_four = rt.new_int(-4).unwrap();
    rt.set_attr_string(point.id(), "x", Some(minus_four.id())).unwrap();

    let method = rt.get_attr_string(point.id(), "norm").unwrap();
    assert_eq!(rt.type_name(method.id()), "method");
    let result = rt.call_no_args(method.id()).unwrap();
    assert_eq!(rt.int_value(result.id()), Some(4));
}

/// Without a `__dict__`, methods are read-only and new names cannot be added.
#[test]
fn dictless_instances_reject_assignment() {
    let mut rt = Runtime::new();
    let ty = TypeSpec::new("Fixed")
        .base(&rt.types().object)
        .method("norm", norm)
        .build();
    let fixed = rt.new_instance(&ty).unwrap();
    let one = rt.new_int(1).unwrap();

    let err = rt.set_attr_string(fixed.id(), "norm", Some(one.id())).unwrap_err();
    assert_eq!(message(&err), "'Fixed' object attribute 'norm' is read-only");

    let err = rt.set_attr_string(fixed.id(), "other", Some(one.id())).unwrap_err();
    assert_eq!(
        message(&err),
        "'Fixed' object has no attribute 'other' and no __dict__ for setting new attributes"
    );
}

/// Plain `object()` instances have no `__dict__`.
#[test]
fn object_instances_have_no_dict() {
    let mut rt = Runtime::new();
    let object = Rc::clone(&rt.types().object);
    let args = rt.new_tuple(vec![]).unwrap();
    let obj = rt.construct(&object, args.id(), None).unwrap();
    let one = rt.new_int(1).unwrap();

    let err = rt.set_attr_string(obj.id(), "x", Some(one.id())).unwrap_err();
    assert_eq!(
        message(&err),
        "'object' object has no attribute 'x' and no __dict__ for setting new attributes"
    );
}

// =============================================================================
// 3. Try and Has
// =============================================================================

/// A missing attribute is `Ok(None)` with nothing pending; a present one is returned.
#[test]
fn try_get_attr_distinguishes_missing_from_present() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let missing = name(&mut rt, "missing");
    let kind = name(&mut rt, "kind");

    assert!(rt.try_get_attr(point.id(), missing.id()).unwrap().is_none());
    assert!(rt.err_occurred().is_none());

    let found = rt.try_get_attr(point.id(), kind.id()).unwrap().unwrap();
    assert_eq!(rt.str_value(found.id()), Some("point"));
}

/// Only `AttributeError` means "missing"; any other getter failure propagates.
#[test]
fn try_get_attr_suppresses_only_attribute_error() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let broken = name(&mut rt, "broken");
    let vanishing = name(&mut rt, "vanishing");

    let err = rt.try_get_attr(point.id(), broken.id()).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::ValueError);
    assert_eq!(message(&err), "broken getter");

    assert!(rt.try_get_attr(point.id(), vanishing.id()).unwrap().is_none());
}

/// `has_attr` treats every catchable failure as absence.
#[test]
fn has_attr_reports_presence() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();

    assert!(rt.has_attr_string(point.id(), "kind").unwrap());
    assert!(rt.has_attr_string(point.id(), "norm").unwrap());
    assert!(!rt.has_attr_string(point.id(), "missing").unwrap());
    assert!(!rt.has_attr_string(point.id(), "broken").unwrap());
    assert!(rt.err_occurred().is_none());
}

// =============================================================================
// 4. Slot Fallback Chain
// =============================================================================

fn legacy_get(rt: &mut Runtime, _obj: HeapId, name: &str) -> RunResult<Value> {
    if name == "missing" {
        return Err(SimpleException::new_msg(ExcType::AttributeError, "no such thing").into());
    }
    rt.new_str(&format!("legacy:{name}"))
}

fn legacy_set(_rt: &mut Runtime, _obj: HeapId, name: &str, value: Option<HeapId>) -> RunResult<()> {
    match value {
        Some(_) => Ok(()),
        None => Err(SimpleException::new_msg(ExcType::AttributeError, format!("cannot delete {name}")).into()),
    }
}

fn legacy_type() -> Rc<TypeObject> {
    TypeSpec::new("Legacy")
        .slots(TypeSlots {
            getattr: Some(legacy_get),
            setattr: Some(legacy_set),
            ..TypeSlots::default()
        })
        .build()
}

/// Types with only the string-keyed slots are reached from both entry points.
#[test]
fn legacy_string_slots_are_used() {
    let mut rt = Runtime::new();
    let ty = legacy_type();
    let obj = rt.object_new(&ty, HeapData::Empty).unwrap();
    let attr = name(&mut rt, "color");

    let value = rt.get_attr(obj.id(), attr.id()).unwrap();
    assert_eq!(rt.str_value(value.id()), Some("legacy:color"));
    let value = rt.get_attr_string(obj.id(), "size").unwrap();
    assert_eq!(rt.str_value(value.id()), Some("legacy:size"));

    rt.set_attr(obj.id(), attr.id(), Some(attr.id())).unwrap();
    let err = rt.set_attr_string(obj.id(), "color", None).unwrap_err();
    assert_eq!(message(&err), "cannot delete color");

    let missing = name(&mut rt, "missing");
    assert!(rt.try_get_attr(obj.id(), missing.id()).unwrap().is_none());
}

/// The legacy string path needs no temporary name object.
#[test]
fn legacy_string_path_allocates_no_name() {
    let mut rt = Runtime::builder().limits(objproto::ResourceLimits::new()).build();
    let ty = legacy_type();
    let obj = rt.object_new(&ty, HeapData::Empty).unwrap();

    let before = rt.allocation_count().unwrap();
    let value = rt.get_attr_string(obj.id(), "size").unwrap();
    assert_eq!(rt.allocation_count().unwrap(), before + 1, "only the result is allocated");
    rt.release(value);
}

/// String variants release their temporary name object.
#[test]
fn string_variants_release_temporary_name() {
    let mut rt = Runtime::new();
    let ty = point_type(&rt);
    let point = rt.new_instance(&ty).unwrap();
    let baseline = rt.live_objects();

    let value = rt.get_attr_string(point.id(), "dims").unwrap();
    rt.release(value);
    assert!(!rt.has_attr_string(point.id(), "missing").unwrap());
    assert_eq!(rt.live_objects(), baseline);
}

/// A type without any attribute slot fails each operation with its own message.
#[test]
fn slotless_type_errors() {
    let mut rt = Runtime::new();
    let ty = TypeSpec::new("Bare").build();
    let obj = rt.object_new(&ty, HeapData::Empty).unwrap();
    let attr = name(&mut rt, "x");

    let err = rt.get_attr(obj.id(), attr.id()).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::AttributeError);
    assert_eq!(message(&err), "'Bare' object has no attribute 'x'");

    let err = rt.set_attr(obj.id(), attr.id(), Some(attr.id())).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(message(&err), "'Bare' object has no attributes (assign to .x)");

    let err = rt.del_attr(obj.id(), attr.id()).unwrap_err();
    assert_eq!(message(&err), "'Bare' object has no attributes (del .x)");

    assert!(rt.try_get_attr(obj.id(), attr.id()).unwrap().is_none());
}

/// A type with a getter slot but no setter slot has read-only attributes.
#[test]
fn getter_only_type_is_read_only() {
    let mut rt = Runtime::new();
    let ty = TypeSpec::new("ReadOnly")
        .slots(TypeSlots {
            getattro: Some(Runtime::generic_get_attr),
            ..TypeSlots::default()
        })
        .constant("answer", ConstValue::Int(42))
        .build();
    let obj = rt.object_new(&ty, HeapData::Empty).unwrap();

    let answer = rt.get_attr_string(obj.id(), "answer").unwrap();
    assert_eq!(rt.int_value(answer.id()), Some(42));

    let err = rt.set_attr_string(obj.id(), "answer", Some(answer.id())).unwrap_err();
    assert_eq!(message(&err), "'ReadOnly' object has only read-only attributes (assign to .answer)");
    let err = rt.set_attr_string(obj.id(), "answer", None).unwrap_err();
    assert_eq!(message(&err), "'ReadOnly' object has only read-only attributes (del .answer)");
}

// =============================================================================
// 5. Type Readying
// =============================================================================

fn noop(rt: &mut Runtime, _receiver: HeapId, _args: objproto::CallArgs<'_>) -> RunResult<Value> {
    Ok(rt.none())
}

/// A type is readied by its first attribute access, and inherits its base's members.
#[test]
fn first_lookup_readies_type() {
    let mut rt = Runtime::new();
    let base = point_type(&rt);
    let derived = TypeSpec::new("Point3D")
        .base(&base)
        .constant("dims", ConstValue::Int(3))
        .build();
    assert!(!derived.is_ready());

    let obj = rt.new_instance(&derived).unwrap();
    let dims = rt.get_attr_string(obj.id(), "dims").unwrap();
    assert_eq!(rt.int_value(dims.id()), Some(3));
    let kind = rt.get_attr_string(obj.id(), "kind").unwrap();
    assert_eq!(rt.str_value(kind.id()), Some("point"));

    assert!(derived.is_ready());
    assert!(base.is_ready());
    assert!(derived.ready_state().unwrap().lookup("norm").is_some());
}

/// Defining one name twice fails readying, and the failure is not memoized.
#[test]
fn duplicate_member_fails_readying_every_time() {
    let mut rt = Runtime::new();
    let ty = TypeSpec::new("Dup")
        .base(&rt.types().object)
        .method("a", noop)
        .constant("a", ConstValue::Int(1))
        .build();
    let obj = rt.object_new(&ty, HeapData::Empty).unwrap();

    for _ in 0..2 {
        let err = rt.get_attr_string(obj.id(), "a").unwrap_err();
        assert_eq!(err.exc_type(), ExcType::SystemError);
        assert_eq!(message(&err), "type 'Dup' defines attribute 'a' more than once");
    }
    assert!(!ty.is_ready());
    assert!(!rt.has_attr_string(obj.id(), "a").unwrap());
    assert!(rt.type_ready(&ty).is_err());
}

/// A subtype of a variable-size type may not change the item size.
#[test]
fn changing_item_size_of_var_sized_base_fails() {
    let mut rt = Runtime::new();
    let tuple = Rc::clone(&rt.types().tuple);
    let ty = TypeSpec::new("WideTuple").base(&tuple).item_size(4).build();
    let obj = rt.object_new_var(&ty, 0, HeapData::Tuple(Rc::from([]))).unwrap();

    let err = rt.get_attr_string(obj.id(), "x").unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert_eq!(
        message(&err),
        "type 'WideTuple' changes the item size of var-sized base 'tuple'"
    );

    let same = TypeSpec::new("SameTuple")
        .base(&tuple)
        .item_size(tuple.item_size())
        .build();
    assert!(rt.type_ready(&same).is_ok());
}
