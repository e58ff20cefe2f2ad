//! The root `object` type.

use std::rc::Rc;

use super::{TypeObject, TypeSlots, TypeSpec};
use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapId, Value},
    protocol::CompareOp,
    py_hash,
    runtime::Runtime,
};

pub(crate) fn object_type() -> Rc<TypeObject> {
    TypeSpec::new("object")
        .slots(TypeSlots {
            getattro: Some(Runtime::generic_get_attr),
            setattro: Some(Runtime::generic_set_attr),
            richcompare: Some(object_richcompare),
            hash: Some(object_hash),
            new: Some(object_new),
            ..TypeSlots::default()
        })
        .build()
}

/// `object.__eq__` is identity; `__ne__` inverts `__eq__`; orderings are unsupported.
fn object_richcompare(rt: &mut Runtime, left: HeapId, right: HeapId, op: CompareOp) -> RunResult<Value> {
    match op {
        CompareOp::Eq if left == right => Ok(rt.new_bool(true)),
        CompareOp::Ne => {
            let Some(eq) = rt.type_of(left).slots().richcompare else {
                return Ok(rt.not_implemented());
            };
            let result = eq(rt, left, right, CompareOp::Eq)?;
            if result.id() == rt.not_implemented_id() {
                return Ok(result);
            }
            let truth = rt.is_true(result.id());
            rt.release(result);
            Ok(rt.new_bool(!truth?))
        }
        _ => Ok(rt.not_implemented()),
    }
}

/// `object.__hash__` is identity, paired with the identity `__eq__` above.
fn object_hash(_rt: &mut Runtime, obj: HeapId) -> RunResult<i64> {
    Ok(py_hash::hash_identity(obj.index()))
}

/// `object.__new__`: a bare instance, rejecting any arguments.
fn object_new(rt: &mut Runtime, ty: &Rc<TypeObject>, args: HeapId, kwargs: Option<HeapId>) -> RunResult<Value> {
    let nargs = rt.tuple_items(args).map_or(0, <[HeapId]>::len);
    let nkwargs = kwargs.and_then(|k| rt.dict(k)).map_or(0, super::Dict::len);
    if nargs + nkwargs > 0 {
        return Err(ExcType::type_error_takes_no_arguments(&format!("{}()", ty.name())));
    }
    rt.new_instance(ty)
}
