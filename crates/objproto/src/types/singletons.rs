//! `NoneType` and `NotImplementedType`.
//!
//! Exactly one instance of each exists per runtime. Construction returns that instance
//! and a finalizer that runs means someone released it once too often, which aborts.

use std::rc::Rc;

use super::{TypeObject, TypeSlots, TypeSpec};
use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapId, Value},
    runtime::Runtime,
};

pub(crate) fn none_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("NoneType")
        .base(object)
        .slots(TypeSlots {
            repr: Some(none_repr),
            bool: Some(none_bool),
            new: Some(none_new),
            dealloc: Some(none_dealloc),
            ..TypeSlots::default()
        })
        .build()
}

pub(crate) fn not_implemented_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("NotImplementedType")
        .base(object)
        .slots(TypeSlots {
            repr: Some(not_implemented_repr),
            bool: Some(not_implemented_bool),
            new: Some(not_implemented_new),
            dealloc: Some(not_implemented_dealloc),
            ..TypeSlots::default()
        })
        .build()
}

fn none_repr(_rt: &mut Runtime, _obj: HeapId) -> RunResult<String> {
    Ok("None".to_owned())
}

fn none_bool(_rt: &mut Runtime, _obj: HeapId) -> RunResult<bool> {
    Ok(false)
}

fn none_new(rt: &mut Runtime, ty: &Rc<TypeObject>, args: HeapId, kwargs: Option<HeapId>) -> RunResult<Value> {
    reject_arguments(rt, ty, args, kwargs)?;
    Ok(rt.none())
}

fn none_dealloc(rt: &mut Runtime, _obj: HeapId) {
    rt.fatal("deallocating None");
}

fn not_implemented_repr(_rt: &mut Runtime, _obj: HeapId) -> RunResult<String> {
    Ok("NotImplemented".to_owned())
}

/// Always true, with a `DeprecationWarning`: using `NotImplemented` as a truth value is
/// almost always a missing `is NotImplemented` check in a comparison method.
fn not_implemented_bool(rt: &mut Runtime, _obj: HeapId) -> RunResult<bool> {
    rt.warn(
        ExcType::DeprecationWarning,
        "NotImplemented should not be used in a boolean context",
    );
    Ok(true)
}

fn not_implemented_new(
    rt: &mut Runtime,
    ty: &Rc<TypeObject>,
    args: HeapId,
    kwargs: Option<HeapId>,
) -> RunResult<Value> {
    reject_arguments(rt, ty, args, kwargs)?;
    Ok(rt.not_implemented())
}

fn not_implemented_dealloc(rt: &mut Runtime, _obj: HeapId) {
    rt.fatal("deallocating NotImplemented");
}

fn reject_arguments(rt: &Runtime, ty: &TypeObject, args: HeapId, kwargs: Option<HeapId>) -> RunResult<()> {
    let nargs = rt.tuple_items(args).map_or(0, <[HeapId]>::len);
    let nkwargs = kwargs.and_then(|k| rt.dict(k)).map_or(0, super::Dict::len);
    if nargs + nkwargs > 0 {
        Err(ExcType::type_error_takes_no_arguments(ty.name()))
    } else {
        Ok(())
    }
}
