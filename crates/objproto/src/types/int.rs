//! Minimal `int` and `bool`.

use std::rc::Rc;

use super::{TypeObject, TypeSlots, TypeSpec};
use crate::{
    exception::RunResult,
    heap::{HeapData, HeapId, Value},
    protocol::CompareOp,
    py_hash,
    runtime::Runtime,
};

pub(crate) fn int_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("int")
        .base(object)
        .basic_size(super::OBJECT_HEADER_SIZE + 8)
        .slots(TypeSlots {
            repr: Some(int_repr),
            bool: Some(int_bool),
            hash: Some(int_hash),
            richcompare: Some(int_richcompare),
            ..TypeSlots::default()
        })
        .build()
}

/// `bool` subclasses `int`; its two instances are runtime singletons.
pub(crate) fn bool_type(int: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("bool")
        .base(int)
        .basic_size(super::OBJECT_HEADER_SIZE + 8)
        .slots(TypeSlots {
            repr: Some(bool_repr),
            dealloc: Some(bool_dealloc),
            ..TypeSlots::default()
        })
        .build()
}

fn int_repr(rt: &mut Runtime, obj: HeapId) -> RunResult<String> {
    Ok(int_of(rt, obj).to_string())
}

fn bool_repr(rt: &mut Runtime, obj: HeapId) -> RunResult<String> {
    Ok(if int_of(rt, obj) == 0 { "False" } else { "True" }.to_owned())
}

fn int_bool(rt: &mut Runtime, obj: HeapId) -> RunResult<bool> {
    Ok(int_of(rt, obj) != 0)
}

fn int_hash(rt: &mut Runtime, obj: HeapId) -> RunResult<i64> {
    Ok(py_hash::hash_int(int_of(rt, obj)))
}

fn int_richcompare(rt: &mut Runtime, left: HeapId, right: HeapId, op: CompareOp) -> RunResult<Value> {
    let (Some(a), Some(b)) = (rt.int_value(left), rt.int_value(right)) else {
        return Ok(rt.not_implemented());
    };
    Ok(rt.new_bool(op.matches(a.cmp(&b))))
}

fn bool_dealloc(rt: &mut Runtime, _obj: HeapId) {
    rt.fatal("deallocating True or False");
}

fn int_of(rt: &Runtime, obj: HeapId) -> i64 {
    rt.int_value(obj).unwrap_or_default()
}

impl Runtime {
    /// Creates a new `int` object.
    pub fn new_int(&mut self, value: i64) -> RunResult<Value> {
        let ty = Rc::clone(&self.types().int);
        self.object_new(&ty, HeapData::Int(value))
    }

    /// Value of an `int` (or `bool`) object, `None` for anything else.
    #[must_use]
    pub fn int_value(&self, id: HeapId) -> Option<i64> {
        match self.heap.get(id) {
            HeapData::Int(v) => Some(*v),
            _ => None,
        }
    }
}
