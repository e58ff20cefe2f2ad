//! Native callables: `builtin_function_or_method` and bound `method`.
//!
//! Both types support vectorcall: each instance carries a vectorcall pointer, and the
//! `call` slot routes tuple-and-dict calls through [`Runtime::vectorcall_dict_call`].

use std::rc::Rc;

use super::{MethodDef, NativeFn, TypeObject, TypeSlots, TypeSpec};
use crate::{
    args::CallArgs,
    exception::RunResult,
    heap::{HeapData, HeapId, Value},
    runtime::Runtime,
};

/// A native function object.
#[derive(Debug, Clone)]
pub struct NativeFunction {
    name: String,
    func: NativeFn,
}

impl NativeFunction {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A method bound to its receiver; owns a reference to the receiver.
#[derive(Debug, Clone, Copy)]
pub struct BoundMethod {
    receiver: HeapId,
    def: MethodDef,
}

impl BoundMethod {
    #[must_use]
    pub fn receiver(&self) -> HeapId {
        self.receiver
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.def.name
    }
}

pub(crate) fn function_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("builtin_function_or_method")
        .base(object)
        .basic_size(super::OBJECT_HEADER_SIZE + 32)
        .slots(TypeSlots {
            call: Some(vectorcall_as_call),
            vectorcall_offset: 1,
            vectorcall: Some(function_vectorcall),
            repr: Some(function_repr),
            ..TypeSlots::default()
        })
        .build()
}

pub(crate) fn method_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("method")
        .base(object)
        .basic_size(super::OBJECT_HEADER_SIZE + 24)
        .slots(TypeSlots {
            call: Some(vectorcall_as_call),
            vectorcall_offset: 1,
            vectorcall: Some(method_vectorcall),
            repr: Some(method_repr),
            ..TypeSlots::default()
        })
        .build()
}

/// `call` slot shared by vectorcall-capable types.
fn vectorcall_as_call(rt: &mut Runtime, callable: HeapId, args: HeapId, kwargs: Option<HeapId>) -> Option<Value> {
    let result = rt.vectorcall_dict_call(callable, args, kwargs);
    rt.into_sentinel(result)
}

fn function_vectorcall(
    rt: &mut Runtime,
    callable: HeapId,
    args: &[HeapId],
    nargs: usize,
    kwnames: Option<HeapId>,
) -> Option<Value> {
    let HeapData::Function(function) = rt.heap.get(callable) else {
        rt.err_set(crate::ExcType::system_error_bad_call());
        return None;
    };
    let func = function.func;
    let result = func(rt, CallArgs::new(args, nargs, kwnames));
    rt.into_sentinel(result)
}

fn method_vectorcall(
    rt: &mut Runtime,
    callable: HeapId,
    args: &[HeapId],
    nargs: usize,
    kwnames: Option<HeapId>,
) -> Option<Value> {
    let HeapData::Method(method) = rt.heap.get(callable) else {
        rt.err_set(crate::ExcType::system_error_bad_call());
        return None;
    };
    let method = *method;
    let result = (method.def.func)(rt, method.receiver, CallArgs::new(args, nargs, kwnames));
    rt.into_sentinel(result)
}

fn function_repr(rt: &mut Runtime, obj: HeapId) -> RunResult<String> {
    match rt.heap.get(obj) {
        HeapData::Function(f) => Ok(format!("<built-in function {}>", f.name)),
        _ => Ok("<built-in function>".to_owned()),
    }
}

fn method_repr(rt: &mut Runtime, obj: HeapId) -> RunResult<String> {
    let HeapData::Method(method) = rt.heap.get(obj) else {
        return Ok("<built-in method>".to_owned());
    };
    let (name, receiver) = (method.def.name, method.receiver);
    Ok(format!(
        "<built-in method {name} of {} object at {:#x}>",
        rt.type_name(receiver),
        receiver.index()
    ))
}

impl Runtime {
    /// Creates a `builtin_function_or_method` wrapping `func`.
    pub fn new_function(&mut self, name: &str, func: NativeFn) -> RunResult<Value> {
        let ty = Rc::clone(&self.types().function);
        self.object_new(
            &ty,
            HeapData::Function(NativeFunction {
                name: name.to_owned(),
                func,
            }),
        )
    }

    /// Binds `def` to `receiver`, taking a new reference to the receiver.
    pub fn new_bound_method(&mut self, receiver: HeapId, def: MethodDef) -> RunResult<Value> {
        let ty = Rc::clone(&self.types().method);
        let receiver = self.retain(receiver).into_raw();
        self.object_new(&ty, HeapData::Method(BoundMethod { receiver, def }))
    }
}
