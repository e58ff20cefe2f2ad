//! Plain instances of user-defined types.

use std::rc::Rc;

use super::TypeObject;
use crate::{
    exception::RunResult,
    heap::{HeapData, HeapId, Value},
    runtime::Runtime,
};

/// Payload of an instance: just its `__dict__`, when the type has one.
#[derive(Debug)]
pub struct Instance {
    dict: Option<HeapId>,
}

impl Instance {
    /// Takes ownership of the `dict` reference.
    pub(crate) fn new(dict: Option<Value>) -> Self {
        Self {
            dict: dict.map(Value::into_raw),
        }
    }

    #[must_use]
    pub fn dict(&self) -> Option<HeapId> {
        self.dict
    }
}

impl Runtime {
    /// Allocates a bare instance of `ty`, with an empty `__dict__` when the type declares
    /// one.
    pub fn new_instance(&mut self, ty: &Rc<TypeObject>) -> RunResult<Value> {
        let dict = if ty.has_dict() { Some(self.new_dict()?) } else { None };
        self.object_new(ty, HeapData::Instance(Instance::new(dict)))
    }

    /// The `__dict__` of an instance, if it has one.
    #[must_use]
    pub fn instance_dict(&self, id: HeapId) -> Option<HeapId> {
        match self.heap.get(id) {
            HeapData::Instance(inst) => inst.dict(),
            _ => None,
        }
    }
}
