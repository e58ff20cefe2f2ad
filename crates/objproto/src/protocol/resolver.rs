//! Descriptor and instance-dict resolution behind the generic attribute slots.

use std::{fmt, rc::Rc};

use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapId, Value},
    runtime::Runtime,
    types::{ConstValue, Member, TypeObject},
};

/// Resolves attributes for types using the generic `getattro`/`setattro` slots.
///
/// The runtime readies the type before calling either method, so
/// [`TypeObject::ready_state`] is always available. Implementations may call back into
/// any protocol operation.
pub trait AttributeResolver: fmt::Debug {
    fn get_attr(&self, rt: &mut Runtime, obj: HeapId, ty: &Rc<TypeObject>, name: HeapId) -> RunResult<Value>;

    /// Assigns, or deletes when `value` is `None`.
    fn set_attr(
        &self,
        rt: &mut Runtime,
        obj: HeapId,
        ty: &Rc<TypeObject>,
        name: HeapId,
        value: Option<HeapId>,
    ) -> RunResult<()>;
}

/// CPython's `PyObject_GenericGetAttr` order over the readied member table.
///
/// Lookup: data descriptors (getsets), then the instance `__dict__`, then methods
/// (bound to the instance) and class constants. Assignment: data descriptors, then the
/// instance `__dict__`; methods and constants are read-only without a `__dict__`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MroResolver;

impl AttributeResolver for MroResolver {
    fn get_attr(&self, rt: &mut Runtime, obj: HeapId, ty: &Rc<TypeObject>, name: HeapId) -> RunResult<Value> {
        let attr = attr_name(rt, name)?;
        let member = lookup(ty, &attr)?;

        if let Some(Member::GetSet(getset)) = &member {
            return match getset.get {
                Some(get) => get(rt, obj),
                None => Err(ExcType::attribute_error_descriptor(&attr, ty.name(), "readable")),
            };
        }

        let stored = rt
            .instance_dict(obj)
            .and_then(|dict| rt.dict(dict))
            .and_then(|dict| dict.get(&attr));
        if let Some(value) = stored {
            return Ok(rt.retain(value));
        }

        match member {
            Some(Member::Method(def)) => rt.new_bound_method(obj, def),
            Some(Member::Const(value)) => materialize(rt, &value),
            Some(Member::GetSet(_)) | None => Err(ExcType::attribute_error(ty.name(), &attr)),
        }
    }

    fn set_attr(
        &self,
        rt: &mut Runtime,
        obj: HeapId,
        ty: &Rc<TypeObject>,
        name: HeapId,
        value: Option<HeapId>,
    ) -> RunResult<()> {
        let attr = attr_name(rt, name)?;
        let member = lookup(ty, &attr)?;

        if let Some(Member::GetSet(getset)) = &member {
            return match getset.set {
                Some(set) => set(rt, obj, value),
                None => Err(ExcType::attribute_error_descriptor(&attr, ty.name(), "writable")),
            };
        }

        if let Some(dict) = rt.instance_dict(obj) {
            return match value {
                Some(value) => rt.dict_set_item_obj(dict, name, value),
                None if rt.dict_del_item(dict, &attr)? => Ok(()),
                None => Err(ExcType::attribute_error(ty.name(), &attr)),
            };
        }

        match member {
            Some(_) => Err(ExcType::attribute_error_read_only(ty.name(), &attr)),
            None => Err(ExcType::attribute_error_no_dict_for_setting(ty.name(), &attr)),
        }
    }
}

fn attr_name(rt: &Runtime, name: HeapId) -> RunResult<String> {
    match rt.str_value(name) {
        Some(s) => Ok(s.to_owned()),
        None => Err(ExcType::type_error_attr_name(rt.type_name(name))),
    }
}

fn lookup(ty: &TypeObject, attr: &str) -> RunResult<Option<Member>> {
    let state = ty.ready_state().ok_or_else(ExcType::system_error_bad_call)?;
    Ok(state.lookup(attr).cloned())
}

fn materialize(rt: &mut Runtime, value: &ConstValue) -> RunResult<Value> {
    match value {
        ConstValue::None => Ok(rt.none()),
        ConstValue::Bool(b) => Ok(rt.new_bool(*b)),
        ConstValue::Int(i) => rt.new_int(*i),
        ConstValue::Str(s) => rt.new_str(s),
    }
}
