//! Attribute protocol: `getattr`, `setattr`, `hasattr` and their string-keyed variants.
//!
//! Dispatch order for every operation is the object-keyed slot, then the legacy
//! string-keyed slot, then the operation's fallback error.

use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapId, Value},
    runtime::{AttrAccess, Runtime},
};

impl Runtime {
    /// `getattr(obj, name)` (`PyObject_GetAttr`).
    ///
    /// `name` must be a `str` object, whatever the type of `obj`.
    pub fn get_attr(&mut self, obj: HeapId, name: HeapId) -> RunResult<Value> {
        self.check_attr_name(name)?;
        self.trace_attr(obj, name, AttrAccess::Get);
        let ty = self.type_of(obj);
        if let Some(getattro) = ty.slots().getattro {
            return getattro(self, obj, name);
        }
        let attr = self.str_value(name).unwrap_or_default().to_owned();
        if let Some(getattr) = ty.slots().getattr {
            return getattr(self, obj, &attr);
        }
        Err(ExcType::attribute_error(ty.name(), &attr))
    }

    /// `setattr(obj, name, value)`, or `delattr(obj, name)` when `value` is `None`
    /// (`PyObject_SetAttr`).
    pub fn set_attr(&mut self, obj: HeapId, name: HeapId, value: Option<HeapId>) -> RunResult<()> {
        self.check_attr_name(name)?;
        self.trace_attr(obj, name, AttrAccess::for_value(value));
        let ty = self.type_of(obj);
        let slots = *ty.slots();
        if let Some(setattro) = slots.setattro {
            return setattro(self, obj, name, value);
        }
        let attr = self.str_value(name).unwrap_or_default().to_owned();
        if let Some(setattr) = slots.setattr {
            return setattr(self, obj, &attr, value);
        }
        let has_getter = slots.getattro.is_some() || slots.getattr.is_some();
        Err(ExcType::type_error_no_setattr(ty.name(), has_getter, value.is_none(), &attr))
    }

    /// `delattr(obj, name)`.
    pub fn del_attr(&mut self, obj: HeapId, name: HeapId) -> RunResult<()> {
        self.set_attr(obj, name, None)
    }

    /// Looks up an attribute that may legitimately be missing (`_PyObject_LookupAttr`).
    ///
    /// Returns `Ok(None)` when the attribute does not exist, which includes types without
    /// any getter slot. Only `AttributeError` (and its subclasses) is treated as
    /// "missing"; every other error propagates unchanged.
    pub fn try_get_attr(&mut self, obj: HeapId, name: HeapId) -> RunResult<Option<Value>> {
        self.check_attr_name(name)?;
        let slots = *self.type_of(obj).slots();
        if slots.getattro.is_none() && slots.getattr.is_none() {
            return Ok(None);
        }
        match self.get_attr(obj, name) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.matches(ExcType::AttributeError) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `hasattr(obj, name)` (`PyObject_HasAttr`).
    ///
    /// Any catchable error during the lookup reads as "absent"; only uncatchable
    /// resource errors propagate.
    pub fn has_attr(&mut self, obj: HeapId, name: HeapId) -> RunResult<bool> {
        let result = self.get_attr(obj, name);
        self.found(result)
    }

    /// `PyObject_GetAttrString`: the legacy string slot when the type has one, otherwise
    /// the name is boxed into a temporary `str`.
    pub fn get_attr_string(&mut self, obj: HeapId, name: &str) -> RunResult<Value> {
        if let Some(getattr) = self.type_of(obj).slots().getattr {
            self.trace_attr_str(obj, name, AttrAccess::Get);
            return getattr(self, obj, name);
        }
        let name = self.new_str(name)?;
        let result = self.get_attr(obj, name.id());
        self.release(name);
        result
    }

    /// `PyObject_SetAttrString`; a `None` value deletes.
    pub fn set_attr_string(&mut self, obj: HeapId, name: &str, value: Option<HeapId>) -> RunResult<()> {
        if let Some(setattr) = self.type_of(obj).slots().setattr {
            self.trace_attr_str(obj, name, AttrAccess::for_value(value));
            return setattr(self, obj, name, value);
        }
        let name = self.new_str(name)?;
        let result = self.set_attr(obj, name.id(), value);
        self.release(name);
        result
    }

    /// `PyObject_HasAttrString`, with the error policy of [`Runtime::has_attr`].
    pub fn has_attr_string(&mut self, obj: HeapId, name: &str) -> RunResult<bool> {
        let result = self.get_attr_string(obj, name);
        self.found(result)
    }

    /// `PyObject_GenericGetAttr`: readies the type, then resolves through the
    /// runtime's [`AttributeResolver`](crate::AttributeResolver).
    ///
    /// Usable directly as a `getattro` slot.
    pub fn generic_get_attr(&mut self, obj: HeapId, name: HeapId) -> RunResult<Value> {
        let ty = self.type_of(obj);
        self.type_ready(&ty)?;
        self.resolver().get_attr(self, obj, &ty, name)
    }

    /// `PyObject_GenericSetAttr`; usable directly as a `setattro` slot.
    pub fn generic_set_attr(&mut self, obj: HeapId, name: HeapId, value: Option<HeapId>) -> RunResult<()> {
        let ty = self.type_of(obj);
        self.type_ready(&ty)?;
        self.resolver().set_attr(self, obj, &ty, name, value)
    }

    fn check_attr_name(&self, name: HeapId) -> RunResult<()> {
        if self.str_value(name).is_some() {
            Ok(())
        } else {
            Err(ExcType::type_error_attr_name(self.type_name(name)))
        }
    }

    fn found(&mut self, result: RunResult<Value>) -> RunResult<bool> {
        match result {
            Ok(value) => {
                self.release(value);
                Ok(true)
            }
            Err(err) if err.is_catchable() => Ok(false),
            Err(err) => Err(err),
        }
    }
}
