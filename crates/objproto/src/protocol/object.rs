//! Conversions, sizing, iteration and construction.

use std::{fmt::Write, rc::Rc};

use crate::{
    exception::{ExcType, RunResult, SimpleException},
    heap::{HeapId, Value},
    runtime::Runtime,
    types::TypeObject,
};

impl Runtime {
    /// `PyObject_Repr` as a `str` object. An absent object renders as `<NULL>`.
    pub fn repr(&mut self, obj: Option<HeapId>) -> RunResult<Value> {
        let text = match obj {
            Some(obj) => self.repr_string(obj)?,
            None => "<NULL>".to_owned(),
        };
        self.new_str(&text)
    }

    /// `repr(obj)` as Rust text: the `repr` slot, else `<X object at 0x..>`.
    pub fn repr_string(&mut self, obj: HeapId) -> RunResult<String> {
        let Some(repr) = self.type_of(obj).slots().repr else {
            return Ok(self.default_repr(obj));
        };
        self.enter_recursive(" while getting the repr of an object")?;
        let result = repr(self, obj);
        self.leave_recursive();
        result
    }

    /// `PyObject_Str` as a `str` object. An absent object renders as `<NULL>`.
    pub fn str(&mut self, obj: Option<HeapId>) -> RunResult<Value> {
        let Some(obj) = obj else {
            return self.new_str("<NULL>");
        };
        if self.str_value(obj).is_some() {
            return Ok(self.retain(obj));
        }
        let text = self.str_string(obj)?;
        self.new_str(&text)
    }

    /// `str(obj)` as Rust text: the `str` slot, else `repr`.
    pub fn str_string(&mut self, obj: HeapId) -> RunResult<String> {
        let Some(str_slot) = self.type_of(obj).slots().str else {
            return self.repr_string(obj);
        };
        self.enter_recursive(" while getting the str of an object")?;
        let result = str_slot(self, obj);
        self.leave_recursive();
        result
    }

    /// `PyObject_ASCII`: `repr` with every non-ASCII character backslash-escaped.
    pub fn ascii(&mut self, obj: Option<HeapId>) -> RunResult<Value> {
        let text = match obj {
            Some(obj) => self.repr_string(obj)?,
            None => "<NULL>".to_owned(),
        };
        self.new_str(&escape_non_ascii(&text))
    }

    /// `len(obj)` (`PyObject_Size`).
    pub fn size(&mut self, obj: HeapId) -> RunResult<usize> {
        match self.type_of(obj).slots().len {
            Some(len) => len(self, obj),
            None => Err(ExcType::type_error_no_len(self.type_name(obj))),
        }
    }

    /// `iter(obj)` (`PyObject_GetIter`).
    ///
    /// The `iter` slot must return an iterator, meaning an object whose type has an
    /// `iternext` slot.
    pub fn get_iter(&mut self, obj: HeapId) -> RunResult<Value> {
        let Some(iter) = self.type_of(obj).slots().iter else {
            return Err(ExcType::type_error_not_iterable(self.type_name(obj)));
        };
        let it = iter(self, obj)?;
        if self.type_of(it.id()).slots().iternext.is_none() {
            let msg = format!("iter() returned non-iterator of type '{}'", self.type_name(it.id()));
            self.release(it);
            return Err(SimpleException::new_msg(ExcType::TypeError, msg).into());
        }
        Ok(it)
    }

    /// `next(iter)` (`PyIter_Next`); `Ok(None)` when the iterator is exhausted.
    pub fn iter_next(&mut self, iter: HeapId) -> RunResult<Option<Value>> {
        match self.type_of(iter).slots().iternext {
            Some(next) => next(self, iter),
            None => Err(SimpleException::new_msg(
                ExcType::TypeError,
                format!("'{}' object is not an iterator", self.type_name(iter)),
            )
            .into()),
        }
    }

    /// `PyObject_SelfIter`: the `iter` slot of iterators, returning the iterator itself.
    pub fn self_iter(&mut self, obj: HeapId) -> RunResult<Value> {
        Ok(self.retain(obj))
    }

    /// `_PyObject_NextNotImplemented`: an `iternext` slot for types that must not be
    /// iterated.
    pub fn next_not_implemented(&mut self, obj: HeapId) -> RunResult<Option<Value>> {
        Err(ExcType::type_error_not_iterable(self.type_name(obj)))
    }

    /// `callable(obj)` (`PyCallable_Check`).
    #[must_use]
    pub fn callable_check(&self, obj: HeapId) -> bool {
        let ty = self.type_of(obj);
        ty.slots().call.is_some() || (ty.slots().vectorcall_offset > 0 && self.object_vectorcall(obj).is_some())
    }

    /// `isinstance(obj, ty)` over the base chain.
    #[must_use]
    pub fn is_instance(&self, obj: HeapId, ty: &TypeObject) -> bool {
        self.type_of(obj).is_subtype(ty)
    }

    /// `issubclass(derived, cls)` (`PyObject_IsSubclass`) over the base chain.
    #[must_use]
    pub fn is_subclass(&self, derived: &TypeObject, cls: &TypeObject) -> bool {
        derived.is_subtype(cls)
    }

    /// `ty(*args, **kwargs)` for native types: readies `ty` and calls its `new` slot.
    pub fn construct(&mut self, ty: &Rc<TypeObject>, args: HeapId, kwargs: Option<HeapId>) -> RunResult<Value> {
        if self.tuple_items(args).is_none() || kwargs.is_some_and(|k| self.dict(k).is_none()) {
            return Err(ExcType::system_error_bad_call());
        }
        self.type_ready(ty)?;
        match ty.slots().new {
            Some(new) => new(self, ty, args, kwargs),
            None => Err(ExcType::type_error_cannot_create(ty.name())),
        }
    }

    fn default_repr(&self, obj: HeapId) -> String {
        format!("<{} object at {:#x}>", self.type_name(obj), obj.index())
    }
}

/// Escapes like `ascii()`: `\xNN`, `\uNNNN` or `\UNNNNNNNN` for anything above 0x7f.
fn escape_non_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let code = u32::from(c);
        let _ = match code {
            0..=0x7f => {
                out.push(c);
                Ok(())
            }
            0x80..=0xff => write!(out, "\\x{code:02x}"),
            0x100..=0xffff => write!(out, "\\u{code:04x}"),
            _ => write!(out, "\\U{code:08x}"),
        };
    }
    out
}
