//! Call-argument shapes.
//!
//! - [`CallArgs`]: what a native function receives, a flat slice of positional values
//!   followed by keyword values plus the matching tuple of keyword names
//! - [`ArgBuilder`]: typed replacement for `Py_BuildValue` format strings
//! - [`CallFrame`]: the transient buffer produced by flattening a kwargs dict

use smallvec::SmallVec;

use crate::{
    exception::{ExcType, RunResult},
    heap::{DropWithRuntime, HeapId, Value},
    runtime::Runtime,
    types::Dict,
};

/// Arguments of one vectorcall-style invocation.
///
/// `args` holds `nargs` positional arguments followed by one value per name in
/// `kwnames`. All handles are borrowed for the duration of the call.
#[derive(Debug, Clone, Copy)]
pub struct CallArgs<'a> {
    args: &'a [HeapId],
    nargs: usize,
    kwnames: Option<HeapId>,
}

impl<'a> CallArgs<'a> {
    #[must_use]
    pub fn new(args: &'a [HeapId], nargs: usize, kwnames: Option<HeapId>) -> Self {
        debug_assert!(nargs <= args.len(), "nargs exceeds the argument buffer");
        Self { args, nargs, kwnames }
    }

    #[must_use]
    pub fn positional(&self) -> &'a [HeapId] {
        &self.args[..self.nargs]
    }

    /// Keyword values, in the same order as the names in [`CallArgs::kwnames`].
    #[must_use]
    pub fn kw_values(&self) -> &'a [HeapId] {
        &self.args[self.nargs..]
    }

    #[must_use]
    pub fn nargs(&self) -> usize {
        self.nargs
    }

    /// The tuple of keyword-name `str` objects, if any keywords were passed.
    #[must_use]
    pub fn kwnames(&self) -> Option<HeapId> {
        self.kwnames
    }

    /// Pairs each keyword name with its value.
    #[must_use]
    pub fn keywords<'r>(&self, rt: &'r Runtime) -> Vec<(&'r str, HeapId)> {
        let names = self.kwnames.and_then(|k| rt.tuple_items(k)).unwrap_or_default();
        names
            .iter()
            .zip(self.kw_values())
            .map(|(&name, &value)| (rt.str_value(name).unwrap_or_default(), value))
            .collect()
    }

    pub fn check_no_kwargs(&self, func_name: &str) -> RunResult<()> {
        if self.kw_values().is_empty() {
            Ok(())
        } else {
            Err(ExcType::type_error_no_keywords(func_name))
        }
    }

    /// Checks that nothing at all was passed.
    pub fn check_zero_args(&self, func_name: &str) -> RunResult<()> {
        self.check_no_kwargs(func_name)?;
        match self.nargs {
            0 => Ok(()),
            n => Err(ExcType::type_error_arg_count(func_name, 0, n)),
        }
    }

    /// Checks that exactly one positional argument was passed, returning it.
    pub fn get_one_arg(&self, func_name: &str) -> RunResult<HeapId> {
        self.check_no_kwargs(func_name)?;
        match self.positional() {
            [arg] => Ok(*arg),
            other => Err(ExcType::type_error_arg_count(func_name, 1, other.len())),
        }
    }

    /// Checks that exactly two positional arguments were passed, returning them.
    pub fn get_two_args(&self, func_name: &str) -> RunResult<(HeapId, HeapId)> {
        self.check_no_kwargs(func_name)?;
        match self.positional() {
            [a, b] => Ok((*a, *b)),
            other => Err(ExcType::type_error_arg_count(func_name, 2, other.len())),
        }
    }
}

/// One typed argument for [`ArgBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildValue {
    /// An existing object; the built value takes a new reference (`"O"`).
    Object(HeapId),
    Int(i64),
    Str(String),
    Bool(bool),
    None,
}

/// Typed builder for the arguments of a "format-built" call.
///
/// Building yields nothing for an empty builder, the value itself for a single item and
/// a tuple otherwise, like `Py_BuildValue` does for `""`, `"O"` and `"OO"`.
///
/// ```
/// use objproto::{ArgBuilder, Runtime};
///
/// let mut rt = Runtime::new();
/// let args = ArgBuilder::new().int(1).str("two");
/// assert!(!args.is_single());
/// let built = args.build(&mut rt).unwrap().unwrap();
/// assert_eq!(rt.repr_string(built.id()).unwrap(), "(1, 'two')");
/// rt.release(built);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ArgBuilder {
    items: SmallVec<[BuildValue; 4]>,
}

impl ArgBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, value: BuildValue) -> Self {
        self.items.push(value);
        self
    }

    #[must_use]
    pub fn obj(self, id: HeapId) -> Self {
        self.push(BuildValue::Object(id))
    }

    #[must_use]
    pub fn int(self, value: i64) -> Self {
        self.push(BuildValue::Int(value))
    }

    #[must_use]
    pub fn str(self, value: &str) -> Self {
        self.push(BuildValue::Str(value.to_owned()))
    }

    #[must_use]
    pub fn bool(self, value: bool) -> Self {
        self.push(BuildValue::Bool(value))
    }

    #[must_use]
    pub fn none(self) -> Self {
        self.push(BuildValue::None)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the builder describes exactly one value, the equivalent of a
    /// one-character format string.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.items.len() == 1
    }

    /// Materializes the arguments.
    ///
    /// Returns `None` when empty. On failure every value built so far is released.
    pub fn build(self, rt: &mut Runtime) -> RunResult<Option<Value>> {
        let mut built: Vec<Value> = Vec::with_capacity(self.items.len());
        for item in self.items {
            let value = match item {
                BuildValue::Object(id) => Ok(rt.retain(id)),
                BuildValue::Int(v) => rt.new_int(v),
                BuildValue::Str(s) => rt.new_str(&s),
                BuildValue::Bool(b) => Ok(rt.new_bool(b)),
                BuildValue::None => Ok(rt.none()),
            };
            match value {
                Ok(value) => built.push(value),
                Err(err) => {
                    built.drop_with_runtime(rt);
                    return Err(err);
                }
            }
        }
        match built.len() {
            0 => Ok(None),
            1 => Ok(built.pop()),
            _ => rt.new_tuple(built).map(Some),
        }
    }
}

/// Flattened arguments ready for a vectorcall.
///
/// Every handle, the kwnames tuple and the tracked buffer are owned and released by
/// [`DropWithRuntime::drop_with_runtime`], which callers run on every exit path.
#[derive(Debug)]
pub(crate) struct CallFrame {
    args: SmallVec<[HeapId; 8]>,
    nargs: usize,
    kwnames: HeapId,
    /// Bytes charged to the tracker for the flattened buffer.
    charged: usize,
}

impl CallFrame {
    pub fn args(&self) -> &[HeapId] {
        &self.args
    }

    pub fn nargs(&self) -> usize {
        self.nargs
    }

    pub fn kwnames(&self) -> HeapId {
        self.kwnames
    }
}

impl DropWithRuntime for CallFrame {
    fn drop_with_runtime(self, rt: &mut Runtime) {
        for id in self.args {
            rt.release(Value::from_raw(id));
        }
        rt.release(Value::from_raw(self.kwnames));
        rt.refund_buffer(self.charged);
    }
}

/// Flattens `positional` plus the `kwargs` dict into one vectorcall argument buffer
/// (`_PyStack_UnpackDict`).
///
/// An absent or empty dict returns `None`: nothing is copied, charged or retained, and
/// the caller passes `positional` through unchanged. Otherwise the buffer holds new
/// references to the positional arguments followed by the dict's values in iteration
/// order, and the kwnames tuple holds the dict's key objects in the same order.
///
/// A `kwargs` that is not a dict is a `SystemError`, so keywords are never dropped.
///
/// The dict is read under a shared borrow of the heap for the whole walk, so it cannot
/// change while it is being flattened; callers must not hand out a mutable path to it
/// from inside this operation.
pub(crate) fn unpack_dict(
    rt: &mut Runtime,
    positional: &[HeapId],
    kwargs: Option<HeapId>,
) -> RunResult<Option<CallFrame>> {
    let nkwargs = match kwargs {
        Some(k) => rt.dict(k).map(Dict::len).ok_or_else(ExcType::system_error_bad_call)?,
        None => 0,
    };
    let Some(kwargs) = kwargs.filter(|_| nkwargs > 0) else {
        return Ok(None);
    };

    let nargs = positional.len();
    let total = nargs
        .checked_add(nkwargs)
        .and_then(|n| n.checked_mul(size_of::<HeapId>()))
        .ok_or_else(ExcType::system_error_bad_call)?;
    rt.charge_buffer(total)?;

    let mut args = SmallVec::<[HeapId; 8]>::with_capacity(nargs + nkwargs);
    let mut names = Vec::with_capacity(nkwargs);
    for &id in positional {
        args.push(rt.retain(id).into_raw());
    }
    if let Some(dict) = rt.dict(kwargs) {
        for (_, key, value) in dict.iter() {
            args.push(rt.retain(value).into_raw());
            names.push(rt.retain(key));
        }
    }

    let kwnames = match rt.new_tuple(names) {
        Ok(kwnames) => kwnames.into_raw(),
        Err(err) => {
            for id in args {
                rt.release(Value::from_raw(id));
            }
            rt.refund_buffer(total);
            return Err(err);
        }
    };
    rt.tracer_mut().on_kwargs_unpacked(nargs, nkwargs);
    Ok(Some(CallFrame {
        args,
        nargs,
        kwnames,
        charged: total,
    }))
}

/// Packs vectorcall arguments back into an args tuple and a kwargs dict
/// (`_PyStack_AsDict`), for callables that only implement the `call` slot.
pub(crate) fn pack_stack(rt: &mut Runtime, call: CallArgs<'_>) -> RunResult<(Value, Option<Value>)> {
    let args = rt.new_tuple_from_ids(call.positional())?;
    let Some(kwnames) = call.kwnames().filter(|_| !call.kw_values().is_empty()) else {
        return Ok((args, None));
    };
    let names: SmallVec<[HeapId; 8]> = rt.tuple_items(kwnames).map(SmallVec::from_slice).unwrap_or_default();
    let dict = match rt.new_dict() {
        Ok(dict) => dict,
        Err(err) => {
            rt.release(args);
            return Err(err);
        }
    };
    for (&name, &value) in names.iter().zip(call.kw_values()) {
        if let Err(err) = rt.dict_set_item_obj(dict.id(), name, value) {
            rt.release(dict);
            rt.release(args);
            return Err(err);
        }
    }
    Ok((args, Some(dict)))
}
