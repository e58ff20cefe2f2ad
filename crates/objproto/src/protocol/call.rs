//! Calling protocol.
//!
//! Every entry point normalizes its arguments to one of two shapes: the vectorcall shape
//! (flat argument slice plus optional kwnames tuple) when the callable carries a
//! vectorcall pointer, otherwise the `(args tuple, kwargs dict)` shape of the `call`
//! slot. Raw slot results always pass through [`Runtime::check_function_result`].

use smallvec::SmallVec;

use crate::{
    args::{ArgBuilder, CallArgs, CallFrame, pack_stack, unpack_dict},
    exception::{ExcType, RunResult, SimpleException},
    heap::{DropWithRuntime, HeapId, Value},
    runtime::Runtime,
    types::VectorcallFunc,
};

const CALL_CONTEXT: &str = " while calling a Python object";

impl Runtime {
    /// `callable(*args, **kwargs)` (`PyObject_Call`).
    ///
    /// `args` must be a tuple and `kwargs`, when given, a dict.
    pub fn call(&mut self, callable: HeapId, args: HeapId, kwargs: Option<HeapId>) -> RunResult<Value> {
        let Some(nargs) = self.tuple_items(args).map(<[HeapId]>::len) else {
            return Err(SimpleException::new_msg(ExcType::TypeError, "argument list must be a tuple").into());
        };
        let nkwargs = match kwargs {
            Some(kwargs) => match self.dict(kwargs) {
                Some(dict) => dict.len(),
                None => {
                    return Err(SimpleException::new_msg(ExcType::TypeError, "keyword list must be a dictionary").into());
                }
            },
            None => 0,
        };
        self.trace_call(callable, nargs, nkwargs);

        if self.vectorcall_func(callable).is_some() {
            return self.vectorcall_dict_call(callable, args, kwargs);
        }
        self.make_tp_call(callable, args, kwargs)
    }

    /// `callable()` (`PyObject_CallNoArgs`).
    pub fn call_no_args(&mut self, callable: HeapId) -> RunResult<Value> {
        self.vectorcall(callable, &[], None)
    }

    /// `PyObject_CallObject`: a missing argument tuple means no arguments.
    pub fn call_object(&mut self, callable: HeapId, args: Option<HeapId>) -> RunResult<Value> {
        match args {
            Some(args) => self.call(callable, args, None),
            None => self.call_no_args(callable),
        }
    }

    /// Calls with a value produced by an argument builder.
    ///
    /// `None` means no arguments. With `single_arg` the built value is always passed as
    /// the one positional argument, even when it is itself a tuple. Otherwise a tuple is
    /// used as the argument tuple and any other value is wrapped in a 1-tuple. Takes
    /// ownership of `built`.
    pub fn call_built(&mut self, callable: HeapId, built: Option<Value>, single_arg: bool) -> RunResult<Value> {
        let Some(built) = built else {
            return self.call_no_args(callable);
        };
        let args = if single_arg || self.tuple_items(built.id()).is_none() {
            self.new_tuple(vec![built])?
        } else {
            built
        };
        let result = self.call(callable, args.id(), None);
        self.release(args);
        result
    }

    /// `PyObject_CallFunction` with a typed builder instead of a format string.
    pub fn call_function(&mut self, callable: HeapId, args: ArgBuilder) -> RunResult<Value> {
        let single_arg = args.is_single();
        let built = args.build(self)?;
        self.call_built(callable, built, single_arg)
    }

    /// `PyObject_CallFunctionObjArgs`: positional arguments up to the first `None`.
    pub fn call_function_obj_args(
        &mut self,
        callable: HeapId,
        args: impl IntoIterator<Item = Option<HeapId>>,
    ) -> RunResult<Value> {
        let stack: SmallVec<[HeapId; 8]> = args.into_iter().map_while(std::convert::identity).collect();
        self.vectorcall(callable, &stack, None)
    }

    /// `PyObject_CallMethod`: looks up `obj.name` and calls it with the built arguments.
    pub fn call_method(&mut self, obj: HeapId, name: &str, args: ArgBuilder) -> RunResult<Value> {
        let method = self.get_attr_string(obj, name)?;
        if !self.callable_check(method.id()) {
            let err = ExcType::type_error_attr_not_callable(self.type_name(method.id()));
            self.release(method);
            return Err(err);
        }
        let single_arg = args.is_single();
        let result = match args.build(self) {
            Ok(built) => self.call_built(method.id(), built, single_arg),
            Err(err) => Err(err),
        };
        self.release(method);
        result
    }

    /// `PyObject_CallMethodObjArgs`: `obj.name(*args)` with arguments up to the first
    /// `None`.
    pub fn call_method_obj_args(
        &mut self,
        obj: HeapId,
        name: HeapId,
        args: impl IntoIterator<Item = Option<HeapId>>,
    ) -> RunResult<Value> {
        let method = self.get_attr(obj, name)?;
        let result = self.call_function_obj_args(method.id(), args);
        self.release(method);
        result
    }

    /// `_PyObject_FastCallDict`: positional slice plus optional kwargs dict.
    pub fn fast_call_dict(&mut self, callable: HeapId, args: &[HeapId], kwargs: Option<HeapId>) -> RunResult<Value> {
        let nkwargs = match kwargs {
            Some(kwargs) => self
                .dict(kwargs)
                .map(crate::types::Dict::len)
                .ok_or_else(ExcType::system_error_bad_call)?,
            None => 0,
        };
        self.trace_call(callable, args.len(), nkwargs);

        let Some(func) = self.vectorcall_func(callable) else {
            let tuple = self.new_tuple_from_ids(args)?;
            let result = self.make_tp_call(callable, tuple.id(), kwargs);
            self.release(tuple);
            return result;
        };
        match unpack_dict(self, args, kwargs)? {
            Some(frame) => self.call_frame(callable, func, frame),
            None => self.call_stack(callable, func, args, args.len(), None),
        }
    }

    /// `PyObject_Vectorcall`: `args` holds the positional arguments followed by one value
    /// per name in the `kwnames` tuple.
    ///
    /// Callables without a vectorcall pointer are called through their `call` slot with
    /// the arguments packed into a tuple and a dict.
    pub fn vectorcall(&mut self, callable: HeapId, args: &[HeapId], kwnames: Option<HeapId>) -> RunResult<Value> {
        let nkwargs = kwnames.and_then(|k| self.tuple_items(k)).map_or(0, <[HeapId]>::len);
        let nargs = args.len().checked_sub(nkwargs).ok_or_else(ExcType::system_error_bad_call)?;
        self.trace_call(callable, nargs, nkwargs);

        if let Some(func) = self.vectorcall_func(callable) {
            return self.call_stack(callable, func, args, nargs, kwnames);
        }

        let call = CallArgs::new(args, nargs, kwnames);
        let (tuple, dict) = pack_stack(self, call)?;
        let result = self.make_tp_call(callable, tuple.id(), dict.as_ref().map(Value::id));
        self.release(tuple);
        self.release_opt(dict);
        result
    }

    /// `PyVectorcall_Call`: calls through the per-object vectorcall pointer with a tuple
    /// and an optional kwargs dict.
    ///
    /// Fails with `TypeError` when the type's vectorcall offset is not positive or the
    /// object carries no pointer, and with `SystemError` when `args` is not a tuple or
    /// `kwargs` is not a dict. Without keywords the tuple's items are passed as they
    /// are; a non-empty dict is flattened for the call and every reference taken for it
    /// is released on every exit path.
    pub fn vectorcall_dict_call(&mut self, callable: HeapId, args: HeapId, kwargs: Option<HeapId>) -> RunResult<Value> {
        let Some(func) = self.vectorcall_func(callable) else {
            return Err(ExcType::type_error_no_vectorcall(self.type_name(callable)));
        };
        if kwargs.is_some_and(|k| self.dict(k).is_none()) {
            return Err(ExcType::system_error_bad_call());
        }
        // shared handle, so the items stay readable while the callee holds the runtime
        let positional = self
            .tuple_items_shared(args)
            .ok_or_else(ExcType::system_error_bad_call)?;
        match unpack_dict(self, &positional, kwargs)? {
            Some(frame) => self.call_frame(callable, func, frame),
            None => self.call_stack(callable, func, &positional, positional.len(), None),
        }
    }

    /// Validates the raw result of a `call` slot or vectorcall function
    /// (`_Py_CheckFunctionResult`) and moves the pending error into the result.
    ///
    /// A value with no pending error and an error with no value are the two legal
    /// outcomes. No value and no error, or a value together with a pending error, are
    /// reported as `SystemError`; in the latter case the value is released and the
    /// pending error becomes the context of the `SystemError`.
    ///
    /// The pending-error cell is not scoped to the call: an error that was already
    /// pending before the callable ran is taken as well, so a successful call made with a
    /// stale error set comes back as `SystemError`, as in CPython. Callers clear or
    /// handle errors before calling.
    pub fn check_function_result(&mut self, callable: HeapId, result: Option<Value>) -> RunResult<Value> {
        let pending = self.err_take();
        match (result, pending) {
            (Some(value), None) => Ok(value),
            (None, Some(err)) => Err(err),
            (None, None) => {
                let desc = self.describe_callable(callable);
                Err(SimpleException::new_msg(
                    ExcType::SystemError,
                    format!("{desc} returned NULL without setting an exception"),
                )
                .into())
            }
            (Some(value), Some(err)) => {
                self.release(value);
                if !err.is_catchable() {
                    return Err(err);
                }
                let desc = self.describe_callable(callable);
                Err(SimpleException::new_msg(
                    ExcType::SystemError,
                    format!("{desc} returned a result with an exception set"),
                )
                .with_context(err.into_exception())
                .into())
            }
        }
    }

    /// Vectorcall pointer of `callable`, honouring the type's offset.
    fn vectorcall_func(&self, callable: HeapId) -> Option<VectorcallFunc> {
        if self.type_of(callable).slots().vectorcall_offset > 0 {
            self.object_vectorcall(callable)
        } else {
            None
        }
    }

    /// Invokes `func` under the recursion guard and validates its result.
    fn call_stack(
        &mut self,
        callable: HeapId,
        func: VectorcallFunc,
        args: &[HeapId],
        nargs: usize,
        kwnames: Option<HeapId>,
    ) -> RunResult<Value> {
        self.enter_recursive(CALL_CONTEXT)?;
        let result = func(self, callable, args, nargs, kwnames);
        self.leave_recursive();
        self.check_function_result(callable, result)
    }

    /// Invokes `func` with a flattened frame, then releases the frame whatever the
    /// outcome.
    fn call_frame(&mut self, callable: HeapId, func: VectorcallFunc, frame: CallFrame) -> RunResult<Value> {
        let result = self.call_stack(callable, func, frame.args(), frame.nargs(), Some(frame.kwnames()));
        frame.drop_with_runtime(self);
        result
    }

    /// `_PyObject_MakeTpCall`: the `call` slot under the recursion guard.
    fn make_tp_call(&mut self, callable: HeapId, args: HeapId, kwargs: Option<HeapId>) -> RunResult<Value> {
        let ty = self.type_of(callable);
        let Some(call) = ty.slots().call else {
            return Err(ExcType::type_error_not_callable(ty.name()));
        };
        self.enter_recursive(CALL_CONTEXT)?;
        let result = call(self, callable, args, kwargs);
        self.leave_recursive();
        self.check_function_result(callable, result)
    }

    fn describe_callable(&mut self, callable: HeapId) -> String {
        match self.repr_string(callable) {
            Ok(repr) => repr,
            Err(_) => format!("<{} object>", self.type_name(callable)),
        }
    }
}
