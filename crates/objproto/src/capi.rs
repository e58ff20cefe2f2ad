//! Sentinel-returning façade over the protocol, shaped like the C API.
//!
//! Every function reports failure with a sentinel (`None`, `-1` or [`HASH_ERROR`]) and
//! leaves the error in the runtime's pending-error cell, where callers inspect it with
//! [`Runtime::err_occurred`] and friends. Integer results are `i32` like C `int`.
//!
//! ```
//! use objproto::{Runtime, capi};
//!
//! let mut rt = Runtime::new();
//! let d = rt.new_dict().unwrap();
//! assert_eq!(capi::object_hash_not_implemented(&mut rt, d.id()), -1);
//! assert!(rt.err_matches(objproto::ExcType::TypeError));
//! rt.err_clear();
//! rt.release(d);
//! ```

use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapId, Value},
    protocol::CompareOp,
    py_hash::HASH_ERROR,
    runtime::Runtime,
    types::TypeObject,
};

/// `Py_IncRef`: a no-op for `None`.
pub fn incref(rt: &Runtime, obj: Option<HeapId>) {
    if let Some(obj) = obj {
        rt.heap.inc_ref(obj);
    }
}

/// `Py_DecRef`: a no-op for `None`. The caller gives up one reference it owns.
pub fn decref(rt: &mut Runtime, obj: Option<HeapId>) {
    rt.release_opt(obj.map(Value::from_raw));
}

/// `PyObject_GetAttr`.
pub fn object_get_attr(rt: &mut Runtime, obj: HeapId, name: HeapId) -> Option<Value> {
    let result = rt.get_attr(obj, name);
    rt.into_sentinel(result)
}

/// `PyObject_GetAttrString`.
pub fn object_get_attr_string(rt: &mut Runtime, obj: HeapId, name: &str) -> Option<Value> {
    let result = rt.get_attr_string(obj, name);
    rt.into_sentinel(result)
}

/// `PyObject_SetAttr`; a `None` value deletes. Returns `0` or `-1`.
pub fn object_set_attr(rt: &mut Runtime, obj: HeapId, name: HeapId, value: Option<HeapId>) -> i32 {
    let result = rt.set_attr(obj, name, value);
    status(rt, result)
}

/// `PyObject_SetAttrString`. Returns `0` or `-1`.
pub fn object_set_attr_string(rt: &mut Runtime, obj: HeapId, name: &str, value: Option<HeapId>) -> i32 {
    let result = rt.set_attr_string(obj, name, value);
    status(rt, result)
}

/// `PyObject_HasAttr`: `1` or `0`, never leaving a catchable error pending.
///
/// An uncatchable resource error is stored and reported as `-1`.
pub fn object_has_attr(rt: &mut Runtime, obj: HeapId, name: HeapId) -> i32 {
    let result = rt.has_attr(obj, name);
    truth(rt, result)
}

/// `PyObject_HasAttrString`, with the policy of [`object_has_attr`].
pub fn object_has_attr_string(rt: &mut Runtime, obj: HeapId, name: &str) -> i32 {
    let result = rt.has_attr_string(obj, name);
    truth(rt, result)
}

/// `_PyObject_LookupAttr`: `1` with the value stored in `result`, `0` when missing (no
/// error pending) or `-1` on a real error.
pub fn object_lookup_attr(rt: &mut Runtime, obj: HeapId, name: HeapId, result: &mut Option<Value>) -> i32 {
    *result = None;
    match rt.try_get_attr(obj, name) {
        Ok(Some(value)) => {
            *result = Some(value);
            1
        }
        Ok(None) => 0,
        Err(err) => {
            rt.err_set(err);
            -1
        }
    }
}

/// `PyObject_Call`.
pub fn object_call(rt: &mut Runtime, callable: HeapId, args: HeapId, kwargs: Option<HeapId>) -> Option<Value> {
    let result = rt.call(callable, args, kwargs);
    rt.into_sentinel(result)
}

/// `PyObject_CallNoArgs`.
pub fn object_call_no_args(rt: &mut Runtime, callable: HeapId) -> Option<Value> {
    let result = rt.call_no_args(callable);
    rt.into_sentinel(result)
}

/// `PyObject_Vectorcall`.
pub fn object_vectorcall(
    rt: &mut Runtime,
    callable: HeapId,
    args: &[HeapId],
    kwnames: Option<HeapId>,
) -> Option<Value> {
    let result = rt.vectorcall(callable, args, kwnames);
    rt.into_sentinel(result)
}

/// `PyObject_RichCompare` with the operator as its C number (`Py_LT` is `0`).
pub fn object_rich_compare(rt: &mut Runtime, left: HeapId, right: HeapId, op: i32) -> Option<Value> {
    let result = compare_op(op).and_then(|op| rt.rich_compare(left, right, op));
    rt.into_sentinel(result)
}

/// `PyObject_RichCompareBool`: `1`, `0`, or `-1` with the error pending.
pub fn object_rich_compare_bool(rt: &mut Runtime, left: HeapId, right: HeapId, op: i32) -> i32 {
    let result = compare_op(op).and_then(|op| rt.rich_compare_bool(left, right, op));
    truth(rt, result)
}

/// `PyObject_IsTrue`: `1`, `0`, or `-1` with the error pending.
pub fn object_is_true(rt: &mut Runtime, obj: HeapId) -> i32 {
    let result = rt.is_true(obj);
    truth(rt, result)
}

/// `PyObject_Not`: `1`, `0`, or `-1` with the error pending.
pub fn object_not(rt: &mut Runtime, obj: HeapId) -> i32 {
    let result = rt.not_(obj);
    truth(rt, result)
}

/// `PyObject_Hash`: the hash, or [`HASH_ERROR`] with the error pending.
pub fn object_hash(rt: &mut Runtime, obj: HeapId) -> i64 {
    let result = rt.hash(obj);
    rt.into_sentinel(result).unwrap_or(HASH_ERROR)
}

/// `PyObject_HashNotImplemented`: always [`HASH_ERROR`] with a pending `TypeError`.
pub fn object_hash_not_implemented(rt: &mut Runtime, obj: HeapId) -> i64 {
    let result = rt.hash_not_implemented(obj);
    rt.into_sentinel(result).unwrap_or(HASH_ERROR)
}

/// `PyObject_Size`: the length, or `-1` with the error pending.
pub fn object_size(rt: &mut Runtime, obj: HeapId) -> isize {
    let result = rt
        .size(obj)
        .and_then(|n| isize::try_from(n).map_err(|_| overflow("length")));
    rt.into_sentinel(result).unwrap_or(-1)
}

/// `PyObject_Repr`.
pub fn object_repr(rt: &mut Runtime, obj: Option<HeapId>) -> Option<Value> {
    let result = rt.repr(obj);
    rt.into_sentinel(result)
}

/// `PyObject_Str`.
pub fn object_str(rt: &mut Runtime, obj: Option<HeapId>) -> Option<Value> {
    let result = rt.str(obj);
    rt.into_sentinel(result)
}

/// `PyObject_GetItem`.
pub fn object_get_item(rt: &mut Runtime, obj: HeapId, key: HeapId) -> Option<Value> {
    let result = rt.get_item(obj, key);
    rt.into_sentinel(result)
}

/// `PyObject_SetItem`. Returns `0` or `-1`.
pub fn object_set_item(rt: &mut Runtime, obj: HeapId, key: HeapId, value: HeapId) -> i32 {
    let result = rt.set_item(obj, key, value);
    status(rt, result)
}

/// `PyObject_DelItem`. Returns `0` or `-1`.
pub fn object_del_item(rt: &mut Runtime, obj: HeapId, key: HeapId) -> i32 {
    let result = rt.del_item(obj, key);
    status(rt, result)
}

/// `PyObject_IsSubclass`: `1` or `0`.
pub fn object_is_subclass(rt: &Runtime, derived: &TypeObject, cls: &TypeObject) -> i32 {
    i32::from(rt.is_subclass(derived, cls))
}

fn compare_op(op: i32) -> RunResult<CompareOp> {
    CompareOp::from_raw(op).ok_or_else(ExcType::system_error_bad_call)
}

fn status(rt: &mut Runtime, result: RunResult<()>) -> i32 {
    match rt.into_sentinel(result) {
        Some(()) => 0,
        None => -1,
    }
}

fn truth(rt: &mut Runtime, result: RunResult<bool>) -> i32 {
    rt.into_sentinel(result).map_or(-1, i32::from)
}

fn overflow(what: &str) -> crate::RunError {
    crate::SimpleException::new_msg(ExcType::OverflowError, format!("{what} does not fit in a C ssize_t")).into()
}
