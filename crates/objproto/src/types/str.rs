//! Minimal `str`.

use std::{fmt::Write, rc::Rc};

use super::{TypeObject, TypeSlots, TypeSpec};
use crate::{
    exception::RunResult,
    heap::{HeapData, HeapId, Value},
    protocol::CompareOp,
    py_hash,
    runtime::Runtime,
};

pub(crate) fn str_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("str")
        .base(object)
        .basic_size(super::OBJECT_HEADER_SIZE + 24)
        .item_size(1)
        .slots(TypeSlots {
            repr: Some(str_repr),
            str: Some(str_str),
            len: Some(str_len),
            hash: Some(str_hash),
            richcompare: Some(str_richcompare),
            ..TypeSlots::default()
        })
        .build()
}

fn str_repr(rt: &mut Runtime, obj: HeapId) -> RunResult<String> {
    Ok(string_repr(rt.str_value(obj).unwrap_or_default()))
}

fn str_str(rt: &mut Runtime, obj: HeapId) -> RunResult<String> {
    Ok(rt.str_value(obj).unwrap_or_default().to_owned())
}

fn str_len(rt: &mut Runtime, obj: HeapId) -> RunResult<usize> {
    Ok(rt.str_value(obj).map_or(0, |s| s.chars().count()))
}

fn str_hash(rt: &mut Runtime, obj: HeapId) -> RunResult<i64> {
    Ok(py_hash::hash_str(rt.str_value(obj).unwrap_or_default()))
}

fn str_richcompare(rt: &mut Runtime, left: HeapId, right: HeapId, op: CompareOp) -> RunResult<Value> {
    let ordering = match (rt.str_value(left), rt.str_value(right)) {
        (Some(a), Some(b)) => a.cmp(b),
        _ => return Ok(rt.not_implemented()),
    };
    Ok(rt.new_bool(op.matches(ordering)))
}

/// Python `repr()` of a string: quoted, with backslash escapes.
///
/// Uses single quotes unless the text contains a single quote and no double quote.
pub(crate) fn string_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if u32::from(c) < 0x20 || u32::from(c) == 0x7f => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl Runtime {
    /// Creates a new `str` object ("string-from-bytes").
    pub fn new_str(&mut self, value: &str) -> RunResult<Value> {
        let ty = Rc::clone(&self.types().str);
        let len = value.len();
        self.object_new_var(&ty, len, HeapData::Str(value.to_owned()))
    }

    /// Contents of a `str` object, `None` for anything else.
    #[must_use]
    pub fn str_value(&self, id: HeapId) -> Option<&str> {
        match self.heap.get(id) {
            HeapData::Str(s) => Some(s),
            _ => None,
        }
    }
}
