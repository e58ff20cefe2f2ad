//! Minimal insertion-ordered `dict` with `str` keys.
//!
//! This is the mapping used for keyword arguments and instance `__dict__`s, so it only
//! needs string keys. Each entry owns a reference to its key object (reused as the
//! keyword name when kwargs are flattened) and one to its value.

use std::rc::Rc;

use indexmap::IndexMap;

use super::{TypeObject, TypeSlots, TypeSpec};
use crate::{
    exception::{ExcType, RunError, RunResult, SimpleException},
    heap::{HeapData, HeapId, Value},
    runtime::Runtime,
    types::str::string_repr,
};

/// Storage of a `dict` object: key text to `(key object, value)`.
#[derive(Debug, Default)]
pub struct Dict {
    entries: IndexMap<String, (HeapId, HeapId)>,
}

impl Dict {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<HeapId> {
        self.entries.get(key).map(|&(_, value)| value)
    }

    /// Iterates `(key text, key object, value)` in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, HeapId, HeapId)> {
        self.entries.iter().map(|(k, &(key, value))| (k.as_str(), key, value))
    }

    /// Stores an entry, taking ownership of both references. Returns the replaced pair.
    fn insert(&mut self, text: String, key: HeapId, value: HeapId) -> Option<(HeapId, HeapId)> {
        self.entries.insert(text, (key, value))
    }

    /// Removes an entry, preserving the order of the rest. Returns the owned pair.
    fn remove(&mut self, key: &str) -> Option<(HeapId, HeapId)> {
        self.entries.shift_remove(key)
    }

    pub(crate) fn collect_child_ids(&self, out: &mut Vec<HeapId>) {
        for &(key, value) in self.entries.values() {
            out.push(key);
            out.push(value);
        }
    }
}

pub(crate) fn dict_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("dict")
        .base(object)
        .basic_size(super::OBJECT_HEADER_SIZE + 32)
        .slots(TypeSlots {
            repr: Some(dict_repr),
            len: Some(dict_len),
            getitem: Some(dict_getitem),
            setitem: Some(dict_setitem),
            hash: Some(Runtime::hash_not_implemented),
            ..TypeSlots::default()
        })
        .build()
}

fn dict_repr(rt: &mut Runtime, obj: HeapId) -> RunResult<String> {
    let entries: Vec<(String, HeapId)> = rt
        .dict(obj)
        .map(|d| d.iter().map(|(k, _, v)| (k.to_owned(), v)).collect())
        .unwrap_or_default();
    let mut parts = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        parts.push(format!("{}: {}", string_repr(&key), rt.repr_string(value)?));
    }
    Ok(format!("{{{}}}", parts.join(", ")))
}

fn dict_len(rt: &mut Runtime, obj: HeapId) -> RunResult<usize> {
    Ok(rt.dict(obj).map_or(0, Dict::len))
}

/// Any key other than a present `str` is missing.
fn dict_getitem(rt: &mut Runtime, obj: HeapId, key: HeapId) -> RunResult<Value> {
    let found = rt
        .str_value(key)
        .and_then(|text| rt.dict(obj).and_then(|d| d.get(text)));
    match found {
        Some(value) => Ok(rt.retain(value)),
        None => Err(missing_key(rt, key)),
    }
}

fn dict_setitem(rt: &mut Runtime, obj: HeapId, key: HeapId, value: Option<HeapId>) -> RunResult<()> {
    match value {
        Some(_) if rt.str_value(key).is_none() => Err(SimpleException::new_msg(
            ExcType::TypeError,
            format!("dict keys must be str, not '{}'", rt.type_name(key)),
        )
        .into()),
        Some(value) => rt.dict_set_item_obj(obj, key, value),
        None => {
            let Some(text) = rt.str_value(key).map(str::to_owned) else {
                return Err(missing_key(rt, key));
            };
            if rt.dict_del_item(obj, &text)? {
                Ok(())
            } else {
                Err(missing_key(rt, key))
            }
        }
    }
}

fn missing_key(rt: &mut Runtime, key: HeapId) -> RunError {
    match rt.repr_string(key) {
        Ok(repr) => ExcType::key_error(repr),
        Err(err) => err,
    }
}

impl Runtime {
    /// Creates an empty `dict` ("new-mapping").
    pub fn new_dict(&mut self) -> RunResult<Value> {
        let ty = Rc::clone(&self.types().dict);
        self.object_new(&ty, HeapData::Dict(Dict::default()))
    }

    /// Storage of a `dict` object, `None` for anything else.
    #[must_use]
    pub fn dict(&self, id: HeapId) -> Option<&Dict> {
        match self.heap.get(id) {
            HeapData::Dict(dict) => Some(dict),
            _ => None,
        }
    }

    /// `dict[key] = value` with a raw string key ("set-item").
    ///
    /// The dict takes a new reference to `value`; the caller keeps its own.
    pub fn dict_set_item(&mut self, dict: HeapId, key: &str, value: HeapId) -> RunResult<()> {
        let key_obj = self.new_str(key)?;
        let result = self.dict_set_item_obj(dict, key_obj.id(), value);
        self.release(key_obj);
        result
    }

    /// `dict[key] = value` where `key` is a `str` object.
    pub fn dict_set_item_obj(&mut self, dict: HeapId, key: HeapId, value: HeapId) -> RunResult<()> {
        let Some(text) = self.str_value(key).map(str::to_owned) else {
            return Err(ExcType::type_error_attr_name(self.type_name(key)));
        };
        if self.dict(dict).is_none() {
            return Err(ExcType::system_error_bad_call());
        }
        let key = self.retain(key).into_raw();
        let value = self.retain(value).into_raw();
        let replaced = match self.heap.get_mut(dict) {
            HeapData::Dict(d) => d.insert(text, key, value),
            _ => None,
        };
        if let Some((old_key, old_value)) = replaced {
            self.release(Value::from_raw(old_key));
            self.release(Value::from_raw(old_value));
        }
        Ok(())
    }

    /// Removes `key`; returns whether it was present.
    pub fn dict_del_item(&mut self, dict: HeapId, key: &str) -> RunResult<bool> {
        let removed = match self.heap.get_mut(dict) {
            HeapData::Dict(d) => d.remove(key),
            _ => return Err(ExcType::system_error_bad_call()),
        };
        Ok(match removed {
            Some((old_key, old_value)) => {
                self.release(Value::from_raw(old_key));
                self.release(Value::from_raw(old_value));
                true
            }
            None => false,
        })
    }
}
