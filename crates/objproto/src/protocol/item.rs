//! Subscription: `obj[key]`, `obj[key] = value` and `del obj[key]`.

use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapId, Value},
    runtime::Runtime,
};

impl Runtime {
    /// `obj[key]` (`PyObject_GetItem`).
    ///
    /// Fails with `TypeError: 'X' object is not subscriptable` when the type has no
    /// `getitem` slot.
    pub fn get_item(&mut self, obj: HeapId, key: HeapId) -> RunResult<Value> {
        match self.type_of(obj).slots().getitem {
            Some(getitem) => getitem(self, obj, key),
            None => Err(ExcType::type_error_not_subscriptable(self.type_name(obj))),
        }
    }

    /// `obj[key] = value` (`PyObject_SetItem`). The container takes its own reference.
    pub fn set_item(&mut self, obj: HeapId, key: HeapId, value: HeapId) -> RunResult<()> {
        self.ass_item(obj, key, Some(value))
    }

    /// `del obj[key]` (`PyObject_DelItem`).
    pub fn del_item(&mut self, obj: HeapId, key: HeapId) -> RunResult<()> {
        self.ass_item(obj, key, None)
    }

    /// `obj[key]` with a raw string key, boxing it first (`PyMapping_GetItemString`).
    pub fn get_item_string(&mut self, obj: HeapId, key: &str) -> RunResult<Value> {
        let key = self.new_str(key)?;
        let result = self.get_item(obj, key.id());
        self.release(key);
        result
    }

    fn ass_item(&mut self, obj: HeapId, key: HeapId, value: Option<HeapId>) -> RunResult<()> {
        match self.type_of(obj).slots().setitem {
            Some(setitem) => setitem(self, obj, key, value),
            None => Err(ExcType::type_error_no_setitem(self.type_name(obj), value.is_none())),
        }
    }
}
