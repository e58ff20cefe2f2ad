//! Minimal `tuple` and its iterator.

use std::rc::Rc;

use smallvec::SmallVec;

use super::{TypeObject, TypeSlots, TypeSpec};
use crate::{
    exception::{ExcType, RunResult},
    heap::{DropWithRuntime, HeapData, HeapId, Value},
    protocol::CompareOp,
    py_hash,
    runtime::Runtime,
};

pub(crate) fn tuple_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("tuple")
        .base(object)
        .basic_size(super::OBJECT_HEADER_SIZE + 8)
        .item_size(size_of::<HeapId>())
        .slots(TypeSlots {
            repr: Some(tuple_repr),
            len: Some(tuple_len),
            getitem: Some(tuple_getitem),
            hash: Some(tuple_hash),
            richcompare: Some(tuple_richcompare),
            iter: Some(tuple_iter),
            dealloc: Some(tuple_dealloc),
            ..TypeSlots::default()
        })
        .build()
}

fn tuple_iterator_type(object: &Rc<TypeObject>) -> Rc<TypeObject> {
    TypeSpec::new("tuple_iterator")
        .base(object)
        .basic_size(super::OBJECT_HEADER_SIZE + 16)
        .slots(TypeSlots {
            iter: Some(Runtime::self_iter),
            iternext: Some(tuple_iter_next),
            ..TypeSlots::default()
        })
        .build()
}

/// Shares the item handles out of the heap so slots can be called while iterating.
fn items_of(rt: &Runtime, obj: HeapId) -> Rc<[HeapId]> {
    rt.tuple_items_shared(obj).unwrap_or_else(|| Rc::from([]))
}

fn tuple_repr(rt: &mut Runtime, obj: HeapId) -> RunResult<String> {
    let items = items_of(rt, obj);
    let mut parts = Vec::with_capacity(items.len());
    for item in items.iter().copied() {
        parts.push(rt.repr_string(item)?);
    }
    Ok(match parts.as_slice() {
        [single] => format!("({single},)"),
        _ => format!("({})", parts.join(", ")),
    })
}

/// Only the shared empty tuple needs guarding; its count reaching zero is an over-release.
fn tuple_dealloc(rt: &mut Runtime, obj: HeapId) {
    if obj == rt.empty_tuple_id() {
        rt.fatal("deallocating the empty tuple singleton");
    }
}

fn tuple_len(rt: &mut Runtime, obj: HeapId) -> RunResult<usize> {
    Ok(rt.tuple_items(obj).map_or(0, <[HeapId]>::len))
}

/// Integer subscript; negative indices count from the end.
fn tuple_getitem(rt: &mut Runtime, obj: HeapId, key: HeapId) -> RunResult<Value> {
    let Some(index) = rt.int_value(key) else {
        return Err(ExcType::type_error_indices("tuple", rt.type_name(key)));
    };
    let items = rt.tuple_items(obj).unwrap_or_default();
    let resolved = if index < 0 {
        usize::try_from(index.unsigned_abs()).ok().and_then(|back| items.len().checked_sub(back))
    } else {
        usize::try_from(index).ok()
    };
    match resolved.and_then(|i| items.get(i)) {
        Some(&item) => Ok(rt.retain(item)),
        None => Err(ExcType::index_error_out_of_range("tuple")),
    }
}

fn tuple_hash(rt: &mut Runtime, obj: HeapId) -> RunResult<i64> {
    let items = items_of(rt, obj);
    let mut lanes = SmallVec::<[i64; 8]>::with_capacity(items.len());
    for item in items.iter().copied() {
        lanes.push(rt.hash(item)?);
    }
    Ok(py_hash::hash_tuple(&lanes))
}

/// Lexicographic comparison: the first unequal pair decides, otherwise the lengths do.
fn tuple_richcompare(rt: &mut Runtime, left: HeapId, right: HeapId, op: CompareOp) -> RunResult<Value> {
    if rt.tuple_items(right).is_none() {
        return Ok(rt.not_implemented());
    }
    let (a, b) = (items_of(rt, left), items_of(rt, right));

    let mut index = 0;
    while index < a.len() && index < b.len() {
        if !rt.rich_compare_bool(a[index], b[index], CompareOp::Eq)? {
            break;
        }
        index += 1;
    }

    if index >= a.len() || index >= b.len() {
        return Ok(rt.new_bool(op.matches(a.len().cmp(&b.len()))));
    }
    match op {
        CompareOp::Eq => Ok(rt.new_bool(false)),
        CompareOp::Ne => Ok(rt.new_bool(true)),
        _ => rt.rich_compare(a[index], b[index], op),
    }
}

fn tuple_iter(rt: &mut Runtime, obj: HeapId) -> RunResult<Value> {
    let ty = rt.tuple_iterator_type();
    let seq = rt.retain(obj).into_raw();
    rt.object_new(&ty, HeapData::SeqIter { seq, index: 0 })
}

fn tuple_iter_next(rt: &mut Runtime, obj: HeapId) -> RunResult<Option<Value>> {
    let HeapData::SeqIter { seq, index } = rt.heap.get(obj) else {
        return Ok(None);
    };
    let (seq, index) = (*seq, *index);
    let Some(&item) = rt.tuple_items(seq).and_then(|items| items.get(index)) else {
        return Ok(None);
    };
    if let HeapData::SeqIter { index, .. } = rt.heap.get_mut(obj) {
        *index += 1;
    }
    Ok(Some(rt.retain(item)))
}

impl Runtime {
    /// Creates a tuple that takes ownership of `items`.
    ///
    /// The empty tuple is a shared singleton and costs no allocation.
    pub fn new_tuple(&mut self, items: Vec<Value>) -> RunResult<Value> {
        if items.is_empty() {
            return Ok(self.retain(self.empty_tuple_id()));
        }
        let ty = Rc::clone(&self.types().tuple);
        let len = items.len();
        let ids = items.into_iter().map(Value::into_raw).collect();
        self.object_new_var(&ty, len, HeapData::Tuple(ids))
    }

    /// Creates a tuple holding new references to `items`.
    pub fn new_tuple_from_ids(&mut self, items: &[HeapId]) -> RunResult<Value> {
        let owned: Vec<Value> = items.iter().map(|&id| self.retain(id)).collect();
        self.new_tuple(owned)
    }

    /// Items of a `tuple` object, `None` for anything else.
    #[must_use]
    pub fn tuple_items(&self, id: HeapId) -> Option<&[HeapId]> {
        match self.heap.get(id) {
            HeapData::Tuple(items) => Some(&items[..]),
            _ => None,
        }
    }

    /// Items of a `tuple` object as a shared slice that outlives the heap borrow.
    #[must_use]
    pub(crate) fn tuple_items_shared(&self, id: HeapId) -> Option<Rc<[HeapId]>> {
        match self.heap.get(id) {
            HeapData::Tuple(items) => Some(Rc::clone(items)),
            _ => None,
        }
    }

    /// Collects every item of an iterable into owned references.
    pub fn collect_iter(&mut self, iterable: HeapId) -> RunResult<Vec<Value>> {
        let iter = self.get_iter(iterable)?;
        let mut out = Vec::new();
        loop {
            match self.iter_next(iter.id()) {
                Ok(Some(item)) => out.push(item),
                Ok(None) => break,
                Err(err) => {
                    out.drop_with_runtime(self);
                    self.release(iter);
                    return Err(err);
                }
            }
        }
        self.release(iter);
        Ok(out)
    }

    /// The `tuple_iterator` type, built lazily on first use.
    fn tuple_iterator_type(&mut self) -> Rc<TypeObject> {
        if let Some(ty) = &self.tuple_iterator {
            return Rc::clone(ty);
        }
        let ty = tuple_iterator_type(&self.types().object);
        self.tuple_iterator = Some(Rc::clone(&ty));
        ty
    }
}
