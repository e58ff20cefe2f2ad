use std::{cell::Cell, mem::ManuallyDrop, ptr::addr_of, rc::Rc};

use crate::{
    runtime::Runtime,
    types::{BoundMethod, Dict, Instance, NativeFunction, TypeObject, VectorcallFunc},
};

/// Unique identifier for objects stored inside the heap arena.
///
/// A `HeapId` is a *borrowed* reference: holding one does not keep the object alive.
/// Owned references are represented by [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(usize);

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Type-specific payload of a heap object.
///
/// Every `HeapId` stored in a payload is an owned reference that is released when the
/// object is finalized.
#[derive(Debug)]
pub enum HeapData {
    /// Payload-less object (`object()`, the `None` and `NotImplemented` singletons).
    Empty,
    Str(String),
    /// `int` and `bool` values.
    Int(i64),
    /// Shared so call paths can hold the items across a slot call without copying.
    Tuple(Rc<[HeapId]>),
    Dict(Dict),
    /// Instance of a user type, with its optional `__dict__`.
    Instance(Instance),
    Function(NativeFunction),
    Method(BoundMethod),
    /// Iterator over a sequence; owns a reference to the sequence.
    SeqIter { seq: HeapId, index: usize },
}

impl HeapData {
    /// Pushes every reference this payload owns onto `out`.
    pub(crate) fn collect_child_ids(&self, out: &mut Vec<HeapId>) {
        match self {
            Self::Tuple(items) => out.extend_from_slice(items),
            Self::Dict(dict) => dict.collect_child_ids(out),
            Self::Instance(inst) => out.extend(inst.dict()),
            Self::Method(method) => out.push(method.receiver()),
            Self::SeqIter { seq, .. } => out.push(*seq),
            Self::Empty | Self::Str(_) | Self::Int(_) | Self::Function(_) => {}
        }
    }
}

/// A live object: header fields plus payload.
///
/// The header mirrors a C object header: the reference count, a shared reference to the
/// type, the item count of variable-size objects and the per-object vectorcall pointer.
/// The refcount is a `Cell` so it can be changed while other parts of the heap are
/// borrowed.
#[derive(Debug)]
pub(crate) struct HeapValue {
    refcount: Cell<usize>,
    pub ob_type: Rc<TypeObject>,
    pub ob_size: Option<usize>,
    /// Bytes charged to the resource tracker for this object, refunded when freed.
    pub charged: usize,
    pub vectorcall: Option<VectorcallFunc>,
    pub data: HeapData,
}

impl HeapValue {
    pub fn new(
        ob_type: Rc<TypeObject>,
        ob_size: Option<usize>,
        charged: usize,
        vectorcall: Option<VectorcallFunc>,
        data: HeapData,
    ) -> Self {
        Self {
            refcount: Cell::new(1),
            ob_type,
            ob_size,
            charged,
            vectorcall,
            data,
        }
    }

    #[inline]
    pub fn refcount(&self) -> usize {
        self.refcount.get()
    }
}

/// Reference-counted arena that backs every object.
///
/// Uses a free list to reuse slots from freed objects. When an object is freed its slot
/// ID is added to the free list; new allocations pop from the free list when
/// available, otherwise append. Finalization policy (dealloc slots, tracker refunds,
/// releasing children) lives on [`Runtime`], which owns the heap.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    entries: Vec<Option<HeapValue>>,
    /// IDs of freed slots available for reuse.
    free_list: Vec<HeapId>,
}

impl Heap {
    /// Stores a new object with a refcount of one and returns its ID.
    pub fn insert(&mut self, value: HeapValue) -> HeapId {
        if let Some(id) = self.free_list.pop() {
            self.entries[id.index()] = Some(value);
            id
        } else {
            let id = HeapId(self.entries.len());
            self.entries.push(Some(value));
            id
        }
    }

    /// Returns the header and payload of a live object.
    ///
    /// # Panics
    /// Panics if the ID is invalid or the object has already been freed.
    #[must_use]
    pub fn entry(&self, id: HeapId) -> &HeapValue {
        self.entries
            .get(id.index())
            .expect("Heap::entry: slot missing")
            .as_ref()
            .expect("Heap::entry: object already freed")
    }

    /// # Panics
    /// Panics if the ID is invalid or the object has already been freed.
    #[must_use]
    pub fn entry_mut(&mut self, id: HeapId) -> &mut HeapValue {
        self.entries
            .get_mut(id.index())
            .expect("Heap::entry_mut: slot missing")
            .as_mut()
            .expect("Heap::entry_mut: object already freed")
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entry(id).data
    }

    #[inline]
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.entry_mut(id).data
    }

    #[must_use]
    pub fn is_live(&self, id: HeapId) -> bool {
        self.entries.get(id.index()).is_some_and(Option::is_some)
    }

    /// Increments the reference count for a live object.
    ///
    /// Uses interior mutability for the refcount, so only shared access to the heap
    /// is required.
    ///
    /// # Panics
    /// Panics if the ID is invalid or the object has already been freed.
    #[inline]
    pub fn inc_ref(&self, id: HeapId) {
        let entry = self.entry(id);
        entry.refcount.set(entry.refcount.get() + 1);
    }

    /// Decrements the reference count and returns the new count.
    ///
    /// A return of zero means the caller must finalize the object; the slot stays
    /// occupied until [`Heap::remove`] is called.
    #[inline]
    pub fn dec_ref(&self, id: HeapId) -> usize {
        let entry = self.entry(id);
        let count = entry.refcount.get().saturating_sub(1);
        entry.refcount.set(count);
        count
    }

    /// Removes a finalized object and returns its slot to the free list.
    pub fn remove(&mut self, id: HeapId) -> HeapValue {
        let value = self.entries[id.index()]
            .take()
            .expect("Heap::remove: object already freed");
        self.free_list.push(id);
        value
    }

    /// Number of live objects.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.len() - self.free_list.len()
    }
}

impl HeapValue {
    /// Consumes a removed object, pushing the references its payload owned onto `out`.
    pub fn into_child_ids(self, out: &mut Vec<HeapId>) -> (Rc<TypeObject>, usize) {
        self.data.collect_child_ids(out);
        (self.ob_type, self.charged)
    }
}

/// An owned (strong) reference to an object.
///
/// `Value` is deliberately not `Clone`: duplicating a reference must go through
/// [`Value::clone_with_runtime`] so the reference count stays correct, and every
/// `Value` must eventually be given back with [`Runtime::release`] (or
/// [`Value::drop_with_runtime`]). With the `ref-count-panic` feature a `Value` that is
/// dropped without being released panics.
#[derive(Debug, PartialEq, Eq)]
pub struct Value(HeapId);

impl Value {
    /// Takes ownership of one reference the caller already owns.
    ///
    /// Pairs with [`Value::into_raw`] at sentinel-returning boundaries.
    #[inline]
    #[must_use]
    pub fn from_raw(id: HeapId) -> Self {
        Self(id)
    }

    /// Returns the borrowed handle of this reference.
    #[inline]
    #[must_use]
    pub fn id(&self) -> HeapId {
        self.0
    }

    /// Gives up this `Value` without releasing the reference it owns.
    #[inline]
    #[must_use]
    pub fn into_raw(self) -> HeapId {
        let id = self.0;
        std::mem::forget(self);
        id
    }

    /// Creates a new owned reference to the same object.
    #[must_use]
    pub fn clone_with_runtime(&self, rt: &Runtime) -> Self {
        rt.retain(self.0)
    }

    /// Releases this reference, finalizing the object when it was the last one.
    #[inline]
    pub fn drop_with_runtime(self, rt: &mut Runtime) {
        rt.release(self);
    }
}

/// Drop implementation that panics if a `Value` is dropped without being released.
/// This helps catch reference counting bugs during development/testing.
/// Only enabled when the `ref-count-panic` feature is active.
#[cfg(feature = "ref-count-panic")]
impl Drop for Value {
    fn drop(&mut self) {
        panic!(
            "Value({:?}) dropped without calling drop_with_runtime() - this is a reference counting bug",
            self.0
        );
    }
}

/// Trait for types that require runtime access for proper cleanup.
///
/// Rust's standard `Drop` trait cannot decrement reference counts because it has no
/// access to the `Runtime`. This trait provides an explicit drop-with-runtime method so
/// that owned references (and containers of them) can be released.
///
/// **All types implementing this trait must be cleaned up on every code path.** Prefer
/// [`defer_drop!`] or [`RefGuard`] to guarantee cleanup automatically rather than
/// inserting manual calls in every branch.
pub trait DropWithRuntime {
    /// Consume `self` and release every reference contained within.
    fn drop_with_runtime(self, rt: &mut Runtime);
}

impl DropWithRuntime for Value {
    #[inline]
    fn drop_with_runtime(self, rt: &mut Runtime) {
        rt.release(self);
    }
}

impl<U: DropWithRuntime> DropWithRuntime for Option<U> {
    #[inline]
    fn drop_with_runtime(self, rt: &mut Runtime) {
        if let Some(value) = self {
            value.drop_with_runtime(rt);
        }
    }
}

impl<U: DropWithRuntime> DropWithRuntime for Vec<U> {
    fn drop_with_runtime(self, rt: &mut Runtime) {
        for value in self {
            value.drop_with_runtime(rt);
        }
    }
}

/// RAII guard that ensures a [`DropWithRuntime`] value is cleaned up on every code path.
///
/// The guard's `Drop` impl calls [`DropWithRuntime::drop_with_runtime`] automatically, so
/// cleanup happens whether the scope exits normally, via `?`, or via an early return.
///
/// Prefer the [`defer_drop!`] macro for the common case. Use `RefGuard` directly when
/// the value should be reclaimed on success via [`into_inner`](Self::into_inner).
pub struct RefGuard<'a, V: DropWithRuntime> {
    // manually dropped because it needs to be dropped by move.
    value: ManuallyDrop<V>,
    rt: &'a mut Runtime,
}

impl<'a, V: DropWithRuntime> RefGuard<'a, V> {
    #[inline]
    pub fn new(value: V, rt: &'a mut Runtime) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            rt,
        }
    }

    /// Consumes the guard and returns the contained value without dropping it.
    #[inline]
    pub fn into_inner(self) -> V {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: [DR] - `ManuallyDrop::new(self)` prevents `Drop` on self, so we can take the value out
        unsafe { ManuallyDrop::take(&mut this.value) }
    }

    /// Consumes the guard and returns the value and runtime separately, without dropping.
    #[inline]
    pub fn into_parts(self) -> (V, &'a mut Runtime) {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: [DR] - `ManuallyDrop` prevents `Drop` on self, so we can recover the parts
        unsafe { (ManuallyDrop::take(&mut this.value), addr_of!(this.rt).read()) }
    }

    /// Borrows the value (immutably) and runtime (mutably) out of the guard.
    ///
    /// This is what [`defer_drop!`] calls internally.
    #[inline]
    pub fn as_parts(&mut self) -> (&V, &mut Runtime) {
        (&self.value, self.rt)
    }
}

impl<V: DropWithRuntime> Drop for RefGuard<'_, V> {
    fn drop(&mut self) {
        // SAFETY: [DR] - value is never manually dropped until this point
        unsafe { ManuallyDrop::take(&mut self.value) }.drop_with_runtime(self.rt);
    }
}

/// The preferred way to ensure a [`DropWithRuntime`] value is cleaned up on every code path.
///
/// Creates a [`RefGuard`] and immediately rebinds `$value` as `&V` and `$rt` as
/// `&mut Runtime`. The original owned value is moved into the guard and released when
/// the enclosing scope exits.
#[macro_export]
macro_rules! defer_drop {
    ($value:ident, $rt:ident) => {
        let mut _guard = $crate::RefGuard::new($value, $rt);
        #[allow(
            clippy::allow_attributes,
            reason = "the reborrowed parts may not both be used in every case, so allow unused vars to avoid warnings"
        )]
        #[allow(unused_variables)]
        let ($value, $rt) = _guard.as_parts();
    };
}
