//! The runtime: object store, built-in types, singletons and the pending-error cell.
//!
//! Every protocol operation is a method on [`Runtime`]. Protocol entry points return
//! [`RunResult`]; the pending-error cell is only used at the raw native-slot boundary
//! (`call` slots and vectorcall functions) and by the [`crate::capi`] façade.

use std::{fmt, rc::Rc};

use crate::{
    exception::{ErrorState, ExcType, RunError, RunResult, SimpleException},
    fatal::fatal_error,
    heap::{Heap, HeapData, HeapId, HeapValue, Value},
    protocol::{AttributeResolver, CompareOp, MroResolver},
    resource::{LimitedTracker, NoLimitTracker, ResourceLimits, ResourceTracker},
    tracer::{NoopTracer, ProtocolTracer},
    types::{BuiltinTypes, TypeObject},
};

/// Kind of attribute access reported to the tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttrAccess {
    Get,
    Set,
    Delete,
}

impl AttrAccess {
    pub fn for_value(value: Option<HeapId>) -> Self {
        if value.is_some() { Self::Set } else { Self::Delete }
    }
}

/// Owner of every object and of the state the protocol layer shares between calls.
///
/// The runtime is single-threaded and re-entrant: any slot it calls may call back into
/// any protocol operation.
pub struct Runtime {
    pub(crate) heap: Heap,
    tracker: Box<dyn ResourceTracker>,
    tracer: Box<dyn ProtocolTracer>,
    pub(crate) errors: ErrorState,
    types: BuiltinTypes,
    none: HeapId,
    not_implemented: HeapId,
    true_obj: HeapId,
    false_obj: HeapId,
    empty_tuple: HeapId,
    resolver: Rc<dyn AttributeResolver>,
    /// Current protocol nesting depth, checked against the tracker's recursion limit.
    depth: usize,
    pub(crate) tuple_iterator: Option<Rc<TypeObject>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("live_objects", &self.heap.live_count())
            .field("tracker", &self.tracker)
            .field("tracer", &self.tracer)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures a [`Runtime`].
///
/// ```
/// use objproto::{ResourceLimits, Runtime, StderrTracer};
///
/// let rt = Runtime::builder()
///     .limits(ResourceLimits::new().max_allocations(1_000))
///     .tracer(StderrTracer::with_limit(10))
///     .build();
/// assert_eq!(rt.allocation_count(), Some(0));
/// ```
#[derive(Default)]
pub struct RuntimeBuilder {
    tracker: Option<Box<dyn ResourceTracker>>,
    tracer: Option<Box<dyn ProtocolTracer>>,
    resolver: Option<Rc<dyn AttributeResolver>>,
}

impl fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("tracker", &self.tracker)
            .field("tracer", &self.tracer)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl RuntimeBuilder {
    #[must_use]
    pub fn tracker(mut self, tracker: impl ResourceTracker + 'static) -> Self {
        self.tracker = Some(Box::new(tracker));
        self
    }

    /// Enforces `limits` with a [`LimitedTracker`].
    #[must_use]
    pub fn limits(self, limits: ResourceLimits) -> Self {
        self.tracker(LimitedTracker::new(limits))
    }

    #[must_use]
    pub fn tracer(mut self, tracer: impl ProtocolTracer + 'static) -> Self {
        self.tracer = Some(Box::new(tracer));
        self
    }

    /// Replaces the descriptor/instance-dict resolver used by the generic attribute slots.
    #[must_use]
    pub fn resolver(mut self, resolver: impl AttributeResolver + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    #[must_use]
    pub fn build(self) -> Runtime {
        Runtime::from_parts(
            self.tracker.unwrap_or_else(|| Box::new(NoLimitTracker)),
            self.tracer.unwrap_or_else(|| Box::new(NoopTracer)),
            self.resolver.unwrap_or_else(|| Rc::new(MroResolver)),
        )
    }
}

impl Runtime {
    /// A runtime without resource limits or tracing.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    fn from_parts(
        tracker: Box<dyn ResourceTracker>,
        tracer: Box<dyn ProtocolTracer>,
        resolver: Rc<dyn AttributeResolver>,
    ) -> Self {
        let types = BuiltinTypes::new();
        let mut heap = Heap::default();
        // singletons are owned by the runtime and never charged to the tracker
        let mut immortal = |ty: &Rc<TypeObject>, ob_size: Option<usize>, data: HeapData| {
            heap.insert(HeapValue::new(Rc::clone(ty), ob_size, 0, None, data))
        };
        let none = immortal(&types.none, None, HeapData::Empty);
        let not_implemented = immortal(&types.not_implemented, None, HeapData::Empty);
        let true_obj = immortal(&types.bool, None, HeapData::Int(1));
        let false_obj = immortal(&types.bool, None, HeapData::Int(0));
        let empty_tuple = immortal(&types.tuple, Some(0), HeapData::Tuple(Rc::from([])));
        Self {
            heap,
            tracker,
            tracer,
            errors: ErrorState::default(),
            types,
            none,
            not_implemented,
            true_obj,
            false_obj,
            empty_tuple,
            resolver,
            depth: 0,
            tuple_iterator: None,
        }
    }

    #[must_use]
    pub fn types(&self) -> &BuiltinTypes {
        &self.types
    }

    pub(crate) fn resolver(&self) -> Rc<dyn AttributeResolver> {
        Rc::clone(&self.resolver)
    }

    pub(crate) fn tracer_mut(&mut self) -> &mut dyn ProtocolTracer {
        &mut *self.tracer
    }

    // ---- reference counting ----

    /// Takes a new owned reference to `id` (`Py_INCREF`).
    ///
    /// # Panics
    /// Panics if `id` does not name a live object.
    #[must_use]
    pub fn retain(&self, id: HeapId) -> Value {
        self.heap.inc_ref(id);
        Value::from_raw(id)
    }

    /// Gives back an owned reference (`Py_DECREF`), finalizing the object when it was the
    /// last one.
    pub fn release(&mut self, value: Value) {
        self.decref(value.into_raw());
    }

    /// Like [`Runtime::release`], but an absent reference is a no-op (`Py_XDECREF`).
    pub fn release_opt(&mut self, value: Option<Value>) {
        if let Some(value) = value {
            self.release(value);
        }
    }

    /// Current reference count of a live object.
    #[must_use]
    pub fn refcount(&self, id: HeapId) -> usize {
        self.heap.entry(id).refcount()
    }

    /// Whether `id` still names a live object.
    #[must_use]
    pub fn is_live(&self, id: HeapId) -> bool {
        self.heap.is_live(id)
    }

    /// Number of live objects, singletons included.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.heap.live_count()
    }

    /// Decrements and finalizes objects whose count reaches zero.
    ///
    /// Finalization order per object: the type's `dealloc` slot, the tracer hook, removal
    /// from the heap with a refund to the tracker, then the payload's references.
    /// Children are released iteratively so long ownership chains cannot overflow the
    /// stack.
    fn decref(&mut self, id: HeapId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if self.heap.dec_ref(id) > 0 {
                continue;
            }
            let ty = Rc::clone(&self.heap.entry(id).ob_type);
            if let Some(dealloc) = ty.slots().dealloc {
                dealloc(self, id);
            }
            self.tracer.on_finalize(ty.name(), id);
            let (_, charged) = self.heap.remove(id).into_child_ids(&mut pending);
            self.tracker.on_free(charged);
        }
    }

    // ---- allocation ----

    /// Allocates a fixed-size object of type `ty` with a refcount of one.
    ///
    /// On failure the references owned by `data` are released.
    pub fn object_new(&mut self, ty: &Rc<TypeObject>, data: HeapData) -> RunResult<Value> {
        self.allocate(ty, None, data)
    }

    /// Allocates a variable-size object holding `nitems` items.
    ///
    /// The charged size is `basic_size + nitems * item_size`; an overflowing size is a
    /// `MemoryError`.
    pub fn object_new_var(&mut self, ty: &Rc<TypeObject>, nitems: usize, data: HeapData) -> RunResult<Value> {
        self.allocate(ty, Some(nitems), data)
    }

    fn allocate(&mut self, ty: &Rc<TypeObject>, ob_size: Option<usize>, data: HeapData) -> RunResult<Value> {
        let size = match ob_size {
            None => Some(ty.basic_size()),
            Some(n) => n
                .checked_mul(ty.item_size())
                .and_then(|items| items.checked_add(ty.basic_size())),
        };
        let charged = match size {
            Some(size) => self.tracker.on_allocate(size).map(|()| size).map_err(RunError::from),
            None => Err(RunError::UncatchableExc(Box::new(SimpleException::new_msg(
                ExcType::MemoryError,
                format!("cannot allocate {} items of '{}'", ob_size.unwrap_or_default(), ty.name()),
            )))),
        };
        let size = match charged {
            Ok(size) => size,
            Err(err) => {
                let mut children = Vec::new();
                data.collect_child_ids(&mut children);
                for child in children {
                    self.decref(child);
                }
                return Err(err);
            }
        };

        let slots = ty.slots();
        let vectorcall = if slots.vectorcall_offset > 0 { slots.vectorcall } else { None };
        let id = self
            .heap
            .insert(HeapValue::new(Rc::clone(ty), ob_size, size, vectorcall, data));
        self.tracer.on_allocate(ty.name(), size);
        Ok(Value::from_raw(id))
    }

    /// Item count of a variable-size object (`Py_SIZE`), `None` for fixed-size ones.
    #[must_use]
    pub fn var_size(&self, id: HeapId) -> Option<usize> {
        self.heap.entry(id).ob_size
    }

    /// Replaces the per-object vectorcall pointer, e.g. to disable vectorcall for a
    /// single instance.
    pub fn set_vectorcall(&mut self, id: HeapId, func: Option<crate::types::VectorcallFunc>) {
        self.heap.entry_mut(id).vectorcall = func;
    }

    pub(crate) fn object_vectorcall(&self, id: HeapId) -> Option<crate::types::VectorcallFunc> {
        self.heap.entry(id).vectorcall
    }

    /// Number of allocations charged so far, when the tracker counts them.
    #[must_use]
    pub fn allocation_count(&self) -> Option<usize> {
        self.tracker.allocation_count()
    }

    #[must_use]
    pub fn current_memory_bytes(&self) -> Option<usize> {
        self.tracker.current_memory_bytes()
    }

    /// Charges a transient native buffer (not an object) to the tracker.
    pub(crate) fn charge_buffer(&mut self, size: usize) -> RunResult<()> {
        self.tracker.on_allocate(size).map_err(RunError::from)
    }

    pub(crate) fn refund_buffer(&mut self, size: usize) {
        self.tracker.on_free(size);
    }

    // ---- types ----

    /// The type of a live object (`PyObject_Type`).
    ///
    /// Types live outside the object heap, so the new reference is a strong `Rc` the
    /// caller owns; the object's header keeps its own.
    #[must_use]
    pub fn type_of(&self, id: HeapId) -> Rc<TypeObject> {
        Rc::clone(&self.heap.entry(id).ob_type)
    }

    /// Name of the type of a live object, for messages.
    #[must_use]
    pub fn type_name(&self, id: HeapId) -> &str {
        self.heap.entry(id).ob_type.name()
    }

    // ---- singletons ----

    /// A new reference to `None`.
    #[must_use]
    pub fn none(&self) -> Value {
        self.retain(self.none)
    }

    /// A new reference to `NotImplemented`.
    #[must_use]
    pub fn not_implemented(&self) -> Value {
        self.retain(self.not_implemented)
    }

    /// A new reference to `True` or `False`.
    #[must_use]
    pub fn new_bool(&self, value: bool) -> Value {
        self.retain(if value { self.true_obj } else { self.false_obj })
    }

    #[must_use]
    pub fn none_id(&self) -> HeapId {
        self.none
    }

    #[must_use]
    pub fn not_implemented_id(&self) -> HeapId {
        self.not_implemented
    }

    #[must_use]
    pub fn true_id(&self) -> HeapId {
        self.true_obj
    }

    #[must_use]
    pub fn false_id(&self) -> HeapId {
        self.false_obj
    }

    #[must_use]
    pub fn empty_tuple_id(&self) -> HeapId {
        self.empty_tuple
    }

    // ---- pending error cell ----

    /// Stores `err` as the pending error (`PyErr_SetObject`), replacing any other.
    pub fn err_set(&mut self, err: RunError) {
        self.errors.set(err);
    }

    /// `PyErr_SetString`.
    pub fn err_set_msg(&mut self, exc_type: ExcType, msg: impl Into<String>) {
        self.errors.set(SimpleException::new_msg(exc_type, msg).into());
    }

    #[must_use]
    pub fn err_occurred(&self) -> Option<&RunError> {
        self.errors.occurred()
    }

    /// Takes the pending error out of the cell (`PyErr_Fetch`).
    pub fn err_take(&mut self) -> Option<RunError> {
        self.errors.take()
    }

    pub fn err_clear(&mut self) {
        self.errors.clear();
    }

    /// Puts back an error previously taken with [`Runtime::err_take`] (`PyErr_Restore`).
    pub fn err_restore(&mut self, err: Option<RunError>) {
        match err {
            Some(err) => self.errors.set(err),
            None => self.errors.clear(),
        }
    }

    /// Whether the pending error is catchable and of class `exc_type` or a subclass.
    #[must_use]
    pub fn err_matches(&self, exc_type: ExcType) -> bool {
        self.errors.occurred().is_some_and(|err| err.matches(exc_type))
    }

    /// Converts a result to the sentinel ABI: errors move into the pending cell.
    pub fn into_sentinel<T>(&mut self, result: RunResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.errors.set(err);
                None
            }
        }
    }

    // ---- diagnostics ----

    /// Issues a warning. Warnings are reported to the tracer and never fail.
    pub fn warn(&mut self, category: ExcType, message: &str) {
        self.tracer.on_warning(category, message);
    }

    /// Aborts the process for an invariant violation (`Py_FatalError`).
    pub fn fatal(&mut self, message: &str) -> ! {
        self.tracer.on_fatal(message);
        fatal_error(message)
    }

    /// Reports an attribute access on `obj` whose name is the `str` object `name`.
    pub(crate) fn trace_attr(&mut self, obj: HeapId, name: HeapId, access: AttrAccess) {
        let attr = match self.heap.get(name) {
            HeapData::Str(s) => s.as_str(),
            _ => "",
        };
        Self::emit_attr(&mut *self.tracer, self.heap.entry(obj).ob_type.name(), attr, access);
    }

    /// Like [`Runtime::trace_attr`] for a raw string name.
    pub(crate) fn trace_attr_str(&mut self, obj: HeapId, attr: &str, access: AttrAccess) {
        Self::emit_attr(&mut *self.tracer, self.heap.entry(obj).ob_type.name(), attr, access);
    }

    fn emit_attr(tracer: &mut dyn ProtocolTracer, type_name: &str, attr: &str, access: AttrAccess) {
        match access {
            AttrAccess::Get => tracer.on_getattr(type_name, attr),
            AttrAccess::Set => tracer.on_setattr(type_name, attr, false),
            AttrAccess::Delete => tracer.on_setattr(type_name, attr, true),
        }
    }

    pub(crate) fn trace_call(&mut self, callable: HeapId, nargs: usize, nkwargs: usize) {
        self.tracer
            .on_call(self.heap.entry(callable).ob_type.name(), nargs, nkwargs);
    }

    pub(crate) fn trace_compare(&mut self, left: HeapId, right: HeapId, op: CompareOp) {
        self.tracer.on_compare(
            self.heap.entry(left).ob_type.name(),
            self.heap.entry(right).ob_type.name(),
            op,
        );
    }

    // ---- recursion guard ----

    /// Enters one level of protocol nesting (`Py_EnterRecursiveCall`).
    ///
    /// `context` is appended to the `RecursionError` message, e.g. `" in comparison"`.
    /// Every successful call must be paired with [`Runtime::leave_recursive`].
    pub fn enter_recursive(&mut self, context: &str) -> RunResult<()> {
        if self.tracker.check_recursion_depth(self.depth).is_err() {
            return Err(ExcType::recursion_error(context));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave_recursive(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    #[must_use]
    pub fn recursion_depth(&self) -> usize {
        self.depth
    }
}
