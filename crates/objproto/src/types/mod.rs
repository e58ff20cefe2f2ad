//! Type descriptors: slot tables, member definitions and readying.
//!
//! A [`TypeObject`] is shared as `Rc<TypeObject>`; every object header holds one strong
//! reference to its type. Slots are plain `fn` pointers queried in a fixed order by the
//! protocol entry points, with `None` selecting the documented fallback.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
};

use ahash::AHashSet;
use indexmap::IndexMap;

use crate::{
    args::CallArgs,
    exception::{ExcType, RunResult, SimpleException},
    heap::{HeapId, Value},
    protocol::CompareOp,
    runtime::Runtime,
};

pub(crate) mod dict;
pub(crate) mod function;
pub(crate) mod instance;
pub(crate) mod int;
pub(crate) mod object;
pub(crate) mod singletons;
pub(crate) mod str;
pub(crate) mod tuple;

pub use dict::Dict;
pub use function::{BoundMethod, NativeFunction};
pub use instance::Instance;

/// Size charged for an object header (reference count plus type pointer).
pub const OBJECT_HEADER_SIZE: usize = 16;

/// Attribute lookup by `str` object.
pub type GetAttroFn = fn(&mut Runtime, HeapId, HeapId) -> RunResult<Value>;
/// Legacy attribute lookup by raw string.
pub type GetAttrFn = fn(&mut Runtime, HeapId, &str) -> RunResult<Value>;
/// Attribute assignment by `str` object; a `None` value deletes.
pub type SetAttroFn = fn(&mut Runtime, HeapId, HeapId, Option<HeapId>) -> RunResult<()>;
/// Legacy attribute assignment by raw string; a `None` value deletes.
pub type SetAttrFn = fn(&mut Runtime, HeapId, &str, Option<HeapId>) -> RunResult<()>;
/// Raw call slot: `(callable, args tuple, kwargs dict)`.
///
/// Returns `None` to signal failure, with the error stored through
/// [`Runtime::err_set`]. The result is always validated by the caller.
pub type TernaryCallFn = fn(&mut Runtime, HeapId, HeapId, Option<HeapId>) -> Option<Value>;
/// Raw vectorcall function: `(callable, args, nargs, kwnames)`.
///
/// `args` holds `nargs` positional arguments followed by one value per name in the
/// `kwnames` tuple. Failure is signalled like [`TernaryCallFn`].
pub type VectorcallFunc = fn(&mut Runtime, HeapId, &[HeapId], usize, Option<HeapId>) -> Option<Value>;
/// Rich comparison; returns `NotImplemented` when the pair is not supported.
pub type RichCompareFn = fn(&mut Runtime, HeapId, HeapId, CompareOp) -> RunResult<Value>;
/// Subscript lookup: `(container, key)`.
pub type GetItemFn = fn(&mut Runtime, HeapId, HeapId) -> RunResult<Value>;
/// Subscript assignment: `(container, key, value)`; a `None` value deletes.
pub type SetItemFn = fn(&mut Runtime, HeapId, HeapId, Option<HeapId>) -> RunResult<()>;
pub type HashFn = fn(&mut Runtime, HeapId) -> RunResult<i64>;
pub type InquiryFn = fn(&mut Runtime, HeapId) -> RunResult<bool>;
pub type LenFn = fn(&mut Runtime, HeapId) -> RunResult<usize>;
pub type ReprFn = fn(&mut Runtime, HeapId) -> RunResult<String>;
pub type IterFn = fn(&mut Runtime, HeapId) -> RunResult<Value>;
/// Advances an iterator; `Ok(None)` means exhausted.
pub type IterNextFn = fn(&mut Runtime, HeapId) -> RunResult<Option<Value>>;
/// Constructor: `(type, args tuple, kwargs dict)`.
pub type NewFn = fn(&mut Runtime, &Rc<TypeObject>, HeapId, Option<HeapId>) -> RunResult<Value>;
/// Finalizer, called once when the reference count reaches zero, before the payload
/// is released.
pub type DeallocFn = fn(&mut Runtime, HeapId);

/// Native function body used by `builtin_function_or_method` objects.
pub type NativeFn = fn(&mut Runtime, CallArgs<'_>) -> RunResult<Value>;
/// Native method body; receives the bound receiver first.
pub type NativeMethodFn = fn(&mut Runtime, HeapId, CallArgs<'_>) -> RunResult<Value>;
pub type GetterFn = fn(&mut Runtime, HeapId) -> RunResult<Value>;
/// Setter of a getset descriptor; a `None` value deletes.
pub type SetterFn = fn(&mut Runtime, HeapId, Option<HeapId>) -> RunResult<()>;

/// The protocol slot table of a type.
///
/// Every slot is optional. Unset slots are inherited from the base type when the type
/// is built (see [`TypeSpec::build`]); whatever is still unset selects the fallback of
/// the matching protocol operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeSlots {
    pub getattro: Option<GetAttroFn>,
    pub getattr: Option<GetAttrFn>,
    pub setattro: Option<SetAttroFn>,
    pub setattr: Option<SetAttrFn>,
    pub call: Option<TernaryCallFn>,
    /// Positive when instances carry a vectorcall pointer. Zero or negative disables
    /// vectorcall for the type regardless of `vectorcall`.
    pub vectorcall_offset: isize,
    /// Vectorcall pointer stamped into each new instance when `vectorcall_offset > 0`.
    pub vectorcall: Option<VectorcallFunc>,
    pub richcompare: Option<RichCompareFn>,
    pub hash: Option<HashFn>,
    pub bool: Option<InquiryFn>,
    pub len: Option<LenFn>,
    pub getitem: Option<GetItemFn>,
    pub setitem: Option<SetItemFn>,
    pub repr: Option<ReprFn>,
    pub str: Option<ReprFn>,
    pub iter: Option<IterFn>,
    pub iternext: Option<IterNextFn>,
    pub new: Option<NewFn>,
    pub dealloc: Option<DeallocFn>,
}

impl TypeSlots {
    /// Fills unset slots from `base`, following CPython's `inherit_slots`.
    ///
    /// `richcompare` and `hash` are inherited together and only when both are unset,
    /// so a type that defines equality never silently keeps its base's hash.
    fn inherit_from(&mut self, base: &Self) {
        macro_rules! inherit {
            ($($slot:ident),*) => {
                $(if self.$slot.is_none() {
                    self.$slot = base.$slot;
                })*
            };
        }
        inherit!(getattro, getattr, setattro, setattr, bool, len, getitem, setitem, repr, str, iter, iternext, new);
        if self.richcompare.is_none() && self.hash.is_none() {
            self.richcompare = base.richcompare;
            self.hash = base.hash;
        }
        // the vectorcall pointer only travels with an inherited call slot
        if self.call.is_none() {
            self.call = base.call;
            if self.vectorcall_offset == 0 {
                self.vectorcall_offset = base.vectorcall_offset;
                self.vectorcall = self.vectorcall.or(base.vectorcall);
            }
        }
    }
}

/// A method exposed on a type; looked up through an instance it becomes a bound method.
#[derive(Debug, Clone, Copy)]
pub struct MethodDef {
    pub name: &'static str,
    pub func: NativeMethodFn,
}

/// A computed attribute. Getsets are data descriptors: they take precedence over the
/// instance `__dict__` for both lookup and assignment.
#[derive(Debug, Clone, Copy)]
pub struct GetSetDef {
    pub name: &'static str,
    pub get: Option<GetterFn>,
    pub set: Option<SetterFn>,
}

/// Value of a plain class attribute, materialized on every lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstValue {
    None,
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

/// A resolvable member of a readied type.
#[derive(Debug, Clone)]
pub enum Member {
    Method(MethodDef),
    GetSet(GetSetDef),
    Const(ConstValue),
}

impl Member {
    /// Whether this member overrides instance storage.
    #[must_use]
    pub fn is_data_descriptor(&self) -> bool {
        matches!(self, Self::GetSet(_))
    }
}

/// Method-resolution data computed by readying: own members layered over the base's.
#[derive(Debug)]
pub struct ReadyState {
    members: IndexMap<&'static str, Member>,
}

impl ReadyState {
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Describes one object kind.
pub struct TypeObject {
    name: String,
    basic_size: usize,
    item_size: usize,
    base: Option<Rc<TypeObject>>,
    has_dict: bool,
    slots: TypeSlots,
    methods: Vec<MethodDef>,
    getsets: Vec<GetSetDef>,
    consts: Vec<(&'static str, ConstValue)>,
    /// Memoized result of readying; only set on success.
    ready: RefCell<Option<Rc<ReadyState>>>,
}

impl fmt::Debug for TypeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeObject")
            .field("name", &self.name)
            .field("base", &self.base.as_ref().map(|b| b.name()))
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl TypeObject {
    /// Display name used in error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn basic_size(&self) -> usize {
        self.basic_size
    }

    #[must_use]
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Whether instances carry a variable number of items.
    #[must_use]
    pub fn is_var_sized(&self) -> bool {
        self.item_size > 0
    }

    #[must_use]
    pub fn base(&self) -> Option<&Rc<Self>> {
        self.base.as_ref()
    }

    /// Whether instances get an attribute dictionary.
    #[must_use]
    pub fn has_dict(&self) -> bool {
        self.has_dict
    }

    #[must_use]
    pub fn slots(&self) -> &TypeSlots {
        &self.slots
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.borrow().is_some()
    }

    /// Readied member table, or `None` before [`Runtime::type_ready`] succeeded.
    #[must_use]
    pub fn ready_state(&self) -> Option<Rc<ReadyState>> {
        self.ready.borrow().clone()
    }

    /// True when `self` is `other` or derives from it.
    #[must_use]
    pub fn is_subtype(&self, other: &Self) -> bool {
        let mut current = Some(self);
        while let Some(ty) = current {
            if std::ptr::eq(ty, other) {
                return true;
            }
            current = ty.base.as_deref();
        }
        false
    }
}

/// Builder for [`TypeObject`].
///
/// ```
/// use objproto::{Runtime, TypeSpec};
///
/// let rt = Runtime::new();
/// let point = TypeSpec::new("Point").base(&rt.types().object).with_dict().build();
/// assert!(point.has_dict());
/// assert!(point.slots().getattro.is_some());
/// ```
#[derive(Debug)]
pub struct TypeSpec {
    name: String,
    basic_size: usize,
    item_size: usize,
    base: Option<Rc<TypeObject>>,
    has_dict: bool,
    slots: TypeSlots,
    methods: Vec<MethodDef>,
    getsets: Vec<GetSetDef>,
    consts: Vec<(&'static str, ConstValue)>,
}

impl TypeSpec {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            basic_size: OBJECT_HEADER_SIZE,
            item_size: 0,
            base: None,
            has_dict: false,
            slots: TypeSlots::default(),
            methods: Vec::new(),
            getsets: Vec::new(),
            consts: Vec::new(),
        }
    }

    /// Sets the base type. Unset slots are inherited from it, and so is `__dict__`.
    #[must_use]
    pub fn base(mut self, base: &Rc<TypeObject>) -> Self {
        self.base = Some(Rc::clone(base));
        self
    }

    #[must_use]
    pub fn basic_size(mut self, size: usize) -> Self {
        self.basic_size = size;
        self
    }

    /// Makes the type variable-sized with `size` bytes per item.
    #[must_use]
    pub fn item_size(mut self, size: usize) -> Self {
        self.item_size = size;
        self
    }

    #[must_use]
    pub fn with_dict(mut self) -> Self {
        self.has_dict = true;
        self
    }

    #[must_use]
    pub fn slots(mut self, slots: TypeSlots) -> Self {
        self.slots = slots;
        self
    }

    #[must_use]
    pub fn method(mut self, name: &'static str, func: NativeMethodFn) -> Self {
        self.methods.push(MethodDef { name, func });
        self
    }

    #[must_use]
    pub fn getset(mut self, name: &'static str, get: Option<GetterFn>, set: Option<SetterFn>) -> Self {
        self.getsets.push(GetSetDef { name, get, set });
        self
    }

    #[must_use]
    pub fn constant(mut self, name: &'static str, value: ConstValue) -> Self {
        self.consts.push((name, value));
        self
    }

    /// Finishes the type. The result is not ready yet; readying happens on first use.
    #[must_use]
    pub fn build(self) -> Rc<TypeObject> {
        let mut slots = self.slots;
        let mut has_dict = self.has_dict;
        if let Some(base) = &self.base {
            slots.inherit_from(&base.slots);
            has_dict |= base.has_dict;
        }
        Rc::new(TypeObject {
            name: self.name,
            basic_size: self.basic_size,
            item_size: self.item_size,
            base: self.base,
            has_dict,
            slots,
            methods: self.methods,
            getsets: self.getsets,
            consts: self.consts,
            ready: RefCell::new(None),
        })
    }
}

/// The built-in types every runtime starts with.
#[derive(Debug, Clone)]
pub struct BuiltinTypes {
    pub object: Rc<TypeObject>,
    pub none: Rc<TypeObject>,
    pub not_implemented: Rc<TypeObject>,
    pub int: Rc<TypeObject>,
    pub bool: Rc<TypeObject>,
    pub str: Rc<TypeObject>,
    pub tuple: Rc<TypeObject>,
    pub dict: Rc<TypeObject>,
    pub function: Rc<TypeObject>,
    pub method: Rc<TypeObject>,
}

impl BuiltinTypes {
    pub(crate) fn new() -> Self {
        let object = object::object_type();
        let int = int::int_type(&object);
        Self {
            none: singletons::none_type(&object),
            not_implemented: singletons::not_implemented_type(&object),
            bool: int::bool_type(&int),
            str: str::str_type(&object),
            tuple: tuple::tuple_type(&object),
            dict: dict::dict_type(&object),
            function: function::function_type(&object),
            method: function::method_type(&object),
            int,
            object,
        }
    }
}

impl Runtime {
    /// Finalizes a type's member table so generic attribute lookup can use it.
    ///
    /// Readying is idempotent and memoized on the type, and only a successful attempt is
    /// memoized: a failing type fails again on the next use. The base is readied first.
    /// Fails with `TypeError` when a var-sized base's item size is changed, and with
    /// `SystemError` when the type defines one member name twice.
    pub fn type_ready(&mut self, ty: &Rc<TypeObject>) -> RunResult<()> {
        if ty.is_ready() {
            return Ok(());
        }

        let mut members = IndexMap::new();
        if let Some(base) = ty.base() {
            self.type_ready(base)?;
            if base.is_var_sized() && base.item_size() != ty.item_size() {
                return Err(SimpleException::new_msg(
                    ExcType::TypeError,
                    format!(
                        "type '{}' changes the item size of var-sized base '{}'",
                        ty.name(),
                        base.name()
                    ),
                )
                .into());
            }
            if let Some(state) = base.ready_state() {
                members.clone_from(&state.members);
            }
        }

        let own = ty
            .methods
            .iter()
            .map(|m| (m.name, Member::Method(*m)))
            .chain(ty.getsets.iter().map(|g| (g.name, Member::GetSet(*g))))
            .chain(ty.consts.iter().map(|(n, c)| (*n, Member::Const(c.clone()))));
        let mut seen = AHashSet::new();
        for (name, member) in own {
            if !seen.insert(name) {
                return Err(SimpleException::new_msg(
                    ExcType::SystemError,
                    format!("type '{}' defines attribute '{name}' more than once", ty.name()),
                )
                .into());
            }
            members.insert(name, member);
        }

        let count = members.len();
        *ty.ready.borrow_mut() = Some(Rc::new(ReadyState { members }));
        self.tracer_mut().on_type_ready(ty.name(), count);
        Ok(())
    }
}
