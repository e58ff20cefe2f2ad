use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for protocol operations that can raise.
pub type RunResult<T> = Result<T, RunError>;

/// Python exception classes raised by the object protocol layer.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `TypeError` -> "TypeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// System exit exceptions
    BaseException,
    /// primary exception class - matches any exception in isinstance checks.
    Exception,

    // --- LookupError hierarchy ---
    /// Intermediate class for lookup errors.
    LookupError,
    /// Subclass of LookupError.
    KeyError,
    /// Subclass of LookupError.
    IndexError,

    // --- RuntimeError hierarchy ---
    /// Intermediate class for runtime errors.
    RuntimeError,
    /// Subclass of RuntimeError.
    NotImplementedError,
    /// Subclass of RuntimeError.
    RecursionError,

    AttributeError,
    MemoryError,
    OverflowError,
    StopIteration,
    SystemError,
    TypeError,
    ValueError,

    // --- Warning hierarchy ---
    /// Base class for warning categories.
    Warning,
    /// Subclass of Warning.
    DeprecationWarning,
    /// Subclass of Warning.
    RuntimeWarning,
}

impl ExcType {
    /// Checks if this exception type is a subclass of another exception type.
    ///
    /// Implements the part of Python's exception hierarchy this layer can raise, so a
    /// check for `AttributeError` or `LookupError` behaves like an `except` clause would.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        if self == handler_type {
            return true;
        }
        match handler_type {
            Self::BaseException => true,
            Self::Exception => self != Self::BaseException,
            Self::LookupError => matches!(self, Self::KeyError | Self::IndexError),
            Self::RuntimeError => matches!(self, Self::RecursionError | Self::NotImplementedError),
            Self::Warning => matches!(self, Self::DeprecationWarning | Self::RuntimeWarning),
            _ => false,
        }
    }

    /// Creates an AttributeError for when an attribute is not found (GET operation).
    #[must_use]
    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("'{}' object has no attribute '{attr}'", clip(type_name, 50)),
        )
        .into()
    }

    /// Creates an AttributeError for attribute assignment on instances without `__dict__`.
    #[must_use]
    pub(crate) fn attribute_error_no_dict_for_setting(type_name: &str, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}' and no __dict__ for setting new attributes"),
        )
        .into()
    }

    /// Creates an AttributeError for assignment to a method or class constant.
    #[must_use]
    pub(crate) fn attribute_error_read_only(type_name: &str, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("'{type_name}' object attribute '{attr}' is read-only"),
        )
        .into()
    }

    /// Creates an AttributeError for a getset descriptor without the requested accessor.
    ///
    /// `verb` is either "readable" or "writable".
    #[must_use]
    pub(crate) fn attribute_error_descriptor(attr: &str, type_name: &str, verb: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("attribute '{attr}' of '{}' objects is not {verb}", clip(type_name, 100)),
        )
        .into()
    }

    /// TypeError raised when an attribute name is not a `str`.
    #[must_use]
    pub(crate) fn type_error_attr_name(name_type: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("attribute name must be string, not '{}'", clip(name_type, 200)),
        )
        .into()
    }

    /// TypeError raised by `set_attr` on a type with no setter slot at all.
    ///
    /// The wording depends on whether the type has any getter slot and on whether the
    /// operation was a delete or an assignment.
    #[must_use]
    pub(crate) fn type_error_no_setattr(type_name: &str, has_getter: bool, is_delete: bool, attr: &str) -> RunError {
        let action = if is_delete { "del" } else { "assign to" };
        let msg = if has_getter {
            format!(
                "'{}' object has only read-only attributes ({action} .{attr})",
                clip(type_name, 100)
            )
        } else {
            format!("'{}' object has no attributes ({action} .{attr})", clip(type_name, 100))
        };
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_callable(type_name: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("'{}' object is not callable", clip(type_name, 200)),
        )
        .into()
    }

    /// TypeError raised by `call_method` when the looked-up attribute cannot be called.
    #[must_use]
    pub(crate) fn type_error_attr_not_callable(type_name: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("attribute of type '{}' is not callable", clip(type_name, 200)),
        )
        .into()
    }

    #[must_use]
    pub(crate) fn type_error_no_vectorcall(type_name: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("'{}' object does not support vectorcall", clip(type_name, 200)),
        )
        .into()
    }

    /// Creates a TypeError for unhashable types when calling `hash()`.
    ///
    /// This matches Python's error message: `TypeError: unhashable type: 'dict'`
    #[must_use]
    pub(crate) fn type_error_unhashable(type_name: &str) -> RunError {
        SimpleException::new_msg(Self::TypeError, format!("unhashable type: '{type_name}'")).into()
    }

    #[must_use]
    pub(crate) fn type_error_not_iterable(type_name: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("'{}' object is not iterable", clip(type_name, 200)),
        )
        .into()
    }

    #[must_use]
    pub(crate) fn type_error_not_subscriptable(type_name: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("'{}' object is not subscriptable", clip(type_name, 200)),
        )
        .into()
    }

    /// TypeError for item assignment (`is_delete == false`) or deletion on a type
    /// without a `setitem` slot.
    #[must_use]
    pub(crate) fn type_error_no_setitem(type_name: &str, is_delete: bool) -> RunError {
        let what = if is_delete {
            "doesn't support item deletion"
        } else {
            "does not support item assignment"
        };
        SimpleException::new_msg(Self::TypeError, format!("'{}' object {what}", clip(type_name, 200))).into()
    }

    /// Matches CPython: `tuple indices must be integers or slices, not str`
    #[must_use]
    pub(crate) fn type_error_indices(container: &str, key_type: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("{container} indices must be integers or slices, not {}", clip(key_type, 200)),
        )
        .into()
    }

    #[must_use]
    pub(crate) fn index_error_out_of_range(container: &str) -> RunError {
        SimpleException::new_msg(Self::IndexError, format!("{container} index out of range")).into()
    }

    /// KeyError whose message is the repr of the missing key, like `str(KeyError('a'))`.
    #[must_use]
    pub(crate) fn key_error(key_repr: String) -> RunError {
        SimpleException::new_msg(Self::KeyError, key_repr).into()
    }

    #[must_use]
    pub(crate) fn type_error_no_len(type_name: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("object of type '{}' has no len()", clip(type_name, 200)),
        )
        .into()
    }

    /// TypeError for an ordering comparison no operand implements.
    ///
    /// Matches CPython: `'<' not supported between instances of 'A' and 'B'`
    #[must_use]
    pub(crate) fn type_error_unorderable(symbol: &str, left: &str, right: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!(
                "'{symbol}' not supported between instances of '{}' and '{}'",
                clip(left, 100),
                clip(right, 100)
            ),
        )
        .into()
    }

    #[must_use]
    pub(crate) fn type_error_takes_no_arguments(type_name: &str) -> RunError {
        SimpleException::new_msg(Self::TypeError, format!("{type_name} takes no arguments")).into()
    }

    #[must_use]
    pub(crate) fn type_error_no_keywords(func_name: &str) -> RunError {
        SimpleException::new_msg(Self::TypeError, format!("{func_name}() takes no keyword arguments")).into()
    }

    /// Matches CPython: `f() takes 1 positional argument but 2 were given`
    #[must_use]
    pub(crate) fn type_error_arg_count(func_name: &str, expected: usize, given: usize) -> RunError {
        let noun = if expected == 1 { "argument" } else { "arguments" };
        let verb = if given == 1 { "was" } else { "were" };
        SimpleException::new_msg(
            Self::TypeError,
            format!("{func_name}() takes {expected} positional {noun} but {given} {verb} given"),
        )
        .into()
    }

    #[must_use]
    pub(crate) fn type_error_cannot_create(type_name: &str) -> RunError {
        SimpleException::new_msg(
            Self::TypeError,
            format!("cannot create '{}' instances", clip(type_name, 200)),
        )
        .into()
    }

    /// SystemError for internal API misuse, mirroring `PyErr_BadInternalCall`.
    #[must_use]
    pub(crate) fn system_error_bad_call() -> RunError {
        SimpleException::new_msg(Self::SystemError, "bad argument to internal function").into()
    }

    #[must_use]
    pub(crate) fn recursion_error(context: &str) -> RunError {
        SimpleException::new_msg(Self::RecursionError, format!("maximum recursion depth exceeded{context}")).into()
    }
}

/// Truncates `s` to at most `max_chars` characters, like a `%.Ns` printf conversion.
pub(crate) fn clip(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// A raised exception: its class, optional message and the exception that was being
/// handled when it was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleException {
    exc_type: ExcType,
    arg: Option<String>,
    /// Implicit chaining context, e.g. the error a callee left pending when it
    /// also returned a result.
    #[serde(default)]
    context: Option<Box<Self>>,
}

impl SimpleException {
    #[must_use]
    pub fn new(exc_type: ExcType, arg: Option<String>) -> Self {
        Self {
            exc_type,
            arg,
            context: None,
        }
    }

    #[must_use]
    pub fn new_msg(exc_type: ExcType, msg: impl Into<String>) -> Self {
        Self::new(exc_type, Some(msg.into()))
    }

    #[must_use]
    pub fn new_none(exc_type: ExcType) -> Self {
        Self::new(exc_type, None)
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }

    #[must_use]
    pub fn context(&self) -> Option<&Self> {
        self.context.as_deref()
    }

    #[must_use]
    pub fn with_context(mut self, context: Self) -> Self {
        self.context = Some(Box::new(context));
        self
    }
}

impl Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}: {arg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

/// Errors propagated by protocol operations.
///
/// Two variants:
/// - `Exc`: Python exception that callers may inspect, suppress or re-raise
/// - `UncatchableExc`: exception from a resource limit; "try" and "has" helpers never suppress it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunError {
    /// Catchable Python exception (e.g., AttributeError, TypeError).
    Exc(Box<SimpleException>),
    /// Uncatchable Python exception from resource limits (MemoryError).
    UncatchableExc(Box<SimpleException>),
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl RunError {
    #[must_use]
    pub fn exception(&self) -> &SimpleException {
        match self {
            Self::Exc(exc) | Self::UncatchableExc(exc) => exc,
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exception().exc_type()
    }

    /// Whether this error may be suppressed by a "try" style lookup.
    #[must_use]
    pub fn is_catchable(&self) -> bool {
        matches!(self, Self::Exc(_))
    }

    /// True when this is a catchable error whose class is `exc_type` or a subclass of it.
    #[must_use]
    pub fn matches(&self, exc_type: ExcType) -> bool {
        self.is_catchable() && self.exc_type().is_subclass_of(exc_type)
    }

    /// Consumes the error and returns the exception it carries.
    #[must_use]
    pub fn into_exception(self) -> SimpleException {
        match self {
            Self::Exc(exc) | Self::UncatchableExc(exc) => *exc,
        }
    }
}

impl Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.exception().fmt(f)
    }
}

impl std::error::Error for RunError {}

/// The pending-error cell used at the raw native-call boundary.
///
/// Slot functions with a sentinel ABI (a `call` slot or a vectorcall function) report
/// failure by returning `None` and storing the error here. Protocol entry points move
/// it back into a `RunResult` as soon as control returns to them, so the cell is only
/// ever observed between a raw slot returning and its result being validated.
#[derive(Debug, Default)]
pub(crate) struct ErrorState {
    pending: Option<RunError>,
}

impl ErrorState {
    /// Replaces any pending error with `err`.
    pub fn set(&mut self, err: RunError) {
        self.pending = Some(err);
    }

    pub fn occurred(&self) -> Option<&RunError> {
        self.pending.as_ref()
    }

    pub fn take(&mut self) -> Option<RunError> {
        self.pending.take()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("abcdef", 3), "abc");
        assert_eq!(clip("ab", 3), "ab");
        assert_eq!(clip("ééé", 2), "éé");
    }

    #[test]
    fn hierarchy_matches_except_clauses() {
        assert!(ExcType::KeyError.is_subclass_of(ExcType::LookupError));
        assert!(ExcType::RecursionError.is_subclass_of(ExcType::RuntimeError));
        assert!(ExcType::DeprecationWarning.is_subclass_of(ExcType::Warning));
        assert!(!ExcType::TypeError.is_subclass_of(ExcType::AttributeError));
        assert!(ExcType::AttributeError.is_subclass_of(ExcType::Exception));
    }

    #[test]
    fn uncatchable_errors_never_match() {
        let err = RunError::UncatchableExc(Box::new(SimpleException::new_none(ExcType::MemoryError)));
        assert!(!err.matches(ExcType::MemoryError));
        assert_eq!(err.exc_type(), ExcType::MemoryError);
    }

    #[test]
    fn set_attr_message_variants() {
        let err = ExcType::type_error_no_setattr("X", false, true, "a");
        assert_eq!(err.exception().arg(), Some("'X' object has no attributes (del .a)"));
        let err = ExcType::type_error_no_setattr("X", true, false, "a");
        assert_eq!(
            err.exception().arg(),
            Some("'X' object has only read-only attributes (assign to .a)")
        );
    }
}
