//! The generic object protocol: attribute access, calling, comparison, subscription
//! and the other type-independent operations, all implemented as methods on
//! [`Runtime`].
//!
//! [`Runtime`]: crate::Runtime

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

mod attr;
mod call;
mod compare;
mod item;
mod object;
mod resolver;

pub use resolver::{AttributeResolver, MroResolver};

/// Rich comparison operator, numbered like CPython's `Py_LT` .. `Py_GE`.
///
/// Displays and parses as the operator symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum CompareOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

impl CompareOp {
    /// Operator from its C-API number; `None` when out of range.
    #[must_use]
    pub fn from_raw(op: i32) -> Option<Self> {
        Some(match op {
            0 => Self::Lt,
            1 => Self::Le,
            2 => Self::Eq,
            3 => Self::Ne,
            4 => Self::Gt,
            5 => Self::Ge,
            _ => return None,
        })
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        self.into()
    }

    /// The operator to use when the operands are swapped (`_Py_SwappedOp`).
    #[must_use]
    pub fn swapped(self) -> Self {
        match self {
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    /// Whether `ordering` of the left operand relative to the right satisfies the operator.
    #[must_use]
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            Self::Lt => ordering.is_lt(),
            Self::Le => ordering.is_le(),
            Self::Eq => ordering.is_eq(),
            Self::Ne => ordering.is_ne(),
            Self::Gt => ordering.is_gt(),
            Self::Ge => ordering.is_ge(),
        }
    }
}
