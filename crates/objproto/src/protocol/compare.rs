//! Rich comparison, truthiness and hashing.

use std::rc::Rc;

use super::CompareOp;
use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapId, Value},
    py_hash,
    runtime::Runtime,
};

impl Runtime {
    /// `PyObject_RichCompare`.
    ///
    /// Tries the reflected operation first when the right operand's type is a proper
    /// subtype of the left's, then the left operand, then the reflected operation. A
    /// slot answering `NotImplemented` passes to the next candidate. When nobody
    /// answers, `==` and `!=` fall back to identity and orderings raise `TypeError`.
    pub fn rich_compare(&mut self, left: HeapId, right: HeapId, op: CompareOp) -> RunResult<Value> {
        self.enter_recursive(" in comparison")?;
        let result = self.do_rich_compare(left, right, op);
        self.leave_recursive();
        result
    }

    fn do_rich_compare(&mut self, left: HeapId, right: HeapId, op: CompareOp) -> RunResult<Value> {
        self.trace_compare(left, right, op);
        let left_ty = self.type_of(left);
        let right_ty = self.type_of(right);

        let mut checked_reverse = false;
        if !Rc::ptr_eq(&left_ty, &right_ty)
            && right_ty.is_subtype(&left_ty)
            && let Some(reflected) = right_ty.slots().richcompare
        {
            checked_reverse = true;
            let result = reflected(self, right, left, op.swapped())?;
            if let Some(result) = self.answered(result) {
                return Ok(result);
            }
        }
        if let Some(forward) = left_ty.slots().richcompare {
            let result = forward(self, left, right, op)?;
            if let Some(result) = self.answered(result) {
                return Ok(result);
            }
        }
        if !checked_reverse && let Some(reflected) = right_ty.slots().richcompare {
            let result = reflected(self, right, left, op.swapped())?;
            if let Some(result) = self.answered(result) {
                return Ok(result);
            }
        }

        match op {
            CompareOp::Eq => Ok(self.new_bool(left == right)),
            CompareOp::Ne => Ok(self.new_bool(left != right)),
            _ => Err(ExcType::type_error_unorderable(
                op.symbol(),
                left_ty.name(),
                right_ty.name(),
            )),
        }
    }

    /// Passes real answers through and swallows `NotImplemented`.
    fn answered(&mut self, result: Value) -> Option<Value> {
        if result.id() == self.not_implemented_id() {
            self.release(result);
            None
        } else {
            Some(result)
        }
    }

    /// `PyObject_RichCompareBool`: the comparison result coerced to a `bool`.
    ///
    /// Identical operands are equal (and not unequal) without consulting any slot.
    pub fn rich_compare_bool(&mut self, left: HeapId, right: HeapId, op: CompareOp) -> RunResult<bool> {
        if left == right {
            match op {
                CompareOp::Eq => return Ok(true),
                CompareOp::Ne => return Ok(false),
                _ => {}
            }
        }
        let result = self.rich_compare(left, right, op)?;
        let truth = self.is_true(result.id());
        self.release(result);
        truth
    }

    /// `PyObject_IsTrue`: the `bool` slot, else a non-zero `len`, else true.
    pub fn is_true(&mut self, obj: HeapId) -> RunResult<bool> {
        if obj == self.true_id() {
            return Ok(true);
        }
        if obj == self.false_id() || obj == self.none_id() {
            return Ok(false);
        }
        let slots = *self.type_of(obj).slots();
        if let Some(bool_slot) = slots.bool {
            bool_slot(self, obj)
        } else if let Some(len) = slots.len {
            Ok(len(self, obj)? > 0)
        } else {
            Ok(true)
        }
    }

    /// `PyObject_Not`.
    pub fn not_(&mut self, obj: HeapId) -> RunResult<bool> {
        self.is_true(obj).map(|truth| !truth)
    }

    /// `PyObject_Hash`: the `hash` slot.
    ///
    /// `object` supplies an identity hash. A type that defines `richcompare` without
    /// `hash` does not inherit it, and its instances are unhashable like those of
    /// [`Runtime::hash_not_implemented`]. The result is never `-1`, which is reserved
    /// for errors at the C boundary.
    pub fn hash(&mut self, obj: HeapId) -> RunResult<i64> {
        match self.type_of(obj).slots().hash {
            Some(hash) => hash(self, obj).map(py_hash::fix_hash),
            None => self.hash_not_implemented(obj),
        }
    }

    /// `PyObject_HashNotImplemented`: the `hash` slot of intentionally unhashable types.
    ///
    /// Always fails with `TypeError: unhashable type: 'X'`.
    pub fn hash_not_implemented(&mut self, obj: HeapId) -> RunResult<i64> {
        Err(ExcType::type_error_unhashable(self.type_name(obj)))
    }
}
