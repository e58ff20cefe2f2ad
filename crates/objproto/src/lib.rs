#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "hash arithmetic narrows on purpose")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior mirrors CPython")]
#![expect(clippy::unnecessary_wraps, reason = "slot signatures are uniform")]
// first to include defer_drop macro
mod heap;

mod args;
pub mod capi;
mod exception;
mod fatal;
mod protocol;
pub mod py_hash;
mod resource;
mod runtime;
pub mod tracer;
pub mod types;

pub use crate::{
    args::{ArgBuilder, BuildValue, CallArgs},
    exception::{ExcType, RunError, RunResult, SimpleException},
    heap::{DropWithRuntime, HeapData, HeapId, RefGuard, Value},
    protocol::{AttributeResolver, CompareOp, MroResolver},
    resource::{
        DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    runtime::{Runtime, RuntimeBuilder},
    tracer::{
        NoopTracer, ProfilingReport, ProfilingTracer, ProtocolTracer, RecordingTracer, StderrTracer, TraceEvent,
    },
    types::{
        BuiltinTypes, ConstValue, GetSetDef, Member, MethodDef, OBJECT_HEADER_SIZE, TypeObject, TypeSlots, TypeSpec,
    },
};
