//! Protocol tracing infrastructure.
//!
//! Provides a trait-based tracing system for the object protocol layer. Every hook has a
//! default no-op implementation, so [`NoopTracer`] costs a virtual call and nothing else.
//!
//! # Architecture
//!
//! The [`ProtocolTracer`] trait defines hook points at key protocol events (allocation,
//! finalization, attribute access, calls, keyword flattening, comparisons, warnings and
//! fatal errors). Concrete implementations collect different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (production default) |
//! | [`StderrTracer`] | Human-readable event log to stderr |
//! | [`ProfilingTracer`] | Per-type call counts and event totals |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis |
//!
//! # Usage
//!
//! The runtime owns its tracer as a trait object. To inspect a tracer after running,
//! share it through `Rc<RefCell<_>>`, which implements the trait by delegation:
//!
//! ```
//! use std::{cell::RefCell, rc::Rc};
//! use objproto::{RecordingTracer, Runtime};
//!
//! let tracer = Rc::new(RefCell::new(RecordingTracer::new()));
//! let mut rt = Runtime::builder().tracer(Rc::clone(&tracer)).build();
//! let s = rt.new_str("x").unwrap();
//! rt.release(s);
//! assert!(tracer.borrow().event_count() >= 2);
//! ```

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{ExcType, heap::HeapId, protocol::CompareOp};

/// Trace event emitted by the protocol layer.
///
/// Used by [`RecordingTracer`] to capture a full trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An object was allocated.
    Allocate {
        /// Name of the object's type.
        type_name: String,
        /// Bytes charged to the resource tracker.
        size: usize,
    },
    /// An object's reference count reached zero and it was finalized.
    Finalize {
        type_name: String,
        id: HeapId,
    },
    /// A type finished readying.
    TypeReady {
        type_name: String,
        /// Number of resolvable members after readying (own plus inherited).
        members: usize,
    },
    /// An attribute lookup was dispatched.
    GetAttr { type_name: String, attr: String },
    /// An attribute assignment or deletion was dispatched.
    SetAttr {
        type_name: String,
        attr: String,
        delete: bool,
    },
    /// A call was dispatched.
    Call {
        type_name: String,
        nargs: usize,
        nkwargs: usize,
    },
    /// A keyword mapping was flattened into an argument buffer.
    KwargsUnpacked { nargs: usize, nkwargs: usize },
    /// A rich comparison was dispatched.
    Compare {
        left: String,
        right: String,
        op: CompareOp,
    },
    /// A warning was issued.
    Warning { category: ExcType, message: String },
    /// A fatal error is about to abort the process.
    Fatal { message: String },
}

/// Trait for protocol tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code. Implementations only override the hooks they care about.
pub trait ProtocolTracer: std::fmt::Debug {
    /// Called after an object is allocated and charged to the resource tracker.
    #[inline]
    fn on_allocate(&mut self, _type_name: &str, _size: usize) {}

    /// Called once per object, after its type's `dealloc` slot ran and before its
    /// payload references are released.
    #[inline]
    fn on_finalize(&mut self, _type_name: &str, _id: HeapId) {}

    /// Called when a type is readied for the first time.
    #[inline]
    fn on_type_ready(&mut self, _type_name: &str, _members: usize) {}

    /// Called when `get_attr` dispatches to a type slot.
    #[inline]
    fn on_getattr(&mut self, _type_name: &str, _attr: &str) {}

    /// Called when `set_attr` dispatches to a type slot. `delete` is true for deletions.
    #[inline]
    fn on_setattr(&mut self, _type_name: &str, _attr: &str, _delete: bool) {}

    /// Called when a call is dispatched.
    ///
    /// # Arguments
    /// * `type_name` - Type of the callable
    /// * `nargs` - Number of positional arguments
    /// * `nkwargs` - Number of keyword arguments
    #[inline]
    fn on_call(&mut self, _type_name: &str, _nargs: usize, _nkwargs: usize) {}

    /// Called when a non-empty keyword mapping was flattened for a vectorcall.
    #[inline]
    fn on_kwargs_unpacked(&mut self, _nargs: usize, _nkwargs: usize) {}

    /// Called when a rich comparison is dispatched.
    #[inline]
    fn on_compare(&mut self, _left: &str, _right: &str, _op: CompareOp) {}

    /// Called when the protocol layer issues a warning.
    ///
    /// Warnings never fail the operation that issued them.
    #[inline]
    fn on_warning(&mut self, _category: ExcType, _message: &str) {}

    /// Called right before the process is aborted by a fatal error.
    #[inline]
    fn on_fatal(&mut self, _message: &str) {}
}

/// Shared tracers delegate to the inner tracer, so callers can keep a handle and
/// inspect results while the runtime owns the other one.
impl<T: ProtocolTracer> ProtocolTracer for Rc<RefCell<T>> {
    fn on_allocate(&mut self, type_name: &str, size: usize) {
        self.borrow_mut().on_allocate(type_name, size);
    }

    fn on_finalize(&mut self, type_name: &str, id: HeapId) {
        self.borrow_mut().on_finalize(type_name, id);
    }

    fn on_type_ready(&mut self, type_name: &str, members: usize) {
        self.borrow_mut().on_type_ready(type_name, members);
    }

    fn on_getattr(&mut self, type_name: &str, attr: &str) {
        self.borrow_mut().on_getattr(type_name, attr);
    }

    fn on_setattr(&mut self, type_name: &str, attr: &str, delete: bool) {
        self.borrow_mut().on_setattr(type_name, attr, delete);
    }

    fn on_call(&mut self, type_name: &str, nargs: usize, nkwargs: usize) {
        self.borrow_mut().on_call(type_name, nargs, nkwargs);
    }

    fn on_kwargs_unpacked(&mut self, nargs: usize, nkwargs: usize) {
        self.borrow_mut().on_kwargs_unpacked(nargs, nkwargs);
    }

    fn on_compare(&mut self, left: &str, right: &str, op: CompareOp) {
        self.borrow_mut().on_compare(left, right, op);
    }

    fn on_warning(&mut self, category: ExcType, message: &str) {
        self.borrow_mut().on_warning(category, message);
    }

    fn on_fatal(&mut self, message: &str) {
        self.borrow_mut().on_fatal(message);
    }
}

// ============================================================================
// NoopTracer: production default
// ============================================================================

/// No-op tracer. All hooks use the trait defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl ProtocolTracer for NoopTracer {}

// ============================================================================
// StderrTracer: human-readable event log
// ============================================================================

/// Tracer that prints a human-readable event log to stderr.
///
/// Output format:
/// ```text
///   +++ ALLOC  str                  size=48
///   ... GETATTR Point.x
///   >>> CALL   builtin_function_or_method nargs=1 kwargs=1
///   --- FREE   str
/// ```
#[derive(Debug)]
pub struct StderrTracer {
    /// Maximum number of events to print before stopping. None = unlimited.
    limit: Option<usize>,
    /// Number of events printed so far.
    count: usize,
    /// Whether we've stopped tracing (hit the limit).
    stopped: bool,
}

impl StderrTracer {
    /// Creates a new stderr tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            limit: None,
            count: 0,
            stopped: false,
        }
    }

    /// Creates a new stderr tracer that stops after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            count: 0,
            stopped: false,
        }
    }

    /// Prints one line unless the limit was reached.
    fn emit(&mut self, line: std::fmt::Arguments<'_>) {
        if self.stopped {
            return;
        }
        eprintln!("{line}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} events) ---");
            self.stopped = true;
        }
    }
}

impl Default for StderrTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolTracer for StderrTracer {
    fn on_allocate(&mut self, type_name: &str, size: usize) {
        self.emit(format_args!("  +++ ALLOC  {type_name:<20} size={size}"));
    }

    fn on_finalize(&mut self, type_name: &str, id: HeapId) {
        self.emit(format_args!("  --- FREE   {type_name:<20} id={}", id.index()));
    }

    fn on_type_ready(&mut self, type_name: &str, members: usize) {
        self.emit(format_args!("  *** READY  {type_name:<20} members={members}"));
    }

    fn on_getattr(&mut self, type_name: &str, attr: &str) {
        self.emit(format_args!("  ... GETATTR {type_name}.{attr}"));
    }

    fn on_setattr(&mut self, type_name: &str, attr: &str, delete: bool) {
        let verb = if delete { "DELATTR" } else { "SETATTR" };
        self.emit(format_args!("  ... {verb} {type_name}.{attr}"));
    }

    fn on_call(&mut self, type_name: &str, nargs: usize, nkwargs: usize) {
        self.emit(format_args!("  >>> CALL   {type_name} nargs={nargs} kwargs={nkwargs}"));
    }

    fn on_kwargs_unpacked(&mut self, nargs: usize, nkwargs: usize) {
        self.emit(format_args!("  ... UNPACK nargs={nargs} kwargs={nkwargs}"));
    }

    fn on_compare(&mut self, left: &str, right: &str, op: CompareOp) {
        self.emit(format_args!("  ... CMP    {left} {} {right}", op.symbol()));
    }

    fn on_warning(&mut self, category: ExcType, message: &str) {
        self.emit(format_args!("  !!! {category}: {message}"));
    }

    fn on_fatal(&mut self, message: &str) {
        // always printed, even past the limit
        eprintln!("  XXX FATAL  {message}");
    }
}

// ============================================================================
// ProfilingTracer: event counters
// ============================================================================

/// Tracer that collects protocol statistics for profiling.
///
/// Tracks:
/// - Per-type call counts (which callables are hot)
/// - Allocation and finalization totals
/// - Attribute lookup and keyword flattening totals
///
/// Retrieve results via [`ProfilingTracer::report`].
#[derive(Debug)]
pub struct ProfilingTracer {
    /// Per-type call counts.
    call_counts: HashMap<String, u64>,
    total_allocations: u64,
    total_bytes: u64,
    total_finalizations: u64,
    total_getattrs: u64,
    total_setattrs: u64,
    total_kwargs_unpacked: u64,
    total_compares: u64,
    total_warnings: u64,
}

/// Summary report from a profiling trace.
#[derive(Debug)]
pub struct ProfilingReport {
    /// Per-type call counts, sorted by frequency (highest first).
    pub call_counts: Vec<(String, u64)>,
    pub total_allocations: u64,
    pub total_bytes: u64,
    pub total_finalizations: u64,
    pub total_getattrs: u64,
    pub total_setattrs: u64,
    /// Calls that had to flatten a keyword mapping.
    pub total_kwargs_unpacked: u64,
    pub total_compares: u64,
    pub total_warnings: u64,
}

impl ProfilingTracer {
    /// Creates a new profiling tracer with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            call_counts: HashMap::new(),
            total_allocations: 0,
            total_bytes: 0,
            total_finalizations: 0,
            total_getattrs: 0,
            total_setattrs: 0,
            total_kwargs_unpacked: 0,
            total_compares: 0,
            total_warnings: 0,
        }
    }

    /// Generates a profiling report from the collected data.
    ///
    /// Call counts are sorted by frequency (most called first), ties by type name.
    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut call_counts: Vec<_> = self.call_counts.iter().map(|(k, &v)| (k.clone(), v)).collect();
        call_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ProfilingReport {
            call_counts,
            total_allocations: self.total_allocations,
            total_bytes: self.total_bytes,
            total_finalizations: self.total_finalizations,
            total_getattrs: self.total_getattrs,
            total_setattrs: self.total_setattrs,
            total_kwargs_unpacked: self.total_kwargs_unpacked,
            total_compares: self.total_compares,
            total_warnings: self.total_warnings,
        }
    }
}

impl Default for ProfilingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolTracer for ProfilingTracer {
    fn on_allocate(&mut self, _type_name: &str, size: usize) {
        self.total_allocations += 1;
        self.total_bytes += size as u64;
    }

    fn on_finalize(&mut self, _type_name: &str, _id: HeapId) {
        self.total_finalizations += 1;
    }

    fn on_getattr(&mut self, _type_name: &str, _attr: &str) {
        self.total_getattrs += 1;
    }

    fn on_setattr(&mut self, _type_name: &str, _attr: &str, _delete: bool) {
        self.total_setattrs += 1;
    }

    fn on_call(&mut self, type_name: &str, _nargs: usize, _nkwargs: usize) {
        *self.call_counts.entry(type_name.to_owned()).or_insert(0) += 1;
    }

    fn on_kwargs_unpacked(&mut self, _nargs: usize, _nkwargs: usize) {
        self.total_kwargs_unpacked += 1;
    }

    fn on_compare(&mut self, _left: &str, _right: &str, _op: CompareOp) {
        self.total_compares += 1;
    }

    fn on_warning(&mut self, _category: ExcType, _message: &str) {
        self.total_warnings += 1;
    }
}

impl std::fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Protocol Profiling Report ===")?;
        writeln!(f, "Allocations:        {} ({} bytes)", self.total_allocations, self.total_bytes)?;
        writeln!(f, "Finalizations:      {}", self.total_finalizations)?;
        writeln!(f, "Attribute gets:     {}", self.total_getattrs)?;
        writeln!(f, "Attribute sets:     {}", self.total_setattrs)?;
        writeln!(f, "Kwargs flattened:   {}", self.total_kwargs_unpacked)?;
        writeln!(f, "Comparisons:        {}", self.total_compares)?;
        writeln!(f, "Warnings:           {}", self.total_warnings)?;
        writeln!(f)?;
        writeln!(f, "--- Calls by type ---")?;
        let total: u64 = self.call_counts.iter().map(|(_, c)| c).sum();
        for (type_name, count) in &self.call_counts {
            let pct = (*count as f64 / total as f64) * 100.0;
            writeln!(f, "  {type_name:<28} {count:>10}  ({pct:>5.1}%)")?;
        }
        Ok(())
    }
}

// ============================================================================
// RecordingTracer: full event recording
// ============================================================================

/// Tracer that records all events for post-mortem analysis.
///
/// Captures every trace event into a `Vec<TraceEvent>`. This is the most
/// expensive tracer (allocates per event), so use it only for debugging
/// specific issues or recording short runs.
#[derive(Debug)]
pub struct RecordingTracer {
    /// All recorded events in chronological order.
    events: Vec<TraceEvent>,
    /// Optional limit on number of events recorded.
    limit: Option<usize>,
}

impl RecordingTracer {
    /// Creates a new recording tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            limit: None,
        }
    }

    /// Creates a new recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Consumes the tracer and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    /// Returns the number of events recorded.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Drops all recorded events, keeping the limit.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_some_and(|l| self.events.len() >= l) {
            return;
        }
        self.events.push(event);
    }
}

impl Default for RecordingTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolTracer for RecordingTracer {
    fn on_allocate(&mut self, type_name: &str, size: usize) {
        self.record(TraceEvent::Allocate {
            type_name: type_name.to_owned(),
            size,
        });
    }

    fn on_finalize(&mut self, type_name: &str, id: HeapId) {
        self.record(TraceEvent::Finalize {
            type_name: type_name.to_owned(),
            id,
        });
    }

    fn on_type_ready(&mut self, type_name: &str, members: usize) {
        self.record(TraceEvent::TypeReady {
            type_name: type_name.to_owned(),
            members,
        });
    }

    fn on_getattr(&mut self, type_name: &str, attr: &str) {
        self.record(TraceEvent::GetAttr {
            type_name: type_name.to_owned(),
            attr: attr.to_owned(),
        });
    }

    fn on_setattr(&mut self, type_name: &str, attr: &str, delete: bool) {
        self.record(TraceEvent::SetAttr {
            type_name: type_name.to_owned(),
            attr: attr.to_owned(),
            delete,
        });
    }

    fn on_call(&mut self, type_name: &str, nargs: usize, nkwargs: usize) {
        self.record(TraceEvent::Call {
            type_name: type_name.to_owned(),
            nargs,
            nkwargs,
        });
    }

    fn on_kwargs_unpacked(&mut self, nargs: usize, nkwargs: usize) {
        self.record(TraceEvent::KwargsUnpacked { nargs, nkwargs });
    }

    fn on_compare(&mut self, left: &str, right: &str, op: CompareOp) {
        self.record(TraceEvent::Compare {
            left: left.to_owned(),
            right: right.to_owned(),
            op,
        });
    }

    fn on_warning(&mut self, category: ExcType, message: &str) {
        self.record(TraceEvent::Warning {
            category,
            message: message.to_owned(),
        });
    }

    fn on_fatal(&mut self, message: &str) {
        self.record(TraceEvent::Fatal {
            message: message.to_owned(),
        });
    }
}
