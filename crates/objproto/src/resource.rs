use std::fmt;

use crate::exception::{ExcType, RunError, SimpleException};

/// Error returned when a resource limit is exceeded.
///
/// This allows an embedding runtime to enforce strict limits on allocation count,
/// memory usage and protocol recursion depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
    /// Maximum recursion depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
            Self::Recursion { .. } => {
                write!(f, "maximum recursion depth exceeded")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for RunError {
    /// Maps resource error types to Python exception types:
    /// - `Allocation` → `MemoryError`
    /// - `Memory` → `MemoryError`
    /// - `Recursion` → `RecursionError`
    ///
    /// RecursionError stays catchable as in CPython; memory exhaustion may not be
    /// suppressed by a "try" lookup.
    fn from(err: ResourceError) -> Self {
        let exc_type = match err {
            ResourceError::Allocation { .. } | ResourceError::Memory { .. } => ExcType::MemoryError,
            ResourceError::Recursion { .. } => ExcType::RecursionError,
        };
        let exc = SimpleException::new_msg(exc_type, err.to_string());
        if exc_type == ExcType::RecursionError {
            Self::Exc(Box::new(exc))
        } else {
            Self::UncatchableExc(Box::new(exc))
        }
    }
}

/// Trait for tracking resource usage of a runtime.
///
/// The runtime stores its tracker as a trait object so that slot functions, which are
/// plain `fn` pointers, can all share one concrete `Runtime` type.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each tracked allocation (objects and flattened call buffers).
    ///
    /// Returns `Ok(())` if the allocation should proceed, or `Err(ResourceError)`
    /// if a limit would be exceeded.
    ///
    /// # Arguments
    /// * `size` - Approximate size in bytes of the allocation
    fn on_allocate(&mut self, size: usize) -> Result<(), ResourceError>;

    /// Called when a tracked allocation is released.
    ///
    /// # Arguments
    /// * `size` - Size in bytes that was charged by the matching `on_allocate`
    fn on_free(&mut self, size: usize);

    /// Called before entering a re-entrant protocol operation (calls, comparisons).
    ///
    /// # Arguments
    /// * `current_depth` - Current nesting depth (before the new level is entered)
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Returns the total number of allocations tracked, if this tracker records them.
    ///
    /// `LimitedTracker` returns `Some(count)`; `NoLimitTracker` returns `None`.
    fn allocation_count(&self) -> Option<usize> {
        None
    }

    /// Returns the current approximate memory usage in bytes, if tracked.
    ///
    /// `LimitedTracker` returns `Some(bytes)`; `NoLimitTracker` returns `None`.
    fn current_memory_bytes(&self) -> Option<usize> {
        None
    }
}

/// Tracker that imposes no allocation limits.
///
/// Recursion is still bounded by [`DEFAULT_MAX_RECURSION_DEPTH`] so runaway
/// re-entrant comparisons fail with `RecursionError` instead of overflowing the stack.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _size: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _size: usize) {}

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= DEFAULT_MAX_RECURSION_DEPTH {
            Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
                depth: current_depth + 1,
            })
        } else {
            Ok(())
        }
    }
}

/// Configuration for resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
/// Use `ResourceLimits::default()` for no limits, or build custom limits
/// with the builder pattern. Limits can also be loaded from JSON, where missing keys
/// mean "no limit":
///
/// ```
/// let limits = objproto::ResourceLimits::from_json(r#"{"max_allocations": 64}"#).unwrap();
/// assert_eq!(limits.max_allocations, Some(64));
/// assert_eq!(limits.max_memory, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum number of tracked allocations allowed.
    pub max_allocations: Option<usize>,
    /// Maximum tracked memory in bytes (approximate).
    pub max_memory: Option<usize>,
    /// Maximum nesting depth of calls and comparisons.
    pub max_recursion_depth: Option<usize>,
}

/// Recommended maximum recursion depth if not otherwise specified.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

impl ResourceLimits {
    /// Creates a new ResourceLimits with all limits disabled, except max recursion which is set to 1000.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            ..Default::default()
        }
    }

    /// Sets the maximum number of allocations.
    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    /// Sets the maximum memory usage in bytes.
    #[must_use]
    pub fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }

    /// Sets the maximum recursion depth.
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    /// Parses limits from a JSON object such as `{"max_memory": 65536}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A resource tracker that enforces configurable limits.
///
/// Tracks allocation count and memory usage, returning errors when limits are exceeded.
#[derive(Debug)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    /// Total number of allocations made.
    allocation_count: usize,
    /// Current approximate memory usage in bytes.
    current_memory: usize,
}

impl LimitedTracker {
    /// Creates a new LimitedTracker with the given limits.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
            current_memory: 0,
        }
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, size: usize) -> Result<(), ResourceError> {
        // Check allocation count limit
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        // Check memory limit
        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory.saturating_add(size);
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
        }

        self.allocation_count += 1;
        self.current_memory += size;

        Ok(())
    }

    fn on_free(&mut self, size: usize) {
        self.current_memory = self.current_memory.saturating_sub(size);
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_recursion_depth {
            // current_depth is before entering, so the new depth would be current_depth + 1
            if current_depth >= max {
                return Err(ResourceError::Recursion {
                    limit: max,
                    depth: current_depth + 1,
                });
            }
        }
        Ok(())
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.allocation_count)
    }

    fn current_memory_bytes(&self) -> Option<usize> {
        Some(self.current_memory)
    }
}
