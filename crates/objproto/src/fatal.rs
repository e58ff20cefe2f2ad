//! Unrecoverable invariant violations.
//!
//! A fatal error is not an exception: no caller can observe it, catch it or continue
//! after it. It reports the message the way CPython's `Py_FatalError` does and aborts
//! the process.

/// Prints `Fatal Python error: <message>` to stderr and aborts.
#[cold]
pub(crate) fn fatal_error(message: &str) -> ! {
    eprintln!("Fatal Python error: {message}");
    std::process::abort()
}
