//! Bridging the engine's log callback back into host code.
//!
//! The engine accepts a single process-wide logger at initialization and
//! invokes it synchronously, possibly from threads the host never created.
//! The trampoline below is that logger. It reads the two engine-owned
//! strings without taking ownership, filters against the configured minimum
//! level, and hands off to the installed sink. A panicking sink is contained
//! with `catch_unwind` — unwinding across the C boundary would corrupt the
//! native call stack.

use crate::ffi::marshal;
use crate::types::LogLevel;
use std::ffi::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::RwLock;

/// Host-side destination for engine log lines: `(level, tag, message)`.
///
/// Invoked synchronously from whichever thread the engine logs on, so it
/// must be `Send + Sync`. It must not call back into the binding layer.
pub type LogSink = Box<dyn Fn(LogLevel, &str, &str) + Send + Sync>;

// Process-wide callback state. Installed once at initialization and kept
// for the life of the process; the trampoline pointer handed to the engine
// stays valid because both live in statics, never in per-call storage.
static SINK: RwLock<Option<LogSink>> = RwLock::new(None);
static MIN_LEVEL: AtomicI32 = AtomicI32::new(LogLevel::Info as i32);

/// Install the sink and minimum level. Called from `initialize`, which
/// already enforces the once-per-process lifecycle.
pub(crate) fn install(sink: LogSink, min_level: LogLevel) {
    set_min_level(min_level);
    *SINK.write().unwrap_or_else(|e| e.into_inner()) = Some(sink);
}

/// Adjust the local filter; lines below `level` are dropped before they
/// reach the sink.
pub(crate) fn set_min_level(level: LogLevel) {
    MIN_LEVEL.store(level.as_raw(), Ordering::Relaxed);
}

/// The sink used when the host does not supply one: forward to `tracing`
/// at the matching severity.
pub(crate) fn default_sink() -> LogSink {
    Box::new(|level, tag, message| match level {
        LogLevel::Debug => tracing::debug!(target: "mmkv::engine", "[{tag}] {message}"),
        LogLevel::Info => tracing::info!(target: "mmkv::engine", "[{tag}] {message}"),
        LogLevel::Warning => tracing::warn!(target: "mmkv::engine", "[{tag}] {message}"),
        LogLevel::Error => tracing::error!(target: "mmkv::engine", "[{tag}] {message}"),
        LogLevel::None => {}
    })
}

/// The C-callable logger handed to `mmkv_initialize`.
///
/// Tag and message buffers are owned by the engine for the duration of the
/// upcall; they are read, never freed. The return value is a courtesy
/// "handled" flag the engine ignores.
pub(crate) extern "C" fn log_trampoline(
    level: c_int,
    tag: *const c_char,
    message: *const c_char,
) -> c_int {
    if level < MIN_LEVEL.load(Ordering::Relaxed) {
        return 1;
    }

    let guard = SINK.read().unwrap_or_else(|e| e.into_inner());
    let Some(sink) = guard.as_ref() else {
        return 1;
    };

    let tag = unsafe { marshal::read_borrowed_str(tag) };
    let message = unsafe { marshal::read_borrowed_str(message) };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        sink(LogLevel::from_raw(level), &tag, &message);
    }));
    if outcome.is_err() {
        // Swallowed: a sink failure must not cross back into native code.
        tracing::error!(target: "mmkv", "log sink panicked; engine log line dropped");
    }
    1
}
