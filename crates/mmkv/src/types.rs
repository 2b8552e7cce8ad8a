//! Engine-facing enums shared across the binding layer.
//!
//! The raw values here are part of the native ABI contract and must not be
//! reordered: log levels are the engine's severity ordinals, store modes are
//! the engine's declared mode bits.

/// Severity levels understood by the native engine's logger.
///
/// The discriminants are the engine's own ordinals and cross the FFI
/// boundary unchanged.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Verbose diagnostics from the engine internals.
    Debug = 0,
    /// Normal operational messages.
    Info = 1,
    /// Recoverable anomalies.
    Warning = 2,
    /// Failures the engine reports but survives.
    Error = 3,
    /// Disables forwarding entirely.
    None = 4,
}

impl LogLevel {
    /// The wire representation passed to native calls.
    pub(crate) fn as_raw(self) -> i32 {
        self as i32
    }

    /// Decode a level received from the engine; out-of-range values are
    /// clamped to `Info` rather than rejected, since a log line is not worth
    /// failing over.
    pub(crate) fn from_raw(raw: i32) -> Self {
        match raw {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warning,
            3 => LogLevel::Error,
            4 => LogLevel::None,
            _ => LogLevel::Info,
        }
    }
}

/// Process-sharing mode for an opened store.
///
/// These are the engine's declared mode values (bit flags), not enum
/// positions.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreMode {
    /// The store is owned by a single process.
    SingleProcess = 1,
    /// The store coordinates access across processes.
    MultiProcess = 2,
}

impl StoreMode {
    pub(crate) fn as_raw(self) -> i32 {
        self as i32
    }
}

impl Default for StoreMode {
    fn default() -> Self {
        StoreMode::SingleProcess
    }
}
