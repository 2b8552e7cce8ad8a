//! Public error taxonomy for the binding layer.
//!
//! Only lifecycle and packaging failures surface as errors. Per-key data
//! operations never error: they return the engine's boolean result or the
//! caller-supplied default, matching the engine's own "keep operating,
//! report failure locally" philosophy. The remaining failure classes —
//! missing symbols and use-after-close — are contract violations and panic.

use crate::ffi::loader::LoadError;
use thiserror::Error;

/// Errors surfaced by the public API.
#[derive(Error, Debug)]
pub enum Error {
    /// An operation that needs the native engine ran before [`crate::initialize`].
    #[error("mmkv runtime is not initialized; call initialize() first")]
    NotInitialized,

    /// [`crate::initialize`] was called a second time. The binding state is
    /// create-once for the life of the process and is never rebound.
    #[error("mmkv runtime is already initialized")]
    AlreadyInitialized,

    /// The native library could not be located, staged, or loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The engine returned a null handle from an open call.
    #[error("engine returned a null handle for store `{id}`")]
    OpenFailed {
        /// The mmap identifier that was requested.
        id: String,
    },
}
