//! Rust bindings for the mmkv native key-value engine.
//!
//! The engine is a memory-mapped, process-safe key-value store shipped as a
//! C dynamic library. This crate is the binding layer: it locates and loads
//! that library once per process, binds its exported symbols against a fixed
//! signature table, and wraps each open instance in a [`Store`] whose
//! methods marshal values across the boundary without leaking a byte in
//! either direction.
//!
//! ```no_run
//! use mmkv::{initialize, store_with_id};
//!
//! initialize("/data/mmkv")?;
//! let store = store_with_id("settings")?;
//! store.set_string("theme", "dark");
//! assert_eq!(store.get_string("theme", "light"), "dark");
//! # Ok::<(), mmkv::Error>(())
//! ```
//!
//! Initialization happens exactly once; everything after that is infallible
//! at the boundary by design. Data operations report failure through
//! booleans and caller-supplied defaults, the way the engine itself does.

pub mod error;
pub mod ffi;
mod runtime;
mod store;
mod types;

pub use error::Error;
pub use ffi::callbacks::LogSink;
pub use ffi::loader::LoadError;
pub use runtime::{
    backup_to_directory, default_store, default_store_with, initialize, library_path, page_size,
    set_log_level, store_with_id, store_with_id_with, unregister_log_handler, version,
    InitOptions,
};
pub use store::Store;
pub use types::{LogLevel, StoreMode};

/// Version of this binding layer, not of the native engine; for the latter
/// see [`version`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
