//! Process-wide binding state and the public entry points.
//!
//! The engine is initialized at most once per process: the library is
//! located, loaded, and bound, the log trampoline is registered, and the
//! resulting [`Runtime`] is published through a `OnceLock` that is never
//! torn down. Everything public in this crate that touches the engine goes
//! through [`runtime`], which turns "not initialized yet" into a plain
//! error instead of undefined behavior.

use crate::error::Error;
use crate::ffi::binder::{c_free, NativeApi, SymbolSource};
use crate::ffi::callbacks::{self, LogSink};
use crate::ffi::loader::{self, EngineLibrary, LibraryLocator, LoadError, ENGINE_LIBRARY};
use crate::ffi::marshal::{self, Arena};
use crate::store::Store;
use crate::types::{LogLevel, StoreMode};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

/// The bound engine: the loaded library plus its memoized symbol table.
pub(crate) struct Runtime {
    library: Arc<EngineLibrary>,
    api: NativeApi,
}

impl Runtime {
    pub(crate) fn api(&'static self) -> &'static NativeApi {
        &self.api
    }
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
// Serializes initialization so racing callers get a clean
// first-wins/rest-fail outcome instead of double-loading the library.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Everything [`initialize`] needs beyond the storage root.
pub struct InitOptions {
    root_dir: PathBuf,
    log_level: LogLevel,
    library_path: Option<PathBuf>,
    bundled_library: Option<(PathBuf, String)>,
    search_paths: Vec<PathBuf>,
    log_sink: Option<LogSink>,
}

impl InitOptions {
    /// Options with the defaults: `Info` logging into `tracing`, library
    /// resolved through the standard search paths.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            log_level: LogLevel::Info,
            library_path: None,
            bundled_library: None,
            search_paths: Vec::new(),
            log_sink: None,
        }
    }

    /// Minimum severity forwarded by the engine and the local filter alike.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Load exactly this library file, skipping resolution entirely.
    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Stage a bundled engine binary into the user cache before loading,
    /// gated by its recorded SHA-256 (lowercase hex).
    pub fn bundled_library(mut self, path: impl Into<PathBuf>, sha256: impl Into<String>) -> Self {
        self.bundled_library = Some((path.into(), sha256.into()));
        self
    }

    /// Add a directory consulted before the default search paths.
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Receive engine log lines instead of the default `tracing` sink.
    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Initialize the engine with these options. See [`initialize`].
    pub fn initialize(self) -> Result<(), Error> {
        let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        if RUNTIME.get().is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let path = self.resolve_library_path()?;
        let library = Arc::new(loader::load(&path)?);
        let source: Arc<dyn SymbolSource> = library.clone();
        let api = NativeApi::new(source, c_free);

        callbacks::install(
            self.log_sink.unwrap_or_else(callbacks::default_sink),
            self.log_level,
        );

        let mut arena = Arena::new();
        let c_root = arena.alloc_str(&self.root_dir.to_string_lossy());
        unsafe {
            (api.initialize())(c_root, self.log_level.as_raw(), callbacks::log_trampoline)
        };

        tracing::info!(
            root = %self.root_dir.display(),
            library = %path.display(),
            "mmkv runtime initialized"
        );

        // Cannot fail: the init lock is held and the slot was empty above.
        let _ = RUNTIME.set(Runtime { library, api });
        Ok(())
    }

    fn resolve_library_path(&self) -> Result<PathBuf, LoadError> {
        if let Some(path) = &self.library_path {
            return Ok(path.clone());
        }

        if let Some((bundled, sha256)) = &self.bundled_library {
            return loader::ensure_cached(bundled, sha256);
        }

        let mut locator = LibraryLocator::new();
        for path in self.search_paths.iter().rev() {
            locator.add_search_path(path.clone());
        }
        locator
            .resolve(ENGINE_LIBRARY)
            .ok_or_else(|| LoadError::LibraryNotFound(ENGINE_LIBRARY.to_string()))
    }
}

impl std::fmt::Debug for InitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitOptions")
            .field("root_dir", &self.root_dir)
            .field("log_level", &self.log_level)
            .field("library_path", &self.library_path)
            .field("bundled_library", &self.bundled_library)
            .field("search_paths", &self.search_paths)
            .field("log_sink", &self.log_sink.is_some())
            .finish()
    }
}

/// Initialize the engine with defaults, storing files under `root_dir`.
///
/// Must be called exactly once per process before any store is opened. A
/// second call fails with [`Error::AlreadyInitialized`]; the binding state
/// is never rebound or torn down.
pub fn initialize(root_dir: impl Into<PathBuf>) -> Result<(), Error> {
    InitOptions::new(root_dir).initialize()
}

pub(crate) fn runtime() -> Result<&'static Runtime, Error> {
    RUNTIME.get().ok_or(Error::NotInitialized)
}

/// Where the engine library was loaded from.
pub fn library_path() -> Result<&'static Path, Error> {
    Ok(runtime()?.library.path())
}

/// Open the process-default store in single-process mode.
pub fn default_store() -> Result<Store, Error> {
    default_store_with(StoreMode::default(), None)
}

/// Open the process-default store with an explicit mode and optional
/// encryption key.
pub fn default_store_with(mode: StoreMode, crypt_key: Option<&str>) -> Result<Store, Error> {
    Store::open_default(runtime()?.api(), mode, crypt_key)
}

/// Open (or create) the store identified by `id` in single-process mode.
pub fn store_with_id(id: &str) -> Result<Store, Error> {
    store_with_id_with(id, StoreMode::default(), None, None)
}

/// Open (or create) the store identified by `id`, with mode, optional
/// encryption key, and an optional root directory overriding the one given
/// at initialization.
pub fn store_with_id_with(
    id: &str,
    mode: StoreMode,
    crypt_key: Option<&str>,
    root_path: Option<&str>,
) -> Result<Store, Error> {
    Store::open_with_id(runtime()?.api(), id, mode, crypt_key, root_path)
}

/// The engine's memory page size, the granularity its files grow by.
pub fn page_size() -> Result<u64, Error> {
    let api = runtime()?.api();
    Ok(unsafe { (api.page_size())() as u64 })
}

/// The native engine's version string.
pub fn version() -> Result<String, Error> {
    let api = runtime()?.api();
    let ptr = unsafe { (api.version())() };
    if ptr.is_null() {
        return Ok(String::new());
    }
    Ok(unsafe { marshal::take_owned_string(ptr, api.free()) })
}

/// Raise or lower the log threshold after initialization, on both sides of
/// the boundary at once.
pub fn set_log_level(level: LogLevel) -> Result<(), Error> {
    let api = runtime()?.api();
    unsafe { (api.set_log_level())(level.as_raw()) };
    callbacks::set_min_level(level);
    Ok(())
}

/// Back up one store's files into `dst_dir`. `root_path` overrides the
/// initialization root when the store lives elsewhere.
pub fn backup_to_directory(
    mmap_id: &str,
    dst_dir: &str,
    root_path: Option<&str>,
) -> Result<bool, Error> {
    let api = runtime()?.api();
    let mut arena = Arena::new();
    let c_id = arena.alloc_str(mmap_id);
    let c_dst = arena.alloc_str(dst_dir);
    let c_root = arena.alloc_opt_str(root_path);
    Ok(unsafe { (api.backup_one_to_directory())(c_id, c_dst, c_root) })
}

/// Detach the engine-side log handler. Lines already in flight may still
/// reach the trampoline; the local filter is closed as well so they drop.
pub fn unregister_log_handler() -> Result<(), Error> {
    let api = runtime()?.api();
    unsafe { (api.unregister_handler())() };
    callbacks::set_min_level(LogLevel::None);
    Ok(())
}
