//! Locating and loading the native engine library.
//!
//! Two concerns live here, both with a narrow contract: resolve "the engine"
//! to a loadable path (platform naming plus search paths), and stage a
//! bundled binary into the user cache directory gated by a recorded SHA-256.
//! Everything past "give me a loadable library path" belongs to `binder`.

use libloading::Library;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Base name of the engine library, without platform prefix or extension.
pub const ENGINE_LIBRARY: &str = "mmkvc";

/// Environment variable that overrides library resolution entirely.
pub const LIBRARY_PATH_ENV: &str = "MMKV_LIBRARY_PATH";

/// Library loading and staging errors.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Library file not found in any search path.
    #[error("library not found: {0}")]
    LibraryNotFound(String),

    /// Symbol absent from the loaded library. This is a version mismatch
    /// between binding layer and native binary, not a runtime condition.
    #[error("symbol `{symbol}` not found in `{library}`")]
    SymbolNotFound {
        /// Path of the library that was searched.
        library: String,
        /// The missing export.
        symbol: String,
    },

    /// The dynamic loader rejected the file.
    #[error("failed to load library `{path}`: {reason}")]
    LoadFailed {
        /// Path that was handed to the dynamic loader.
        path: PathBuf,
        /// Loader-reported reason.
        reason: String,
    },

    /// The staged copy does not match the recorded checksum.
    #[error("checksum mismatch for `{path}`: expected {expected}, found {found}")]
    ChecksumMismatch {
        /// The file that was hashed.
        path: PathBuf,
        /// Recorded digest, lowercase hex.
        expected: String,
        /// Computed digest, lowercase hex.
        found: String,
    },

    /// Filesystem failure while hashing or staging.
    #[error("i/o error on `{path}`: {source}")]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Platform file name for a library stem: `lib{stem}.so` on Linux,
/// `lib{stem}.dylib` on macOS, `{stem}.dll` on Windows.
pub fn library_file_name(stem: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{stem}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{stem}.dylib")
    } else {
        format!("lib{stem}.so")
    }
}

/// Resolves the engine library to a loadable path.
///
/// Resolution order: explicit search paths (most recently added first), the
/// `MMKV_LIBRARY_PATH` override, the staging cache directory, then platform
/// system paths.
pub struct LibraryLocator {
    search_paths: Vec<PathBuf>,
}

impl LibraryLocator {
    /// Create a locator with the default search paths.
    pub fn new() -> Self {
        Self {
            search_paths: Self::default_search_paths(),
        }
    }

    /// Platform-specific default search paths.
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(dir) = std::env::var(LIBRARY_PATH_ENV) {
            paths.push(PathBuf::from(dir));
        }

        if let Some(cache) = staging_dir() {
            paths.push(cache);
        }

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
        }

        #[cfg(target_os = "windows")]
        {
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{system_root}\\System32")));
            }
        }

        paths
    }

    /// Add a custom search path, consulted before all defaults.
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.insert(0, path);
    }

    /// Resolve a library stem to a full path, or pass an absolute path
    /// through untouched.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_absolute() && direct.exists() {
            return Some(direct.to_path_buf());
        }

        let file_name = library_file_name(name);
        for search_path in &self.search_paths {
            let candidate = search_path.join(&file_name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    #[cfg(test)]
    pub(crate) fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for LibraryLocator {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-user directory where bundled engine binaries are staged.
fn staging_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("mmkv"))
}

/// Stage a bundled engine binary into the default cache directory.
///
/// See [`ensure_cached_in`]; the destination is `{cache_dir}/mmkv/`.
pub fn ensure_cached(bundled: &Path, expected_sha256: &str) -> Result<PathBuf, LoadError> {
    let dir = staging_dir().ok_or_else(|| {
        LoadError::LibraryNotFound("no cache directory available on this platform".to_string())
    })?;
    ensure_cached_in(bundled, expected_sha256, &dir)
}

/// Stage a bundled engine binary into `cache_dir`, gated by checksum.
///
/// If a staged copy already exists and hashes to `expected_sha256`, it is
/// reused without touching `bundled`. Otherwise the bundled file is copied
/// over it and the fresh copy is re-hashed; a surviving mismatch means the
/// packaged artifact itself is wrong and is reported as such.
pub fn ensure_cached_in(
    bundled: &Path,
    expected_sha256: &str,
    cache_dir: &Path,
) -> Result<PathBuf, LoadError> {
    let dest = cache_dir.join(library_file_name(ENGINE_LIBRARY));

    if dest.exists() && sha256_file(&dest)? == expected_sha256 {
        tracing::debug!(path = %dest.display(), "staged engine library is current");
        return Ok(dest);
    }

    fs::create_dir_all(cache_dir).map_err(|source| LoadError::Io {
        path: cache_dir.to_path_buf(),
        source,
    })?;
    fs::copy(bundled, &dest).map_err(|source| LoadError::Io {
        path: bundled.to_path_buf(),
        source,
    })?;

    let found = sha256_file(&dest)?;
    if found != expected_sha256 {
        return Err(LoadError::ChecksumMismatch {
            path: dest,
            expected: expected_sha256.to_string(),
            found,
        });
    }

    tracing::info!(path = %dest.display(), "staged engine library into cache");
    Ok(dest)
}

/// SHA-256 of a file as lowercase hex, streamed in 8 KiB chunks.
pub(crate) fn sha256_file(path: &Path) -> Result<String, LoadError> {
    let mut file = fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    Ok(out)
}

/// A loaded engine library. Write-once: created during initialization and
/// kept alive for the rest of the process so every bound symbol stays valid.
pub struct EngineLibrary {
    path: PathBuf,
    library: Library,
}

impl EngineLibrary {
    /// Where the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn library(&self) -> &Library {
        &self.library
    }
}

/// Load the engine library at `path`.
///
/// # Safety
///
/// Loading a dynamic library executes its initialization code in-process;
/// the checksum gate above is what establishes trust in the file.
pub fn load(path: &Path) -> Result<EngineLibrary, LoadError> {
    let library = unsafe {
        Library::new(path).map_err(|e| LoadError::LoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
    };
    tracing::info!(path = %path.display(), "loaded engine library");
    Ok(EngineLibrary {
        path: path.to_path_buf(),
        library,
    })
}
