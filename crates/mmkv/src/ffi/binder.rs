//! Symbol table and call binder.
//!
//! Every native function the engine exports is bound here, once, against a
//! fixed signature table. The table is the single place where C layouts are
//! declared; call sites never infer a signature. Bindings are memoized per
//! symbol: the first use resolves and caches, concurrent first uses observe
//! exactly one resolve, and a missing symbol is a packaging defect that
//! aborts rather than a runtime condition.

use crate::ffi::loader::{EngineLibrary, LoadError};
use std::ffi::{c_char, c_int, c_void};
use std::sync::{Arc, OnceLock};

/// The engine logger callback layout: `(level, tag, message) -> int`. Tag
/// and message stay engine-owned for the duration of the upcall.
pub(crate) type LogCallbackFn = extern "C" fn(c_int, *const c_char, *const c_char) -> c_int;

/// The deallocation primitive matching the engine's allocations. Production
/// binds the C runtime `free`; tests substitute a counting stub.
pub(crate) type FreeFn = unsafe extern "C" fn(*mut c_void);

/// Wire struct returned for string sets and key enumeration: a heap array
/// of heap strings plus a count. Every pointer in it is engine-owned until
/// the decode path frees it.
#[repr(C)]
pub(crate) struct RawStringList {
    pub items: *mut *mut c_char,
    pub size: usize,
}

// Signature table. One alias per distinct C layout; the `native_api!` block
// below maps exported symbol names onto these. Unsigned 32/64-bit values
// travel as same-width signed integers and are reinterpreted at the call
// sites (see `store`).
pub(crate) type InitializeFn = unsafe extern "C" fn(*const c_char, c_int, LogCallbackFn);
pub(crate) type OpenDefaultFn = unsafe extern "C" fn(c_int, *const c_char) -> *mut c_void;
pub(crate) type OpenWithIdFn =
    unsafe extern "C" fn(*const c_char, c_int, *const c_char, *const c_char) -> *mut c_void;
pub(crate) type GetBoolFn = unsafe extern "C" fn(*mut c_void, *const c_char, bool) -> bool;
pub(crate) type SetBoolFn = unsafe extern "C" fn(*mut c_void, *const c_char, bool) -> bool;
pub(crate) type GetI32Fn = unsafe extern "C" fn(*mut c_void, *const c_char, i32) -> i32;
pub(crate) type SetI32Fn = unsafe extern "C" fn(*mut c_void, *const c_char, i32) -> bool;
pub(crate) type GetI64Fn = unsafe extern "C" fn(*mut c_void, *const c_char, i64) -> i64;
pub(crate) type SetI64Fn = unsafe extern "C" fn(*mut c_void, *const c_char, i64) -> bool;
pub(crate) type GetF32Fn = unsafe extern "C" fn(*mut c_void, *const c_char, f32) -> f32;
pub(crate) type SetF32Fn = unsafe extern "C" fn(*mut c_void, *const c_char, f32) -> bool;
pub(crate) type GetF64Fn = unsafe extern "C" fn(*mut c_void, *const c_char, f64) -> f64;
pub(crate) type SetF64Fn = unsafe extern "C" fn(*mut c_void, *const c_char, f64) -> bool;
pub(crate) type GetStringFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> *mut c_char;
pub(crate) type SetStringFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> bool;
pub(crate) type GetBytesFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, *mut usize) -> *mut u8;
pub(crate) type SetBytesFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, *const u8, usize) -> bool;
pub(crate) type GetStringSetFn =
    unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut RawStringList;
pub(crate) type SetStringSetFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, *const *const c_char, usize) -> bool;
pub(crate) type RemoveKeyFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> bool;
pub(crate) type RemoveKeysFn =
    unsafe extern "C" fn(*mut c_void, *const *const c_char, usize) -> bool;
pub(crate) type ContainsKeyFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> bool;
pub(crate) type AllKeysFn = unsafe extern "C" fn(*mut c_void) -> *mut RawStringList;
pub(crate) type HandleToI64Fn = unsafe extern "C" fn(*mut c_void) -> i64;
pub(crate) type HandleUnitFn = unsafe extern "C" fn(*mut c_void);
pub(crate) type ResetCryptKeyFn = unsafe extern "C" fn(*mut c_void, *const c_char);
pub(crate) type MmapIdFn = unsafe extern "C" fn(*mut c_void) -> *mut c_char;
pub(crate) type SyncFn = unsafe extern "C" fn(*mut c_void, bool);
pub(crate) type BackupFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_char) -> bool;
pub(crate) type PageSizeFn = unsafe extern "C" fn() -> i64;
pub(crate) type SetLogLevelFn = unsafe extern "C" fn(c_int);
pub(crate) type VersionFn = unsafe extern "C" fn() -> *mut c_char;
pub(crate) type UnregisterFn = unsafe extern "C" fn();

/// Resolves an exported symbol name to its raw address.
///
/// The production implementation wraps the loaded engine library; tests
/// substitute counting mocks and Rust-defined C ABI stubs.
pub(crate) trait SymbolSource: Send + Sync {
    fn resolve(&self, name: &str) -> Result<*const (), LoadError>;
}

impl SymbolSource for EngineLibrary {
    fn resolve(&self, name: &str) -> Result<*const (), LoadError> {
        // The address is what matters; the typed view is applied by the
        // signature table when the binding is cached.
        unsafe {
            self.library()
                .get::<*const ()>(name.as_bytes())
                .map(|sym| *sym)
                .map_err(|_| LoadError::SymbolNotFound {
                    library: self.path().display().to_string(),
                    symbol: name.to_string(),
                })
        }
    }
}

/// C runtime `free`, the default deallocation primitive for engine-owned
/// returns.
pub(crate) unsafe extern "C" fn c_free(ptr: *mut c_void) {
    unsafe { libc::free(ptr.cast()) }
}

macro_rules! native_api {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty = $symbol:literal ; )+) => {
        /// The memoized binding table for the engine's exported surface.
        ///
        /// One cell per symbol; each is resolved lazily, exactly once, and
        /// shared by every caller for the rest of the process. An absent
        /// symbol means the loaded binary does not match this binding layer
        /// and panics at first use — there is nothing to recover.
        pub(crate) struct NativeApi {
            source: Arc<dyn SymbolSource>,
            free_fn: FreeFn,
            $( $field: OnceLock<$ty>, )+
        }

        impl NativeApi {
            pub(crate) fn new(source: Arc<dyn SymbolSource>, free_fn: FreeFn) -> Self {
                Self {
                    source,
                    free_fn,
                    $( $field: OnceLock::new(), )+
                }
            }

            $(
                $(#[$meta])*
                pub(crate) fn $field(&self) -> $ty {
                    *self.$field.get_or_init(|| {
                        let addr = self.source.resolve($symbol).unwrap_or_else(|e| {
                            panic!(
                                "cannot bind engine symbol `{}`: {e}; \
                                 the loaded library does not match this binding layer",
                                $symbol
                            )
                        });
                        // A resolved symbol address and an `extern "C" fn`
                        // pointer have identical layout; the alias in the
                        // signature table fixes the calling convention.
                        unsafe { std::mem::transmute_copy::<*const (), $ty>(&addr) }
                    })
                }
            )+
        }
    };
}

native_api! {
    initialize: InitializeFn = "mmkv_initialize";
    open_default: OpenDefaultFn = "mmkv_defaultMMKV";
    open_with_id: OpenWithIdFn = "mmkv_mmkvWithID";
    get_bool: GetBoolFn = "getBoolean";
    set_bool: SetBoolFn = "setBoolean";
    get_i32: GetI32Fn = "getInt";
    set_i32: SetI32Fn = "setInt";
    get_i64: GetI64Fn = "getLong";
    set_i64: SetI64Fn = "setLong";
    /// Unsigned 32-bit travels over the signed 32-bit wire.
    get_u32: GetI32Fn = "getUInt";
    set_u32: SetI32Fn = "setUInt";
    /// Unsigned 64-bit travels over the signed 64-bit wire.
    get_u64: GetI64Fn = "getULong";
    set_u64: SetI64Fn = "setULong";
    get_f32: GetF32Fn = "getFloat";
    set_f32: SetF32Fn = "setFloat";
    get_f64: GetF64Fn = "getDouble";
    set_f64: SetF64Fn = "setDouble";
    get_string: GetStringFn = "getString";
    set_string: SetStringFn = "setString";
    get_bytes: GetBytesFn = "getByteArray";
    set_bytes: SetBytesFn = "setByteArray";
    get_string_set: GetStringSetFn = "getStringSet";
    set_string_set: SetStringSetFn = "setStringSet";
    remove_value_for_key: RemoveKeyFn = "mmkv_removeValueForKey";
    remove_values_for_keys: RemoveKeysFn = "mmkv_removeValuesForKeys";
    contains_key: ContainsKeyFn = "mmkv_containsKey";
    all_keys: AllKeysFn = "mmkv_allKeys";
    count: HandleToI64Fn = "mmkv_count";
    actual_size: HandleToI64Fn = "mmkv_actualSize";
    total_size: HandleToI64Fn = "mmkv_totalSize";
    clear_memory_cache: HandleUnitFn = "mmkv_clearMemoryCache";
    clear_all: HandleUnitFn = "mmkv_clearAll";
    close: HandleUnitFn = "mmkv_close";
    check_reset_crypt_key: ResetCryptKeyFn = "mmkv_checkReSetCryptKey";
    mmap_id: MmapIdFn = "mmkv_mmapID";
    sync: SyncFn = "mmkv_sync";
    trim: HandleUnitFn = "mmkv_trim";
    backup_one_to_directory: BackupFn = "mmkv_backupOneToDirectory";
    page_size: PageSizeFn = "mmkv_pageSize";
    set_log_level: SetLogLevelFn = "mmkv_setLogLevel";
    version: VersionFn = "mmkv_version";
    unregister_handler: UnregisterFn = "mmkv_unregisterHandler";
}

impl NativeApi {
    /// The deallocation primitive paired with this table's allocations.
    pub(crate) fn free(&self) -> FreeFn {
        self.free_fn
    }
}
