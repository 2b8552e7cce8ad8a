//! A stand-in engine for tests: the full exported C surface implemented as
//! Rust `extern "C"` functions over an in-process map. Return buffers are
//! `malloc`ed exactly like the real engine's, so the decode paths exercise
//! the same free-after-copy discipline they use in production.

use crate::ffi::binder::{c_free, FreeFn, NativeApi, RawStringList, SymbolSource};
use crate::ffi::loader::LoadError;
use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
enum Stored {
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    StrList(Vec<String>),
}

/// One fake store instance; the handle crossing the boundary is a raw
/// pointer to this.
struct StubStore {
    map: Mutex<HashMap<String, Stored>>,
}

unsafe fn store(handle: *mut c_void) -> &'static StubStore {
    unsafe { &*(handle as *const StubStore) }
}

unsafe fn key_of(ptr: *const c_char) -> String {
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn malloc_cstring(s: &str) -> *mut c_char {
    let bytes = s.as_bytes();
    unsafe {
        let buf = libc::malloc(bytes.len() + 1) as *mut u8;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, bytes.len());
        *buf.add(bytes.len()) = 0;
        buf as *mut c_char
    }
}

// The real engine rejects empty keys with a plain `false`; the stub keeps
// that behavior so the pass-through policy is observable in tests.
fn key_ok(key: &str) -> bool {
    !key.is_empty()
}

macro_rules! stub_scalar {
    ($get:ident, $set:ident, $ty:ty, $variant:ident) => {
        extern "C" fn $get(handle: *mut c_void, key: *const c_char, default: $ty) -> $ty {
            let key = unsafe { key_of(key) };
            match unsafe { store(handle) }.map.lock().unwrap().get(&key) {
                Some(Stored::$variant(v)) => *v,
                _ => default,
            }
        }

        extern "C" fn $set(handle: *mut c_void, key: *const c_char, value: $ty) -> bool {
            let key = unsafe { key_of(key) };
            if !key_ok(&key) {
                return false;
            }
            unsafe { store(handle) }
                .map
                .lock()
                .unwrap()
                .insert(key, Stored::$variant(value));
            true
        }
    };
}

stub_scalar!(stub_get_bool, stub_set_bool, bool, Bool);
stub_scalar!(stub_get_i32, stub_set_i32, i32, I32);
stub_scalar!(stub_get_i64, stub_set_i64, i64, I64);
stub_scalar!(stub_get_f32, stub_set_f32, f32, F32);
stub_scalar!(stub_get_f64, stub_set_f64, f64, F64);

extern "C" fn stub_initialize(_path: *const c_char, _level: c_int, _logger: super::binder::LogCallbackFn) {}

extern "C" fn stub_open_default(_mode: c_int, _crypt_key: *const c_char) -> *mut c_void {
    Box::into_raw(Box::new(StubStore {
        map: Mutex::new(HashMap::new()),
    })) as *mut c_void
}

extern "C" fn stub_open_with_id(
    id: *const c_char,
    mode: c_int,
    crypt_key: *const c_char,
    _root_path: *const c_char,
) -> *mut c_void {
    // An id of "broken" simulates the engine failing to open.
    if unsafe { key_of(id) } == "broken" {
        return std::ptr::null_mut();
    }
    stub_open_default(mode, crypt_key)
}

extern "C" fn stub_get_string(
    handle: *mut c_void,
    key: *const c_char,
    default: *const c_char,
) -> *mut c_char {
    let key = unsafe { key_of(key) };
    match unsafe { store(handle) }.map.lock().unwrap().get(&key) {
        Some(Stored::Str(v)) => malloc_cstring(v),
        // Like the native shim: the default is copied into a fresh
        // engine-owned buffer too.
        _ => malloc_cstring(&unsafe { key_of(default) }),
    }
}

extern "C" fn stub_set_string(
    handle: *mut c_void,
    key: *const c_char,
    value: *const c_char,
) -> bool {
    let key = unsafe { key_of(key) };
    if !key_ok(&key) {
        return false;
    }
    let value = unsafe { key_of(value) };
    unsafe { store(handle) }
        .map
        .lock()
        .unwrap()
        .insert(key, Stored::Str(value));
    true
}

extern "C" fn stub_get_bytes(
    handle: *mut c_void,
    key: *const c_char,
    size: *mut usize,
) -> *mut u8 {
    let key = unsafe { key_of(key) };
    match unsafe { store(handle) }.map.lock().unwrap().get(&key) {
        Some(Stored::Bytes(v)) => unsafe {
            *size = v.len();
            let buf = libc::malloc(v.len().max(1)) as *mut u8;
            std::ptr::copy_nonoverlapping(v.as_ptr(), buf, v.len());
            buf
        },
        _ => std::ptr::null_mut(),
    }
}

extern "C" fn stub_set_bytes(
    handle: *mut c_void,
    key: *const c_char,
    value: *const u8,
    size: usize,
) -> bool {
    let key = unsafe { key_of(key) };
    if !key_ok(&key) {
        return false;
    }
    let bytes = if size == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(value, size) }.to_vec()
    };
    unsafe { store(handle) }
        .map
        .lock()
        .unwrap()
        .insert(key, Stored::Bytes(bytes));
    true
}

fn malloc_string_list(items: &[String]) -> *mut RawStringList {
    unsafe {
        let list = libc::malloc(std::mem::size_of::<RawStringList>()) as *mut RawStringList;
        (*list).size = items.len();
        (*list).items = if items.is_empty() {
            std::ptr::null_mut()
        } else {
            let arr =
                libc::malloc(items.len() * std::mem::size_of::<*mut c_char>()) as *mut *mut c_char;
            for (i, item) in items.iter().enumerate() {
                *arr.add(i) = malloc_cstring(item);
            }
            arr
        };
        list
    }
}

extern "C" fn stub_get_string_set(handle: *mut c_void, key: *const c_char) -> *mut RawStringList {
    let key = unsafe { key_of(key) };
    match unsafe { store(handle) }.map.lock().unwrap().get(&key) {
        Some(Stored::StrList(items)) => malloc_string_list(items),
        _ => std::ptr::null_mut(),
    }
}

extern "C" fn stub_set_string_set(
    handle: *mut c_void,
    key: *const c_char,
    values: *const *const c_char,
    size: usize,
) -> bool {
    let key = unsafe { key_of(key) };
    if !key_ok(&key) {
        return false;
    }
    // A null array means "remove the key", mirroring the native shim.
    if values.is_null() {
        return unsafe { store(handle) }.map.lock().unwrap().remove(&key).is_some();
    }
    let mut items = Vec::with_capacity(size);
    for i in 0..size {
        let item = unsafe { *values.add(i) };
        if !item.is_null() {
            items.push(unsafe { key_of(item) });
        }
    }
    unsafe { store(handle) }
        .map
        .lock()
        .unwrap()
        .insert(key, Stored::StrList(items));
    true
}

extern "C" fn stub_remove_value_for_key(handle: *mut c_void, key: *const c_char) -> bool {
    let key = unsafe { key_of(key) };
    if !key_ok(&key) {
        return false;
    }
    unsafe { store(handle) }.map.lock().unwrap().remove(&key).is_some()
}

extern "C" fn stub_remove_values_for_keys(
    handle: *mut c_void,
    keys: *const *const c_char,
    size: usize,
) -> bool {
    let mut map = unsafe { store(handle) }.map.lock().unwrap();
    for i in 0..size {
        let key = unsafe { key_of(*keys.add(i)) };
        map.remove(&key);
    }
    true
}

extern "C" fn stub_contains_key(handle: *mut c_void, key: *const c_char) -> bool {
    let key = unsafe { key_of(key) };
    unsafe { store(handle) }.map.lock().unwrap().contains_key(&key)
}

extern "C" fn stub_all_keys(handle: *mut c_void) -> *mut RawStringList {
    let mut keys: Vec<String> = unsafe { store(handle) }
        .map
        .lock()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    keys.sort();
    malloc_string_list(&keys)
}

extern "C" fn stub_count(handle: *mut c_void) -> i64 {
    unsafe { store(handle) }.map.lock().unwrap().len() as i64
}

extern "C" fn stub_actual_size(_handle: *mut c_void) -> i64 {
    16 * 1024
}

extern "C" fn stub_total_size(_handle: *mut c_void) -> i64 {
    64 * 1024
}

extern "C" fn stub_clear_memory_cache(_handle: *mut c_void) {}

extern "C" fn stub_clear_all(handle: *mut c_void) {
    unsafe { store(handle) }.map.lock().unwrap().clear();
}

extern "C" fn stub_close(handle: *mut c_void) {
    // Frees the instance; a second close on the same handle is the
    // double-free the wrapper exists to prevent.
    drop(unsafe { Box::from_raw(handle as *mut StubStore) });
}

extern "C" fn stub_check_reset_crypt_key(_handle: *mut c_void, _key: *const c_char) {}

extern "C" fn stub_mmap_id(_handle: *mut c_void) -> *mut c_char {
    malloc_cstring("stub.store")
}

extern "C" fn stub_sync(_handle: *mut c_void, _block: bool) {}

extern "C" fn stub_trim(_handle: *mut c_void) {}

extern "C" fn stub_backup(
    _mmap_id: *const c_char,
    _dst_dir: *const c_char,
    _root_path: *const c_char,
) -> bool {
    true
}

extern "C" fn stub_page_size() -> i64 {
    4096
}

extern "C" fn stub_set_log_level(_level: c_int) {}

extern "C" fn stub_version() -> *mut c_char {
    malloc_cstring("1.3.14-stub")
}

extern "C" fn stub_unregister_handler() {}

/// Symbol source backed by the stub functions above; counts resolves so
/// memoization is observable.
pub(crate) struct StubSource {
    pub(crate) resolves: AtomicUsize,
}

impl StubSource {
    pub(crate) fn new() -> Self {
        Self {
            resolves: AtomicUsize::new(0),
        }
    }
}

impl SymbolSource for StubSource {
    fn resolve(&self, name: &str) -> Result<*const (), LoadError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let addr: *const () = match name {
            "mmkv_initialize" => stub_initialize as *const (),
            "mmkv_defaultMMKV" => stub_open_default as *const (),
            "mmkv_mmkvWithID" => stub_open_with_id as *const (),
            "getBoolean" => stub_get_bool as *const (),
            "setBoolean" => stub_set_bool as *const (),
            "getInt" => stub_get_i32 as *const (),
            "setInt" => stub_set_i32 as *const (),
            "getLong" => stub_get_i64 as *const (),
            "setLong" => stub_set_i64 as *const (),
            "getUInt" => stub_get_i32 as *const (),
            "setUInt" => stub_set_i32 as *const (),
            "getULong" => stub_get_i64 as *const (),
            "setULong" => stub_set_i64 as *const (),
            "getFloat" => stub_get_f32 as *const (),
            "setFloat" => stub_set_f32 as *const (),
            "getDouble" => stub_get_f64 as *const (),
            "setDouble" => stub_set_f64 as *const (),
            "getString" => stub_get_string as *const (),
            "setString" => stub_set_string as *const (),
            "getByteArray" => stub_get_bytes as *const (),
            "setByteArray" => stub_set_bytes as *const (),
            "getStringSet" => stub_get_string_set as *const (),
            "setStringSet" => stub_set_string_set as *const (),
            "mmkv_removeValueForKey" => stub_remove_value_for_key as *const (),
            "mmkv_removeValuesForKeys" => stub_remove_values_for_keys as *const (),
            "mmkv_containsKey" => stub_contains_key as *const (),
            "mmkv_allKeys" => stub_all_keys as *const (),
            "mmkv_count" => stub_count as *const (),
            "mmkv_actualSize" => stub_actual_size as *const (),
            "mmkv_totalSize" => stub_total_size as *const (),
            "mmkv_clearMemoryCache" => stub_clear_memory_cache as *const (),
            "mmkv_clearAll" => stub_clear_all as *const (),
            "mmkv_close" => stub_close as *const (),
            "mmkv_checkReSetCryptKey" => stub_check_reset_crypt_key as *const (),
            "mmkv_mmapID" => stub_mmap_id as *const (),
            "mmkv_sync" => stub_sync as *const (),
            "mmkv_trim" => stub_trim as *const (),
            "mmkv_backupOneToDirectory" => stub_backup as *const (),
            "mmkv_pageSize" => stub_page_size as *const (),
            "mmkv_setLogLevel" => stub_set_log_level as *const (),
            "mmkv_version" => stub_version as *const (),
            "mmkv_unregisterHandler" => stub_unregister_handler as *const (),
            _ => {
                return Err(LoadError::SymbolNotFound {
                    library: "stub-engine".to_string(),
                    symbol: name.to_string(),
                })
            }
        };
        Ok(addr)
    }
}

/// A leaked `NativeApi` over the stub engine, using the C runtime `free`.
pub(crate) fn leaked_api() -> &'static NativeApi {
    leaked_api_with_free(c_free)
}

/// Same, with a caller-chosen free primitive (e.g. a counting stub).
pub(crate) fn leaked_api_with_free(free: FreeFn) -> &'static NativeApi {
    Box::leak(Box::new(NativeApi::new(Arc::new(StubSource::new()), free)))
}
