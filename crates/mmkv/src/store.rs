//! The handle wrapper around one open engine instance.
//!
//! A [`Store`] pairs an opaque native handle with the binding table that
//! produced it. Every operation stages its arguments in a call-scoped
//! arena, invokes the bound symbol, and decodes engine-owned returns with
//! the free-after-copy discipline from [`crate::ffi::marshal`]. The engine
//! serializes access to an instance internally, so a `Store` is shared
//! freely across threads; the only state the wrapper adds is the closed
//! flag that keeps release exactly-once.

use crate::error::Error;
use crate::ffi::binder::NativeApi;
use crate::ffi::marshal::{self, Arena};
use crate::types::StoreMode;
use std::collections::HashSet;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};

/// One open key-value instance.
///
/// Values written under a key replace whatever type was stored before;
/// reads of a mismatched type return the caller's default. Dropping the
/// store closes it if [`Store::close`] was not called first.
pub struct Store {
    api: &'static NativeApi,
    handle: *mut c_void,
    closed: AtomicBool,
}

// The handle is a pointer to engine-owned state guarded by the engine's
// own instance lock.
unsafe impl Send for Store {}
unsafe impl Sync for Store {}

impl Store {
    pub(crate) fn open_default(
        api: &'static NativeApi,
        mode: StoreMode,
        crypt_key: Option<&str>,
    ) -> Result<Self, Error> {
        let mut arena = Arena::new();
        let crypt_key = arena.alloc_opt_str(crypt_key);
        let handle = unsafe { (api.open_default())(mode.as_raw(), crypt_key) };
        Self::from_handle(api, handle, "mmkv.default")
    }

    pub(crate) fn open_with_id(
        api: &'static NativeApi,
        id: &str,
        mode: StoreMode,
        crypt_key: Option<&str>,
        root_path: Option<&str>,
    ) -> Result<Self, Error> {
        let mut arena = Arena::new();
        let c_id = arena.alloc_str(id);
        let crypt_key = arena.alloc_opt_str(crypt_key);
        let root_path = arena.alloc_opt_str(root_path);
        let handle =
            unsafe { (api.open_with_id())(c_id, mode.as_raw(), crypt_key, root_path) };
        Self::from_handle(api, handle, id)
    }

    fn from_handle(api: &'static NativeApi, handle: *mut c_void, id: &str) -> Result<Self, Error> {
        if handle.is_null() {
            return Err(Error::OpenFailed { id: id.to_string() });
        }
        Ok(Self {
            api,
            handle,
            closed: AtomicBool::new(false),
        })
    }

    fn guard(&self) -> *mut c_void {
        if self.closed.load(Ordering::Acquire) {
            panic!("store used after close");
        }
        self.handle
    }

    pub fn set_bool(&self, key: &str, value: bool) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.set_bool())(handle, key, value) }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.get_bool())(handle, key, default) }
    }

    pub fn set_i32(&self, key: &str, value: i32) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.set_i32())(handle, key, value) }
    }

    pub fn get_i32(&self, key: &str, default: i32) -> i32 {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.get_i32())(handle, key, default) }
    }

    pub fn set_i64(&self, key: &str, value: i64) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.set_i64())(handle, key, value) }
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.get_i64())(handle, key, default) }
    }

    /// Unsigned 32-bit values cross the boundary as same-width signed
    /// integers; the bit pattern is preserved end to end.
    pub fn set_u32(&self, key: &str, value: u32) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.set_u32())(handle, key, value as i32) }
    }

    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.get_u32())(handle, key, default as i32) as u32 }
    }

    pub fn set_u64(&self, key: &str, value: u64) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.set_u64())(handle, key, value as i64) }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.get_u64())(handle, key, default as i64) as u64 }
    }

    pub fn set_f32(&self, key: &str, value: f32) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.set_f32())(handle, key, value) }
    }

    pub fn get_f32(&self, key: &str, default: f32) -> f32 {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.get_f32())(handle, key, default) }
    }

    pub fn set_f64(&self, key: &str, value: f64) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.set_f64())(handle, key, value) }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        unsafe { (self.api.get_f64())(handle, key, default) }
    }

    pub fn set_string(&self, key: &str, value: &str) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let key = arena.alloc_str(key);
        let value = arena.alloc_str(value);
        unsafe { (self.api.set_string())(handle, key, value) }
    }

    /// The engine hands back a fresh copy whether the key is present or
    /// not; either way the copy is decoded and released here.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        let handle = self.guard();
        let mut arena = Arena::new();
        let c_key = arena.alloc_str(key);
        let c_default = arena.alloc_str(default);
        let ptr = unsafe { (self.api.get_string())(handle, c_key, c_default) };
        if ptr.is_null() {
            return default.to_string();
        }
        unsafe { marshal::take_owned_string(ptr, self.api.free()) }
    }

    pub fn set_bytes(&self, key: &str, value: &[u8]) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let c_key = arena.alloc_str(key);
        let c_value = arena.alloc_bytes(value);
        unsafe { (self.api.set_bytes())(handle, c_key, c_value, value.len()) }
    }

    /// `None` from the engine means the key is absent, and the caller's
    /// default is returned as-is. An empty stored value decodes to
    /// `Some(vec![])`.
    pub fn get_bytes(&self, key: &str, default: Option<&[u8]>) -> Option<Vec<u8>> {
        let handle = self.guard();
        let mut arena = Arena::new();
        let c_key = arena.alloc_str(key);
        let mut size: usize = 0;
        let ptr = unsafe { (self.api.get_bytes())(handle, c_key, &mut size) };
        if ptr.is_null() {
            return default.map(<[u8]>::to_vec);
        }
        Some(unsafe { marshal::take_owned_bytes(ptr, size, self.api.free()) })
    }

    /// `None` removes the key, matching the engine's null-array contract.
    pub fn set_string_set<S: AsRef<str>>(&self, key: &str, values: Option<&[S]>) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let c_key = arena.alloc_str(key);
        match values {
            Some(values) => {
                let (items, size) = arena.alloc_str_array(values.iter().map(AsRef::as_ref));
                unsafe { (self.api.set_string_set())(handle, c_key, items, size) }
            }
            None => unsafe {
                (self.api.set_string_set())(handle, c_key, std::ptr::null(), 0)
            },
        }
    }

    /// An absent key yields the caller's default; a stored-but-empty set
    /// yields `Some` of an empty set. Duplicates stored by other writers
    /// collapse here.
    pub fn get_string_set(
        &self,
        key: &str,
        default: Option<HashSet<String>>,
    ) -> Option<HashSet<String>> {
        let handle = self.guard();
        let mut arena = Arena::new();
        let c_key = arena.alloc_str(key);
        let list = unsafe { (self.api.get_string_set())(handle, c_key) };
        match unsafe { marshal::take_owned_string_list(list, self.api.free()) } {
            Some(items) => Some(items.into_iter().collect()),
            None => default,
        }
    }

    pub fn remove_value_for_key(&self, key: &str) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let c_key = arena.alloc_str(key);
        unsafe { (self.api.remove_value_for_key())(handle, c_key) }
    }

    pub fn remove_values_for_keys<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        let handle = self.guard();
        if keys.is_empty() {
            return true;
        }
        let mut arena = Arena::new();
        let (items, size) = arena.alloc_str_array(keys.iter().map(AsRef::as_ref));
        unsafe { (self.api.remove_values_for_keys())(handle, items, size) }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let handle = self.guard();
        let mut arena = Arena::new();
        let c_key = arena.alloc_str(key);
        unsafe { (self.api.contains_key())(handle, c_key) }
    }

    pub fn all_keys(&self) -> Vec<String> {
        let handle = self.guard();
        let list = unsafe { (self.api.all_keys())(handle) };
        unsafe { marshal::take_owned_string_list(list, self.api.free()) }.unwrap_or_default()
    }

    pub fn count(&self) -> u64 {
        let handle = self.guard();
        unsafe { (self.api.count())(handle) as u64 }
    }

    /// Bytes of the file actually used by live entries.
    pub fn actual_size(&self) -> u64 {
        let handle = self.guard();
        unsafe { (self.api.actual_size())(handle) as u64 }
    }

    /// Bytes of the backing file as mapped, including reclaimable space.
    pub fn total_size(&self) -> u64 {
        let handle = self.guard();
        unsafe { (self.api.total_size())(handle) as u64 }
    }

    pub fn clear_memory_cache(&self) {
        let handle = self.guard();
        unsafe { (self.api.clear_memory_cache())(handle) }
    }

    pub fn clear_all(&self) {
        let handle = self.guard();
        unsafe { (self.api.clear_all())(handle) }
    }

    /// Re-key the instance; `None` drops encryption.
    pub fn check_reset_crypt_key(&self, crypt_key: Option<&str>) {
        let handle = self.guard();
        let mut arena = Arena::new();
        let c_key = arena.alloc_opt_str(crypt_key);
        unsafe { (self.api.check_reset_crypt_key())(handle, c_key) }
    }

    pub fn mmap_id(&self) -> String {
        let handle = self.guard();
        let ptr = unsafe { (self.api.mmap_id())(handle) };
        if ptr.is_null() {
            return String::new();
        }
        unsafe { marshal::take_owned_string(ptr, self.api.free()) }
    }

    /// Synchronous flush to disk.
    pub fn flush(&self) {
        let handle = self.guard();
        unsafe { (self.api.sync())(handle, true) }
    }

    /// Kick off a flush without waiting for it.
    pub fn flush_async(&self) {
        let handle = self.guard();
        unsafe { (self.api.sync())(handle, false) }
    }

    /// Shrink the backing file to fit the live contents.
    pub fn trim(&self) {
        let handle = self.guard();
        unsafe { (self.api.trim())(handle) }
    }

    /// Release the native instance. Safe to call more than once; only the
    /// first call reaches the engine, and any later operation on this
    /// wrapper panics.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        unsafe { (self.api.close())(self.handle) }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("handle", &self.handle)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
