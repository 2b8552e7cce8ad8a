//! Value marshaling across the engine boundary.
//!
//! Outbound values are staged in a per-call [`Arena`]: every C string, byte
//! buffer, and pointer array lives exactly as long as the call it was built
//! for, and is released when the arena drops — on success and error paths
//! alike.
//!
//! Inbound values follow one rule: the decode function owns the free. Each
//! engine-owned pointer is copied into a host value and released via the
//! engine's deallocation primitive before the decode returns, so the
//! responsibility never leaks to callers.

use crate::ffi::binder::{FreeFn, RawStringList};
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr, CString};

/// Call-scoped staging area for outbound arguments.
///
/// Dropping the arena invalidates every pointer handed out by its `alloc_*`
/// methods; callers must not let those pointers outlive the native call.
pub(crate) struct Arena {
    strings: Vec<CString>,
    buffers: Vec<Box<[u8]>>,
    ptr_arrays: Vec<Vec<*const c_char>>,
}

impl Arena {
    pub(crate) fn new() -> Self {
        Self {
            strings: Vec::new(),
            buffers: Vec::new(),
            ptr_arrays: Vec::new(),
        }
    }

    /// Copy `s` into a null-terminated buffer and return its address.
    ///
    /// Interior NUL bytes cannot be represented on a C string wire; the
    /// value is truncated at the first one, which is what the engine would
    /// observe anyway.
    pub(crate) fn alloc_str(&mut self, s: &str) -> *const c_char {
        let bytes = match s.as_bytes().iter().position(|&b| b == 0) {
            Some(idx) => &s.as_bytes()[..idx],
            None => s.as_bytes(),
        };
        // No interior NUL remains after the cut above.
        let c_string = unsafe { CString::from_vec_unchecked(bytes.to_vec()) };
        let ptr = c_string.as_ptr();
        self.strings.push(c_string);
        ptr
    }

    /// Like [`Arena::alloc_str`], with `None` encoded as the null sentinel
    /// the ABI uses for absent optionals.
    pub(crate) fn alloc_opt_str(&mut self, s: Option<&str>) -> *const c_char {
        match s {
            Some(s) => self.alloc_str(s),
            None => std::ptr::null(),
        }
    }

    /// Copy raw bytes into the arena; the length travels separately on the
    /// wire.
    pub(crate) fn alloc_bytes(&mut self, bytes: &[u8]) -> *const u8 {
        let boxed: Box<[u8]> = bytes.into();
        let ptr = boxed.as_ptr();
        self.buffers.push(boxed);
        ptr
    }

    /// Build an array of C string pointers plus its count.
    pub(crate) fn alloc_str_array<I, S>(&mut self, items: I) -> (*const *const c_char, usize)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ptrs: Vec<*const c_char> = items
            .into_iter()
            .map(|s| self.alloc_str(s.as_ref()))
            .collect();
        let len = ptrs.len();
        // Moving the Vec into the arena does not move its heap buffer.
        let ptr = ptrs.as_ptr();
        self.ptr_arrays.push(ptrs);
        (ptr, len)
    }

    #[cfg(test)]
    pub(crate) fn allocation_count(&self) -> usize {
        self.strings.len() + self.buffers.len() + self.ptr_arrays.len()
    }
}

/// Decode an engine-owned, null-terminated string: copy, then free exactly
/// once.
///
/// # Safety
///
/// `ptr` must be a valid engine-allocated C string that nothing else will
/// read or free after this call.
pub(crate) unsafe fn take_owned_string(ptr: *mut c_char, free: FreeFn) -> String {
    let value = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    unsafe { free(ptr.cast::<c_void>()) };
    value
}

/// Read a C string the engine retains ownership of. Never freed here; used
/// for callback arguments whose buffers outlive only the upcall itself.
///
/// # Safety
///
/// `ptr` must be null or a valid null-terminated string for the duration of
/// the borrow.
pub(crate) unsafe fn read_borrowed_str<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        return Cow::Borrowed("");
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
}

/// Decode an engine-owned byte buffer of explicit length: copy `len` bytes,
/// then free the pointer.
///
/// # Safety
///
/// `ptr` must be a valid engine allocation of at least `len` bytes with no
/// other owner.
pub(crate) unsafe fn take_owned_bytes(ptr: *mut u8, len: usize, free: FreeFn) -> Vec<u8> {
    let value = if len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec()
    };
    unsafe { free(ptr.cast::<c_void>()) };
    value
}

/// Decode an engine-owned string list struct.
///
/// A null `list` is the absent sentinel and decodes to `None`; a zero count
/// is present-but-empty. Release order matches the allocation shape: copy
/// all strings, free each string, free the pointer array, free the struct.
///
/// # Safety
///
/// `list` must be null or a valid engine-allocated [`RawStringList`] whose
/// items this call may consume.
pub(crate) unsafe fn take_owned_string_list(
    list: *mut RawStringList,
    free: FreeFn,
) -> Option<Vec<String>> {
    if list.is_null() {
        return None;
    }

    let size = unsafe { (*list).size };
    let items = unsafe { (*list).items };
    let mut out = Vec::with_capacity(size);

    if !items.is_null() {
        for i in 0..size {
            let item = unsafe { *items.add(i) };
            if item.is_null() {
                continue;
            }
            out.push(unsafe { CStr::from_ptr(item) }.to_string_lossy().into_owned());
            unsafe { free(item.cast::<c_void>()) };
        }
        unsafe { free(items.cast::<c_void>()) };
    }
    unsafe { free(list.cast::<c_void>()) };

    Some(out)
}
