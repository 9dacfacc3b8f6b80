//! Minimal libc++ `std::string` value emulation.
//!
//! The 5-argument GraphicBuffer constructor takes its diagnostic label as a
//! C++ `std::string` by value. Under the Itanium ABI a non-trivially-copyable
//! by-value argument is passed as a pointer to a caller-owned temporary, so
//! the shim only has to reproduce the in-memory representation, not the API.
//!
//! The representation follows libc++'s default string layout on
//! little-endian targets, the one Android's NDK ships: three machine words,
//! where bit 0 of the first byte discriminates the short (inline, size stored
//! as `len << 1`) form from the long (`{cap | 1, len, data}`) form. Data is
//! NUL-terminated in both forms.

use std::ffi::c_void;
use std::ptr;
use std::slice;

#[cfg(target_endian = "big")]
compile_error!("the std::string emulation assumes libc++'s little-endian layout");

const WORDS: usize = 3;
const SHORT_BYTES: usize = WORDS * size_of::<usize>();
// One byte for the packed size, one for the terminator.
const MAX_SHORT_LEN: usize = SHORT_BYTES - 2;

#[repr(C)]
pub(crate) struct CxxString {
    words: [usize; WORDS],
}

impl CxxString {
    /// Builds a string the foreign callee can read. Returns `None` when the
    /// long-form heap block cannot be allocated.
    pub(crate) fn new(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        let mut value = Self { words: [0; WORDS] };
        if bytes.len() <= MAX_SHORT_LEN {
            unsafe {
                let raw = value.words.as_mut_ptr() as *mut u8;
                *raw = (bytes.len() as u8) << 1;
                ptr::copy_nonoverlapping(bytes.as_ptr(), raw.add(1), bytes.len());
                // The terminator is already zero.
            }
        } else {
            // libc++ keeps capacities even so the flag bit stays free.
            let capacity = (bytes.len() + 2) & !1;
            let data = unsafe { libc::malloc(capacity) } as *mut u8;
            if data.is_null() {
                return None;
            }
            unsafe {
                ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len());
                *data.add(bytes.len()) = 0;
            }
            value.words[0] = capacity | 1;
            value.words[1] = bytes.len();
            value.words[2] = data as usize;
        }
        Some(value)
    }

    pub(crate) fn as_ptr(&self) -> *const CxxString {
        self
    }

    fn is_long(&self) -> bool {
        self.words[0] & 1 == 1
    }

    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        unsafe {
            if self.is_long() {
                slice::from_raw_parts(self.words[2] as *const u8, self.words[1])
            } else {
                let raw = self.words.as_ptr() as *const u8;
                slice::from_raw_parts(raw.add(1), (*raw >> 1) as usize)
            }
        }
    }
}

impl Drop for CxxString {
    fn drop(&mut self) {
        if self.is_long() {
            unsafe { libc::free(self.words[2] as *mut c_void) };
        }
    }
}
