//! Android native-buffer structure layouts.
//!
//! These mirror the platform's `system/window.h` / `nativebase.h` headers
//! byte for byte. Nothing here is defined by the shim itself; the shim only
//! assumes these layouts and verifies the assumption at runtime through the
//! magic and version fields of [`NativeBase`].

use core::ffi::{c_int, c_void};
use core::mem::size_of;

/// `ANDROID_NATIVE_BUFFER_MAGIC`: the bytes `"_bfr"` packed big-endian.
pub const NATIVE_BASE_MAGIC: u32 = 0x5f62_6672;

/// Expected `NativeBase::version` for a native window buffer. The platform
/// stores `sizeof(ANativeWindowBuffer)` here, which depends on pointer width.
pub const EXPECTED_NATIVE_BUFFER_VERSION: u32 = if size_of::<usize>() == 4 { 96 } else { 168 };

/// Reference-count hook owned by the foreign object itself. The shim never
/// counts references on its own; it only calls through these.
pub type RefHook = Option<unsafe extern "C" fn(*mut NativeBase)>;

/// `android_native_base_t`: the common header embedded in every
/// reference-counted native object.
#[repr(C)]
pub struct NativeBase {
    pub magic: u32,
    pub version: u32,
    pub reserved: [*mut c_void; 4],
    pub inc_ref: RefHook,
    pub dec_ref: RefHook,
}

/// `ANativeWindowBuffer` (aka `android_native_buffer_t`).
///
/// Only the fields through `usage` are ever read or written by the shim; the
/// trailing fields exist so `size_of` matches the platform's version stamp.
#[repr(C)]
pub struct NativeWindowBuffer {
    pub common: NativeBase,
    pub width: c_int,
    pub height: c_int,
    pub stride: c_int,
    pub format: c_int,
    pub usage: c_int,
    pub reserved: [*mut c_void; 2],
    pub handle: *const c_void,
    pub reserved_proc: [*mut c_void; 8],
}

/// `android_ycbcr`: output of the planar lock call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AndroidYcbcr {
    pub y: *mut c_void,
    pub cb: *mut c_void,
    pub cr: *mut c_void,
    pub ystride: usize,
    pub cstride: usize,
    pub chroma_step: usize,
    pub reserved: [u32; 8],
}

impl Default for AndroidYcbcr {
    fn default() -> Self {
        Self {
            y: core::ptr::null_mut(),
            cb: core::ptr::null_mut(),
            cr: core::ptr::null_mut(),
            ystride: 0,
            cstride: 0,
            chroma_step: 0,
            reserved: [0; 8],
        }
    }
}

/// `AHardwareBuffer_Desc` from the standardized NDK buffer API.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct HardwareBufferDesc {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: u32,
    pub usage: u64,
    pub stride: u32,
    pub rfu0: u32,
    pub rfu1: u64,
}

/// `ARect`.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn base_header_layout() {
        let word = size_of::<usize>();
        assert_eq!(offset_of!(NativeBase, magic), 0);
        assert_eq!(offset_of!(NativeBase, version), 4);
        assert_eq!(offset_of!(NativeBase, inc_ref), 8 + 4 * word);
        assert_eq!(size_of::<NativeBase>(), 8 + 6 * word);
    }

    #[test]
    fn window_buffer_size_matches_version_stamp() {
        // The platform writes sizeof(ANativeWindowBuffer) into the version
        // field, so a layout drift here would also break validation.
        assert_eq!(
            size_of::<NativeWindowBuffer>(),
            EXPECTED_NATIVE_BUFFER_VERSION as usize
        );
    }

    #[test]
    fn dimension_fields_follow_the_header() {
        assert_eq!(offset_of!(NativeWindowBuffer, width), size_of::<NativeBase>());
        assert_eq!(
            offset_of!(NativeWindowBuffer, usage),
            size_of::<NativeBase>() + 4 * size_of::<c_int>()
        );
    }

    #[test]
    fn magic_spells_bfr() {
        assert_eq!(&NATIVE_BASE_MAGIC.to_be_bytes(), b"_bfr");
    }

    #[test]
    fn hardware_desc_matches_ndk_layout() {
        assert_eq!(offset_of!(HardwareBufferDesc, usage), 16);
        assert_eq!(size_of::<HardwareBufferDesc>(), 40);
    }
}
