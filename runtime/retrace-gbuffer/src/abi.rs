//! Calling-convention emulation for foreign constructors and destructors.
//!
//! The platform compiler emits `C1` constructors that construct in place over
//! caller-supplied memory, but how the constructed object is communicated
//! back differs by architecture family: ARM32 constructors return the object
//! pointer, every other supported family returns void and the caller keeps
//! using the memory it passed in. Destructors follow the same split (the
//! ARM32 `D1` destructor returns a pointer nobody reads).
//!
//! This module is the only place a raw symbol address is reinterpreted as a
//! callable constructor or destructor. Everything else goes through the typed
//! wrappers below, which return the caller's memory as the object pointer
//! under either convention.

use std::ffi::c_void;
use std::mem::transmute;

use crate::buffer::GraphicBufferImpl;
use crate::cxxstring::CxxString;
use crate::library::RawFn;
use crate::PixelFormat;

/// How a foreign constructor/destructor communicates its result. Closed set:
/// the Itanium ABI variants actually used by the supported families.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CallConvention {
    /// The routine returns the object pointer (ARM32 `C1`/`D1`).
    PointerReturn,
    /// The routine returns nothing; the first argument is the object.
    VoidReturn,
}

#[cfg(target_arch = "arm")]
pub(crate) const NATIVE_CONVENTION: CallConvention = CallConvention::PointerReturn;

#[cfg(any(target_arch = "aarch64", target_arch = "x86", target_arch = "x86_64"))]
pub(crate) const NATIVE_CONVENTION: CallConvention = CallConvention::VoidReturn;

#[cfg(not(any(
    target_arch = "arm",
    target_arch = "aarch64",
    target_arch = "x86",
    target_arch = "x86_64"
)))]
compile_error!("GraphicBuffer ABI emulation is only defined for arm, aarch64, x86 and x86_64");

type Ctor4Ptr =
    unsafe extern "C" fn(*mut u8, u32, u32, PixelFormat, u32) -> *mut GraphicBufferImpl;
type Ctor4Void = unsafe extern "C" fn(*mut u8, u32, u32, PixelFormat, u32);
type Ctor5Ptr = unsafe extern "C" fn(
    *mut u8,
    u32,
    u32,
    PixelFormat,
    u32,
    *const CxxString,
) -> *mut GraphicBufferImpl;
type Ctor5Void = unsafe extern "C" fn(*mut u8, u32, u32, PixelFormat, u32, *const CxxString);
type DtorPtr = unsafe extern "C" fn(*mut GraphicBufferImpl) -> *mut c_void;
type DtorVoid = unsafe extern "C" fn(*mut GraphicBufferImpl);

/// Invokes the 4-argument constructor over `memory`.
///
/// # Safety
/// `f` must be the address of a `GraphicBuffer(uint32_t, uint32_t, PixelFormat,
/// uint32_t)` `C1` constructor built for this process's architecture, and
/// `memory` must be writable for at least [`crate::GRAPHIC_BUFFER_SIZE`] bytes.
pub(crate) unsafe fn construct4(
    f: RawFn,
    memory: *mut u8,
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: u32,
) -> *mut GraphicBufferImpl {
    unsafe { construct4_with(NATIVE_CONVENTION, f, memory, width, height, format, usage) }
}

pub(crate) unsafe fn construct4_with(
    convention: CallConvention,
    f: RawFn,
    memory: *mut u8,
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: u32,
) -> *mut GraphicBufferImpl {
    match convention {
        CallConvention::PointerReturn => {
            let ctor = unsafe { transmute::<*const c_void, Ctor4Ptr>(f.0) };
            let _ = unsafe { ctor(memory, width, height, format, usage) };
        }
        CallConvention::VoidReturn => {
            let ctor = unsafe { transmute::<*const c_void, Ctor4Void>(f.0) };
            unsafe { ctor(memory, width, height, format, usage) };
        }
    }
    memory as *mut GraphicBufferImpl
}

/// Invokes the 5-argument constructor variant, passing the diagnostic label
/// by the Itanium indirect-value convention.
///
/// # Safety
/// As [`construct4`], for the `std::string`-taking constructor; `label` must
/// stay alive across the call.
pub(crate) unsafe fn construct5(
    f: RawFn,
    memory: *mut u8,
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: u32,
    label: *const CxxString,
) -> *mut GraphicBufferImpl {
    unsafe { construct5_with(NATIVE_CONVENTION, f, memory, width, height, format, usage, label) }
}

#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn construct5_with(
    convention: CallConvention,
    f: RawFn,
    memory: *mut u8,
    width: u32,
    height: u32,
    format: PixelFormat,
    usage: u32,
    label: *const CxxString,
) -> *mut GraphicBufferImpl {
    match convention {
        CallConvention::PointerReturn => {
            let ctor = unsafe { transmute::<*const c_void, Ctor5Ptr>(f.0) };
            let _ = unsafe { ctor(memory, width, height, format, usage, label) };
        }
        CallConvention::VoidReturn => {
            let ctor = unsafe { transmute::<*const c_void, Ctor5Void>(f.0) };
            unsafe { ctor(memory, width, height, format, usage, label) };
        }
    }
    memory as *mut GraphicBufferImpl
}

/// Runs the foreign destructor over `object`, discarding the unused pointer
/// the ARM32 convention returns.
///
/// # Safety
/// `f` must be the address of the `D1` destructor and `object` a pointer the
/// matching constructor succeeded on.
pub(crate) unsafe fn destruct(f: RawFn, object: *mut GraphicBufferImpl) {
    unsafe { destruct_with(NATIVE_CONVENTION, f, object) }
}

pub(crate) unsafe fn destruct_with(
    convention: CallConvention,
    f: RawFn,
    object: *mut GraphicBufferImpl,
) {
    match convention {
        CallConvention::PointerReturn => {
            let dtor = unsafe { transmute::<*const c_void, DtorPtr>(f.0) };
            let _ = unsafe { dtor(object) };
        }
        CallConvention::VoidReturn => {
            let dtor = unsafe { transmute::<*const c_void, DtorVoid>(f.0) };
            unsafe { dtor(object) };
        }
    }
}
