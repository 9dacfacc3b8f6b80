//! Standardized hardware-buffer backend, used when the private GraphicBuffer
//! API cannot be reached.
//!
//! Unlike the private path there is no layout emulation here: the platform
//! owns the object and every operation is a plain C call. The shim only adds
//! ownership, so acquire/release run exactly once per handle.

use std::ffi::c_void;
use std::mem;
use std::ptr;
use std::sync::Arc;

use retrace_native_window::{HardwareBufferDesc, Rect};

use crate::error::ShimError;
use crate::runtime::BufferRuntime;
use crate::symbols::HardwareBufferSymbols;

/// Opaque stand-in for the platform's `AHardwareBuffer`.
#[repr(C)]
pub struct AHardwareBuffer {
    _opaque: [u8; 0],
}

/// An owned reference to a platform hardware buffer. Dropping the handle
/// releases the reference.
pub struct HardwareBuffer {
    raw: *mut AHardwareBuffer,
    symbols: Arc<HardwareBufferSymbols>,
}

unsafe impl Send for HardwareBuffer {}

impl std::fmt::Debug for HardwareBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareBuffer").field("raw", &self.raw).finish()
    }
}

impl HardwareBuffer {
    /// Allocates a single-layer buffer through the standardized API.
    pub fn new(
        runtime: &BufferRuntime,
        width: u32,
        height: u32,
        format: u32,
        usage: u64,
    ) -> Result<Self, ShimError> {
        let symbols = runtime.hardware_buffer()?;
        Self::allocate_with(Arc::clone(symbols), width, height, format, usage)
    }

    pub(crate) fn allocate_with(
        symbols: Arc<HardwareBufferSymbols>,
        width: u32,
        height: u32,
        format: u32,
        usage: u64,
    ) -> Result<Self, ShimError> {
        let allocate = symbols
            .allocate
            .ok_or(ShimError::MissingSymbol("AHardwareBuffer_allocate"))?;
        let desc = HardwareBufferDesc {
            width,
            height,
            layers: 1,
            format,
            usage,
            ..Default::default()
        };
        let mut raw: *mut AHardwareBuffer = ptr::null_mut();
        let status = unsafe { allocate(&desc, &mut raw) };
        if status != 0 || raw.is_null() {
            return Err(ShimError::Foreign(status));
        }
        Ok(Self { raw, symbols })
    }

    /// Takes ownership of a reference the caller already holds, e.g. one
    /// produced by `AHardwareBuffer_fromHardwareBuffer`.
    ///
    /// # Safety
    /// `raw` must be a live `AHardwareBuffer` whose reference transfers to
    /// this handle.
    pub unsafe fn adopt(runtime: &BufferRuntime, raw: *mut AHardwareBuffer) -> Result<Self, ShimError> {
        let symbols = runtime.hardware_buffer()?;
        Ok(Self {
            raw,
            symbols: Arc::clone(symbols),
        })
    }

    /// Drops the current buffer and allocates a fresh one with the new
    /// geometry, mirroring what reallocation means on the private path.
    pub fn reallocate(
        &mut self,
        width: u32,
        height: u32,
        format: u32,
        usage: u64,
    ) -> Result<(), ShimError> {
        let fresh = Self::allocate_with(Arc::clone(&self.symbols), width, height, format, usage)?;
        *self = fresh;
        Ok(())
    }

    pub fn describe(&self) -> Result<HardwareBufferDesc, ShimError> {
        let describe = self
            .symbols
            .describe
            .ok_or(ShimError::MissingSymbol("AHardwareBuffer_describe"))?;
        let mut desc = HardwareBufferDesc::default();
        unsafe { describe(self.raw, &mut desc) };
        Ok(desc)
    }

    /// Maps the buffer for CPU access. `fence` is a file descriptor the lock
    /// waits on, or -1 for none; `rect` restricts the locked region.
    pub fn lock(
        &mut self,
        usage: u64,
        fence: i32,
        rect: Option<&Rect>,
    ) -> Result<*mut c_void, ShimError> {
        let lock = self
            .symbols
            .lock
            .ok_or(ShimError::MissingSymbol("AHardwareBuffer_lock"))?;
        let rect_ptr = rect.map_or(ptr::null(), |rect| rect as *const Rect);
        let mut vaddr: *mut c_void = ptr::null_mut();
        let status = unsafe { lock(self.raw, usage, fence, rect_ptr, &mut vaddr) };
        if status != 0 {
            return Err(ShimError::Foreign(status));
        }
        Ok(vaddr)
    }

    /// Unmaps the buffer. Returns the release fence file descriptor, or -1
    /// when the unlock completed synchronously.
    pub fn unlock(&mut self) -> Result<i32, ShimError> {
        let unlock = self
            .symbols
            .unlock
            .ok_or(ShimError::MissingSymbol("AHardwareBuffer_unlock"))?;
        let mut fence: i32 = -1;
        let status = unsafe { unlock(self.raw, &mut fence) };
        if status != 0 {
            return Err(ShimError::Foreign(status));
        }
        Ok(fence)
    }

    /// Takes an extra platform reference on the underlying buffer.
    pub fn acquire(&self) -> Result<(), ShimError> {
        let acquire = self
            .symbols
            .acquire
            .ok_or(ShimError::MissingSymbol("AHardwareBuffer_acquire"))?;
        unsafe { acquire(self.raw) };
        Ok(())
    }

    /// Resolves an EGL client buffer for this hardware buffer through a
    /// caller-supplied `eglGetNativeClientBufferANDROID` address. The EGL
    /// loader owns that symbol, so it arrives from outside.
    ///
    /// # Safety
    /// `func` must be the address of `eglGetNativeClientBufferANDROID`.
    pub unsafe fn egl_client_buffer(&self, func: *const c_void) -> Result<*mut c_void, ShimError> {
        if func.is_null() {
            return Err(ShimError::MissingSymbol("eglGetNativeClientBufferANDROID"));
        }
        let get: unsafe extern "C" fn(*const AHardwareBuffer) -> *mut c_void =
            unsafe { mem::transmute(func) };
        Ok(unsafe { get(self.raw) })
    }

    pub fn as_raw(&self) -> *mut AHardwareBuffer {
        self.raw
    }

    /// Releases ownership without dropping the platform reference.
    pub fn into_raw(self) -> *mut AHardwareBuffer {
        let raw = self.raw;
        mem::forget(self);
        raw
    }
}

impl Drop for HardwareBuffer {
    fn drop(&mut self) {
        if self.raw.is_null() {
            return;
        }
        if let Some(release) = self.symbols.release {
            unsafe { release(self.raw) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{AllocateFn, DescribeFn, HardwareLockFn, HardwareUnlockFn, RefFn};
    use std::cell::Cell;
    use std::ffi::c_int;

    thread_local! {
        static ALLOC_CALLS: Cell<u32> = const { Cell::new(0) };
        static ACQUIRE_CALLS: Cell<u32> = const { Cell::new(0) };
        static RELEASE_CALLS: Cell<u32> = const { Cell::new(0) };
        static LAST_DESC: Cell<(u32, u32, u32, u32, u64)> = const { Cell::new((0, 0, 0, 0, 0)) };
        static LAST_LOCK: Cell<(u64, i32, bool)> = const { Cell::new((0, 0, false)) };
    }

    fn reset_counters() {
        ALLOC_CALLS.with(|c| c.set(0));
        ACQUIRE_CALLS.with(|c| c.set(0));
        RELEASE_CALLS.with(|c| c.set(0));
    }

    // The fake platform object is a single static byte; only its address
    // matters and nothing ever writes through it.
    static FAKE_BUFFER: u8 = 0;

    fn fake_buffer_ptr() -> *mut AHardwareBuffer {
        &FAKE_BUFFER as *const u8 as *mut AHardwareBuffer
    }

    unsafe extern "C" fn fake_allocate(
        desc: *const HardwareBufferDesc,
        out: *mut *mut AHardwareBuffer,
    ) -> c_int {
        ALLOC_CALLS.with(|c| c.set(c.get() + 1));
        unsafe {
            let desc = &*desc;
            LAST_DESC.with(|d| d.set((desc.width, desc.height, desc.layers, desc.format, desc.usage)));
            *out = fake_buffer_ptr();
        }
        0
    }

    unsafe extern "C" fn fake_allocate_fails(
        _desc: *const HardwareBufferDesc,
        _out: *mut *mut AHardwareBuffer,
    ) -> c_int {
        -12
    }

    unsafe extern "C" fn fake_describe(_buffer: *const AHardwareBuffer, out: *mut HardwareBufferDesc) {
        unsafe {
            (*out).width = 640;
            (*out).height = 480;
            (*out).layers = 1;
            (*out).stride = 640;
        }
    }

    unsafe extern "C" fn fake_lock(
        _buffer: *mut AHardwareBuffer,
        usage: u64,
        fence: i32,
        rect: *const Rect,
        out: *mut *mut c_void,
    ) -> c_int {
        LAST_LOCK.with(|l| l.set((usage, fence, rect.is_null())));
        unsafe { *out = fake_buffer_ptr() as *mut c_void };
        0
    }

    unsafe extern "C" fn fake_unlock(_buffer: *mut AHardwareBuffer, fence: *mut i32) -> c_int {
        unsafe { *fence = 42 };
        0
    }

    unsafe extern "C" fn fake_acquire(_buffer: *mut AHardwareBuffer) {
        ACQUIRE_CALLS.with(|c| c.set(c.get() + 1));
    }

    unsafe extern "C" fn fake_release(_buffer: *mut AHardwareBuffer) {
        RELEASE_CALLS.with(|c| c.set(c.get() + 1));
    }

    fn fake_symbols(allocate: AllocateFn) -> Arc<HardwareBufferSymbols> {
        Arc::new(HardwareBufferSymbols {
            _library: None,
            allocate: Some(allocate),
            lock: Some(fake_lock as HardwareLockFn),
            describe: Some(fake_describe as DescribeFn),
            unlock: Some(fake_unlock as HardwareUnlockFn),
            acquire: Some(fake_acquire as RefFn),
            release: Some(fake_release as RefFn),
        })
    }

    #[test]
    fn allocation_requests_a_single_layer() {
        reset_counters();
        let buffer =
            HardwareBuffer::allocate_with(fake_symbols(fake_allocate), 320, 240, 1, 0x30).unwrap();
        assert_eq!(ALLOC_CALLS.with(|c| c.get()), 1);
        assert_eq!(LAST_DESC.with(|d| d.get()), (320, 240, 1, 1, 0x30));
        assert_eq!(buffer.as_raw(), fake_buffer_ptr());
        drop(buffer);
        assert_eq!(RELEASE_CALLS.with(|c| c.get()), 1);
    }

    #[test]
    fn failed_allocation_surfaces_the_status() {
        reset_counters();
        let result = HardwareBuffer::allocate_with(fake_symbols(fake_allocate_fails), 8, 8, 1, 0);
        match result {
            Err(ShimError::Foreign(-12)) => {}
            other => panic!("expected foreign status -12, got {other:?}"),
        }
        assert_eq!(RELEASE_CALLS.with(|c| c.get()), 0);
    }

    #[test]
    fn describe_round_trips_the_platform_view() {
        reset_counters();
        let buffer =
            HardwareBuffer::allocate_with(fake_symbols(fake_allocate), 8, 8, 1, 0).unwrap();
        let desc = buffer.describe().unwrap();
        assert_eq!(desc.width, 640);
        assert_eq!(desc.height, 480);
        assert_eq!(desc.stride, 640);
    }

    #[test]
    fn lock_forwards_the_fence_and_region() {
        reset_counters();
        let mut buffer =
            HardwareBuffer::allocate_with(fake_symbols(fake_allocate), 8, 8, 1, 0).unwrap();
        let vaddr = buffer.lock(3, -1, None).unwrap();
        assert!(!vaddr.is_null());
        assert_eq!(LAST_LOCK.with(|l| l.get()), (3, -1, true));

        let region = Rect {
            left: 0,
            top: 0,
            right: 4,
            bottom: 4,
        };
        buffer.lock(1, 7, Some(&region)).unwrap();
        assert_eq!(LAST_LOCK.with(|l| l.get()), (1, 7, false));
        assert_eq!(buffer.unlock().unwrap(), 42);
    }

    #[test]
    fn reallocate_releases_the_previous_buffer() {
        reset_counters();
        let mut buffer =
            HardwareBuffer::allocate_with(fake_symbols(fake_allocate), 8, 8, 1, 0).unwrap();
        buffer.reallocate(16, 16, 1, 0).unwrap();
        assert_eq!(ALLOC_CALLS.with(|c| c.get()), 2);
        assert_eq!(RELEASE_CALLS.with(|c| c.get()), 1);
        drop(buffer);
        assert_eq!(RELEASE_CALLS.with(|c| c.get()), 2);
    }

    #[test]
    fn into_raw_leaks_the_reference_to_the_caller() {
        reset_counters();
        let buffer =
            HardwareBuffer::allocate_with(fake_symbols(fake_allocate), 8, 8, 1, 0).unwrap();
        let raw = buffer.into_raw();
        assert_eq!(raw, fake_buffer_ptr());
        assert_eq!(RELEASE_CALLS.with(|c| c.get()), 0);
    }

    #[test]
    fn acquire_takes_an_extra_platform_reference() {
        reset_counters();
        let buffer =
            HardwareBuffer::allocate_with(fake_symbols(fake_allocate), 8, 8, 1, 0).unwrap();
        buffer.acquire().unwrap();
        assert_eq!(ACQUIRE_CALLS.with(|c| c.get()), 1);
    }

    unsafe extern "C" fn fake_egl_get(buffer: *const AHardwareBuffer) -> *mut c_void {
        buffer as *mut c_void
    }

    #[test]
    fn egl_client_buffer_goes_through_the_supplied_address() {
        reset_counters();
        let buffer =
            HardwareBuffer::allocate_with(fake_symbols(fake_allocate), 8, 8, 1, 0).unwrap();
        let f: unsafe extern "C" fn(*const AHardwareBuffer) -> *mut c_void = fake_egl_get;
        let client = unsafe { buffer.egl_client_buffer(f as *const c_void) }.unwrap();
        assert_eq!(client, buffer.as_raw() as *mut c_void);

        let missing = unsafe { buffer.egl_client_buffer(ptr::null()) };
        assert!(matches!(missing, Err(ShimError::MissingSymbol(_))));
    }
}
