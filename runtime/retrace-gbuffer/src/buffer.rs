//! GraphicBuffer lifecycle: allocation, foreign construction, layout
//! validation, reference management, and the lock/unlock passthroughs.

use std::ffi::c_void;
use std::mem;
use std::ptr;
use std::sync::Arc;

use retrace_native_window::{
    AndroidYcbcr, NativeBase, NativeWindowBuffer, EXPECTED_NATIVE_BUFFER_VERSION,
    NATIVE_BASE_MAGIC,
};

use crate::abi;
use crate::cxxstring::CxxString;
use crate::diag::{self, Anomaly};
use crate::error::ShimError;
use crate::runtime::BufferRuntime;
use crate::symbols::{ConstructorVariant, GraphicBufferSymbols, LockVariant};
use crate::{PixelFormat, GRAPHIC_BUFFER_SIZE};

/// Opaque stand-in for `android::GraphicBuffer`; only ever handled by
/// pointer.
#[repr(C)]
pub struct GraphicBufferImpl {
    _opaque: [u8; 0],
}

/// Byte offset of the embedded `android_native_base_t`. Part of the assumed
/// foreign layout: the object starts with a vtable pointer and one word of
/// reference bookkeeping before the header.
const NATIVE_BASE_OFFSET: usize = 2 * size_of::<*mut c_void>();

pub(crate) unsafe fn native_base(object: *mut GraphicBufferImpl) -> *mut NativeBase {
    unsafe { (object as *mut u8).add(NATIVE_BASE_OFFSET) as *mut NativeBase }
}

/// Raw block that frees itself unless the constructed handle takes it over.
struct Allocation {
    ptr: *mut u8,
}

impl Allocation {
    fn new(size: usize) -> Result<Self, ShimError> {
        let ptr = unsafe { libc::malloc(size) } as *mut u8;
        if ptr.is_null() {
            return Err(ShimError::Allocation(size));
        }
        Ok(Self { ptr })
    }

    fn into_raw(self) -> *mut u8 {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        unsafe { libc::free(self.ptr as *mut c_void) };
    }
}

/// A live foreign GraphicBuffer. Move-only: the reference decrement and the
/// block release run exactly once, from `Drop`.
pub struct GraphicBuffer {
    raw: *mut GraphicBufferImpl,
    owns_allocation: bool,
    symbols: Arc<GraphicBufferSymbols>,
}

// The handle can move between threads; concurrent use of one handle is the
// caller's problem, hence no Sync.
unsafe impl Send for GraphicBuffer {}

impl std::fmt::Debug for GraphicBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicBuffer")
            .field("raw", &self.raw)
            .field("owns_allocation", &self.owns_allocation)
            .finish()
    }
}

impl GraphicBuffer {
    /// Allocates and constructs a buffer through the private API.
    pub fn new(
        runtime: &BufferRuntime,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: u32,
    ) -> Result<Self, ShimError> {
        let symbols = runtime.graphic_buffer()?;
        Self::construct(
            Arc::clone(symbols),
            runtime.config().fatal_anomalies,
            width,
            height,
            format,
            usage,
        )
    }

    pub(crate) fn construct(
        symbols: Arc<GraphicBufferSymbols>,
        fatal_anomalies: bool,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: u32,
    ) -> Result<Self, ShimError> {
        let constructor = symbols
            .constructor
            .ok_or(ShimError::MissingSymbol("GraphicBuffer::GraphicBuffer"))?;
        let init_check = symbols
            .init_check
            .ok_or(ShimError::MissingSymbol("GraphicBuffer::initCheck"))?;
        let memory = Allocation::new(GRAPHIC_BUFFER_SIZE)?;

        // From here on every early return crosses foreign state; `memory`
        // frees itself on any of them.
        let object = match symbols.constructor_variant() {
            ConstructorVariant::FourArg => unsafe {
                abi::construct4(constructor, memory.ptr, width, height, format, usage)
            },
            ConstructorVariant::FiveArg => {
                let text = format!("[GraphicBuffer pid {}]", std::process::id());
                let label =
                    CxxString::new(&text).ok_or(ShimError::Allocation(text.len()))?;
                unsafe {
                    abi::construct5(
                        constructor,
                        memory.ptr,
                        width,
                        height,
                        format,
                        usage,
                        label.as_ptr(),
                    )
                }
                // `label` is dropped here; the callee copied what it needed.
            }
        };

        unsafe {
            let status = init_check(object);
            if status != 0 {
                if let Some(destructor) = symbols.destructor {
                    abi::destruct(destructor, object);
                }
                diag::report(Anomaly::InitCheckFailed(status), fatal_anomalies)?;
            }

            let base = native_base(object);
            if (*base).magic != NATIVE_BASE_MAGIC {
                diag::report(
                    Anomaly::LayoutMagic {
                        found: (*base).magic,
                        expected: NATIVE_BASE_MAGIC,
                    },
                    fatal_anomalies,
                )?;
            }
            if (*base).version != EXPECTED_NATIVE_BUFFER_VERSION {
                diag::report(
                    Anomaly::LayoutVersion {
                        found: (*base).version,
                        expected: EXPECTED_NATIVE_BUFFER_VERSION,
                    },
                    fatal_anomalies,
                )?;
            }

            match (*base).inc_ref {
                Some(inc_ref) => inc_ref(base),
                None => diag::report(Anomaly::RefHooksMissing, fatal_anomalies)?,
            }
        }

        Ok(Self {
            raw: memory.into_raw() as *mut GraphicBufferImpl,
            owns_allocation: true,
            symbols,
        })
    }

    /// Adopts a GraphicBuffer pointer obtained elsewhere, e.g. handed in by a
    /// window-system call. The handle owns the eventual reference decrement
    /// but not the allocation.
    ///
    /// # Safety
    /// `ptr` must point to a live `android::GraphicBuffer` whose reference
    /// the caller is transferring to this handle.
    pub unsafe fn adopt(runtime: &BufferRuntime, ptr: *mut c_void) -> Result<Self, ShimError> {
        let symbols = runtime.graphic_buffer()?;
        Ok(Self {
            raw: ptr as *mut GraphicBufferImpl,
            owns_allocation: false,
            symbols: Arc::clone(symbols),
        })
    }

    pub fn lock(&mut self, usage: u32) -> Result<*mut c_void, ShimError> {
        let mut vaddr: *mut c_void = ptr::null_mut();
        let status = match self.symbols.lock_variant() {
            LockVariant::ThreeArg => {
                let lock = self
                    .symbols
                    .lock3
                    .ok_or(ShimError::MissingSymbol("GraphicBuffer::lock"))?;
                unsafe { lock(self.raw, usage, &mut vaddr) }
            }
            LockVariant::FiveArg => {
                let lock = self
                    .symbols
                    .lock5
                    .ok_or(ShimError::MissingSymbol("GraphicBuffer::lock"))?;
                // Byte-per-pixel and byte-per-stride outputs have no consumer
                // on this side of the boundary.
                let mut bytes_per_pixel: i32 = 0;
                let mut bytes_per_stride: i32 = 0;
                unsafe {
                    lock(
                        self.raw,
                        usage,
                        &mut vaddr,
                        &mut bytes_per_pixel,
                        &mut bytes_per_stride,
                    )
                }
            }
        };
        if status != 0 {
            return Err(ShimError::Foreign(status));
        }
        Ok(vaddr)
    }

    pub fn lock_ycbcr(&mut self, usage: u32, out: &mut AndroidYcbcr) -> Result<(), ShimError> {
        let lock_ycbcr = self
            .symbols
            .lock_ycbcr
            .ok_or(ShimError::MissingSymbol("GraphicBuffer::lockYCbCr"))?;
        let status = unsafe { lock_ycbcr(self.raw, usage, out) };
        if status != 0 {
            return Err(ShimError::Foreign(status));
        }
        Ok(())
    }

    pub fn unlock(&mut self) -> Result<(), ShimError> {
        let unlock = self
            .symbols
            .unlock
            .ok_or(ShimError::MissingSymbol("GraphicBuffer::unlock"))?;
        let status = unsafe { unlock(self.raw) };
        if status != 0 {
            return Err(ShimError::Foreign(status));
        }
        Ok(())
    }

    pub fn native_buffer(&self) -> Result<*mut NativeWindowBuffer, ShimError> {
        let get = self
            .symbols
            .get_native_buffer
            .ok_or(ShimError::MissingSymbol("GraphicBuffer::getNativeBuffer"))?;
        Ok(unsafe { get(self.raw) })
    }

    pub fn width(&self) -> Result<i32, ShimError> {
        self.native_buffer().map(|nb| unsafe { (*nb).width })
    }

    pub fn height(&self) -> Result<i32, ShimError> {
        self.native_buffer().map(|nb| unsafe { (*nb).height })
    }

    pub fn stride(&self) -> Result<i32, ShimError> {
        self.native_buffer().map(|nb| unsafe { (*nb).stride })
    }

    pub fn format(&self) -> Result<i32, ShimError> {
        self.native_buffer().map(|nb| unsafe { (*nb).format })
    }

    pub fn usage(&self) -> Result<i32, ShimError> {
        self.native_buffer().map(|nb| unsafe { (*nb).usage })
    }

    pub fn set_width(&mut self, width: i32) -> Result<(), ShimError> {
        let nb = self.native_buffer()?;
        unsafe { (*nb).width = width };
        Ok(())
    }

    pub fn set_height(&mut self, height: i32) -> Result<(), ShimError> {
        let nb = self.native_buffer()?;
        unsafe { (*nb).height = height };
        Ok(())
    }

    pub fn set_stride(&mut self, stride: i32) -> Result<(), ShimError> {
        let nb = self.native_buffer()?;
        unsafe { (*nb).stride = stride };
        Ok(())
    }

    pub fn set_format(&mut self, format: i32) -> Result<(), ShimError> {
        let nb = self.native_buffer()?;
        unsafe { (*nb).format = format };
        Ok(())
    }

    pub fn set_usage(&mut self, usage: i32) -> Result<(), ShimError> {
        let nb = self.native_buffer()?;
        unsafe { (*nb).usage = usage };
        Ok(())
    }

    pub fn as_raw(&self) -> *mut GraphicBufferImpl {
        self.raw
    }
}

impl Drop for GraphicBuffer {
    fn drop(&mut self) {
        if self.raw.is_null() {
            return;
        }
        // Reference counting alone governs foreign-side teardown; the raw
        // block is only reclaimed for buffers this shim allocated.
        unsafe {
            let base = native_base(self.raw);
            if let Some(dec_ref) = (*base).dec_ref {
                dec_ref(base);
            }
        }
        if self.owns_allocation {
            unsafe { libc::free(self.raw as *mut c_void) };
        }
    }
}
