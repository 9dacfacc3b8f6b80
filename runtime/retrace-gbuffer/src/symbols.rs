//! Symbol resolution for the private GraphicBuffer API and the standardized
//! hardware-buffer fallback.
//!
//! Each table is built once against an opened library and is immutable
//! afterwards. Where the platform renamed an entry point across versions the
//! builder probes a two-level fallback chain and records which variant won;
//! that record is the whole input to the variant dispatch at call time.

use std::ffi::{c_int, c_void};
use std::path::Path;

use retrace_native_window::{AndroidYcbcr, HardwareBufferDesc, NativeWindowBuffer, Rect};

use crate::buffer::GraphicBufferImpl;
use crate::error::ShimError;
use crate::hardware::AHardwareBuffer;
use crate::library::{DynamicLibrary, RawFn, SymbolSource};
use crate::Status;

pub(crate) type GetNativeBufferFn =
    unsafe extern "C" fn(*mut GraphicBufferImpl) -> *mut NativeWindowBuffer;
pub(crate) type Lock3Fn =
    unsafe extern "C" fn(*mut GraphicBufferImpl, u32, *mut *mut c_void) -> Status;
pub(crate) type Lock5Fn =
    unsafe extern "C" fn(*mut GraphicBufferImpl, u32, *mut *mut c_void, *mut i32, *mut i32) -> Status;
pub(crate) type UnlockFn = unsafe extern "C" fn(*mut GraphicBufferImpl) -> Status;
pub(crate) type InitCheckFn = unsafe extern "C" fn(*mut GraphicBufferImpl) -> Status;
pub(crate) type LockYcbcrFn =
    unsafe extern "C" fn(*mut GraphicBufferImpl, u32, *mut AndroidYcbcr) -> Status;

pub(crate) type AllocateFn =
    unsafe extern "C" fn(*const HardwareBufferDesc, *mut *mut AHardwareBuffer) -> c_int;
pub(crate) type HardwareLockFn =
    unsafe extern "C" fn(*mut AHardwareBuffer, u64, i32, *const Rect, *mut *mut c_void) -> c_int;
pub(crate) type HardwareUnlockFn = unsafe extern "C" fn(*mut AHardwareBuffer, *mut i32) -> c_int;
pub(crate) type DescribeFn = unsafe extern "C" fn(*const AHardwareBuffer, *mut HardwareBufferDesc);
pub(crate) type RefFn = unsafe extern "C" fn(*mut AHardwareBuffer);

// Itanium-mangled GraphicBuffer entry points. The constructor and lock names
// changed across platform versions, hence the paired fallbacks.
const SYM_CTOR4: &str = "_ZN7android13GraphicBufferC1Ejjij";
const SYM_CTOR5: &str =
    "_ZN7android13GraphicBufferC1EjjijNSt3__112basic_stringIcNS1_11char_traitsIcEENS1_9allocatorIcEEEE";
const SYM_DTOR: &str = "_ZN7android13GraphicBufferD1Ev";
const SYM_GET_NATIVE_BUFFER: &str = "_ZNK7android13GraphicBuffer15getNativeBufferEv";
const SYM_LOCK3: &str = "_ZN7android13GraphicBuffer4lockEjPPv";
const SYM_LOCK5: &str = "_ZN7android13GraphicBuffer4lockEjPPvPiS3_";
const SYM_UNLOCK: &str = "_ZN7android13GraphicBuffer6unlockEv";
const SYM_INIT_CHECK: &str = "_ZNK7android13GraphicBuffer9initCheckEv";
const SYM_LOCK_YCBCR: &str = "_ZN7android13GraphicBuffer9lockYCbCrEjP13android_ycbcr";

const SYM_HB_ALLOCATE: &str = "AHardwareBuffer_allocate";
const SYM_HB_LOCK: &str = "AHardwareBuffer_lock";
const SYM_HB_DESCRIBE: &str = "AHardwareBuffer_describe";
const SYM_HB_UNLOCK: &str = "AHardwareBuffer_unlock";
const SYM_HB_ACQUIRE: &str = "AHardwareBuffer_acquire";
const SYM_HB_RELEASE: &str = "AHardwareBuffer_release";

/// Which constructor arity resolved for this platform version.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstructorVariant {
    FourArg,
    FiveArg,
}

/// Which lock arity resolved for this platform version.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LockVariant {
    ThreeArg,
    FiveArg,
}

/// Resolved private-API entry points. Built once, read-only afterwards; the
/// open library handle is kept alive so the addresses stay valid.
pub(crate) struct GraphicBufferSymbols {
    pub(crate) _library: Option<DynamicLibrary>,
    // Constructor and destructor stay untyped: their calling convention is
    // substituted in `abi`, nowhere else.
    pub(crate) constructor: Option<RawFn>,
    pub(crate) destructor: Option<RawFn>,
    pub(crate) get_native_buffer: Option<GetNativeBufferFn>,
    pub(crate) lock3: Option<Lock3Fn>,
    pub(crate) lock5: Option<Lock5Fn>,
    pub(crate) unlock: Option<UnlockFn>,
    pub(crate) init_check: Option<InitCheckFn>,
    pub(crate) lock_ycbcr: Option<LockYcbcrFn>,
    pub(crate) uses_constructor4: bool,
    pub(crate) uses_lock3: bool,
}

unsafe fn typed<F>(raw: Option<RawFn>) -> Option<F>
where
    F: Copy,
{
    raw.map(|raw| unsafe { transmute_copy_fn::<F>(raw.0) })
}

// `transmute` cannot go from `*const c_void` to a generic `F` directly, so
// the cast routes through the address width both share.
unsafe fn transmute_copy_fn<F: Copy>(address: *const c_void) -> F {
    debug_assert_eq!(size_of::<F>(), size_of::<*const c_void>());
    unsafe { std::mem::transmute_copy::<*const c_void, F>(&address) }
}

impl GraphicBufferSymbols {
    pub(crate) fn load(path: &Path) -> Result<Self, ShimError> {
        let library = DynamicLibrary::open(path).map_err(|source| ShimError::LibraryOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut symbols = Self::resolve(&library);
        symbols._library = Some(library);
        Ok(symbols)
    }

    pub(crate) fn resolve(source: &impl SymbolSource) -> Self {
        let mut uses_constructor4 = true;
        let mut constructor = source.resolve(SYM_CTOR4);
        if constructor.is_none() {
            uses_constructor4 = false;
            constructor = source.resolve(SYM_CTOR5);
        }

        let mut uses_lock3 = true;
        let lock3 = unsafe { typed::<Lock3Fn>(source.resolve(SYM_LOCK3)) };
        let mut lock5 = None;
        if lock3.is_none() {
            uses_lock3 = false;
            lock5 = unsafe { typed::<Lock5Fn>(source.resolve(SYM_LOCK5)) };
        }

        log::debug!(
            "GraphicBuffer symbols resolved: constructor4={uses_constructor4} lock3={uses_lock3}"
        );

        Self {
            _library: None,
            constructor,
            destructor: source.resolve(SYM_DTOR),
            get_native_buffer: unsafe {
                typed::<GetNativeBufferFn>(source.resolve(SYM_GET_NATIVE_BUFFER))
            },
            lock3,
            lock5,
            unlock: unsafe { typed::<UnlockFn>(source.resolve(SYM_UNLOCK)) },
            init_check: unsafe { typed::<InitCheckFn>(source.resolve(SYM_INIT_CHECK)) },
            lock_ycbcr: unsafe { typed::<LockYcbcrFn>(source.resolve(SYM_LOCK_YCBCR)) },
            uses_constructor4,
            uses_lock3,
        }
    }

    /// Variant dispatch is a pure function of the resolution flags.
    pub(crate) fn constructor_variant(&self) -> ConstructorVariant {
        if self.uses_constructor4 {
            ConstructorVariant::FourArg
        } else {
            ConstructorVariant::FiveArg
        }
    }

    pub(crate) fn lock_variant(&self) -> LockVariant {
        if self.uses_lock3 {
            LockVariant::ThreeArg
        } else {
            LockVariant::FiveArg
        }
    }
}

/// Resolved standardized-API entry points.
pub(crate) struct HardwareBufferSymbols {
    pub(crate) _library: Option<DynamicLibrary>,
    pub(crate) allocate: Option<AllocateFn>,
    pub(crate) lock: Option<HardwareLockFn>,
    pub(crate) describe: Option<DescribeFn>,
    pub(crate) unlock: Option<HardwareUnlockFn>,
    pub(crate) acquire: Option<RefFn>,
    pub(crate) release: Option<RefFn>,
}

impl HardwareBufferSymbols {
    pub(crate) fn load(path: &Path) -> Result<Self, ShimError> {
        let library = DynamicLibrary::open(path).map_err(|source| ShimError::LibraryOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut symbols = Self::resolve(&library);
        symbols._library = Some(library);
        Ok(symbols)
    }

    pub(crate) fn resolve(source: &impl SymbolSource) -> Self {
        Self {
            _library: None,
            allocate: unsafe { typed::<AllocateFn>(source.resolve(SYM_HB_ALLOCATE)) },
            lock: unsafe { typed::<HardwareLockFn>(source.resolve(SYM_HB_LOCK)) },
            describe: unsafe { typed::<DescribeFn>(source.resolve(SYM_HB_DESCRIBE)) },
            unlock: unsafe { typed::<HardwareUnlockFn>(source.resolve(SYM_HB_UNLOCK)) },
            acquire: unsafe { typed::<RefFn>(source.resolve(SYM_HB_ACQUIRE)) },
            release: unsafe { typed::<RefFn>(source.resolve(SYM_HB_RELEASE)) },
        }
    }
}
