//! Thin wrapper over the platform's dynamic loader.

use std::ffi::c_void;
use std::path::Path;

/// Untyped exported-symbol address. Stays untyped until the call boundary
/// that knows the real signature.
#[derive(Copy, Clone)]
pub(crate) struct RawFn(pub(crate) *const c_void);

// Symbol addresses are immutable for the library lifetime.
unsafe impl Send for RawFn {}
unsafe impl Sync for RawFn {}

/// Seam between the symbol builders and whatever provides addresses: the real
/// dynamic library in production, a hand-built table in tests.
pub(crate) trait SymbolSource {
    fn resolve(&self, name: &str) -> Option<RawFn>;
}

pub(crate) struct DynamicLibrary {
    library: libloading::Library,
}

impl DynamicLibrary {
    pub(crate) fn open(path: &Path) -> Result<Self, libloading::Error> {
        let library = unsafe { libloading::Library::new(path) }?;
        Ok(Self { library })
    }
}

impl SymbolSource for DynamicLibrary {
    fn resolve(&self, name: &str) -> Option<RawFn> {
        let symbol = unsafe { self.library.get::<unsafe extern "C" fn()>(name.as_bytes()) };
        match symbol {
            Ok(symbol) => Some(RawFn(*symbol as *const c_void)),
            Err(_) => None,
        }
    }
}
