//! Android GraphicBuffer binary ABI compatibility shim.
//!
//! The platform's `GraphicBuffer` implementation lives in the private
//! `libui.so`, which cannot be linked against: only mangled symbol names and
//! an assumed object layout are known, and both vary across CPU architecture
//! and platform version. This crate dlopen-loads that library, resolves the
//! entry points with per-version fallback chains, emulates the C++ calling
//! convention for hidden-this constructors and destructors, and validates the
//! resulting object by raw memory inspection.
//!
//! When `libui.so` is not present the process falls back to the standardized
//! `AHardwareBuffer` API from `libnativewindow.so`, a plain function-pointer
//! passthrough with no ABI emulation.

mod abi;
mod buffer;
mod cxxstring;
mod diag;
mod error;
mod hardware;
mod library;
mod runtime;
mod symbols;

pub use abi::CallConvention;
pub use buffer::{GraphicBuffer, GraphicBufferImpl};
pub use diag::Anomaly;
pub use error::ShimError;
pub use hardware::{AHardwareBuffer, HardwareBuffer};
pub use runtime::{BufferRuntime, ShimConfig, PRIVATE_LIBRARY_PATH, STANDARD_LIBRARY_PATH};
pub use symbols::{ConstructorVariant, LockVariant};

pub use retrace_native_window::{
    AndroidYcbcr, HardwareBufferDesc, NativeBase, NativeWindowBuffer, Rect,
};

/// `status_t` on the foreign side: zero is success.
pub type Status = i32;

/// `android::PixelFormat`.
pub type PixelFormat = i32;

/// Conservative upper bound on `sizeof(android::GraphicBuffer)`. The true
/// size is unknowable without the platform headers, so every buffer gets a
/// block this large.
pub const GRAPHIC_BUFFER_SIZE: usize = 10240;
