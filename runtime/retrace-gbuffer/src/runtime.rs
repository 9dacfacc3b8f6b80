//! Backend selection and process-wide runtime state.
//!
//! The private GraphicBuffer library is tried first; when it cannot be opened
//! the runtime falls back to the standardized hardware-buffer library. The
//! choice is made once per process and the two backends never coexist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::ShimError;
use crate::symbols::{GraphicBufferSymbols, HardwareBufferSymbols};

#[cfg(target_pointer_width = "64")]
pub const PRIVATE_LIBRARY_PATH: &str = "/system/lib64/libui.so";
#[cfg(target_pointer_width = "32")]
pub const PRIVATE_LIBRARY_PATH: &str = "/system/lib/libui.so";

#[cfg(target_pointer_width = "64")]
pub const STANDARD_LIBRARY_PATH: &str = "/system/lib64/libnativewindow.so";
#[cfg(target_pointer_width = "32")]
pub const STANDARD_LIBRARY_PATH: &str = "/system/lib/libnativewindow.so";

/// Load-time knobs. The defaults reproduce the stock platform behavior.
#[derive(Debug, Clone, Default)]
pub struct ShimConfig {
    /// Overrides the private library path; mainly for tests and sandboxes.
    pub private_library: Option<PathBuf>,
    /// Overrides the standardized library path.
    pub standard_library: Option<PathBuf>,
    /// Turns construction anomalies from warnings into hard errors.
    pub fatal_anomalies: bool,
}

enum Backend {
    Private(Arc<GraphicBufferSymbols>),
    Standard(Arc<HardwareBufferSymbols>),
}

/// The loaded buffer subsystem: exactly one backend plus the configuration it
/// was loaded under.
pub struct BufferRuntime {
    backend: Backend,
    config: ShimConfig,
}

static RUNTIME: OnceCell<BufferRuntime> = OnceCell::new();

impl BufferRuntime {
    /// Returns the process-wide runtime, loading it on first use. The load
    /// happens once; later calls observe the same outcome.
    pub fn get() -> Result<&'static BufferRuntime, ShimError> {
        RUNTIME.get_or_try_init(Self::load)
    }

    pub fn load() -> Result<Self, ShimError> {
        Self::load_with(ShimConfig::default())
    }

    pub fn load_with(config: ShimConfig) -> Result<Self, ShimError> {
        let private_path = config
            .private_library
            .as_deref()
            .unwrap_or(Path::new(PRIVATE_LIBRARY_PATH));
        match GraphicBufferSymbols::load(private_path) {
            Ok(symbols) => {
                log::debug!("buffer runtime using the private API at {}", private_path.display());
                return Ok(Self {
                    backend: Backend::Private(Arc::new(symbols)),
                    config,
                });
            }
            Err(error) => {
                log::warn!("private buffer API unavailable ({error}); trying the standardized API");
            }
        }

        let standard_path = config
            .standard_library
            .as_deref()
            .unwrap_or(Path::new(STANDARD_LIBRARY_PATH));
        let symbols = HardwareBufferSymbols::load(standard_path).inspect_err(|error| {
            log::error!("no buffer API could be loaded: {error}");
        })?;
        log::debug!(
            "buffer runtime using the standardized API at {}",
            standard_path.display()
        );
        Ok(Self {
            backend: Backend::Standard(Arc::new(symbols)),
            config,
        })
    }

    pub fn has_private_api(&self) -> bool {
        matches!(self.backend, Backend::Private(_))
    }

    pub fn has_standard_api(&self) -> bool {
        matches!(self.backend, Backend::Standard(_))
    }

    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    pub(crate) fn graphic_buffer(&self) -> Result<&Arc<GraphicBufferSymbols>, ShimError> {
        match &self.backend {
            Backend::Private(symbols) => Ok(symbols),
            Backend::Standard(_) => Err(ShimError::BackendUnavailable("private")),
        }
    }

    pub(crate) fn hardware_buffer(&self) -> Result<&Arc<HardwareBufferSymbols>, ShimError> {
        match &self.backend {
            Backend::Standard(symbols) => Ok(symbols),
            Backend::Private(_) => Err(ShimError::BackendUnavailable("standardized")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::SymbolSource;

    #[test]
    fn load_fails_when_both_overrides_point_nowhere() {
        let config = ShimConfig {
            private_library: Some(PathBuf::from("/nonexistent/libui.so")),
            standard_library: Some(PathBuf::from("/nonexistent/libnativewindow.so")),
            fatal_anomalies: false,
        };
        match BufferRuntime::load_with(config) {
            Err(ShimError::LibraryOpen { path, .. }) => {
                // The error names the last library tried, the standardized one.
                assert_eq!(path, PathBuf::from("/nonexistent/libnativewindow.so"));
            }
            Ok(_) => panic!("load succeeded against nonexistent paths"),
            Err(other) => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn library_paths_match_the_pointer_width() {
        if size_of::<usize>() == 8 {
            assert!(PRIVATE_LIBRARY_PATH.contains("lib64"));
            assert!(STANDARD_LIBRARY_PATH.contains("lib64"));
        } else {
            assert!(!PRIVATE_LIBRARY_PATH.contains("lib64"));
            assert!(!STANDARD_LIBRARY_PATH.contains("lib64"));
        }
    }

    struct EmptySource;

    impl SymbolSource for EmptySource {
        fn resolve(&self, _name: &str) -> Option<crate::library::RawFn> {
            None
        }
    }

    #[test]
    fn backend_accessors_reject_the_inactive_api() {
        let private = BufferRuntime {
            backend: Backend::Private(Arc::new(GraphicBufferSymbols::resolve(&EmptySource))),
            config: ShimConfig::default(),
        };
        assert!(private.has_private_api());
        assert!(!private.has_standard_api());
        assert!(private.graphic_buffer().is_ok());
        assert!(matches!(
            private.hardware_buffer(),
            Err(ShimError::BackendUnavailable("standardized"))
        ));

        let standard = BufferRuntime {
            backend: Backend::Standard(Arc::new(HardwareBufferSymbols::resolve(&EmptySource))),
            config: ShimConfig::default(),
        };
        assert!(standard.has_standard_api());
        assert!(standard.hardware_buffer().is_ok());
        assert!(matches!(
            standard.graphic_buffer(),
            Err(ShimError::BackendUnavailable("private"))
        ));
    }
}
