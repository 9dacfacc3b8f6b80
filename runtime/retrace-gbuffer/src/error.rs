use std::path::PathBuf;

use thiserror::Error;

use crate::diag::Anomaly;
use crate::Status;

#[derive(Debug, Error)]
pub enum ShimError {
    /// Neither library of a required pair could be opened, or a path override
    /// pointed nowhere. Fatal for the whole subsystem.
    #[error("could not open {path}")]
    LibraryOpen {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// An entry point needed by the attempted operation never resolved.
    #[error("no symbol resolved for {0}")]
    MissingSymbol(&'static str),

    #[error("could not allocate {0} bytes for a foreign object")]
    Allocation(usize),

    /// A passthrough call returned a non-zero `status_t`.
    #[error("foreign call returned status {0}")]
    Foreign(Status),

    /// A construction anomaly promoted to an error by
    /// [`crate::ShimConfig::fatal_anomalies`].
    #[error("fatal construction anomaly: {0}")]
    FatalAnomaly(Anomaly),

    /// The operation belongs to the buffer API that is not active in this
    /// process (private vs standardized, chosen once at load).
    #[error("the {0} buffer API is not active in this process")]
    BackendUnavailable(&'static str),
}
