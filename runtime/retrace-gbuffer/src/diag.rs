//! Construction-anomaly classification and reporting.
//!
//! The original behavior on an anomalous construction is to log and keep
//! going; callers that cannot live with a possibly-invalid object opt into
//! hard failure through [`crate::ShimConfig::fatal_anomalies`].

use thiserror::Error;

use crate::error::ShimError;
use crate::Status;

/// A foreign object that constructed, but not the way the shim assumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("initCheck returned status {0}")]
    InitCheckFailed(Status),
    #[error("base header magic {found:#010x} does not match {expected:#010x}")]
    LayoutMagic { found: u32, expected: u32 },
    #[error("base header version {found} does not match {expected} for this pointer width")]
    LayoutVersion { found: u32, expected: u32 },
    #[error("base header reference-count hooks are null")]
    RefHooksMissing,
}

pub(crate) fn report(anomaly: Anomaly, fatal: bool) -> Result<(), ShimError> {
    log::warn!("GraphicBuffer construction anomaly: {anomaly}");
    if fatal {
        Err(ShimError::FatalAnomaly(anomaly))
    } else {
        Ok(())
    }
}
