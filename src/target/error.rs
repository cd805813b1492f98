//! Target construction errors.

use thiserror::Error;

/// Errors raised while building a target machine.
///
/// All of them are fatal to the constructor that raised them and name the
/// identifier the backend rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("target construction failed: unrecognized triple `{triple}`: {reason}")]
    UnsupportedTriple { triple: String, reason: String },

    #[error("target construction failed: invalid cpu `{cpu}` for `{triple}`: {reason}")]
    InvalidCpu {
        triple: String,
        cpu: String,
        reason: String,
    },

    #[error("target construction failed: malformed feature string `{features}`: {reason}")]
    MalformedFeatures { features: String, reason: String },

    #[error("target construction failed: unknown feature `{feature}` for `{triple}`")]
    UnknownFeature { triple: String, feature: String },

    #[error("target construction failed: host detection: {0}")]
    HostDetection(String),

    #[error("target construction failed: backend `{0}` is not compiled in")]
    BackendUnavailable(&'static str),

    #[error("target construction failed: {backend} could not create a machine for `{triple}`: {reason}")]
    MachineCreation {
        backend: &'static str,
        triple: String,
        reason: String,
    },
}
