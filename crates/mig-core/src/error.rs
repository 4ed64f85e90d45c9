//! Error handling for the MIG partitioning engine
//!
//! Provides the engine-level error type returned by every public engine
//! operation. Driver-level errors ([`DriverError`]) are wrapped here once they
//! stop being recoverable (profile-index skips, `InUse` preservation, and
//! creation retries are handled inside the engine).

use thiserror::Error;

use crate::driver::DriverError;
use crate::profile::MigProfile;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, MigError>;

/// Errors surfaced by the partitioning engine
#[derive(Debug, Error)]
pub enum MigError {
    /// The driver session could not be opened
    #[error("error initializing driver: {0}")]
    DriverInitFailed(#[source] DriverError),

    /// GPU index out of range
    #[error("no device at GPU index {0}")]
    NoSuchDevice(u32),

    /// The device lacks MIG capability
    #[error("MIG not supported on GPU {0}")]
    MigUnsupported(u32),

    /// MIG mode is not enabled on the device; toggling it is the caller's
    /// responsibility
    #[error("MIG mode disabled on GPU {0}")]
    MigDisabled(u32),

    /// The desired config contains a shape the device cannot resolve
    #[error("unknown MIG profile '{0}' for device")]
    UnknownProfile(MigProfile),

    /// The driver created a partition whose shape differs from the request
    #[error("unsupported MIG profile: requested '{requested}', driver created '{actual}'")]
    UnsupportedProfile {
        requested: MigProfile,
        actual: MigProfile,
    },

    /// GPU or compute instance creation was rejected; retried under the next
    /// creation ordering
    #[error("error creating instances for profile '{profile}': {source}")]
    CreateFailed {
        profile: MigProfile,
        #[source]
        source: DriverError,
    },

    /// A compute instance is in use but nothing in the desired config matches
    /// its GPU instance profile
    #[error("compute instance in use with no matching profile in the desired config")]
    InUseUnmatched,

    /// An instance could not be destroyed for a reason other than being in
    /// use by a matching desired entry
    #[error("error destroying instance: {0}")]
    DestroyFailed(#[source] DriverError),

    /// No creation ordering of the desired config succeeded
    #[error("all creation orderings failed: {last}")]
    AllOrderingsFailed {
        #[source]
        last: Box<MigError>,
    },

    /// A driver error outside the kinds above
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl MigError {
    /// Whether the reconciler may recover from this error by attempting the
    /// next creation ordering
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigError::CreateFailed { .. })
    }
}
