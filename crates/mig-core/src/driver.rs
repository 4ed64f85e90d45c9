//! Driver capability surface for MIG-capable devices
//!
//! These traits describe the contract the engine requires of a device driver:
//! enumerate GPUs, query MIG mode, list/create/destroy GPU instances and
//! compute instances, and resolve placements and UUIDs. The engine makes no
//! assumption about the transport behind an implementation: a shared-library
//! binding, an in-process simulator, or an RPC proxy all fit behind the same
//! seam.

use thiserror::Error;

/// Number of GPU instance profile indices defined by the driver ABI.
pub const GPU_INSTANCE_PROFILE_COUNT: u32 = 8;

/// Number of compute instance profile indices defined by the driver ABI.
pub const COMPUTE_INSTANCE_PROFILE_COUNT: u32 = 8;

/// Number of compute instance engine profile indices defined by the driver ABI.
pub const COMPUTE_INSTANCE_ENGINE_PROFILE_COUNT: u32 = 1;

/// The shared compute engine profile index.
pub const COMPUTE_INSTANCE_ENGINE_PROFILE_SHARED: u32 = 0;

/// Result type for driver operations
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by a device driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The queried capability or profile index is not supported on this device.
    /// Iteration over profile indices treats this as a skip, never a failure.
    #[error("operation not supported")]
    NotSupported,

    /// The instance has an open client handle and cannot be destroyed
    #[error("resource in use")]
    InUse,

    /// No placement can accommodate the requested instance
    #[error("insufficient resources")]
    InsufficientResources,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("resource not found")]
    NotFound,

    /// The driver session is not initialized
    #[error("driver not initialized")]
    Uninitialized,

    #[error("driver error: {0}")]
    Other(String),
}

/// MIG mode of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigMode {
    Enabled,
    Disabled,
    /// The device lacks MIG capability entirely
    Unsupported,
}

/// The contiguous slice range a GPU instance occupies on the device fabric,
/// as the half-open interval `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub start: u32,
    pub size: u32,
}

impl Placement {
    /// Whether two placements occupy overlapping slice ranges.
    pub fn overlaps(&self, other: &Placement) -> bool {
        self.start < other.start + other.size && other.start < self.start + self.size
    }
}

/// Attributes of a GPU instance profile, as reported by the driver for one
/// profile index. `id` is a driver-local identifier distinct from the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuInstanceProfileInfo {
    pub id: u32,
    pub slice_count: u32,
    pub memory_size_mb: u64,
}

/// Attributes of a compute instance profile under a given GPU instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeInstanceProfileInfo {
    pub id: u32,
    pub slice_count: u32,
}

/// Identity and placement of a live GPU instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuInstanceInfo {
    pub id: u32,
    /// Matches the `id` of the [`GpuInstanceProfileInfo`] it was created from
    pub profile_id: u32,
    pub placement: Placement,
}

/// Identity of a live compute instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeInstanceInfo {
    pub id: u32,
    pub profile_id: u32,
}

/// A driver session over the host's GPUs.
///
/// `init` and `shutdown` bracket every engine call; implementations are
/// expected to refcount so nested sessions are harmless. All other operations
/// may fail with [`DriverError::Uninitialized`] outside a session.
pub trait DeviceDriver: Send + Sync {
    fn init(&self) -> DriverResult<()>;
    fn shutdown(&self) -> DriverResult<()>;

    fn device_count(&self) -> DriverResult<u32>;

    /// Handle to the GPU at `index` in `[0, device_count)`
    fn device(&self, index: u32) -> DriverResult<Box<dyn Device>>;
}

/// A handle to one physical GPU
pub trait Device {
    fn uuid(&self) -> DriverResult<String>;

    fn mig_mode(&self) -> DriverResult<MigMode>;

    /// Profile attributes for `profile_index` in
    /// `[0, GPU_INSTANCE_PROFILE_COUNT)`. `NotSupported` means the device does
    /// not offer this profile and the index should be skipped.
    fn gpu_instance_profile_info(&self, profile_index: u32)
        -> DriverResult<GpuInstanceProfileInfo>;

    /// Live GPU instances created from `profile`
    fn gpu_instances(
        &self,
        profile: &GpuInstanceProfileInfo,
    ) -> DriverResult<Vec<Box<dyn GpuInstance>>>;

    /// Create a GPU instance of `profile` at a driver-chosen placement.
    /// Fails with `InsufficientResources` when no free placement remains.
    fn create_gpu_instance(
        &self,
        profile: &GpuInstanceProfileInfo,
    ) -> DriverResult<Box<dyn GpuInstance>>;

    /// Look up a live GPU instance by its device-unique id
    fn gpu_instance_by_id(&self, id: u32) -> DriverResult<Box<dyn GpuInstance>>;

    /// Upper bound on the number of MIG device handles this GPU can expose
    fn max_mig_device_count(&self) -> DriverResult<u32>;

    /// MIG device handle at `index`. Handles are returned in contiguous
    /// low-index order until exhausted; the first failing index terminates
    /// enumeration.
    fn mig_device(&self, index: u32) -> DriverResult<Box<dyn MigDevice>>;
}

/// A live GPU instance: a memory partition plus a span of the slice fabric
pub trait GpuInstance {
    fn info(&self) -> DriverResult<GpuInstanceInfo>;

    /// Compute instance profile attributes for `(profile_index,
    /// engine_profile_index)` under this GPU instance
    fn compute_instance_profile_info(
        &self,
        profile_index: u32,
        engine_profile_index: u32,
    ) -> DriverResult<ComputeInstanceProfileInfo>;

    /// Live compute instances of `profile` within this GPU instance
    fn compute_instances(
        &self,
        profile: &ComputeInstanceProfileInfo,
    ) -> DriverResult<Vec<Box<dyn ComputeInstance>>>;

    fn create_compute_instance(
        &self,
        profile: &ComputeInstanceProfileInfo,
    ) -> DriverResult<Box<dyn ComputeInstance>>;

    /// Destroy this GPU instance. Fails with `InUse` while compute instances
    /// remain inside it.
    fn destroy(&self) -> DriverResult<()>;
}

/// A live compute instance within a GPU instance
pub trait ComputeInstance {
    fn info(&self) -> DriverResult<ComputeInstanceInfo>;

    /// Destroy this compute instance. Fails with `InUse` while a client holds
    /// an open context against it.
    fn destroy(&self) -> DriverResult<()>;
}

/// A handle to an exposed MIG device (one compute instance as seen by clients)
pub trait MigDevice {
    fn uuid(&self) -> DriverResult<String>;

    /// The id of the GPU instance this MIG device lives in
    fn gpu_instance_id(&self) -> DriverResult<u32>;
}

impl std::fmt::Debug for dyn MigDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigDevice")
            .field("uuid", &self.uuid())
            .field("gpu_instance_id", &self.gpu_instance_id())
            .finish()
    }
}
