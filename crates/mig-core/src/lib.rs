//! # mig-core
//!
//! Core types, traits, and errors for MIG (Multi-Instance GPU) partitioning.
//!
//! This crate provides the foundational pieces shared across the partitioning
//! engine and its driver backends:
//!
//! - [`MigProfile`], the shape of a partition (compute slices, GPU slices,
//!   memory), with its canonical string form (`1g.5gb`, `1c.2g.10gb`)
//! - [`MigConfig`], a multiset of profiles describing the desired or observed
//!   partitioning of one GPU
//! - The [`driver`] capability traits an actual driver binding (or the
//!   simulator) implements
//! - [`MigError`] and [`DriverError`], the engine-level and driver-level
//!   error types
//!
//! ## Example
//!
//! ```rust
//! use mig_core::{MigConfig, MigProfile};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let desired = MigConfig::new()
//!         .with("3g.20gb".parse()?, 1)
//!         .with("1g.5gb".parse()?, 4);
//!
//!     assert_eq!(desired.total(), 5);
//!     assert_eq!(desired.count(&MigProfile::new(1, 1, 5 * 1024)), 4);
//!
//!     // Larger instances come first in the flattened creation sequence
//!     let flat = desired.flatten();
//!     assert_eq!(flat[0], MigProfile::new(3, 3, 20 * 1024));
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod profile;

// Re-export commonly used types at the crate root
pub use config::MigConfig;
pub use driver::{
    ComputeInstance, ComputeInstanceInfo, ComputeInstanceProfileInfo, Device, DeviceDriver,
    DriverError, DriverResult, GpuInstance, GpuInstanceInfo, GpuInstanceProfileInfo, MigDevice,
    MigMode, Placement,
};
pub use error::{MigError, Result};
pub use profile::{MigProfile, ResolvedProfileIds};
