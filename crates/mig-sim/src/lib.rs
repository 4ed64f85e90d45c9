//! # mig-sim
//!
//! An in-memory [`DeviceDriver`](mig_core::DeviceDriver) implementation
//! simulating MIG-capable GPUs.
//!
//! The simulator models the parts of driver behavior the engine depends on:
//!
//! - A100-flavored GPU instance profile tables with per-profile placement
//!   constraints over an 8-slice fabric
//! - Driver-chosen first-fit placement, rejecting creation with
//!   `InsufficientResources` when nothing fits (the failure that drives the
//!   engine's ordering search)
//! - `IN_USE` compute instances that refuse destruction
//! - Refcounted `init`/`shutdown` sessions with observable call counters
//! - MIG device handles enumerated in contiguous low-index order
//!
//! Scenario knobs (`set_mig_mode`, `mark_in_use`, placement introspection)
//! let tests stage a GPU and observe the engine's effect on it.
//!
//! ## Example
//!
//! ```rust
//! use mig_core::driver::DeviceDriver;
//! use mig_sim::SimDriver;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = SimDriver::a100(2);
//!     driver.init()?;
//!     assert_eq!(driver.device_count()?, 2);
//!
//!     // The driver picks the placement: first fit among the allowed starts
//!     let device = driver.device(0)?;
//!     let profile = device.gpu_instance_profile_info(0)?;
//!     let gi = device.create_gpu_instance(&profile)?;
//!     assert_eq!(gi.info()?.placement.start, 0);
//!
//!     driver.shutdown()?;
//!     Ok(())
//! }
//! ```

mod driver;
mod gpu;

pub use driver::SimDriver;
pub use gpu::FABRIC_SLICES;
