//! # mig-engine
//!
//! The MIG configuration reconciliation engine.
//!
//! Given a desired [`MigConfig`] for a GPU, [`MigConfigManager`] computes and
//! executes the create/destroy sequence that realizes it against a
//! [`DeviceDriver`](mig_core::DeviceDriver):
//!
//! - **Selective clear**: existing partitions are destroyed, except ones that
//!   are both in use by a client and still wanted by the desired config; those
//!   are preserved and pruned from the creation plan.
//! - **Ordering search**: the driver places instances itself and rejects
//!   infeasible orders, so creation is retried over the multiset permutations
//!   of the desired sequence until one succeeds.
//! - **Rollback**: a failed reconcile ends with a best-effort full clear, so
//!   a half-built config never survives.
//!
//! The engine is stateless between invocations; the GPU is the source of
//! truth. Every call brackets the driver session and releases it on all exit
//! paths.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use mig_engine::{MigConfig, MigConfigManager, MigProfile};
//! use mig_sim::SimDriver;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = MigConfigManager::new(Arc::new(SimDriver::a100(1)));
//!
//!     // One 3g.20gb partition and four 1g.5gb partitions on GPU 0
//!     let desired: MigConfig = [
//!         (MigProfile::new(3, 3, 20 * 1024), 1),
//!         (MigProfile::new(1, 1, 5 * 1024), 4),
//!     ]
//!     .into_iter()
//!     .collect();
//!
//!     manager.set_mig_config(0, &desired)?;
//!     assert_eq!(manager.get_mig_config(0)?, desired);
//!
//!     Ok(())
//! }
//! ```

mod inspector;
mod manager;
mod permutations;
mod placements;
mod reconciler;
mod session;

pub use manager::MigConfigManager;

// Re-export the data model for callers that only depend on the engine
pub use mig_core::{MigConfig, MigError, MigProfile, Result};
