//! Exporting realized placements
//!
//! A read-only view across all MIG-enabled GPUs: which slice offset each
//! exposed MIG device occupies, keyed by its UUID. Used by operators to map
//! workloads onto physical fabric positions.

use std::collections::BTreeMap;

use mig_core::driver::{DeviceDriver, MigMode};
use mig_core::Result;

/// `gpu → (placement start → MIG device UUID)` for every GPU with MIG
/// enabled.
///
/// MIG device handles are enumerated from index zero until the first index
/// that does not resolve; the driver hands them out in contiguous low-index
/// order. Failures after a handle was obtained are fatal for the whole call.
pub(crate) fn collect_placements(
    driver: &dyn DeviceDriver,
) -> Result<BTreeMap<u32, BTreeMap<u32, String>>> {
    let mut placements = BTreeMap::new();

    for gpu in 0..driver.device_count()? {
        let device = driver.device(gpu)?;
        match device.mig_mode() {
            Ok(MigMode::Enabled) => {}
            _ => continue,
        }

        let max_mig_devices = device.max_mig_device_count()?;
        let gpu_placements: &mut BTreeMap<u32, String> = placements.entry(gpu).or_default();

        for index in 0..max_mig_devices {
            let mig_device = match device.mig_device(index) {
                Ok(handle) => handle,
                Err(_) => break,
            };
            let uuid = mig_device.uuid()?;
            let gi_id = mig_device.gpu_instance_id()?;
            let gi = device.gpu_instance_by_id(gi_id)?;
            let info = gi.info()?;
            gpu_placements.insert(info.placement.start, uuid);
        }
    }

    Ok(placements)
}
