//! Selective clear and ordered creation
//!
//! One reconciliation attempt runs in two phases against an open device:
//!
//! 1. **Selective clear**: destroy every existing compute and GPU instance,
//!    except where a compute instance is held open by a client *and* its GPU
//!    instance profile still appears in the desired sequence. Such a
//!    partition is preserved and its desired entry is pruned, so the running
//!    workload survives the reconcile.
//! 2. **Creation**: walk the (possibly pruned) sequence in order, creating a
//!    GPU instance and one compute instance per entry, verifying the driver
//!    realized the requested shape.
//!
//! Creation failures are the retryable case: the caller advances to the next
//! permutation of the desired sequence. Everything else aborts.

use std::collections::HashSet;

use tracing::debug;

use mig_core::driver::{
    Device, DriverError, COMPUTE_INSTANCE_ENGINE_PROFILE_COUNT, COMPUTE_INSTANCE_PROFILE_COUNT,
    GPU_INSTANCE_PROFILE_COUNT,
};
use mig_core::{MigError, MigProfile, Result};

use crate::inspector;

/// A failed clear is not retried: destruction is idempotent and a retry
/// cannot change which instances are in use.
const MAX_CLEAR_ATTEMPTS: usize = 1;

/// Destroy the device's partitions, preserving in-use ones that match
/// `desired`, and return the desired entries still left to create.
pub(crate) fn clear_and_collect(
    device: &dyn Device,
    desired: Vec<MigProfile>,
) -> Result<Vec<MigProfile>> {
    // Indices into `desired` satisfied by preserved live partitions
    let mut reserved: HashSet<usize> = HashSet::new();

    for profile_index in 0..GPU_INSTANCE_PROFILE_COUNT {
        let gi_profile = match device.gpu_instance_profile_info(profile_index) {
            Ok(info) => info,
            Err(DriverError::NotSupported) => continue,
            Err(err) => return Err(err.into()),
        };

        for gi in device.gpu_instances(&gi_profile)? {
            let mut destroy_gi = true;

            for ci_index in 0..COMPUTE_INSTANCE_PROFILE_COUNT {
                for engine_index in 0..COMPUTE_INSTANCE_ENGINE_PROFILE_COUNT {
                    let ci_profile =
                        match gi.compute_instance_profile_info(ci_index, engine_index) {
                            Ok(info) => info,
                            Err(DriverError::NotSupported) => continue,
                            Err(err) => return Err(err.into()),
                        };

                    for ci in gi.compute_instances(&ci_profile)? {
                        match ci.destroy() {
                            Ok(()) => {}
                            Err(DriverError::InUse) if !desired.is_empty() && destroy_gi => {
                                let info = gi.info().map_err(MigError::DestroyFailed)?;
                                match desired_index_for_gi(
                                    device,
                                    &desired,
                                    info.profile_id,
                                    &reserved,
                                ) {
                                    Some(index) => {
                                        debug!(
                                            gi = info.id,
                                            profile = %desired[index],
                                            "preserving in-use partition matching desired config"
                                        );
                                        reserved.insert(index);
                                        destroy_gi = false;
                                    }
                                    None => return Err(MigError::InUseUnmatched),
                                }
                            }
                            Err(err) => return Err(MigError::DestroyFailed(err)),
                        }
                    }
                }
            }

            if destroy_gi {
                gi.destroy().map_err(MigError::DestroyFailed)?;
            }
        }
    }

    Ok(desired
        .into_iter()
        .enumerate()
        .filter(|(index, _)| !reserved.contains(index))
        .map(|(_, profile)| profile)
        .collect())
}

/// First unreserved index in `desired` whose GPU instance profile resolves to
/// `gi_profile_id` on this device. Entries that fail to resolve cannot match
/// a live instance and are skipped.
fn desired_index_for_gi(
    device: &dyn Device,
    desired: &[MigProfile],
    gi_profile_id: u32,
    reserved: &HashSet<usize>,
) -> Option<usize> {
    desired.iter().enumerate().find_map(|(index, profile)| {
        if reserved.contains(&index) {
            return None;
        }
        let ids = profile.resolve(device).ok()?;
        let info = device.gpu_instance_profile_info(ids.gi_profile_id).ok()?;
        (info.id == gi_profile_id).then_some(index)
    })
}

/// One reconciliation attempt for a candidate creation ordering
pub(crate) fn attempt_ordering(device: &dyn Device, ordering: &[MigProfile]) -> Result<()> {
    let mut to_create = ordering.to_vec();

    let mut cleared = false;
    for _ in 0..=MAX_CLEAR_ATTEMPTS {
        let existing = inspector::device_mig_config(device)?;
        if cleared || existing.is_empty() {
            break;
        }
        to_create = clear_and_collect(device, to_create)?;
        cleared = true;
    }

    for profile in &to_create {
        let ids = profile.resolve(device)?;

        let gi_profile = device.gpu_instance_profile_info(ids.gi_profile_id)?;
        let gi = device
            .create_gpu_instance(&gi_profile)
            .map_err(|source| MigError::CreateFailed {
                profile: *profile,
                source,
            })?;

        let ci_profile =
            gi.compute_instance_profile_info(ids.ci_profile_id, ids.ci_engine_profile_id)?;
        let ci = gi
            .create_compute_instance(&ci_profile)
            .map_err(|source| MigError::CreateFailed {
                profile: *profile,
                source,
            })?;

        // The driver may silently substitute a shape; that is a hard error,
        // not a reordering problem
        let created = MigProfile::new(
            ci_profile.slice_count,
            gi_profile.slice_count,
            gi_profile.memory_size_mb,
        );
        if created != *profile {
            return Err(MigError::UnsupportedProfile {
                requested: *profile,
                actual: created,
            });
        }

        let gi_info = gi.info()?;
        let ci_info = ci.info()?;
        debug!(
            gi = gi_info.id,
            ci = ci_info.id,
            placement_start = gi_info.placement.start,
            profile = %profile,
            "created MIG partition"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mig_core::driver::DeviceDriver;
    use mig_sim::SimDriver;

    fn p(spec: &str) -> MigProfile {
        spec.parse().unwrap()
    }

    fn open_device(driver: &SimDriver) -> Box<dyn Device> {
        driver.init().unwrap();
        driver.device(0).unwrap()
    }

    #[test]
    fn test_clear_with_empty_desired_destroys_everything() {
        let driver = SimDriver::a100(1);
        let device = open_device(&driver);
        attempt_ordering(device.as_ref(), &[p("1g.5gb"), p("2g.10gb")]).unwrap();

        let remaining = clear_and_collect(device.as_ref(), Vec::new()).unwrap();

        assert!(remaining.is_empty());
        assert!(driver.gpu_instance_ids(0).is_empty());
    }

    #[test]
    fn test_clear_with_empty_desired_reports_in_use() {
        let driver = SimDriver::a100(1);
        let device = open_device(&driver);
        attempt_ordering(device.as_ref(), &[p("1g.5gb")]).unwrap();
        driver.mark_in_use(0, driver.gpu_instance_ids(0)[0], true);

        let err = clear_and_collect(device.as_ref(), Vec::new()).unwrap_err();
        assert!(matches!(err, MigError::DestroyFailed(DriverError::InUse)));
    }

    #[test]
    fn test_attempt_creates_in_sequence_order() {
        let driver = SimDriver::a100(1);
        let device = open_device(&driver);

        attempt_ordering(device.as_ref(), &[p("1g.5gb"), p("3g.20gb")]).unwrap();

        // 1g lands on slice 0, pushing the aligned 3g span to slice 4
        let placements = driver.placements(0);
        let starts: Vec<u32> = placements.iter().map(|pl| pl.start).collect();
        assert!(starts.contains(&0));
        assert!(starts.contains(&4));
    }

    #[test]
    fn test_attempt_surfaces_creation_failure_as_retryable() {
        let driver = SimDriver::a100(1);
        let device = open_device(&driver);

        // A second 3g span cannot be placed
        let err =
            attempt_ordering(device.as_ref(), &[p("3g.20gb"), p("3g.20gb"), p("3g.20gb")])
                .unwrap_err();
        assert!(err.is_retryable());
    }
}
