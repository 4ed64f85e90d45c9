//! Reading the realized partitioning of a device
//!
//! The inspector walks the driver's profile index space exhaustively: every
//! GPU instance profile index, and within each live GPU instance every
//! compute instance profile/engine index. `NotSupported` on an index skips
//! it; any other driver error aborts.
//!
//! Counting is per compute instance: a partition is a (GI, CI) pair from the
//! operator's standpoint, so a GPU instance with no compute instance inside
//! it contributes nothing to the observed config.

use mig_core::driver::{
    Device, DriverError, COMPUTE_INSTANCE_ENGINE_PROFILE_COUNT, COMPUTE_INSTANCE_PROFILE_COUNT,
    GPU_INSTANCE_PROFILE_COUNT,
};
use mig_core::{MigConfig, MigProfile, Result};

/// Observed [`MigConfig`] of a device with MIG enabled
pub(crate) fn device_mig_config(device: &dyn Device) -> Result<MigConfig> {
    let mut config = MigConfig::new();

    for profile_index in 0..GPU_INSTANCE_PROFILE_COUNT {
        let gi_profile = match device.gpu_instance_profile_info(profile_index) {
            Ok(info) => info,
            Err(DriverError::NotSupported) => continue,
            Err(err) => return Err(err.into()),
        };

        for gi in device.gpu_instances(&gi_profile)? {
            for ci_index in 0..COMPUTE_INSTANCE_PROFILE_COUNT {
                for engine_index in 0..COMPUTE_INSTANCE_ENGINE_PROFILE_COUNT {
                    let ci_profile =
                        match gi.compute_instance_profile_info(ci_index, engine_index) {
                            Ok(info) => info,
                            Err(DriverError::NotSupported) => continue,
                            Err(err) => return Err(err.into()),
                        };

                    for _ci in gi.compute_instances(&ci_profile)? {
                        config.add(
                            MigProfile::new(
                                ci_profile.slice_count,
                                gi_profile.slice_count,
                                gi_profile.memory_size_mb,
                            ),
                            1,
                        );
                    }
                }
            }
        }
    }

    Ok(config)
}
