//! Simulated GPU model
//!
//! One [`SimGpu`] holds the MIG state of a simulated device: its profile
//! table, live GPU instances with their placements, and the compute instances
//! inside them. Placement selection mimics the driver: the first allowed
//! start whose span is free wins.

use std::collections::BTreeMap;

use mig_core::driver::{
    ComputeInstanceProfileInfo, DriverError, DriverResult, GpuInstanceProfileInfo, MigMode,
    Placement,
};

/// Slices on the simulated device fabric
pub const FABRIC_SLICES: u32 = 8;

/// MIG devices a simulated GPU can expose
const MAX_MIG_DEVICES: u32 = 7;

/// One GPU instance profile of the simulated device
struct GiProfileSpec {
    /// Driver-local profile id, deliberately distinct from the profile index
    id: u32,
    slice_count: u32,
    memory_size_mb: u64,
    placement_size: u32,
    allowed_starts: &'static [u32],
}

/// A100 40GB-flavored profile table, indexed by GI profile index.
///
/// Placement sizes and allowed starts follow the hardware: a 3-slice instance
/// occupies a 4-slice span aligned to 0 or 4, a 4-slice instance only fits at
/// 0, and the 7-slice instance claims the whole fabric.
const GI_PROFILES: [Option<GiProfileSpec>; 8] = [
    Some(GiProfileSpec {
        id: 0x10,
        slice_count: 1,
        memory_size_mb: 5 * 1024,
        placement_size: 1,
        allowed_starts: &[0, 1, 2, 3, 4, 5, 6],
    }),
    Some(GiProfileSpec {
        id: 0x11,
        slice_count: 2,
        memory_size_mb: 10 * 1024,
        placement_size: 2,
        allowed_starts: &[0, 2, 4],
    }),
    Some(GiProfileSpec {
        id: 0x12,
        slice_count: 3,
        memory_size_mb: 20 * 1024,
        placement_size: 4,
        allowed_starts: &[0, 4],
    }),
    Some(GiProfileSpec {
        id: 0x13,
        slice_count: 4,
        memory_size_mb: 20 * 1024,
        placement_size: 4,
        allowed_starts: &[0],
    }),
    Some(GiProfileSpec {
        id: 0x14,
        slice_count: 7,
        memory_size_mb: 40 * 1024,
        placement_size: 8,
        allowed_starts: &[0],
    }),
    None,
    None,
    None,
];

/// Base for compute instance profile ids (`id = base + profile_index`)
const CI_PROFILE_ID_BASE: u32 = 0x60;

/// Slice count for a compute instance profile index, per the driver ABI
fn ci_profile_slices(profile_index: u32) -> Option<u32> {
    match profile_index {
        0 => Some(1),
        1 => Some(2),
        2 => Some(3),
        3 => Some(4),
        4 => Some(7),
        5 => Some(8),
        6 => Some(6),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SimCi {
    pub id: u32,
    pub profile_id: u32,
    pub slice_count: u32,
    pub in_use: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SimGi {
    pub id: u32,
    pub profile_id: u32,
    pub slice_count: u32,
    pub placement: Placement,
    pub cis: BTreeMap<u32, SimCi>,
}

pub(crate) struct SimGpu {
    pub uuid: String,
    pub mig_mode: MigMode,
    pub gis: BTreeMap<u32, SimGi>,
    pub max_mig_devices: u32,
    next_gi_id: u32,
    next_ci_id: u32,
}

impl SimGpu {
    pub fn a100(index: usize) -> Self {
        Self {
            uuid: format!("GPU-sim-{}", index),
            mig_mode: MigMode::Enabled,
            gis: BTreeMap::new(),
            max_mig_devices: MAX_MIG_DEVICES,
            next_gi_id: 1,
            next_ci_id: 1,
        }
    }

    pub fn gi_profile_info(&self, profile_index: u32) -> DriverResult<GpuInstanceProfileInfo> {
        let spec = GI_PROFILES
            .get(profile_index as usize)
            .and_then(Option::as_ref)
            .ok_or(DriverError::NotSupported)?;
        Ok(GpuInstanceProfileInfo {
            id: spec.id,
            slice_count: spec.slice_count,
            memory_size_mb: spec.memory_size_mb,
        })
    }

    pub fn ci_profile_info(
        &self,
        gi_id: u32,
        profile_index: u32,
        engine_profile_index: u32,
    ) -> DriverResult<ComputeInstanceProfileInfo> {
        if engine_profile_index != 0 {
            return Err(DriverError::NotSupported);
        }
        let gi = self.gi(gi_id)?;
        let slice_count = ci_profile_slices(profile_index).ok_or(DriverError::NotSupported)?;
        if slice_count > gi.slice_count {
            return Err(DriverError::NotSupported);
        }
        Ok(ComputeInstanceProfileInfo {
            id: CI_PROFILE_ID_BASE + profile_index,
            slice_count,
        })
    }

    pub fn gi(&self, gi_id: u32) -> DriverResult<&SimGi> {
        self.gis.get(&gi_id).ok_or(DriverError::NotFound)
    }

    pub fn gi_mut(&mut self, gi_id: u32) -> DriverResult<&mut SimGi> {
        self.gis.get_mut(&gi_id).ok_or(DriverError::NotFound)
    }

    /// Create a GPU instance of the profile identified by `profile_id`,
    /// placing it at the first allowed start with a free span.
    pub fn create_gi(&mut self, profile_id: u32) -> DriverResult<u32> {
        let spec = GI_PROFILES
            .iter()
            .flatten()
            .find(|spec| spec.id == profile_id)
            .ok_or(DriverError::InvalidArgument)?;

        let start = spec
            .allowed_starts
            .iter()
            .copied()
            .find(|&start| {
                let candidate = Placement {
                    start,
                    size: spec.placement_size,
                };
                !self.gis.values().any(|gi| gi.placement.overlaps(&candidate))
            })
            .ok_or(DriverError::InsufficientResources)?;

        let id = self.next_gi_id;
        self.next_gi_id += 1;
        self.gis.insert(
            id,
            SimGi {
                id,
                profile_id,
                slice_count: spec.slice_count,
                placement: Placement {
                    start,
                    size: spec.placement_size,
                },
                cis: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Destroy a GPU instance; refused while compute instances remain
    pub fn destroy_gi(&mut self, gi_id: u32) -> DriverResult<()> {
        let gi = self.gi(gi_id)?;
        if !gi.cis.is_empty() {
            return Err(DriverError::InUse);
        }
        self.gis.remove(&gi_id);
        Ok(())
    }

    /// Create a compute instance inside a GPU instance, bounded by the GPU
    /// instance's slice capacity.
    pub fn create_ci(&mut self, gi_id: u32, profile_id: u32) -> DriverResult<u32> {
        let id = self.next_ci_id;
        let gi = self.gi_mut(gi_id)?;

        let profile_index = profile_id
            .checked_sub(CI_PROFILE_ID_BASE)
            .ok_or(DriverError::InvalidArgument)?;
        let slice_count = ci_profile_slices(profile_index).ok_or(DriverError::InvalidArgument)?;

        let used: u32 = gi.cis.values().map(|ci| ci.slice_count).sum();
        if used + slice_count > gi.slice_count {
            return Err(DriverError::InsufficientResources);
        }

        gi.cis.insert(
            id,
            SimCi {
                id,
                profile_id,
                slice_count,
                in_use: false,
            },
        );
        self.next_ci_id = id + 1;
        Ok(id)
    }

    /// Destroy a compute instance; refused while a client holds it open
    pub fn destroy_ci(&mut self, gi_id: u32, ci_id: u32) -> DriverResult<()> {
        let gi = self.gi_mut(gi_id)?;
        let ci = gi.cis.get(&ci_id).ok_or(DriverError::NotFound)?;
        if ci.in_use {
            return Err(DriverError::InUse);
        }
        gi.cis.remove(&ci_id);
        Ok(())
    }

    /// Live `(gi_id, ci_id)` pairs in the order MIG device handles expose
    /// them
    pub fn mig_device_pairs(&self) -> Vec<(u32, u32)> {
        self.gis
            .values()
            .flat_map(|gi| gi.cis.keys().map(|&ci_id| (gi.id, ci_id)))
            .collect()
    }
}
