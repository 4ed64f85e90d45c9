//! MIG partition shapes
//!
//! A [`MigProfile`] identifies the shape of a partition: how many compute
//! slices, how many GPU slices, and how much memory. Two profiles are equal
//! iff all three components are equal. The canonical string form follows the
//! `1g.5gb` / `1c.2g.10gb` convention, with the compute component elided when
//! it matches the GPU slice count.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::driver::{Device, COMPUTE_INSTANCE_ENGINE_PROFILE_SHARED, GPU_INSTANCE_PROFILE_COUNT};
use crate::error::MigError;

/// The shape of a MIG partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MigProfile {
    /// Compute slices of the compute instance
    pub ci_slices: u32,
    /// GPU slices of the GPU instance
    pub gi_slices: u32,
    /// Memory of the GPU instance, in MB
    pub memory_mb: u64,
}

/// Driver-local profile indices a [`MigProfile`] resolves to on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedProfileIds {
    pub gi_profile_id: u32,
    pub ci_profile_id: u32,
    pub ci_engine_profile_id: u32,
}

impl MigProfile {
    pub fn new(ci_slices: u32, gi_slices: u32, memory_mb: u64) -> Self {
        Self {
            ci_slices,
            gi_slices,
            memory_mb,
        }
    }

    /// Memory rounded to whole GiB, as used in the string form
    pub fn memory_gb(&self) -> u64 {
        (self.memory_mb + 512) / 1024
    }

    /// Resolve this profile against a device.
    ///
    /// The GPU instance profile index is found by scanning the device's
    /// profile table for a matching `(slice_count, memory_size_mb)` pair; the
    /// compute instance profile index comes from the fixed slice-count table
    /// of the driver ABI. Returns [`MigError::UnknownProfile`] when the device
    /// cannot express this shape.
    pub fn resolve(&self, device: &dyn Device) -> Result<ResolvedProfileIds, MigError> {
        let gi_profile_id = (0..GPU_INSTANCE_PROFILE_COUNT)
            .find(|&index| {
                matches!(
                    device.gpu_instance_profile_info(index),
                    Ok(info) if info.slice_count == self.gi_slices
                        && info.memory_size_mb == self.memory_mb
                )
            })
            .ok_or(MigError::UnknownProfile(*self))?;

        let ci_profile_id =
            compute_instance_profile_index(self.ci_slices).ok_or(MigError::UnknownProfile(*self))?;

        Ok(ResolvedProfileIds {
            gi_profile_id,
            ci_profile_id,
            ci_engine_profile_id: COMPUTE_INSTANCE_ENGINE_PROFILE_SHARED,
        })
    }
}

/// Compute instance profile index for a slice count, per the driver ABI
fn compute_instance_profile_index(slices: u32) -> Option<u32> {
    match slices {
        1 => Some(0),
        2 => Some(1),
        3 => Some(2),
        4 => Some(3),
        7 => Some(4),
        8 => Some(5),
        6 => Some(6),
        _ => None,
    }
}

impl fmt::Display for MigProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ci_slices == self.gi_slices {
            write!(f, "{}g.{}gb", self.gi_slices, self.memory_gb())
        } else {
            write!(
                f,
                "{}c.{}g.{}gb",
                self.ci_slices,
                self.gi_slices,
                self.memory_gb()
            )
        }
    }
}

impl FromStr for MigProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let (ci_part, gi_part, mem_part) = match parts.as_slice() {
            [gi, mem] => (None, *gi, *mem),
            [ci, gi, mem] => (Some(*ci), *gi, *mem),
            _ => return Err(format!("malformed MIG profile: {}", s)),
        };

        let gi_slices = parse_component(gi_part, "g", s)?;
        let ci_slices = match ci_part {
            Some(ci) => parse_component(ci, "c", s)?,
            None => gi_slices,
        };
        let memory_gb = parse_component(mem_part, "gb", s)? as u64;

        Ok(MigProfile::new(ci_slices, gi_slices, memory_gb * 1024))
    }
}

fn parse_component(value: &str, suffix: &str, full: &str) -> Result<u32, String> {
    value
        .strip_suffix(suffix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| format!("malformed MIG profile: {}", full))
}

impl Serialize for MigProfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MigProfile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{
        DriverError, DriverResult, GpuInstance, GpuInstanceProfileInfo, MigDevice, MigMode,
    };

    /// Device stub exposing two GI profiles at non-contiguous indices
    struct StubDevice;

    impl Device for StubDevice {
        fn uuid(&self) -> DriverResult<String> {
            Ok("GPU-stub".to_string())
        }

        fn mig_mode(&self) -> DriverResult<MigMode> {
            Ok(MigMode::Enabled)
        }

        fn gpu_instance_profile_info(
            &self,
            profile_index: u32,
        ) -> DriverResult<GpuInstanceProfileInfo> {
            match profile_index {
                0 => Ok(GpuInstanceProfileInfo {
                    id: 9,
                    slice_count: 1,
                    memory_size_mb: 5 * 1024,
                }),
                2 => Ok(GpuInstanceProfileInfo {
                    id: 19,
                    slice_count: 3,
                    memory_size_mb: 20 * 1024,
                }),
                _ => Err(DriverError::NotSupported),
            }
        }

        fn gpu_instances(
            &self,
            _profile: &GpuInstanceProfileInfo,
        ) -> DriverResult<Vec<Box<dyn GpuInstance>>> {
            Ok(Vec::new())
        }

        fn create_gpu_instance(
            &self,
            _profile: &GpuInstanceProfileInfo,
        ) -> DriverResult<Box<dyn GpuInstance>> {
            Err(DriverError::NotSupported)
        }

        fn gpu_instance_by_id(&self, _id: u32) -> DriverResult<Box<dyn GpuInstance>> {
            Err(DriverError::NotFound)
        }

        fn max_mig_device_count(&self) -> DriverResult<u32> {
            Ok(0)
        }

        fn mig_device(&self, _index: u32) -> DriverResult<Box<dyn MigDevice>> {
            Err(DriverError::NotFound)
        }
    }

    #[test]
    fn test_profile_equality_is_structural() {
        let a = MigProfile::new(1, 1, 5 * 1024);
        let b = MigProfile::new(1, 1, 5 * 1024);
        let c = MigProfile::new(1, 2, 5 * 1024);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_display_elides_matching_compute_slices() {
        assert_eq!(MigProfile::new(1, 1, 5 * 1024).to_string(), "1g.5gb");
        assert_eq!(MigProfile::new(3, 3, 20 * 1024).to_string(), "3g.20gb");
        assert_eq!(MigProfile::new(1, 2, 10 * 1024).to_string(), "1c.2g.10gb");
    }

    #[test]
    fn test_display_rounds_memory_to_gb() {
        // A real 1g slice on a 40GB part reports 4864 MB
        assert_eq!(MigProfile::new(1, 1, 4864).to_string(), "1g.5gb");
    }

    #[test]
    fn test_parse_both_forms() {
        assert_eq!(
            "1g.5gb".parse::<MigProfile>().unwrap(),
            MigProfile::new(1, 1, 5 * 1024)
        );
        assert_eq!(
            "2c.3g.20gb".parse::<MigProfile>().unwrap(),
            MigProfile::new(2, 3, 20 * 1024)
        );
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!("".parse::<MigProfile>().is_err());
        assert!("1g".parse::<MigProfile>().is_err());
        assert!("1x.5gb".parse::<MigProfile>().is_err());
        assert!("1c.2g.3g.5gb".parse::<MigProfile>().is_err());
        assert!("g.5gb".parse::<MigProfile>().is_err());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let profile = MigProfile::new(1, 2, 10 * 1024);
        let json = serde_json::to_string(&profile).unwrap();
        assert_eq!(json, "\"1c.2g.10gb\"");

        let back: MigProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_resolve_scans_device_profile_table() {
        let ids = MigProfile::new(1, 1, 5 * 1024).resolve(&StubDevice).unwrap();
        assert_eq!(ids.gi_profile_id, 0);
        assert_eq!(ids.ci_profile_id, 0);
        assert_eq!(ids.ci_engine_profile_id, 0);

        let ids = MigProfile::new(2, 3, 20 * 1024).resolve(&StubDevice).unwrap();
        assert_eq!(ids.gi_profile_id, 2);
        assert_eq!(ids.ci_profile_id, 1);
    }

    #[test]
    fn test_resolve_unknown_shape_fails() {
        // No 2-slice GI profile on the stub device
        let err = MigProfile::new(2, 2, 10 * 1024)
            .resolve(&StubDevice)
            .unwrap_err();
        assert!(matches!(err, MigError::UnknownProfile(_)));

        // GI shape exists but 5 compute slices is not in the ABI table
        let err = MigProfile::new(5, 3, 20 * 1024)
            .resolve(&StubDevice)
            .unwrap_err();
        assert!(matches!(err, MigError::UnknownProfile(_)));
    }
}
