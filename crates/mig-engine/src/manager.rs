//! Public API of the reconciliation engine
//!
//! [`MigConfigManager`] wraps a [`DeviceDriver`] and exposes the engine
//! operations. Every call opens its own driver session and releases it on all
//! exit paths; the engine keeps no state of its own between calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info};

use mig_core::driver::{Device, DeviceDriver, DriverError, MigMode};
use mig_core::{MigConfig, MigError, MigProfile, Result};

use crate::session::DriverSession;
use crate::{inspector, permutations, placements, reconciler};

/// Reconciles and inspects MIG partitionings through a device driver
pub struct MigConfigManager {
    driver: Arc<dyn DeviceDriver>,
}

impl MigConfigManager {
    pub fn new(driver: Arc<dyn DeviceDriver>) -> Self {
        Self { driver }
    }

    /// Read the current partitioning of one GPU
    pub fn get_mig_config(&self, gpu: u32) -> Result<MigConfig> {
        let _session = DriverSession::open(self.driver.as_ref())?;
        let device = self.open_device(gpu)?;
        ensure_mig_enabled(device.as_ref(), gpu)?;
        inspector::device_mig_config(device.as_ref())
    }

    /// Reconcile one GPU to the desired partitioning.
    ///
    /// On success the observed config equals `desired` as a multiset. On
    /// failure a best-effort full clear has run: the GPU holds no partitions
    /// except ones preserved because they are in use, never a half-built
    /// desired set.
    pub fn set_mig_config(&self, gpu: u32, desired: &MigConfig) -> Result<()> {
        let _session = DriverSession::open(self.driver.as_ref())?;
        let device = self.open_device(gpu)?;
        ensure_mig_enabled(device.as_ref(), gpu)?;

        info!(gpu, partitions = desired.total(), "reconciling MIG config");

        let result = permutations::iterate_permutations_until_success(
            desired.flatten(),
            |ordering| reconciler::attempt_ordering(device.as_ref(), ordering),
        );

        if let Err(err) = result {
            // Leave a defined state behind: destroy whatever the failed
            // attempts built. In-use instances survive and are reported by
            // the clear error, which must not mask the original failure.
            if let Err(clear_err) = reconciler::clear_and_collect(device.as_ref(), Vec::new()) {
                error!(
                    gpu,
                    error = %clear_err,
                    "error clearing MIG config after failed reconcile, erroneous instances may persist"
                );
            }
            return Err(err);
        }

        Ok(())
    }

    /// Destroy the GPU's partitions, preserving in-use ones that match
    /// `desired`, and return the desired entries still left to create.
    pub fn clear_and_get_instances_to_create(
        &self,
        gpu: u32,
        desired: Vec<MigProfile>,
    ) -> Result<Vec<MigProfile>> {
        let _session = DriverSession::open(self.driver.as_ref())?;
        let device = self.open_device(gpu)?;
        ensure_mig_enabled(device.as_ref(), gpu)?;
        reconciler::clear_and_collect(device.as_ref(), desired)
    }

    /// Placement starts and UUIDs of the exposed MIG devices on every
    /// MIG-enabled GPU
    pub fn get_mig_placements(&self) -> Result<BTreeMap<u32, BTreeMap<u32, String>>> {
        let _session = DriverSession::open(self.driver.as_ref())?;
        placements::collect_placements(self.driver.as_ref())
    }

    /// Current configs of every MIG-enabled GPU, for export
    pub fn export_mig_configs(&self) -> Result<BTreeMap<u32, MigConfig>> {
        let _session = DriverSession::open(self.driver.as_ref())?;

        let mut configs = BTreeMap::new();
        for gpu in 0..self.driver.device_count()? {
            let device = self.open_device(gpu)?;
            match device.mig_mode() {
                Ok(MigMode::Enabled) => {}
                _ => continue,
            }
            configs.insert(gpu, inspector::device_mig_config(device.as_ref())?);
        }
        Ok(configs)
    }

    fn open_device(&self, gpu: u32) -> Result<Box<dyn Device>> {
        self.driver.device(gpu).map_err(|err| match err {
            DriverError::InvalidArgument | DriverError::NotFound => MigError::NoSuchDevice(gpu),
            other => MigError::Driver(other),
        })
    }
}

fn ensure_mig_enabled(device: &dyn Device, gpu: u32) -> Result<()> {
    match device.mig_mode()? {
        MigMode::Enabled => Ok(()),
        MigMode::Disabled => Err(MigError::MigDisabled(gpu)),
        MigMode::Unsupported => Err(MigError::MigUnsupported(gpu)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mig_sim::{SimDriver, FABRIC_SLICES};

    fn p(spec: &str) -> MigProfile {
        spec.parse().unwrap()
    }

    fn config(entries: &[(&str, usize)]) -> MigConfig {
        entries
            .iter()
            .map(|&(spec, count)| (p(spec), count))
            .collect()
    }

    fn setup(gpus: usize) -> (Arc<SimDriver>, MigConfigManager) {
        let driver = Arc::new(SimDriver::a100(gpus));
        let manager = MigConfigManager::new(driver.clone());
        (driver, manager)
    }

    fn assert_placements_valid(driver: &SimDriver, gpu: usize) {
        let placements = driver.placements(gpu);
        for (i, a) in placements.iter().enumerate() {
            assert!(a.start + a.size <= FABRIC_SLICES, "{:?} exceeds fabric", a);
            for b in placements.iter().skip(i + 1) {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_round_trip_seven_single_slices() {
        let (driver, manager) = setup(1);
        let desired = config(&[("1g.5gb", 7)]);

        manager.set_mig_config(0, &desired).unwrap();

        assert_eq!(manager.get_mig_config(0).unwrap(), desired);
        assert_eq!(driver.gpu_instance_ids(0).len(), 7);
        assert_placements_valid(&driver, 0);
    }

    #[test]
    fn test_mixed_config_reconciles_through_reordering() {
        let (driver, manager) = setup(1);
        // The flattened order (3g first) strands the fabric on this device;
        // the engine must fall back to another ordering
        let desired = config(&[("3g.20gb", 1), ("1g.5gb", 4)]);

        manager.set_mig_config(0, &desired).unwrap();

        assert_eq!(manager.get_mig_config(0).unwrap(), desired);
        assert_placements_valid(&driver, 0);
    }

    #[test]
    fn test_preserves_in_use_partition_still_desired() {
        let (driver, manager) = setup(1);
        manager.set_mig_config(0, &config(&[("1g.5gb", 1)])).unwrap();
        let existing = driver.gpu_instance_ids(0);
        driver.mark_in_use(0, existing[0], true);

        manager.set_mig_config(0, &config(&[("1g.5gb", 2)])).unwrap();

        assert_eq!(manager.get_mig_config(0).unwrap(), config(&[("1g.5gb", 2)]));
        let after = driver.gpu_instance_ids(0);
        assert_eq!(after.len(), 2);
        assert!(after.contains(&existing[0]), "in-use instance was recreated");
    }

    #[test]
    fn test_in_use_partition_not_desired_fails() {
        let (driver, manager) = setup(1);
        manager.set_mig_config(0, &config(&[("1g.5gb", 1)])).unwrap();
        let existing = driver.gpu_instance_ids(0);
        driver.mark_in_use(0, existing[0], true);

        let err = manager
            .set_mig_config(0, &config(&[("3g.20gb", 1)]))
            .unwrap_err();
        assert!(matches!(err, MigError::InUseUnmatched));

        // The held partition survives the rollback
        assert_eq!(manager.get_mig_config(0).unwrap(), config(&[("1g.5gb", 1)]));
        assert_eq!(driver.gpu_instance_ids(0), existing);
    }

    #[test]
    fn test_replaces_idle_partitions() {
        let (driver, manager) = setup(1);
        manager.set_mig_config(0, &config(&[("3g.20gb", 1)])).unwrap();

        manager.set_mig_config(0, &config(&[("1g.5gb", 7)])).unwrap();

        assert_eq!(manager.get_mig_config(0).unwrap(), config(&[("1g.5gb", 7)]));
        assert_eq!(driver.gpu_instance_ids(0).len(), 7);
        assert_placements_valid(&driver, 0);
    }

    #[test]
    fn test_mig_disabled_rejects_without_touching_the_gpu() {
        let (driver, manager) = setup(1);
        driver.set_mig_mode(0, MigMode::Disabled);

        let err = manager
            .set_mig_config(0, &config(&[("1g.5gb", 1)]))
            .unwrap_err();
        assert!(matches!(err, MigError::MigDisabled(0)));
        assert!(driver.gpu_instance_ids(0).is_empty());

        assert!(matches!(
            manager.get_mig_config(0),
            Err(MigError::MigDisabled(0))
        ));
    }

    #[test]
    fn test_mig_unsupported_device() {
        let (driver, manager) = setup(1);
        driver.set_mig_mode(0, MigMode::Unsupported);
        assert!(matches!(
            manager.get_mig_config(0),
            Err(MigError::MigUnsupported(0))
        ));
    }

    #[test]
    fn test_gpu_index_out_of_range() {
        let (_driver, manager) = setup(2);
        assert!(matches!(
            manager.get_mig_config(7),
            Err(MigError::NoSuchDevice(7))
        ));
    }

    #[test]
    fn test_empty_target_clears_everything() {
        let (driver, manager) = setup(1);
        manager.set_mig_config(0, &config(&[("1g.5gb", 3)])).unwrap();

        manager.set_mig_config(0, &MigConfig::new()).unwrap();

        assert!(manager.get_mig_config(0).unwrap().is_empty());
        assert!(driver.gpu_instance_ids(0).is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (_driver, manager) = setup(1);
        let desired = config(&[("3g.20gb", 1), ("1g.5gb", 2)]);

        manager.set_mig_config(0, &desired).unwrap();
        manager.set_mig_config(0, &desired).unwrap();

        assert_eq!(manager.get_mig_config(0).unwrap(), desired);
    }

    #[test]
    fn test_idempotent_reconcile_preserves_in_use_instances() {
        let (driver, manager) = setup(1);
        let desired = config(&[("1g.5gb", 2)]);
        manager.set_mig_config(0, &desired).unwrap();

        let before = driver.gpu_instance_ids(0);
        for &gi in &before {
            driver.mark_in_use(0, gi, true);
        }

        manager.set_mig_config(0, &desired).unwrap();
        assert_eq!(driver.gpu_instance_ids(0), before);
    }

    #[test]
    fn test_two_in_use_instances_consume_distinct_slots() {
        let (driver, manager) = setup(1);
        manager.set_mig_config(0, &config(&[("1g.5gb", 2)])).unwrap();
        let before = driver.gpu_instance_ids(0);
        for &gi in &before {
            driver.mark_in_use(0, gi, true);
        }

        manager.set_mig_config(0, &config(&[("1g.5gb", 3)])).unwrap();

        let after = driver.gpu_instance_ids(0);
        assert_eq!(after.len(), 3);
        for gi in &before {
            assert!(after.contains(gi), "preserved instance {} was recreated", gi);
        }
    }

    #[test]
    fn test_rollback_on_unsatisfiable_config() {
        let (driver, manager) = setup(1);
        // Eight single slices can never be placed; every ordering fails
        let err = manager
            .set_mig_config(0, &config(&[("1g.5gb", 8)]))
            .unwrap_err();
        assert!(matches!(err, MigError::AllOrderingsFailed { .. }));

        assert!(manager.get_mig_config(0).unwrap().is_empty());
        assert!(driver.gpu_instance_ids(0).is_empty());
    }

    #[test]
    fn test_unknown_profile_fails_after_rollback() {
        let (driver, manager) = setup(1);
        manager.set_mig_config(0, &config(&[("1g.5gb", 1)])).unwrap();

        let err = manager
            .set_mig_config(0, &config(&[("5g.40gb", 1)]))
            .unwrap_err();
        assert!(matches!(err, MigError::UnknownProfile(_)));

        // The idle existing partition was cleared before resolution failed
        assert!(manager.get_mig_config(0).unwrap().is_empty());
        assert!(driver.gpu_instance_ids(0).is_empty());
    }

    #[test]
    fn test_public_clear_prunes_preserved_entries() {
        let (driver, manager) = setup(1);
        manager.set_mig_config(0, &config(&[("1g.5gb", 1)])).unwrap();
        let existing = driver.gpu_instance_ids(0);
        driver.mark_in_use(0, existing[0], true);

        let remaining = manager
            .clear_and_get_instances_to_create(0, vec![p("1g.5gb"), p("1g.5gb")])
            .unwrap();

        assert_eq!(remaining, vec![p("1g.5gb")]);
        assert_eq!(driver.gpu_instance_ids(0), existing);
    }

    #[test]
    fn test_session_released_on_every_path() {
        let (driver, manager) = setup(1);

        manager.set_mig_config(0, &config(&[("1g.5gb", 1)])).unwrap();
        let _ = manager.set_mig_config(0, &config(&[("1g.5gb", 8)]));
        let _ = manager.get_mig_config(9);
        let _ = manager.get_mig_placements();

        assert_eq!(driver.init_depth(), 0);
        assert_eq!(driver.init_calls(), driver.shutdown_calls());
    }

    #[test]
    fn test_placement_export_maps_starts_to_uuids() {
        let (driver, manager) = setup(3);
        manager
            .set_mig_config(0, &config(&[("3g.20gb", 1), ("1g.5gb", 1)]))
            .unwrap();
        driver.set_mig_mode(2, MigMode::Disabled);

        let placements = manager.get_mig_placements().unwrap();

        // GPU 0: a 3g span and a 1g slice at driver-chosen offsets
        let gpu0 = &placements[&0];
        assert_eq!(gpu0.len(), 2);
        for (start, uuid) in gpu0 {
            assert!(*start < FABRIC_SLICES);
            assert!(uuid.starts_with("MIG-"), "unexpected uuid {}", uuid);
        }

        // GPU 1 is enabled but empty; GPU 2 is disabled and absent
        assert!(placements[&1].is_empty());
        assert!(!placements.contains_key(&2));
    }

    #[test]
    fn test_export_configs_skips_non_mig_gpus() {
        let (driver, manager) = setup(3);
        let desired = config(&[("2g.10gb", 2)]);
        manager.set_mig_config(0, &desired).unwrap();
        driver.set_mig_mode(1, MigMode::Disabled);

        let exported = manager.export_mig_configs().unwrap();

        assert_eq!(exported.len(), 2);
        assert_eq!(exported[&0], desired);
        assert!(exported[&2].is_empty());
        assert!(!exported.contains_key(&1));
    }
}
