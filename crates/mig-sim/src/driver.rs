//! Simulated driver and its handle types
//!
//! [`SimDriver`] implements the [`DeviceDriver`] capability surface over
//! shared in-memory state. Handles carry ids rather than references, exactly
//! like real driver handles: operating on a destroyed instance reports
//! `NotFound`, and every operation outside an `init`/`shutdown` session
//! reports `Uninitialized`.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use mig_core::driver::{
    ComputeInstance, ComputeInstanceInfo, ComputeInstanceProfileInfo, Device, DeviceDriver,
    DriverError, DriverResult, GpuInstance, GpuInstanceInfo, GpuInstanceProfileInfo, MigDevice,
    MigMode, Placement,
};

use crate::gpu::SimGpu;

struct SimState {
    gpus: Vec<SimGpu>,
    init_depth: u32,
    init_calls: u32,
    shutdown_calls: u32,
}

impl SimState {
    fn ensure_initialized(&self) -> DriverResult<()> {
        if self.init_depth == 0 {
            return Err(DriverError::Uninitialized);
        }
        Ok(())
    }

    fn gpu(&self, index: usize) -> DriverResult<&SimGpu> {
        self.ensure_initialized()?;
        self.gpus.get(index).ok_or(DriverError::InvalidArgument)
    }

    fn gpu_mut(&mut self, index: usize) -> DriverResult<&mut SimGpu> {
        self.ensure_initialized()?;
        self.gpus.get_mut(index).ok_or(DriverError::InvalidArgument)
    }
}

/// Simulated MIG driver over a set of A100-flavored GPUs
pub struct SimDriver {
    state: Arc<Mutex<SimState>>,
}

impl SimDriver {
    /// A driver exposing `gpu_count` MIG-enabled A100-flavored GPUs
    pub fn a100(gpu_count: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                gpus: (0..gpu_count).map(SimGpu::a100).collect(),
                init_depth: 0,
                init_calls: 0,
                shutdown_calls: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("sim state poisoned")
    }

    // ---- scenario knobs -------------------------------------------------

    /// Set the MIG mode of one GPU
    pub fn set_mig_mode(&self, gpu: usize, mode: MigMode) {
        self.state().gpus[gpu].mig_mode = mode;
    }

    /// Mark every compute instance of a GPU instance as held (or released)
    /// by a client
    pub fn mark_in_use(&self, gpu: usize, gi_id: u32, in_use: bool) {
        let mut state = self.state();
        let gi = state.gpus[gpu]
            .gis
            .get_mut(&gi_id)
            .expect("no such gpu instance");
        for ci in gi.cis.values_mut() {
            ci.in_use = in_use;
        }
    }

    /// Ids of the live GPU instances on a GPU, in creation order
    pub fn gpu_instance_ids(&self, gpu: usize) -> Vec<u32> {
        self.state().gpus[gpu].gis.keys().copied().collect()
    }

    /// Placements of the live GPU instances on a GPU
    pub fn placements(&self, gpu: usize) -> Vec<Placement> {
        self.state().gpus[gpu]
            .gis
            .values()
            .map(|gi| gi.placement)
            .collect()
    }

    /// How many times `init` has been called
    pub fn init_calls(&self) -> u32 {
        self.state().init_calls
    }

    /// How many times `shutdown` has been called
    pub fn shutdown_calls(&self) -> u32 {
        self.state().shutdown_calls
    }

    /// Current session nesting depth
    pub fn init_depth(&self) -> u32 {
        self.state().init_depth
    }
}

impl DeviceDriver for SimDriver {
    fn init(&self) -> DriverResult<()> {
        let mut state = self.state();
        state.init_depth += 1;
        state.init_calls += 1;
        Ok(())
    }

    fn shutdown(&self) -> DriverResult<()> {
        let mut state = self.state();
        if state.init_depth == 0 {
            return Err(DriverError::Uninitialized);
        }
        state.init_depth -= 1;
        state.shutdown_calls += 1;
        Ok(())
    }

    fn device_count(&self) -> DriverResult<u32> {
        let state = self.state();
        state.ensure_initialized()?;
        Ok(state.gpus.len() as u32)
    }

    fn device(&self, index: u32) -> DriverResult<Box<dyn Device>> {
        let state = self.state();
        state.gpu(index as usize)?;
        Ok(Box::new(SimDeviceHandle {
            state: Arc::clone(&self.state),
            gpu: index as usize,
        }))
    }
}

struct SimDeviceHandle {
    state: Arc<Mutex<SimState>>,
    gpu: usize,
}

impl SimDeviceHandle {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("sim state poisoned")
    }

    fn gi_handle(&self, gi_id: u32) -> Box<dyn GpuInstance> {
        Box::new(SimGiHandle {
            state: Arc::clone(&self.state),
            gpu: self.gpu,
            gi_id,
        })
    }
}

impl Device for SimDeviceHandle {
    fn uuid(&self) -> DriverResult<String> {
        Ok(self.state().gpu(self.gpu)?.uuid.clone())
    }

    fn mig_mode(&self) -> DriverResult<MigMode> {
        Ok(self.state().gpu(self.gpu)?.mig_mode)
    }

    fn gpu_instance_profile_info(
        &self,
        profile_index: u32,
    ) -> DriverResult<GpuInstanceProfileInfo> {
        self.state().gpu(self.gpu)?.gi_profile_info(profile_index)
    }

    fn gpu_instances(
        &self,
        profile: &GpuInstanceProfileInfo,
    ) -> DriverResult<Vec<Box<dyn GpuInstance>>> {
        let ids: Vec<u32> = self
            .state()
            .gpu(self.gpu)?
            .gis
            .values()
            .filter(|gi| gi.profile_id == profile.id)
            .map(|gi| gi.id)
            .collect();
        Ok(ids.into_iter().map(|id| self.gi_handle(id)).collect())
    }

    fn create_gpu_instance(
        &self,
        profile: &GpuInstanceProfileInfo,
    ) -> DriverResult<Box<dyn GpuInstance>> {
        let gi_id = {
            let mut state = self.state();
            let gpu = state.gpu_mut(self.gpu)?;
            gpu.create_gi(profile.id)?
        };
        debug!(gpu = self.gpu, gi = gi_id, profile = profile.id, "sim: created gpu instance");
        Ok(self.gi_handle(gi_id))
    }

    fn gpu_instance_by_id(&self, id: u32) -> DriverResult<Box<dyn GpuInstance>> {
        self.state().gpu(self.gpu)?.gi(id)?;
        Ok(self.gi_handle(id))
    }

    fn max_mig_device_count(&self) -> DriverResult<u32> {
        Ok(self.state().gpu(self.gpu)?.max_mig_devices)
    }

    fn mig_device(&self, index: u32) -> DriverResult<Box<dyn MigDevice>> {
        let state = self.state();
        let gpu = state.gpu(self.gpu)?;
        let pairs = gpu.mig_device_pairs();
        let &(gi_id, ci_id) = pairs.get(index as usize).ok_or(DriverError::NotFound)?;
        Ok(Box::new(SimMigHandle {
            state: Arc::clone(&self.state),
            gpu: self.gpu,
            gi_id,
            ci_id,
        }))
    }
}

struct SimGiHandle {
    state: Arc<Mutex<SimState>>,
    gpu: usize,
    gi_id: u32,
}

impl SimGiHandle {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("sim state poisoned")
    }
}

impl GpuInstance for SimGiHandle {
    fn info(&self) -> DriverResult<GpuInstanceInfo> {
        let state = self.state();
        let gi = state.gpu(self.gpu)?.gi(self.gi_id)?;
        Ok(GpuInstanceInfo {
            id: gi.id,
            profile_id: gi.profile_id,
            placement: gi.placement,
        })
    }

    fn compute_instance_profile_info(
        &self,
        profile_index: u32,
        engine_profile_index: u32,
    ) -> DriverResult<ComputeInstanceProfileInfo> {
        self.state()
            .gpu(self.gpu)?
            .ci_profile_info(self.gi_id, profile_index, engine_profile_index)
    }

    fn compute_instances(
        &self,
        profile: &ComputeInstanceProfileInfo,
    ) -> DriverResult<Vec<Box<dyn ComputeInstance>>> {
        let state = self.state();
        let gi = state.gpu(self.gpu)?.gi(self.gi_id)?;
        Ok(gi
            .cis
            .values()
            .filter(|ci| ci.profile_id == profile.id)
            .map(|ci| {
                Box::new(SimCiHandle {
                    state: Arc::clone(&self.state),
                    gpu: self.gpu,
                    gi_id: self.gi_id,
                    ci_id: ci.id,
                }) as Box<dyn ComputeInstance>
            })
            .collect())
    }

    fn create_compute_instance(
        &self,
        profile: &ComputeInstanceProfileInfo,
    ) -> DriverResult<Box<dyn ComputeInstance>> {
        let ci_id = {
            let mut state = self.state();
            let gpu = state.gpu_mut(self.gpu)?;
            gpu.create_ci(self.gi_id, profile.id)?
        };
        debug!(
            gpu = self.gpu,
            gi = self.gi_id,
            ci = ci_id,
            profile = profile.id,
            "sim: created compute instance"
        );
        Ok(Box::new(SimCiHandle {
            state: Arc::clone(&self.state),
            gpu: self.gpu,
            gi_id: self.gi_id,
            ci_id,
        }))
    }

    fn destroy(&self) -> DriverResult<()> {
        let mut state = self.state();
        state.gpu_mut(self.gpu)?.destroy_gi(self.gi_id)?;
        debug!(gpu = self.gpu, gi = self.gi_id, "sim: destroyed gpu instance");
        Ok(())
    }
}

struct SimCiHandle {
    state: Arc<Mutex<SimState>>,
    gpu: usize,
    gi_id: u32,
    ci_id: u32,
}

impl ComputeInstance for SimCiHandle {
    fn info(&self) -> DriverResult<ComputeInstanceInfo> {
        let state = self.state.lock().expect("sim state poisoned");
        let gi = state.gpu(self.gpu)?.gi(self.gi_id)?;
        let ci = gi.cis.get(&self.ci_id).ok_or(DriverError::NotFound)?;
        Ok(ComputeInstanceInfo {
            id: ci.id,
            profile_id: ci.profile_id,
        })
    }

    fn destroy(&self) -> DriverResult<()> {
        let mut state = self.state.lock().expect("sim state poisoned");
        state.gpu_mut(self.gpu)?.destroy_ci(self.gi_id, self.ci_id)?;
        debug!(
            gpu = self.gpu,
            gi = self.gi_id,
            ci = self.ci_id,
            "sim: destroyed compute instance"
        );
        Ok(())
    }
}

struct SimMigHandle {
    state: Arc<Mutex<SimState>>,
    gpu: usize,
    gi_id: u32,
    ci_id: u32,
}

impl MigDevice for SimMigHandle {
    fn uuid(&self) -> DriverResult<String> {
        let state = self.state.lock().expect("sim state poisoned");
        let gpu = state.gpu(self.gpu)?;
        Ok(format!("MIG-{}-{}-{}", gpu.uuid, self.gi_id, self.ci_id))
    }

    fn gpu_instance_id(&self) -> DriverResult<u32> {
        Ok(self.gi_id)
    }
}
