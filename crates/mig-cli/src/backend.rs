//! Driver backend selection

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::ValueEnum;
use tracing::warn;

use mig_core::driver::DeviceDriver;
use mig_sim::SimDriver;

use crate::util;

/// GPUs exposed by the simulated backend
const SIM_GPU_COUNT: usize = 2;

/// Available driver backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-memory simulated driver
    Sim,
    /// Hardware NVML driver
    Nvml,
}

/// Construct the driver for the selected backend
pub fn create_driver(backend: Backend) -> Result<Arc<dyn DeviceDriver>> {
    match backend {
        Backend::Sim => {
            warn!("using simulated GPU data, no hardware will be touched");
            Ok(Arc::new(SimDriver::a100(SIM_GPU_COUNT)))
        }
        Backend::Nvml => {
            if !util::is_nvidia_module_loaded()? {
                bail!("nvidia module must be loaded in order to query MIG device state");
            }
            bail!("the NVML driver binding is not available in this build");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_backend_constructs() {
        let driver = create_driver(Backend::Sim).unwrap();
        driver.init().unwrap();
        assert_eq!(driver.device_count().unwrap(), SIM_GPU_COUNT as u32);
        driver.shutdown().unwrap();
    }
}
