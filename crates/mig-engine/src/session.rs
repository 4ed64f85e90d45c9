//! Scoped driver sessions
//!
//! Every public engine call brackets the driver with `init`/`shutdown`. The
//! guard releases the session on all exit paths, including early returns and
//! rollback; a shutdown failure is logged and swallowed so it never masks the
//! call's own result.

use tracing::warn;

use mig_core::driver::DeviceDriver;
use mig_core::{MigError, Result};

pub(crate) struct DriverSession<'a> {
    driver: &'a dyn DeviceDriver,
}

impl<'a> DriverSession<'a> {
    pub(crate) fn open(driver: &'a dyn DeviceDriver) -> Result<Self> {
        driver.init().map_err(MigError::DriverInitFailed)?;
        Ok(Self { driver })
    }
}

impl Drop for DriverSession<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.driver.shutdown() {
            warn!(%error, "error shutting down driver session");
        }
    }
}
