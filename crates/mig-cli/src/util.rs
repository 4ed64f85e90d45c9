//! Host environment checks

use std::io;
use std::path::Path;

const PROC_MODULES: &str = "/proc/modules";

/// Whether the `nvidia` kernel module is loaded, per `/proc/modules`
pub fn is_nvidia_module_loaded() -> io::Result<bool> {
    module_loaded_in(Path::new(PROC_MODULES), "nvidia")
}

fn module_loaded_in(path: &Path, module: &str) -> io::Result<bool> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .any(|line| line.split_whitespace().next() == Some(module)))
}
