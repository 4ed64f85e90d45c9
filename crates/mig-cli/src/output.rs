//! Output formatting for the mig CLI

use std::io::Write;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Yaml
    }
}

/// Write `value` to `writer` in the selected format
pub fn write_output<W, T>(writer: &mut W, value: &T, format: OutputFormat) -> Result<()>
where
    W: Write,
    T: Serialize,
{
    match format {
        OutputFormat::Yaml => serde_yaml::to_writer(&mut *writer, value)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mig_core::{MigConfig, MigProfile};
    use std::collections::BTreeMap;

    fn sample_configs() -> BTreeMap<u32, MigConfig> {
        let mut configs = BTreeMap::new();
        configs.insert(
            0,
            MigConfig::new().with(MigProfile::new(1, 1, 5 * 1024), 7),
        );
        configs.insert(1, MigConfig::new());
        configs
    }

    #[test]
    fn test_yaml_output() {
        let mut buf = Vec::new();
        write_output(&mut buf, &sample_configs(), OutputFormat::Yaml).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("1g.5gb: 7"), "unexpected output: {}", text);
    }

    #[test]
    fn test_json_output() {
        let mut buf = Vec::new();
        write_output(&mut buf, &sample_configs(), OutputFormat::Json).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("\"1g.5gb\": 7"), "unexpected output: {}", text);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_placement_view_output() {
        let mut placements: BTreeMap<u32, BTreeMap<u32, String>> = BTreeMap::new();
        placements
            .entry(0)
            .or_default()
            .insert(4, "MIG-GPU-sim-0-1-1".to_string());

        let mut buf = Vec::new();
        write_output(&mut buf, &placements, OutputFormat::Yaml).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("4: MIG-GPU-sim-0-1-1"), "unexpected output: {}", text);
    }
}
