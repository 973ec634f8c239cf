//! Spectral profiler CLI

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use spectral_profiler::{init_logging, ProfilerConfig, SpectralProfiler, WindowFunction};
use tracing::info;

/// Per-class mean FFT magnitude profiles of CSV time-series slices
#[derive(Debug, Parser)]
#[command(name = "spectral-profiler", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory holding one subdirectory per class
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Name of the time index column
    #[arg(long)]
    time_column: Option<String>,

    /// Window applied before the FFT
    #[arg(long, value_enum)]
    window: Option<WindowFunction>,

    /// Compute per-file spectra in parallel (`--parallel=false` turns off a
    /// configured `parallel = true`)
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    parallel: Option<bool>,

    /// Skip failing classes instead of aborting
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    continue_on_error: Option<bool>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, mut config: ProfilerConfig) -> ProfilerConfig {
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(column) = self.time_column {
            config.time_column = column;
        }
        if let Some(window) = self.window {
            config.window = window;
        }
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
        if let Some(continue_on_error) = self.continue_on_error {
            config.continue_on_error = continue_on_error;
        }
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose).context("Failed to set tracing subscriber")?;

    info!("=== Spectral Profiler v{} ===", env!("CARGO_PKG_VERSION"));

    let config = ProfilerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let json = cli.json;
    let config = cli.apply(config);

    let report = SpectralProfiler::new(config)
        .run()
        .context("Profiling failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> ProfilerConfig {
        ProfilerConfig {
            data_dir: PathBuf::from("/from/file"),
            time_column: "FileTime".to_string(),
            window: WindowFunction::Hamming,
            parallel: true,
            continue_on_error: true,
            ..ProfilerConfig::default()
        }
    }

    #[test]
    fn test_flags_override_loaded_config() {
        let cli = Cli::parse_from([
            "spectral-profiler",
            "--data-dir",
            "/from/cli",
            "--time-column",
            "CliTime",
            "--window",
            "rectangular",
            "--parallel=false",
            "--continue-on-error=false",
        ]);
        let config = cli.apply(loaded());
        assert_eq!(config.data_dir, PathBuf::from("/from/cli"));
        assert_eq!(config.time_column, "CliTime");
        assert_eq!(config.window, WindowFunction::Rectangular);
        assert!(!config.parallel);
        assert!(!config.continue_on_error);
    }

    #[test]
    fn test_absent_flags_keep_loaded_config() {
        let config = Cli::parse_from(["spectral-profiler"]).apply(loaded());
        assert_eq!(config, loaded());
    }

    #[test]
    fn test_bare_flags_enable() {
        let cli = Cli::parse_from(["spectral-profiler", "--parallel", "--continue-on-error"]);
        let config = cli.apply(ProfilerConfig::default());
        assert!(config.parallel);
        assert!(config.continue_on_error);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
