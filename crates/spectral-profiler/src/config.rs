//! Profiler Configuration

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::spectrum::WindowFunction;

/// Profiler configuration, built once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Root directory holding one subdirectory per class
    pub data_dir: PathBuf,
    /// Name of the time index column dropped from every CSV
    pub time_column: String,
    /// Extension of data files inside a class directory
    pub file_extension: String,
    /// Window applied before the FFT
    pub window: WindowFunction,
    /// Compute per-file spectra on the rayon thread pool
    pub parallel: bool,
    /// Log and skip a failing class group instead of aborting the run
    pub continue_on_error: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/data_slice_256piece"),
            time_column: "Time".to_string(),
            file_extension: "csv".to_string(),
            window: WindowFunction::Rectangular,
            parallel: false,
            continue_on_error: false,
        }
    }
}

impl ProfilerConfig {
    /// Prefix of environment overrides, e.g. `SPECTRAL_DATA_DIR`
    pub const ENV_PREFIX: &'static str = "SPECTRAL";

    /// Defaults, then the optional file, then `SPECTRAL_*` environment
    /// variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(Self::ENV_PREFIX))
    }

    /// [`load`](Self::load) with an explicit environment source layered
    /// over the file
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Configuration rooted at `data_dir` with everything else default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProfilerError;
    use config::Map;

    /// `SPECTRAL_*` source backed by `vars` instead of the process environment
    fn env_from(vars: &[(&str, &str)]) -> Environment {
        let map: Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ProfilerConfig::ENV_PREFIX).source(Some(map))
    }

    fn write_toml(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("profiler.toml");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = ProfilerConfig::default();
        assert_eq!(config.time_column, "Time");
        assert_eq!(config.file_extension, "csv");
        assert_eq!(config.window, WindowFunction::Rectangular);
        assert!(!config.parallel);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(
            dir.path(),
            "data_dir = \"/srv/slices\"\nwindow = \"hamming\"\nparallel = true\n",
        );

        let config = ProfilerConfig::load_with_env(Some(&path), env_from(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/slices"));
        assert_eq!(config.window, WindowFunction::Hamming);
        assert!(config.parallel);
        // Unset keys keep their defaults
        assert_eq!(config.time_column, "Time");
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            ProfilerConfig::load_with_env(Some(&dir.path().join("absent.toml")), env_from(&[]));
        assert!(matches!(result, Err(ProfilerError::Config(_))));
    }

    #[test]
    fn test_with_data_dir() {
        let config = ProfilerConfig::with_data_dir("/tmp/x");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.time_column, "Time");
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_toml(
            dir.path(),
            "time_column = \"FromFile\"\nfile_extension = \"txt\"\nparallel = true\n",
        );
        let env = env_from(&[
            ("SPECTRAL_TIME_COLUMN", "FromEnv"),
            ("SPECTRAL_PARALLEL", "false"),
            ("SPECTRAL_CONTINUE_ON_ERROR", "true"),
            ("OTHER_TIME_COLUMN", "ignored"),
        ]);

        let config = ProfilerConfig::load_with_env(Some(&path), env).unwrap();
        assert_eq!(config.time_column, "FromEnv");
        assert!(!config.parallel);
        assert!(config.continue_on_error);
        // File value survives where the environment is silent
        assert_eq!(config.file_extension, "txt");
    }

    #[test]
    fn test_env_without_file() {
        let env = env_from(&[("SPECTRAL_DATA_DIR", "/data/env"), ("SPECTRAL_WINDOW", "hamming")]);
        let config = ProfilerConfig::load_with_env(None, env).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data/env"));
        assert_eq!(config.window, WindowFunction::Hamming);
        assert_eq!(config.time_column, "Time");
    }
}
