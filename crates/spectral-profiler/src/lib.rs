//! Spectral Class Profiler
//!
//! Walks a data root holding one directory per class, reads every CSV
//! time-series slice, and averages the one-sided FFT magnitude spectra of
//! each class into a single profile vector.

mod config;
mod error;
mod layout;
mod loader;
mod profiler;
mod spectrum;

pub use self::config::ProfilerConfig;
pub use error::{ProfilerError, Result};
pub use layout::{
    discover_class_groups, list_data_files, numeric_sort_key, sort_class_names, ClassGroup,
};
pub use loader::CsvSeriesReader;
pub use profiler::{ClassProfile, GroupFailure, ProfileReport, SpectralProfiler};
pub use spectrum::{MagnitudeSpectrum, SpectrumAnalyzer, WindowFunction};

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber. Logs go to stderr so stdout
/// carries only the report.
pub fn init_logging(verbose: bool) -> std::result::Result<(), SetGlobalDefaultError> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}
