//! Per-class Mean Spectrum Aggregation

use std::fmt;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ProfilerConfig;
use crate::error::{ProfilerError, Result};
use crate::layout::{discover_class_groups, ClassGroup};
use crate::loader::CsvSeriesReader;
use crate::spectrum::{MagnitudeSpectrum, SpectrumAnalyzer};

/// Aggregate spectrum of one class group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProfile {
    /// Class identifier (directory name)
    pub name: String,
    /// Number of series averaged
    pub file_count: usize,
    /// Element-wise mean of the magnitude spectra
    pub mean: Vec<f64>,
    /// Element-wise population standard deviation
    pub std_dev: Vec<f64>,
}

/// A class group that was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFailure {
    pub class: String,
    pub error: String,
}

/// Profiles of every class, in class order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub classes: Vec<ClassProfile>,
    pub failures: Vec<GroupFailure>,
}

impl ProfileReport {
    /// Profile for a class name
    pub fn get(&self, name: &str) -> Option<&ClassProfile> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// (class, mean vector) pairs in class order
    pub fn mean_vectors(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.classes
            .iter()
            .map(|c| (c.name.as_str(), c.mean.as_slice()))
    }
}

impl fmt::Display for ProfileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for class in &self.classes {
            write!(f, "{} ({} files): [", class.name, class.file_count)?;
            for (i, v) in class.mean.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:.6}", v)?;
            }
            writeln!(f, "]")?;
        }
        for failure in &self.failures {
            writeln!(f, "{}: skipped ({})", failure.class, failure.error)?;
        }
        Ok(())
    }
}

/// Computes the mean FFT magnitude spectrum of each class group
pub struct SpectralProfiler {
    config: ProfilerConfig,
    reader: CsvSeriesReader,
}

impl SpectralProfiler {
    pub fn new(config: ProfilerConfig) -> Self {
        let reader = CsvSeriesReader::new(config.time_column.clone());
        Self { config, reader }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Discover class groups under the configured data root and profile them
    pub fn run(&self) -> Result<ProfileReport> {
        info!("Profiling classes under {}", self.config.data_dir.display());
        let groups = discover_class_groups(&self.config.data_dir, &self.config.file_extension)?;
        self.profile_groups(&groups)
    }

    /// Profile groups in order. A failing group aborts the run unless
    /// `continue_on_error` is set.
    pub fn profile_groups(&self, groups: &[ClassGroup]) -> Result<ProfileReport> {
        let mut report = ProfileReport::default();
        for group in groups {
            match self.profile_group(group) {
                Ok(profile) => report.classes.push(profile),
                Err(e) if self.config.continue_on_error => {
                    warn!("Skipping class {}: {}", group.name, e);
                    report.failures.push(GroupFailure {
                        class: group.name.clone(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            "Profiled {} classes ({} skipped)",
            report.classes.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Mean and deviation of the magnitude spectra of every file in `group`
    pub fn profile_group(&self, group: &ClassGroup) -> Result<ClassProfile> {
        let (first_path, rest) = group
            .files
            .split_first()
            .ok_or_else(|| ProfilerError::EmptyClassGroup(group.name.clone()))?;

        let first = self.reader.read(first_path)?;
        let mut analyzer = SpectrumAnalyzer::new(self.config.window);
        let plan = analyzer.plan(first.len());
        debug!(
            "Class {}: {} files of {} samples -> {} bins",
            group.name,
            group.files.len(),
            plan.input_len(),
            plan.output_len()
        );

        let mut spectra = Vec::with_capacity(group.files.len());
        spectra.push(self.file_spectrum(&group.name, first_path, &first, &plan)?);

        // Each file's transform is independent; the mean waits for all of them
        let rest: Vec<Vec<f64>> = if self.config.parallel {
            rest.par_iter()
                .map(|path| self.read_spectrum(&group.name, path, &plan))
                .collect::<Result<_>>()?
        } else {
            rest.iter()
                .map(|path| self.read_spectrum(&group.name, path, &plan))
                .collect::<Result<_>>()?
        };
        spectra.extend(rest);

        let (mean, std_dev) = mean_and_std(&spectra, plan.output_len());
        info!("Class {}: averaged {} spectra", group.name, spectra.len());
        Ok(ClassProfile {
            name: group.name.clone(),
            file_count: spectra.len(),
            mean,
            std_dev,
        })
    }

    fn read_spectrum(
        &self,
        class: &str,
        path: &Path,
        plan: &MagnitudeSpectrum,
    ) -> Result<Vec<f64>> {
        let series = self.reader.read(path)?;
        self.file_spectrum(class, path, &series, plan)
    }

    fn file_spectrum(
        &self,
        class: &str,
        path: &Path,
        series: &[f64],
        plan: &MagnitudeSpectrum,
    ) -> Result<Vec<f64>> {
        debug!("{}: {} samples", path.display(), series.len());
        plan.compute(series)
            .ok_or_else(|| ProfilerError::LengthMismatch {
                class: class.to_string(),
                path: path.to_path_buf(),
                expected: plan.input_len(),
                actual: series.len(),
            })
    }
}

/// Element-wise mean and population standard deviation, summed in input order
fn mean_and_std(spectra: &[Vec<f64>], bins: usize) -> (Vec<f64>, Vec<f64>) {
    let n = spectra.len().max(1) as f64;
    let mut mean = vec![0.0; bins];
    for spectrum in spectra {
        for (acc, v) in mean.iter_mut().zip(spectrum) {
            *acc += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut var = vec![0.0; bins];
    for spectrum in spectra {
        for ((acc, v), m) in var.iter_mut().zip(spectrum).zip(&mean) {
            *acc += (v - m) * (v - m);
        }
    }
    let std_dev = var.into_iter().map(|v| (v / n).sqrt()).collect();
    (mean, std_dev)
}
