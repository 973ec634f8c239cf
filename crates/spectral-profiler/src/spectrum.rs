//! FFT Magnitude Spectrum

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

/// Window applied to a series before the transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// No tapering
    #[default]
    Rectangular,
    /// Hamming window to reduce spectral leakage
    Hamming,
}

impl WindowFunction {
    fn apply(self, signal: &mut [f64]) {
        let n = signal.len();
        if self == WindowFunction::Rectangular || n < 2 {
            return;
        }
        for (i, sample) in signal.iter_mut().enumerate() {
            let window = 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos();
            *sample *= window;
        }
    }
}

/// Plans forward transforms and computes half-spectrum magnitudes
pub struct SpectrumAnalyzer {
    /// FFT planner for efficient computation
    planner: FftPlanner<f64>,
    window: WindowFunction,
}

impl SpectrumAnalyzer {
    pub fn new(window: WindowFunction) -> Self {
        Self {
            planner: FftPlanner::new(),
            window,
        }
    }

    /// Reusable transform for series of exactly `len` samples
    pub fn plan(&mut self, len: usize) -> MagnitudeSpectrum {
        MagnitudeSpectrum {
            fft: self.planner.plan_fft_forward(len),
            len,
            window: self.window,
        }
    }

    /// Magnitudes of the first `floor(N / 2)` DFT bins of `signal`
    pub fn analyze(&mut self, signal: &[f64]) -> Vec<f64> {
        if signal.is_empty() {
            return Vec::new();
        }
        self.plan(signal.len()).compute(signal).unwrap_or_default()
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new(WindowFunction::default())
    }
}

/// Planned transform for one series length; shareable across threads
#[derive(Clone)]
pub struct MagnitudeSpectrum {
    fft: Arc<dyn Fft<f64>>,
    len: usize,
    window: WindowFunction,
}

impl MagnitudeSpectrum {
    /// Series length this plan accepts
    pub fn input_len(&self) -> usize {
        self.len
    }

    /// Number of bins produced: `floor(N / 2)`
    pub fn output_len(&self) -> usize {
        self.len / 2
    }

    /// `None` when `signal` does not have the planned length
    pub fn compute(&self, signal: &[f64]) -> Option<Vec<f64>> {
        if signal.len() != self.len {
            return None;
        }
        let mut windowed = signal.to_vec();
        self.window.apply(&mut windowed);

        let mut buffer: Vec<Complex<f64>> = windowed
            .iter()
            .map(|&v| Complex::new(v, 0.0))
            .collect();
        if !buffer.is_empty() {
            self.fft.process(&mut buffer);
        }

        // Positive frequencies only; the mirrored half and Nyquist bin are dropped
        Some(buffer.iter().take(self.output_len()).map(|c| c.norm()).collect())
    }
}
