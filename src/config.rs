//! Host processing setup and processor configuration

use crate::matrix::WidthLaw;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host-supplied processing context, fixed between two `prepare` calls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub max_block_size: usize,
    pub num_channels: usize,
}

impl ProcessSpec {
    pub fn new(sample_rate: f64, max_block_size: usize, num_channels: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            num_channels,
        }
    }

    /// Sample rate usable for coefficient math (falls back to 48 kHz)
    pub fn effective_sample_rate(&self) -> f64 {
        if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
            self.sample_rate
        } else {
            48000.0
        }
    }
}

impl Default for ProcessSpec {
    fn default() -> Self {
        Self::new(48000.0, 512, 2)
    }
}

/// Invalid [`ProcessorConfig`] values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("gain ramp must be a finite, non-negative duration (got {0} s)")]
    GainRamp(f64),
    #[error("residual energy floor must lie in [0, 1) (got {0})")]
    ResidualFloor(f64),
    #[error("decorrelation window must be a finite, positive duration (got {0} s)")]
    DecorrelationWindow(f64),
    #[error("correlation meter decay must lie in (0, 1) (got {0})")]
    CorrelationDecay(f64),
    #[error("goniometer decimation must be at least 1")]
    GoniometerDecimation,
}

/// Engine tuning that is not exposed as an automatable parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Output gain ramp duration in seconds
    pub gain_ramp_seconds: f64,
    /// A quadrature residual carrying less than this fraction of the in-phase
    /// energy is treated as no side component
    pub residual_energy_floor: f64,
    /// Time constant in seconds of each of the two smoothing stages behind the
    /// decorrelating law's running I/Q statistics
    pub decorrelation_window_seconds: f64,
    /// Width law used while the IIR generator is active; FIR mode always
    /// uses [`WidthLaw::Decorrelating`]
    pub iir_width_law: WidthLaw,
    /// Per-sample decay of the correlation meter's running sums
    pub correlation_decay: f64,
    /// Goniometer keeps every n-th frame
    pub goniometer_decimation: usize,
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gain_ramp_seconds.is_finite() || self.gain_ramp_seconds < 0.0 {
            return Err(ConfigError::GainRamp(self.gain_ramp_seconds));
        }
        if !(0.0..1.0).contains(&self.residual_energy_floor) {
            return Err(ConfigError::ResidualFloor(self.residual_energy_floor));
        }
        if !self.decorrelation_window_seconds.is_finite() || self.decorrelation_window_seconds <= 0.0 {
            return Err(ConfigError::DecorrelationWindow(self.decorrelation_window_seconds));
        }
        if !(self.correlation_decay > 0.0 && self.correlation_decay < 1.0) {
            return Err(ConfigError::CorrelationDecay(self.correlation_decay));
        }
        if self.goniometer_decimation == 0 {
            return Err(ConfigError::GoniometerDecimation);
        }
        Ok(())
    }

    pub fn with_gain_ramp(mut self, seconds: f64) -> Self {
        self.gain_ramp_seconds = seconds;
        self
    }

    pub fn with_iir_width_law(mut self, law: WidthLaw) -> Self {
        self.iir_width_law = law;
        self
    }

    pub fn with_decorrelation_window(mut self, seconds: f64) -> Self {
        self.decorrelation_window_seconds = seconds;
        self
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            gain_ramp_seconds: 0.02,
            residual_energy_floor: 1.0e-9,
            decorrelation_window_seconds: 0.02,
            iir_width_law: WidthLaw::Decorrelating,
            correlation_decay: 0.9999,
            goniometer_decimation: 4,
        }
    }
}
