//! Parameter Layout and Lock-Free Parameter Store
//!
//! Parameters are written by a control thread (host automation, UI) and read
//! by the audio thread once per block. Every value lives in its own
//! [`AtomicF64`] cell; the audio thread takes a [`ParamSnapshot`] with relaxed
//! loads so a block always sees one consistent width/phase/rotation triple.

use core::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Atomic f64 for lock-free communication between threads
///
/// Uses AtomicU64 internally since there's no native AtomicF64.
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    /// Create a cell holding `value`
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    /// Relaxed load
    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Relaxed store
    #[inline]
    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Load with an explicit ordering
    pub fn load(&self, ordering: Ordering) -> f64 {
        f64::from_bits(self.0.load(ordering))
    }

    /// Store with an explicit ordering
    pub fn store(&self, value: f64, ordering: Ordering) {
        self.0.store(value.to_bits(), ordering);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// Quadrature generator algorithm
///
/// The two modes form a closed state machine: switching between them always
/// resets every filter state (see [`crate::quadrature::QuadratureGenerator::set_mode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HilbertMode {
    /// Four-stage first-order allpass cascade per branch, zero latency
    Iir,
    /// Blackman-windowed linear-phase Hilbert transformer, latency (taps - 1) / 2
    #[default]
    Fir,
}

impl HilbertMode {
    pub const ALL: [HilbertMode; 2] = [HilbertMode::Iir, HilbertMode::Fir];

    /// Map a raw parameter value onto a mode, clamping to the nearest valid index.
    ///
    /// NaN maps to the default mode.
    pub fn from_index(value: f64) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        if value.round() <= 0.0 {
            HilbertMode::Iir
        } else {
            HilbertMode::Fir
        }
    }

    pub fn index(self) -> usize {
        match self {
            HilbertMode::Iir => 0,
            HilbertMode::Fir => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HilbertMode::Iir => "IIR",
            HilbertMode::Fir => "FIR",
        }
    }
}

/// Errors raised by control-thread parameter access
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("unknown parameter `{0}`")]
    UnknownName(String),
    #[error("parameter index {0} out of range")]
    UnknownIndex(usize),
    #[error("non-finite value for parameter `{name}`")]
    NonFinite { name: &'static str },
}

/// Identifier for each host-visible parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    Width,
    PhaseAngle,
    PhaseRotation,
    HilbertMode,
    CrossoverHz,
    CrossoverEnabled,
    OutputGain,
}

impl ParamId {
    pub const ALL: [ParamId; 7] = [
        ParamId::Width,
        ParamId::PhaseAngle,
        ParamId::PhaseRotation,
        ParamId::HilbertMode,
        ParamId::CrossoverHz,
        ParamId::CrossoverEnabled,
        ParamId::OutputGain,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Stable string identifier
    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    /// Range, default and display metadata
    pub fn info(self) -> &'static ParamInfo {
        &PARAM_LAYOUT[self.index()]
    }
}

/// Host-facing parameter descriptor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamInfo {
    pub id: ParamId,
    pub name: &'static str,
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub unit: &'static str,
    /// Number of steps (0 = continuous)
    pub steps: u32,
}

impl ParamInfo {
    /// Normalize a value to 0.0-1.0 range
    pub fn normalize(&self, value: f64) -> f64 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    /// Denormalize from 0.0-1.0 to parameter range
    pub fn denormalize(&self, normalized: f64) -> f64 {
        self.min + normalized.clamp(0.0, 1.0) * (self.max - self.min)
    }

    /// Snap to the step grid of discrete parameters
    pub fn quantize(&self, value: f64) -> f64 {
        if self.steps == 0 {
            return value;
        }
        let step_size = (self.max - self.min) / self.steps as f64;
        let steps = ((value - self.min) / step_size).round();
        self.min + steps * step_size
    }

    /// Clamp into range and quantize
    pub fn constrain(&self, value: f64) -> f64 {
        self.quantize(value.clamp(self.min, self.max))
    }
}

/// The full parameter layout, indexed by [`ParamId::index`]
pub const PARAM_LAYOUT: [ParamInfo; 7] = [
    ParamInfo {
        id: ParamId::Width,
        name: "width_percent",
        label: "Width",
        min: 0.0,
        max: 100.0,
        default: 0.0,
        unit: "%",
        steps: 0,
    },
    ParamInfo {
        id: ParamId::PhaseAngle,
        name: "phase_angle_deg",
        label: "Phase Angle",
        min: 0.0,
        max: 180.0,
        default: 90.0,
        unit: "deg",
        steps: 0,
    },
    ParamInfo {
        id: ParamId::PhaseRotation,
        name: "phase_rotation_deg",
        label: "Phase Rotation",
        min: -180.0,
        max: 180.0,
        default: 0.0,
        unit: "deg",
        steps: 0,
    },
    ParamInfo {
        id: ParamId::HilbertMode,
        name: "hilbert_mode",
        label: "Hilbert Mode",
        min: 0.0,
        max: 1.0,
        default: 1.0,
        unit: "",
        steps: 1,
    },
    ParamInfo {
        id: ParamId::CrossoverHz,
        name: "crossover_hz",
        label: "Crossover",
        min: 20.0,
        max: 500.0,
        default: 90.0,
        unit: "Hz",
        steps: 0,
    },
    ParamInfo {
        id: ParamId::CrossoverEnabled,
        name: "crossover_enabled",
        label: "Crossover On",
        min: 0.0,
        max: 1.0,
        default: 0.0,
        unit: "",
        steps: 1,
    },
    ParamInfo {
        id: ParamId::OutputGain,
        name: "output_gain_db",
        label: "Gain",
        min: -60.0,
        max: 12.0,
        default: 0.0,
        unit: "dB",
        steps: 0,
    },
];

/// One block's worth of parameter values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub width_percent: f64,
    pub phase_angle_deg: f64,
    pub phase_rotation_deg: f64,
    pub mode: HilbertMode,
    pub crossover_hz: f64,
    pub crossover_enabled: bool,
    pub output_gain_db: f64,
}

impl ParamSnapshot {
    /// Width as a 0-1 fraction
    pub fn width(&self) -> f64 {
        (self.width_percent * 0.01).clamp(0.0, 1.0)
    }

    pub fn with_width(mut self, width_percent: f64) -> Self {
        self.width_percent = width_percent;
        self
    }

    pub fn with_mode(mut self, mode: HilbertMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_phase_angle(mut self, degrees: f64) -> Self {
        self.phase_angle_deg = degrees;
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.phase_rotation_deg = degrees;
        self
    }

    pub fn with_crossover(mut self, enabled: bool, hz: f64) -> Self {
        self.crossover_enabled = enabled;
        self.crossover_hz = hz;
        self
    }

    pub fn with_output_gain(mut self, db: f64) -> Self {
        self.output_gain_db = db;
        self
    }
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        Self {
            width_percent: ParamId::Width.info().default,
            phase_angle_deg: ParamId::PhaseAngle.info().default,
            phase_rotation_deg: ParamId::PhaseRotation.info().default,
            mode: HilbertMode::from_index(ParamId::HilbertMode.info().default),
            crossover_hz: ParamId::CrossoverHz.info().default,
            crossover_enabled: ParamId::CrossoverEnabled.info().default >= 0.5,
            output_gain_db: ParamId::OutputGain.info().default,
        }
    }
}

/// Shared parameter store
///
/// Wrap in an `Arc` and hand clones to the control side; the processor reads
/// it once per block via [`WidenerParams::snapshot`].
#[derive(Debug)]
pub struct WidenerParams {
    values: [AtomicF64; 7],
}

impl WidenerParams {
    pub fn new() -> Self {
        Self {
            values: PARAM_LAYOUT.map(|info| AtomicF64::new(info.default)),
        }
    }

    /// Current (constrained) value of a parameter
    pub fn get(&self, id: ParamId) -> f64 {
        self.values[id.index()].get()
    }

    /// Set a parameter in its natural units; the value is clamped and quantized.
    pub fn set(&self, id: ParamId, value: f64) -> Result<(), ParamError> {
        let info = id.info();
        if !value.is_finite() {
            return Err(ParamError::NonFinite { name: info.name });
        }
        self.values[id.index()].set(info.constrain(value));
        Ok(())
    }

    pub fn set_by_name(&self, name: &str, value: f64) -> Result<(), ParamError> {
        let id = ParamId::from_name(name).ok_or_else(|| ParamError::UnknownName(name.to_string()))?;
        self.set(id, value)
    }

    /// Set by host parameter index from a normalized 0-1 value
    pub fn set_normalized(&self, index: usize, normalized: f64) -> Result<(), ParamError> {
        let id = ParamId::from_index(index).ok_or(ParamError::UnknownIndex(index))?;
        if !normalized.is_finite() {
            return Err(ParamError::NonFinite { name: id.name() });
        }
        self.set(id, id.info().denormalize(normalized))
    }

    pub fn get_normalized(&self, id: ParamId) -> f64 {
        id.info().normalize(self.get(id))
    }

    pub fn set_mode(&self, mode: HilbertMode) {
        self.values[ParamId::HilbertMode.index()].set(mode.index() as f64);
    }

    pub fn mode(&self) -> HilbertMode {
        HilbertMode::from_index(self.get(ParamId::HilbertMode))
    }

    /// Read every parameter once (relaxed)
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            width_percent: self.get(ParamId::Width),
            phase_angle_deg: self.get(ParamId::PhaseAngle),
            phase_rotation_deg: self.get(ParamId::PhaseRotation),
            mode: self.mode(),
            crossover_hz: self.get(ParamId::CrossoverHz),
            crossover_enabled: self.get(ParamId::CrossoverEnabled) >= 0.5,
            output_gain_db: self.get(ParamId::OutputGain),
        }
    }

    /// Store every field of a snapshot
    pub fn apply(&self, snapshot: &ParamSnapshot) -> Result<(), ParamError> {
        self.set(ParamId::Width, snapshot.width_percent)?;
        self.set(ParamId::PhaseAngle, snapshot.phase_angle_deg)?;
        self.set(ParamId::PhaseRotation, snapshot.phase_rotation_deg)?;
        self.set_mode(snapshot.mode);
        self.set(ParamId::CrossoverHz, snapshot.crossover_hz)?;
        self.set(
            ParamId::CrossoverEnabled,
            if snapshot.crossover_enabled { 1.0 } else { 0.0 },
        )?;
        self.set(ParamId::OutputGain, snapshot.output_gain_db)
    }

    pub fn reset_to_defaults(&self) {
        for (cell, info) in self.values.iter().zip(PARAM_LAYOUT.iter()) {
            cell.set(info.default);
        }
    }
}

impl Default for WidenerParams {
    fn default() -> Self {
        Self::new()
    }
}
