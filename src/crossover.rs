//! Linkwitz-Riley Band Splitter
//!
//! Splits the mono signal into a low band that bypasses the widener and a
//! high band that is widened. Each side is a 4th-order Linkwitz-Riley filter
//! (two cascaded 2nd-order Butterworth biquads), so the two bands sum back
//! to an allpass response.

use crate::config::ProcessSpec;
use core::f64::consts::PI;
use libm::Libm;

/// Lowest selectable crossover frequency
pub const MIN_CROSSOVER_HZ: f64 = 20.0;
/// Highest selectable crossover frequency
pub const MAX_CROSSOVER_HZ: f64 = 500.0;
pub const DEFAULT_CROSSOVER_HZ: f64 = 90.0;

const BUTTERWORTH_Q: f64 = core::f64::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
}

/// Transposed direct form II biquad with RBJ cookbook coefficients
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(kind: FilterKind, cutoff_hz: f64, sample_rate: f64) -> Self {
        let mut biquad = Self::default();
        biquad.set_coefficients(kind, cutoff_hz, sample_rate);
        biquad
    }

    /// Recompute coefficients; the filter state is kept.
    pub fn set_coefficients(&mut self, kind: FilterKind, cutoff_hz: f64, sample_rate: f64) {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let cos_w0 = Libm::<f64>::cos(w0);
        let alpha = Libm::<f64>::sin(w0) / (2.0 * BUTTERWORTH_Q);
        let a0 = 1.0 + alpha;

        let (b0, b1, b2) = match kind {
            FilterKind::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 * 0.5, b1, b1 * 0.5)
            }
            FilterKind::Highpass => {
                let b1 = -(1.0 + cos_w0);
                (-b1 * 0.5, b1, -b1 * 0.5)
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = -2.0 * cos_w0 / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// 4th-order Linkwitz-Riley section
#[derive(Debug, Clone)]
pub struct LinkwitzRiley {
    kind: FilterKind,
    stages: [Biquad; 2],
}

impl LinkwitzRiley {
    pub fn new(kind: FilterKind, cutoff_hz: f64, sample_rate: f64) -> Self {
        Self {
            kind,
            stages: [
                Biquad::new(kind, cutoff_hz, sample_rate),
                Biquad::new(kind, cutoff_hz, sample_rate),
            ],
        }
    }

    pub fn set_cutoff(&mut self, cutoff_hz: f64, sample_rate: f64) {
        for stage in &mut self.stages {
            stage.set_coefficients(self.kind, cutoff_hz, sample_rate);
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let first = self.stages[0].process(input);
        self.stages[1].process(first)
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

/// Matched LR4 lowpass/highpass pair at a shared cutoff
#[derive(Debug, Clone)]
pub struct BandSplitter {
    lowpass: LinkwitzRiley,
    highpass: LinkwitzRiley,
    sample_rate: f64,
    cutoff_hz: f64,
    was_enabled: bool,
}

impl BandSplitter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            lowpass: LinkwitzRiley::new(FilterKind::Lowpass, DEFAULT_CROSSOVER_HZ, sample_rate),
            highpass: LinkwitzRiley::new(FilterKind::Highpass, DEFAULT_CROSSOVER_HZ, sample_rate),
            sample_rate,
            cutoff_hz: DEFAULT_CROSSOVER_HZ,
            was_enabled: false,
        }
    }

    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.effective_sample_rate();
        self.update_cutoff(self.cutoff_hz, true);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.lowpass.reset();
        self.highpass.reset();
    }

    pub fn cutoff_hz(&self) -> f64 {
        self.cutoff_hz
    }

    /// Clamp a requested cutoff into the supported range (NaN maps to the default)
    pub fn clamp_cutoff(cutoff_hz: f64) -> f64 {
        if cutoff_hz.is_nan() {
            return DEFAULT_CROSSOVER_HZ;
        }
        cutoff_hz.clamp(MIN_CROSSOVER_HZ, MAX_CROSSOVER_HZ)
    }

    fn update_cutoff(&mut self, cutoff_hz: f64, force: bool) {
        let cutoff = Self::clamp_cutoff(cutoff_hz);
        if force || cutoff != self.cutoff_hz {
            self.cutoff_hz = cutoff;
            self.lowpass.set_cutoff(cutoff, self.sample_rate);
            self.highpass.set_cutoff(cutoff, self.sample_rate);
        }
    }

    /// Split `mono` into `low` and `high`.
    ///
    /// Disabled: `low` is silent and `high` is an exact copy. Re-enabling
    /// starts from cleared filter state; cutoff changes apply immediately.
    pub fn process(
        &mut self,
        mono: &[f64],
        low: &mut [f64],
        high: &mut [f64],
        cutoff_hz: f64,
        enabled: bool,
    ) {
        let len = mono.len().min(low.len()).min(high.len());
        let (mono, low, high) = (&mono[..len], &mut low[..len], &mut high[..len]);

        if !enabled {
            low.fill(0.0);
            high.copy_from_slice(mono);
            self.was_enabled = false;
            return;
        }

        if !self.was_enabled {
            self.reset();
            self.was_enabled = true;
        }
        self.update_cutoff(cutoff_hz, false);

        for ((&x, lo), hi) in mono.iter().zip(low.iter_mut()).zip(high.iter_mut()) {
            *lo = self.lowpass.process(x);
            *hi = self.highpass.process(x);
        }
    }
}
