//! Quadrature (Hilbert) Generators
//!
//! Produces an in-phase / quadrature pair `(I, Q)` from a mono signal, with
//! the two branches ideally 90 degrees apart across the audio band.
//!
//! Two algorithms are available:
//!
//! - **IIR**: two cascades of four first-order allpass sections. Zero latency,
//!   approximate quadrature (the phase difference wanders between roughly 60
//!   and 90 degrees over most of the band).
//! - **FIR**: a Blackman-windowed linear-phase Hilbert transformer. `I` is the
//!   centre tap of the history window, so both branches share the same
//!   latency of `(taps - 1) / 2` samples and the phase difference is exact.
//!
//! The generator is a closed two-state machine over [`HilbertMode`]; every
//! mode transition resets all filter state.

use crate::params::HilbertMode;
use alloc::vec;
use alloc::vec::Vec;
use core::f64::consts::PI;
use libm::Libm;

/// Tap count at the reference rate
pub const REFERENCE_TAPS: usize = 8191;
/// Sample rate the reference tap count is tuned for
pub const REFERENCE_SAMPLE_RATE: f64 = 48000.0;
pub const MIN_TAPS: usize = 1023;
pub const MAX_TAPS: usize = 16383;

/// Allpass coefficients of the in-phase branch
pub const IIR_I_COEFFS: [f64; 4] = [-0.9995117, -0.9858398, -0.8657227, -0.3559570];
/// Allpass coefficients of the quadrature branch
pub const IIR_Q_COEFFS: [f64; 4] = [-0.9975586, -0.9570312, -0.6552734, -0.0537109];

/// FIR length for a sample rate: scaled from the 48 kHz reference, clamped to
/// `[MIN_TAPS, MAX_TAPS]` and forced odd.
pub fn fir_tap_count(sample_rate: f64) -> usize {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return REFERENCE_TAPS;
    }

    let scaled = (REFERENCE_TAPS as f64 * sample_rate / REFERENCE_SAMPLE_RATE).round();
    let mut taps = scaled.clamp(MIN_TAPS as f64, MAX_TAPS as f64) as usize;
    if taps % 2 == 0 {
        if taps < MAX_TAPS {
            taps += 1;
        } else {
            taps -= 1;
        }
    }
    taps
}

/// Blackman window value at position `m` of an `n`-point window
#[inline]
fn blackman(m: usize, n: usize) -> f64 {
    let phase = m as f64 / (n - 1) as f64;
    0.42 - 0.5 * Libm::<f64>::cos(2.0 * PI * phase) + 0.08 * Libm::<f64>::cos(4.0 * PI * phase)
}

/// Design the non-zero half of an `taps`-point Hilbert kernel.
///
/// Entry `j` is the coefficient at odd offset `k = 2j + 1` from the centre;
/// the coefficient at `-k` is its negation and even offsets are zero. The
/// kernel is scaled for unity magnitude at a quarter of the sample rate.
pub fn design_half_kernel(taps: usize) -> Vec<f64> {
    let center = (taps - 1) / 2;
    let mut half: Vec<f64> = (1..=center)
        .step_by(2)
        .map(|k| 2.0 / (PI * k as f64) * blackman(center + k, taps))
        .collect();

    // |H(fs/4)| = 2 * sum(h_k * sin(k * pi / 2))
    let gain: f64 = half
        .iter()
        .enumerate()
        .map(|(j, &h)| if j % 2 == 0 { h } else { -h })
        .sum::<f64>()
        * 2.0;

    if gain.abs() > f64::EPSILON {
        for h in &mut half {
            *h /= gain;
        }
    }
    half
}

/// Cascade of first-order allpass sections, `H(z) = (c + z^-1) / (1 + c z^-1)`
#[derive(Debug, Clone)]
pub struct AllpassCascade {
    coeffs: [f64; 4],
    state: [f64; 4],
}

impl AllpassCascade {
    /// Create a cascade with cleared state
    pub fn new(coeffs: [f64; 4]) -> Self {
        Self {
            coeffs,
            state: [0.0; 4],
        }
    }

    /// Run one sample through all four sections
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let mut x = input;
        for (c, s) in self.coeffs.iter().zip(self.state.iter_mut()) {
            let y = c * x + *s;
            *s = x - c * y;
            x = y;
        }
        x
    }

    /// Zero the section states
    pub fn reset(&mut self) {
        self.state = [0.0; 4];
    }
}

/// Linear-phase FIR Hilbert transformer over a mirrored circular history
///
/// Every sample is written twice (at `w` and `w + taps`), so the most recent
/// `taps` samples are always one contiguous slice ending with the newest.
#[derive(Debug, Clone)]
pub struct FirHilbert {
    half_kernel: Vec<f64>,
    history: Vec<f64>,
    taps: usize,
    center: usize,
    write_pos: usize,
}

impl FirHilbert {
    /// Allocate the history for [`MAX_TAPS`] and design for `sample_rate`
    pub fn new(sample_rate: f64) -> Self {
        let mut fir = Self {
            half_kernel: Vec::with_capacity(MAX_TAPS / 4 + 1),
            history: vec![0.0; 2 * MAX_TAPS],
            taps: 0,
            center: 0,
            write_pos: 0,
        };
        fir.design(sample_rate);
        fir
    }

    /// Redesign for a sample rate (no-op if the tap count is unchanged) and
    /// clear the history.
    pub fn design(&mut self, sample_rate: f64) {
        let taps = fir_tap_count(sample_rate);
        if taps != self.taps {
            self.half_kernel.clear();
            self.half_kernel.extend(design_half_kernel(taps));
            self.taps = taps;
            self.center = (taps - 1) / 2;
        }
        self.reset();
    }

    /// Current kernel length
    pub fn taps(&self) -> usize {
        self.taps
    }

    /// Delay of both branches in samples, `(taps - 1) / 2`
    pub fn latency(&self) -> usize {
        self.center
    }

    /// Non-zero coefficients at odd offsets `1, 3, 5, ...` from the centre
    pub fn half_kernel(&self) -> &[f64] {
        &self.half_kernel
    }

    /// Clear the history
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
    }

    /// Push one sample and return the delayed `(I, Q)` pair
    #[inline]
    pub fn process(&mut self, input: f64) -> (f64, f64) {
        let n = self.taps;
        let w = self.write_pos;
        self.history[w] = input;
        self.history[w + n] = input;
        self.write_pos = if w + 1 == n { 0 } else { w + 1 };

        let window = &self.history[w + 1..=w + n];
        let i = window[self.center];
        let q = antisymmetric_dot(&self.half_kernel, window, self.center);
        (i, q)
    }
}

/// `sum_j h_j * (window[c - k] - window[c + k])` with `k = 2j + 1`
#[cfg(not(feature = "simd"))]
#[inline]
fn antisymmetric_dot(half_kernel: &[f64], window: &[f64], center: usize) -> f64 {
    half_kernel
        .iter()
        .enumerate()
        .map(|(j, &h)| {
            let k = 2 * j + 1;
            h * (window[center - k] - window[center + k])
        })
        .sum()
}

/// `sum_j h_j * (window[c - k] - window[c + k])` with `k = 2j + 1` (unrolled)
#[cfg(feature = "simd")]
#[inline]
fn antisymmetric_dot(half_kernel: &[f64], window: &[f64], center: usize) -> f64 {
    use crate::buffer::SIMD_BLOCK_SIZE;

    let len = half_kernel.len();
    let chunks = len / SIMD_BLOCK_SIZE;
    let mut acc = [0.0f64; SIMD_BLOCK_SIZE];

    for chunk in 0..chunks {
        let j = chunk * SIMD_BLOCK_SIZE;
        let k = 2 * j + 1;
        acc[0] += half_kernel[j] * (window[center - k] - window[center + k]);
        acc[1] += half_kernel[j + 1] * (window[center - k - 2] - window[center + k + 2]);
        acc[2] += half_kernel[j + 2] * (window[center - k - 4] - window[center + k + 4]);
        acc[3] += half_kernel[j + 3] * (window[center - k - 6] - window[center + k + 6]);
    }

    let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
    for j in (chunks * SIMD_BLOCK_SIZE)..len {
        let k = 2 * j + 1;
        sum += half_kernel[j] * (window[center - k] - window[center + k]);
    }
    sum
}

/// Mono to I/Q generator with switchable algorithm
#[derive(Debug, Clone)]
pub struct QuadratureGenerator {
    mode: HilbertMode,
    sample_rate: f64,
    iir_i: AllpassCascade,
    iir_q: AllpassCascade,
    fir: FirHilbert,
}

impl QuadratureGenerator {
    /// Create a generator designed for `sample_rate`, starting in `mode`
    pub fn new(sample_rate: f64, mode: HilbertMode) -> Self {
        Self {
            mode,
            sample_rate,
            iir_i: AllpassCascade::new(IIR_I_COEFFS),
            iir_q: AllpassCascade::new(IIR_Q_COEFFS),
            fir: FirHilbert::new(sample_rate),
        }
    }

    /// Redesign the FIR for `sample_rate` and clear all state
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.fir.design(sample_rate);
        self.reset();
        log::debug!(
            "quadrature generator prepared: {} Hz, {} taps, mode {}, latency {}",
            sample_rate,
            self.fir.taps(),
            self.mode.name(),
            self.latency_samples()
        );
    }

    /// Clear the state of both algorithms
    pub fn reset(&mut self) {
        self.iir_i.reset();
        self.iir_q.reset();
        self.fir.reset();
    }

    /// Switch algorithm. Does nothing if `mode` is already active; otherwise
    /// every filter state is cleared.
    pub fn set_mode(&mut self, mode: HilbertMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        self.reset();
    }

    /// Active algorithm
    pub fn mode(&self) -> HilbertMode {
        self.mode
    }

    /// Rate passed to the last `prepare` (or `new`)
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Delay of both branches relative to the input
    pub fn latency_samples(&self) -> usize {
        match self.mode {
            HilbertMode::Iir => 0,
            HilbertMode::Fir => self.fir.latency(),
        }
    }

    /// FIR length for the prepared sample rate (also reported in IIR mode)
    pub fn tap_count(&self) -> usize {
        self.fir.taps()
    }

    /// Produce one `(I, Q)` pair
    #[inline]
    pub fn process_sample(&mut self, input: f64) -> (f64, f64) {
        match self.mode {
            HilbertMode::Iir => (self.iir_i.process(input), self.iir_q.process(input)),
            HilbertMode::Fir => self.fir.process(input),
        }
    }

    /// `i` holds the input on entry and the in-phase branch on exit; `q`
    /// receives the quadrature branch.
    pub fn process(&mut self, i: &mut [f64], q: &mut [f64]) {
        for (x, q_out) in i.iter_mut().zip(q.iter_mut()) {
            let (i_out, q_val) = self.process_sample(*x);
            *x = i_out;
            *q_out = q_val;
        }
    }
}

impl Default for QuadratureGenerator {
    fn default() -> Self {
        Self::new(REFERENCE_SAMPLE_RATE, HilbertMode::default())
    }
}
