//! Stereo Matrix
//!
//! Turns the band-split mono signal and its quadrature pair into left/right.
//!
//! # Signal flow
//!
//! ```text
//! (x_high, I, Q) --width law--> (Lh, Rh) --phase angle--> (Lh', Rh')
//!       low + Lh', low + Rh' --rotation--> (L, R)
//! ```
//!
//! # Width laws
//!
//! - [`WidthLaw::Decorrelating`] (default): the part of `Q` that is
//!   correlated with `I` is removed by a running least-squares fit, the
//!   residual `S` is rescaled to the energy of `I`, and `L = gm*I + gs*S`,
//!   `R = gm*I - gs*S` with `gm = sqrt((1 + rho) / 2)`,
//!   `gs = sqrt((1 - rho) / 2)`, `rho = 1 - width`. Once the statistics have
//!   settled the L/R correlation is `rho` and L and R carry equal energy. The
//!   mono fold-down `(L + R) / 2 = gm*I` never drops below -3 dB.
//! - [`WidthLaw::EnergyCompensated`]: crossfades the dry high band into
//!   `I` (left) and `Q` (right), boosted by `1 / sqrt(1 - width/2)`.
//!
//! The fit statistics are updated every sample, so the output does not
//! depend on how the host slices the stream into blocks.

use crate::config::ProcessorConfig;
use crate::params::{HilbertMode, ParamSnapshot};
use libm::Libm;
use serde::{Deserialize, Serialize};

/// Mean-square level below which the statistics count as silent
const SILENCE_ENERGY: f64 = 1.0e-18;

/// Upper bound on the gain that rescales the residual to the energy of `I`
///
/// Bounds the residual right after an onset, while the fit has only seen a
/// few samples.
pub const MAX_RESIDUAL_GAIN: f64 = 4.0;

/// How width maps I/Q onto left/right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidthLaw {
    /// `gm = sqrt(1 - w)`, `gq = sqrt(w)`, compensated by `1 / sqrt(1 - w/2)`
    EnergyCompensated,
    /// Running least-squares residual law, correlation `1 - w`
    #[default]
    Decorrelating,
}

impl WidthLaw {
    /// Law used for a generator mode under the given configuration
    pub fn for_mode(mode: HilbertMode, config: &ProcessorConfig) -> Self {
        match mode {
            HilbertMode::Fir => WidthLaw::Decorrelating,
            HilbertMode::Iir => config.iir_width_law,
        }
    }
}

/// Matrix controls, sampled once per block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixSettings {
    /// Width fraction, 0-1
    pub width: f64,
    pub phase_angle_deg: f64,
    pub rotation_deg: f64,
    pub law: WidthLaw,
}

impl MatrixSettings {
    pub fn from_snapshot(snapshot: &ParamSnapshot, law: WidthLaw) -> Self {
        Self {
            width: snapshot.width(),
            phase_angle_deg: snapshot.phase_angle_deg,
            rotation_deg: snapshot.phase_rotation_deg,
            law,
        }
    }
}

impl Default for MatrixSettings {
    fn default() -> Self {
        Self::from_snapshot(&ParamSnapshot::default(), WidthLaw::default())
    }
}

/// Borrowed matrix inputs for one block. All slices share one length.
#[derive(Debug, Clone, Copy)]
pub struct MatrixInput<'a> {
    /// Low band, summed to both outputs unwidened (all zeros when not split)
    pub low: &'a [f64],
    /// Undelayed high band
    pub x_high: &'a [f64],
    pub i: &'a [f64],
    pub q: &'a [f64],
}

impl MatrixInput<'_> {
    fn len(&self) -> usize {
        self.low
            .len()
            .min(self.x_high.len())
            .min(self.i.len())
            .min(self.q.len())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    ii: f64,
    iq: f64,
    qq: f64,
}

impl Moments {
    #[inline]
    fn approach(&mut self, ii: f64, iq: f64, qq: f64, coeff: f64) {
        self.ii += (ii - self.ii) * coeff;
        self.iq += (iq - self.iq) * coeff;
        self.qq += (qq - self.qq) * coeff;
    }

    #[inline]
    fn is_silent(&self) -> bool {
        self.ii <= SILENCE_ENERGY && self.qq <= SILENCE_ENERGY
    }
}

/// Running estimate of the part of `Q` orthogonal to `I`
///
/// The second moments of the pair pass through two cascaded one-pole
/// averages. Each sample the residual `S = Q - alpha*I`, with
/// `alpha = E[IQ] / E[II]`, is scaled by `sqrt(E[II] / E[SS])` (capped at
/// [`MAX_RESIDUAL_GAIN`]). Silence, a residual below the energy floor and
/// non-finite statistics all yield `S = 0`.
#[derive(Debug, Clone)]
pub struct ResidualEstimator {
    coeff: f64,
    floor: f64,
    fast: Moments,
    slow: Moments,
}

impl ResidualEstimator {
    pub fn new(sample_rate: f64, window_seconds: f64, floor: f64) -> Self {
        let mut estimator = Self {
            coeff: 1.0,
            floor,
            fast: Moments::default(),
            slow: Moments::default(),
        };
        estimator.prepare(sample_rate, window_seconds, floor);
        estimator
    }

    /// Set the smoothing time constant and energy floor, clearing the statistics
    pub fn prepare(&mut self, sample_rate: f64, window_seconds: f64, floor: f64) {
        let samples = sample_rate * window_seconds;
        self.coeff = if samples.is_finite() && samples > 1.0 {
            1.0 - Libm::<f64>::exp(-1.0 / samples)
        } else {
            1.0
        };
        self.floor = floor;
        self.reset();
    }

    /// One-pole coefficient of each smoothing stage
    pub fn coeff(&self) -> f64 {
        self.coeff
    }

    pub fn reset(&mut self) {
        self.fast = Moments::default();
        self.slow = Moments::default();
    }

    /// Feed one `(I, Q)` pair and return the rescaled residual
    #[inline]
    pub fn next(&mut self, i: f64, q: f64) -> f64 {
        self.fast.approach(i * i, i * q, q * q, self.coeff);
        let fast = self.fast;
        self.slow.approach(fast.ii, fast.iq, fast.qq, self.coeff);

        let Moments { ii, iq, qq } = self.slow;
        if ii.is_nan() || ii <= SILENCE_ENERGY {
            // Flush so long silences never reach subnormal values
            if self.fast.is_silent() && self.slow.is_silent() {
                self.reset();
            }
            return 0.0;
        }

        let alpha = iq / ii;
        let residual_energy = qq - alpha * iq;
        if residual_energy.is_nan() || residual_energy <= self.floor * ii {
            return 0.0;
        }

        let gain = Libm::<f64>::sqrt(ii / residual_energy).min(MAX_RESIDUAL_GAIN);
        (q - alpha * i) * gain
    }
}

/// Width law, phase-angle mixing and rotation
#[derive(Debug, Clone)]
pub struct StereoMatrix {
    residual: ResidualEstimator,
}

impl StereoMatrix {
    /// Create a matrix using the default [`ProcessorConfig`]
    pub fn new(sample_rate: f64) -> Self {
        let config = ProcessorConfig::default();
        Self {
            residual: ResidualEstimator::new(
                sample_rate,
                config.decorrelation_window_seconds,
                config.residual_energy_floor,
            ),
        }
    }

    /// Configure the residual estimator and clear its statistics
    pub fn prepare(&mut self, sample_rate: f64, config: &ProcessorConfig) {
        self.residual.prepare(
            sample_rate,
            config.decorrelation_window_seconds,
            config.residual_energy_floor,
        );
    }

    pub fn reset(&mut self) {
        self.residual.reset();
    }

    /// Render one block into `left` / `right`
    pub fn process(
        &mut self,
        input: &MatrixInput<'_>,
        settings: &MatrixSettings,
        left: &mut [f64],
        right: &mut [f64],
    ) {
        let len = input.len().min(left.len()).min(right.len());
        let (left, right) = (&mut left[..len], &mut right[..len]);
        let width = settings.width.clamp(0.0, 1.0);

        match settings.law {
            WidthLaw::Decorrelating => {
                let rho = 1.0 - width;
                let gm = Libm::<f64>::sqrt(0.5 * (1.0 + rho));
                let gs = Libm::<f64>::sqrt(0.5 * (1.0 - rho));
                for (((l, r), &i), &q) in left.iter_mut().zip(right.iter_mut()).zip(input.i).zip(input.q) {
                    let s = self.residual.next(i, q);
                    *l = gm * i + gs * s;
                    *r = gm * i - gs * s;
                }
            }
            WidthLaw::EnergyCompensated => {
                let gm = Libm::<f64>::sqrt(1.0 - width);
                let gq = Libm::<f64>::sqrt(width);
                let comp = 1.0 / Libm::<f64>::sqrt(1.0 - 0.5 * width);
                for (((l, r), &x), (&i, &q)) in left
                    .iter_mut()
                    .zip(right.iter_mut())
                    .zip(input.x_high)
                    .zip(input.i.iter().zip(input.q))
                {
                    *l = comp * (gm * x + gq * i);
                    *r = comp * (gm * x + gq * q);
                }
            }
        }

        let theta = (settings.phase_angle_deg - 90.0).to_radians() * 0.5;
        let (sin_t, cos_t) = (Libm::<f64>::sin(theta), Libm::<f64>::cos(theta));
        let phi = settings.rotation_deg.to_radians();
        let (sin_p, cos_p) = (Libm::<f64>::sin(phi), Libm::<f64>::cos(phi));

        for ((l, r), &low) in left.iter_mut().zip(right.iter_mut()).zip(input.low) {
            let lh = *l * cos_t - *r * sin_t;
            let rh = *r * cos_t + *l * sin_t;
            let sum_l = low + lh;
            let sum_r = low + rh;
            *l = sum_l * cos_p - sum_r * sin_p;
            *r = sum_l * sin_p + sum_r * cos_p;
        }
    }
}
