//! Signal Measurement Utilities
//!
//! Offline helpers for verifying widener output: level, correlation, fold-down,
//! sinusoid fitting and deterministic test signals. Used by the test suites
//! and benches; none of this runs on the audio thread.

use alloc::vec::Vec;
use core::f64::consts::PI;

/// Audio analysis utilities
pub struct AudioAnalysis;

impl AudioAnalysis {
    /// Calculate RMS (root mean square) of a signal
    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    pub fn rms_f32(samples: &[f32]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    /// Calculate peak amplitude
    pub fn peak(samples: &[f64]) -> f64 {
        samples.iter().map(|s| s.abs()).fold(0.0, f64::max)
    }

    /// Normalized cross-correlation `sum(ab) / sqrt(sum(a^2) * sum(b^2))`.
    ///
    /// Returns 0 when either signal is silent.
    pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
        let (ab, aa, bb) = a
            .iter()
            .zip(b)
            .fold((0.0, 0.0, 0.0), |(ab, aa, bb), (&x, &y)| {
                (ab + x * y, aa + x * x, bb + y * y)
            });
        let denom = (aa * bb).sqrt();
        if denom <= 1.0e-12 {
            0.0
        } else {
            (ab / denom).clamp(-1.0, 1.0)
        }
    }

    /// Level difference in dB between two RMS values
    pub fn level_diff_db(a: f64, b: f64) -> f64 {
        const FLOOR: f64 = 1.0e-12;
        20.0 * (a.max(FLOOR) / b.max(FLOOR)).log10()
    }

    /// Least-squares fit of `a*sin(wn) + b*cos(wn)` at a known frequency.
    ///
    /// `start_index` is the absolute sample index of `samples[0]`, so fits of
    /// different slices of one stream share a phase reference. Unlike a DFT
    /// bin, the fit does not leak for non-integer cycle counts.
    pub fn fit_sinusoid(samples: &[f64], freq: f64, sample_rate: f64, start_index: usize) -> ToneFit {
        let w = 2.0 * PI * freq / sample_rate;
        let (mut ss, mut cc, mut sc, mut xs, mut xc) = (0.0, 0.0, 0.0, 0.0, 0.0);

        for (n, &x) in samples.iter().enumerate() {
            let phase = w * (start_index + n) as f64;
            let (s, c) = phase.sin_cos();
            ss += s * s;
            cc += c * c;
            sc += s * c;
            xs += x * s;
            xc += x * c;
        }

        let det = ss * cc - sc * sc;
        if det.abs() <= f64::EPSILON {
            return ToneFit::default();
        }
        ToneFit {
            sin_coeff: (xs * cc - xc * sc) / det,
            cos_coeff: (xc * ss - xs * sc) / det,
        }
    }

    /// Wrap an angle in degrees into (-180, 180]
    pub fn wrap_degrees(degrees: f64) -> f64 {
        let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
        if wrapped == -180.0 {
            180.0
        } else {
            wrapped
        }
    }

    /// 95th percentile (nearest rank below)
    pub fn percentile95(values: &[f64]) -> f64 {
        Self::percentile(values, 0.95)
    }

    pub fn percentile(values: &[f64], fraction: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let index = (fraction.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).floor() as usize;
        sorted[index]
    }

    pub fn max(values: &[f64]) -> f64 {
        values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Result of [`AudioAnalysis::fit_sinusoid`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ToneFit {
    pub sin_coeff: f64,
    pub cos_coeff: f64,
}

impl ToneFit {
    pub fn amplitude(&self) -> f64 {
        self.sin_coeff.hypot(self.cos_coeff)
    }

    /// Phase relative to `sin(wn)`, in degrees
    pub fn phase_degrees(&self) -> f64 {
        self.cos_coeff.atan2(self.sin_coeff).to_degrees()
    }
}

/// Level and image measurements of a stereo output against its mono source
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoStats {
    pub input_rms: f64,
    pub left_rms: f64,
    pub right_rms: f64,
    /// RMS of the mono fold-down `(L + R) / 2`
    pub fold_rms: f64,
    /// RMS of `L - R` relative to the input RMS
    pub spread_ratio: f64,
    pub correlation: f64,
    /// Left minus right level in dB
    pub level_diff_db: f64,
}

impl StereoStats {
    pub fn measure(input: &[f32], left: &[f32], right: &[f32]) -> Self {
        let left: Vec<f64> = left.iter().map(|&x| x as f64).collect();
        let right: Vec<f64> = right.iter().map(|&x| x as f64).collect();
        let fold: Vec<f64> = left.iter().zip(&right).map(|(l, r)| 0.5 * (l + r)).collect();
        let side: Vec<f64> = left.iter().zip(&right).map(|(l, r)| l - r).collect();

        let input_rms = AudioAnalysis::rms_f32(input);
        let left_rms = AudioAnalysis::rms(&left);
        let right_rms = AudioAnalysis::rms(&right);
        let side_rms = AudioAnalysis::rms(&side);

        Self {
            input_rms,
            left_rms,
            right_rms,
            fold_rms: AudioAnalysis::rms(&fold),
            spread_ratio: if input_rms > 0.0 { side_rms / input_rms } else { 0.0 },
            correlation: AudioAnalysis::correlation(&left, &right),
            level_diff_db: AudioAnalysis::level_diff_db(left_rms, right_rms),
        }
    }

    /// Fold-down level relative to the input
    pub fn fold_ratio(&self) -> f64 {
        if self.input_rms > 0.0 {
            self.fold_rms / self.input_rms
        } else {
            0.0
        }
    }

    /// RMS of the louder channel pair, `sqrt((L^2 + R^2) / 2)`
    pub fn output_rms(&self) -> f64 {
        (0.5 * (self.left_rms * self.left_rms + self.right_rms * self.right_rms)).sqrt()
    }
}

/// Deterministic periodic test signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestSignal {
    Sine,
    /// +1 while the matching sine is non-negative, -1 otherwise
    Square,
    /// Rising ramp from -1 to 1 per period
    Saw,
}

impl TestSignal {
    pub const ALL: [TestSignal; 3] = [TestSignal::Sine, TestSignal::Square, TestSignal::Saw];

    /// Value at sample `n`
    pub fn sample(self, freq: f64, sample_rate: f64, n: usize) -> f64 {
        let cycles = freq * n as f64 / sample_rate;
        match self {
            TestSignal::Sine => (2.0 * PI * cycles).sin(),
            TestSignal::Square => {
                if (2.0 * PI * cycles).sin() >= 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            TestSignal::Saw => 2.0 * (cycles - cycles.floor()) - 1.0,
        }
    }

    pub fn generate(self, freq: f64, sample_rate: f64, len: usize, amplitude: f64) -> Vec<f64> {
        (0..len)
            .map(|n| amplitude * self.sample(freq, sample_rate, n))
            .collect()
    }

    pub fn generate_f32(self, freq: f64, sample_rate: f64, len: usize, amplitude: f64) -> Vec<f32> {
        (0..len)
            .map(|n| (amplitude * self.sample(freq, sample_rate, n)) as f32)
            .collect()
    }
}

/// Seeded uniform white noise in `[-amplitude, amplitude)`
#[cfg(feature = "noise")]
pub fn white_noise(len: usize, seed: u64, amplitude: f64) -> Vec<f32> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| (amplitude * rng.gen_range(-1.0..1.0)) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rms_and_peak() {
        let square = TestSignal::Square.generate(100.0, 48000.0, 4800, 1.0);
        assert_abs_diff_eq!(AudioAnalysis::rms(&square), 1.0, epsilon = 1e-12);
        assert_eq!(AudioAnalysis::peak(&[0.5, -0.8, 0.3]), 0.8);
        assert_eq!(AudioAnalysis::rms(&[]), 0.0);
    }

    #[test]
    fn test_correlation() {
        let a = TestSignal::Sine.generate(480.0, 48000.0, 4800, 1.0);
        let b: Vec<f64> = a.iter().map(|x| -0.5 * x).collect();
        assert_abs_diff_eq!(AudioAnalysis::correlation(&a, &a), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(AudioAnalysis::correlation(&a, &b), -1.0, epsilon = 1e-12);
        assert_eq!(AudioAnalysis::correlation(&a, &[0.0; 4800]), 0.0);
    }

    #[test]
    fn test_fit_sinusoid() {
        // 3.3 cycles: not bin-centred
        let sr = 1000.0;
        let freq = 33.0;
        let samples: Vec<f64> = (0..100)
            .map(|n| 0.7 * (2.0 * PI * freq * n as f64 / sr + 0.4).sin())
            .collect();

        let fit = AudioAnalysis::fit_sinusoid(&samples, freq, sr, 0);
        assert_abs_diff_eq!(fit.amplitude(), 0.7, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.phase_degrees(), 0.4f64.to_degrees(), epsilon = 1e-6);

        // Offset slice keeps the same phase reference
        let fit = AudioAnalysis::fit_sinusoid(&samples[40..], freq, sr, 40);
        assert_abs_diff_eq!(fit.phase_degrees(), 0.4f64.to_degrees(), epsilon = 1e-6);
    }

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(AudioAnalysis::wrap_degrees(270.0), -90.0);
        assert_eq!(AudioAnalysis::wrap_degrees(-270.0), 90.0);
        assert_eq!(AudioAnalysis::wrap_degrees(180.0), 180.0);
        assert_eq!(AudioAnalysis::wrap_degrees(-180.0), 180.0);
    }

    #[test]
    fn test_percentile() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(AudioAnalysis::percentile95(&values), 95.0);
        assert_eq!(AudioAnalysis::max(&values), 100.0);
        assert_eq!(AudioAnalysis::percentile95(&[]), 0.0);
    }

    #[test]
    fn test_stereo_stats() {
        let input = TestSignal::Sine.generate_f32(1000.0, 48000.0, 4800, 0.5);
        let inverted: Vec<f32> = input.iter().map(|x| -x).collect();

        let stats = StereoStats::measure(&input, &input, &inverted);
        assert_abs_diff_eq!(stats.correlation, -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.fold_ratio(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.spread_ratio, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(stats.level_diff_db, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_signals() {
        let saw = TestSignal::Saw.generate(1.0, 4.0, 4, 1.0);
        assert_eq!(saw, vec![-1.0, -0.5, 0.0, 0.5]);

        let square = TestSignal::Square.generate(1.0, 4.0, 4, 1.0);
        assert_eq!(square[0], 1.0);
        assert_eq!(square[3], -1.0);
    }

    #[cfg(feature = "noise")]
    #[test]
    fn test_white_noise_is_seeded() {
        let a = white_noise(1024, 7, 0.5);
        let b = white_noise(1024, 7, 0.5);
        assert_eq!(a, b);
        assert!(a.iter().all(|x| x.abs() <= 0.5));
        assert!(AudioAnalysis::rms_f32(&a) > 0.2);
    }
}
