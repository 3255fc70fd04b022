//! Click-Free Gain Smoothing
//!
//! The output gain target is taken from the parameter snapshot once per block
//! and approached with a constant-rate linear ramp on the audio thread.

use libm::Libm;

/// Convert decibels to linear gain
#[inline]
pub fn decibels_to_gain(db: f64) -> f64 {
    if db == f64::NEG_INFINITY {
        return 0.0;
    }
    Libm::<f64>::pow(10.0, db / 20.0)
}

/// Linear ramp towards a target value over a fixed duration
#[derive(Debug, Clone)]
pub struct LinearRamp {
    current: f64,
    target: f64,
    step: f64,
    remaining: usize,
    ramp_samples: usize,
}

impl LinearRamp {
    pub fn new(initial: f64) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            ramp_samples: 0,
        }
    }

    /// Set the ramp duration; any ramp in flight is finished immediately.
    pub fn prepare(&mut self, sample_rate: f64, seconds: f64) {
        self.ramp_samples = (sample_rate * seconds).round().max(0.0) as usize;
        self.reset();
    }

    pub fn ramp_samples(&self) -> usize {
        self.ramp_samples
    }

    /// Start a ramp if `target` differs from the current target
    pub fn set_target(&mut self, target: f64) {
        if target == self.target {
            return;
        }
        self.target = target;
        if self.ramp_samples == 0 {
            self.current = target;
            self.remaining = 0;
        } else {
            self.remaining = self.ramp_samples;
            self.step = (target - self.current) / self.ramp_samples as f64;
        }
    }

    /// Jump straight to `value`
    pub fn set_immediate(&mut self, value: f64) {
        self.target = value;
        self.reset();
    }

    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }

    #[inline]
    pub fn next(&mut self) -> f64 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    /// Multiply a stereo pair of buffers, one gain step per frame
    pub fn apply_stereo(&mut self, left: &mut [f64], right: &mut [f64]) {
        if !self.is_smoothing() {
            let gain = self.current;
            left.iter_mut().for_each(|s| *s *= gain);
            right.iter_mut().for_each(|s| *s *= gain);
            return;
        }
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let gain = self.next();
            *l *= gain;
            *r *= gain;
        }
    }

    /// Snap to the target
    pub fn reset(&mut self) {
        self.current = self.target;
        self.step = 0.0;
        self.remaining = 0;
    }
}

impl Default for LinearRamp {
    fn default() -> Self {
        Self::new(1.0)
    }
}
