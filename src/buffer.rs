//! Preallocated Scratch Buffers and Delay Lines
//!
//! Everything here is sized once (at `prepare`) and afterwards only indexed,
//! so the audio thread never touches the allocator.

use alloc::vec;
use alloc::vec::Vec;

/// Block size for unrolled operations
pub const SIMD_BLOCK_SIZE: usize = 4;

/// Fixed-capacity mono audio buffer with a variable active length
#[derive(Debug, Clone, Default)]
pub struct AudioBlock {
    samples: Vec<f64>,
    len: usize,
}

impl AudioBlock {
    /// Create a zeroed block able to hold `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            len: capacity,
        }
    }

    /// Samples the block can hold without reallocating
    #[inline]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Active length
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Change the active length without reallocating; clamps to capacity.
    #[inline]
    pub fn set_len(&mut self, len: usize) -> usize {
        self.len = len.min(self.samples.len());
        self.len
    }

    /// The active samples
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.samples[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.samples[..self.len]
    }

    /// Zero the active samples
    pub fn clear(&mut self) {
        self.fill(0.0);
    }

    pub fn fill(&mut self, value: f64) {
        self.as_mut_slice().fill(value);
    }

    /// Copy as many samples as fit from `src`
    pub fn copy_from(&mut self, src: &[f64]) {
        let len = self.len.min(src.len());
        self.samples[..len].copy_from_slice(&src[..len]);
    }

    /// `self += src * gain`, reading host `f32` samples
    #[cfg(not(feature = "simd"))]
    pub fn add_scaled_f32(&mut self, src: &[f32], gain: f64) {
        for (dst, &s) in self.as_mut_slice().iter_mut().zip(src) {
            *dst += s as f64 * gain;
        }
    }

    /// `self += src * gain`, reading host `f32` samples (unrolled)
    #[cfg(feature = "simd")]
    pub fn add_scaled_f32(&mut self, src: &[f32], gain: f64) {
        let len = self.len.min(src.len());
        let chunks = len / SIMD_BLOCK_SIZE;

        for chunk in 0..chunks {
            let base = chunk * SIMD_BLOCK_SIZE;
            self.samples[base] += src[base] as f64 * gain;
            self.samples[base + 1] += src[base + 1] as f64 * gain;
            self.samples[base + 2] += src[base + 2] as f64 * gain;
            self.samples[base + 3] += src[base + 3] as f64 * gain;
        }

        for i in (chunks * SIMD_BLOCK_SIZE)..len {
            self.samples[i] += src[i] as f64 * gain;
        }
    }

    /// RMS level of the active samples (0 when empty)
    pub fn rms(&self) -> f64 {
        let slice = self.as_slice();
        if slice.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = slice.iter().map(|s| s * s).sum();
        (sum_sq / slice.len() as f64).sqrt()
    }
}

/// Integer delay line on a circular buffer
///
/// Capacity is fixed at construction; the delay may change at any time up to
/// `capacity - 1` samples.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    write_pos: usize,
    delay: usize,
}

impl DelayLine {
    /// Create a silent delay line that can delay by up to `max_delay` samples
    pub fn new(max_delay: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay + 1],
            write_pos: 0,
            delay: 0,
        }
    }

    /// Largest supported delay in samples
    pub fn max_delay(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Current delay in samples
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Set the delay in samples, clamped to the capacity
    pub fn set_delay(&mut self, delay: usize) {
        self.delay = delay.min(self.max_delay());
    }

    /// Push one sample, return the sample written `delay` calls ago
    #[inline]
    pub fn process(&mut self, sample: f64) -> f64 {
        let size = self.buffer.len();
        self.buffer[self.write_pos] = sample;
        let read_pos = (self.write_pos + size - self.delay) % size;
        self.write_pos = (self.write_pos + 1) % size;
        self.buffer[read_pos]
    }

    /// Delay a whole block in place
    pub fn process_in_place(&mut self, block: &mut [f64]) {
        if self.delay == 0 {
            return;
        }
        for sample in block.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    /// Drop the stored history, keeping the delay setting
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_block_len() {
        let mut block = AudioBlock::new(64);
        assert_eq!(block.len(), 64);
        assert_eq!(block.capacity(), 64);

        assert_eq!(block.set_len(16), 16);
        assert_eq!(block.as_slice().len(), 16);

        // Never grows past capacity
        assert_eq!(block.set_len(1000), 64);
    }

    #[test]
    fn test_audio_block_add_scaled() {
        let mut block = AudioBlock::new(6);
        let src = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];

        block.add_scaled_f32(&src, 0.5);
        block.add_scaled_f32(&src, 0.5);

        assert_eq!(block.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_audio_block_copy_and_rms() {
        let mut block = AudioBlock::new(4);
        block.copy_from(&[1.0, -1.0, 1.0, -1.0, 9.0]);
        assert_eq!(block.rms(), 1.0);

        block.clear();
        assert_eq!(block.rms(), 0.0);
    }

    #[test]
    fn test_delay_line() {
        let mut delay = DelayLine::new(4);
        delay.set_delay(2);

        let out: Vec<f64> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .iter()
            .map(|&x| delay.process(x))
            .collect();
        assert_eq!(out, vec![0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_delay_line_zero_delay_passes_through() {
        let mut delay = DelayLine::new(8);
        let mut block = [0.5, -0.25, 1.0];
        delay.process_in_place(&mut block);
        assert_eq!(block, [0.5, -0.25, 1.0]);
        assert_eq!(delay.process(0.75), 0.75);
    }

    #[test]
    fn test_delay_line_clamps_and_clears() {
        let mut delay = DelayLine::new(3);
        delay.set_delay(10);
        assert_eq!(delay.delay(), 3);

        delay.process(1.0);
        delay.clear();
        for _ in 0..3 {
            assert_eq!(delay.process(0.0), 0.0);
        }
    }
}
