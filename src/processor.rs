//! Widener Processing Pipeline
//!
//! [`WidenerProcessor`] owns every DSP stage and runs them over host buffers:
//!
//! ```text
//! inputs --downmix--> mono --split--> low ------------(delay)---+
//!                                 \-> high --quadrature--> I, Q  +--matrix--> gain --> L, R
//! ```
//!
//! Host I/O is `f32`; everything in between runs in `f64` scratch buffers
//! sized at [`WidenerProcessor::prepare`]. The audio-thread entry points
//! never allocate, lock or log.

use crate::analyzer::{Analyzer, AnalyzerBus, AnalyzerSlot};
use crate::buffer::{AudioBlock, DelayLine};
use crate::config::{ConfigError, ProcessSpec, ProcessorConfig};
use crate::crossover::BandSplitter;
use crate::matrix::{MatrixInput, MatrixSettings, StereoMatrix, WidthLaw};
use crate::params::{HilbertMode, ParamId, ParamSnapshot, WidenerParams};
use crate::quadrature::{QuadratureGenerator, MAX_TAPS};
use crate::smoothing::{decibels_to_gain, LinearRamp};
use alloc::sync::{Arc, Weak};

/// Hilbert stereo widener
#[derive(Debug)]
pub struct WidenerProcessor {
    params: Arc<WidenerParams>,
    analyzers: Arc<AnalyzerBus>,
    config: ProcessorConfig,
    spec: ProcessSpec,
    prepared: bool,
    mode: HilbertMode,

    generator: QuadratureGenerator,
    splitter: BandSplitter,
    matrix: StereoMatrix,
    low_delay: DelayLine,
    gain: LinearRamp,

    mono: AudioBlock,
    low: AudioBlock,
    high: AudioBlock,
    i: AudioBlock,
    q: AudioBlock,
    left: AudioBlock,
    right: AudioBlock,
}

impl WidenerProcessor {
    /// Create a processor with the default configuration
    pub fn new(params: Arc<WidenerParams>) -> Self {
        let spec = ProcessSpec::default();
        let mode = params.mode();
        let config = ProcessorConfig::default();

        Self {
            params,
            analyzers: Arc::new(AnalyzerBus::new()),
            spec,
            prepared: false,
            mode,
            generator: QuadratureGenerator::new(spec.sample_rate, mode),
            splitter: BandSplitter::new(spec.sample_rate),
            matrix: StereoMatrix::new(spec.sample_rate),
            low_delay: DelayLine::new((MAX_TAPS - 1) / 2),
            gain: LinearRamp::new(1.0),
            mono: AudioBlock::default(),
            low: AudioBlock::default(),
            high: AudioBlock::default(),
            i: AudioBlock::default(),
            q: AudioBlock::default(),
            left: AudioBlock::default(),
            right: AudioBlock::default(),
            config,
        }
    }

    /// Create a processor with a validated configuration
    pub fn with_config(params: Arc<WidenerParams>, config: ProcessorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut processor = Self::new(params);
        processor.config = config;
        Ok(processor)
    }

    /// Share an existing analyzer bus (e.g. one the UI already holds)
    pub fn with_analyzer_bus(mut self, analyzers: Arc<AnalyzerBus>) -> Self {
        self.analyzers = analyzers;
        self
    }

    pub fn params(&self) -> &Arc<WidenerParams> {
        &self.params
    }

    pub fn analyzers(&self) -> &Arc<AnalyzerBus> {
        &self.analyzers
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Active quadrature algorithm
    pub fn mode(&self) -> HilbertMode {
        self.mode
    }

    /// Current FIR length
    pub fn tap_count(&self) -> usize {
        self.generator.tap_count()
    }

    /// Processing latency to report to the host
    pub fn latency_samples(&self) -> usize {
        self.generator.latency_samples()
    }

    /// Attach or detach an analyzer (control thread)
    pub fn set_analyzer(&self, slot: AnalyzerSlot, analyzer: Option<Weak<dyn Analyzer>>) {
        self.analyzers.set(slot, analyzer);
    }

    /// Configure for a sample rate and maximum block size. Idempotent; all
    /// DSP state is cleared.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize, num_channels: usize) {
        self.spec = ProcessSpec::new(sample_rate, max_block_size.max(1), num_channels);
        let rate = self.spec.effective_sample_rate();
        if rate != sample_rate {
            log::warn!("invalid sample rate {sample_rate}, using {rate} Hz");
        }

        self.mode = self.params.mode();
        self.generator.set_mode(self.mode);
        self.generator.prepare(rate);
        self.splitter.prepare(&self.spec);
        self.matrix.prepare(rate, &self.config);

        self.low_delay.clear();
        self.low_delay.set_delay(self.generator.latency_samples());

        for block in [
            &mut self.mono,
            &mut self.low,
            &mut self.high,
            &mut self.i,
            &mut self.q,
            &mut self.left,
            &mut self.right,
        ] {
            *block = AudioBlock::new(self.spec.max_block_size);
        }

        self.gain.prepare(rate, self.config.gain_ramp_seconds);
        self.gain
            .set_immediate(decibels_to_gain(self.params.get(ParamId::OutputGain)));

        self.prepared = true;
        log::debug!(
            "widener prepared: {} Hz, block {}, {} channels, mode {}, latency {}",
            rate,
            self.spec.max_block_size,
            num_channels,
            self.mode.name(),
            self.latency_samples()
        );
    }

    /// Clear all DSP state without changing the configuration
    pub fn reset(&mut self) {
        self.generator.reset();
        self.splitter.reset();
        self.matrix.reset();
        self.low_delay.clear();
        self.gain.reset();
        self.analyzers.reset_all();
    }

    /// Host stopped playback; drop all signal history
    pub fn release(&mut self) {
        self.reset();
        log::debug!("widener released");
    }

    /// Process using the shared parameter store
    pub fn process_block(&mut self, buffer: &mut [&mut [f32]], num_input_channels: usize, num_samples: usize) {
        let snapshot = self.params.snapshot();
        self.process(buffer, num_input_channels, num_samples, &snapshot);
    }

    /// Process `num_samples` frames of `buffer` in place.
    ///
    /// The first `num_input_channels` channels are averaged to mono; channel
    /// 0 receives left, channel 1 right and any further channels are
    /// silenced. Nothing happens for an empty buffer or before `prepare`.
    pub fn process(
        &mut self,
        buffer: &mut [&mut [f32]],
        num_input_channels: usize,
        num_samples: usize,
        params: &ParamSnapshot,
    ) {
        let num_samples = buffer
            .iter()
            .map(|channel| channel.len())
            .fold(num_samples, usize::min);
        if buffer.is_empty() || num_input_channels == 0 || num_samples == 0 || !self.prepared {
            return;
        }
        let num_inputs = num_input_channels.min(buffer.len());

        if params.mode != self.mode {
            self.switch_mode(params.mode);
        }

        let law = WidthLaw::for_mode(self.mode, &self.config);
        let settings = MatrixSettings::from_snapshot(params, law);
        self.gain.set_target(decibels_to_gain(params.output_gain_db));

        let chunk = self.spec.max_block_size;
        let mut start = 0;
        while start < num_samples {
            let end = (start + chunk).min(num_samples);
            self.render(buffer, num_inputs, start, end, params, &settings);
            start = end;
        }

        for channel in buffer.iter_mut().skip(2) {
            channel[..num_samples].fill(0.0);
        }
    }

    fn switch_mode(&mut self, mode: HilbertMode) {
        self.mode = mode;
        self.generator.set_mode(mode);
        self.splitter.reset();
        self.matrix.reset();
        self.low_delay.clear();
        self.low_delay.set_delay(self.generator.latency_samples());
    }

    fn render(
        &mut self,
        buffer: &mut [&mut [f32]],
        num_inputs: usize,
        start: usize,
        end: usize,
        params: &ParamSnapshot,
        settings: &MatrixSettings,
    ) {
        let len = end - start;
        for block in [
            &mut self.mono,
            &mut self.low,
            &mut self.high,
            &mut self.i,
            &mut self.q,
            &mut self.left,
            &mut self.right,
        ] {
            block.set_len(len);
        }

        self.mono.clear();
        let scale = 1.0 / num_inputs as f64;
        for channel in buffer.iter().take(num_inputs) {
            self.mono.add_scaled_f32(&channel[start..end], scale);
        }

        self.splitter.process(
            self.mono.as_slice(),
            self.low.as_mut_slice(),
            self.high.as_mut_slice(),
            params.crossover_hz,
            params.crossover_enabled,
        );

        self.i.copy_from(self.high.as_slice());
        self.generator
            .process(self.i.as_mut_slice(), self.q.as_mut_slice());
        self.low_delay.process_in_place(self.low.as_mut_slice());

        let input = MatrixInput {
            low: self.low.as_slice(),
            x_high: self.high.as_slice(),
            i: self.i.as_slice(),
            q: self.q.as_slice(),
        };
        self.matrix.process(
            &input,
            settings,
            self.left.as_mut_slice(),
            self.right.as_mut_slice(),
        );
        self.gain
            .apply_stereo(self.left.as_mut_slice(), self.right.as_mut_slice());

        for (dst, &src) in buffer[0][start..end].iter_mut().zip(self.left.as_slice()) {
            *dst = src as f32;
        }
        if buffer.len() > 1 {
            for (dst, &src) in buffer[1][start..end].iter_mut().zip(self.right.as_slice()) {
                *dst = src as f32;
            }
            self.analyzers
                .forward(&buffer[0][start..end], &buffer[1][start..end]);
        } else {
            self.analyzers
                .forward(&buffer[0][start..end], &buffer[0][start..end]);
        }
    }
}
