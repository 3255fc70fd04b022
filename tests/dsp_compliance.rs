//! DSP Compliance Suite
//!
//! Drives the full widener pipeline the way a host does (48 kHz, 1024-frame
//! blocks unless noted, identical signal on both inputs) and checks the
//! stereo image it produces: mono compatibility, width-to-correlation
//! behaviour, channel balance and latency handling.

use hilbert_widener::prelude::*;
use std::sync::Arc;

const SR: f64 = 48000.0;
const BLOCK: usize = 1024;
const TONES: [f64; 8] = [30.0, 60.0, 120.0, 250.0, 1000.0, 4000.0, 10000.0, 16000.0];

// ============================================================================
// HARNESS
// ============================================================================

struct Capture {
    input: Vec<f32>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Capture {
    fn stats(&self) -> StereoStats {
        StereoStats::measure(&self.input, &self.left, &self.right)
    }
}

/// (total blocks, captured tail blocks)
fn block_plan(mode: HilbertMode) -> (usize, usize) {
    match mode {
        HilbertMode::Fir => (24, 8),
        HilbertMode::Iir => (20, 6),
    }
}

fn processor(sample_rate: f64, mode: HilbertMode) -> WidenerProcessor {
    let params = Arc::new(WidenerParams::new());
    params.set_mode(mode);
    let mut processor = WidenerProcessor::new(params);
    processor.prepare(sample_rate, BLOCK, 2);
    processor
}

/// Run `signal` through a fresh processor block by block and return the
/// full input and output streams.
fn run_stream(sample_rate: f64, snapshot: &ParamSnapshot, signal: &[f32]) -> Capture {
    run_stream_in_blocks(sample_rate, snapshot, signal, BLOCK)
}

fn run_stream_in_blocks(
    sample_rate: f64,
    snapshot: &ParamSnapshot,
    signal: &[f32],
    host_block: usize,
) -> Capture {
    let mut widener = processor(sample_rate, snapshot.mode);
    let mut left = signal.to_vec();
    let mut right = signal.to_vec();

    for (l, r) in left.chunks_mut(host_block).zip(right.chunks_mut(host_block)) {
        let frames = l.len();
        widener.process(&mut [l, r], 2, frames, snapshot);
    }

    Capture {
        input: signal.to_vec(),
        left,
        right,
    }
}

/// Render a periodic test signal and keep only the settled tail blocks
fn render_tail(
    sample_rate: f64,
    snapshot: &ParamSnapshot,
    signal: TestSignal,
    freq: f64,
) -> Capture {
    let (total, captured) = block_plan(snapshot.mode);
    let input = signal.generate_f32(freq, sample_rate, total * BLOCK, 0.5);
    let full = run_stream(sample_rate, snapshot, &input);

    let start = (total - captured) * BLOCK;
    Capture {
        input: full.input[start..].to_vec(),
        left: full.left[start..].to_vec(),
        right: full.right[start..].to_vec(),
    }
}

fn tone(mode: HilbertMode, freq: f64, width: f64) -> Capture {
    let snapshot = ParamSnapshot::default().with_mode(mode).with_width(width);
    render_tail(SR, &snapshot, TestSignal::Sine, freq)
}

// ============================================================================
// LATENCY
// ============================================================================

#[test]
fn test_tap_count_and_latency_per_rate() {
    for sr in [44100.0, 48000.0, 96000.0] {
        let widener = processor(sr, HilbertMode::Fir);
        let taps = widener.tap_count();
        assert_eq!(taps % 2, 1);
        assert!((1023..=16383).contains(&taps));
        assert_eq!(widener.latency_samples(), (taps - 1) / 2);

        assert_eq!(processor(sr, HilbertMode::Iir).latency_samples(), 0);
    }
}

// ============================================================================
// MONO COMPATIBILITY
// ============================================================================

#[test]
fn test_zero_width_is_mono_across_band() {
    for mode in HilbertMode::ALL {
        for freq in TONES {
            let capture = tone(mode, freq, 0.0);
            let stats = capture.stats();
            assert!(
                stats.spread_ratio < 1e-3,
                "{mode:?} {freq} Hz: spread {}",
                stats.spread_ratio
            );
            assert_eq!(capture.left, capture.right, "{mode:?} {freq} Hz");
        }
    }
}

#[test]
fn test_zero_width_with_crossover_is_mono() {
    for mode in HilbertMode::ALL {
        let snapshot = ParamSnapshot::default()
            .with_mode(mode)
            .with_crossover(true, 150.0);
        let capture = render_tail(SR, &snapshot, TestSignal::Saw, 110.0);
        assert_eq!(capture.left, capture.right, "{mode:?}");
    }
}

#[test]
fn test_fold_down_stays_within_three_db() {
    for mode in HilbertMode::ALL {
        for freq in TONES {
            for width in [0.0, 50.0, 100.0] {
                let capture = tone(mode, freq, width);
                let fold: Vec<f64> = capture
                    .left
                    .iter()
                    .zip(&capture.right)
                    .map(|(&l, &r)| 0.5 * (l as f64 + r as f64))
                    .collect();

                // Amplitude by sinusoid fit; input amplitude is 0.5
                let ratio = AudioAnalysis::fit_sinusoid(&fold, freq, SR, 0).amplitude() / 0.5;
                assert!(
                    ratio > 0.68 && ratio < 1.2,
                    "{mode:?} {freq} Hz width {width}: fold {ratio}"
                );
            }
        }
    }
}

// ============================================================================
// WIDTH
// ============================================================================

#[test]
fn test_correlation_falls_with_width() {
    for mode in HilbertMode::ALL {
        for freq in TONES {
            let corr: Vec<f64> = [0.0, 50.0, 100.0]
                .iter()
                .map(|&w| tone(mode, freq, w).stats().correlation)
                .collect();

            assert!(corr[0] - corr[1] >= 0.05, "{mode:?} {freq} Hz: {corr:?}");
            assert!(corr[1] - corr[2] >= 0.05, "{mode:?} {freq} Hz: {corr:?}");
        }
    }
}

#[test]
fn test_full_width_decorrelates_fir() {
    for freq in TONES.iter().copied().filter(|&f| f >= 60.0) {
        let stats = tone(HilbertMode::Fir, freq, 100.0).stats();
        assert!(stats.correlation.abs() < 0.15, "{freq} Hz: {}", stats.correlation);
        assert!((stats.spread_ratio - 2f64.sqrt()).abs() < 0.05, "{freq} Hz: {}", stats.spread_ratio);
    }
}

#[test]
fn test_mid_width_correlation() {
    let stats = tone(HilbertMode::Fir, 1000.0, 50.0).stats();
    assert!((stats.correlation - 0.5).abs() < 0.02, "{}", stats.correlation);
}

#[test]
fn test_complex_waveforms_stay_balanced() {
    for mode in HilbertMode::ALL {
        for signal in [TestSignal::Square, TestSignal::Saw] {
            for width in [25.0, 50.0, 75.0, 100.0] {
                let snapshot = ParamSnapshot::default().with_mode(mode).with_width(width);
                let stats = render_tail(SR, &snapshot, signal, 220.0).stats();
                assert!(
                    stats.level_diff_db.abs() < 0.35,
                    "{mode:?} {signal:?} width {width}: {} dB",
                    stats.level_diff_db
                );
            }
        }
    }
}

#[test]
fn test_small_host_blocks_match_large() {
    let snapshot = ParamSnapshot::default()
        .with_mode(HilbertMode::Fir)
        .with_width(100.0);
    let input = TestSignal::Sine.generate_f32(60.0, SR, 24 * BLOCK, 0.5);
    let reference = run_stream(SR, &snapshot, &input);

    for host_block in [1, 64] {
        let capture = run_stream_in_blocks(SR, &snapshot, &input, host_block);
        assert_eq!(capture.left, reference.left, "block {host_block}");
        assert_eq!(capture.right, reference.right, "block {host_block}");
    }
}

#[test]
fn test_width_holds_at_small_host_blocks() {
    let freq = 60.0;
    let input = TestSignal::Sine.generate_f32(freq, SR, 24 * BLOCK, 0.5);
    let natural_step = 0.5 * 2.0 * std::f64::consts::PI * freq / SR;

    for mode in HilbertMode::ALL {
        let snapshot = ParamSnapshot::default().with_mode(mode).with_width(100.0);
        let capture = run_stream_in_blocks(SR, &snapshot, &input, 64);

        let start = 16 * BLOCK;
        let stats = StereoStats::measure(&input[start..], &capture.left[start..], &capture.right[start..]);
        assert!(stats.correlation.abs() < 0.15, "{mode:?}: {}", stats.correlation);
        assert!(stats.spread_ratio > 1.3, "{mode:?}: {}", stats.spread_ratio);

        // No steps at block boundaries anywhere in the stream
        for channel in [&capture.left, &capture.right] {
            let step = channel
                .windows(2)
                .map(|pair| (pair[1] as f64 - pair[0] as f64).abs())
                .fold(0.0, f64::max);
            assert!(step < 3.0 * natural_step, "{mode:?}: step {step}");
        }
    }
}

#[cfg(feature = "noise")]
#[test]
fn test_noise_widening() {
    use hilbert_widener::analysis::white_noise;

    let input = white_noise(24 * BLOCK, 0x5eed, 0.5);
    let snapshot = ParamSnapshot::default().with_width(100.0);
    let full = run_stream(SR, &snapshot, &input);

    let start = 16 * BLOCK;
    let stats = StereoStats::measure(&input[start..], &full.left[start..], &full.right[start..]);
    assert!(stats.correlation.abs() < 0.15, "{}", stats.correlation);
    assert!(stats.fold_ratio() > 0.68, "{}", stats.fold_ratio());
    assert!(stats.level_diff_db.abs() < 0.35);
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_fir_scenario_one_khz_full_width() {
    for sr in [44100.0, 48000.0, 96000.0] {
        let snapshot = ParamSnapshot::default()
            .with_mode(HilbertMode::Fir)
            .with_width(100.0);
        let latency = processor(sr, HilbertMode::Fir).latency_samples();
        let input = TestSignal::Sine.generate_f32(1000.0, sr, 24 * BLOCK, 0.5);
        let full = run_stream(sr, &snapshot, &input);

        let start = latency + 2 * (sr / 1000.0).ceil() as usize;
        let stats = StereoStats::measure(&input[start..], &full.left[start..], &full.right[start..]);
        assert!(stats.correlation.abs() <= 0.20, "{sr}: {}", stats.correlation);
        assert!(stats.output_rms() > 0.01, "{sr}: {}", stats.output_rms());
    }
}

#[test]
fn test_fir_output_is_silent_until_latency() {
    let snapshot = ParamSnapshot::default().with_width(100.0);
    let latency = processor(SR, HilbertMode::Fir).latency_samples();
    let input = vec![0.5f32; 8 * BLOCK];
    let full = run_stream(SR, &snapshot, &input);

    assert!(full.left[..latency - 2048].iter().all(|x| x.abs() < 1e-6));
    assert!(full.left[latency + 16..].iter().any(|x| x.abs() > 0.1));
}

#[test]
fn test_crossover_low_band_is_time_aligned() {
    let snapshot = ParamSnapshot::default()
        .with_mode(HilbertMode::Fir)
        .with_crossover(true, 120.0);
    let input = TestSignal::Square.generate_f32(90.0, SR, 16 * BLOCK, 0.5);
    let full = run_stream(SR, &snapshot, &input);

    // Expected: the allpass LR4 sum of the input, delayed by the FIR latency
    let mono: Vec<f64> = input.iter().map(|&x| x as f64).collect();
    let mut splitter = BandSplitter::new(SR);
    splitter.prepare(&ProcessSpec::new(SR, mono.len(), 2));
    let (mut low, mut high) = (vec![0.0; mono.len()], vec![0.0; mono.len()]);
    splitter.process(&mono, &mut low, &mut high, 120.0, true);

    let latency = processor(SR, HilbertMode::Fir).latency_samples();
    for n in (latency..mono.len()).step_by(97) {
        let expected = low[n - latency] + high[n - latency];
        assert!(
            (full.left[n] as f64 - expected).abs() < 1e-5,
            "sample {n}: {} vs {expected}",
            full.left[n]
        );
    }
}

#[test]
fn test_crossover_keeps_bass_mono() {
    let snapshot = ParamSnapshot::default()
        .with_width(100.0)
        .with_crossover(true, 300.0);
    let bass = render_tail(SR, &snapshot, TestSignal::Sine, 40.0).stats();
    assert!(bass.correlation > 0.9, "{}", bass.correlation);

    let treble = render_tail(SR, &snapshot, TestSignal::Sine, 4000.0).stats();
    assert!(treble.correlation.abs() < 0.15, "{}", treble.correlation);
}

#[test]
fn test_rotation_half_turn_inverts() {
    let base = ParamSnapshot::default()
        .with_mode(HilbertMode::Iir)
        .with_width(60.0);
    let straight = render_tail(SR, &base, TestSignal::Sine, 500.0);
    let turned = render_tail(SR, &base.with_rotation(180.0), TestSignal::Sine, 500.0);

    for n in (0..straight.left.len()).step_by(31) {
        assert!((straight.left[n] + turned.left[n]).abs() < 1e-5);
        assert!((straight.right[n] + turned.right[n]).abs() < 1e-5);
    }
}

#[test]
fn test_mode_switch_mid_stream() {
    let mut widener = processor(SR, HilbertMode::Iir);
    let input = TestSignal::Sine.generate_f32(440.0, SR, BLOCK, 0.5);
    let iir = ParamSnapshot::default().with_mode(HilbertMode::Iir).with_width(100.0);
    let fir = iir.with_mode(HilbertMode::Fir);

    let mut process = |snapshot: &ParamSnapshot| {
        let (mut l, mut r) = (input.clone(), input.clone());
        widener.process(&mut [l.as_mut_slice(), r.as_mut_slice()], 2, BLOCK, snapshot);
        (l, r)
    };

    let (l, _) = process(&iir);
    assert!(AudioAnalysis::rms_f32(&l) > 0.1);

    // Fresh FIR history: silent for the first latency window
    let (l, r) = process(&fir);
    assert!(l.iter().chain(&r).all(|x| x.abs() < 1e-6));

    let mut last = process(&fir);
    for _ in 0..5 {
        last = process(&fir);
    }
    assert!(AudioAnalysis::rms_f32(&last.0) > 0.1);
    assert!(last.0.iter().chain(&last.1).all(|x| x.is_finite()));
}

#[test]
fn test_non_finite_input_is_not_sanitized() {
    let mut widener = processor(SR, HilbertMode::Iir);
    let snapshot = ParamSnapshot::default().with_mode(HilbertMode::Iir).with_width(50.0);

    let mut l = vec![0.25f32; 64];
    l[10] = f32::NAN;
    let mut r = l.clone();
    widener.process(&mut [l.as_mut_slice(), r.as_mut_slice()], 2, 64, &snapshot);
    assert!(l.iter().any(|x| x.is_nan()));

    widener.release();
    let mut l = vec![0.25f32; 64];
    let mut r = l.clone();
    widener.process(&mut [l.as_mut_slice(), r.as_mut_slice()], 2, 64, &snapshot);
    assert!(l.iter().chain(&r).all(|x| x.is_finite()));
}
