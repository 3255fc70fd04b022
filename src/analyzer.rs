//! Real-Time Analyzer Bridge
//!
//! Streams the processed stereo signal from the audio thread to optional
//! visual analyzers (goniometer, correlation meter).
//!
//! Analyzers are owned elsewhere (usually by the UI) and attached to an
//! [`AnalyzerBus`] as `Weak` references. The audio thread checks an atomic
//! presence flag, then `try_lock`s the slot and upgrades the reference; a
//! contended slot or a dropped analyzer simply skips that block. Analyzer
//! memory is only ever released on the control thread.

use crate::config::ProcessorConfig;
use crate::params::AtomicF64;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::f32::consts::FRAC_1_SQRT_2;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use parking_lot::Mutex;

/// Consumer of processed stereo blocks
///
/// `process_block` is called on the audio thread and must not block or
/// allocate.
pub trait Analyzer: Send + Sync {
    fn process_block(&self, left: &[f32], right: &[f32]);

    /// Clear accumulated state
    fn reset(&self) {}
}

/// Attachment point on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyzerSlot {
    Goniometer,
    Correlation,
}

impl AnalyzerSlot {
    pub const ALL: [AnalyzerSlot; 2] = [AnalyzerSlot::Goniometer, AnalyzerSlot::Correlation];

    fn index(self) -> usize {
        match self {
            AnalyzerSlot::Goniometer => 0,
            AnalyzerSlot::Correlation => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AnalyzerSlot::Goniometer => "goniometer",
            AnalyzerSlot::Correlation => "correlation",
        }
    }
}

#[derive(Default)]
struct SlotTarget {
    analyzer: Option<Weak<dyn Analyzer>>,
    /// Strong reference taken by the audio thread. Only the control thread
    /// drops it, so an analyzer is never destroyed inside `forward`.
    retained: Option<Arc<dyn Analyzer>>,
}

impl SlotTarget {
    /// Analyzer to feed, if its owner still holds it (audio thread)
    fn live(&mut self) -> Option<&Arc<dyn Analyzer>> {
        if self.retained.is_none() {
            self.retained = self.analyzer.as_ref().and_then(Weak::upgrade);
        }
        self.retained
            .as_ref()
            .filter(|analyzer| Arc::strong_count(analyzer) > 1)
    }

    fn is_live(&self) -> bool {
        match &self.retained {
            Some(analyzer) => Arc::strong_count(analyzer) > 1,
            None => self
                .analyzer
                .as_ref()
                .is_some_and(|weak| weak.strong_count() > 0),
        }
    }
}

#[derive(Default)]
struct SlotCell {
    present: AtomicBool,
    target: Mutex<SlotTarget>,
}

/// Non-owning analyzer registry shared between control and audio threads
///
/// The audio thread pins an attached analyzer with a strong reference the
/// first time it forwards to it. When the owner drops its last handle the
/// slot goes quiet, and the pinned reference is released by the next
/// control-thread call to [`AnalyzerBus::set`], [`AnalyzerBus::detach`] or
/// [`AnalyzerBus::collect_orphans`].
#[derive(Default)]
pub struct AnalyzerBus {
    slots: [SlotCell; 2],
}

impl AnalyzerBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach (`Some`) or detach (`None`) the analyzer for a slot.
    ///
    /// Control thread only; may wait for an in-flight audio block.
    pub fn set(&self, slot: AnalyzerSlot, analyzer: Option<Weak<dyn Analyzer>>) {
        let cell = &self.slots[slot.index()];
        let attached = analyzer.is_some();
        let retired = {
            let mut target = cell.target.lock();
            target.analyzer = analyzer;
            cell.present.store(attached, Ordering::Release);
            target.retained.take()
        };
        drop(retired);

        if attached {
            log::info!("{} analyzer attached", slot.name());
        } else {
            log::info!("{} analyzer detached", slot.name());
        }
    }

    /// Attach an owned analyzer by downgrading it
    pub fn attach<A: Analyzer + 'static>(&self, slot: AnalyzerSlot, analyzer: &Arc<A>) {
        let analyzer: Arc<dyn Analyzer> = analyzer.clone();
        self.set(slot, Some(Arc::downgrade(&analyzer)));
    }

    pub fn detach(&self, slot: AnalyzerSlot) {
        self.set(slot, None);
    }

    /// Whether a live analyzer is attached
    pub fn is_attached(&self, slot: AnalyzerSlot) -> bool {
        let cell = &self.slots[slot.index()];
        cell.present.load(Ordering::Acquire) && cell.target.lock().is_live()
    }

    /// Release analyzers whose owner has dropped them (control thread).
    ///
    /// Returns the number of slots that were cleared.
    pub fn collect_orphans(&self) -> usize {
        let mut cleared = 0;
        for slot in AnalyzerSlot::ALL {
            let cell = &self.slots[slot.index()];
            let retired = {
                let mut target = cell.target.lock();
                if target.analyzer.is_none() || target.is_live() {
                    continue;
                }
                target.analyzer = None;
                cell.present.store(false, Ordering::Release);
                target.retained.take()
            };
            drop(retired);
            cleared += 1;
            log::debug!("{} analyzer released after its owner dropped it", slot.name());
        }
        cleared
    }

    /// Forward one processed block to every attached analyzer. Never blocks
    /// and never drops an analyzer.
    pub fn forward(&self, left: &[f32], right: &[f32]) {
        for cell in &self.slots {
            if !cell.present.load(Ordering::Relaxed) {
                continue;
            }
            let Some(mut target) = cell.target.try_lock() else {
                continue;
            };
            if let Some(analyzer) = target.live() {
                analyzer.process_block(left, right);
            }
        }
    }

    /// Reset every attached analyzer
    pub fn reset_all(&self) {
        for cell in &self.slots {
            if !cell.present.load(Ordering::Relaxed) {
                continue;
            }
            if let Some(mut target) = cell.target.try_lock() {
                if let Some(analyzer) = target.live() {
                    analyzer.reset();
                }
            }
        }
    }
}

impl fmt::Debug for AnalyzerBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();
        for slot in AnalyzerSlot::ALL {
            let present = self.slots[slot.index()].present.load(Ordering::Relaxed);
            list.entry(&slot.name(), &present);
        }
        list.finish()
    }
}

/// Denominator below which correlation reads as 0
const CORRELATION_EPSILON: f64 = 1.0e-6;

/// Leaky-integrated L/R correlation coefficient in [-1, 1]
#[derive(Debug)]
pub struct CorrelationMeter {
    decay: f64,
    sum_lr: AtomicF64,
    sum_ll: AtomicF64,
    sum_rr: AtomicF64,
    correlation: AtomicF64,
}

impl CorrelationMeter {
    pub const DEFAULT_DECAY: f64 = 0.9999;

    pub fn new(decay: f64) -> Self {
        Self {
            decay,
            sum_lr: AtomicF64::new(0.0),
            sum_ll: AtomicF64::new(0.0),
            sum_rr: AtomicF64::new(0.0),
            correlation: AtomicF64::new(1.0),
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.correlation_decay)
    }

    /// Latest correlation value (any thread)
    pub fn correlation(&self) -> f64 {
        self.correlation.get()
    }
}

impl Default for CorrelationMeter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DECAY)
    }
}

impl Analyzer for CorrelationMeter {
    fn process_block(&self, left: &[f32], right: &[f32]) {
        let (mut lr, mut ll, mut rr) = (self.sum_lr.get(), self.sum_ll.get(), self.sum_rr.get());
        for (&l, &r) in left.iter().zip(right) {
            let (l, r) = (l as f64, r as f64);
            lr = lr * self.decay + l * r;
            ll = ll * self.decay + l * l;
            rr = rr * self.decay + r * r;
        }
        self.sum_lr.set(lr);
        self.sum_ll.set(ll);
        self.sum_rr.set(rr);

        let denom = (ll * rr).sqrt();
        let corr = if denom > CORRELATION_EPSILON {
            (lr / denom).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        self.correlation.set(corr);
    }

    fn reset(&self) {
        self.sum_lr.set(0.0);
        self.sum_ll.set(0.0);
        self.sum_rr.set(0.0);
        self.correlation.set(1.0);
    }
}

/// Points kept by the goniometer ring
pub const GONIOMETER_CAPACITY: usize = 2048;

/// Rotate an (L, R) pair onto goniometer axes: x = side, y = mid
#[inline]
pub fn map_xy(left: f32, right: f32) -> (f32, f32) {
    ((left - right) * FRAC_1_SQRT_2, (left + right) * FRAC_1_SQRT_2)
}

#[inline]
fn pack(left: f32, right: f32) -> u64 {
    ((left.to_bits() as u64) << 32) | right.to_bits() as u64
}

#[inline]
fn unpack(bits: u64) -> (f32, f32) {
    (f32::from_bits((bits >> 32) as u32), f32::from_bits(bits as u32))
}

/// Decimated lock-free ring of recent (L, R) frames
pub struct Goniometer {
    points: Vec<AtomicU64>,
    written: AtomicUsize,
    phase: AtomicUsize,
    decimation: usize,
}

impl Goniometer {
    pub const DEFAULT_DECIMATION: usize = 4;

    /// Keep every `decimation`-th frame (0 is treated as 1)
    pub fn new(decimation: usize) -> Self {
        Self {
            points: (0..GONIOMETER_CAPACITY).map(|_| AtomicU64::new(0)).collect(),
            written: AtomicUsize::new(0),
            phase: AtomicUsize::new(0),
            decimation: decimation.max(1),
        }
    }

    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.goniometer_decimation)
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    /// Total points written since the last reset
    pub fn points_written(&self) -> usize {
        self.written.load(Ordering::Acquire)
    }

    /// Up to `max` most recent raw (L, R) points, oldest first
    pub fn latest_points(&self, max: usize) -> Vec<(f32, f32)> {
        let written = self.written.load(Ordering::Acquire);
        let count = max.min(written).min(GONIOMETER_CAPACITY);
        (written - count..written)
            .map(|n| unpack(self.points[n % GONIOMETER_CAPACITY].load(Ordering::Relaxed)))
            .collect()
    }

    /// [`Self::latest_points`] mapped through [`map_xy`]
    pub fn latest_xy(&self, max: usize) -> Vec<(f32, f32)> {
        self.latest_points(max)
            .into_iter()
            .map(|(l, r)| map_xy(l, r))
            .collect()
    }
}

impl Default for Goniometer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DECIMATION)
    }
}

impl fmt::Debug for Goniometer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goniometer")
            .field("decimation", &self.decimation)
            .field("written", &self.points_written())
            .finish()
    }
}

impl Analyzer for Goniometer {
    fn process_block(&self, left: &[f32], right: &[f32]) {
        let mut phase = self.phase.load(Ordering::Relaxed);
        let mut written = self.written.load(Ordering::Relaxed);

        for (&l, &r) in left.iter().zip(right) {
            if phase == 0 {
                self.points[written % GONIOMETER_CAPACITY].store(pack(l, r), Ordering::Relaxed);
                written = written.wrapping_add(1);
            }
            phase += 1;
            if phase == self.decimation {
                phase = 0;
            }
        }

        self.phase.store(phase, Ordering::Relaxed);
        self.written.store(written, Ordering::Release);
    }

    fn reset(&self) {
        for point in &self.points {
            point.store(0, Ordering::Relaxed);
        }
        self.phase.store(0, Ordering::Relaxed);
        self.written.store(0, Ordering::Release);
    }
}
