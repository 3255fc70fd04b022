//! # Hilbert Widener: Real-Time Stereo Widening Core
//!
//! `hilbert-widener` turns a mono (or downmixed) signal into a wide stereo
//! image by pairing it with its Hilbert transform. The quadrature branch is
//! decorrelated from the in-phase branch and mixed into left/right so that
//! width is continuously adjustable while the mono fold-down stays intact.
//!
//! ## Architecture
//!
//! - **Quadrature** - I/Q generation, either a zero-latency IIR allpass pair
//!   or a linear-phase FIR Hilbert transformer
//! - **Crossover** - optional Linkwitz-Riley split so the low end stays mono
//! - **Matrix** - width law, phase-angle mixing and image rotation
//! - **Processor** - the host-facing pipeline with parameter snapshots,
//!   output gain smoothing and analyzer forwarding
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hilbert_widener::prelude::*;
//! use std::sync::Arc;
//!
//! let params = Arc::new(WidenerParams::new());
//! let mut widener = WidenerProcessor::new(Arc::clone(&params));
//! widener.prepare(48000.0, 512, 2);
//!
//! // Report the delay to the host
//! let latency = widener.latency_samples();
//!
//! // Control thread
//! params.set(ParamId::Width, 80.0).unwrap();
//!
//! // Audio thread
//! let mut left = vec![0.0f32; 512];
//! let mut right = vec![0.0f32; 512];
//! widener.process_block(&mut [left.as_mut_slice(), right.as_mut_slice()], 2, 512);
//! # let _ = latency;
//! ```

extern crate alloc;

pub mod analysis;
pub mod analyzer;
pub mod buffer;
pub mod config;
pub mod crossover;
pub mod matrix;
pub mod params;
pub mod processor;
pub mod quadrature;
pub mod smoothing;

/// Prelude module for convenient imports
pub mod prelude {
    // Parameters and configuration
    pub use crate::config::{ConfigError, ProcessSpec, ProcessorConfig};
    pub use crate::params::{
        AtomicF64, HilbertMode, ParamError, ParamId, ParamInfo, ParamSnapshot, WidenerParams,
        PARAM_LAYOUT,
    };

    // DSP stages
    pub use crate::crossover::{BandSplitter, Biquad, FilterKind, LinkwitzRiley};
    pub use crate::matrix::{MatrixInput, MatrixSettings, ResidualEstimator, StereoMatrix, WidthLaw};
    pub use crate::quadrature::{fir_tap_count, AllpassCascade, FirHilbert, QuadratureGenerator};
    pub use crate::smoothing::{decibels_to_gain, LinearRamp};

    // Pipeline
    pub use crate::processor::WidenerProcessor;

    // Analyzers
    pub use crate::analyzer::{map_xy, Analyzer, AnalyzerBus, AnalyzerSlot, CorrelationMeter, Goniometer};

    // Block utilities and measurement
    pub use crate::analysis::{AudioAnalysis, StereoStats, TestSignal, ToneFit};
    pub use crate::buffer::{AudioBlock, DelayLine};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
