//! Flow state detection.
//!
//! Behavioral signals are accumulated into non-overlapping
//! [`BehaviorSample`] windows and scored by the [`FlowDetector`] across
//! seven weighted indicators.

mod detector;
mod indicators;
mod sample;

pub use detector::{FlowConfig, FlowDetector, FlowSnapshot, IndicatorScore, Recommendation};
pub use indicators::FlowIndicator;
pub use sample::{ActivitySignal, BehaviorSample, InputKind, InterruptionMark, SampleAccumulator};
