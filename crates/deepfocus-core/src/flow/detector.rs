//! Weighted multi-indicator flow scorer.
//!
//! ## Confidence gating
//!
//! An indicator contributes to the aggregate only when its raw score meets
//! its own threshold. The aggregate is the weighted mean over the included
//! indicators; the confidence is the sum of their weights.
//!
//! ```text
//! aggregate  = Σ(score·weight | included) / Σ(weight | included)
//! confidence = Σ(weight | included)
//! in flow    = aggregate ≥ 0.70 && confidence ≥ 0.50
//! ```
//!
//! With no included indicator the aggregate and the confidence are both 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use super::indicators::{challenge_ratio, FlowIndicator};
use super::sample::BehaviorSample;

/// Float slack for threshold and weight-sum comparisons.
const EPSILON: f64 = 1e-9;

/// Flow decision thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowConfig {
    #[serde(default = "default_flow_threshold")]
    pub flow_threshold: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Snapshots kept in the rolling history.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_flow_threshold() -> f64 {
    0.70
}
fn default_min_confidence() -> f64 {
    0.50
}
fn default_history_size() -> usize {
    20
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            flow_threshold: default_flow_threshold(),
            min_confidence: default_min_confidence(),
            history_size: default_history_size(),
        }
    }
}

/// Score of one indicator in one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorScore {
    pub indicator: FlowIndicator,
    pub score: f64,
    pub weight: f64,
    pub threshold: f64,
    /// Cleared its threshold and counted toward the aggregate.
    pub included: bool,
}

/// Qualitative advice derived from single indicators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ReduceTaskSwitching,
    SilenceInterruptions,
    TakeBreak,
    SteadyTypingRhythm,
    RaiseChallenge,
    BreakTaskDown,
    KeepMomentum,
}

impl Recommendation {
    pub fn message(self) -> &'static str {
        match self {
            Recommendation::ReduceTaskSwitching => {
                "Reduce task switching: stay with the current task until it is done"
            }
            Recommendation::SilenceInterruptions => {
                "Interruptions are frequent: silence chat and mail sources"
            }
            Recommendation::TakeBreak => "Activity has dropped off: take a short break",
            Recommendation::SteadyTypingRhythm => {
                "Typing rhythm is uneven: close unrelated windows and settle in"
            }
            Recommendation::RaiseChallenge => {
                "The task looks too easy: set a tighter goal or pick a harder task"
            }
            Recommendation::BreakTaskDown => {
                "The task looks too hard: split it into smaller steps"
            }
            Recommendation::KeepMomentum => "Good momentum: keep going",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of one flow evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowSnapshot {
    pub evaluated_at: DateTime<Utc>,
    pub indicators: Vec<IndicatorScore>,
    pub aggregate: f64,
    pub confidence: f64,
    pub is_in_flow: bool,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
}

impl FlowSnapshot {
    pub fn indicator(&self, indicator: FlowIndicator) -> Option<&IndicatorScore> {
        self.indicators.iter().find(|s| s.indicator == indicator)
    }
}

/// Flow detector with a bounded rolling history.
///
/// [`FlowDetector::evaluate`] is a pure function of the sample; only
/// [`FlowDetector::observe`] touches the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDetector {
    config: FlowConfig,
    #[serde(default)]
    history: VecDeque<FlowSnapshot>,
}

impl Default for FlowDetector {
    fn default() -> Self {
        Self::new(FlowConfig::default())
    }
}

impl FlowDetector {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn evaluate(&self, sample: &BehaviorSample) -> FlowSnapshot {
        let indicators: Vec<IndicatorScore> = FlowIndicator::ALL
            .iter()
            .map(|&indicator| {
                let score = indicator.score(sample);
                IndicatorScore {
                    indicator,
                    score,
                    weight: indicator.weight(),
                    threshold: indicator.threshold(),
                    included: score + EPSILON >= indicator.threshold(),
                }
            })
            .collect();

        let (weighted, confidence) = indicators
            .iter()
            .filter(|s| s.included)
            .fold((0.0, 0.0), |(sum, weights), s| {
                (sum + s.score * s.weight, weights + s.weight)
            });

        let aggregate = if confidence > 0.0 {
            weighted / confidence
        } else {
            0.0
        };
        let is_in_flow = confidence > 0.0
            && aggregate + EPSILON >= self.config.flow_threshold
            && confidence + EPSILON >= self.config.min_confidence;

        let recommendations = recommend(sample, &indicators);

        FlowSnapshot {
            evaluated_at: sample.window_end,
            indicators,
            aggregate,
            confidence,
            is_in_flow,
            recommendations,
        }
    }

    /// Evaluate and remember the snapshot in the rolling history.
    pub fn observe(&mut self, sample: &BehaviorSample) -> FlowSnapshot {
        let snapshot = self.evaluate(sample);
        self.history.push_back(snapshot.clone());
        while self.history.len() > self.config.history_size.max(1) {
            self.history.pop_front();
        }
        snapshot
    }

    pub fn history(&self) -> impl Iterator<Item = &FlowSnapshot> {
        self.history.iter()
    }

    pub fn latest(&self) -> Option<&FlowSnapshot> {
        self.history.back()
    }

    /// Mean aggregate over the rolling history.
    pub fn trend(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let total: f64 = self.history.iter().map(|s| s.aggregate).sum();
        Some(total / self.history.len() as f64)
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

fn recommend(sample: &BehaviorSample, scores: &[IndicatorScore]) -> Vec<Recommendation> {
    let mut out = Vec::new();
    let hours = sample.window_hours();
    let score_of = |indicator: FlowIndicator| {
        scores
            .iter()
            .find(|s| s.indicator == indicator)
            .map(|s| s.score)
            .unwrap_or(0.0)
    };

    if hours > 0.0 && sample.task_switches as f64 / hours > 6.0 {
        out.push(Recommendation::ReduceTaskSwitching);
    }
    if hours > 0.0 && sample.interruptions.len() as f64 / hours > 3.0 {
        out.push(Recommendation::SilenceInterruptions);
    }
    let tracked = sample.active_minutes + sample.idle_minutes;
    if tracked > 0.0 && sample.idle_minutes / tracked > 0.4 {
        out.push(Recommendation::TakeBreak);
    }
    if sample.keystrokes.len() > 5 && score_of(FlowIndicator::TypingConsistency) < 0.5 {
        out.push(Recommendation::SteadyTypingRhythm);
    }
    match challenge_ratio(sample) {
        Some(ratio) if ratio < 0.9 => out.push(Recommendation::RaiseChallenge),
        Some(ratio) if ratio > 1.5 => out.push(Recommendation::BreakTaskDown),
        _ => {}
    }
    if score_of(FlowIndicator::ProgressMomentum) >= 0.8 {
        out.push(Recommendation::KeepMomentum);
    }
    out
}
