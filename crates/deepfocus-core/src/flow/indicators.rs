//! The seven flow indicators.
//!
//! Each scorer maps a [`BehaviorSample`] to `[0, 1]`. Missing signals score
//! zero, which keeps the indicator below its threshold so it is excluded
//! from the aggregate instead of dragging it down.

use serde::{Deserialize, Serialize};

use super::sample::BehaviorSample;

/// Keystroke gaps above this are pauses, not rhythm.
const MAX_TYPING_GAP_MS: i64 = 2_000;
const MIN_TYPING_INTERVALS: usize = 5;
const OPTIMAL_TYPING_MS: (f64, f64) = (120.0, 200.0);

const MAX_SWITCHES_PER_HOUR: f64 = 12.0;
const OPTIMAL_COMPRESSION: (f64, f64) = (0.2, 0.4);
const OPTIMAL_CHALLENGE_RATIO: (f64, f64) = (1.1, 1.3);
const SATURATING_EVENTS_PER_MINUTE: f64 = 40.0;
const MAX_INTERRUPTIONS_PER_HOUR: f64 = 6.0;
const SATURATING_TASKS_PER_HOUR: f64 = 2.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowIndicator {
    TypingConsistency,
    TaskFocus,
    TimePerception,
    ChallengeSkillBalance,
    ActivityIntensity,
    InterruptionResistance,
    ProgressMomentum,
}

impl FlowIndicator {
    pub const ALL: [FlowIndicator; 7] = [
        FlowIndicator::TypingConsistency,
        FlowIndicator::TaskFocus,
        FlowIndicator::TimePerception,
        FlowIndicator::ChallengeSkillBalance,
        FlowIndicator::ActivityIntensity,
        FlowIndicator::InterruptionResistance,
        FlowIndicator::ProgressMomentum,
    ];

    /// Fixed weight; the seven weights sum to 1.0.
    pub fn weight(self) -> f64 {
        match self {
            FlowIndicator::TypingConsistency => 0.25,
            FlowIndicator::TaskFocus => 0.20,
            FlowIndicator::TimePerception => 0.15,
            FlowIndicator::ChallengeSkillBalance => 0.15,
            FlowIndicator::ActivityIntensity => 0.10,
            FlowIndicator::InterruptionResistance => 0.10,
            FlowIndicator::ProgressMomentum => 0.05,
        }
    }

    /// Minimum raw score for the indicator to count at all.
    pub fn threshold(self) -> f64 {
        match self {
            FlowIndicator::TypingConsistency => 0.70,
            FlowIndicator::TaskFocus => 0.80,
            FlowIndicator::TimePerception => 0.60,
            FlowIndicator::ChallengeSkillBalance => 0.70,
            FlowIndicator::ActivityIntensity => 0.75,
            FlowIndicator::InterruptionResistance => 0.80,
            FlowIndicator::ProgressMomentum => 0.60,
        }
    }

    pub fn score(self, sample: &BehaviorSample) -> f64 {
        let raw = match self {
            FlowIndicator::TypingConsistency => typing_consistency(sample),
            FlowIndicator::TaskFocus => task_focus(sample),
            FlowIndicator::TimePerception => time_perception(sample),
            FlowIndicator::ChallengeSkillBalance => challenge_skill_balance(sample),
            FlowIndicator::ActivityIntensity => activity_intensity(sample),
            FlowIndicator::InterruptionResistance => interruption_resistance(sample),
            FlowIndicator::ProgressMomentum => progress_momentum(sample),
        };
        clamp01(raw)
    }
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Low variance and a near-optimal inter-keystroke interval.
pub fn typing_consistency(sample: &BehaviorSample) -> f64 {
    let intervals = sample.keystroke_intervals_ms(MAX_TYPING_GAP_MS);
    if intervals.len() < MIN_TYPING_INTERVALS {
        return 0.0;
    }
    let n = intervals.len() as f64;
    let mean = intervals.iter().sum::<f64>() / n;
    let variance = intervals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let cv = variance.sqrt() / mean;
    let consistency = clamp01(1.0 - cv);

    let (low, high) = OPTIMAL_TYPING_MS;
    let optimality = if mean < low {
        mean / low
    } else if mean > high {
        1.0 - (mean - high) / 400.0
    } else {
        1.0
    };

    0.6 * consistency + 0.4 * clamp01(optimality)
}

/// Few task switches and most active time on focus surfaces.
pub fn task_focus(sample: &BehaviorSample) -> f64 {
    let hours = sample.window_hours();
    if hours <= 0.0 || sample.active_minutes <= 0.0 {
        return 0.0;
    }
    let switch_rate = sample.task_switches as f64 / hours;
    let switch_score = clamp01(1.0 - switch_rate / MAX_SWITCHES_PER_HOUR);
    let focus_ratio = clamp01(sample.focus_surface_minutes / sample.active_minutes);
    0.5 * switch_score + 0.5 * focus_ratio
}

/// Best when the window felt 20-40% shorter than it was.
pub fn time_perception(sample: &BehaviorSample) -> f64 {
    let actual = sample.window_minutes();
    let perceived = match sample.perceived_minutes {
        Some(p) if actual > 0.0 && p >= 0.0 => p,
        _ => return 0.0,
    };
    let compression = 1.0 - perceived / actual;
    let (low, high) = OPTIMAL_COMPRESSION;
    if compression < low {
        0.5 + 2.5 * compression
    } else if compression > high {
        1.0 - 2.5 * (compression - high)
    } else {
        1.0
    }
}

/// Difficulty slightly above skill, combined with completion rate.
pub fn challenge_skill_balance(sample: &BehaviorSample) -> f64 {
    let ratio = match challenge_ratio(sample) {
        Some(r) => r,
        None => return 0.0,
    };
    let (low, high) = OPTIMAL_CHALLENGE_RATIO;
    let distance = if ratio < low {
        low - ratio
    } else if ratio > high {
        ratio - high
    } else {
        0.0
    };
    let balance = clamp01(1.0 - 2.0 * distance);
    let completion = sample.completion_rate().unwrap_or(0.5);
    0.7 * balance + 0.3 * completion
}

pub(crate) fn challenge_ratio(sample: &BehaviorSample) -> Option<f64> {
    match (sample.task_difficulty, sample.user_skill) {
        (Some(difficulty), Some(skill)) if skill > 0.0 => Some(difficulty / skill),
        _ => None,
    }
}

/// Input rate and share of the window spent active.
pub fn activity_intensity(sample: &BehaviorSample) -> f64 {
    let minutes = sample.window_minutes();
    if minutes <= 0.0 {
        return 0.0;
    }
    let rate_score = clamp01(sample.input_events as f64 / minutes / SATURATING_EVENTS_PER_MINUTE);
    let tracked = sample.active_minutes + sample.idle_minutes;
    let active_ratio = if tracked > 0.0 {
        sample.active_minutes / tracked
    } else {
        0.0
    };
    0.5 * rate_score + 0.5 * active_ratio
}

/// Few interruptions, and few of them self-inflicted.
pub fn interruption_resistance(sample: &BehaviorSample) -> f64 {
    let hours = sample.window_hours();
    if hours <= 0.0 {
        return 0.0;
    }
    let count = sample.interruptions.len();
    let rate_score = clamp01(1.0 - count as f64 / hours / MAX_INTERRUPTIONS_PER_HOUR);
    let self_share = if count == 0 {
        0.0
    } else {
        sample.self_inflicted_interruptions() as f64 / count as f64
    };
    0.7 * rate_score + 0.3 * (1.0 - self_share)
}

/// Completion rate and tasks finished per hour.
pub fn progress_momentum(sample: &BehaviorSample) -> f64 {
    let hours = sample.window_hours();
    let completion = sample.completion_rate().unwrap_or(0.0);
    let per_hour = if hours > 0.0 {
        sample.tasks_completed as f64 / hours
    } else {
        0.0
    };
    0.5 * completion + 0.5 * clamp01(per_hour / SATURATING_TASKS_PER_HOUR)
}
