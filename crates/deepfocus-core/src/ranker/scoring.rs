//! Per-criterion task scores.
//!
//! Every criterion lands in `[0, 1]` and the total is a fixed-weight sum:
//!
//! | criterion   | weight |
//! |-------------|--------|
//! | priority    | 0.30   |
//! | deadline    | 0.25   |
//! | complexity  | 0.20   |
//! | energy      | 0.15   |
//! | context     | 0.10   |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionType;
use crate::task::{Priority, TaskCandidate};

pub const PRIORITY_WEIGHT: f64 = 0.30;
pub const DEADLINE_WEIGHT: f64 = 0.25;
pub const COMPLEXITY_WEIGHT: f64 = 0.20;
pub const ENERGY_WEIGHT: f64 = 0.15;
pub const CONTEXT_WEIGHT: f64 = 0.10;

/// Tags that mark a task as cognitively heavy.
const COMPLEX_TAGS: [&str; 6] = [
    "complex",
    "research",
    "architecture",
    "design",
    "refactor",
    "investigation",
];

/// Coarse complexity estimate of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// Energy (1-10) the task is expected to demand.
    pub fn estimated_energy(self) -> f64 {
        match self {
            Complexity::Low => 3.0,
            Complexity::Medium => 6.0,
            Complexity::High => 9.0,
        }
    }

    fn rank(self) -> i32 {
        match self {
            Complexity::Low => 0,
            Complexity::Medium => 1,
            Complexity::High => 2,
        }
    }
}

/// Heuristic complexity from priority, duration, description, subtasks and tags.
pub fn estimate_complexity(task: &TaskCandidate) -> Complexity {
    let mut points = 0;
    if task.priority == Priority::High {
        points += 1;
    }
    points += match task.estimated_duration_minutes {
        d if d > 60 => 2,
        d if d > 30 => 1,
        _ => 0,
    };
    points += match task.description_length {
        l if l > 500 => 2,
        l if l > 200 => 1,
        _ => 0,
    };
    points += match task.subtask_count {
        n if n > 5 => 2,
        n if n > 2 => 1,
        _ => 0,
    };
    if COMPLEX_TAGS.iter().any(|tag| task.has_tag(tag)) {
        points += 2;
    }

    match points {
        p if p <= 2 => Complexity::Low,
        p if p <= 5 => Complexity::Medium,
        _ => Complexity::High,
    }
}

/// Something worked on recently, used for context continuity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecentWork {
    pub task_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<&TaskCandidate> for RecentWork {
    fn from(task: &TaskCandidate) -> Self {
        Self {
            task_id: task.id.clone(),
            parent_id: task.parent_id.clone(),
            category: task.category.clone(),
            tags: task.tags.clone(),
        }
    }
}

/// Inputs that do not belong to any single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingContext {
    pub session_minutes: u32,
    /// Current energy, 1-10.
    pub energy_level: u8,
    pub session_type: SessionType,
    #[serde(default)]
    pub recent: Vec<RecentWork>,
    pub now: DateTime<Utc>,
}

impl RankingContext {
    pub fn new(session_minutes: u32, energy_level: u8, session_type: SessionType, now: DateTime<Utc>) -> Self {
        Self {
            session_minutes,
            energy_level,
            session_type,
            recent: Vec::new(),
            now,
        }
    }

    /// Energy adjusted for what the session type asks of the user.
    pub fn effective_energy(&self) -> f64 {
        let shift = match self.session_type {
            SessionType::DeepWork => 1,
            SessionType::Light => -2,
            SessionType::Regular | SessionType::Creative => 0,
        };
        (self.energy_level.clamp(1, 10) as i32 + shift).clamp(1, 10) as f64
    }
}

/// Scores of one task on each criterion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CriterionScores {
    pub priority: f64,
    pub deadline: f64,
    pub complexity: f64,
    pub energy_match: f64,
    pub context: f64,
}

impl CriterionScores {
    pub fn total(&self) -> f64 {
        self.priority * PRIORITY_WEIGHT
            + self.deadline * DEADLINE_WEIGHT
            + self.complexity * COMPLEXITY_WEIGHT
            + self.energy_match * ENERGY_WEIGHT
            + self.context * CONTEXT_WEIGHT
    }
}

pub fn priority_score(task: &TaskCandidate) -> f64 {
    match task.priority {
        Priority::High => 1.0,
        Priority::Medium => 0.6,
        Priority::Low => 0.3,
    }
}

/// Piecewise urgency by hours until due. Overdue counts as most urgent.
pub fn deadline_score(task: &TaskCandidate, now: DateTime<Utc>) -> f64 {
    let due = match task.due_date {
        Some(due) => due,
        None => return 0.3,
    };
    let hours = (due - now).num_minutes() as f64 / 60.0;
    if hours <= 24.0 {
        1.0
    } else if hours <= 72.0 {
        0.8
    } else if hours <= 168.0 {
        0.6
    } else if hours <= 336.0 {
        0.4
    } else {
        0.2
    }
}

fn energy_bucket(energy: f64) -> Complexity {
    if energy >= 7.0 {
        Complexity::High
    } else if energy >= 4.0 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}

/// How well the task's complexity suits the current energy.
pub fn complexity_match_score(complexity: Complexity, context: &RankingContext) -> f64 {
    let energy = energy_bucket(context.effective_energy());
    match (complexity.rank() - energy.rank()).abs() {
        0 => 1.0,
        1 => 0.6,
        _ => 0.2,
    }
}

/// `1 - |energy - task energy| / 10`.
pub fn energy_match_score(complexity: Complexity, context: &RankingContext) -> f64 {
    let gap = (context.effective_energy() - complexity.estimated_energy()).abs();
    (1.0 - gap / 10.0).clamp(0.0, 1.0)
}

/// Bonus for sharing a parent, category, or tag with recent work.
pub fn context_score(task: &TaskCandidate, context: &RankingContext) -> f64 {
    context
        .recent
        .iter()
        .map(|recent| {
            let same_parent = match (&task.parent_id, &recent.parent_id) {
                (Some(a), Some(b)) => a == b,
                (Some(a), None) => a == &recent.task_id,
                _ => false,
            };
            if same_parent {
                return 1.0;
            }
            let same_category = matches!(
                (&task.category, &recent.category),
                (Some(a), Some(b)) if a.eq_ignore_ascii_case(b)
            );
            if same_category {
                return 0.7;
            }
            if recent.tags.iter().any(|tag| task.has_tag(tag)) {
                return 0.5;
            }
            0.0
        })
        .fold(0.0, f64::max)
}

pub fn score_task(task: &TaskCandidate, context: &RankingContext) -> (Complexity, CriterionScores) {
    let complexity = estimate_complexity(task);
    let scores = CriterionScores {
        priority: priority_score(task),
        deadline: deadline_score(task, context.now),
        complexity: complexity_match_score(complexity, context),
        energy_match: energy_match_score(complexity, context),
        context: context_score(task, context),
    };
    (complexity, scores)
}
