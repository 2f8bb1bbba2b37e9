//! Task ranking and session selection.
//!
//! [`TaskRanker::rank`] scores eligible candidates and sorts them by total
//! score; [`TaskRanker::select`] greedily fills a session's time budget from
//! that ranking.

mod scoring;
mod selection;

use serde::{Deserialize, Serialize};

pub use scoring::{
    context_score, deadline_score, estimate_complexity, priority_score, score_task, Complexity,
    CriterionScores, RankingContext, RecentWork,
};
pub use selection::RankedSelection;

use crate::task::TaskCandidate;

/// Selection limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankerConfig {
    /// Minutes a single task may exceed the session budget by.
    #[serde(default = "default_overflow_minutes")]
    pub overflow_minutes: u32,
    /// Stop selecting once this share of the budget is used.
    #[serde(default = "default_fill_ratio")]
    pub fill_ratio: f64,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    /// Recently completed tasks considered for context continuity.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

fn default_overflow_minutes() -> u32 {
    30
}
fn default_fill_ratio() -> f64 {
    0.8
}
fn default_max_tasks() -> usize {
    4
}
fn default_recent_window() -> usize {
    5
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            overflow_minutes: default_overflow_minutes(),
            fill_ratio: default_fill_ratio(),
            max_tasks: default_max_tasks(),
            recent_window: default_recent_window(),
        }
    }
}

/// A candidate with its per-criterion scores. Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedTask {
    pub task: TaskCandidate,
    pub complexity: Complexity,
    pub scores: CriterionScores,
    pub total: f64,
}

impl RankedTask {
    pub fn minutes(&self) -> u32 {
        self.task.estimated_duration_minutes
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRanker {
    config: RankerConfig,
}

impl TaskRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Open tasks that fit the budget plus the overflow tolerance.
    pub fn is_eligible(&self, task: &TaskCandidate, session_minutes: u32) -> bool {
        !task.status.is_closed()
            && task.estimated_duration_minutes
                <= session_minutes.saturating_add(self.config.overflow_minutes)
    }

    /// Score and sort eligible candidates, highest total first.
    ///
    /// Ties keep the candidates' input order.
    pub fn rank(&self, candidates: &[TaskCandidate], context: &RankingContext) -> Vec<RankedTask> {
        let mut ranked: Vec<RankedTask> = candidates
            .iter()
            .filter(|task| self.is_eligible(task, context.session_minutes))
            .map(|task| {
                let (complexity, scores) = score_task(task, context);
                RankedTask {
                    task: task.clone(),
                    complexity,
                    total: scores.total(),
                    scores,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.total
                .partial_cmp(&a.total)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }

    /// Greedy budget fill over an already ranked list.
    pub fn select(&self, ranked: &[RankedTask], session_minutes: u32) -> RankedSelection {
        selection::select(ranked, session_minutes, &self.config)
    }

    /// Rank then select in one step.
    pub fn plan(&self, candidates: &[TaskCandidate], context: &RankingContext) -> RankedSelection {
        let ranked = self.rank(candidates, context);
        self.select(&ranked, context.session_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionType;
    use crate::task::{Priority, TaskStatus};
    use chrono::{DateTime, Duration, Utc};

    fn ctx(minutes: u32) -> RankingContext {
        let now = DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        RankingContext::new(minutes, 5, SessionType::Regular, now)
    }

    #[test]
    fn overflow_boundary_is_inclusive() {
        let ranker = TaskRanker::default();
        let fits = TaskCandidate::new("a", "A", 90);
        let too_long = TaskCandidate::new("b", "B", 91);

        let ranked = ranker.rank(&[fits, too_long], &ctx(60));
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].task.id, "a");
    }

    #[test]
    fn closed_tasks_are_not_ranked() {
        let ranker = TaskRanker::default();
        let mut done = TaskCandidate::new("a", "A", 10);
        done.status = TaskStatus::Completed;
        let mut archived = TaskCandidate::new("b", "B", 10);
        archived.status = TaskStatus::Archived;
        assert!(ranker.rank(&[done, archived], &ctx(60)).is_empty());
    }

    #[test]
    fn urgent_high_priority_ranks_first() {
        let ranker = TaskRanker::default();
        let context = ctx(60);
        let relaxed = TaskCandidate::new("relaxed", "Relaxed", 25).with_priority(Priority::Low);
        let urgent = TaskCandidate::new("urgent", "Urgent", 25)
            .with_priority(Priority::High)
            .with_due(context.now + Duration::hours(3));

        let ranked = ranker.rank(&[relaxed, urgent], &context);
        assert_eq!(ranked[0].task.id, "urgent");
        assert!(ranked[0].total > ranked[1].total);
    }

    #[test]
    fn equal_scores_keep_input_order() {
        let ranker = TaskRanker::default();
        let tasks = vec![
            TaskCandidate::new("x", "X", 30),
            TaskCandidate::new("y", "Y", 20),
            TaskCandidate::new("z", "Z", 25),
        ];
        let ids: Vec<_> = ranker
            .rank(&tasks, &ctx(60))
            .into_iter()
            .map(|r| r.task.id)
            .collect();
        assert_eq!(ids, ["x", "y", "z"]);
    }
}
