//! Greedy session fill.
//!
//! Walks the ranking, preferring a task in the same complexity bucket as
//! the previous pick so consecutive tasks need similar effort. Stops once
//! the fill ratio is reached or the task cap is hit. If more than half the
//! budget is still free afterwards, the shortest remaining task that fits
//! is appended, even past the cap.

use serde::{Deserialize, Serialize};

use super::{Complexity, RankedTask, RankerConfig};

/// Tasks chosen for one session, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedSelection {
    pub tasks: Vec<RankedTask>,
    pub budget_minutes: u32,
    pub total_minutes: u32,
}

impl RankedSelection {
    /// Share of the budget the selection fills (can exceed 1.0 via overflow).
    pub fn utilization(&self) -> f64 {
        if self.budget_minutes == 0 {
            return 0.0;
        }
        self.total_minutes as f64 / self.budget_minutes as f64
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|r| r.task.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub(super) fn select(ranked: &[RankedTask], budget: u32, config: &RankerConfig) -> RankedSelection {
    let target = budget as f64 * config.fill_ratio;
    let mut taken = vec![false; ranked.len()];
    let mut picks: Vec<usize> = Vec::new();
    let mut used: u32 = 0;

    while picks.len() < config.max_tasks && (used as f64) < target {
        // The first task may use the overflow tolerance; later ones must fit.
        let limit = if picks.is_empty() {
            budget.saturating_add(config.overflow_minutes)
        } else {
            budget.saturating_sub(used)
        };
        let last_bucket: Option<Complexity> = picks.last().map(|&i| ranked[i].complexity);

        let fits = |i: &usize| !taken[*i] && ranked[*i].minutes() <= limit;
        let same_bucket = last_bucket.and_then(|bucket| {
            (0..ranked.len()).find(|i| fits(i) && ranked[*i].complexity == bucket)
        });
        let next = same_bucket.or_else(|| (0..ranked.len()).find(|i| fits(i)));

        match next {
            Some(i) => {
                taken[i] = true;
                used += ranked[i].minutes();
                picks.push(i);
            }
            None => break,
        }
    }

    // At most one task past `max_tasks`.
    let remaining = budget.saturating_sub(used);
    if remaining as f64 > budget as f64 / 2.0 {
        let small = (0..ranked.len())
            .filter(|&i| !taken[i] && ranked[i].minutes() <= remaining)
            .min_by_key(|&i| ranked[i].minutes());
        if let Some(i) = small {
            used += ranked[i].minutes();
            picks.push(i);
        }
    }

    RankedSelection {
        tasks: picks.into_iter().map(|i| ranked[i].clone()).collect(),
        budget_minutes: budget,
        total_minutes: used,
    }
}

#[cfg(test)]
mod tests {
    use super::super::{RankingContext, TaskRanker};
    use super::*;
    use crate::session::SessionType;
    use crate::task::{Priority, TaskCandidate};
    use chrono::{DateTime, Utc};

    fn ctx(minutes: u32) -> RankingContext {
        let now = DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        RankingContext::new(minutes, 5, SessionType::Regular, now)
    }

    #[test]
    fn stops_once_eighty_percent_is_used() {
        let ranker = TaskRanker::default();
        let tasks = vec![
            TaskCandidate::new("a", "A", 30),
            TaskCandidate::new("b", "B", 20),
            TaskCandidate::new("c", "C", 25),
        ];
        let selection = ranker.plan(&tasks, &ctx(60));
        assert_eq!(selection.task_ids(), ["a", "b"]);
        assert_eq!(selection.total_minutes, 50);
        assert!(selection.utilization() >= 0.8);
    }

    #[test]
    fn caps_at_four_tasks() {
        let ranker = TaskRanker::default();
        let tasks: Vec<_> = (0..8)
            .map(|i| TaskCandidate::new(format!("t{i}"), "T", 20))
            .collect();
        let selection = ranker.plan(&tasks, &ctx(100));
        assert_eq!(selection.tasks.len(), 4);
        assert_eq!(selection.total_minutes, 80);
    }

    #[test]
    fn first_task_may_overflow() {
        let ranker = TaskRanker::default();
        let selection = ranker.plan(&[TaskCandidate::new("long", "Long", 90)], &ctx(60));
        assert_eq!(selection.task_ids(), ["long"]);
        assert_eq!(selection.total_minutes, 90);
    }

    #[test]
    fn prefers_same_complexity_bucket_next() {
        let ranker = TaskRanker::default();
        let mut heavy_a = TaskCandidate::new("heavy-a", "Heavy A", 40)
            .with_priority(Priority::High)
            .with_tags(["architecture"]);
        heavy_a.subtask_count = 3;
        let light = TaskCandidate::new("light", "Light", 20).with_priority(Priority::High);
        let heavy_b = TaskCandidate::new("heavy-b", "Heavy B", 40).with_tags(["research"]);

        let ranked = ranker.rank(&[heavy_a, light, heavy_b], &ctx(120));
        let order: Vec<_> = ranked.iter().map(|r| r.task.id.as_str()).collect();
        assert_eq!(order, ["heavy-a", "light", "heavy-b"]);

        // heavy-b jumps ahead of the better-ranked light task.
        let selection = ranker.select(&ranked, 120);
        assert_eq!(selection.task_ids(), ["heavy-a", "heavy-b", "light"]);
        assert_eq!(selection.tasks[0].complexity, Complexity::Medium);
        assert_eq!(selection.tasks[1].complexity, Complexity::Medium);
    }

    #[test]
    fn adds_small_task_when_half_budget_unused() {
        let ranker = TaskRanker::default();
        let mut tasks: Vec<_> = (0..6)
            .map(|i| TaskCandidate::new(format!("t{i}"), "T", 5))
            .collect();
        tasks.push(TaskCandidate::new("short", "Short", 3));
        let selection = ranker.plan(&tasks, &ctx(60));
        // Four picks use 20 of 60 minutes; the shortest leftover is appended.
        assert_eq!(selection.tasks.len(), 5);
        assert_eq!(selection.tasks[4].task.id, "short");
        assert_eq!(selection.total_minutes, 23);
    }

    #[test]
    fn top_up_adds_at_most_one_task_past_the_cap() {
        let ranker = TaskRanker::default();
        let tasks: Vec<_> = (0..10)
            .map(|i| TaskCandidate::new(format!("t{i}"), "T", 2))
            .collect();
        let selection = ranker.plan(&tasks, &ctx(120));
        // 110 of 120 minutes stay free, yet only one extra task joins.
        assert_eq!(selection.tasks.len(), ranker.config().max_tasks + 1);
        assert_eq!(selection.total_minutes, 10);
    }

    #[test]
    fn follows_ranking_when_nothing_else_fits() {
        let ranker = TaskRanker::default();
        let mut ranked = ranker.rank(
            &[
                TaskCandidate::new("big", "Big", 40),
                TaskCandidate::new("tiny", "Tiny", 10),
                TaskCandidate::new("mid", "Mid", 70),
            ],
            &ctx(100),
        );
        ranked.sort_by_key(|r| std::cmp::Reverse(r.minutes()));
        let selection = ranker.select(&ranked, 100);
        // mid first; big no longer fits the 30 minutes left, tiny does.
        assert_eq!(selection.task_ids(), ["mid", "tiny"]);
        assert_eq!(selection.total_minutes, 80);
    }

    #[test]
    fn empty_ranking_selects_nothing() {
        let selection = TaskRanker::default().select(&[], 60);
        assert!(selection.is_empty());
        assert_eq!(selection.utilization(), 0.0);
    }
}
