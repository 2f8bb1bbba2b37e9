//! Task metadata consumed by the engine.
//!
//! Tasks are owned by the task store; the engine only reads them and
//! mirrors status changes back through [`crate::ports::TaskStore`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Task priority as supplied by the task store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(ValidationError::InvalidValue {
                field: "priority".into(),
                message: format!("expected low|medium|high, got '{other}'"),
            }),
        }
    }
}

/// Task lifecycle status in the task store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Archived,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Archived => "archived",
        }
    }

    /// Completed and archived tasks never enter a session.
    pub fn is_closed(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Archived)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in-progress" | "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "archived" => Ok(TaskStatus::Archived),
            other => Err(ValidationError::InvalidValue {
                field: "status".into(),
                message: format!("unknown task status '{other}'"),
            }),
        }
    }
}

/// A task offered to the engine by the task store. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCandidate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    pub estimated_duration_minutes: u32,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub description_length: usize,
    #[serde(default)]
    pub subtask_count: u32,
    #[serde(default)]
    pub status: TaskStatus,
}

impl TaskCandidate {
    /// Minimal candidate with medium priority and no metadata.
    pub fn new(id: impl Into<String>, title: impl Into<String>, minutes: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            priority: Priority::Medium,
            estimated_duration_minutes: minutes,
            due_date: None,
            tags: Vec::new(),
            category: None,
            parent_id: None,
            description_length: 0,
            subtask_count: 0,
            status: TaskStatus::Pending,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Filter passed to [`crate::ports::TaskStore::list_candidates`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Restrict to these ids (in any order).
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    /// Include completed and archived tasks.
    #[serde(default)]
    pub include_closed: bool,
    /// Only tasks carrying this tag.
    #[serde(default)]
    pub tag: Option<String>,
}

impl TaskFilter {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn by_ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            include_closed: true,
            tag: None,
        }
    }

    pub fn matches(&self, task: &TaskCandidate) -> bool {
        if !self.include_closed && task.status.is_closed() {
            return false;
        }
        if let Some(ref ids) = self.ids {
            if !ids.iter().any(|id| id == &task.id) {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !task.has_tag(tag) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn task_status_serializes_kebab_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
    }

    #[test]
    fn filter_hides_closed_tasks_by_default() {
        let mut done = TaskCandidate::new("a", "A", 10);
        done.status = TaskStatus::Completed;
        let open = TaskCandidate::new("b", "B", 10).with_tags(["Deep"]);

        let filter = TaskFilter::open();
        assert!(!filter.matches(&done));
        assert!(filter.matches(&open));

        let by_tag = TaskFilter {
            tag: Some("deep".into()),
            ..TaskFilter::default()
        };
        assert!(by_tag.matches(&open));

        let by_id = TaskFilter::by_ids(vec!["a".into()]);
        assert!(by_id.matches(&done));
        assert!(!by_id.matches(&open));
    }
}
