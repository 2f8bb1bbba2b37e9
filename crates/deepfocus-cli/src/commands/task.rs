//! Task management commands for CLI.

use chrono::Utc;
use clap::Subcommand;
use deepfocus_core::storage::{Database, NewTask};
use deepfocus_core::{Priority, TaskFilter, TaskStatus, TaskStore};

use super::{parse_time, print_json, split_list, CliResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a new task
    Add {
        /// Task title
        title: String,
        /// Estimated minutes
        #[arg(long, default_value = "25")]
        minutes: u32,
        /// Priority: low, medium, or high
        #[arg(long, default_value = "medium")]
        priority: Priority,
        /// Due date (RFC 3339)
        #[arg(long, value_parser = parse_time)]
        due: Option<chrono::DateTime<Utc>>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// Category
        #[arg(long)]
        category: Option<String>,
        /// Parent task ID
        #[arg(long)]
        parent: Option<String>,
        /// Task description
        #[arg(long, default_value = "")]
        description: String,
        /// Number of subtasks
        #[arg(long, default_value = "0")]
        subtasks: u32,
    },
    /// List tasks
    List {
        /// Include completed and archived tasks
        #[arg(long)]
        all: bool,
        /// Only tasks with this tag
        #[arg(long)]
        tag: Option<String>,
    },
    /// Change a task's status
    Status {
        /// Task ID
        id: String,
        /// pending, in-progress, completed, or archived
        status: TaskStatus,
    },
}

pub fn run(action: TaskAction) -> CliResult {
    let db = Database::open()?;

    match action {
        TaskAction::Add {
            title,
            minutes,
            priority,
            due,
            tags,
            category,
            parent,
            description,
            subtasks,
        } => {
            let input = NewTask {
                title,
                priority,
                estimated_minutes: minutes,
                due_date: due,
                tags: tags.as_deref().map(split_list).unwrap_or_default(),
                category,
                parent_id: parent,
                description,
                subtask_count: subtasks,
            };
            let task = db.add_task(&input, Utc::now())?;
            print_json(&task)
        }
        TaskAction::List { all, tag } => {
            let filter = TaskFilter {
                ids: None,
                include_closed: all,
                tag,
            };
            print_json(&db.list_tasks(&filter)?)
        }
        TaskAction::Status { id, status } => {
            db.set_status(&id, status)?;
            print_json(&db.get_task(&id)?)
        }
    }
}
