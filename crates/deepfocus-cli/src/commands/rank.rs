//! Task ranking command.

use chrono::Utc;
use clap::Args;
use deepfocus_core::ranker::RecentWork;
use deepfocus_core::storage::Database;
use deepfocus_core::{Config, RankingContext, SessionType, TaskFilter, TaskRanker};
use serde_json::json;

use super::{print_json, CliResult};

#[derive(Args)]
pub struct RankArgs {
    /// Session length in minutes (default: session.planned_minutes)
    #[arg(long)]
    pub minutes: Option<u32>,
    /// Current energy, 1-10 (default: session.energy_level)
    #[arg(long)]
    pub energy: Option<u8>,
    /// Session type: deep_work, regular, light, or creative
    #[arg(long = "type")]
    pub session_type: Option<SessionType>,
    /// Print only the budgeted selection
    #[arg(long)]
    pub select: bool,
}

/// Ranking context from flags, config defaults, and the last session's work.
pub fn ranking_context(
    db: &Database,
    config: &Config,
    minutes: Option<u32>,
    energy: Option<u8>,
    session_type: SessionType,
) -> Result<RankingContext, Box<dyn std::error::Error>> {
    let mut context = RankingContext::new(
        minutes.unwrap_or(config.session.planned_minutes),
        energy.unwrap_or(config.session.energy_level),
        session_type,
        Utc::now(),
    );

    let last_completed = db
        .session_history(1)?
        .into_iter()
        .next()
        .and_then(|summary| summary.end_stats)
        .map(|stats| stats.completed_task_ids)
        .unwrap_or_default();
    let recent_ids: Vec<String> = last_completed
        .into_iter()
        .rev()
        .take(config.ranker.recent_window)
        .collect();
    if !recent_ids.is_empty() {
        context.recent = db
            .list_tasks(&TaskFilter::by_ids(recent_ids))?
            .iter()
            .map(RecentWork::from)
            .collect();
    }
    Ok(context)
}

pub fn run(args: RankArgs) -> CliResult {
    let config = Config::load_or_default();
    let db = Database::open()?;
    let session_type = args.session_type.unwrap_or(config.session.default_type);
    let context = ranking_context(&db, &config, args.minutes, args.energy, session_type)?;

    let candidates = db.list_tasks(&TaskFilter::open())?;
    let ranker = TaskRanker::new(config.ranker.clone());
    let ranked = ranker.rank(&candidates, &context);
    let selection = ranker.select(&ranked, context.session_minutes);

    if args.select {
        return print_json(&json!({
            "selection": selection,
            "utilization": selection.utilization(),
        }));
    }
    print_json(&json!({
        "ranked": ranked,
        "selection": selection.task_ids(),
        "total_minutes": selection.total_minutes,
        "utilization": selection.utilization(),
    }))
}
