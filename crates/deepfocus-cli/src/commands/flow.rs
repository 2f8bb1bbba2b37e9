//! Flow scoring commands.

use std::path::PathBuf;

use clap::Subcommand;
use deepfocus_core::{BehaviorSample, Config, FlowDetector};

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum FlowAction {
    /// Score a behavior sample read from a JSON file ("-" for stdin)
    Score {
        /// Path to the sample JSON
        sample: PathBuf,
    },
}

pub fn run(action: FlowAction) -> CliResult {
    match action {
        FlowAction::Score { sample } => {
            let raw = if sample.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&sample)?
            };
            let sample: BehaviorSample = serde_json::from_str(&raw)?;
            let config = Config::load_or_default();
            let detector = FlowDetector::new(config.flow);
            print_json(&detector.evaluate(&sample))
        }
    }
}
