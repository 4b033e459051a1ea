use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "finality-node")]
#[command(about = "Runs an in-process BP devnet on the BFT finality engine")]
pub struct Args {
    /// Config file; defaults are used when it does not exist
    #[arg(long, value_name = "FILE", default_value = "config.json")]
    pub config: PathBuf,

    /// Overrides the number of block producers
    #[arg(long)]
    pub bp_count: Option<usize>,

    /// Overrides the number of blocks to finalize
    #[arg(long)]
    pub rounds: Option<u64>,

    /// Writes the default config to --config and exits
    #[arg(long)]
    pub write_default_config: bool,
}

impl Args {
    pub fn apply(&self, config: &mut Config) {
        if let Some(bp_count) = self.bp_count {
            config.bp_count = bp_count;
        }
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
    }
}
