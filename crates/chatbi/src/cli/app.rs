use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use super::commands::{
    conversations::ConversationsArgs, generate_chart::GenerateChartArgs, replay::ReplayArgs,
    schema::SchemaArgs,
};
use crate::logging::DEFAULT_LOG_LEVEL;

#[derive(Debug, Parser)]
#[command(
    name = "chatbi",
    version,
    about = "Streaming text-to-SQL answer decoder and conversation store"
)]
pub struct Cli {
    #[command(flatten)]
    pub runtime: RuntimeArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    #[arg(long, global = true, value_name = "PATH")]
    pub home_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILTER", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    #[arg(long, global = true, value_name = "FRAMES")]
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a recorded frame stream into a new answer.
    Replay(ReplayArgs),
    /// Manage stored conversations.
    Conversations(ConversationsArgs),
    /// Generate and store the chart of an answer's query result.
    GenerateChart(GenerateChartArgs),
    /// Print the JSON Schema of a stored message.
    Schema(SchemaArgs),
}
