use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::print_envelope;
use crate::models::{ResponseEnvelope, json_schema};

#[derive(Debug, Clone, Args)]
pub struct SchemaArgs {
    /// Print the bare schema instead of an envelope.
    #[arg(long, default_value_t = false)]
    pub raw: bool,
}

pub fn run(args: &SchemaArgs) -> Result<()> {
    let schema = json_schema();
    if args.raw {
        let encoded = serde_json::to_string_pretty(&schema)?;
        println!("{encoded}");
        return Ok(());
    }

    print_envelope(&ResponseEnvelope::ok("schema", json!({ "message": schema })))
}
