pub mod conversations;
pub mod generate_chart;
pub mod replay;
pub mod schema;

use anyhow::{Context, Result};

use crate::models::ResponseEnvelope;

pub(crate) fn print_envelope(envelope: &ResponseEnvelope) -> Result<()> {
    let encoded =
        serde_json::to_string_pretty(envelope).context("failed to encode response envelope")?;
    println!("{encoded}");
    Ok(())
}
