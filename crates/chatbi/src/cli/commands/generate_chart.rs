use anyhow::{Context, Error, Result};
use clap::Args;
use serde_json::json;

use super::conversations::open_store;
use super::print_envelope;
use crate::chart::{ChartError, ChartGenerator, HttpChartGenerator, load_query_result, store_chart};
use crate::config::{ModelApiConfig, RuntimePaths};
use crate::models::{CommandFailure, ResponseEnvelope};

const COMMAND: &str = "generate-chart";

#[derive(Debug, Clone, Args)]
pub struct GenerateChartArgs {
    /// Assistant message whose query result is charted.
    #[arg(value_name = "MESSAGE_ID")]
    pub id: String,

    /// Base URL of the model service; overrides `CHATBI_MODEL_API_URL`.
    #[arg(long, value_name = "URL")]
    pub model_api_url: Option<String>,

    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

pub fn run(args: &GenerateChartArgs, runtime_paths: &RuntimePaths) -> Result<()> {
    let model_api = ModelApiConfig::resolve(args.model_api_url.as_deref(), args.timeout_secs)?;
    let connection = open_store(runtime_paths).map_err(|error| {
        Error::new(CommandFailure::new(ResponseEnvelope::from_error(
            COMMAND,
            "store_unavailable",
            "failed to open conversation store",
            &error,
        )))
    })?;

    let query_result =
        load_query_result(&connection, &args.id).map_err(|error| chart_failure(&args.id, error))?;
    let generator =
        HttpChartGenerator::new(&model_api).map_err(|error| chart_failure(&args.id, error))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let chart_data = runtime
        .block_on(generator.generate(&query_result))
        .map_err(|error| chart_failure(&args.id, error))?;
    store_chart(&connection, &args.id, &chart_data)
        .map_err(|error| chart_failure(&args.id, error))?;

    let envelope = ResponseEnvelope::ok(
        COMMAND,
        json!({
            "message_id": args.id,
            "chart_data": chart_data,
        }),
    )
    .with_meta("model_api_endpoint", json!(generator.endpoint()));
    print_envelope(&envelope)
}

fn chart_failure(message_id: &str, error: ChartError) -> Error {
    let envelope = ResponseEnvelope::error(COMMAND, error.code(), error.to_string())
        .with_error_details(json!({ "id": message_id }));
    Error::new(CommandFailure::new(envelope))
}
