//! Chart descriptions generated from a stored query result.
//!
//! The model service receives `{"query_result": ...}` on
//! `POST {base}/generate-chart` and answers with the chart JSON, which is
//! stored on the message as `chart_data`.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ModelApiConfig;
use crate::sqlite::{get_message, update_chart_data};

pub const GENERATE_CHART_PATH: &str = "generate-chart";

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("no query result available for message {0}")]
    NoQueryResult(String),

    #[error("model API URL is not configured")]
    NotConfigured,

    #[error("model API error: {0}")]
    ModelApi(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ChartError {
    /// Envelope error code reported by the CLI.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MessageNotFound(_) => "message_not_found",
            Self::NoQueryResult(_) => "no_query_result",
            Self::NotConfigured => "model_api_unconfigured",
            Self::ModelApi(_) => "model_api_failed",
            Self::Store(_) => "store_unavailable",
        }
    }
}

impl From<reqwest::Error> for ChartError {
    fn from(error: reqwest::Error) -> Self {
        Self::ModelApi(error.to_string())
    }
}

pub type ChartResult<T> = Result<T, ChartError>;

/// Turns a query result into a chart description.
pub trait ChartGenerator {
    fn generate(&self, query_result: &Value) -> impl Future<Output = ChartResult<Value>> + Send;
}

#[derive(Debug, Serialize)]
struct GenerateChartRequest<'a> {
    query_result: &'a Value,
}

/// Model service client.
#[derive(Debug, Clone)]
pub struct HttpChartGenerator {
    client: Client,
    endpoint: String,
}

impl HttpChartGenerator {
    pub fn new(config: &ModelApiConfig) -> ChartResult<Self> {
        let base_url = config.base_url.as_deref().ok_or(ChartError::NotConfigured)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: chart_endpoint(base_url),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChartGenerator for HttpChartGenerator {
    async fn generate(&self, query_result: &Value) -> ChartResult<Value> {
        debug!(url = %self.endpoint, "requesting chart");
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&GenerateChartRequest { query_result })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %self.endpoint, %status, "model API rejected chart request");
            return Err(ChartError::ModelApi(format!("HTTP {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}

#[must_use]
pub fn chart_endpoint(base_url: &str) -> String {
    format!("{}/{GENERATE_CHART_PATH}", base_url.trim_end_matches('/'))
}

/// The stored query result of a message. A JSON `null` counts as missing.
pub fn load_query_result(connection: &Connection, message_id: &str) -> ChartResult<Value> {
    let message = get_message(connection, message_id)?
        .ok_or_else(|| ChartError::MessageNotFound(message_id.to_string()))?;
    match message.query_result {
        Some(Value::Null) | None => Err(ChartError::NoQueryResult(message_id.to_string())),
        Some(query_result) => Ok(query_result),
    }
}

pub fn store_chart(connection: &Connection, message_id: &str, chart_data: &Value) -> ChartResult<()> {
    if update_chart_data(connection, message_id, chart_data)? {
        Ok(())
    } else {
        Err(ChartError::MessageNotFound(message_id.to_string()))
    }
}

/// Generates and stores the chart of one message. Nothing is stored when
/// the generator fails.
pub async fn generate_chart<G: ChartGenerator>(
    connection: &Connection,
    generator: &G,
    message_id: &str,
) -> ChartResult<Value> {
    let query_result = load_query_result(connection, message_id)?;
    let chart_data = generator.generate(&query_result).await?;
    store_chart(connection, message_id, &chart_data)?;
    info!(message_id, "chart stored");
    Ok(chart_data)
}
