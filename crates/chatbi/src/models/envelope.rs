use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::utils::time::now_utc_millis;

pub const RESPONSE_ENVELOPE_SCHEMA_VERSION: &str = "chatbi.response-envelope.v1";

pub type ResponseEnvelopeMeta = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelopeWarning {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelopeError {
    pub code: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Single JSON document every CLI command prints on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub ok: bool,
    pub command: String,
    pub generated_at_utc: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    pub meta: ResponseEnvelopeMeta,
    pub warnings: Vec<ResponseEnvelopeWarning>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseEnvelopeError>,
}

/// Error carrying a fully formed failure envelope up to `main`, which prints it
/// and picks the exit code.
#[derive(Debug, Clone)]
pub struct CommandFailure {
    envelope: ResponseEnvelope,
    exit_code: i32,
}

impl CommandFailure {
    pub const RUNTIME_EXIT_CODE: i32 = 1;
    pub const ANSWER_ERROR_EXIT_CODE: i32 = 2;

    #[must_use]
    pub fn new(envelope: ResponseEnvelope) -> Self {
        Self {
            envelope,
            exit_code: Self::RUNTIME_EXIT_CODE,
        }
    }

    #[must_use]
    pub fn answer_error(envelope: ResponseEnvelope) -> Self {
        Self {
            envelope,
            exit_code: Self::ANSWER_ERROR_EXIT_CODE,
        }
    }

    #[must_use]
    pub fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl Display for CommandFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(&self.envelope) {
            Ok(encoded) => f.write_str(&encoded),
            Err(_) => f.write_str("response envelope serialization failure"),
        }
    }
}

impl std::error::Error for CommandFailure {}

impl ResponseEnvelope {
    #[must_use]
    pub fn ok(command: impl Into<String>, data: Value) -> Self {
        Self::base(command, true).with_data(data)
    }

    #[must_use]
    pub fn error(
        command: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut envelope = Self::base(command, false);
        envelope.error = Some(ResponseEnvelopeError {
            code: code.into(),
            message: message.into(),
            details: None,
        });
        envelope
    }

    fn base(command: impl Into<String>, ok: bool) -> Self {
        let mut meta = ResponseEnvelopeMeta::new();
        meta.insert(
            "schema_version".to_string(),
            json!(RESPONSE_ENVELOPE_SCHEMA_VERSION),
        );

        Self {
            ok,
            command: command.into(),
            generated_at_utc: now_utc_millis(),
            data: None,
            meta,
            warnings: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_warning(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.warnings.push(ResponseEnvelopeWarning {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    #[must_use]
    pub fn with_error_details(mut self, details: Value) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.details = Some(details);
        }
        self
    }

    /// Wraps an `anyhow` failure as an envelope whose details carry the cause chain.
    #[must_use]
    pub fn from_error(
        command: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        error: &anyhow::Error,
    ) -> Self {
        Self::error(command, code, message)
            .with_error_details(json!({ "cause": format!("{error:#}") }))
    }
}
