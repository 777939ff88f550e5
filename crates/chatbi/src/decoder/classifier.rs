//! Frame classification.
//!
//! Every inbound text frame maps to exactly one [`Frame`] variant. Predicates
//! are tried in a fixed order and the first match wins:
//!
//! 1. thinking notice (status substrings)
//! 2. stream-end sentinel `DONE`
//! 3. final SQL announcement
//! 4. structured JSON result
//! 5. session-end sentinel `FLAG_DONE`
//! 6. query success / failure notice
//! 7. fence toggle
//! 8. raw stream chunk (fallback)
//!
//! Classification never fails: a `{`-prefixed frame that is not a valid
//! result object becomes [`Frame::Unrecognized`].

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::markers::{
    FENCE_DELIMITER, FINAL_SQL_MARKERS, QUERY_FAILURE_MARKERS, QUERY_SUCCESS_MARKERS,
    RESULT_OBJECT_PREFIX, RESULT_STATUS_ERROR, RESULT_STATUS_SUCCESS, SESSION_END_SENTINEL,
    STREAM_END_SENTINEL, THINKING_MARKERS, contains_any,
};
use crate::error::StreamError;

const ERROR_PAYLOAD_FALLBACK: &str = "upstream reported an error without details";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    Known(u64),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultPayload {
    Success { result: Value, sql: Option<String> },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    ThinkingNotice { text: String },
    StreamEndMarker,
    FinalSqlAnnouncement { sql: String },
    StructuredResult(ResultPayload),
    SessionEndMarker,
    QuerySuccessNotice { row_count: RowCount },
    QueryFailureNotice { text: String },
    /// `body` is whatever followed the delimiter and its language line.
    FenceToggle {
        language: Option<String>,
        body: String,
    },
    StreamChunk { text: String },
    Unrecognized { raw: String, error: StreamError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    ThinkingNotice,
    StreamEndMarker,
    FinalSqlAnnouncement,
    StructuredResult,
    SessionEndMarker,
    QuerySuccessNotice,
    QueryFailureNotice,
    FenceToggle,
    StreamChunk,
    Unrecognized,
}

impl FrameKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ThinkingNotice => "thinking_notice",
            Self::StreamEndMarker => "stream_end_marker",
            Self::FinalSqlAnnouncement => "final_sql_announcement",
            Self::StructuredResult => "structured_result",
            Self::SessionEndMarker => "session_end_marker",
            Self::QuerySuccessNotice => "query_success_notice",
            Self::QueryFailureNotice => "query_failure_notice",
            Self::FenceToggle => "fence_toggle",
            Self::StreamChunk => "stream_chunk",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl Frame {
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::ThinkingNotice { .. } => FrameKind::ThinkingNotice,
            Self::StreamEndMarker => FrameKind::StreamEndMarker,
            Self::FinalSqlAnnouncement { .. } => FrameKind::FinalSqlAnnouncement,
            Self::StructuredResult(_) => FrameKind::StructuredResult,
            Self::SessionEndMarker => FrameKind::SessionEndMarker,
            Self::QuerySuccessNotice { .. } => FrameKind::QuerySuccessNotice,
            Self::QueryFailureNotice { .. } => FrameKind::QueryFailureNotice,
            Self::FenceToggle { .. } => FrameKind::FenceToggle,
            Self::StreamChunk { .. } => FrameKind::StreamChunk,
            Self::Unrecognized { .. } => FrameKind::Unrecognized,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultObject {
    status: String,

    #[serde(default)]
    result: Option<Value>,

    #[serde(default)]
    sql: Option<String>,

    #[serde(default)]
    error: Option<Value>,
}

#[must_use]
pub fn classify_frame(raw: &str) -> Frame {
    let trimmed = raw.trim();
    let lowered = raw.to_lowercase();

    if contains_any(&lowered, THINKING_MARKERS) {
        return Frame::ThinkingNotice {
            text: trimmed.to_string(),
        };
    }

    if trimmed == STREAM_END_SENTINEL {
        return Frame::StreamEndMarker;
    }

    if let Some(frame) = classify_final_sql(raw) {
        return frame;
    }

    if trimmed.starts_with(RESULT_OBJECT_PREFIX) {
        return classify_result_object(trimmed);
    }

    if trimmed == SESSION_END_SENTINEL {
        return Frame::SessionEndMarker;
    }

    if contains_any(&lowered, QUERY_SUCCESS_MARKERS) {
        return Frame::QuerySuccessNotice {
            row_count: extract_row_count(trimmed),
        };
    }

    if contains_any(&lowered, QUERY_FAILURE_MARKERS) {
        return Frame::QueryFailureNotice {
            text: trimmed.to_string(),
        };
    }

    if let Some(rest) = trimmed.strip_prefix(FENCE_DELIMITER) {
        let (language, body) = split_language_line(rest);
        return Frame::FenceToggle {
            language: language.map(str::to_string),
            body: body.to_string(),
        };
    }

    Frame::StreamChunk {
        text: raw.to_string(),
    }
}

/// Splits a bare language tag on its own line off text that follows an
/// opening fence.
pub(crate) fn split_language_line(rest: &str) -> (Option<&str>, &str) {
    match language_line_regex().captures(rest) {
        Some(captures) => {
            let consumed = captures.get(0).map_or(0, |m| m.end());
            (captures.get(1).map(|m| m.as_str()), &rest[consumed..])
        }
        None => (None, rest),
    }
}

fn language_line_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[ \t]*([A-Za-z][A-Za-z0-9_+-]*)[ \t]*(?:\r?\n|$)")
            .expect("language line regex should compile")
    })
}

fn classify_final_sql(raw: &str) -> Option<Frame> {
    let (marker, offset) = FINAL_SQL_MARKERS
        .iter()
        .find_map(|marker| raw.find(marker).map(|offset| (*marker, offset)))?;
    let announced = &raw[offset + marker.len()..];
    let sql = strip_fence_syntax(announced);
    if sql.is_empty() {
        return Some(Frame::Unrecognized {
            raw: raw.to_string(),
            error: StreamError::ProtocolParse("final SQL announcement carried no SQL".to_string()),
        });
    }

    Some(Frame::FinalSqlAnnouncement { sql })
}

fn classify_result_object(trimmed: &str) -> Frame {
    let object = match serde_json::from_str::<ResultObject>(trimmed) {
        Ok(object) => object,
        Err(error) => {
            return Frame::Unrecognized {
                raw: trimmed.to_string(),
                error: StreamError::ProtocolParse(format!("invalid result object ({error})")),
            };
        }
    };

    match object.status.as_str() {
        RESULT_STATUS_SUCCESS => Frame::StructuredResult(ResultPayload::Success {
            result: object.result.unwrap_or(Value::Null),
            sql: object
                .sql
                .map(|sql| sql.trim().to_string())
                .filter(|sql| !sql.is_empty()),
        }),
        RESULT_STATUS_ERROR => Frame::StructuredResult(ResultPayload::Error {
            error: render_error_value(object.error),
        }),
        other => Frame::Unrecognized {
            raw: trimmed.to_string(),
            error: StreamError::ProtocolParse(format!("unknown result status `{other}`")),
        },
    }
}

fn render_error_value(error: Option<Value>) -> String {
    match error {
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Some(Value::Null) | None => ERROR_PAYLOAD_FALLBACK.to_string(),
        Some(Value::String(_)) => ERROR_PAYLOAD_FALLBACK.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Removes fence delimiters (with an optional `sql` tag) and trims.
#[must_use]
pub fn strip_fence_syntax(text: &str) -> String {
    fence_syntax_regex().replace_all(text, "").trim().to_string()
}

#[must_use]
pub fn extract_row_count(text: &str) -> RowCount {
    row_count_regex()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|count| count.as_str().parse::<u64>().ok())
        .map_or(RowCount::Unknown, RowCount::Known)
}

fn fence_syntax_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)```(?:sql)?").expect("fence syntax regex should compile"))
}

fn row_count_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?i)(?:row\s*count|count|行数)\s*[:：=]\s*(\d+)")
            .expect("row count regex should compile")
    })
}
