use serde::Serialize;
use serde_json::Value;

pub const DISPLAY_ROW_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultShape {
    Tabular,
    Empty,
    NotTabular,
}

/// Shape of a result payload as the table view would see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResultSummary {
    pub shape: ResultShape,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub displayed_rows: usize,
    pub truncated: bool,
}

impl QueryResultSummary {
    /// Summarises a result payload. String payloads holding JSON are decoded
    /// first, since some upstreams double-encode the rows.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
                Ok(decoded @ (Value::Array(_) | Value::Object(_))) => Self::from_value(&decoded),
                _ => Self::other(ResultShape::NotTabular),
            },
            Value::Array(rows) if rows.is_empty() => Self::other(ResultShape::Empty),
            Value::Array(rows) => {
                let Some(first) = rows[0].as_object() else {
                    return Self::other(ResultShape::NotTabular);
                };
                let columns = first.keys().cloned().collect::<Vec<_>>();
                let displayed_rows = rows.len().min(DISPLAY_ROW_CAP);
                Self {
                    shape: ResultShape::Tabular,
                    columns,
                    row_count: rows.len(),
                    displayed_rows,
                    truncated: rows.len() > DISPLAY_ROW_CAP,
                }
            }
            Value::Null => Self::other(ResultShape::Empty),
            Value::Bool(_) | Value::Number(_) | Value::Object(_) => {
                Self::other(ResultShape::NotTabular)
            }
        }
    }

    fn other(shape: ResultShape) -> Self {
        Self {
            shape,
            columns: Vec::new(),
            row_count: 0,
            displayed_rows: 0,
            truncated: false,
        }
    }
}
