//! Literal markers of the upstream text2sql agent stream.
//!
//! Substring markers are matched against the lowercased frame, so they are
//! written in lowercase here. The upstream emits either the English or the
//! native Chinese form depending on its locale.

pub const THINKING_MARKERS: &[&str] = &[
    "processing query request",
    "invoking text2sql model",
    "executing sql query",
    "retrying rewritten sql",
    "正在处理查询请求",
    "正在调用text2sql模型",
    "正在执行sql查询",
    "正在重试改写后的sql",
];

pub const STREAM_END_SENTINEL: &str = "DONE";
pub const SESSION_END_SENTINEL: &str = "FLAG_DONE";

/// Prefix markers of the final SQL announcement, matched case-sensitively on
/// the raw frame.
pub const FINAL_SQL_MARKERS: &[&str] = &["Final SQL statement:", "最终SQL语句:", "最终SQL语句："];

/// Frames opening with this are parsed as result objects, never streamed.
pub const RESULT_OBJECT_PREFIX: char = '{';

pub const QUERY_SUCCESS_MARKERS: &[&str] = &["query succeeded", "sql查询成功"];
pub const QUERY_FAILURE_MARKERS: &[&str] = &["query failed", "查询失败", "异常"];

pub const FENCE_DELIMITER: &str = "```";
pub const SQL_LANGUAGE_TAG: &str = "sql";

pub const RESULT_STATUS_SUCCESS: &str = "success";
pub const RESULT_STATUS_ERROR: &str = "error";

#[must_use]
pub fn contains_any(lowered_frame: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| lowered_frame.contains(marker))
}
