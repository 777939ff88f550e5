//! Prose and SQL buffers of the in-flight answer.

use std::sync::OnceLock;

use regex::Regex;

use super::classifier::split_language_line;
use super::markers::{FENCE_DELIMITER, SQL_LANGUAGE_TAG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRoute {
    Prose,
    Sql,
    /// Lone `sql` tag right after an opening fence.
    SkippedLanguageTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceTransition {
    Opened,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlSource {
    /// Trailing fenced block found inside the prose.
    ProseFence,
    /// Fence-routed chunks or an announced final statement.
    Buffer,
    None,
}

/// Outcome of reconciling the buffers: cleaned prose and the resolved SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub prose: String,
    pub sql: Option<String>,
    pub sql_source: SqlSource,
}

/// Ephemeral per-turn buffers. The bound message id lives next to it in the
/// reducer; this value only knows text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAccumulator {
    prose: String,
    sql: String,
    inside_fence: bool,
}

impl SessionAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn inside_fence(&self) -> bool {
        self.inside_fence
    }

    #[must_use]
    pub fn prose_buffer(&self) -> &str {
        &self.prose
    }

    #[must_use]
    pub fn sql_buffer(&self) -> &str {
        &self.sql
    }

    pub fn push_chunk(&mut self, text: &str) -> ChunkRoute {
        if !self.inside_fence {
            self.prose.push_str(text);
            return ChunkRoute::Prose;
        }

        if self.sql.trim().is_empty() && text.trim().eq_ignore_ascii_case(SQL_LANGUAGE_TAG) {
            return ChunkRoute::SkippedLanguageTag;
        }

        self.sql.push_str(text);
        ChunkRoute::Sql
    }

    pub fn toggle_fence(&mut self) -> FenceTransition {
        self.inside_fence = !self.inside_fence;
        if self.inside_fence {
            self.sql.clear();
            FenceTransition::Opened
        } else {
            FenceTransition::Closed
        }
    }

    /// Routes text that arrived in the same frame as a fence delimiter.
    /// Further delimiters inside it toggle the fence in place, so a
    /// self-contained block opens and closes within one frame.
    pub fn push_fenced_text(&mut self, text: &str) {
        for (index, segment) in text.split(FENCE_DELIMITER).enumerate() {
            let mut segment = segment;
            if index > 0 && self.toggle_fence() == FenceTransition::Opened {
                segment = split_language_line(segment).1;
            }
            if !segment.is_empty() {
                self.push_chunk(segment);
            }
        }
    }

    /// The announced statement becomes the captured SQL.
    pub fn capture_announced_sql(&mut self, sql: &str) {
        self.sql.clear();
        self.sql.push_str(sql);
    }

    /// Resolves prose and SQL without touching the buffers.
    ///
    /// The last non-empty fenced block in the prose wins over the SQL buffer.
    /// It is cut out of the prose together with any empty blocks.
    #[must_use]
    pub fn reconcile(&self) -> Reconciled {
        let blocks: Vec<(std::ops::Range<usize>, &str)> = fenced_block_regex()
            .captures_iter(&self.prose)
            .filter_map(|block| {
                let whole = block.get(0)?.range();
                let inner = block.get(1).map_or("", |m| m.as_str()).trim();
                Some((whole, inner))
            })
            .collect();
        let chosen = blocks.iter().rposition(|(_, inner)| !inner.is_empty());

        let mut prose = String::with_capacity(self.prose.len());
        let mut cursor = 0;
        for (index, (range, inner)) in blocks.iter().enumerate() {
            if inner.is_empty() || Some(index) == chosen {
                prose.push_str(&self.prose[cursor..range.start]);
                cursor = range.end;
            }
        }
        prose.push_str(&self.prose[cursor..]);
        let prose = prose.trim().to_string();

        if let Some(index) = chosen {
            return Reconciled {
                prose,
                sql: Some(blocks[index].1.to_string()),
                sql_source: SqlSource::ProseFence,
            };
        }

        let sql = self.sql.trim();
        if sql.is_empty() {
            Reconciled {
                prose,
                sql: None,
                sql_source: SqlSource::None,
            }
        } else {
            Reconciled {
                prose,
                sql: Some(sql.to_string()),
                sql_source: SqlSource::Buffer,
            }
        }
    }

    /// Reconciles, then empties both buffers and leaves the fence.
    pub fn finalize(&mut self) -> Reconciled {
        let reconciled = self.reconcile();
        self.prose.clear();
        self.sql.clear();
        self.inside_fence = false;
        reconciled
    }
}

fn fenced_block_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"(?is)```(?:sql)?\s*(.*?)\s*```").expect("fenced block regex should compile")
    })
}
