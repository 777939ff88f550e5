//! Per-message state machine driven by classified frames.
//!
//! The reducer owns the bound assistant message (its last committed state)
//! and the [`SessionAccumulator`]. Each input returns the effects the caller
//! must apply: [`Effect::Preview`] only touches in-memory UI state while
//! [`Effect::Commit`] also goes to durable storage.

use tracing::{debug, info, warn};

use super::assembler::{ChunkRoute, SessionAccumulator};
use super::classifier::{Frame, ResultPayload, RowCount, classify_frame};
use crate::error::{StreamError, StreamResult};
use crate::models::{Message, MessagePatch, MessageStatus, PatchFields};

pub const QUERY_FAILED_TEXT: &str = "Query failed.";
pub const TRANSPORT_FAILURE_TEXT: &str =
    "An error occurred while connecting or processing the request.";
pub const CONNECTION_CLOSED_ERROR: &str = "connection closed";

#[must_use]
pub fn query_succeeded_text(row_count: RowCount) -> String {
    match row_count {
        RowCount::Known(1) => "Query succeeded, returned 1 row.".to_string(),
        RowCount::Known(rows) => format!("Query succeeded, returned {rows} rows."),
        RowCount::Unknown => "Query succeeded.".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Preview(MessagePatch),
    Commit(MessagePatch),
}

impl Effect {
    #[must_use]
    pub fn patch(&self) -> &MessagePatch {
        match self {
            Self::Preview(patch) | Self::Commit(patch) => patch,
        }
    }

    #[must_use]
    pub const fn is_commit(&self) -> bool {
        matches!(self, Self::Commit(_))
    }
}

#[derive(Debug, Clone)]
struct ActiveTurn {
    message: Message,
    accumulator: SessionAccumulator,
}

impl ActiveTurn {
    fn status(&self) -> Option<MessageStatus> {
        self.message.status
    }

    fn is_terminal(&self) -> bool {
        self.message.is_terminal()
    }

    /// Once terminal, only fields the message does not hold yet survive;
    /// status and error detail are final.
    fn non_conflicting(&self, mut fields: PatchFields) -> PatchFields {
        if !self.is_terminal() {
            return fields;
        }
        fields.status = None;
        fields.error_message = None;
        if !self.message.content.trim().is_empty() {
            fields.content = None;
        }
        if self.message.sql_query.is_some() {
            fields.sql_query = None;
        }
        if self.message.query_result.is_some() {
            fields.query_result = None;
        }
        fields
    }

    fn commit(&mut self, fields: PatchFields) -> Option<Effect> {
        let fields = self.non_conflicting(fields);
        if fields.is_empty() {
            return None;
        }
        self.message.apply_fields(&fields);
        Some(Effect::Commit(MessagePatch::new(
            self.message.id.clone(),
            fields,
        )))
    }

    fn preview(&self, fields: PatchFields) -> Effect {
        Effect::Preview(MessagePatch::new(self.message.id.clone(), fields))
    }

    /// Running prose and SQL, trimmed. `None` when both are empty.
    fn buffer_preview(&self) -> Option<Effect> {
        let mut fields = PatchFields::default();
        let prose = self.accumulator.prose_buffer().trim();
        if !prose.is_empty() {
            fields = fields.with_content(prose);
        }
        let sql = self.accumulator.sql_buffer().trim();
        if !sql.is_empty() {
            fields = fields.with_sql_query(sql);
        }
        (!fields.is_empty()).then(|| self.preview(fields))
    }
}

/// Session reducer. `Idle` when no message is bound.
#[derive(Debug, Clone, Default)]
pub struct SessionReducer {
    active: Option<ActiveTurn>,
}

impl SessionReducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    #[must_use]
    pub fn active_message_id(&self) -> Option<&str> {
        self.active.as_ref().map(|turn| turn.message.id.as_str())
    }

    /// Last committed state of the bound message.
    #[must_use]
    pub fn active_message(&self) -> Option<&Message> {
        self.active.as_ref().map(|turn| &turn.message)
    }

    #[must_use]
    pub fn accumulator(&self) -> Option<&SessionAccumulator> {
        self.active.as_ref().map(|turn| &turn.accumulator)
    }

    /// Fails while the bound message is still streaming.
    pub fn ensure_can_begin(&self) -> StreamResult<()> {
        match &self.active {
            Some(turn) if !turn.is_terminal() => {
                Err(StreamError::TurnInProgress(turn.message.id.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Binds the placeholder assistant message with a fresh accumulator.
    pub fn begin_turn(&mut self, placeholder: Message) -> StreamResult<()> {
        self.ensure_can_begin()?;
        if let Some(previous) = self.active.take() {
            debug!(message_id = %previous.message.id, "releasing finished message");
        }

        info!(message_id = %placeholder.id, "turn bound");
        self.active = Some(ActiveTurn {
            message: placeholder,
            accumulator: SessionAccumulator::new(),
        });
        Ok(())
    }

    pub fn handle_frame(&mut self, raw: &str) -> Vec<Effect> {
        let frame = classify_frame(raw);
        self.apply(frame)
    }

    pub fn apply(&mut self, frame: Frame) -> Vec<Effect> {
        let frame_kind = frame.kind().as_str();
        let Some(turn) = self.active.as_mut() else {
            warn!(frame_kind, "no active message; frame discarded");
            return Vec::new();
        };
        debug!(message_id = %turn.message.id, frame_kind, "frame classified");

        let mut effects = Vec::new();
        match frame {
            Frame::ThinkingNotice { .. } => {
                if turn.is_terminal() {
                    debug!(message_id = %turn.message.id, "thinking notice after terminal status ignored");
                } else {
                    effects.extend(
                        turn.commit(PatchFields::default().with_status(MessageStatus::Processing)),
                    );
                }
            }
            Frame::FinalSqlAnnouncement { sql } => {
                if !turn.is_terminal() {
                    turn.accumulator.capture_announced_sql(&sql);
                }
                effects.extend(turn.commit(PatchFields::default().with_sql_query(sql)));
            }
            Frame::StructuredResult(ResultPayload::Success { result, sql }) => {
                if turn.status() == Some(MessageStatus::Error) {
                    warn!(message_id = %turn.message.id, "success payload after error ignored");
                    return effects;
                }
                let streamed_prose = !turn.accumulator.prose_buffer().trim().is_empty();
                let reconciled = turn.accumulator.reconcile();
                let mut fields = PatchFields::default()
                    .with_query_result(result)
                    .with_status(MessageStatus::Completed);
                if let Some(sql) = sql
                    .or(reconciled.sql)
                    .or_else(|| turn.message.sql_query.clone())
                {
                    fields = fields.with_sql_query(sql);
                }
                if streamed_prose {
                    fields = fields.with_content(reconciled.prose);
                }
                effects.extend(turn.commit(fields));
            }
            Frame::StructuredResult(ResultPayload::Error { error }) => {
                if turn.is_terminal() {
                    warn!(message_id = %turn.message.id, %error, "error payload after terminal status ignored");
                } else {
                    let streamed_prose = !turn.accumulator.prose_buffer().trim().is_empty();
                    let reconciled = turn.accumulator.reconcile();
                    let failure = StreamError::UpstreamFailure(error.clone());
                    info!(message_id = %turn.message.id, %failure, "answer failed");
                    let mut fields = PatchFields::default()
                        .with_status(MessageStatus::Error)
                        .with_error_message(error);
                    if streamed_prose {
                        fields = fields.with_content(reconciled.prose);
                    }
                    effects.extend(turn.commit(fields));
                }
            }
            Frame::QuerySuccessNotice { row_count } => {
                effects.extend(
                    turn.commit(
                        PatchFields::default()
                            .with_status(MessageStatus::Completed)
                            .with_content(query_succeeded_text(row_count)),
                    ),
                );
            }
            Frame::QueryFailureNotice { text } => {
                if turn.is_terminal() {
                    warn!(message_id = %turn.message.id, notice = %text, "failure notice after terminal status ignored");
                } else {
                    let failure = StreamError::UpstreamFailure(text.clone());
                    info!(message_id = %turn.message.id, %failure, "answer failed");
                    effects.extend(
                        turn.commit(
                            PatchFields::default()
                                .with_status(MessageStatus::Error)
                                .with_error_message(text)
                                .with_content(QUERY_FAILED_TEXT),
                        ),
                    );
                }
            }
            Frame::StreamEndMarker => {
                // Previewed prose is always replaced, even by an empty cleanup.
                let streamed_prose = !turn.accumulator.prose_buffer().trim().is_empty();
                let finalized = turn.accumulator.finalize();
                let mut fields = PatchFields::default().with_status(MessageStatus::Completed);
                if streamed_prose {
                    fields = fields.with_content(finalized.prose);
                }
                if let Some(sql) = finalized.sql {
                    fields = fields.with_sql_query(sql);
                }
                info!(
                    message_id = %turn.message.id,
                    sql_source = ?finalized.sql_source,
                    "stream finalized"
                );
                effects.extend(turn.commit(fields));
            }
            Frame::SessionEndMarker => {
                if turn.status() == Some(MessageStatus::Processing) {
                    effects.extend(
                        turn.commit(PatchFields::default().with_status(MessageStatus::Completed)),
                    );
                }
                info!(message_id = %turn.message.id, "session ended");
                self.active = None;
            }
            Frame::FenceToggle { language, body } => {
                let transition = turn.accumulator.toggle_fence();
                debug!(message_id = %turn.message.id, ?transition, language = ?language, "fence toggled");
                if body.is_empty() {
                    return effects;
                }
                turn.accumulator.push_fenced_text(&body);
                if !turn.is_terminal() {
                    effects.extend(turn.buffer_preview());
                }
            }
            Frame::StreamChunk { text } => {
                let route = turn.accumulator.push_chunk(&text);
                if turn.is_terminal() {
                    return effects;
                }
                let preview = match route {
                    ChunkRoute::Prose => turn.accumulator.prose_buffer().trim(),
                    ChunkRoute::Sql => turn.accumulator.sql_buffer().trim(),
                    ChunkRoute::SkippedLanguageTag => "",
                };
                if preview.is_empty() {
                    return effects;
                }
                let fields = match route {
                    ChunkRoute::Sql => PatchFields::default().with_sql_query(preview),
                    _ => PatchFields::default().with_content(preview),
                };
                effects.push(turn.preview(fields));
            }
            Frame::Unrecognized { raw, error } => {
                warn!(message_id = %turn.message.id, %error, frame = %raw, "frame dropped");
            }
        }

        effects
    }

    /// Marks a streaming message failed. Either way the message is unbound
    /// and its buffers are dropped; a finished answer keeps its state.
    pub fn transport_error(&mut self, error: &str) -> Vec<Effect> {
        let Some(mut turn) = self.active.take() else {
            warn!(%error, "transport error with no active message");
            return Vec::new();
        };

        let failure = StreamError::Transport(error.to_string());
        if turn.is_terminal() {
            warn!(message_id = %turn.message.id, %failure, "transport error after terminal status; message released");
            return Vec::new();
        }

        warn!(message_id = %turn.message.id, %failure, "answer aborted");
        turn.commit(
            PatchFields::default()
                .with_status(MessageStatus::Error)
                .with_error_message(error)
                .with_content(TRANSPORT_FAILURE_TEXT),
        )
        .into_iter()
        .collect()
    }

    /// Queue closed by the transport. A still-streaming message fails with
    /// `connection closed`; a finished one is simply released.
    pub fn transport_closed(&mut self) -> Vec<Effect> {
        let Some(turn) = &self.active else {
            return Vec::new();
        };
        if !turn.is_terminal() {
            return self.transport_error(CONNECTION_CLOSED_ERROR);
        }

        debug!(message_id = %turn.message.id, "transport closed after terminal status");
        self.active = None;
        Vec::new()
    }
}
