//! Frame pipeline: transport events arrive on a bounded queue and are
//! consumed in order by a single [`SessionRunner`].

pub mod board;
pub mod turn;

use std::sync::Arc;

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::decoder::{Effect, SessionReducer};
use crate::error::StreamResult;
use crate::models::Message;
use crate::sync::PatchSink;

pub use board::MessageBoard;
pub use turn::{StartedTurn, start_turn};

/// What the transport hands the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Error(String),
    Closed,
}

pub type FrameSender = mpsc::Sender<TransportEvent>;
pub type FrameReceiver = mpsc::Receiver<TransportEvent>;

/// Bounded queue between transport and decoder. Senders wait when it is full.
#[must_use]
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    mpsc::channel(capacity.max(1))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub frames: usize,
    pub transport_errors: usize,
    pub previews: usize,
    pub commits: usize,
}

pub struct SessionRunner {
    reducer: SessionReducer,
    board: MessageBoard,
    sink: Arc<dyn PatchSink>,
    stats: RunStats,
}

impl SessionRunner {
    #[must_use]
    pub fn new(sink: Arc<dyn PatchSink>) -> Self {
        Self::with_board(sink, MessageBoard::new())
    }

    #[must_use]
    pub fn with_board(sink: Arc<dyn PatchSink>, board: MessageBoard) -> Self {
        Self {
            reducer: SessionReducer::new(),
            board,
            sink,
            stats: RunStats::default(),
        }
    }

    #[must_use]
    pub fn board(&self) -> &MessageBoard {
        &self.board
    }

    #[must_use]
    pub fn reducer(&self) -> &SessionReducer {
        &self.reducer
    }

    #[must_use]
    pub const fn stats(&self) -> RunStats {
        self.stats
    }

    /// Creates the turn rows and binds the placeholder. Refused while the
    /// previous answer is still streaming, before anything is written.
    pub fn start_turn(
        &mut self,
        connection: &Connection,
        conversation_id: Option<&str>,
        question: &str,
    ) -> Result<StartedTurn> {
        self.reducer.ensure_can_begin()?;
        let turn = start_turn(connection, conversation_id, question)?;
        self.bind_turn(&turn)?;
        Ok(turn)
    }

    pub fn bind_turn(&mut self, turn: &StartedTurn) -> StreamResult<()> {
        self.bind_placeholder(turn.user_message.clone(), turn.assistant_message.clone())
    }

    pub fn bind_placeholder(&mut self, question: Message, placeholder: Message) -> StreamResult<()> {
        self.reducer.begin_turn(placeholder.clone())?;
        self.board.upsert(question);
        self.board.upsert(placeholder);
        Ok(())
    }

    /// Consumes events until the transport closes the queue or sends
    /// [`TransportEvent::Closed`].
    pub async fn run(&mut self, mut receiver: FrameReceiver) -> RunStats {
        while let Some(event) = receiver.recv().await {
            let closed = event == TransportEvent::Closed;
            self.handle_event(event);
            if closed {
                return self.stats;
            }
        }

        self.handle_event(TransportEvent::Closed);
        self.stats
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        let effects = match event {
            TransportEvent::Frame(raw) => {
                self.stats.frames += 1;
                self.reducer.handle_frame(&raw)
            }
            TransportEvent::Error(error) => {
                self.stats.transport_errors += 1;
                self.reducer.transport_error(&error)
            }
            TransportEvent::Closed => self.reducer.transport_closed(),
        };
        self.dispatch(effects);
    }

    fn dispatch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            if !self.board.apply_effect(&effect) {
                debug!(message_id = %effect.patch().message_id, "patch for message not on board");
            }
            match effect {
                Effect::Preview(_) => self.stats.previews += 1,
                Effect::Commit(patch) => {
                    self.stats.commits += 1;
                    self.sink.apply_patch(patch);
                }
            }
        }
    }
}
