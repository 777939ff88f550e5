//! Durable side of the decoder: patches committed by the reducer are handed
//! to a [`PatchSink`], which must never block the frame loop.

use std::path::Path;
use std::sync::Mutex;
use std::thread;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::{StreamError, StreamResult};
use crate::models::MessagePatch;
use crate::sqlite::{apply_message_patch, ensure_sqlite_schema, open_sqlite_connection};

const WRITER_THREAD_NAME: &str = "chatbi-patch-writer";

/// Fire-and-forget receiver of committed message patches.
pub trait PatchSink: Send + Sync {
    fn apply_patch(&self, patch: MessagePatch);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    pub applied: usize,
    pub failed: usize,
}

enum WriterCommand {
    Apply(MessagePatch),
    Flush(oneshot::Sender<WriterStats>),
}

/// SQLite-backed sink. Patches go onto an unbounded queue drained by a
/// dedicated writer thread that owns its own connection.
pub struct SqlitePatchSink {
    sender: mpsc::UnboundedSender<WriterCommand>,
}

impl SqlitePatchSink {
    pub fn spawn(database_path: &Path) -> Result<Self> {
        let connection = open_sqlite_connection(database_path)?;
        ensure_sqlite_schema(&connection)?;
        Self::with_connection(connection)
    }

    pub fn with_connection(connection: Connection) -> Result<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || run_writer(connection, receiver))
            .context("failed to spawn patch writer thread")?;
        Ok(Self { sender })
    }

    /// Resolves once every patch enqueued before this call has been written
    /// (or has failed), returning the writer's running totals.
    pub async fn flush(&self) -> StreamResult<WriterStats> {
        let (reply, stats) = oneshot::channel();
        self.sender
            .send(WriterCommand::Flush(reply))
            .map_err(|_| StreamError::QueueClosed)?;
        stats.await.map_err(|_| StreamError::QueueClosed)
    }
}

impl PatchSink for SqlitePatchSink {
    fn apply_patch(&self, patch: MessagePatch) {
        let message_id = patch.message_id.clone();
        if self.sender.send(WriterCommand::Apply(patch)).is_err() {
            let failure = StreamError::Persistence("patch writer stopped".to_string());
            error!(%message_id, %failure, "patch dropped");
        }
    }
}

fn run_writer(connection: Connection, mut receiver: mpsc::UnboundedReceiver<WriterCommand>) {
    let mut stats = WriterStats::default();
    while let Some(command) = receiver.blocking_recv() {
        match command {
            WriterCommand::Apply(patch) => match apply_message_patch(&connection, &patch) {
                Ok(()) => {
                    stats.applied += 1;
                    debug!(message_id = %patch.message_id, "patch persisted");
                }
                Err(error) => {
                    stats.failed += 1;
                    let failure = StreamError::Persistence(format!("{error:#}"));
                    error!(message_id = %patch.message_id, %failure, "patch not persisted");
                }
            },
            WriterCommand::Flush(reply) => {
                let _ = reply.send(stats);
            }
        }
    }
    debug!(applied = stats.applied, failed = stats.failed, "patch writer stopped");
}

/// Records patches in memory. Used where no durable store is wanted.
#[derive(Debug, Default)]
pub struct MemoryPatchSink {
    patches: Mutex<Vec<MessagePatch>>,
}

impl MemoryPatchSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn patches(&self) -> Vec<MessagePatch> {
        match self.patches.lock() {
            Ok(patches) => patches.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PatchSink for MemoryPatchSink {
    fn apply_patch(&self, patch: MessagePatch) {
        match self.patches.lock() {
            Ok(mut patches) => patches.push(patch),
            Err(poisoned) => poisoned.into_inner().push(patch),
        }
    }
}
