use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Error, Result, anyhow};
use clap::Args;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::conversations::open_store;
use super::print_envelope;
use crate::config::{DecoderConfig, RuntimePaths};
use crate::models::{
    CommandFailure, MessageStatus, QueryResultSummary, ResponseEnvelope,
};
use crate::session::{FrameSender, MessageBoard, SessionRunner, TransportEvent, frame_queue};
use crate::sqlite::{get_message, list_messages};
use crate::sync::SqlitePatchSink;

const COMMAND: &str = "replay";
const STDIN_MARKER: &str = "-";

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// Recorded frames, one per line; `-` reads stdin.
    #[arg(value_name = "FRAMES")]
    pub frames: PathBuf,

    #[arg(long, value_name = "TEXT")]
    pub question: String,

    /// Append to an existing conversation instead of creating one.
    #[arg(long, value_name = "ID")]
    pub conversation: Option<String>,

    /// Each line is a JSON string holding one frame, whitespace preserved.
    #[arg(long, default_value_t = false)]
    pub jsonl: bool,

    /// Deliver a transport error after the last frame.
    #[arg(long, value_name = "MESSAGE")]
    pub transport_error: Option<String>,
}

pub fn run(
    args: &ReplayArgs,
    runtime_paths: &RuntimePaths,
    decoder_config: DecoderConfig,
) -> Result<()> {
    let frames = load_frames(&args.frames, args.jsonl).map_err(|error| {
        Error::new(CommandFailure::new(
            ResponseEnvelope::from_error(
                COMMAND,
                "frames_unreadable",
                "failed to read recorded frames",
                &error,
            )
            .with_meta("frames_path", json!(args.frames.display().to_string())),
        ))
    })?;

    let connection = open_store(runtime_paths).map_err(|error| {
        Error::new(CommandFailure::new(ResponseEnvelope::from_error(
            COMMAND,
            "store_unavailable",
            "failed to open conversation store",
            &error,
        )))
    })?;

    let sink = Arc::new(SqlitePatchSink::spawn(&runtime_paths.database_path)?);
    let board = match args.conversation.as_deref() {
        Some(conversation_id) => {
            let history = list_messages(&connection, conversation_id).map_err(|error| {
                Error::new(CommandFailure::new(ResponseEnvelope::from_error(
                    COMMAND,
                    "store_unavailable",
                    "failed to load conversation history",
                    &error,
                )))
            })?;
            MessageBoard::from_messages(history)
        }
        None => MessageBoard::new(),
    };
    let history_messages = board.messages().len();
    let mut runner = SessionRunner::with_board(sink.clone(), board);
    let turn = runner
        .start_turn(&connection, args.conversation.as_deref(), &args.question)
        .map_err(|error| {
            Error::new(CommandFailure::new(ResponseEnvelope::from_error(
                COMMAND,
                "turn_rejected",
                "failed to start turn",
                &error,
            )))
        })?;
    info!(
        frames = frames.len(),
        queue_capacity = decoder_config.queue_capacity,
        "replaying recorded frames"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let transport_error = args.transport_error.clone();
    let (stats, writer) = runtime.block_on(async {
        let (sender, receiver) = frame_queue(decoder_config.queue_capacity);
        let producer = tokio::spawn(feed_frames(sender, frames, transport_error));
        let stats = runner.run(receiver).await;
        if let Err(error) = producer.await {
            warn!(%error, "frame producer ended abnormally");
        }
        (stats, sink.flush().await)
    });
    let writer = writer.context("patch writer stopped before flush")?;

    let answer = get_message(&connection, &turn.assistant_message.id)?
        .ok_or_else(|| anyhow!("answer message vanished: {}", turn.assistant_message.id))?;
    let result_summary = answer
        .query_result
        .as_ref()
        .map(QueryResultSummary::from_value);
    let data = json!({
        "conversation_id": turn.conversation_id,
        "title": turn.title,
        "created_conversation": turn.created_conversation,
        "history_messages": history_messages,
        "question": turn.user_message,
        "answer": answer,
        "result_summary": result_summary,
        "frames": stats,
        "writer": writer,
    });

    if answer.status == Some(MessageStatus::Error) {
        let message = answer
            .error_message
            .clone()
            .unwrap_or_else(|| "answer ended in error".to_string());
        return Err(Error::new(CommandFailure::answer_error(
            ResponseEnvelope::error(COMMAND, "answer_failed", message).with_error_details(data),
        )));
    }

    let mut envelope = ResponseEnvelope::ok(COMMAND, data).with_meta(
        "database_path",
        json!(runtime_paths.database_path.display().to_string()),
    );
    if writer.failed > 0 {
        envelope = envelope.with_warning(
            "persistence_failed",
            format!("{} patch(es) could not be persisted", writer.failed),
        );
    }
    if runner.board().get(&answer.id) != Some(&answer) {
        envelope = envelope.with_warning(
            "durable_state_diverged",
            "stored answer differs from the in-memory answer",
        );
    }

    print_envelope(&envelope)
}

async fn feed_frames(sender: FrameSender, frames: Vec<String>, transport_error: Option<String>) {
    for frame in frames {
        if sender.send(TransportEvent::Frame(frame)).await.is_err() {
            return;
        }
    }
    if let Some(error) = transport_error {
        if sender.send(TransportEvent::Error(error)).await.is_err() {
            return;
        }
    }
    let _ = sender.send(TransportEvent::Closed).await;
}

/// Plain mode takes every non-empty line verbatim. JSONL mode decodes one
/// JSON string per non-empty line.
pub fn load_frames(path: &Path, jsonl: bool) -> Result<Vec<String>> {
    let input = if path == Path::new(STDIN_MARKER) {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read frames from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read frames file: {}", path.display()))?
    };

    parse_frames(&input, jsonl)
}

pub fn parse_frames(input: &str, jsonl: bool) -> Result<Vec<String>> {
    let mut frames = Vec::new();
    for (index, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if !jsonl {
            frames.push(line.to_string());
            continue;
        }

        let frame = match serde_json::from_str::<Value>(line)
            .with_context(|| format!("invalid JSON on line {}", index + 1))?
        {
            Value::String(frame) => frame,
            other => {
                return Err(anyhow!(
                    "line {} must be a JSON string, found {}",
                    index + 1,
                    json_type_name(&other)
                ));
            }
        };
        frames.push(frame);
    }
    Ok(frames)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
