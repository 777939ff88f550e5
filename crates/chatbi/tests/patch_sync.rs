use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chatbi::models::{MessagePatch, MessageStatus, PatchFields};
use chatbi::session::start_turn;
use chatbi::sqlite::{ensure_sqlite_schema, get_message, open_sqlite_connection};
use chatbi::sync::{MemoryPatchSink, PatchSink, SqlitePatchSink, WriterStats};
use rusqlite::Connection;

fn unique_temp_db(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after unix epoch")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("{prefix}-{nanos}"))
        .join("chatbi.sqlite")
}

fn open_store(path: &Path) -> Connection {
    let connection = open_sqlite_connection(path).expect("sqlite should open");
    ensure_sqlite_schema(&connection).expect("schema should be created");
    connection
}

#[tokio::test]
async fn sqlite_sink_applies_patches_in_enqueue_order() {
    let path = unique_temp_db("chatbi-sync-order");
    let connection = open_store(&path);
    let turn = start_turn(&connection, None, "top customers").expect("turn should start");
    let message_id = turn.assistant_message.id.clone();

    let sink = SqlitePatchSink::spawn(&path).expect("writer should start");
    sink.apply_patch(MessagePatch::new(
        &message_id,
        PatchFields::default().with_sql_query("SELECT name FROM customers"),
    ));
    sink.apply_patch(MessagePatch::new(
        &message_id,
        PatchFields::default()
            .with_status(MessageStatus::Completed)
            .with_content("Top customers by revenue"),
    ));
    sink.apply_patch(MessagePatch::new(
        &message_id,
        PatchFields::default().with_status(MessageStatus::Processing),
    ));

    let stats = sink.flush().await.expect("flush should complete");
    assert_eq!(
        stats,
        WriterStats {
            applied: 3,
            failed: 0
        }
    );

    let stored = get_message(&connection, &message_id)
        .expect("lookup should succeed")
        .expect("message should exist");
    assert_eq!(stored.status, Some(MessageStatus::Completed));
    assert_eq!(stored.content, "Top customers by revenue");
    assert_eq!(stored.sql_query.as_deref(), Some("SELECT name FROM customers"));
}

#[tokio::test]
async fn persistence_failures_are_counted_not_raised() {
    let path = unique_temp_db("chatbi-sync-failure");
    let sink = SqlitePatchSink::spawn(&path).expect("writer should start");

    sink.apply_patch(MessagePatch::new(
        "missing-message",
        PatchFields::default().with_content("lost"),
    ));

    let stats = sink.flush().await.expect("flush should complete");
    assert_eq!(stats.applied, 0);
    assert_eq!(stats.failed, 1);
}

#[test]
fn memory_sink_records_patches_in_order() {
    let sink = MemoryPatchSink::new();
    sink.apply_patch(MessagePatch::new(
        "a",
        PatchFields::default().with_status(MessageStatus::Processing),
    ));
    sink.apply_patch(MessagePatch::new(
        "a",
        PatchFields::default().with_status(MessageStatus::Completed),
    ));

    let statuses = sink
        .patches()
        .into_iter()
        .map(|patch| patch.fields.status)
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![Some(MessageStatus::Processing), Some(MessageStatus::Completed)]
    );
}
