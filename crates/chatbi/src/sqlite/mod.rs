use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    Conversation, ConversationSummary, DEFAULT_CONVERSATION_TITLE, Message, MessagePatch,
    MessageRole, MessageStatus,
};
use crate::utils::time::now_utc_millis;

pub const SQLITE_SCHEMA_VERSION: &str = "chatbi.v1.sqlite.v2";
pub const CONVERSATIONS_TABLE: &str = "conversations";
pub const MESSAGES_TABLE: &str = "messages";
pub const SCHEMA_META_TABLE: &str = "chatbi_schema_meta";
pub const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_CONVERSATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT NOT NULL PRIMARY KEY,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const CREATE_MESSAGES_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT NOT NULL PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations (id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    sql_query TEXT,
    query_result TEXT,
    status TEXT,
    error_message TEXT,
    chart_data TEXT,
    created_at TEXT NOT NULL,
    CHECK (role IN ('user', 'assistant')),
    CHECK (status IN ('processing', 'completed', 'error') OR status IS NULL)
);
"#;

const CREATE_INDEX_CONVERSATIONS_UPDATED_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_conversations_updated_at
ON conversations (updated_at);
"#;

const CREATE_INDEX_MESSAGES_CONVERSATION_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_conversation_created
ON messages (conversation_id, created_at);
"#;

const CREATE_META_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chatbi_schema_meta (
    schema_version TEXT NOT NULL,
    applied_at_utc TEXT NOT NULL
);
"#;

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, sql_query, query_result, status, \
     error_message, created_at, chart_data";

/// Columns added after the first schema version, with their declarations.
const ADDED_MESSAGE_COLUMNS: &[(&str, &str)] = &[("chart_data", "TEXT")];

/// A stored terminal status is final.
const STATUS_GUARD_SQL: &str =
    "CASE WHEN status IN ('completed', 'error') THEN status ELSE ?{n} END";

#[must_use]
pub fn schema_statements() -> &'static [&'static str] {
    &[
        CREATE_CONVERSATIONS_TABLE_SQL,
        CREATE_MESSAGES_TABLE_SQL,
        CREATE_INDEX_CONVERSATIONS_UPDATED_SQL,
        CREATE_INDEX_MESSAGES_CONVERSATION_SQL,
        CREATE_META_TABLE_SQL,
    ]
}

#[must_use]
pub fn create_schema_sql() -> String {
    schema_statements().join("\n")
}

/// Input for [`create_message`]; id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage<'a> {
    pub conversation_id: &'a str,
    pub role: MessageRole,
    pub content: &'a str,
    pub status: Option<MessageStatus>,
}

pub fn open_sqlite_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create sqlite parent directory: {}",
                parent.display()
            )
        })?;
    }

    let connection = Connection::open(path)
        .with_context(|| format!("failed to open sqlite database: {}", path.display()))?;
    connection
        .busy_timeout(SQLITE_BUSY_TIMEOUT)
        .context("failed to configure sqlite busy timeout")?;
    Ok(connection)
}

pub fn ensure_sqlite_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .context("failed to enable sqlite foreign keys")?;
    connection
        .execute_batch(&create_schema_sql())
        .context("failed to create sqlite schema")?;
    add_missing_message_columns(connection)?;

    if schema_meta_has_version(connection, SQLITE_SCHEMA_VERSION)? {
        return Ok(());
    }

    connection
        .execute(
            &format!(
                "INSERT INTO {SCHEMA_META_TABLE} (schema_version, applied_at_utc) VALUES (?1, ?2)"
            ),
            params![SQLITE_SCHEMA_VERSION, now_utc_millis()],
        )
        .context("failed to write sqlite schema meta row")?;

    Ok(())
}

fn add_missing_message_columns(connection: &Connection) -> Result<()> {
    let existing = {
        let mut statement = connection
            .prepare(&format!("PRAGMA table_info({MESSAGES_TABLE})"))
            .context("failed to inspect messages table")?;
        let names = statement
            .query_map([], |row| row.get::<usize, String>(1))
            .context("failed to list messages columns")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to decode messages column name")?;
        names
    };

    for (column, declaration) in ADDED_MESSAGE_COLUMNS {
        if existing.iter().any(|name| name == column) {
            continue;
        }
        connection
            .execute_batch(&format!(
                "ALTER TABLE {MESSAGES_TABLE} ADD COLUMN {column} {declaration};"
            ))
            .with_context(|| format!("failed to add messages column {column}"))?;
    }
    Ok(())
}

fn schema_meta_has_version(connection: &Connection, schema_version: &str) -> Result<bool> {
    let query = format!(
        "SELECT EXISTS(SELECT 1 FROM {SCHEMA_META_TABLE} WHERE schema_version = ?1 LIMIT 1)"
    );
    let exists = connection
        .query_row(&query, [schema_version], |row| row.get::<usize, i64>(0))
        .context("failed to query sqlite schema version metadata")?;
    Ok(exists != 0)
}

pub fn create_conversation(connection: &Connection, title: Option<&str>) -> Result<Conversation> {
    let id = Uuid::new_v4().to_string();
    let title = title
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_CONVERSATION_TITLE);
    let now = now_utc_millis();

    connection
        .execute(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![id, title, now],
        )
        .context("failed to insert conversation")?;

    Ok(Conversation {
        id,
        title: title.to_string(),
        created_at: now.clone(),
        updated_at: now,
        messages: Vec::new(),
    })
}

/// Most recently updated first, each with its latest message.
pub fn list_conversations(connection: &Connection) -> Result<Vec<ConversationSummary>> {
    let mut statement = connection
        .prepare(
            "SELECT id, title, created_at, updated_at FROM conversations \
             ORDER BY updated_at DESC, rowid DESC",
        )
        .context("failed to prepare conversation list query")?;
    let rows = statement
        .query_map([], |row| {
            Ok(ConversationSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
                latest_message: None,
            })
        })
        .context("failed to list conversations")?;

    let mut summaries = Vec::new();
    for row in rows {
        let mut summary = row.context("failed to decode conversation row")?;
        summary.latest_message = latest_message(connection, &summary.id)?;
        summaries.push(summary);
    }
    Ok(summaries)
}

fn latest_message(connection: &Connection, conversation_id: &str) -> Result<Option<Message>> {
    let query = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 \
         ORDER BY created_at DESC, rowid DESC LIMIT 1"
    );
    let mut statement = connection
        .prepare_cached(&query)
        .context("failed to prepare latest message query")?;
    statement
        .query_row([conversation_id], message_from_row)
        .optional()
        .with_context(|| format!("failed to load latest message of conversation {conversation_id}"))
}

pub fn get_conversation(connection: &Connection, id: &str) -> Result<Option<Conversation>> {
    let conversation = connection
        .query_row(
            "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
            [id],
            |row| {
                Ok(Conversation {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                    messages: Vec::new(),
                })
            },
        )
        .optional()
        .with_context(|| format!("failed to load conversation {id}"))?;

    let Some(mut conversation) = conversation else {
        return Ok(None);
    };
    conversation.messages = list_messages(connection, id)?;
    Ok(Some(conversation))
}

/// Messages of a conversation in creation order.
pub fn list_messages(connection: &Connection, conversation_id: &str) -> Result<Vec<Message>> {
    let query = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ?1 \
         ORDER BY created_at ASC, rowid ASC"
    );
    let mut statement = connection
        .prepare_cached(&query)
        .context("failed to prepare message list query")?;
    let rows = statement
        .query_map([conversation_id], message_from_row)
        .with_context(|| format!("failed to list messages of conversation {conversation_id}"))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to decode message row")
}

pub fn count_messages(connection: &Connection, conversation_id: &str) -> Result<usize> {
    let count = connection
        .query_row(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get::<usize, i64>(0),
        )
        .with_context(|| format!("failed to count messages of conversation {conversation_id}"))?;
    usize::try_from(count).map_err(|_| anyhow!("message count out of range: {count}"))
}

/// Returns `false` when no conversation has this id.
pub fn update_conversation_title(connection: &Connection, id: &str, title: &str) -> Result<bool> {
    let updated = connection
        .execute(
            "UPDATE conversations SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, title, now_utc_millis()],
        )
        .with_context(|| format!("failed to update title of conversation {id}"))?;
    Ok(updated > 0)
}

/// Deletes the conversation and, through the foreign key, its messages.
pub fn delete_conversation(connection: &Connection, id: &str) -> Result<bool> {
    let deleted = connection
        .execute("DELETE FROM conversations WHERE id = ?1", [id])
        .with_context(|| format!("failed to delete conversation {id}"))?;
    Ok(deleted > 0)
}

pub fn create_message(connection: &Connection, new_message: &NewMessage<'_>) -> Result<Message> {
    let id = Uuid::new_v4().to_string();
    let now = now_utc_millis();

    connection
        .execute(
            "INSERT INTO messages (id, conversation_id, role, content, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                new_message.conversation_id,
                new_message.role.as_str(),
                new_message.content,
                new_message.status.map(MessageStatus::as_str),
                now,
            ],
        )
        .with_context(|| {
            format!(
                "failed to insert message into conversation {}",
                new_message.conversation_id
            )
        })?;
    connection
        .execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![new_message.conversation_id, now],
        )
        .context("failed to touch conversation updated_at")?;

    Ok(Message {
        id,
        conversation_id: new_message.conversation_id.to_string(),
        role: new_message.role,
        content: new_message.content.to_string(),
        sql_query: None,
        query_result: None,
        status: new_message.status,
        error_message: None,
        chart_data: None,
        created_at: now,
    })
}

pub fn get_message(connection: &Connection, id: &str) -> Result<Option<Message>> {
    let query = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    connection
        .query_row(&query, [id], message_from_row)
        .optional()
        .with_context(|| format!("failed to load message {id}"))
}

/// Merges the provided fields into the stored message. Absent fields are not
/// touched and a terminal status is never downgraded to `processing`.
pub fn apply_message_patch(connection: &Connection, patch: &MessagePatch) -> Result<()> {
    let fields = &patch.fields;
    let mut assignments = Vec::new();
    let mut values = vec![SqlValue::Text(patch.message_id.clone())];

    if let Some(content) = &fields.content {
        values.push(SqlValue::Text(content.clone()));
        assignments.push(format!("content = ?{}", values.len()));
    }
    if let Some(sql_query) = &fields.sql_query {
        values.push(SqlValue::Text(sql_query.clone()));
        assignments.push(format!("sql_query = ?{}", values.len()));
    }
    if let Some(query_result) = &fields.query_result {
        let encoded =
            serde_json::to_string(query_result).context("failed to encode query result")?;
        values.push(SqlValue::Text(encoded));
        assignments.push(format!("query_result = ?{}", values.len()));
    }
    if let Some(status) = fields.status {
        values.push(SqlValue::Text(status.as_str().to_string()));
        let guard = STATUS_GUARD_SQL.replace("{n}", &values.len().to_string());
        assignments.push(format!("status = {guard}"));
    }
    if let Some(error_message) = &fields.error_message {
        values.push(SqlValue::Text(error_message.clone()));
        assignments.push(format!("error_message = ?{}", values.len()));
    }

    if assignments.is_empty() {
        return match get_message(connection, &patch.message_id)? {
            Some(_) => Ok(()),
            None => Err(anyhow!("message not found: {}", patch.message_id)),
        };
    }

    let statement = format!(
        "UPDATE messages SET {} WHERE id = ?1",
        assignments.join(", ")
    );
    let updated = connection
        .execute(&statement, params_from_iter(values))
        .with_context(|| format!("failed to apply patch to message {}", patch.message_id))?;
    if updated == 0 {
        return Err(anyhow!("message not found: {}", patch.message_id));
    }
    Ok(())
}

/// Stores generated chart data. Returns `false` when no message has this id.
pub fn update_chart_data(connection: &Connection, id: &str, chart_data: &Value) -> Result<bool> {
    let encoded = serde_json::to_string(chart_data).context("failed to encode chart data")?;
    let updated = connection
        .execute(
            "UPDATE messages SET chart_data = ?2 WHERE id = ?1",
            params![id, encoded],
        )
        .with_context(|| format!("failed to store chart data of message {id}"))?;
    Ok(updated > 0)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role_key = row.get::<usize, String>(2)?;
    let role = MessageRole::from_key(&role_key)
        .ok_or_else(|| invalid_column(2, format!("unknown message role `{role_key}`")))?;

    let query_result = json_column(row, 5)?;
    let chart_data = json_column(row, 9)?;

    let status = row
        .get::<usize, Option<String>>(6)?
        .map(|key| {
            MessageStatus::from_key(&key)
                .ok_or_else(|| invalid_column(6, format!("unknown message status `{key}`")))
        })
        .transpose()?;

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        sql_query: row.get(4)?,
        query_result,
        status,
        error_message: row.get(7)?,
        chart_data,
        created_at: row.get(8)?,
    })
}

fn json_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<Value>> {
    row.get::<usize, Option<String>>(index)?
        .map(|encoded| serde_json::from_str::<Value>(&encoded))
        .transpose()
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

fn invalid_column(index: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, detail.into())
}
