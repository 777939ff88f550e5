use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatbi::chart::{ChartError, ChartGenerator, ChartResult, HttpChartGenerator, generate_chart};
use chatbi::config::ModelApiConfig;
use chatbi::models::{MessagePatch, MessageRole, MessageStatus, PatchFields};
use chatbi::sqlite::{
    NewMessage, apply_message_patch, create_conversation, create_message, ensure_sqlite_schema,
    get_message,
};
use rusqlite::Connection;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

fn store() -> Connection {
    let connection = Connection::open_in_memory().expect("in-memory sqlite should open");
    ensure_sqlite_schema(&connection).expect("schema should be created");
    connection
}

fn answer(connection: &Connection, query_result: Option<Value>) -> String {
    let conversation = create_conversation(connection, None).expect("conversation");
    let id = create_message(
        connection,
        &NewMessage {
            conversation_id: &conversation.id,
            role: MessageRole::Assistant,
            content: "",
            status: Some(MessageStatus::Processing),
        },
    )
    .expect("answer should insert")
    .id;

    let mut fields = PatchFields::default().with_status(MessageStatus::Completed);
    if let Some(query_result) = query_result {
        fields = fields.with_query_result(query_result);
    }
    apply_message_patch(connection, &MessagePatch::new(&id, fields)).expect("answer patch");
    id
}

#[derive(Default)]
struct RecordingGenerator {
    calls: AtomicUsize,
    seen: Mutex<Vec<Value>>,
    fail: bool,
}

impl ChartGenerator for RecordingGenerator {
    async fn generate(&self, query_result: &Value) -> ChartResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .expect("recording lock")
            .push(query_result.clone());
        if self.fail {
            return Err(ChartError::ModelApi("HTTP 500: model offline".to_string()));
        }
        Ok(json!({"type": "bar", "x": "region", "y": "total"}))
    }
}

#[tokio::test]
async fn chart_is_generated_from_the_stored_result() {
    let connection = store();
    let rows = json!([{"region": "north", "total": 10}]);
    let id = answer(&connection, Some(rows.clone()));
    let generator = RecordingGenerator::default();

    let chart = generate_chart(&connection, &generator, &id)
        .await
        .expect("chart should be generated");

    assert_eq!(chart["type"], "bar");
    assert_eq!(*generator.seen.lock().expect("recording lock"), vec![rows]);
    let stored = get_message(&connection, &id)
        .expect("lookup should succeed")
        .expect("message should exist");
    assert_eq!(stored.chart_data, Some(chart));
    assert_eq!(stored.status, Some(MessageStatus::Completed));
}

#[tokio::test]
async fn unknown_message_is_reported() {
    let connection = store();
    let generator = RecordingGenerator::default();

    let error = generate_chart(&connection, &generator, "missing")
        .await
        .expect_err("unknown message must fail");

    assert!(matches!(error, ChartError::MessageNotFound(ref id) if id == "missing"));
    assert_eq!(error.code(), "message_not_found");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn message_without_a_result_never_reaches_the_model() {
    let connection = store();
    let without_result = answer(&connection, None);
    let null_result = answer(&connection, Some(Value::Null));
    let generator = RecordingGenerator::default();

    for id in [&without_result, &null_result] {
        let error = generate_chart(&connection, &generator, id)
            .await
            .expect_err("missing result must fail");
        assert_eq!(error.code(), "no_query_result");
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_generation_stores_nothing() {
    let connection = store();
    let id = answer(&connection, Some(json!([])));
    let generator = RecordingGenerator {
        fail: true,
        ..RecordingGenerator::default()
    };

    let error = generate_chart(&connection, &generator, &id)
        .await
        .expect_err("generator failure must surface");

    assert_eq!(error.code(), "model_api_failed");
    let stored = get_message(&connection, &id)
        .expect("lookup should succeed")
        .expect("message should exist");
    assert_eq!(stored.chart_data, None);
}

/// Answers one HTTP request and hands back the request head and body.
async fn serve_once(status_line: &'static str, body: String) -> (String, JoinHandle<(String, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener address");

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("request should arrive");
        let mut received = Vec::new();
        let mut chunk = [0_u8; 1024];
        let head_end = loop {
            let read = socket.read(&mut chunk).await.expect("request should be readable");
            assert!(read > 0, "connection closed before headers ended");
            received.extend_from_slice(&chunk[..read]);
            if let Some(index) = received.windows(4).position(|window| window == b"\r\n\r\n") {
                break index + 4;
            }
        };
        let head = String::from_utf8_lossy(&received[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while received.len() < head_end + content_length {
            let read = socket.read(&mut chunk).await.expect("body should be readable");
            assert!(read > 0, "connection closed before body ended");
            received.extend_from_slice(&chunk[..read]);
        }
        let request_body = String::from_utf8_lossy(&received[head_end..]).to_string();

        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("response should be writable");
        (head, request_body)
    });

    (format!("http://{address}/"), handle)
}

fn http_generator(base_url: String) -> HttpChartGenerator {
    HttpChartGenerator::new(&ModelApiConfig {
        base_url: Some(base_url),
        timeout_secs: 5,
    })
    .expect("generator should build")
}

#[tokio::test]
async fn http_generator_posts_the_query_result() {
    let connection = store();
    let rows = json!([{"region": "north", "total": 10}]);
    let id = answer(&connection, Some(rows.clone()));
    let chart = json!({"type": "line", "series": [1, 2, 3]});
    let (base_url, server) = serve_once("200 OK", chart.to_string()).await;
    let generator = http_generator(base_url);

    let generated = generate_chart(&connection, &generator, &id)
        .await
        .expect("chart should be generated");

    let (head, request_body) = server.await.expect("server task should finish");
    assert!(head.starts_with("POST /generate-chart HTTP/1.1"));
    assert!(head.to_ascii_lowercase().contains("content-type: application/json"));
    let request: Value = serde_json::from_str(&request_body).expect("request body is JSON");
    assert_eq!(request, json!({"query_result": rows}));
    assert_eq!(generated, chart);
    let stored = get_message(&connection, &id)
        .expect("lookup should succeed")
        .expect("message should exist");
    assert_eq!(stored.chart_data, Some(chart));
}

#[tokio::test]
async fn http_error_status_is_a_model_api_failure() {
    let connection = store();
    let id = answer(&connection, Some(json!([{"orders": 1}])));
    let (base_url, server) =
        serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#.to_string()).await;
    let generator = http_generator(base_url);

    let error = generate_chart(&connection, &generator, &id)
        .await
        .expect_err("server error must fail");
    server.await.expect("server task should finish");

    match &error {
        ChartError::ModelApi(detail) => {
            assert!(detail.contains("500"), "unexpected detail: {detail}");
            assert!(detail.contains("boom"), "unexpected detail: {detail}");
        }
        other => panic!("expected model API failure, got {other:?}"),
    }
    let stored = get_message(&connection, &id)
        .expect("lookup should succeed")
        .expect("message should exist");
    assert_eq!(stored.chart_data, None);
}

#[tokio::test]
async fn unreachable_model_service_is_a_model_api_failure() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener address");
    drop(listener);

    let generator = http_generator(format!("http://{address}"));
    let error = generator
        .generate(&json!([]))
        .await
        .expect_err("closed port must fail");

    assert_eq!(error.code(), "model_api_failed");
}
