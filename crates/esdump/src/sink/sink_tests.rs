//! Tests for record sinks.

use super::*;
use crate::config::VersionSelector;
use serde_json::{json, Map, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn page(n: usize) -> Page {
    Page::from(
        (0..n)
            .map(|i| {
                let mut content = Map::new();
                content.insert("n".to_string(), json!(i));
                Record::new(format!("doc-{}", i), "src", content)
            })
            .collect::<Vec<_>>(),
    )
}

fn lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

async fn cluster_sink(server: &MockServer, version: VersionSelector) -> Box<dyn Sink> {
    let endpoint = Endpoint::parse(&format!("{}/dst", server.uri())).unwrap();
    let options = TransferOptions {
        output_version: version,
        ..TransferOptions::default()
    };
    create_sink(&endpoint, &options, "dst").await.unwrap()
}

/// Answers a bulk request by failing the documents at the given positions.
struct FailItems(Vec<usize>);

impl Respond for FailItems {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body = String::from_utf8_lossy(&request.body);
        let docs = body.lines().count() / 2;
        let items: Vec<Value> = (0..docs)
            .map(|i| {
                if self.0.contains(&i) {
                    json!({"index": {"_id": format!("doc-{}", i), "status": 400,
                        "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}}})
                } else {
                    json!({"index": {"_id": format!("doc-{}", i), "status": 201}})
                }
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "errors": !self.0.is_empty(),
            "items": items
        }))
    }
}

#[test]
fn test_encode_record_line() {
    let record = Record::new("1", "logs", Map::new());
    let line = encode_record(&record).unwrap();
    assert_eq!(line.last(), Some(&b'\n'));
    let value: Value = serde_json::from_slice(&line).unwrap();
    assert_eq!(value, json!({"_id": "1", "_index": "logs", "_source": {}}));
}

#[tokio::test]
async fn test_file_sink_writes_lines() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.json");
    let mut sink = FileSink::create(&out).await.unwrap();

    assert_eq!(sink.write(&page(3)).await.unwrap(), 3);
    assert_eq!(sink.write(&page(2)).await.unwrap(), 2);
    sink.cleanup().await.unwrap();

    let written = lines(&out);
    assert_eq!(written.len(), 5);
    assert_eq!(written[0]["_id"], "doc-0");
    assert_eq!(written[0]["_source"]["n"], 0);
}

#[tokio::test]
async fn test_file_sink_rejects_existing_file() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.json");
    std::fs::write(&out, "").unwrap();

    let result = FileSink::create(&out).await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
async fn test_split_sink_rotates_files() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("dump");
    let mut sink = SplitFileSink::open(&out, "logs", 4).await.unwrap();
    assert!(out.is_dir());

    assert_eq!(sink.write(&page(3)).await.unwrap(), 3);
    assert_eq!(sink.write(&page(3)).await.unwrap(), 3);
    assert_eq!(sink.write(&page(4)).await.unwrap(), 4);
    sink.cleanup().await.unwrap();

    // 10 records at 4 per file.
    assert_eq!(sink.files_created(), 3);
    assert_eq!(lines(&out.join("logs-1.json")).len(), 4);
    assert_eq!(lines(&out.join("logs-2.json")).len(), 4);
    assert_eq!(lines(&out.join("logs-3.json")).len(), 2);
    assert!(!out.join("logs-4.json").exists());
}

#[tokio::test]
async fn test_split_sink_exact_multiple() {
    let dir = TempDir::new().unwrap();
    let mut sink = SplitFileSink::open(dir.path(), "idx", 5).await.unwrap();
    sink.write(&page(10)).await.unwrap();
    sink.cleanup().await.unwrap();

    assert_eq!(sink.files_created(), 2);
    assert!(!dir.path().join("idx-3.json").exists());
}

#[tokio::test]
async fn test_split_sink_write_after_cleanup_opens_new_file() {
    let dir = TempDir::new().unwrap();
    let mut sink = SplitFileSink::open(dir.path(), "idx", 10).await.unwrap();
    sink.write(&page(2)).await.unwrap();
    sink.cleanup().await.unwrap();
    sink.write(&page(1)).await.unwrap();
    sink.cleanup().await.unwrap();

    assert_eq!(lines(&dir.path().join("idx-1.json")).len(), 2);
    assert_eq!(lines(&dir.path().join("idx-2.json")).len(), 1);
}

#[tokio::test]
async fn test_split_sink_config_errors() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        SplitFileSink::open(dir.path(), "idx", 0).await,
        Err(Error::Config(_))
    ));

    let file = dir.path().join("plain.json");
    std::fs::write(&file, "").unwrap();
    assert!(matches!(
        SplitFileSink::open(&file, "idx", 10).await,
        Err(Error::Config(_))
    ));
}

#[tokio::test]
async fn test_create_sink_picks_split_for_split_limit() {
    let dir = TempDir::new().unwrap();
    let endpoint = Endpoint::File(dir.path().join("parts"));
    let options = TransferOptions {
        split_limit: 100,
        ..TransferOptions::default()
    };
    let sink = create_sink(&endpoint, &options, "logs").await.unwrap();
    assert_eq!(sink.kind(), "split");

    let endpoint = Endpoint::File(dir.path().join("single.json"));
    let sink = create_sink(&endpoint, &TransferOptions::default(), "logs")
        .await
        .unwrap();
    assert_eq!(sink.kind(), "file");
}

#[tokio::test]
async fn test_cluster_sink_bulk_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(FailItems(vec![]))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = cluster_sink(&server, VersionSelector::V7).await;
    assert_eq!(sink.write(&page(5)).await.unwrap(), 5);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    let first: Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();
    assert_eq!(first, json!({"index": {"_index": "dst", "_id": "doc-0"}}));
}

#[tokio::test]
async fn test_cluster_sink_v6_adds_doc_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(FailItems(vec![]))
        .mount(&server)
        .await;

    let mut sink = cluster_sink(&server, VersionSelector::V6).await;
    sink.write(&page(1)).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body).to_string();
    let first: Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();
    assert_eq!(first["index"]["_type"], "_doc");
}

#[tokio::test]
async fn test_cluster_sink_partial_failure_counts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(FailItems(vec![1, 3]))
        .mount(&server)
        .await;

    let mut sink = cluster_sink(&server, VersionSelector::V7).await;
    assert_eq!(sink.write(&page(5)).await.unwrap(), 3);
}

#[tokio::test]
async fn test_cluster_sink_total_failure_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(FailItems(vec![0, 1]))
        .mount(&server)
        .await;

    let mut sink = cluster_sink(&server, VersionSelector::V7).await;
    let err = sink.write(&page(2)).await.unwrap_err();
    assert!(matches!(err, Error::Sink(_)));
}

#[tokio::test]
async fn test_cluster_sink_http_error_is_sink_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let mut sink = cluster_sink(&server, VersionSelector::V7).await;
    assert!(matches!(sink.write(&page(2)).await, Err(Error::Sink(_))));
}
