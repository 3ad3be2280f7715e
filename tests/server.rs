//! HTTP service tests against a live server with an injected provider.

use std::sync::Arc;

use anyhow::Result;
use article_harness::dead_letter::MemoryDeadLetterSink;
use article_harness::embedding::EmbeddingProvider;
use article_harness::pipeline::Pipeline;
use article_harness::server::run_server_with;
use article_harness::store::memory::InMemoryStore;
use article_harness::transform::BatchTransformer;
use async_trait::async_trait;
use serde_json::{json, Value};

const TOPICS: [&str; 3] = ["budget", "storm", "football"];

/// Scores each text by topic keyword, plus a small constant so no vector
/// is all zeros.
struct KeywordProvider;

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        TOPICS.len() + 1
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v: Vec<f32> = TOPICS
                    .iter()
                    .map(|k| lower.matches(k).count() as f32)
                    .collect();
                v.push(0.1);
                v
            })
            .collect())
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client
            .get(format!("http://127.0.0.1:{}/health", port))
            .send()
            .await
            .is_ok()
        {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Server did not start within 5 seconds");
}

struct TestServer {
    base: String,
    store: Arc<InMemoryStore>,
    dead_letters: Arc<MemoryDeadLetterSink>,
}

async fn start_server() -> TestServer {
    let store = Arc::new(InMemoryStore::new());
    let dead_letters = Arc::new(MemoryDeadLetterSink::new());
    let pipeline = Pipeline::new(
        BatchTransformer::new(dead_letters.clone()),
        Arc::new(KeywordProvider),
        store.clone(),
    )
    .with_collection("articles", 4);

    let port = find_free_port();
    let addr = format!("127.0.0.1:{}", port);
    tokio::spawn(async move {
        run_server_with(&addr, Arc::new(pipeline)).await.ok();
    });
    wait_for_server(port).await;

    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        store,
        dead_letters,
    }
}

fn raw_article(id: &str, body: &str) -> Value {
    json!({
        "_id": id,
        "canonical_website": "gazette",
        "website_url": format!("/news/{id}"),
        "headlines": {"basic": format!("Story {id}")},
        "content_elements": [{"type": "text", "content": format!("<p>{body}</p>")}],
    })
}

fn raw_batch() -> Value {
    json!([
        raw_article("budget-1", "The council passed the budget. Budget talks ran late."),
        raw_article("storm-1", "A storm closed roads across the county."),
        raw_article("football-1", "The football team won its opener."),
        {"_id": "no-text", "canonical_url": "https://gazette.example.com/x"},
        17,
    ])
}

async fn post(server: &TestServer, path: &str, body: &Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}{}", server.base, path))
        .json(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_root_and_health() {
    let server = start_server().await;

    let root: Value = reqwest::get(format!("{}/", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(root["status"], "System is live!");
    assert_eq!(root["endpoints"].as_array().unwrap().len(), 5);

    let health: Value = reqwest::get(format!("{}/health", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_transform_endpoint() {
    let server = start_server().await;

    let resp = post(&server, "/pipeline/transform", &raw_batch()).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["status"], "success");
    assert_eq!(body["processed_count"], 3);
    assert_eq!(body["skipped_count"], 2);
    assert_eq!(body["reports"].as_array().unwrap().len(), 5);
    assert_eq!(body["reports"][0]["status"], "SUCCESS");
    assert_eq!(body["reports"][3]["reason"], "Missing Text");
    assert_eq!(body["reports"][4]["id"], "unknown");
    assert_eq!(
        body["documents"][0]["metadata"]["url"],
        "https://www.gazette.com/news/budget-1"
    );

    let reasons: Vec<String> = server
        .dead_letters
        .records()
        .into_iter()
        .map(|r| r.reason)
        .collect();
    assert_eq!(reasons, vec!["Missing Text", "Invalid document type"]);
}

#[tokio::test]
async fn test_object_body_is_unprocessable() {
    let server = start_server().await;

    for path in [
        "/pipeline/transform",
        "/pipeline/embed",
        "/pipeline/index",
        "/pipeline/run_full",
    ] {
        let resp = post(&server, path, &json!({"_id": "solo"})).await;
        assert_eq!(resp.status(), 422, "{}", path);
        let body: Value = resp.json().await.unwrap();
        assert!(
            body["detail"].as_str().unwrap().contains("JSON array"),
            "{}: {}",
            path,
            body
        );
    }
}

#[tokio::test]
async fn test_embed_skips_empty_text() {
    let server = start_server().await;

    let docs = json!([
        {"text": "Budget season", "metadata": {"external_id": "a", "url": "https://x.com/a"}},
        {"text": "", "metadata": {"external_id": "b", "url": "https://x.com/b"}},
    ]);
    let body: Value = post(&server, "/pipeline/embed", &docs)
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["embedded_count"], 1);
    assert_eq!(body["documents"][0]["metadata"]["external_id"], "a");
    assert_eq!(body["documents"][0]["vector"], json!([1.0, 0.0, 0.0, 0.1]));
}

#[tokio::test]
async fn test_index_empty_is_a_warning() {
    let server = start_server().await;

    let body: Value = post(&server, "/pipeline/index", &json!([]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "warning");
    assert_eq!(body["message"], "No documents provided to index.");
    assert_eq!(server.store.point_count("articles"), None);
}

#[tokio::test]
async fn test_index_endpoint() {
    let server = start_server().await;

    let docs = json!([
        {"text": "one", "metadata": {"external_id": "1", "url": "https://x.com/1"}, "vector": [1.0, 0.0, 0.0, 0.1]},
        {"text": "two", "metadata": {"external_id": "2", "url": "https://x.com/2"}, "vector": [0.0, 1.0, 0.0, 0.1]},
        {"text": "three", "metadata": {"external_id": "3", "url": "https://x.com/3"}, "vector": []},
    ]);
    let body: Value = post(&server, "/pipeline/index", &docs)
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "success");
    assert_eq!(body["indexed_count"], 2);
    assert_eq!(body["message"], "Successfully indexed 2 documents.");
    assert_eq!(server.store.point_count("articles"), Some(2));
}

#[tokio::test]
async fn test_run_full_without_valid_documents() {
    let server = start_server().await;

    let body: Value = post(&server, "/pipeline/run_full", &json!([1, "two", {"_id": null}]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "warning");
    assert_eq!(body["message"], "No valid documents found.");
    assert_eq!(server.store.point_count("articles"), None);
}

#[tokio::test]
async fn test_run_full_then_search() {
    let server = start_server().await;

    let body: Value = post(&server, "/pipeline/run_full", &raw_batch())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Full pipeline completed successfully.");
    assert_eq!(body["processed_count"], 3);
    assert_eq!(body["indexed_count"], 3);
    assert_eq!(body["skipped_count"], 2);
    assert_eq!(server.store.point_count("articles"), Some(3));

    let hits: Value = reqwest::get(format!("{}/search?query=storm%20warning&k=2", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["metadata"]["external_id"], "storm-1");
    assert!(hits[0]["text"].as_str().unwrap().contains("storm closed roads"));
    assert!(hits[0]["score"].as_f64().unwrap() > hits[1]["score"].as_f64().unwrap());

    // Default k is 3.
    let hits: Value = reqwest::get(format!("{}/search?query=budget", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 3);
    assert_eq!(hits[0]["metadata"]["external_id"], "budget-1");
}

#[tokio::test]
async fn test_run_full_resets_collection() {
    let server = start_server().await;

    post(&server, "/pipeline/run_full", &raw_batch()).await;
    assert_eq!(server.store.point_count("articles"), Some(3));

    let body: Value = post(
        &server,
        "/pipeline/run_full",
        &json!([raw_article("solo", "Only one storm story now.")]),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(body["indexed_count"], 1);
    assert_eq!(server.store.point_count("articles"), Some(1));
}
