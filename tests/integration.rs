use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::{json, Value};
use tempfile::TempDir;

fn ahx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ahx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let records = json!([
        {
            "_id": "alpha",
            "canonical_website": "gazette",
            "website_url": "/news/alpha",
            "headlines": {"basic": "Alpha"},
            "content_elements": [{"type": "text", "content": "<p>Alpha story body.</p>"}],
            "taxonomy": {"tags": [{"slug": "alpha"}]}
        },
        {
            "_id": "beta",
            "content_elements": [{"type": "text", "content": "No URL anywhere."}]
        },
        "not a record",
        {
            "_id": "alpha",
            "canonical_url": "https://gazette.example.com/alpha",
            "content_elements": [{"type": "text", "content": "Alpha, corrected."}]
        }
    ]);
    fs::write(
        root.join("export.json"),
        serde_json::to_string_pretty(&records).unwrap(),
    )
    .unwrap();

    // Dead letters go into a directory that does not exist yet.
    let config_content = format!(
        r#"[pipeline]
dead_letter_path = "{}/data/dead_letters.jsonl"

[vector_store]
backend = "memory"
collection = "test_articles"

[logging]
filter = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("ahx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ahx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ahx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ahx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn input_path(tmp: &TempDir) -> String {
    tmp.path().join("export.json").display().to_string()
}

#[test]
fn test_transform_prints_documents() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ahx(
        &config_path,
        &["transform", &input_path(&tmp), "--progress", "off"],
    );
    assert!(success, "transform failed: stdout={}, stderr={}", stdout, stderr);

    let result: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(result["status"], "success");
    assert_eq!(result["processed_count"], 1);
    assert_eq!(result["skipped_count"], 2);

    let docs = result["documents"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["text"], "Alpha, corrected.");
    assert_eq!(docs[0]["metadata"]["url"], "https://gazette.example.com/alpha");
}

#[test]
fn test_transform_writes_dead_letters() {
    let (tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ahx(&config_path, &["transform", &input_path(&tmp)]);
    assert!(success, "transform failed: {}", stderr);

    let dead_letters = tmp.path().join("data").join("dead_letters.jsonl");
    let content = fs::read_to_string(&dead_letters).unwrap();
    let lines: Vec<Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], "beta");
    assert_eq!(lines[0]["reason"], "Missing URL");
    assert_eq!(lines[1]["id"], "unknown");
    assert_eq!(lines[1]["reason"], "Invalid document type");
    assert_eq!(lines[1]["raw_doc"], "not a record");
}

#[test]
fn test_dead_letters_append_across_runs() {
    let (tmp, config_path) = setup_test_env();

    run_ahx(&config_path, &["transform", &input_path(&tmp)]);
    run_ahx(&config_path, &["transform", &input_path(&tmp)]);

    let (stdout, stderr, success) = run_ahx(&config_path, &["dead-letters"]);
    assert!(success, "dead-letters failed: {}", stderr);
    assert_eq!(stdout.lines().count(), 4);
    assert!(stdout.contains("beta\tMissing URL"));
    assert!(stderr.contains("4 dead letters"));

    let (stdout, _, _) = run_ahx(&config_path, &["dead-letters", "--limit", "1"]);
    assert_eq!(stdout.trim(), "unknown\tInvalid document type");
}

#[test]
fn test_transform_to_output_file() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("clean.json");

    let (stdout, stderr, success) = run_ahx(
        &config_path,
        &["transform", &input_path(&tmp), "--output", out.to_str().unwrap()],
    );
    assert!(success, "transform failed: {}", stderr);
    assert!(stdout.contains("Transformed 1 documents (2 skipped)"));

    let written: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["documents"][0]["metadata"]["external_id"], "alpha");
}

#[test]
fn test_transform_rejects_non_array_input() {
    let (tmp, config_path) = setup_test_env();
    let input = tmp.path().join("object.json");
    fs::write(&input, r#"{"_id": "solo"}"#).unwrap();

    let (_, stderr, success) = run_ahx(&config_path, &["transform", input.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("JSON array"), "stderr: {}", stderr);
}

#[test]
fn test_run_with_disabled_embeddings() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ahx(&config_path, &["run", &input_path(&tmp)]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    // Disabled provider: every vector is empty, so nothing reaches the store.
    assert!(
        stdout.contains("Indexed 0 of 1 documents into 'test_articles' (2 skipped)"),
        "stdout: {}",
        stdout
    );
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[embedding]\nprovider = \"openai\"\n").unwrap();

    let (_, stderr, success) = run_ahx(&config_path, &["transform", &input_path(&tmp)]);
    assert!(!success);
    assert!(stderr.contains("embedding.dims"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("export.json");
    fs::write(&input, "[]").unwrap();

    let output = Command::new(ahx_binary())
        .current_dir(tmp.path())
        .arg("--config")
        .arg(tmp.path().join("missing.toml"))
        .arg("transform")
        .arg(&input)
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["processed_count"], 0);
}
