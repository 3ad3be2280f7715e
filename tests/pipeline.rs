//! Library-level properties of the normalization pipeline.

use article_harness::assemble::process_document;
use article_harness::extract;
use article_harness::models::{CanonicalDocument, ProcessStatus};
use article_harness::transform::{process_batch, process_batch_parallel, process_input};
use serde_json::{json, Value};

/// A realistic export record, trimmed to the fields the pipeline reads.
fn export_record(id: &str, body: &[&str]) -> Value {
    let content: Vec<Value> = body
        .iter()
        .map(|c| json!({"type": "text", "content": c}))
        .collect();
    json!({
        "_id": id,
        "type": "story",
        "canonical_website": "Gazette",
        "website_url": format!("/local/2024/05/01/{id}/"),
        "canonical_url": format!("https://gazette.example.com/{id}"),
        "headlines": {"basic": "Council <em>approves</em> budget", "web": "ignored"},
        "publish_date": "2024-05-01T12:00:00.000Z",
        "first_publish_date": "2024-05-01T10:00:00.000Z",
        "last_updated_date": "2024-05-02T08:15:00.000Z",
        "content_elements": content,
        "promo_items": {"basic": {"type": "image", "additional_properties": {"resizeUrl": "/resizer/abc.jpg"}}},
        "taxonomy": {
            "sections": [{"name": "Local"}, {"name": "Politics"}, {"name": "Local"}],
            "categories": [
                {"name": "Government", "score": 0.71, "classifier": "iab_content_taxonomy"},
                {"name": "Finance", "score": 0.93, "classifier": "iab_content_taxonomy"},
                {"name": "Weather", "score": 0.99, "classifier": "other_taxonomy"},
            ],
            "tags": [{"slug": "budget"}, {"slug": "city-council"}, {"text": "no slug"}],
        },
    })
}

#[test]
fn valid_record_produces_stringified_external_id() {
    for id in [json!("xyz"), json!(1234), json!(true)] {
        let mut raw = export_record("x", &["Body text."]);
        raw["_id"] = id.clone();
        let result = process_document(&raw);
        let doc = result.document.expect("valid record");
        let expected = match &id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        assert_eq!(doc.external_id(), expected);
        assert_eq!(result.report.status, ProcessStatus::Success);
    }
}

#[test]
fn full_record_metadata() {
    let raw = export_record(
        "ABC",
        &["<p>The council voted 7-2 on Tuesday.</p>", "<p>The budget takes effect in July.</p>"],
    );
    let doc = process_document(&raw).document.unwrap();
    assert_eq!(
        doc.text(),
        "The council voted 7-2 on Tuesday.\nThe budget takes effect in July."
    );

    let meta = doc.metadata();
    assert_eq!(meta.title.as_deref(), Some("Council approves budget"));
    assert_eq!(meta.url, "https://www.Gazette.com/local/2024/05/01/ABC/");
    assert_eq!(meta.datetime.as_deref(), Some("2024-05-02T08:15:00.000Z"));
    assert_eq!(meta.first_publish_date.as_deref(), Some("2024-05-01T10:00:00.000Z"));
    assert_eq!(meta.sections, vec!["Local", "Politics"]);
    assert_eq!(meta.categories, vec!["Finance", "Government"]);
    assert_eq!(meta.tags, vec!["budget", "city-council"]);
    assert_eq!(
        meta.thumb.as_deref(),
        Some("https://www.gazette.com/resizer/abc.jpg")
    );
}

#[test]
fn missing_identifier_is_rejected() {
    let mut raw = export_record("x", &["Body."]);
    raw.as_object_mut().unwrap().remove("_id");
    let result = process_document(&raw);
    assert!(result.document.is_none());
    assert_eq!(result.report.reason, "Missing ID");

    raw["_id"] = Value::Null;
    assert_eq!(process_document(&raw).report.reason, "Missing ID");
}

#[test]
fn url_fallback_chain() {
    assert_eq!(
        extract::url(&json!({"canonical_website": "site", "website_url": "/a/b"})).as_deref(),
        Some("https://www.site.com/a/b")
    );
    assert_eq!(
        extract::url(&json!({"website_url": "https://other.com/x"})).as_deref(),
        Some("https://other.com/x")
    );
    assert_eq!(
        extract::url(&json!({"canonical_url": "https://fallback.com/y"})).as_deref(),
        Some("https://fallback.com/y")
    );

    let raw = json!({
        "_id": "no-url",
        "content_elements": [{"type": "text", "content": "Body."}],
    });
    assert_eq!(process_document(&raw).report.reason, "Missing URL");
}

#[test]
fn categories_and_thumbnail_examples() {
    let raw = json!({"taxonomy": {"categories": [
        {"name": "A", "score": 0.2, "classifier": "iab_content_taxonomy"},
        {"name": "B", "score": 0.9, "classifier": "iab_content_taxonomy"},
        {"name": "C", "score": 0.5, "classifier": "other"},
    ]}});
    assert_eq!(extract::categories(&raw), vec!["B", "A"]);

    let raw = json!({
        "promo_items": {"basic": {"additional_properties": {"resizeUrl": "/img/1.jpg"}}},
        "canonical_website": "Example",
    });
    assert_eq!(
        extract::thumb(&raw).as_deref(),
        Some("https://www.example.com/img/1.jpg")
    );
}

#[test]
fn batch_is_idempotent() {
    let raws = vec![
        export_record("a", &["One."]),
        json!("junk"),
        export_record("b", &["Two."]),
        export_record("a", &["Three."]),
    ];
    let first = process_batch(&raws);
    let second = process_batch(&raws);
    assert_eq!(first.documents, second.documents);
    assert_eq!(first.dead_letters, second.dead_letters);
}

#[test]
fn upsert_merge_keeps_later_text_at_first_position() {
    let raws = vec![
        export_record("a", &["Original text."]),
        export_record("b", &["Other story."]),
        export_record("a", &["Corrected text."]),
    ];
    let outcome = process_batch(&raws);
    assert_eq!(outcome.documents.len(), 2);
    let order: Vec<&str> = outcome.documents.keys().map(String::as_str).collect();
    assert_eq!(order, vec!["a", "b"]);
    assert_eq!(outcome.documents["a"].text(), "Corrected text.");
    assert_eq!(outcome.reports.len(), 3);
}

#[test]
fn non_object_items_do_not_stop_the_batch() {
    let raws = vec![json!(42), json!(null), export_record("a", &["Fine."]), json!([1])];
    let outcome = process_batch(&raws);
    assert_eq!(outcome.processed_count(), 1);
    assert_eq!(outcome.skipped_count(), 3);
    assert!(outcome
        .dead_letters
        .iter()
        .all(|d| d.reason == "Invalid document type" && d.id == "unknown"));
}

#[test]
fn parallel_batch_matches_sequential() {
    let raws: Vec<Value> = (0..300)
        .map(|i| match i % 5 {
            0 => json!({"_id": i}),
            _ => export_record(&format!("doc-{}", i % 40), &[format!("Body {i}.").as_str()]),
        })
        .collect();
    let sequential = process_batch(&raws);
    let parallel = process_batch_parallel(&raws);
    assert_eq!(sequential.documents, parallel.documents);
    assert_eq!(sequential.reports, parallel.reports);
}

#[test]
fn outer_input_must_be_a_sequence() {
    let err = process_input(&json!({"_id": "a"})).unwrap_err();
    assert!(err.to_string().contains("JSON array"));
}

#[test]
fn round_trip_revalidates_without_nulls() {
    let mut raw = export_record("rt", &["Round trip body."]);
    raw.as_object_mut().unwrap().remove("promo_items");
    raw.as_object_mut().unwrap().remove("headlines");
    let doc = process_document(&raw).document.unwrap();

    let encoded = serde_json::to_string(&doc).unwrap();
    assert!(!encoded.contains("null"));
    assert!(!encoded.contains("\"thumb\""));
    assert!(!encoded.contains("\"title\""));

    let decoded: CanonicalDocument = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, doc);
}

#[test]
fn deeply_nested_content_does_not_abort_the_batch() {
    let depth = 20_000;
    let nested = format!("{}buried{}", "<div>".repeat(depth), "</div>".repeat(depth));
    let raws = vec![
        export_record("deep", &[nested.as_str()]),
        export_record("after", &["Still processed."]),
    ];

    let outcome = process_batch(&raws);
    assert_eq!(outcome.processed_count(), 2);
    assert_eq!(outcome.documents["deep"].text(), "buried");
    assert_eq!(outcome.documents["after"].text(), "Still processed.");
}
