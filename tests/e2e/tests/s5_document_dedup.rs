//! S5: re-encountering a document under an equivalent URL form, or with
//! byte-identical content under a different URL, never re-chunks or
//! re-summarises it.

use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};

use async_trait::async_trait;
use memoria_core::error::RegistryError;
use memoria_core::registry::{DocumentPayload, DocumentRegistry, DocumentStatus, DocumentSummary, Summarizer};
use memoria_core::store::SqliteStore;

struct CountingSummarizer {
    calls: AtomicUsize,
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, text: &str) -> Result<DocumentSummary, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DocumentSummary {
            title: text.chars().take(20).collect(),
            summary_en: "summary".to_string(),
            summary_he: "תקציר".to_string(),
            key_points_en: vec!["point".to_string()],
            key_points_he: vec!["נקודה".to_string()],
        })
    }
}

#[tokio::test]
async fn equivalent_url_forms_hash_to_the_same_registry_entry() {
    let store = Arc::new(SqliteStore::open(None).unwrap());
    let registry = DocumentRegistry::new(store.clone());
    let summarizer = CountingSummarizer { calls: AtomicUsize::new(0) };
    let text = "word ".repeat(300);

    registry.queue_url("u1", "https://www.Example.com/docs/").unwrap();
    let entry = registry
        .process_next(&*store, &NoopParser, &summarizer, DocumentPayload::Text(text.clone()), 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, DocumentStatus::Complete);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

    // A differently-cased, scheme/www-varying form of the same URL is the
    // same document and must not trigger a second fetch/queue entry.
    registry.queue_url("u1", "http://example.com/docs").unwrap();
    assert!(registry.lookup_by_url("u1", "http://example.com/docs").unwrap().is_some());
}

#[tokio::test]
async fn identical_content_under_a_new_url_reuses_the_existing_chunks() {
    let store = Arc::new(SqliteStore::open(None).unwrap());
    let registry = DocumentRegistry::new(store.clone());
    let summarizer = CountingSummarizer { calls: AtomicUsize::new(0) };
    let text = "duplicate content ".repeat(200);

    registry.queue_url("u1", "https://a.example.com/page").unwrap();
    let first = registry
        .process_next(&*store, &NoopParser, &summarizer, DocumentPayload::Text(text.clone()), 10)
        .await
        .unwrap()
        .unwrap();

    registry.queue_url("u1", "https://b.example.com/mirror").unwrap();
    let second = registry
        .process_next(&*store, &NoopParser, &summarizer, DocumentPayload::Text(text.clone()), 10)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.memory_ids, second.memory_ids);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
}

struct NoopParser;

#[async_trait]
impl memoria_core::registry::DocumentParser for NoopParser {
    async fn parse_pdf(&self, _bytes: &[u8]) -> Result<String, RegistryError> {
        Ok(String::new())
    }
}
