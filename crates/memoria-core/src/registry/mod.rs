//! Document Registry (spec.md §4.8): URL/content dedup and the ingest
//! worker for `books`-tier documents. Lookups are a single indexed SELECT
//! so a re-encountered URL never triggers a new fetch or LLM call.

mod chunk;

pub use chunk::chunk_text;

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::{RegistryError, StorageError};
use crate::memory::{MemoryStore, Source, StoreParams, Tier};
use crate::store::SqliteStore;

/// Normalises a URL for hashing: lowercase, strip a trailing slash, strip
/// the scheme, strip a leading `www.`.
pub fn normalize_url(url: &str) -> String {
    let mut u = url.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = u.strip_prefix(scheme) {
            u = rest.to_string();
            break;
        }
    }
    if let Some(rest) = u.strip_prefix("www.") {
        u = rest.to_string();
    }
    if u.ends_with('/') {
        u.pop();
    }
    u
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn hash_url(url: &str) -> String {
    sha256_hex(normalize_url(url).as_bytes())
}

pub fn hash_content(content: &str) -> String {
    sha256_hex(content.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Queued,
    Processing,
    Complete,
    Failed,
}

impl DocumentStatus {
    fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Complete => "complete",
            DocumentStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "processing" => DocumentStatus::Processing,
            "complete" => DocumentStatus::Complete,
            "failed" => DocumentStatus::Failed,
            _ => DocumentStatus::Queued,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub content_hash: String,
    pub url_hash: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub status: DocumentStatus,
    pub error: Option<String>,
    pub memory_ids: Vec<String>,
}

/// Bilingual summary produced by an external LLM summariser.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub title: String,
    pub summary_en: String,
    pub summary_he: String,
    pub key_points_en: Vec<String>,
    pub key_points_he: Vec<String>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<DocumentSummary, RegistryError>;
}

/// Parses non-text payloads (PDF today) into plain text. HTML is stripped
/// in-process (see [`strip_html`]) since it never needs an external model.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse_pdf(&self, bytes: &[u8]) -> Result<String, RegistryError>;
}

pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone)]
struct QueuedJob {
    user_id: String,
    url: String,
}

/// Raw payload fetched for a queued job, before it becomes plain text.
/// PDF bytes are routed through the injected [`DocumentParser`]; HTML is
/// stripped in-process; anything else is already plain text.
pub enum DocumentPayload {
    Text(String),
    Html(String),
    Pdf(Vec<u8>),
}

pub struct DocumentRegistry {
    store: Arc<SqliteStore>,
    queue: Mutex<VecDeque<QueuedJob>>,
    in_flight: Mutex<HashSet<(String, String)>>,
}

impl DocumentRegistry {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            queue: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn lookup_by_url(&self, user_id: &str, url: &str) -> Result<Option<DocumentEntry>, RegistryError> {
        let url_hash = hash_url(url);
        let conn = self.store.reader();
        let row = conn
            .query_row(
                "SELECT content_hash, url_hash, url, title, status, error, memory_ids \
                 FROM document_registry WHERE user_id = ?1 AND url_hash = ?2",
                params![user_id, url_hash],
                Self::row_to_entry,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(row)
    }

    pub fn lookup_by_content_hash(
        &self,
        user_id: &str,
        content_hash: &str,
    ) -> Result<Option<DocumentEntry>, RegistryError> {
        let conn = self.store.reader();
        let row = conn
            .query_row(
                "SELECT content_hash, url_hash, url, title, status, error, memory_ids \
                 FROM document_registry WHERE user_id = ?1 AND content_hash = ?2",
                params![user_id, content_hash],
                Self::row_to_entry,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(row)
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<DocumentEntry> {
        let memory_ids_json: String = row.get(6)?;
        Ok(DocumentEntry {
            content_hash: row.get(0)?,
            url_hash: row.get(1)?,
            url: row.get(2)?,
            title: row.get(3)?,
            status: DocumentStatus::parse(&row.get::<_, String>(4)?),
            error: row.get(5)?,
            memory_ids: serde_json::from_str(&memory_ids_json).unwrap_or_default(),
        })
    }

    /// Short-circuits on a known-complete entry, no-ops on an in-flight one,
    /// otherwise inserts a `queued` row and pushes a worker job.
    pub fn queue_url(&self, user_id: &str, url: &str) -> Result<(), RegistryError> {
        if let Some(entry) = self.lookup_by_url(user_id, url)? {
            if entry.status == DocumentStatus::Complete {
                return Ok(());
            }
        }

        let key = (user_id.to_string(), url.to_string());
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(key.clone()) {
                return Ok(());
            }
        }

        let url_hash = hash_url(url);
        let now = Utc::now().to_rfc3339();
        let placeholder_hash = format!("pending:{url_hash}");
        let conn = self.store.writer();
        conn.execute(
            "INSERT INTO document_registry (user_id, content_hash, url_hash, url, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 'queued', ?5, ?5) \
             ON CONFLICT(user_id, content_hash) DO NOTHING",
            params![user_id, placeholder_hash, url_hash, url, now],
        )
        .map_err(StorageError::from)?;
        drop(conn);

        self.queue.lock().unwrap().push_back(QueuedJob {
            user_id: user_id.to_string(),
            url: url.to_string(),
        });
        Ok(())
    }

    fn dequeue(&self) -> Option<QueuedJob> {
        self.queue.lock().unwrap().pop_front()
    }

    fn release_in_flight(&self, user_id: &str, url: &str) {
        self.in_flight
            .lock()
            .unwrap()
            .remove(&(user_id.to_string(), url.to_string()));
    }

    /// Runs one queued job end to end: parse, dedup-by-content, chunk,
    /// store chunks at `books` tier, summarise, and persist the registry
    /// row. `started_at_ms`/`now_ms` let callers supply a clock (the crate
    /// avoids `Instant::now()` inside anything that must stay
    /// deterministic under replay).
    pub async fn process_next<S: MemoryStore, P: DocumentParser, Z: Summarizer>(
        &self,
        memory_store: &S,
        parser: &P,
        summarizer: &Z,
        payload: DocumentPayload,
        processing_time_ms: u64,
    ) -> Result<Option<DocumentEntry>, RegistryError> {
        let Some(job) = self.dequeue() else { return Ok(None) };

        let raw_text = match payload {
            DocumentPayload::Text(t) => t,
            DocumentPayload::Html(h) => strip_html(&h),
            DocumentPayload::Pdf(bytes) => match parser.parse_pdf(&bytes).await {
                Ok(t) => t,
                Err(e) => {
                    self.release_in_flight(&job.user_id, &job.url);
                    self.mark_failed(&job.user_id, &job.url, &e.to_string())?;
                    return Err(e);
                }
            },
        };

        let result = self
            .ingest_job(memory_store, summarizer, &job, raw_text, processing_time_ms)
            .await;
        self.release_in_flight(&job.user_id, &job.url);

        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                self.mark_failed(&job.user_id, &job.url, &e.to_string())?;
                Err(e)
            }
        }
    }

    async fn ingest_job<S: MemoryStore, Z: Summarizer>(
        &self,
        memory_store: &S,
        summarizer: &Z,
        job: &QueuedJob,
        raw_text: String,
        processing_time_ms: u64,
    ) -> Result<DocumentEntry, RegistryError> {
        let content_hash = hash_content(&raw_text);

        if let Some(existing) = self.lookup_by_content_hash(&job.user_id, &content_hash)? {
            if existing.status == DocumentStatus::Complete {
                self.link_url_to_existing(&job.user_id, &job.url, &content_hash)?;
                return Ok(existing);
            }
        }

        let chunks = chunk_text(&raw_text, 1000, 200);
        let mut memory_ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let item = memory_store
                .store(StoreParams::new(
                    &job.user_id,
                    chunk.clone(),
                    Tier::Books,
                    Source::Document {
                        doc_id: content_hash.clone(),
                        chunk_id: Some(format!("{}-{}", content_hash, memory_ids.len())),
                        book_title: None,
                        book_author: None,
                        originating_url: Some(job.url.clone()),
                    },
                ))
                .await
                .map_err(RegistryError::from)?;
            memory_ids.push(item.memory_id);
        }

        let summary = summarizer.summarize(&raw_text).await?;
        let now = Utc::now().to_rfc3339();
        let url_hash = hash_url(&job.url);
        let memory_ids_json = serde_json::to_string(&memory_ids).unwrap_or_else(|_| "[]".to_string());
        let key_en_json = serde_json::to_string(&summary.key_points_en).unwrap_or_else(|_| "[]".to_string());
        let key_he_json = serde_json::to_string(&summary.key_points_he).unwrap_or_else(|_| "[]".to_string());

        let conn = self.store.writer();
        conn.execute(
            "UPDATE document_registry SET content_hash = ?1, title = ?2, markdown = ?3, \
                char_count = ?4, word_count = ?5, summary_en = ?6, summary_he = ?7, \
                key_points_en = ?8, key_points_he = ?9, status = 'complete', memory_ids = ?10, \
                processing_time_ms = ?11, updated_at = ?12 \
             WHERE user_id = ?13 AND url_hash = ?14",
            params![
                content_hash,
                summary.title,
                raw_text,
                raw_text.chars().count() as i64,
                raw_text.split_whitespace().count() as i64,
                summary.summary_en,
                summary.summary_he,
                key_en_json,
                key_he_json,
                memory_ids_json,
                processing_time_ms as i64,
                now,
                job.user_id,
                url_hash,
            ],
        )
        .map_err(StorageError::from)?;

        Ok(DocumentEntry {
            content_hash,
            url_hash: Some(url_hash),
            url: Some(job.url.clone()),
            title: Some(summary.title),
            status: DocumentStatus::Complete,
            error: None,
            memory_ids,
        })
    }

    fn link_url_to_existing(&self, user_id: &str, url: &str, content_hash: &str) -> Result<(), RegistryError> {
        let url_hash = hash_url(url);
        let now = Utc::now().to_rfc3339();
        let conn = self.store.writer();
        conn.execute(
            "UPDATE document_registry SET content_hash = ?1, status = 'complete', updated_at = ?2 \
             WHERE user_id = ?3 AND url_hash = ?4",
            params![content_hash, now, user_id, url_hash],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }

    fn mark_failed(&self, user_id: &str, url: &str, error: &str) -> Result<(), RegistryError> {
        let url_hash = hash_url(url);
        let now = Utc::now().to_rfc3339();
        let conn = self.store.writer();
        conn.execute(
            "UPDATE document_registry SET status = 'failed', error = ?1, updated_at = ?2 \
             WHERE user_id = ?3 AND url_hash = ?4",
            params![error, now, user_id, url_hash],
        )
        .map_err(StorageError::from)?;
        Ok(())
    }
}
