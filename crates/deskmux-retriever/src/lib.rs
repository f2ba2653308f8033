//! k-NN retrieval over a document index.
//!
//! If the embedding backend or vector index is unavailable at construction
//! time, the retriever reports itself unavailable: `retrieve` returns
//! empty, `count` returns zero, and the pipeline continues with no
//! pre-context. This is the difference between a degraded answer and an
//! outage.

use std::sync::Mutex;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    /// Distance in `[0, 1]`; smaller is more relevant.
    pub distance: f32,
}

/// Anything that turns text into a fixed-size dense vector. The real
/// sentence-transformer embedding model is out of scope for this crate —
/// callers plug one in; `HashEmbedder` is a deterministic stand-in used by
/// default and by tests.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// A deterministic hashing-trick embedder: each whitespace token is hashed
/// into one of `DIMENSIONS` buckets, and bucket counts are L2-normalized.
/// Good enough to make cosine similarity behave sanely for tests and for
/// environments with no real embedding service configured; not a substitute
/// for a trained model.
pub struct HashEmbedder;

const DIMENSIONS: usize = 128;

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0f32; DIMENSIONS];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = Sha256::new();
            hasher.update(token.as_bytes());
            let digest = hasher.finalize();
            let idx = (u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize) % DIMENSIONS;
            buckets[idx] += 1.0;
        }
        let norm: f32 = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for b in &mut buckets {
                *b /= norm;
            }
        }
        buckets
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    // Both vectors are already normalized by HashEmbedder, but guard
    // against callers plugging in an un-normalized embedder.
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    let similarity = (dot / (na * nb)).clamp(-1.0, 1.0);
    (1.0 - similarity).clamp(0.0, 1.0)
}

struct Doc {
    id: String,
    text: String,
    source: String,
    embedding: Vec<f32>,
}

/// In-memory retriever implementing the degrade-to-empty contract. A
/// production deployment would swap the storage/embedding backend without
/// changing this type's public surface.
pub struct Retriever {
    available: bool,
    embedder: Option<Box<dyn Embedder>>,
    docs: Mutex<Vec<Doc>>,
}

impl Retriever {
    /// Construct with an embedder. `None` simulates the backend being
    /// unavailable at startup (e.g. the embedding service failed to load).
    pub fn new(embedder: Option<Box<dyn Embedder>>) -> Self {
        let available = embedder.is_some();
        if !available {
            tracing::warn!(
                "retriever backend unavailable — RAG will return empty context, system continues without RAG"
            );
        }
        Self { available, embedder, docs: Mutex::new(Vec::new()) }
    }

    /// Default, always-available retriever backed by the deterministic
    /// hashing embedder.
    pub fn with_hash_embedder() -> Self {
        Self::new(Some(Box::new(HashEmbedder)))
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Idempotent ingest by content hash: re-adding identical text is a
    /// no-op on the underlying store.
    pub fn add_texts(&self, texts: &[String], sources: &[String]) {
        let Some(embedder) = &self.embedder else {
            tracing::debug!("retriever unavailable — skipping add_texts");
            return;
        };

        let mut docs = self.docs.lock().expect("retriever doc lock poisoned");
        for (i, text) in texts.iter().enumerate() {
            let source = sources.get(i).cloned().unwrap_or_default();
            let id = doc_id(text);
            if docs.iter().any(|d| d.id == id) {
                continue;
            }
            docs.push(Doc { id, text: text.clone(), source, embedding: embedder.embed(text) });
        }
    }

    pub fn add_file(&self, path: &std::path::Path, chunk_size: usize) -> std::io::Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let chunks = chunk_text(&text, chunk_size);
        let source = path.display().to_string();
        let sources = vec![source; chunks.len()];
        self.add_texts(&chunks, &sources);
        Ok(chunks.len())
    }

    /// Top-`k` most relevant chunks by ascending cosine distance.
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievedChunk> {
        let Some(embedder) = &self.embedder else {
            return Vec::new();
        };

        let query_vec = embedder.embed(query);
        let docs = self.docs.lock().expect("retriever doc lock poisoned");

        let mut scored: Vec<RetrievedChunk> = docs
            .iter()
            .map(|doc| RetrievedChunk {
                text: doc.text.clone(),
                source: doc.source.clone(),
                distance: cosine_distance(&query_vec, &doc.embedding),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    pub fn count(&self) -> usize {
        if !self.available {
            return 0;
        }
        self.docs.lock().expect("retriever doc lock poisoned").len()
    }
}

fn doc_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Fixed-size sliding-window chunking with 20% overlap. Chunks are
/// trimmed; empty chunks are discarded.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    if chunk_size == 0 {
        return Vec::new();
    }
    let overlap = chunk_size / 5;
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect::<String>().trim().to_string();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        if end - overlap <= start && overlap > 0 {
            // Guard against a zero-progress loop when overlap would stall it.
            start = end;
        } else {
            start = end - overlap;
        }
    }
    chunks
}

/// Split on `## ` markdown headings first so tables and code blocks stay
/// intact; sections above `max_section_size` are re-chunked with
/// `chunk_text(500)`. Chunks of length ≤ 20 are dropped.
pub fn chunk_markdown_sections(text: &str, max_section_size: usize) -> Vec<String> {
    let trimmed = text.trim();
    let mut sections = Vec::new();
    let mut current = String::new();

    for line in trimmed.lines() {
        if line.starts_with("## ") && !current.is_empty() {
            sections.push(current.trim().to_string());
            current = String::new();
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.trim().is_empty() {
        sections.push(current.trim().to_string());
    }

    let mut chunks = Vec::new();
    for section in sections {
        if section.len() <= max_section_size {
            chunks.push(section);
        } else {
            chunks.extend(chunk_text(&section, 500));
        }
    }
    chunks.retain(|c| c.len() > 20);
    chunks
}
