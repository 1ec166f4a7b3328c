//! The indexed representation of one ingested source.
//!
//! A [`Corpus`] pairs the segments with the index built from their vectors and
//! is immutable once constructed. [`CorpusStore`] holds the current corpus
//! behind an `Arc`. Readers take a snapshot and release the lock straight
//! away. Ingestion swaps in a fully built replacement with a single write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::document::Segment;
use crate::error::{RagError, Result};
use crate::index::FlatL2Index;

/// Segments of one source plus the index over their embeddings.
///
/// Row `i` of the index is the vector of `segments[i]`, and `segments[i].id == i`.
#[derive(Debug, Clone)]
pub struct Corpus {
    segments: Vec<Segment>,
    index: FlatL2Index,
    source_name: String,
    built_at: DateTime<Utc>,
}

impl Corpus {
    /// Assemble a corpus from segment texts and an index built over their embeddings.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CorpusMismatch`] if the index does not hold exactly
    /// one vector per text.
    pub fn new(
        source_name: impl Into<String>,
        texts: Vec<String>,
        index: FlatL2Index,
    ) -> Result<Self> {
        if texts.len() != index.len() {
            return Err(RagError::CorpusMismatch { segments: texts.len(), vectors: index.len() });
        }
        let source_name = source_name.into();
        let segments = texts
            .into_iter()
            .enumerate()
            .map(|(id, text)| Segment { id, text, source_name: source_name.clone() })
            .collect();
        Ok(Self { segments, index, source_name, built_at: Utc::now() })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: usize) -> Option<&Segment> {
        self.segments.get(id)
    }

    pub fn index(&self) -> &FlatL2Index {
        &self.index
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// When the corpus finished building.
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when there is nothing to retrieve from.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() || !self.index.is_built()
    }
}

/// Process-wide holder of the current [`Corpus`].
///
/// Starts empty. [`replace`](CorpusStore::replace) publishes a new corpus
/// atomically. A reader holding an older snapshot keeps using it until it
/// drops the `Arc`.
#[derive(Debug, Default)]
pub struct CorpusStore {
    current: RwLock<Option<Arc<Corpus>>>,
}

impl CorpusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The corpus visible right now, if any ingestion has succeeded.
    pub async fn snapshot(&self) -> Option<Arc<Corpus>> {
        self.current.read().await.clone()
    }

    /// Publish `corpus`, returning the one it replaced.
    pub async fn replace(&self, corpus: impl Into<Arc<Corpus>>) -> Option<Arc<Corpus>> {
        let corpus = corpus.into();
        info!(
            source = corpus.source_name(),
            segment_count = corpus.len(),
            "publishing new corpus"
        );
        self.current.write().await.replace(corpus)
    }

    /// Drop the current corpus.
    pub async fn clear(&self) -> Option<Arc<Corpus>> {
        self.current.write().await.take()
    }
}
