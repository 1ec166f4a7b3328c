//! Query-time retrieval: embed the query, search the index, join hits to segments.

use std::sync::Arc;

use tracing::{debug, error};

use crate::corpus::Corpus;
use crate::document::RetrievedSegment;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Fetches the segments of a corpus nearest to a query.
///
/// Uses the same [`EmbeddingProvider`] that embedded the corpus so query and
/// segment vectors share one space.
#[derive(Clone)]
pub struct Retriever {
    embedding_provider: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(embedding_provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedding_provider }
    }

    /// Return up to `k` segments of `corpus`, nearest first.
    ///
    /// The returned segments borrow from `corpus`; nothing is retained once
    /// the caller drops them.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] if the corpus has no segments or no index.
    /// - [`RagError::DimensionMismatch`] if the embedder and index disagree.
    /// - Any error from the embedding provider.
    pub async fn retrieve<'c>(
        &self,
        query: &str,
        corpus: &'c Corpus,
        k: usize,
    ) -> Result<Vec<RetrievedSegment<'c>>> {
        if corpus.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let query_vector = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(provider = self.embedding_provider.name(), error = %e, "query embedding failed");
            e
        })?;

        let hits = corpus.index().search(&query_vector, k)?;
        debug!(
            k,
            distances = ?hits.iter().map(|h| h.distance).collect::<Vec<_>>(),
            "index search completed"
        );

        hits.into_iter()
            .map(|hit| {
                let segment = corpus.segment(hit.segment_id).ok_or(RagError::CorpusMismatch {
                    segments: corpus.len(),
                    vectors: corpus.index().len(),
                })?;
                Ok(RetrievedSegment { segment, distance: hit.distance })
            })
            .collect()
    }
}
