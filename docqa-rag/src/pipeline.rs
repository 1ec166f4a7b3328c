//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] wires a [`TextExtractor`], a [`Chunker`], an
//! [`EmbeddingProvider`] and a [`Generator`] around a [`CorpusStore`].
//!
//! Ingestion runs extract → chunk → embed → build index → persist → publish.
//! Nothing becomes visible to queries until the final publish, so a failure at
//! any earlier step leaves the previous corpus in place.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{HashingEmbeddingProvider, RagConfig, RagPipeline, Source};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! pipeline.ingest(Source::file("notes.txt", bytes)?).await?;
//! let result = pipeline.answer("What is the capital of France?").await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::composer::{AnswerComposer, PromptTemplate};
use crate::config::RagConfig;
use crate::corpus::{Corpus, CorpusStore};
use crate::document::{IngestReport, QueryResult, RetrievedHit};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extraction::{SourceExtractor, TextExtractor};
use crate::generation::Generator;
use crate::index::FlatL2Index;
use crate::retriever::Retriever;
use crate::source::Source;

/// The RAG pipeline orchestrator.
///
/// Holds exactly one active corpus. Queries run concurrently against a
/// snapshot of it; ingestions run one at a time and replace it wholesale.
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn TextExtractor>,
    chunker: Arc<dyn Chunker>,
    retriever: Retriever,
    composer: AnswerComposer,
    store: Arc<CorpusStore>,
    ingest_lock: Arc<Mutex<()>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// The store holding the active corpus.
    pub fn store(&self) -> &Arc<CorpusStore> {
        &self.store
    }

    /// Snapshot of the active corpus, if any source has been ingested.
    pub async fn corpus(&self) -> Option<Arc<Corpus>> {
        self.store.snapshot().await
    }

    /// Ingest a file or web page, replacing the current corpus.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if the source kind is not supported by this build.
    /// - [`RagError::NoTextExtracted`] if the source yields no text.
    /// - [`RagError::Extraction`], [`RagError::Embedding`] or [`RagError::Io`]
    ///   from the failing stage.
    ///
    /// On any error the previously active corpus and index file are untouched.
    /// Dropping the returned future before persistence starts abandons the
    /// ingestion; once it starts, the save and the publish run to completion.
    pub async fn ingest(&self, source: Source) -> Result<IngestReport> {
        let guard = Arc::clone(&self.ingest_lock).lock_owned().await;

        let text = self.extractor.extract(&source).await.map_err(|e| {
            error!(source = source.name(), error = %e, "extraction failed");
            e
        })?;
        self.build_and_publish(guard, source.name().to_string(), text).await
    }

    /// Ingest already-extracted text under `source_name`.
    ///
    /// # Errors
    ///
    /// As [`ingest`](Self::ingest), minus the extraction failures.
    pub async fn ingest_text(
        &self,
        source_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<IngestReport> {
        let guard = Arc::clone(&self.ingest_lock).lock_owned().await;
        self.build_and_publish(guard, source_name.into(), text.into()).await
    }

    async fn build_and_publish(
        &self,
        guard: OwnedMutexGuard<()>,
        source_name: String,
        text: String,
    ) -> Result<IngestReport> {
        if text.trim().is_empty() {
            error!(source = %source_name, "source produced no text");
            return Err(RagError::NoTextExtracted(format!(
                "'{source_name}' contains no extractable text"
            )));
        }

        let segments = self.chunker.chunk(&text);
        let texts: Vec<&str> = segments.iter().map(String::as_str).collect();

        let vectors = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(source = %source_name, error = %e, "embedding failed during ingestion");
            e
        })?;
        if vectors.len() != segments.len() {
            error!(
                source = %source_name,
                segments = segments.len(),
                vectors = vectors.len(),
                "embedding provider returned the wrong number of vectors"
            );
            return Err(RagError::Embedding {
                provider: self.embedding_provider.name().to_string(),
                message: format!("expected {} vectors, got {}", segments.len(), vectors.len()),
            });
        }

        let index = FlatL2Index::build(&vectors)?;
        let corpus = Arc::new(Corpus::new(source_name, segments, index)?);

        let commit = tokio::spawn(persist_and_publish(
            guard,
            Arc::clone(&self.store),
            self.config.index_path.clone(),
            corpus,
        ));
        let report = commit.await.map_err(|e| RagError::Io(std::io::Error::other(e)))??;

        info!(source = %report.source_name, segment_count = report.segment_count, "ingested source");
        Ok(report)
    }

    /// Answer `query` from the active corpus.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidInput`] if the query is blank.
    /// - [`RagError::EmptyCorpus`] if nothing has been ingested yet.
    /// - [`RagError::Generation`] if the language model call fails.
    pub async fn answer(&self, query: &str) -> Result<QueryResult> {
        let corpus = self.snapshot_for(query).await?;
        let retrieved = self.retriever.retrieve(query, &corpus, self.config.top_k).await?;
        let answer = self.composer.compose(query, &retrieved).await?;

        info!(retrieved = retrieved.len(), answer_len = answer.len(), "query completed");
        Ok(QueryResult { answer })
    }

    /// The segments [`answer`](Self::answer) would ground its prompt on,
    /// without calling the language model.
    ///
    /// # Errors
    ///
    /// As [`answer`](Self::answer), minus generation failures.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedHit>> {
        let corpus = self.snapshot_for(query).await?;
        let retrieved = self.retriever.retrieve(query, &corpus, self.config.top_k).await?;

        info!(retrieved = retrieved.len(), "retrieval completed");
        Ok(retrieved.iter().map(|r| r.to_owned_hit()).collect())
    }

    async fn snapshot_for(&self, query: &str) -> Result<Arc<Corpus>> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }
        self.store.snapshot().await.ok_or(RagError::EmptyCorpus)
    }
}

/// Write `corpus` to `index_path`, then make it the active corpus.
///
/// Runs as its own task holding the ingestion lock, so the index file and the
/// published snapshot change together even if the ingesting caller is dropped.
async fn persist_and_publish(
    _guard: OwnedMutexGuard<()>,
    store: Arc<CorpusStore>,
    index_path: Option<PathBuf>,
    corpus: Arc<Corpus>,
) -> Result<IngestReport> {
    if let Some(path) = index_path {
        let snapshot = Arc::clone(&corpus);
        tokio::task::spawn_blocking(move || snapshot.index().save(&path))
            .await
            .map_err(|e| RagError::Io(std::io::Error::other(e)))?
            .map_err(|e| {
                error!(source = corpus.source_name(), error = %e, "failed to persist index");
                e
            })?;
    }

    let report = IngestReport {
        segment_count: corpus.len(),
        source_name: corpus.source_name().to_string(),
    };
    store.replace(corpus).await;
    Ok(report)
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider` and `generator` are required. Everything else has a
/// default: [`RagConfig::default()`], a [`SourceExtractor`], a
/// [`RecursiveChunker`] sized from the config, the default prompt template,
/// and a fresh [`CorpusStore`].
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn Generator>>,
    extractor: Option<Arc<dyn TextExtractor>>,
    chunker: Option<Arc<dyn Chunker>>,
    template: Option<PromptTemplate>,
    store: Option<Arc<CorpusStore>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for both segments and queries.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the language model.
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the default [`SourceExtractor`].
    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Replace the default [`RecursiveChunker`].
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Replace the default prompt template.
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Share an existing corpus store.
    pub fn store(mut self, store: Arc<CorpusStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a required field is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let generator =
            self.generator.ok_or_else(|| RagError::Config("generator is required".to_string()))?;

        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(
                RecursiveChunker::new(config.chunk_size, config.chunk_overlap)
                    .map_err(|e| RagError::Config(e.to_string()))?,
            ),
        };
        let extractor = self.extractor.unwrap_or_else(|| Arc::new(SourceExtractor::default()));
        let composer = AnswerComposer::new(generator).with_template(self.template.unwrap_or_default());

        Ok(RagPipeline {
            retriever: Retriever::new(Arc::clone(&embedding_provider)),
            config,
            embedding_provider,
            extractor,
            chunker,
            composer,
            store: self.store.unwrap_or_default(),
            ingest_lock: Arc::new(Mutex::new(())),
        })
    }
}
