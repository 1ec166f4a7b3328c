//! # docqa-rag
//!
//! Retrieval-augmented question answering over one document or web page.
//!
//! ## Overview
//!
//! A source is ingested once: its text is extracted, split into overlapping
//! segments, embedded, and indexed for exact nearest-neighbour search. Each
//! question is then embedded with the same model, the closest segments are
//! retrieved, and a language model answers from a prompt grounded on them.
//!
//! - [`RecursiveChunker`] - character-based splitting on paragraph, sentence and word boundaries
//! - [`HashingEmbeddingProvider`] - local deterministic embeddings
//! - [`FlatL2Index`] - brute-force L2 index with a compact on-disk format
//! - [`Retriever`] and [`AnswerComposer`] - the query path
//! - [`RagPipeline`] - ingestion and query entry points over a [`CorpusStore`]
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `openai` | [`openai::OpenAIEmbeddingProvider`] and [`openai::OpenAIGenerator`] |
//! | `web` | fetching `http(s)` sources |
//! | `pdf` | PDF text extraction |
//! | `full` | all of the above |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docqa_rag::{HashingEmbeddingProvider, RagPipeline, Source};
//! use docqa_rag::openai::OpenAIGenerator;
//!
//! let pipeline = RagPipeline::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
//!     .generator(Arc::new(OpenAIGenerator::from_env()?))
//!     .build()?;
//!
//! pipeline.ingest(Source::url("https://www.rust-lang.org")?).await?;
//! println!("{}", pipeline.answer("What is Rust?").await?.answer);
//! ```

pub mod chunking;
pub mod composer;
pub mod config;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod generation;
pub mod hashing;
pub mod index;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod retriever;
pub mod source;

pub use chunking::{Chunker, RecursiveChunker, chunk};
pub use composer::{AnswerComposer, CONTEXT_SEPARATOR, DEFAULT_TEMPLATE, PromptTemplate};
pub use config::{RagConfig, RagConfigBuilder};
pub use corpus::{Corpus, CorpusStore};
pub use document::{IngestReport, QueryResult, RetrievedHit, RetrievedSegment, SearchHit, Segment};
pub use embedding::EmbeddingProvider;
pub use error::{ErrorKind, ErrorReport, RagError, Result};
#[cfg(feature = "web")]
pub use extraction::html_to_text;
pub use extraction::{SourceExtractor, TextExtractor};
pub use generation::Generator;
pub use hashing::HashingEmbeddingProvider;
pub use index::FlatL2Index;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use retriever::Retriever;
pub use source::Source;
