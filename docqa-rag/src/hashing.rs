//! Local feature-hashing embedding provider.
//!
//! [`HashingEmbeddingProvider`] needs no model files and no network. Each
//! lower-cased word, and each pair of adjacent words, is hashed with FNV-1a
//! into one of `dimensions` buckets with a hash-derived sign, and the result
//! is L2-normalised. Texts sharing vocabulary end up close in Euclidean
//! distance, which is enough for single-document retrieval.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

/// Default dimensionality, the width of `all-MiniLM-L6-v2` sentence embeddings.
pub const DEFAULT_DIMENSIONS: usize = 384;

const BIGRAM_WEIGHT: f32 = 0.5;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "were", "what", "when",
    "where", "which", "who", "why", "with",
];

/// A deterministic, dependency-free [`EmbeddingProvider`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::HashingEmbeddingProvider;
///
/// let provider = HashingEmbeddingProvider::default();
/// let vector = provider.embed_text("The Eiffel Tower is in Paris.");
/// assert_eq!(vector.len(), 384);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbeddingProvider {
    /// Create a provider producing vectors of `dimensions` components (at least one).
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    /// Embed `text` synchronously. Text without any indexable word maps to the zero vector.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut previous: Option<String> = None;

        for token in tokens(text) {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
            if let Some(prev) = &previous {
                let bigram = format!("{prev} {token}");
                self.accumulate(&mut vector, bigram.as_bytes(), BIGRAM_WEIGHT);
            }
            previous = Some(token);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| !STOPWORDS.contains(&word.as_str()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, &byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
