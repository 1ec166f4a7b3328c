//! Data types for segments, search hits, and pipeline results.

use serde::{Deserialize, Serialize};

/// A bounded slice of source text, the atomic unit of retrieval.
///
/// `id` is the segment's position in its corpus and equals the row of its
/// vector in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    /// Position of the segment in the corpus.
    pub id: usize,
    /// The text content of the segment.
    pub text: String,
    /// Display name of the source the segment came from.
    pub source_name: String,
}

/// One row returned by an index search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// Row in the index, equal to the [`Segment::id`].
    pub segment_id: usize,
    /// Squared Euclidean distance to the query (lower is closer).
    pub distance: f32,
}

/// A [`Segment`] borrowed from a corpus snapshot, paired with its distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievedSegment<'c> {
    pub segment: &'c Segment,
    pub distance: f32,
}

impl RetrievedSegment<'_> {
    /// Detach from the corpus snapshot.
    pub fn to_owned_hit(&self) -> RetrievedHit {
        RetrievedHit { segment: self.segment.clone(), distance: self.distance }
    }
}

/// An owned copy of a [`RetrievedSegment`], safe to hold after the query returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedHit {
    pub segment: Segment,
    pub distance: f32,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    /// Number of segments in the new corpus.
    pub segment_count: usize,
    /// Display name of the ingested source.
    pub source_name: String,
}

/// The answer to a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryResult {
    pub answer: String,
}
