//! Exact nearest-neighbour index over squared Euclidean distance.
//!
//! [`FlatL2Index`] stores every vector in one row-major `f32` buffer and scans
//! all rows per query. Corpora here are single documents, so a brute-force
//! scan is fast and its results are exact. The index is immutable once built.
//! A new source means a new index.
//!
//! # File format
//!
//! All integers are little-endian.
//!
//! | offset | size    | field                        |
//! |--------|---------|------------------------------|
//! | 0      | 4       | magic `DQVX`                 |
//! | 4      | 2       | format version               |
//! | 6      | 2       | reserved, zero               |
//! | 8      | 4       | dimension `D` (`u32`)        |
//! | 12     | 8       | vector count `N` (`u64`)     |
//! | 20     | 4·D·N   | vectors, row-major `f32`     |

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::document::SearchHit;
use crate::error::{RagError, Result};

const MAGIC: [u8; 4] = *b"DQVX";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 20;
const F32_LEN: usize = std::mem::size_of::<f32>();

/// An exact, immutable L2 index.
///
/// [`FlatL2Index::default()`] is an unbuilt index: searching it fails with
/// [`RagError::NotBuilt`]. Use [`FlatL2Index::build`] or [`FlatL2Index::load`]
/// to obtain a searchable one.
///
/// # Example
///
/// ```rust
/// use docqa_rag::FlatL2Index;
///
/// let index = FlatL2Index::build(&[vec![0.0, 0.0], vec![3.0, 4.0]])?;
/// let hits = index.search(&[3.0, 3.0], 1)?;
/// assert_eq!(hits[0].segment_id, 1);
/// assert_eq!(hits[0].distance, 1.0);
/// # Ok::<(), docqa_rag::RagError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    len: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Build a fresh index; row `i` holds `vectors[i]`.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] if `vectors` is empty.
    /// - [`RagError::DimensionMismatch`] if the vectors have differing
    ///   lengths, or zero length.
    pub fn build<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Self> {
        let first = vectors.first().ok_or(RagError::EmptyInput)?;
        let dimension = first.as_ref().len();
        if dimension == 0 {
            return Err(RagError::DimensionMismatch { expected: 1, actual: 0 });
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            let vector = vector.as_ref();
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch { expected: dimension, actual: vector.len() });
            }
            data.extend_from_slice(vector);
        }

        debug!(dimension, len = vectors.len(), "built flat L2 index");
        Ok(Self { dimension, len: vectors.len(), data })
    }

    /// Whether the index holds vectors and can be searched.
    pub fn is_built(&self) -> bool {
        self.len > 0
    }

    /// Vector dimension, or zero for an unbuilt index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The vector stored at `row`.
    pub fn vector(&self, row: usize) -> Option<&[f32]> {
        (row < self.len).then(|| &self.data[row * self.dimension..(row + 1) * self.dimension])
    }

    /// Return the `k` rows nearest to `query`, nearest first.
    ///
    /// Distances are squared Euclidean. Equal distances are ordered by row.
    /// Fewer than `k` rows are returned only when the index is smaller than `k`.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotBuilt`] if the index was never built.
    /// - [`RagError::DimensionMismatch`] if `query.len()` differs from the index dimension.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if !self.is_built() {
            return Err(RagError::NotBuilt);
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch { expected: self.dimension, actual: query.len() });
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(segment_id, row)| SearchHit { segment_id, distance: squared_l2(row, query) })
            .collect();

        hits.sort_by(|a, b| {
            a.distance.total_cmp(&b.distance).then_with(|| a.segment_id.cmp(&b.segment_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Serialize the index to the stable binary format.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotBuilt`] for an unbuilt index.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if !self.is_built() {
            return Err(RagError::NotBuilt);
        }
        let dimension = u32::try_from(self.dimension).map_err(|_| {
            RagError::IndexFormat(format!("dimension {} does not fit in u32", self.dimension))
        })?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * F32_LEN);
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&dimension.to_le_bytes());
        bytes.extend_from_slice(&(self.len as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Ok(bytes)
    }

    /// Decode an index produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexFormat`] if the magic, version, or length is wrong.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RagError::IndexFormat(format!(
                "file is {} bytes, shorter than the {HEADER_LEN}-byte header",
                bytes.len()
            )));
        }
        if bytes[0..4] != MAGIC {
            return Err(RagError::IndexFormat("missing DQVX magic".to_string()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(RagError::IndexFormat(format!("unsupported format version {version}")));
        }
        let dimension = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let len = u64::from_le_bytes([
            bytes[12], bytes[13], bytes[14], bytes[15], bytes[16], bytes[17], bytes[18], bytes[19],
        ]);
        if len == 0 || dimension == 0 {
            return Err(RagError::IndexFormat(format!(
                "header declares {len} vectors of dimension {dimension}"
            )));
        }

        let len = usize::try_from(len)
            .map_err(|_| RagError::IndexFormat(format!("vector count {len} is too large")))?;
        let expected = len
            .checked_mul(dimension)
            .and_then(|values| values.checked_mul(F32_LEN))
            .and_then(|body| body.checked_add(HEADER_LEN))
            .ok_or_else(|| RagError::IndexFormat("declared size overflows".to_string()))?;
        if bytes.len() != expected {
            return Err(RagError::IndexFormat(format!(
                "expected {expected} bytes for {len} vectors of dimension {dimension}, found {}",
                bytes.len()
            )));
        }

        let data = bytes[HEADER_LEN..]
            .chunks_exact(F32_LEN)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Self { dimension, len, data })
    }

    /// Write the index to `path`, replacing any existing file.
    ///
    /// The bytes go to a uniquely named temporary file in the same directory
    /// and are then renamed into place, so readers never see a partially
    /// written index and concurrent writers never share a temporary file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!(path = %path.display(), bytes = bytes.len(), "saved index");
        Ok(())
    }

    /// Read an index previously written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatL2Index {
        FlatL2Index::build(&[vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 2.0], vec![5.0, 5.0]])
            .unwrap()
    }

    #[test]
    fn build_rejects_empty_input() {
        let vectors: Vec<Vec<f32>> = Vec::new();
        assert!(matches!(FlatL2Index::build(&vectors), Err(RagError::EmptyInput)));
    }

    #[test]
    fn build_rejects_inconsistent_dimensions() {
        let err = FlatL2Index::build(&[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn build_rejects_zero_length_vectors() {
        let err = FlatL2Index::build(&[Vec::<f32>::new()]).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { actual: 0, .. }));
    }

    #[test]
    fn search_orders_by_squared_distance() {
        let hits = sample().search(&[0.9, 0.0], 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.segment_id).collect();
        assert_eq!(ids, [1, 0, 2]);
        assert!((hits[0].distance - 0.01).abs() < 1e-6);
        assert!((hits[1].distance - 0.81).abs() < 1e-6);
    }

    #[test]
    fn search_returns_everything_when_k_exceeds_len() {
        let hits = sample().search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 4);
        assert!(sample().search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_are_broken_by_row() {
        let index = FlatL2Index::build(&[vec![1.0], vec![-1.0], vec![1.0]]).unwrap();
        let ids: Vec<usize> = index.search(&[0.0], 3).unwrap().iter().map(|h| h.segment_id).collect();
        assert_eq!(ids, [0, 1, 2]);
    }

    #[test]
    fn search_checks_dimension_and_build_state() {
        assert!(matches!(
            sample().search(&[1.0, 2.0, 3.0], 1),
            Err(RagError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(matches!(FlatL2Index::default().search(&[1.0], 1), Err(RagError::NotBuilt)));
    }

    #[test]
    fn bytes_round_trip_exactly() {
        let index = FlatL2Index::build(&[vec![0.1, -0.0, f32::MIN_POSITIVE], vec![1e30, 2.5, -7.25]])
            .unwrap();
        let bytes = index.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], b"DQVX");
        assert_eq!(bytes.len(), HEADER_LEN + 6 * F32_LEN);

        let back = FlatL2Index::from_bytes(&bytes).unwrap();
        assert_eq!(back.dimension(), 3);
        assert_eq!(back.len(), 2);
        let bits = |i: &FlatL2Index| i.data.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&back), bits(&index));
    }

    #[test]
    fn from_bytes_rejects_bad_headers() {
        let bytes = sample().to_bytes().unwrap();

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        assert!(matches!(FlatL2Index::from_bytes(&wrong_magic), Err(RagError::IndexFormat(_))));

        let mut wrong_version = bytes.clone();
        wrong_version[4] = 9;
        assert!(matches!(FlatL2Index::from_bytes(&wrong_version), Err(RagError::IndexFormat(_))));

        let truncated = &bytes[..bytes.len() - 1];
        assert!(matches!(FlatL2Index::from_bytes(truncated), Err(RagError::IndexFormat(_))));

        assert!(matches!(FlatL2Index::from_bytes(b"DQ"), Err(RagError::IndexFormat(_))));
    }

    #[test]
    fn unbuilt_index_cannot_be_serialized() {
        assert!(matches!(FlatL2Index::default().to_bytes(), Err(RagError::NotBuilt)));
    }

    #[test]
    fn save_into_missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("docqa.index");
        assert!(matches!(sample().save(&path), Err(RagError::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn vector_accessor_returns_rows() {
        let index = sample();
        assert_eq!(index.vector(2), Some(&[0.0, 2.0][..]));
        assert_eq!(index.vector(4), None);
    }
}
