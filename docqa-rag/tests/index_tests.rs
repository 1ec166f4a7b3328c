//! Property and persistence tests for the flat L2 index.

use docqa_rag::{FlatL2Index, RagError};
use proptest::prelude::*;

const DIM: usize = 8;

fn arb_vectors() -> impl Strategy<Value = Vec<Vec<f32>>> {
    proptest::collection::vec(proptest::collection::vec(-10.0f32..10.0, DIM), 1..40)
}

fn arb_query() -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-10.0f32..10.0, DIM)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn search_returns_min_k_n_sorted_by_distance(
        vectors in arb_vectors(),
        query in arb_query(),
        k in 0usize..50,
    ) {
        let index = FlatL2Index::build(&vectors).unwrap();
        let hits = index.search(&query, k).unwrap();

        prop_assert_eq!(hits.len(), k.min(vectors.len()));
        for pair in hits.windows(2) {
            prop_assert!(pair[0].distance <= pair[1].distance);
            if pair[0].distance == pair[1].distance {
                prop_assert!(pair[0].segment_id < pair[1].segment_id);
            }
        }
    }

    #[test]
    fn nearest_hit_is_the_true_minimum(vectors in arb_vectors(), query in arb_query()) {
        let index = FlatL2Index::build(&vectors).unwrap();
        let best = index.search(&query, 1).unwrap()[0];

        let brute = vectors
            .iter()
            .map(|v| v.iter().zip(&query).map(|(a, b)| (a - b) * (a - b)).sum::<f32>())
            .fold(f32::INFINITY, f32::min);
        prop_assert_eq!(best.distance, brute);
    }

    #[test]
    fn an_indexed_vector_finds_itself(vectors in arb_vectors(), pick in any::<prop::sample::Index>()) {
        let index = FlatL2Index::build(&vectors).unwrap();
        let row = pick.index(vectors.len());
        let best = index.search(&vectors[row], 1).unwrap()[0];
        prop_assert_eq!(best.distance, 0.0);
        prop_assert!(best.segment_id <= row);
    }
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docqa.index");

    let vectors: Vec<Vec<f32>> =
        vec![vec![0.5, -1.25, 3.0], vec![f32::MIN_POSITIVE, 0.0, -0.0], vec![9.0, 9.0, 9.0]];
    let index = FlatL2Index::build(&vectors).unwrap();
    index.save(&path).unwrap();

    let loaded = FlatL2Index::load(&path).unwrap();
    assert_eq!(loaded.dimension(), 3);
    assert_eq!(loaded.len(), 3);
    for row in 0..3 {
        let original: Vec<u32> = index.vector(row).unwrap().iter().map(|x| x.to_bits()).collect();
        let reloaded: Vec<u32> = loaded.vector(row).unwrap().iter().map(|x| x.to_bits()).collect();
        assert_eq!(original, reloaded);
    }

    let query = [1.0f32, 0.0, 2.0];
    assert_eq!(index.search(&query, 3).unwrap(), loaded.search(&query, 3).unwrap());
    assert_eq!(std::fs::read(&path).unwrap(), index.to_bytes().unwrap());
}

#[test]
fn save_overwrites_previous_file_without_leftovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docqa.index");

    FlatL2Index::build(&vec![vec![1.0f32; 4]; 10]).unwrap().save(&path).unwrap();
    FlatL2Index::build(&[vec![2.0f32; 2]]).unwrap().save(&path).unwrap();

    let loaded = FlatL2Index::load(&path).unwrap();
    assert_eq!((loaded.dimension(), loaded.len()), (2, 1));

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn truncated_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docqa.index");

    let bytes = FlatL2Index::build(&[vec![1.0f32, 2.0]]).unwrap().to_bytes().unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();

    assert!(matches!(FlatL2Index::load(&path), Err(RagError::IndexFormat(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = FlatL2Index::load(dir.path().join("absent.index")).unwrap_err();
    assert!(matches!(err, RagError::Io(_)));
}
