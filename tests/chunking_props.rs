//! Property tests for the chunking engine: determinism, bounded chunk size,
//! and full coverage of boundary-free text.

use proptest::prelude::*;

use ragline::chunking::ChunkingEngine;

proptest! {
    #[test]
    fn chunking_is_deterministic_for_any_input(
        text in "[a-z \\.\\n]{0,3000}",
        chunk_size in 50usize..500,
        overlap_pct in 0usize..80,
    ) {
        let overlap = chunk_size * overlap_pct / 100;
        let engine = ChunkingEngine::new(chunk_size, overlap).unwrap();
        prop_assert_eq!(engine.split(&text), engine.split(&text));
    }

    #[test]
    fn chunks_are_trimmed_nonempty_and_bounded(
        text in "[a-z \\.\\n]{0,3000}",
        chunk_size in 50usize..500,
        overlap_pct in 0usize..80,
    ) {
        let overlap = chunk_size * overlap_pct / 100;
        let engine = ChunkingEngine::new(chunk_size, overlap).unwrap();
        for chunk in engine.split(&text) {
            prop_assert!(!chunk.trim().is_empty());
            prop_assert!(chunk.len() <= chunk_size);
        }
    }

    #[test]
    fn boundary_free_text_reconstructs_exactly(
        text in "[a-z0-9]{0,2000}",
        chunk_size in 50usize..300,
        overlap_pct in 0usize..80,
    ) {
        // No '. ' or '\n\n' in the alphabet and no whitespace to trim, so
        // every cut is a hard cut and concatenation must recover the input.
        let overlap = chunk_size * overlap_pct / 100;
        let engine = ChunkingEngine::new(chunk_size, overlap).unwrap();
        let chunks = engine.split(&text);

        if text.is_empty() {
            prop_assert!(chunks.is_empty());
        } else {
            let mut rebuilt = chunks[0].clone();
            for chunk in &chunks[1..] {
                rebuilt.push_str(&chunk[overlap..]);
            }
            prop_assert_eq!(rebuilt, text);
        }
    }

    #[test]
    fn consecutive_chunks_overlap_by_at_most_the_overlap(
        text in "[a-z0-9]{0,2000}",
        chunk_size in 50usize..300,
        overlap_pct in 0usize..80,
    ) {
        let overlap = chunk_size * overlap_pct / 100;
        let engine = ChunkingEngine::new(chunk_size, overlap).unwrap();
        let chunks = engine.split(&text);
        for pair in chunks.windows(2) {
            // For hard cuts the shared region is exactly the configured
            // overlap (or the whole next chunk, if shorter).
            let shared = overlap.min(pair[1].len());
            prop_assert_eq!(&pair[0][pair[0].len() - shared..], &pair[1][..shared]);
        }
    }
}
