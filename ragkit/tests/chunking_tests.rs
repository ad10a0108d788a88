//! Property tests for chunk offsets and document coverage.

use proptest::prelude::*;
use ragkit::{Chunk, Chunker, Document, FixedSizeChunker, RecursiveChunker};

const SEPARATORS: [&str; 4] = [" ", "\n", "\n\n", "  "];

/// Text made of fixed-width, unique tokens (`w000`, `w001`, ...) joined by
/// assorted whitespace, so every chunk occurs exactly once in the document.
fn arb_document() -> impl Strategy<Value = String> {
    proptest::collection::vec(0usize..SEPARATORS.len(), 1..120).prop_map(|seps| {
        let mut text = String::new();
        for (i, sep) in seps.iter().enumerate() {
            if i > 0 {
                text.push_str(SEPARATORS[*sep]);
            }
            text.push_str(&format!("w{i:03}"));
        }
        text
    })
}

fn slice(text: &str, start: usize, len: usize) -> String {
    text.chars().skip(start).take(len).collect()
}

fn span(chunk: &Chunk) -> (usize, usize) {
    let start = chunk.start_index().unwrap();
    (start, start + chunk.text.chars().count())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn chunk_text_matches_document_at_start_index(
        text in arb_document(),
        chunk_size in 8usize..80,
        chunk_overlap in 0usize..8,
    ) {
        let document = Document::new("doc", text.clone());
        let chunks = RecursiveChunker::new(chunk_size, chunk_overlap).chunk(&document);

        prop_assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            let (start, end) = span(chunk);
            prop_assert_eq!(slice(&text, start, end - start), chunk.text.clone());
            prop_assert!(chunk.text.chars().count() <= chunk_size);
            prop_assert_eq!(chunk.chunk_index(), Some(i));
            prop_assert_eq!(chunk.document_id.as_str(), "doc");
        }
    }

    #[test]
    fn unstripped_chunks_cover_the_document_without_gaps(
        text in arb_document(),
        chunk_size in 8usize..80,
        chunk_overlap in 0usize..8,
    ) {
        let document = Document::new("doc", text.clone());
        let chunks = RecursiveChunker::new(chunk_size, chunk_overlap)
            .with_strip_whitespace(false)
            .chunk(&document);

        let spans: Vec<_> = chunks.iter().map(span).collect();
        prop_assert_eq!(spans[0].0, 0);
        prop_assert_eq!(spans[spans.len() - 1].1, text.chars().count());
        for pair in spans.windows(2) {
            prop_assert!(pair[1].0 <= pair[0].1, "gap between {:?} and {:?}", pair[0], pair[1]);
            prop_assert!(pair[1].0 > pair[0].0);
        }
    }

    #[test]
    fn stripped_chunks_lose_only_whitespace(
        text in arb_document(),
        chunk_size in 8usize..80,
        chunk_overlap in 0usize..8,
    ) {
        let document = Document::new("doc", text.clone());
        let chunks = RecursiveChunker::new(chunk_size, chunk_overlap).chunk(&document);

        let mut covered = vec![false; text.chars().count()];
        for chunk in &chunks {
            let (start, end) = span(chunk);
            covered[start..end].iter_mut().for_each(|c| *c = true);
        }
        for (c, covered) in text.chars().zip(covered) {
            prop_assert!(covered || c.is_whitespace(), "uncovered character {:?}", c);
        }
    }

    #[test]
    fn fixed_size_windows_overlap_exactly(
        text in "[a-zé ]{1,200}",
        chunk_size in 1usize..40,
        overlap_ratio in 0usize..10,
    ) {
        let chunk_overlap = chunk_size * overlap_ratio / 10;
        let document = Document::new("doc", text.clone());
        let chunks = FixedSizeChunker::new(chunk_size, chunk_overlap).chunk(&document);

        let step = chunk_size - chunk_overlap;
        for (i, chunk) in chunks.iter().enumerate() {
            let (start, end) = span(chunk);
            prop_assert_eq!(start, i * step);
            prop_assert_eq!(slice(&text, start, end - start), chunk.text.clone());
        }
        prop_assert_eq!(span(&chunks[chunks.len() - 1]).1, text.chars().count());
    }
}

#[test]
fn empty_document_has_no_chunks() {
    let document = Document::new("empty", "");
    assert!(RecursiveChunker::new(10, 2).chunk(&document).is_empty());
    assert!(FixedSizeChunker::new(10, 2).chunk(&document).is_empty());
}

#[test]
fn whitespace_only_document_has_no_chunks() {
    let document = Document::new("blank", " \n\n  \n");
    assert!(RecursiveChunker::new(10, 2).chunk(&document).is_empty());
}

#[test]
fn short_chunk_repeated_in_overlap_is_located_at_its_origin() {
    let text = "w000\nw001\n\nw002 w003  w004  w005  w006";
    let chunks = RecursiveChunker::new(8, 5)
        .with_strip_whitespace(false)
        .chunk(&Document::new("doc", text));

    let spans: Vec<_> = chunks.iter().map(span).collect();
    assert_eq!(spans[2], (9, 10));
    assert_eq!(chunks[2].text, "\n");
    for (chunk, (start, end)) in chunks.iter().zip(&spans) {
        assert_eq!(slice(text, *start, end - start), chunk.text);
    }
    assert!(spans.windows(2).all(|pair| pair[1].0 > pair[0].0));
}
