//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`] - splits on a ranked list of separators, recursing
//!   into finer separators only for pieces that are still too long, then
//!   merges the pieces back into overlapping chunks
//! - [`FixedSizeChunker`] - a sliding character window with configurable overlap
//!
//! Both record `chunk_index` and `start_index` in each chunk's metadata. Offsets
//! are counted in characters (Unicode scalar values), not bytes.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RagConfig;
use crate::document::{CHUNK_INDEX_KEY, Chunk, Document, START_INDEX_KEY};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Where a matched separator ends up after splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeparatorPlacement {
    /// Kept at the start of the following piece.
    #[default]
    Start,
    /// Kept at the end of the preceding piece.
    End,
    /// Dropped; re-inserted between pieces when they are merged.
    Discard,
}

/// How chunk length is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    #[default]
    Characters,
    /// Whitespace-delimited words, a rough stand-in for model tokens.
    Words,
}

impl LengthUnit {
    fn measure(&self, text: &str) -> usize {
        match self {
            LengthUnit::Characters => text.chars().count(),
            LengthUnit::Words => text.split_whitespace().count(),
        }
    }
}

/// The separators tried by [`RecursiveChunker`] unless overridden: paragraphs,
/// lines, words, then single characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits text recursively on a ranked list of separators.
///
/// The first separator that occurs in the text is used to split it. Pieces
/// shorter than `chunk_size` are merged greedily into chunks; consecutive
/// chunks share up to `chunk_overlap` units of trailing pieces. A piece that
/// is too long is split again with the remaining, finer separators. When no
/// finer separator is left the piece is emitted whole, so `chunk_size` is a
/// soft ceiling.
///
/// # Example
///
/// ```rust
/// use ragkit::{Chunker, Document, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(7, 3);
/// let chunks = chunker.chunk(&Document::new("doc", "foo bar baz 123"));
///
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["foo bar", "baz", "123"]);
/// assert_eq!(chunks[1].start_index(), Some(8));
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
    placement: SeparatorPlacement,
    strip_whitespace: bool,
    add_start_index: bool,
    length_unit: LengthUnit,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` with the default separators.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum length of a chunk
    /// * `chunk_overlap` - maximum length shared by consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            placement: SeparatorPlacement::default(),
            strip_whitespace: true,
            add_start_index: true,
            length_unit: LengthUnit::default(),
        }
    }

    /// Build a chunker from the size, overlap and offset settings of `config`.
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap).with_start_index(config.add_start_index)
    }

    /// Replace the separator list, coarsest first.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_separator_placement(mut self, placement: SeparatorPlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Trim whitespace from both ends of every chunk (on by default).
    pub fn with_strip_whitespace(mut self, strip: bool) -> Self {
        self.strip_whitespace = strip;
        self
    }

    /// Record `start_index` in chunk metadata (on by default).
    pub fn with_start_index(mut self, enabled: bool) -> Self {
        self.add_start_index = enabled;
        self
    }

    pub fn with_length_unit(mut self, unit: LengthUnit) -> Self {
        self.length_unit = unit;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunk texts without building [`Chunk`]s.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_located(text).into_iter().map(|(_, text)| text).collect()
    }

    /// Chunk texts paired with the byte offset where each starts in `text`.
    fn split_located(&self, text: &str) -> Vec<(usize, String)> {
        self.split_recursive(Piece { start: 0, text }, &self.separators)
    }

    fn split_recursive(&self, piece: Piece<'_>, separators: &[String]) -> Vec<(usize, String)> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if piece.text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces = split_with_separator(piece, separator, self.placement);
        let merge_separator =
            if self.placement == SeparatorPlacement::Discard { separator } else { "" };

        let mut chunks = Vec::new();
        let mut pending: Vec<Piece<'_>> = Vec::new();
        for piece in pieces {
            if self.length_unit.measure(piece.text) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending, merge_separator));
                pending.clear();
            }
            if finer.is_empty() {
                warn!(
                    length = self.length_unit.measure(piece.text),
                    chunk_size = self.chunk_size,
                    "piece cannot be split further; emitting oversized chunk"
                );
                chunks.extend(self.finish(piece.start, piece.text.to_string()));
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending, merge_separator));
        }
        chunks
    }

    /// Greedily join pieces into chunks no longer than `chunk_size`, carrying
    /// up to `chunk_overlap` of trailing pieces into the next chunk.
    fn merge_pieces(&self, pieces: &[Piece<'_>], separator: &str) -> Vec<(usize, String)> {
        let separator_len = self.length_unit.measure(separator);
        let mut chunks = Vec::new();
        let mut current: Vec<Piece<'_>> = Vec::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = self.length_unit.measure(piece.text);
            let joined_len = |total: usize, current: &[Piece<'_>]| {
                total + len + if current.is_empty() { 0 } else { separator_len }
            };

            if joined_len(total, &current) > self.chunk_size {
                if total > self.chunk_size {
                    warn!(length = total, chunk_size = self.chunk_size, "created oversized chunk");
                }
                if let Some(first) = current.first() {
                    chunks.extend(self.finish(first.start, join(&current, separator)));
                    while total > self.chunk_overlap
                        || (joined_len(total, &current) > self.chunk_size && total > 0)
                    {
                        let head = self.length_unit.measure(current[0].text);
                        total -= head + if current.len() > 1 { separator_len } else { 0 };
                        current.remove(0);
                    }
                }
            }

            current.push(piece);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        if let Some(first) = current.first() {
            chunks.extend(self.finish(first.start, join(&current, separator)));
        }
        chunks
    }

    /// Apply whitespace stripping, moving `start` past any trimmed prefix.
    fn finish(&self, start: usize, text: String) -> Option<(usize, String)> {
        let (start, text) = if self.strip_whitespace {
            let trimmed = text.trim_start();
            (start + text.len() - trimmed.len(), trimmed.trim_end().to_string())
        } else {
            (start, text)
        };
        (!text.is_empty()).then_some((start, text))
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        Self::from_config(&RagConfig::default())
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        let located = self.split_located(&document.text);
        debug!(document.id = %document.id, chunk_count = located.len(), "split document");

        let boundaries = self.add_start_index.then(|| CharBoundaries::new(&document.text));
        located
            .into_iter()
            .enumerate()
            .map(|(i, (byte, text))| {
                let start = boundaries.as_ref().map(|b| b.char_index(byte));
                build_chunk(document, i, text, start)
            })
            .collect()
    }
}

/// Splits text into fixed-size windows by character count with configurable overlap.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus `chunk_index` and `start_index` fields.
///
/// # Example
///
/// ```rust
/// use ragkit::{Chunker, Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(4, 1);
/// let chunks = chunker.chunk(&Document::new("doc", "abcdefghij"));
/// let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
/// assert_eq!(texts, ["abcd", "defg", "ghij"]);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() || self.chunk_size == 0 {
            return Vec::new();
        }

        let boundaries = CharBoundaries::new(&document.text);
        let char_count = boundaries.char_count();
        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            let text = boundaries.slice(&document.text, start, end).to_string();
            chunks.push(build_chunk(document, chunks.len(), text, Some(start)));
            if end == char_count {
                break;
            }
            start += step;
        }

        chunks
    }
}

fn build_chunk(document: &Document, index: usize, text: String, start: Option<usize>) -> Chunk {
    let mut metadata = document.metadata.clone();
    metadata.insert(CHUNK_INDEX_KEY.to_string(), index.into());
    if let Some(start) = start {
        metadata.insert(START_INDEX_KEY.to_string(), start.into());
    }
    Chunk {
        id: format!("{}_{index}", document.id),
        text,
        metadata,
        document_id: document.id.clone(),
    }
}

/// A slice of the document together with the byte offset where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Piece<'a> {
    start: usize,
    text: &'a str,
}

fn join(pieces: &[Piece<'_>], separator: &str) -> String {
    pieces.iter().map(|p| p.text).collect::<Vec<_>>().join(separator)
}

/// Split `piece` on every occurrence of `separator`, dropping empty pieces.
///
/// An empty separator splits into single characters.
fn split_with_separator<'a>(
    piece: Piece<'a>,
    separator: &str,
    placement: SeparatorPlacement,
) -> Vec<Piece<'a>> {
    let Piece { start: base, text } = piece;
    let at = move |from: usize, to: usize| Piece { start: base + from, text: &text[from..to] };

    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| at(i, i + c.len_utf8())).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, matched) in text.match_indices(separator) {
        match placement {
            SeparatorPlacement::Start => {
                pieces.push(at(start, pos));
                start = pos;
            }
            SeparatorPlacement::End => {
                pieces.push(at(start, pos + matched.len()));
                start = pos + matched.len();
            }
            SeparatorPlacement::Discard => {
                pieces.push(at(start, pos));
                start = pos + matched.len();
            }
        }
    }
    pieces.push(at(start, text.len()));
    pieces.retain(|piece| !piece.text.is_empty());
    pieces
}

/// Byte offsets of every character boundary in a string, for converting
/// between character and byte positions.
struct CharBoundaries(Vec<usize>);

impl CharBoundaries {
    fn new(text: &str) -> Self {
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());
        Self(offsets)
    }

    fn char_count(&self) -> usize {
        self.0.len() - 1
    }

    fn byte_offset(&self, char_index: usize) -> usize {
        self.0[char_index.min(self.char_count())]
    }

    /// Character index of the boundary at byte offset `byte`.
    fn char_index(&self, byte: usize) -> usize {
        self.0.partition_point(|&b| b < byte)
    }

    fn slice<'a>(&self, text: &'a str, start: usize, end: usize) -> &'a str {
        &text[self.byte_offset(start)..self.byte_offset(end)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED_TEXT: &str = "Hi.\n\nI'm Harrison.\n\nHow? Are? You?\nOkay then f f f f.\n\
        This is a weird text to write, but gotta test the splittingggg some how.\n\nBye!\n\n-H.";

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn splits_mixed_paragraph_text() {
        let chunker = RecursiveChunker::new(10, 1);
        assert_eq!(
            chunker.split_text(MIXED_TEXT),
            vec![
                "Hi.", "I'm", "Harrison.", "How? Are?", "You?", "Okay then", "f f f f.",
                "This is a", "weird", "text to", "write,", "but gotta", "test the", "splitting",
                "gggg", "some how.", "Bye!", "-H.",
            ]
        );
    }

    #[test]
    fn records_start_offsets() {
        let chunks = RecursiveChunker::new(10, 1).chunk(&Document::new("doc", MIXED_TEXT));
        let starts: Vec<_> = chunks.iter().take(6).map(|c| c.start_index().unwrap()).collect();
        assert_eq!(starts, vec![0, 5, 9, 20, 30, 35]);
        for chunk in &chunks {
            let start = chunk.start_index().unwrap();
            let len = chunk.text.chars().count();
            let slice: String = MIXED_TEXT.chars().skip(start).take(len).collect();
            assert_eq!(slice, chunk.text);
        }
    }

    #[test]
    fn overlapping_windows_resolve_offsets() {
        let text = "The quick brown fox jumps over the lazy dog. The quick brown fox.";
        let chunks = RecursiveChunker::new(20, 5).chunk(&Document::new("doc", text));
        let located: Vec<_> =
            chunks.iter().map(|c| (c.start_index().unwrap(), c.text.as_str())).collect();
        assert_eq!(
            located,
            vec![
                (0, "The quick brown fox"),
                (16, "fox jumps over the"),
                (31, "the lazy dog. The"),
                (45, "The quick brown"),
                (61, "fox."),
            ]
        );
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let chunks =
            RecursiveChunker::new(3, 1).chunk(&Document::new("doc", "héllo wörld ünï"));
        let located: Vec<_> =
            chunks.iter().map(|c| (c.start_index().unwrap(), c.text.as_str())).collect();
        assert_eq!(
            located,
            vec![
                (0, "hél"),
                (2, "llo"),
                (6, "wö"),
                (7, "örl"),
                (9, "ld"),
                (12, "ün"),
                (13, "nï"),
            ]
        );
    }

    #[test]
    fn separator_placement_changes_merging() {
        let text = "one two three four five six";
        let discard = RecursiveChunker::new(10, 0)
            .with_separators([" "])
            .with_separator_placement(SeparatorPlacement::Discard);
        assert_eq!(discard.split_text(text), vec!["one two", "three four", "five six"]);

        let end = RecursiveChunker::new(10, 0)
            .with_separators([" "])
            .with_separator_placement(SeparatorPlacement::End);
        assert_eq!(end.split_text(text), vec!["one two", "three", "four five", "six"]);

        let overlapping = RecursiveChunker::new(10, 4)
            .with_separators([" "])
            .with_separator_placement(SeparatorPlacement::Discard);
        assert_eq!(
            overlapping.split_text(text),
            vec!["one two", "two three", "four five", "five six"]
        );
    }

    #[test]
    fn indivisible_piece_is_kept_whole() {
        let chunker = RecursiveChunker::new(5, 0).with_separators([" "]);
        assert_eq!(
            chunker.split_text("a bb supercalifragilistic c"),
            vec!["a bb", "supercalifragilistic", "c"]
        );
    }

    #[test]
    fn chunks_inherit_metadata_and_ids() {
        let doc = Document::new("post", "alpha beta gamma delta").with_metadata("source", "blog");
        let chunks = RecursiveChunker::new(12, 0).chunk(&doc);
        assert_eq!(texts(&chunks), vec!["alpha beta", "gamma delta"]);
        assert_eq!(chunks[1].id, "post_1");
        assert_eq!(chunks[1].document_id, "post");
        assert_eq!(chunks[1].chunk_index(), Some(1));
        assert_eq!(chunks[1].metadata["source"], "blog");
    }

    #[test]
    fn start_index_can_be_disabled() {
        let chunks = RecursiveChunker::new(7, 3)
            .with_start_index(false)
            .chunk(&Document::new("doc", "foo bar baz 123"));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.start_index().is_none()));
    }

    #[test]
    fn word_lengths_count_whitespace_tokens() {
        let chunker = RecursiveChunker::new(3, 0)
            .with_separators([" "])
            .with_separator_placement(SeparatorPlacement::Discard)
            .with_length_unit(LengthUnit::Words);
        let chunks = chunker.chunk(&Document::new("doc", "a b c d e f g"));
        assert_eq!(texts(&chunks), vec!["a b c", "d e f", "g"]);
        assert_eq!(chunks[2].start_index(), Some(12));
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(RecursiveChunker::new(10, 2).chunk(&Document::new("doc", "")).is_empty());
        assert!(RecursiveChunker::new(10, 2).chunk(&Document::new("doc", " \n\n ")).is_empty());
        assert!(FixedSizeChunker::new(10, 2).chunk(&Document::new("doc", "")).is_empty());
    }

    #[test]
    fn fixed_size_windows_are_char_safe() {
        let chunks = FixedSizeChunker::new(3, 1).chunk(&Document::new("doc", "añbçdé"));
        assert_eq!(texts(&chunks), vec!["añb", "bçd", "dé"]);
        let starts: Vec<_> = chunks.iter().map(|c| c.start_index().unwrap()).collect();
        assert_eq!(starts, vec![0, 2, 4]);
    }

    #[test]
    fn short_chunk_inside_overlap_keeps_its_own_offset() {
        let text = "w000\nw001\n\nw002 w003  w004  w005  w006";
        let chunks = RecursiveChunker::new(8, 5)
            .with_strip_whitespace(false)
            .chunk(&Document::new("doc", text));
        let located: Vec<_> =
            chunks.iter().map(|c| (c.start_index().unwrap(), c.text.as_str())).collect();
        assert_eq!(
            located,
            vec![
                (0, "w000"),
                (4, "\nw001"),
                (9, "\n"),
                (10, "\nw002"),
                (15, " w003 "),
                (20, "  w004 "),
                (26, "  w005 "),
                (32, "  w006"),
            ]
        );

        let stripped = RecursiveChunker::new(8, 5).chunk(&Document::new("doc", text));
        let starts: Vec<_> = stripped.iter().map(|c| c.start_index().unwrap()).collect();
        assert_eq!(starts, vec![0, 5, 11, 16, 22, 28, 34]);
    }

    #[test]
    fn separator_split_keeps_or_drops_matches() {
        fn split<'a>(
            text: &'a str,
            separator: &str,
            placement: SeparatorPlacement,
        ) -> Vec<(usize, &'a str)> {
            split_with_separator(Piece { start: 10, text }, separator, placement)
                .into_iter()
                .map(|p| (p.start, p.text))
                .collect()
        }
        assert_eq!(
            split("a-b-c", "-", SeparatorPlacement::Start),
            vec![(10, "a"), (11, "-b"), (13, "-c")]
        );
        assert_eq!(
            split("a-b-c", "-", SeparatorPlacement::End),
            vec![(10, "a-"), (12, "b-"), (14, "c")]
        );
        assert_eq!(split("-a--b-", "-", SeparatorPlacement::Discard), vec![(11, "a"), (14, "b")]);
        assert_eq!(split("añ", "", SeparatorPlacement::Start), vec![(10, "a"), (11, "ñ")]);
    }
}
