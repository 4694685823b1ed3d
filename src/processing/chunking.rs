//! Semantic chunking with a sliding overlap.
//!
//! Highlights:
//!
//! - Boundaries: `semchunk-rs` splits on the most meaningful separator available (blank lines,
//!   newlines, sentence punctuation, whitespace) and only cuts inside a word when a single word
//!   exceeds the budget.
//! - Overlap: each chunk after the first is prefixed with the tail of the previous segment,
//!   snapped to a word boundary when one exists inside the overlap window. Leading tail words
//!   are dropped when the joined chunk would still exceed the budget.
//! - Budget: segments are cut at `chunk_size - chunk_overlap` so that segment plus overlap never
//!   exceeds `chunk_size`.
//! - Length: measured in characters by default; `LengthUnit::Tokens` counts `cl100k_base`
//!   tokens through `tiktoken-rs` instead.

use semchunk_rs::Chunker;
use std::{ops::Range, sync::Arc};
use tiktoken_rs::cl100k_base;

use super::types::ChunkingError;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Unit used to measure chunk length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LengthUnit {
    /// Unicode scalar values.
    Characters,
    /// `cl100k_base` tokens.
    Tokens,
}

impl std::str::FromStr for LengthUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Chunk sizing policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkingOptions {
    /// Upper bound on the length of every emitted chunk.
    pub chunk_size: usize,
    /// Length of the tail carried from one chunk into the next.
    pub chunk_overlap: usize,
    /// Unit for both limits.
    pub length_unit: LengthUnit,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 350,
            chunk_overlap: 50,
            length_unit: LengthUnit::Characters,
        }
    }
}

/// Split document text into overlapping chunks.
///
/// Returns an empty vector when the text is empty or all whitespace.
pub fn chunk_text(text: &str, options: &ChunkingOptions) -> Result<Vec<String>, ChunkingError> {
    if options.chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if options.chunk_overlap >= options.chunk_size {
        return Err(ChunkingError::InvalidOverlap {
            overlap: options.chunk_overlap,
            chunk_size: options.chunk_size,
        });
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter = build_length_counter(options.length_unit)?;
    let segments = split_segments(
        text,
        options.chunk_size - options.chunk_overlap,
        counter.clone(),
    );
    Ok(apply_overlap(
        segments,
        options.chunk_size,
        options.chunk_overlap,
        &counter,
    ))
}

fn build_length_counter(unit: LengthUnit) -> Result<LengthCounter, ChunkingError> {
    match unit {
        LengthUnit::Characters => Ok(Arc::new(|segment: &str| segment.chars().count())),
        LengthUnit::Tokens => {
            let encoding = cl100k_base().map_err(|source| ChunkingError::Tokenizer {
                encoding: "cl100k_base".to_string(),
                source,
            })?;
            let encoding = Arc::new(encoding);
            Ok(Arc::new(move |segment: &str| {
                encoding.encode_ordinary(segment).len()
            }))
        }
    }
}

/// Split text into non-overlapping semantic segments no longer than `segment_size`.
///
/// `semchunk-rs` falls back to per-character splitting with byte offsets, which breaks on
/// multi-byte characters, so oversized non-ASCII runs without whitespace are cut here first.
fn split_segments(text: &str, segment_size: usize, counter: LengthCounter) -> Vec<String> {
    let runs = oversized_runs(text, segment_size, &counter);
    let chunker_counter = counter.clone();
    let chunker = Chunker::new(
        segment_size,
        Box::new(move |segment: &str| chunker_counter.as_ref()(segment)),
    );
    let semantic = |slice: &str| -> Vec<String> {
        if slice.trim().is_empty() {
            return Vec::new();
        }
        chunker
            .chunk(slice)
            .into_iter()
            .map(|segment| segment.trim().to_string())
            .filter(|segment| !segment.is_empty())
            .collect()
    };

    let mut segments = Vec::new();
    let mut cursor = 0;
    for run in runs {
        segments.extend(semantic(&text[cursor..run.start]));
        segments.extend(hard_cut(&text[run.clone()], segment_size, &counter));
        cursor = run.end;
    }
    segments.extend(semantic(&text[cursor..]));
    segments
}

/// Byte ranges of whitespace-free, non-ASCII runs longer than `limit`.
fn oversized_runs(text: &str, limit: usize, counter: &LengthCounter) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = None;
    let boundaries = text.char_indices().chain(std::iter::once((text.len(), ' ')));
    for (offset, c) in boundaries {
        if !c.is_whitespace() {
            if start.is_none() {
                start = Some(offset);
            }
            continue;
        }
        if let Some(begin) = start.take() {
            let run = &text[begin..offset];
            if !run.is_ascii() && counter.as_ref()(run) > limit {
                runs.push(begin..offset);
            }
        }
    }
    runs
}

/// Greedy cut on character boundaries into pieces within `limit`.
fn hard_cut(run: &str, limit: usize, counter: &LengthCounter) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (offset, c) in run.char_indices() {
        let next = offset + c.len_utf8();
        if end > start && counter.as_ref()(&run[start..next]) > limit {
            pieces.push(run[start..end].to_string());
            start = end;
        }
        end = next;
    }
    if end > start {
        pieces.push(run[start..end].to_string());
    }
    pieces
}

/// Prefix every segment after the first with a tail of its predecessor.
fn apply_overlap(
    segments: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    if overlap == 0 || segments.len() < 2 {
        return segments;
    }

    let mut chunks = Vec::with_capacity(segments.len());
    let mut previous: Option<&str> = None;
    for segment in &segments {
        let chunk = match previous {
            Some(prev) => build_overlapped_chunk(prev, segment, overlap, chunk_size, counter),
            None => segment.clone(),
        };
        chunks.push(chunk);
        previous = Some(segment);
    }
    chunks
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> String {
    // One unit is reserved for the joining space.
    let mut tail = overlap_tail(previous, overlap.saturating_sub(1), counter);
    // Token counts are not additive, so the joined chunk can still overflow.
    while !tail.is_empty() {
        let combined = format!("{tail} {current}");
        if counter.as_ref()(&combined) <= chunk_size {
            return combined;
        }
        tail = drop_leading_word(tail);
    }
    current.to_string()
}

fn drop_leading_word(text: &str) -> &str {
    match text.find(char::is_whitespace) {
        Some(boundary) => text[boundary..].trim_start(),
        None => "",
    }
}

/// Longest suffix of `text` within `limit`, snapped forward to a word start when possible.
fn overlap_tail<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    if limit == 0 {
        return "";
    }

    let text = text.trim_end();
    let start = text
        .char_indices()
        .map(|(offset, _)| offset)
        .find(|offset| counter.as_ref()(&text[*offset..]) <= limit)
        .unwrap_or(text.len());
    let tail = &text[start..];

    let starts_mid_word = text[..start]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace())
        && tail.chars().next().is_some_and(|c| !c.is_whitespace());
    if !starts_mid_word {
        return tail.trim_start();
    }

    match tail.find(char::is_whitespace) {
        Some(boundary) if !tail[boundary..].trim().is_empty() => tail[boundary..].trim_start(),
        // A single word fills the whole window; fall back to the hard cut.
        _ => tail,
    }
}
