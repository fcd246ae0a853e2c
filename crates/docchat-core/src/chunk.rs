//! Fixed-window text chunker.
//!
//! Splits extracted document text into overlapping windows of at most
//! `window` characters. Windows start at offset 0 and advance by
//! `window - overlap` characters, so consecutive chunks share `overlap`
//! characters of context.
//!
//! # Algorithm
//!
//! 1. Take the characters `[start, start + window)`.
//! 2. Keep the window if it is not blank after trimming.
//! 3. Stop once the window reached the end of the text; otherwise advance
//!    `start` by `window - overlap` and repeat.
//!
//! Lengths are measured in Unicode scalar values, never bytes, so a window
//! never splits a multi-byte character.
//!
//! # Example
//!
//! ```rust
//! use docchat_core::chunk::{split_windows, ChunkParams};
//!
//! let params = ChunkParams::new(4, 1).unwrap();
//! assert_eq!(split_windows("abcdefghij", &params), vec!["abcd", "defg", "ghij"]);
//! ```

use thiserror::Error;

use crate::models::Chunk;

/// Default window size in characters.
pub const DEFAULT_WINDOW: usize = 1000;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_OVERLAP: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk window must be > 0")]
    EmptyWindow,
    #[error("chunk overlap ({overlap}) must be smaller than the window ({window})")]
    OverlapTooLarge { window: usize, overlap: usize },
}

/// Validated window/overlap pair.
///
/// Construction fails when the window would never advance, which would
/// otherwise loop forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    window: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(window: usize, overlap: usize) -> Result<Self, ChunkError> {
        if window == 0 {
            return Err(ChunkError::EmptyWindow);
        }
        if overlap >= window {
            return Err(ChunkError::OverlapTooLarge { window, overlap });
        }
        Ok(Self { window, overlap })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn step(&self) -> usize {
        self.window - self.overlap
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Split `text` into overlapping windows.
///
/// Returns an empty vector for empty or whitespace-only input. Windows are
/// returned untrimmed; only the blank check uses trimming.
pub fn split_windows<'a>(text: &'a str, params: &ChunkParams) -> Vec<&'a str> {
    // Byte offset of every char boundary, plus the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut windows = Vec::new();
    let mut start = 0;
    while start < char_len {
        let end = (start + params.window).min(char_len);
        let window = &text[bounds[start]..bounds[end]];
        if !window.trim().is_empty() {
            windows.push(window);
        }
        if end == char_len {
            break;
        }
        start += params.step();
    }
    windows
}

/// Split a document's text into [`Chunk`]s tagged with its owner.
///
/// Chunk indices are contiguous from 0 and count only the windows that
/// were kept.
pub fn chunk_text(document_id: &str, user_id: &str, text: &str, params: &ChunkParams) -> Vec<Chunk> {
    split_windows(text, params)
        .into_iter()
        .enumerate()
        .map(|(i, window)| Chunk {
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            chunk_index: i as i64,
            text: window.to_string(),
        })
        .collect()
}

/// Truncate `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(window: usize, overlap: usize) -> ChunkParams {
        ChunkParams::new(window, overlap).unwrap()
    }

    #[test]
    fn test_exact_windows() {
        let chunks = split_windows("abcdefghij", &params(4, 1));
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_trailing_partial_window_kept() {
        let chunks = split_windows("abcdefghijk", &params(4, 1));
        assert_eq!(chunks, vec!["abcd", "defg", "ghij", "jk"]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(split_windows("", &ChunkParams::default()).is_empty());
        assert!(split_windows("   \n\t  \n", &ChunkParams::default()).is_empty());
    }

    #[test]
    fn test_blank_windows_skipped() {
        let text = format!("{}{}", "a".repeat(4), " ".repeat(8));
        let chunks = split_windows(&text, &params(4, 0));
        assert_eq!(chunks, vec!["aaaa"]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_windows("Hello, world!", &ChunkParams::default());
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn test_windows_bounded_and_cover_text() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let p = params(1000, 200);
        let chunks = split_windows(&text, &p);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.chars().count() <= 1000);
        }
        // Each window starts step chars after the previous one.
        let mut rebuilt = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                rebuilt.push_str(c);
            } else {
                rebuilt.extend(c.chars().skip(200));
            }
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_multibyte_characters() {
        let text = "┌──┐│héllo│└──┘";
        let chunks = split_windows(text, &params(5, 2));
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= 5);
        }
        assert!(chunks[0].starts_with('┌'));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert_eq!(ChunkParams::new(0, 0), Err(ChunkError::EmptyWindow));
        assert!(matches!(
            ChunkParams::new(100, 100),
            Err(ChunkError::OverlapTooLarge { .. })
        ));
        assert!(ChunkParams::new(100, 150).is_err());
    }

    #[test]
    fn test_chunk_text_tags_owner_and_indices() {
        let chunks = chunk_text("doc-1", "user-1", "abcdefghij", &params(4, 1));
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.document_id, "doc-1");
            assert_eq!(c.user_id, "user-1");
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
