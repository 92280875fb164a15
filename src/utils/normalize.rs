//! Corpus normalization and chain windowing.
//!
//! Indexed text is confined to `[a-z0-9 ]`. Raw lines are normalized byte by
//! byte (ASCII-focused, like the rest of the corpus pipeline) and cut into
//! overlapping windows that each start at a word boundary. Every window is one
//! "chain" in the index, so a phrase of up to `window` bytes can be found by
//! walking from the index root.

/// The corpus alphabet in byte order
pub const ALPHABET: &[u8; ALPHABET_SIZE] = b" 0123456789abcdefghijklmnopqrstuvwxyz";

pub const ALPHABET_SIZE: usize = 37;

/// True if `byte` is part of the corpus alphabet
#[inline]
pub fn is_corpus_byte(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b' '
}

/// Position of `byte` in [`ALPHABET`]
#[inline]
pub fn symbol_index(byte: u8) -> Option<usize> {
    match byte {
        b' ' => Some(0),
        b'0'..=b'9' => Some(1 + (byte - b'0') as usize),
        b'a'..=b'z' => Some(11 + (byte - b'a') as usize),
        _ => None,
    }
}

/// Find the first byte outside the corpus alphabet, if any
pub fn find_invalid_byte(text: &[u8]) -> Option<(usize, u8)> {
    text.iter()
        .copied()
        .enumerate()
        .find(|&(_, b)| !is_corpus_byte(b))
}

/// Splits normalized text into word-start windows of bounded length
pub struct ChainSplitter {
    window: usize,
    buf: Vec<u8>,
}

impl ChainSplitter {
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            buf: Vec::with_capacity(window),
        }
    }

    /// Normalize a raw line and append its chains to `out`.
    ///
    /// Alphanumerics are lowercased, apostrophes vanish, and any other run
    /// of bytes collapses to a single space. Leading separators are dropped.
    pub fn split_raw(&mut self, line: &[u8], out: &mut Vec<String>) {
        self.buf.clear();
        for &byte in line {
            if self.buf.len() == self.window {
                self.emit(out);
            }

            if byte.is_ascii_alphanumeric() {
                self.buf.push(byte.to_ascii_lowercase());
            } else if byte != b'\'' && self.buf.last().is_some_and(|&b| b != b' ') {
                self.buf.push(b' ');
            }
        }
        self.drain(out);
    }

    /// Split an already-normalized record, which must contain only corpus
    /// bytes. Runs of spaces are collapsed and a trailing space is implied.
    pub fn split_normalized(&mut self, text: &[u8], out: &mut Vec<String>) {
        self.buf.clear();
        for &byte in text.iter().chain(std::iter::once(&b' ')) {
            if self.buf.len() == self.window {
                self.emit(out);
            }

            if byte != b' ' {
                self.buf.push(byte);
            } else if self.buf.last().is_some_and(|&b| b != b' ') {
                self.buf.push(b' ');
            }
        }
        self.drain(out);
    }

    fn drain(&mut self, out: &mut Vec<String>) {
        while !self.buf.is_empty() {
            self.emit(out);
        }
    }

    /// Emit the whole buffer as a chain, then drop its first word
    fn emit(&mut self, out: &mut Vec<String>) {
        // Only corpus bytes are ever pushed, so this is valid UTF-8
        out.push(self.buf.iter().map(|&b| b as char).collect());

        let cut = match memchr::memchr(b' ', &self.buf) {
            Some(space) => space + 1,
            None => self.buf.len(),
        };
        self.buf.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(text: &str, window: usize) -> Vec<String> {
        let mut out = Vec::new();
        ChainSplitter::new(window).split_raw(text.as_bytes(), &mut out);
        out
    }

    #[test]
    fn test_corpus_alphabet() {
        assert!(is_corpus_byte(b'a'));
        assert!(is_corpus_byte(b'9'));
        assert!(is_corpus_byte(b' '));
        assert!(!is_corpus_byte(b'A'));
        assert!(!is_corpus_byte(b'-'));
        assert_eq!(find_invalid_byte(b"ok text"), None);
        assert_eq!(find_invalid_byte(b"no-dash"), Some((2, b'-')));
    }

    #[test]
    fn test_symbol_index_matches_alphabet() {
        for (i, &b) in ALPHABET.iter().enumerate() {
            assert_eq!(symbol_index(b), Some(i));
        }
        assert_eq!(symbol_index(b'-'), None);
        assert!(ALPHABET.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_every_word_starts_a_chain() {
        let chains = raw("The quick fox\n", 40);
        assert_eq!(chains, vec!["the quick fox ", "quick fox ", "fox "]);
    }

    #[test]
    fn test_punctuation_collapses() {
        let chains = raw("Don't -- stop!!", 40);
        assert_eq!(chains, vec!["dont stop ", "stop "]);
    }

    #[test]
    fn test_leading_separators_dropped() {
        let chains = raw("  ...hello", 40);
        assert_eq!(chains, vec!["hello"]);
    }

    #[test]
    fn test_window_bounds_chain_length() {
        let chains = raw("aa bb cc dd", 6);
        assert!(chains.iter().all(|c| c.len() <= 6));
        assert_eq!(chains[0], "aa bb ");
        assert!(chains.contains(&"cc dd".to_string()));
    }

    #[test]
    fn test_long_word_is_dropped_after_emit() {
        let chains = raw("abcdefgh xy", 4);
        assert_eq!(chains[0], "abcd");
    }

    #[test]
    fn test_split_normalized_adds_trailing_space() {
        let mut out = Vec::new();
        ChainSplitter::new(40).split_normalized(b"barack  obama", &mut out);
        assert_eq!(out, vec!["barack obama ", "obama "]);
    }
}
