//! # Nutrimatic - Frequency-Ranked Pattern Search
//!
//! Nutrimatic finds the most common phrases in a text corpus that match a
//! pattern. The corpus is boiled down once into an index of every chain of
//! words with its occurrence count; queries then run a best-first search
//! over that index, so the most frequent matches come out first and a
//! search can be cut off at any point without losing what it already found.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`index`] - Index building, merging, reading and inspection
//! - [`query`] - Pattern parsing, automaton compilation and search
//! - [`output`] - Line protocol for search results
//! - [`error`] - Pattern and index error types
//! - [`utils`] - Configuration, varints, text normalization, progress
//!
//! ## Quick Start
//!
//! ```no_run
//! use nutrimatic::index::IndexReader;
//! use nutrimatic::query::{parse_pattern, Automaton, SearchDriver};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let reader = IndexReader::open(Path::new("wiki.index"))?;
//! let pattern = parse_pattern("<aaaabbckmor>")?.whole_words();
//! let automaton = Automaton::compile(&pattern, 250_000)?;
//!
//! let mut search = SearchDriver::new(&reader, &automaton, 1e-6);
//! while let Some(found) = search.next_match()? {
//!     println!("{} {}", found.score, found.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Index format
//!
//! An index is a single file holding a trie with children written before
//! their parents, so it can be produced in one streaming pass over sorted
//! input. Readers memory-map the file and decode nodes on demand; nothing
//! is ever written to an index after it is finished, so any number of
//! searches can share one file.

pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod utils;
