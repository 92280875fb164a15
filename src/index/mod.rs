pub mod build;
pub mod inspect;
pub mod merge;
pub mod reader;
pub mod stats;
pub mod types;
pub mod walker;
pub mod writer;

pub use build::{build_index, IndexBuilder};
pub use merge::{merge_indexes, MergeOptions};
pub use reader::IndexReader;
pub use types::*;
pub use walker::IndexWalker;
pub use writer::IndexWriter;
