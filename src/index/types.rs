use crate::utils::AppConfig;
use serde::{Deserialize, Serialize};

/// Magic bytes at the start and end of every index file ("NMIX")
pub const INDEX_MAGIC: u32 = u32::from_le_bytes(*b"NMIX");

/// Current on-disk format version
pub const INDEX_VERSION: u32 = 1;

/// Magic + version
pub const HEADER_SIZE: usize = 8;

/// root + total + entry_count + node_count + magic + version
pub const FOOTER_SIZE: usize = 8 + 8 + 8 + 8 + 4 + 4;

/// Node tag for a single-child node with no terminal count
pub const TAG_CHAIN: u64 = 1;

/// Byte offset of a node in the index file
pub type NodeRef = u64;

/// Marker for a child with no node of its own (a leaf)
pub const NO_NODE: NodeRef = u64::MAX;

/// Label used for the synthetic choice that points at the root
pub const ROOT_LABEL: u8 = 0;

/// One labelled edge out of a trie node.
///
/// `count` is the number of occurrences of every text that passes through
/// this edge, so it is never less than the sum of the child's own choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub ch: u8,
    pub count: u64,
    pub next: NodeRef,
}

/// Index-wide totals, stored in the footer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub root: NodeRef,
    /// Sum of all entry counts
    pub total: u64,
    /// Number of distinct texts
    pub entry_count: u64,
    /// Number of nodes with their own record (leaves have none)
    pub node_count: u64,
}

/// A text and its occurrence count, as read back from an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub text: String,
    pub count: u64,
}

/// Knobs for building an index from running text
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Chains buffered before a shard is written
    pub chains_per_shard: usize,
    /// Maximum chain length in bytes
    pub history_window: usize,
    /// Count given to every chain of an article title
    pub title_multiplier: u32,
    /// Hide spinners
    pub quiet: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for BuildConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            chains_per_shard: config.chains_per_shard,
            history_window: config.history_window,
            title_multiplier: config.title_multiplier,
            quiet: false,
        }
    }
}

/// How the builder interprets its input lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Running text, possibly with article markers
    #[default]
    Raw,
    /// One already-normalized `text` or `count<TAB>text` per line
    Records,
}
