//! Utility functions shared by the index and query layers.
//!
//! - [`app_data`] - Engine configuration (JSON, XDG config dir)
//! - [`encoding`] - Variable-length integer encoding (varint) and LE helpers
//! - [`normalize`] - Corpus alphabet checks and chain windowing
//! - [`progress`] - Spinners for the offline tools
//!
//! ```
//! use nutrimatic::utils::ChainSplitter;
//!
//! let mut chains = Vec::new();
//! ChainSplitter::new(40).split_raw(b"The quick fox\n", &mut chains);
//! assert_eq!(chains, ["the quick fox ", "quick fox ", "fox "]);
//! ```

pub mod app_data;
pub mod encoding;
pub mod normalize;
pub mod progress;

pub use app_data::*;
pub use encoding::*;
pub use normalize::*;
