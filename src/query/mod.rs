mod anagram;
pub mod automaton;
pub mod filter;
pub mod parser;
pub mod runner;
pub mod search;

pub use automaton::Automaton;
pub use filter::{AnagramFilter, PhoneFilter, SearchFilter};
pub use parser::{parse_pattern, CharSet, Pattern};
pub use runner::{run_search, Outcome, ResultSink, RunSummary, SearchOptions};
pub use search::{Match, SearchDriver, Step};
