//! Budgeted search loop shared by every search subcommand.
//!
//! The runner owns pagination and the node budget. It never stops on a
//! timer: the only ways out are exhausting the index, reaching the requested
//! number of matches, or spending the node budget.

use crate::index::IndexReader;
use crate::query::filter::SearchFilter;
use crate::query::search::{Match, SearchDriver, Step};
use crate::utils::AppConfig;
use std::io;
use tracing::debug;

/// Pagination and budget for one search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Matches to skip before reporting
    pub start: u64,
    /// Matches to report; `None` for all
    pub num: Option<u64>,
    /// Nodes the search may expand; `None` for no limit
    pub max_nodes: Option<u64>,
    pub heartbeat_interval: u64,
    pub restart_penalty: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SearchOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            start: 0,
            num: None,
            max_nodes: config.max_nodes,
            heartbeat_interval: config.heartbeat_interval,
            restart_penalty: config.restart_penalty,
        }
    }
}

/// Receives the output of a search
pub trait ResultSink {
    fn on_match(&mut self, found: &Match) -> io::Result<()>;

    /// Cumulative nodes expanded so far
    fn on_heartbeat(&mut self, nodes: u64) -> io::Result<()>;
}

/// Why a search stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every reachable match was found
    Exhausted,
    /// The requested number of matches was reported
    Limit,
    /// The node budget ran out first
    BudgetExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: Outcome,
    pub nodes: u64,
    /// Matches passed to the sink (after skipping)
    pub emitted: u64,
}

/// Drive a search to completion, limit or budget.
///
/// Heartbeats go out every `heartbeat_interval` nodes, plus one final
/// heartbeat when the budget stops the search, so a caller always sees the
/// node count that was reached.
pub fn run_search<F, S>(
    reader: &IndexReader,
    filter: &F,
    options: &SearchOptions,
    sink: &mut S,
) -> anyhow::Result<RunSummary>
where
    F: SearchFilter + ?Sized,
    S: ResultSink + ?Sized,
{
    anyhow::ensure!(
        (0.0..=1.0).contains(&options.restart_penalty),
        "restart penalty {} is not within [0, 1]",
        options.restart_penalty
    );
    let mut driver = SearchDriver::new(reader, filter, options.restart_penalty);
    let interval = options.heartbeat_interval.max(1);
    let mut found = 0u64;
    let mut emitted = 0u64;
    let mut last_heartbeat = None;

    let outcome = loop {
        if options.num.is_some_and(|num| emitted >= num) {
            break Outcome::Limit;
        }
        if options.max_nodes.is_some_and(|max| driver.nodes() >= max) {
            if last_heartbeat != Some(driver.nodes()) {
                sink.on_heartbeat(driver.nodes())?;
            }
            break Outcome::BudgetExceeded;
        }

        let step = driver.step()?;
        if driver.nodes() % interval == 0 && last_heartbeat != Some(driver.nodes()) {
            sink.on_heartbeat(driver.nodes())?;
            last_heartbeat = Some(driver.nodes());
        }

        match step {
            Step::Match(m) => {
                found += 1;
                if found > options.start {
                    sink.on_match(&m)?;
                    emitted += 1;
                }
            }
            Step::Continue => {}
            Step::Exhausted => break Outcome::Exhausted,
        }
    };

    debug!(?outcome, nodes = driver.nodes(), found, emitted, "search finished");
    Ok(RunSummary {
        outcome,
        nodes: driver.nodes(),
        emitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::write_to_vec;
    use crate::query::automaton::Automaton;
    use crate::query::parser::parse_pattern;

    #[derive(Default)]
    struct Collect {
        matches: Vec<String>,
        heartbeats: Vec<u64>,
    }

    impl ResultSink for Collect {
        fn on_match(&mut self, found: &Match) -> io::Result<()> {
            self.matches.push(found.text.clone());
            Ok(())
        }

        fn on_heartbeat(&mut self, nodes: u64) -> io::Result<()> {
            self.heartbeats.push(nodes);
            Ok(())
        }
    }

    fn fixture() -> (IndexReader, Automaton) {
        let bytes = write_to_vec([
            ("bat ", 1),
            ("cat ", 8),
            ("hat ", 4),
            ("mat ", 2),
            ("rat ", 6),
        ])
        .unwrap();
        let reader = IndexReader::from_bytes(bytes).unwrap();
        let pattern = parse_pattern(".at").unwrap().whole_words();
        (reader, Automaton::compile(&pattern, 10_000).unwrap())
    }

    fn options() -> SearchOptions {
        SearchOptions {
            restart_penalty: 0.0,
            ..SearchOptions::default()
        }
    }

    #[test]
    fn test_restart_penalty_out_of_range_is_refused() {
        let (reader, automaton) = fixture();
        for restart_penalty in [5.0, -0.5, f64::INFINITY, f64::NAN] {
            let options = SearchOptions {
                restart_penalty,
                ..options()
            };
            let mut sink = Collect::default();
            assert!(run_search(&reader, &automaton, &options, &mut sink).is_err());
            assert!(sink.matches.is_empty());
        }
    }

    #[test]
    fn test_corrupt_node_stops_search_with_error() {
        let mut bytes = write_to_vec([("bat ", 1), ("cat ", 8), ("hat ", 4)]).unwrap();
        // First node record after the header
        bytes[crate::index::HEADER_SIZE] = 0x7f;
        let reader = IndexReader::from_bytes(bytes).unwrap();
        let pattern = parse_pattern(".at").unwrap().whole_words();
        let automaton = Automaton::compile(&pattern, 10_000).unwrap();

        let err = run_search(&reader, &automaton, &options(), &mut Collect::default()).unwrap_err();
        assert!(err.to_string().contains("corrupt index"), "{err}");
    }

    fn run(options: &SearchOptions) -> (RunSummary, Collect) {
        let (reader, automaton) = fixture();
        let mut sink = Collect::default();
        let summary = run_search(&reader, &automaton, options, &mut sink).unwrap();
        (summary, sink)
    }

    #[test]
    fn test_runs_to_exhaustion() {
        let (summary, sink) = run(&options());
        assert_eq!(summary.outcome, Outcome::Exhausted);
        assert_eq!(sink.matches, ["cat", "rat", "hat", "mat", "bat"]);
        assert!(sink.heartbeats.is_empty());
    }

    #[test]
    fn test_pagination_is_a_slice_of_the_full_run() {
        let (_, full) = run(&options());
        let (summary, page) = run(&SearchOptions {
            start: 1,
            num: Some(2),
            ..options()
        });
        assert_eq!(summary.outcome, Outcome::Limit);
        assert_eq!(summary.emitted, 2);
        assert_eq!(page.matches, &full.matches[1..3]);
    }

    #[test]
    fn test_zero_budget_reports_zero_nodes() {
        let (summary, sink) = run(&SearchOptions {
            max_nodes: Some(0),
            ..options()
        });
        assert_eq!(summary.outcome, Outcome::BudgetExceeded);
        assert!(sink.matches.is_empty());
        assert_eq!(sink.heartbeats, [0]);
    }

    #[test]
    fn test_heartbeats_are_periodic_and_not_repeated() {
        let (summary, sink) = run(&SearchOptions {
            max_nodes: Some(6),
            heartbeat_interval: 3,
            ..options()
        });
        assert_eq!(summary.outcome, Outcome::BudgetExceeded);
        assert_eq!(summary.nodes, 6);
        assert_eq!(sink.heartbeats, [3, 6]);
    }

    #[test]
    fn test_larger_budget_only_adds_matches() {
        let mut previous: Vec<String> = Vec::new();
        for budget in [0, 5, 10, 20, 100] {
            let (_, sink) = run(&SearchOptions {
                max_nodes: Some(budget),
                ..options()
            });
            assert!(sink.matches.starts_with(&previous), "budget {budget}");
            previous = sink.matches;
        }
        assert_eq!(previous.len(), 5);
    }
}
