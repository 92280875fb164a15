use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nutrimatic::error::PatternError;
use nutrimatic::index::{
    build_index, inspect, merge_indexes, stats, BuildConfig, IndexReader, InputMode, MergeOptions,
};
use nutrimatic::output::LineEmitter;
use nutrimatic::query::{
    parse_pattern, run_search, AnagramFilter, Automaton, Outcome, PhoneFilter, SearchFilter,
    SearchOptions,
};
use nutrimatic::utils::AppConfig;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nutrimatic")]
#[command(version, about = "Frequency-ranked pattern search over a text corpus")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine config file (JSON); defaults to the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more to stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Hide progress spinners
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build index shards from text on stdin
    MakeIndex {
        /// Shards are written to <PREFIX>.NNNNN.index
        prefix: PathBuf,

        /// Read this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Input is normalized `text` or `count<TAB>text` records
        #[arg(long)]
        records: bool,

        /// Merge the shards into OUTPUT and remove them
        #[arg(long, value_name = "OUTPUT")]
        merge: Option<PathBuf>,
    },
    /// Merge index files, summing the counts of equal texts
    MergeIndexes {
        /// Indexes to merge
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// New index to write (must not exist)
        #[arg(short, long)]
        output: PathBuf,

        /// Drop entries whose merged count is below this
        #[arg(long, default_value_t = 1)]
        min_count: u64,

        /// Keep only whole words by cutting entries at their last space
        #[arg(long)]
        whole_words: bool,
    },
    /// Print every entry as `count [text]`
    DumpIndex {
        index: PathBuf,
    },
    /// Walk the index along a prefix, then by descending count
    ExploreIndex {
        index: PathBuf,

        /// Literal prefix to follow from the root
        #[arg(default_value = "")]
        path: String,

        /// Levels to print below the root (default: length of PATH)
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        depth: Option<u64>,
    },
    /// Show index statistics
    IndexStats {
        index: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find phrases matching a pattern
    FindExpr {
        index: PathBuf,
        expr: String,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Find phrases that are anagrams of some letters
    FindAnagrams {
        index: PathBuf,
        letters: String,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Find phrases spelled by a phone number on a keypad
    FindPhoneWords {
        index: PathBuf,
        digits: String,
        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Skip this many matches before printing
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Stop after printing this many matches
    #[arg(long)]
    num: Option<u64>,

    /// Give up after expanding this many search nodes
    #[arg(long)]
    max_nodes: Option<u64>,

    /// Score multiplier for continuing a phrase past a chain, within [0, 1]
    /// (0 disables)
    #[arg(long, value_parser = parse_restart)]
    restart: Option<f64>,
}

/// Above 1 a restart would outscore the text it continues
fn parse_restart(value: &str) -> Result<f64, String> {
    let restart: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&restart) {
        Ok(restart)
    } else {
        Err(format!("{value} is not within [0, 1]"))
    }
}

impl SearchArgs {
    fn options(&self, config: &AppConfig) -> SearchOptions {
        let mut options = SearchOptions::from(config);
        options.start = self.start;
        options.num = self.num;
        if self.max_nodes.is_some() {
            options.max_nodes = self.max_nodes;
        }
        if let Some(restart) = self.restart {
            options.restart_penalty = restart;
        }
        options
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if is_broken_pipe(&e) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            if e.downcast_ref::<PatternError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Log to stderr; stdout carries results only
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// A reader closing the pipe early is a normal way to stop a search
fn is_broken_pipe(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    debug!(?config, "loaded config");

    match cli.command {
        Commands::MakeIndex {
            prefix,
            input,
            records,
            merge,
        } => {
            let reader: Box<dyn BufRead> = match &input {
                Some(path) => Box::new(BufReader::new(
                    File::open(path).with_context(|| format!("can't open {}", path.display()))?,
                )),
                None => Box::new(io::stdin().lock()),
            };
            let build = BuildConfig {
                quiet: cli.quiet,
                ..BuildConfig::from(&config)
            };
            let mode = if records {
                InputMode::Records
            } else {
                InputMode::Raw
            };
            let summary = build_index(reader, &prefix, build, mode, merge.as_deref())?;
            if let Some(merged) = &merge {
                info!(shards = summary.shards.len(), "merged into {}", merged.display());
            }
        }
        Commands::MergeIndexes {
            inputs,
            output,
            min_count,
            whole_words,
        } => {
            let options = MergeOptions {
                min_count,
                whole_words,
                quiet: cli.quiet,
            };
            let summary = merge_indexes(inputs.as_slice(), &output, &options)?;
            info!(
                entries = summary.entry_count,
                total = summary.total,
                "wrote {}",
                output.display()
            );
        }
        Commands::DumpIndex { index } => {
            let reader = IndexReader::open(&index)?;
            inspect::dump_index(&reader, &mut BufWriter::new(io::stdout().lock()))?;
        }
        Commands::ExploreIndex { index, path, depth } => {
            let reader = IndexReader::open(&index)?;
            let depth = depth.map(|d| d as usize);
            inspect::explore_index(&reader, path.as_bytes(), depth, &mut io::stdout().lock())?;
        }
        Commands::IndexStats { index, json } => {
            stats::show_stats(&index, json, &mut io::stdout().lock())?;
        }
        Commands::FindExpr {
            index,
            expr,
            search,
        } => {
            let pattern = parse_pattern(&expr)?.whole_words();
            let automaton = Automaton::compile(&pattern, config.max_automaton_states)?;
            debug!(states = automaton.num_states(), "compiled {expr:?}");
            find(&index, &automaton, &search.options(&config))?;
        }
        Commands::FindAnagrams {
            index,
            letters,
            search,
        } => {
            let filter = AnagramFilter::new(&letters)?;
            find(&index, &filter, &search.options(&config))?;
        }
        Commands::FindPhoneWords {
            index,
            digits,
            search,
        } => {
            let filter = PhoneFilter::new(&digits)?;
            find(&index, &filter, &search.options(&config))?;
        }
    }

    Ok(())
}

fn find(index: &Path, filter: &dyn SearchFilter, options: &SearchOptions) -> Result<()> {
    let reader = IndexReader::open(index)?;
    let mut emitter = LineEmitter::new(io::stdout().lock());
    let summary = run_search(&reader, filter, options, &mut emitter)?;
    if summary.outcome == Outcome::BudgetExceeded {
        info!(nodes = summary.nodes, "node budget spent");
    }
    Ok(())
}
