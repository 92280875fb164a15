use crate::error::{IndexError, IndexResult};
use crate::index::merge::{merge_indexes, MergeOptions};
use crate::index::types::{BuildConfig, InputMode};
use crate::index::writer::IndexWriter;
use crate::utils::progress::{spinner, ProgressBar};
use crate::utils::{find_invalid_byte, ChainSplitter};
use rayon::prelude::*;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ARTICLE_BEGIN: &[u8] = b"BEGIN ARTICLE:";
const ARTICLE_END: &[u8] = b"END ARTICLE:";
const DOC_BEGIN: &[u8] = b"<doc ";
const DOC_END: &[u8] = b"</doc>";

/// What a build produced
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub shards: Vec<PathBuf>,
    pub chains: u64,
    pub lines: u64,
}

/// Accumulates chains from input lines and writes them out as sorted
/// index shards named `<prefix>.NNNNN.index`.
pub struct IndexBuilder {
    config: BuildConfig,
    prefix: PathBuf,
    splitter: ChainSplitter,
    chains: Vec<(String, u64)>,
    scratch: Vec<String>,
    summary: BuildSummary,
    title_next: bool,
    progress: ProgressBar,
}

impl IndexBuilder {
    pub fn new(prefix: &Path, config: BuildConfig) -> Self {
        let progress = spinner("Collecting chains", config.quiet);
        Self {
            splitter: ChainSplitter::new(config.history_window),
            chains: Vec::with_capacity(config.chains_per_shard.min(1 << 20)),
            prefix: prefix.to_path_buf(),
            scratch: Vec::new(),
            summary: BuildSummary::default(),
            title_next: false,
            progress,
            config,
        }
    }

    /// Add a line of running text.
    ///
    /// Understands two article markup styles: `BEGIN ARTICLE:`/`END ARTICLE:`
    /// lines, and `<doc ...>`/`</doc>` lines where the line after `<doc` is
    /// the title. Titles are counted `title_multiplier` times.
    pub fn add_raw_line(&mut self, line: &[u8]) -> IndexResult<()> {
        self.summary.lines += 1;

        if let Some(title) = line.strip_prefix(ARTICLE_BEGIN) {
            self.split_raw(title, u64::from(self.config.title_multiplier));
        } else if line.starts_with(DOC_BEGIN) {
            self.title_next = true;
        } else if self.title_next {
            self.title_next = false;
            self.split_raw(line, u64::from(self.config.title_multiplier));
        } else if !line.starts_with(ARTICLE_END) && !line.starts_with(DOC_END) {
            self.split_raw(line, 1);
        }

        self.flush_if_full()
    }

    /// Add one already-normalized record: `text` or `count<TAB>text`.
    /// Blank lines are skipped.
    pub fn add_record(&mut self, line: &[u8]) -> IndexResult<()> {
        self.summary.lines += 1;
        let line_no = self.summary.lines;

        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            return Ok(());
        }

        let (count, text) = match memchr::memchr(b'\t', line) {
            Some(tab) => {
                let count = std::str::from_utf8(&line[..tab])
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|&n| n > 0)
                    .ok_or_else(|| IndexError::MalformedRecord {
                        line: line_no,
                        message: "count must be a positive integer".into(),
                    })?;
                (count, &line[tab + 1..])
            }
            None => (1, line),
        };

        if let Some((_, byte)) = find_invalid_byte(text) {
            return Err(IndexError::InvalidRecord {
                line: line_no,
                byte,
            });
        }

        self.scratch.clear();
        self.splitter.split_normalized(text, &mut self.scratch);
        self.take_scratch(count);
        self.flush_if_full()
    }

    /// Feed every line of `input` in the given mode
    pub fn add_lines<R: BufRead>(&mut self, mut input: R, mode: InputMode) -> IndexResult<()> {
        let mut line = Vec::with_capacity(4096);
        loop {
            line.clear();
            if input.read_until(b'\n', &mut line)? == 0 {
                return Ok(());
            }
            match mode {
                InputMode::Raw => self.add_raw_line(&line)?,
                InputMode::Records => self.add_record(&line)?,
            }
        }
    }

    /// Write any buffered chains and return what was built
    pub fn finish(mut self) -> IndexResult<BuildSummary> {
        if !self.chains.is_empty() {
            self.write_shard()?;
        }
        self.progress.finish_and_clear();
        info!(
            shards = self.summary.shards.len(),
            chains = self.summary.chains,
            lines = self.summary.lines,
            "build finished"
        );
        Ok(self.summary)
    }

    fn split_raw(&mut self, line: &[u8], count: u64) {
        self.scratch.clear();
        self.splitter.split_raw(line, &mut self.scratch);
        self.take_scratch(count);
    }

    fn take_scratch(&mut self, count: u64) {
        self.summary.chains += self.scratch.len() as u64;
        self.progress.inc(self.scratch.len() as u64);
        self.chains
            .extend(self.scratch.drain(..).map(|chain| (chain, count)));
    }

    fn flush_if_full(&mut self) -> IndexResult<()> {
        if self.chains.len() >= self.config.chains_per_shard {
            self.write_shard()?;
        }
        Ok(())
    }

    fn write_shard(&mut self) -> IndexResult<()> {
        let path = shard_path(&self.prefix, self.summary.shards.len());
        self.chains.par_sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut writer = IndexWriter::create(&path)?;
        for (text, count) in &self.chains {
            writer.add(text.as_bytes(), *count)?;
        }
        let (_, summary) = writer.finish()?;

        debug!(
            path = %path.display(),
            chains = self.chains.len(),
            entries = summary.entry_count,
            "wrote shard"
        );
        self.chains.clear();
        self.summary.shards.push(path);
        Ok(())
    }
}

/// `<prefix>.NNNNN.index`
pub fn shard_path(prefix: &Path, number: usize) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!(".{number:05}.index"));
    PathBuf::from(name)
}

/// Build shards from `input`, optionally merging them into `merged` and
/// removing the shards afterwards
pub fn build_index<R: BufRead>(
    input: R,
    prefix: &Path,
    config: BuildConfig,
    mode: InputMode,
    merged: Option<&Path>,
) -> IndexResult<BuildSummary> {
    let quiet = config.quiet;
    let mut builder = IndexBuilder::new(prefix, config);
    builder.add_lines(input, mode)?;
    let summary = builder.finish()?;

    if let Some(output) = merged {
        let options = MergeOptions {
            quiet,
            ..MergeOptions::default()
        };
        merge_indexes(summary.shards.as_slice(), output, &options)?;
        for shard in &summary.shards {
            fs::remove_file(shard)?;
        }
    }

    Ok(summary)
}
