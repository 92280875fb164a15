use crate::error::{IndexError, IndexResult};
use crate::index::reader::IndexReader;
use crate::index::types::IndexSummary;
use crate::index::walker::IndexWalker;
use crate::index::writer::IndexWriter;
use crate::utils::progress::spinner;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Options for combining index files
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Drop entries (after aggregation) with a smaller count
    pub min_count: u64,
    /// Cut every entry back to its last space, keeping whole words only
    pub whole_words: bool,
    pub quiet: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            min_count: 1,
            whole_words: false,
            quiet: false,
        }
    }
}

/// Where merged entries go before the writer
trait EntrySink {
    fn add(&mut self, text: &[u8], count: u64) -> IndexResult<()>;
    fn finish(self: Box<Self>) -> IndexResult<IndexSummary>;
}

/// Passes entries through, dropping rare ones
struct CountFilter<W: Write> {
    out: IndexWriter<W>,
    cutoff: u64,
}

impl<W: Write> EntrySink for CountFilter<W> {
    fn add(&mut self, text: &[u8], count: u64) -> IndexResult<()> {
        if count >= self.cutoff {
            self.out.add(text, count)?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> IndexResult<IndexSummary> {
        Ok(self.out.finish()?.1)
    }
}

/// Truncates entries to their last space and aggregates the results.
///
/// Every entry that truncates to the same prefix is contiguous in sorted
/// input, so a stack of open space positions along the current text is
/// enough to total them. A prefix is released once the input moves off it,
/// deepest first; the writer accepts that since the shorter prefix is still
/// open on its path.
struct WordFilter<W: Write> {
    out: IndexWriter<W>,
    cutoff: u64,
    saved: Vec<u8>,
    /// (position of a space in `saved`, count of entries ending there)
    spaces: Vec<(usize, u64)>,
}

impl<W: Write> WordFilter<W> {
    fn release_from(&mut self, same: usize) -> IndexResult<()> {
        while let Some(&(pos, count)) = self.spaces.last() {
            if pos < same {
                break;
            }
            self.spaces.pop();
            if count >= self.cutoff {
                self.out.add(&self.saved[..=pos], count)?;
            }
        }
        Ok(())
    }
}

impl<W: Write> EntrySink for WordFilter<W> {
    fn add(&mut self, text: &[u8], count: u64) -> IndexResult<()> {
        let same = self
            .saved
            .iter()
            .zip(text)
            .take_while(|(a, b)| a == b)
            .count();
        self.release_from(same)?;

        self.saved.truncate(same);
        self.saved.extend_from_slice(&text[same..]);
        for (pos, _) in text.iter().enumerate().skip(same).filter(|(_, b)| **b == b' ') {
            self.spaces.push((pos, 0));
        }

        // Entries with no space at all are dropped
        if let Some(last) = self.spaces.last_mut() {
            last.1 += count;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> IndexResult<IndexSummary> {
        self.release_from(0)?;
        Ok(self.out.finish()?.1)
    }
}

/// Merge `inputs` into a new index at `output`.
///
/// Counts for equal texts are summed, so the result does not depend on the
/// order of `inputs`. Refuses to touch an existing `output`; a partial output
/// is removed if the merge fails.
pub fn merge_indexes<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    options: &MergeOptions,
) -> IndexResult<IndexSummary> {
    let readers = inputs
        .iter()
        .map(|path| IndexReader::open(path.as_ref()))
        .collect::<IndexResult<Vec<_>>>()?;

    if output.exists() {
        return Err(IndexError::OutputExists(output.to_path_buf()));
    }
    let writer = IndexWriter::create_new(output)?;

    let sink: Box<dyn EntrySink> = if options.whole_words {
        Box::new(WordFilter {
            out: writer,
            cutoff: options.min_count,
            saved: Vec::new(),
            spaces: Vec::new(),
        })
    } else {
        Box::new(CountFilter {
            out: writer,
            cutoff: options.min_count,
        })
    };

    match merge_into(&readers, inputs, sink, options.quiet) {
        Ok(summary) => {
            info!(
                inputs = inputs.len(),
                entries = summary.entry_count,
                total = summary.total,
                output = %output.display(),
                "merge finished"
            );
            Ok(summary)
        }
        Err(e) => {
            let _ = fs::remove_file(output);
            Err(e)
        }
    }
}

fn merge_into<P: AsRef<Path>>(
    readers: &[IndexReader],
    inputs: &[P],
    mut sink: Box<dyn EntrySink>,
    quiet: bool,
) -> IndexResult<IndexSummary> {
    let progress = spinner("Merging entries", quiet);

    let mut walkers = Vec::with_capacity(readers.len());
    let mut heap = BinaryHeap::new();
    for (source, (reader, path)) in readers.iter().zip(inputs).enumerate() {
        let mut walker = IndexWalker::new(reader)?;
        match walker.next().transpose()? {
            Some(entry) => heap.push(Reverse((entry.text, source, entry.count))),
            None => warn!(input = %path.as_ref().display(), "empty input"),
        }
        walkers.push(walker);
    }

    while let Some(Reverse((text, source, mut count))) = heap.pop() {
        refill(&mut walkers[source], &mut heap, source)?;
        while let Some(Reverse((next, other, more))) = heap.peek() {
            if *next != text {
                break;
            }
            let other = *other;
            count += *more;
            heap.pop();
            refill(&mut walkers[other], &mut heap, other)?;
        }

        sink.add(text.as_bytes(), count)?;
        progress.inc(1);
    }

    progress.finish_and_clear();
    sink.finish()
}

fn refill(
    walker: &mut IndexWalker<'_>,
    heap: &mut BinaryHeap<Reverse<(String, usize, u64)>>,
    source: usize,
) -> IndexResult<()> {
    if let Some(entry) = walker.next().transpose()? {
        heap.push(Reverse((entry.text, source, entry.count)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::write_to_vec;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn quiet() -> MergeOptions {
        MergeOptions {
            quiet: true,
            ..MergeOptions::default()
        }
    }

    fn write(dir: &Path, name: &str, entries: &[(&str, u64)]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, write_to_vec(entries.iter().copied()).unwrap()).unwrap();
        path
    }

    fn read_all(path: &Path) -> Vec<(String, u64)> {
        let reader = IndexReader::open(path).unwrap();
        IndexWalker::new(&reader)
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.text, e.count)
            })
            .collect()
    }

    #[test]
    fn test_counts_are_summed() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.index", &[("cat ", 2), ("dog ", 1)]);
        let b = write(dir.path(), "b.index", &[("ant ", 1), ("cat ", 3)]);
        let out = dir.path().join("out.index");

        let summary = merge_indexes(&[&a, &b], &out, &quiet()).unwrap();
        assert_eq!(summary.total, 7);
        assert_eq!(
            read_all(&out),
            vec![
                ("ant ".to_string(), 1),
                ("cat ".to_string(), 5),
                ("dog ".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_merge_is_order_independent() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.index", &[("ab ", 1), ("b ", 4)]);
        let b = write(dir.path(), "b.index", &[("a ", 2), ("ab ", 1), ("c ", 1)]);
        let ab = dir.path().join("ab.index");
        let ba = dir.path().join("ba.index");

        merge_indexes(&[&a, &b], &ab, &quiet()).unwrap();
        merge_indexes(&[&b, &a], &ba, &quiet()).unwrap();
        assert_eq!(fs::read(&ab).unwrap(), fs::read(&ba).unwrap());
    }

    #[test]
    fn test_min_count() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.index", &[("rare ", 1), ("seen ", 2)]);
        let b = write(dir.path(), "b.index", &[("seen ", 1)]);
        let out = dir.path().join("out.index");
        let options = MergeOptions {
            min_count: 2,
            ..quiet()
        };

        merge_indexes(&[&a, &b], &out, &options).unwrap();
        assert_eq!(read_all(&out), vec![("seen ".to_string(), 3)]);
    }

    #[test]
    fn test_whole_words() {
        let dir = tempdir().unwrap();
        let a = write(
            dir.path(),
            "a.index",
            &[("a b c", 1), ("a bb", 2), ("a bc d ", 1), ("xyz", 5)],
        );
        let out = dir.path().join("out.index");
        let options = MergeOptions {
            whole_words: true,
            ..quiet()
        };

        merge_indexes(&[&a], &out, &options).unwrap();
        assert_eq!(
            read_all(&out),
            vec![
                ("a ".to_string(), 2),
                ("a b ".to_string(), 1),
                ("a bc d ".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_whole_words_cutoff_applies_after_truncation() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.index", &[("red fo", 1), ("red fox", 1)]);
        let out = dir.path().join("out.index");
        let options = MergeOptions {
            whole_words: true,
            min_count: 2,
            ..quiet()
        };

        merge_indexes(&[&a], &out, &options).unwrap();
        assert_eq!(read_all(&out), vec![("red ".to_string(), 2)]);
    }

    #[test]
    fn test_existing_output_is_refused() {
        let dir = tempdir().unwrap();
        let a = write(dir.path(), "a.index", &[("x ", 1)]);
        let out = dir.path().join("out.index");
        fs::write(&out, b"precious").unwrap();

        let err = merge_indexes(&[&a], &out, &quiet()).unwrap_err();
        assert!(matches!(err, IndexError::OutputExists(_)));
        assert_eq!(fs::read(&out).unwrap(), b"precious");
    }

    #[test]
    fn test_empty_inputs_are_skipped() {
        let dir = tempdir().unwrap();
        let empty = write(dir.path(), "empty.index", &[]);
        let a = write(dir.path(), "a.index", &[("x ", 1)]);
        let out = dir.path().join("out.index");

        merge_indexes(&[&empty, &a], &out, &quiet()).unwrap();
        assert_eq!(read_all(&out), vec![("x ".to_string(), 1)]);
    }
}
