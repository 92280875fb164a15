use crate::error::{IndexError, IndexResult};
use crate::index::types::*;
use crate::utils::{encode_varint, find_invalid_byte, write_u32_le, write_u64_le};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// A trie node whose subtree is still open
struct Pending {
    ch: u8,
    terminal: u64,
    children: Vec<Choice>,
}

impl Pending {
    fn new(ch: u8) -> Self {
        Self {
            ch,
            terminal: 0,
            children: Vec::new(),
        }
    }
}

/// Streams sorted `(text, count)` entries into an index file.
///
/// Only the path to the most recent entry is kept in memory. A node is
/// written as soon as no later entry can reach it, so children always land
/// before their parents and every child offset is smaller than its parent's.
///
/// Entries must arrive in byte order. Repeating an entry, or adding a prefix
/// of the previous entry, folds the count into the node that is still open.
pub struct IndexWriter<W: Write> {
    out: W,
    pos: u64,
    /// `chain[0]` is the root; `chain[i]` is reached by `previous[..i]`
    chain: Vec<Pending>,
    previous: Vec<u8>,
    summary: IndexSummary,
    scratch: Vec<u8>,
}

impl IndexWriter<BufWriter<File>> {
    /// Create (or truncate) an index file at `path`
    pub fn create(path: &Path) -> IndexResult<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::with_capacity(65536, file))
    }

    /// Create an index file at `path`, failing if anything is already there
    pub fn create_new(path: &Path) -> IndexResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => IndexError::OutputExists(path.to_path_buf()),
                _ => IndexError::Io(e),
            })?;
        Self::new(BufWriter::with_capacity(65536, file))
    }
}

impl<W: Write> IndexWriter<W> {
    pub fn new(mut out: W) -> IndexResult<Self> {
        write_u32_le(&mut out, INDEX_MAGIC)?;
        write_u32_le(&mut out, INDEX_VERSION)?;

        Ok(Self {
            out,
            pos: HEADER_SIZE as u64,
            chain: vec![Pending::new(ROOT_LABEL)],
            previous: Vec::new(),
            summary: IndexSummary::default(),
            scratch: Vec::with_capacity(256),
        })
    }

    /// Add `count` occurrences of `text`. Zero counts are ignored.
    pub fn add(&mut self, text: &[u8], count: u64) -> IndexResult<()> {
        if text.is_empty() {
            return Err(IndexError::EmptyText);
        }
        if find_invalid_byte(text).is_some() {
            return Err(IndexError::InvalidText(
                String::from_utf8_lossy(text).into_owned(),
            ));
        }
        if count == 0 {
            return Ok(());
        }

        let same = self
            .previous
            .iter()
            .zip(text)
            .take_while(|(a, b)| a == b)
            .count();
        self.close_to(same)?;

        if same < text.len() {
            let open = &self.chain[same];
            if open.children.last().is_some_and(|c| c.ch >= text[same]) {
                return Err(IndexError::OutOfOrder {
                    previous: String::from_utf8_lossy(&self.previous).into_owned(),
                    next: String::from_utf8_lossy(text).into_owned(),
                });
            }
            self.chain.extend(text[same..].iter().map(|&ch| Pending::new(ch)));
        }

        let node = self
            .chain
            .last_mut()
            .ok_or_else(|| IndexError::corrupt(self.pos, "writer lost its root"))?;
        if node.terminal == 0 {
            self.summary.entry_count += 1;
        }
        node.terminal += count;
        self.summary.total += count;

        self.previous.clear();
        self.previous.extend_from_slice(text);
        Ok(())
    }

    /// Summary of what has been added so far
    pub fn summary(&self) -> IndexSummary {
        self.summary
    }

    /// Write every open node, the root and the footer.
    /// Returns the underlying writer (flushed) and the final summary.
    pub fn finish(mut self) -> IndexResult<(W, IndexSummary)> {
        self.close_to(0)?;
        let root = self
            .chain
            .pop()
            .ok_or_else(|| IndexError::corrupt(self.pos, "writer lost its root"))?;

        self.summary.root = if root.children.is_empty() {
            // Empty index: a root record with no choices
            let start = self.pos;
            self.out.write_all(&[0])?;
            self.pos += 1;
            self.summary.node_count += 1;
            start
        } else {
            self.write_node(root)?.next
        };

        write_u64_le(&mut self.out, self.summary.root)?;
        write_u64_le(&mut self.out, self.summary.total)?;
        write_u64_le(&mut self.out, self.summary.entry_count)?;
        write_u64_le(&mut self.out, self.summary.node_count)?;
        write_u32_le(&mut self.out, INDEX_MAGIC)?;
        write_u32_le(&mut self.out, INDEX_VERSION)?;
        self.out.flush()?;

        Ok((self.out, self.summary))
    }

    /// Write every open node deeper than `depth`
    fn close_to(&mut self, depth: usize) -> IndexResult<()> {
        while self.chain.len() > depth + 1 {
            let Some(node) = self.chain.pop() else { break };
            let choice = self.write_node(node)?;
            if let Some(parent) = self.chain.last_mut() {
                parent.children.push(choice);
            }
        }
        Ok(())
    }

    /// Write a node record (leaves get none) and return the edge into it
    fn write_node(&mut self, node: Pending) -> IndexResult<Choice> {
        let count = node.terminal + node.children.iter().map(|c| c.count).sum::<u64>();
        if node.children.is_empty() {
            return Ok(Choice {
                ch: node.ch,
                count,
                next: NO_NODE,
            });
        }

        let start = self.pos;
        let delta = |child: &Choice| match child.next {
            NO_NODE => 0,
            next => start - next,
        };

        self.scratch.clear();
        if node.terminal == 0 && node.children.len() == 1 {
            let child = &node.children[0];
            encode_varint(TAG_CHAIN, &mut self.scratch);
            self.scratch.push(child.ch);
            encode_varint(delta(child), &mut self.scratch);
        } else {
            encode_varint(2 * node.children.len() as u64, &mut self.scratch);
            for child in &node.children {
                self.scratch.push(child.ch);
                encode_varint(child.count, &mut self.scratch);
                encode_varint(delta(child), &mut self.scratch);
            }
        }

        self.out.write_all(&self.scratch)?;
        self.pos += self.scratch.len() as u64;
        self.summary.node_count += 1;

        Ok(Choice {
            ch: node.ch,
            count,
            next: start,
        })
    }
}

/// Write sorted entries to an in-memory index
pub fn write_to_vec<'a, I>(entries: I) -> IndexResult<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let mut writer = IndexWriter::new(Vec::new())?;
    for (text, count) in entries {
        writer.add(text.as_bytes(), count)?;
    }
    Ok(writer.finish()?.0)
}
