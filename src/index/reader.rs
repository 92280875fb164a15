use crate::error::{IndexError, IndexResult};
use crate::index::types::*;
use crate::utils::{decode_varint, is_corpus_byte, read_u32_le, read_u64_le};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::Path;

enum IndexData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for IndexData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            IndexData::Mapped(map) => map,
            IndexData::Owned(bytes) => bytes,
        }
    }
}

/// Read-only view of an index file.
///
/// The file is memory-mapped and nodes are decoded on demand. Every decode
/// is bounds-checked: a damaged file yields [`IndexError::Corrupt`], never a
/// panic or an out-of-range read.
pub struct IndexReader {
    data: IndexData,
    summary: IndexSummary,
    /// End of the node region (start of the footer)
    nodes_end: u64,
}

impl IndexReader {
    /// Open and validate an index file
    pub fn open(path: &Path) -> IndexResult<Self> {
        let file = File::open(path).map_err(|e| IndexError::unreadable(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| IndexError::unreadable(path, e))?
            .len();
        if len < (HEADER_SIZE + FOOTER_SIZE) as u64 {
            return Err(IndexError::corrupt(len, "file too short for an index"));
        }
        let map = unsafe { Mmap::map(&file) }.map_err(|e| IndexError::unreadable(path, e))?;
        Self::from_data(IndexData::Mapped(map))
    }

    /// Wrap index bytes that are already in memory
    pub fn from_bytes(bytes: Vec<u8>) -> IndexResult<Self> {
        Self::from_data(IndexData::Owned(bytes))
    }

    fn from_data(data: IndexData) -> IndexResult<Self> {
        let len = data.len();
        if len < HEADER_SIZE + FOOTER_SIZE {
            return Err(IndexError::corrupt(len as u64, "file too short for an index"));
        }

        let mut header = &data[..HEADER_SIZE];
        if read_u32_le(&mut header)? != INDEX_MAGIC {
            return Err(IndexError::corrupt(0, "bad magic"));
        }
        let version = read_u32_le(&mut header)?;
        if version != INDEX_VERSION {
            return Err(IndexError::Version(version));
        }

        let footer = len - FOOTER_SIZE;
        let mut tail = &data[footer..];
        let summary = IndexSummary {
            root: read_u64_le(&mut tail)?,
            total: read_u64_le(&mut tail)?,
            entry_count: read_u64_le(&mut tail)?,
            node_count: read_u64_le(&mut tail)?,
        };
        if read_u32_le(&mut tail)? != INDEX_MAGIC {
            return Err(IndexError::corrupt(footer as u64, "bad footer magic"));
        }
        if read_u32_le(&mut tail)? != version {
            return Err(IndexError::corrupt(footer as u64, "footer version mismatch"));
        }

        let nodes_end = footer as u64;
        if summary.root < HEADER_SIZE as u64 || summary.root >= nodes_end {
            return Err(IndexError::corrupt(
                footer as u64,
                format!("root offset {} outside node region", summary.root),
            ));
        }

        Ok(Self {
            data,
            summary,
            nodes_end,
        })
    }

    pub fn summary(&self) -> IndexSummary {
        self.summary
    }

    /// Sum of all entry counts
    pub fn total(&self) -> u64 {
        self.summary.total
    }

    pub fn root(&self) -> NodeRef {
        self.summary.root
    }

    /// A synthetic edge leading into the root, carrying the index total
    pub fn root_choice(&self) -> Choice {
        Choice {
            ch: ROOT_LABEL,
            count: self.summary.total,
            next: self.summary.root,
        }
    }

    /// Size of the underlying file in bytes
    pub fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Decode the choices out of `node` into `out` (cleared first).
    ///
    /// `count` is the count on the edge that led here. Returns the terminal
    /// count: the occurrences of the text that ends exactly at this node.
    pub fn children(&self, node: NodeRef, count: u64, out: &mut Vec<Choice>) -> IndexResult<u64> {
        out.clear();
        if node == NO_NODE {
            return Ok(count);
        }
        if node < HEADER_SIZE as u64 || node >= self.nodes_end {
            return Err(IndexError::corrupt(node, "node offset outside node region"));
        }

        let mut cursor = Cursor {
            data: &self.data[..self.nodes_end as usize],
            pos: node as usize,
        };
        let tag = cursor.varint()?;

        if tag == TAG_CHAIN {
            let ch = cursor.label()?;
            let next = cursor.child(node)?;
            out.push(Choice { ch, count, next });
            return Ok(0);
        }
        if tag % 2 != 0 {
            return Err(IndexError::corrupt(node, format!("bad node tag {tag}")));
        }

        let arity = tag / 2;
        if arity > crate::utils::ALPHABET_SIZE as u64 {
            return Err(IndexError::corrupt(node, format!("node has {arity} choices")));
        }

        let mut used = 0u64;
        for _ in 0..arity {
            let ch = cursor.label()?;
            if out.last().is_some_and(|prev: &Choice| prev.ch >= ch) {
                return Err(IndexError::corrupt(node, "choices out of order"));
            }
            let child_count = cursor.varint()?;
            if child_count == 0 {
                return Err(IndexError::corrupt(node, "zero count"));
            }
            used = used
                .checked_add(child_count)
                .filter(|&used| used <= count)
                .ok_or_else(|| IndexError::corrupt(node, "children outweigh their parent"))?;
            let next = cursor.child(node)?;
            out.push(Choice {
                ch,
                count: child_count,
                next,
            });
        }

        Ok(count - used)
    }

    /// Find the choice labelled `ch` out of `node`
    pub fn child(&self, node: NodeRef, count: u64, ch: u8) -> IndexResult<Option<Choice>> {
        let mut choices = Vec::new();
        self.children(node, count, &mut choices)?;
        Ok(choices.into_iter().find(|c| c.ch == ch))
    }

    /// Follow `path` from the root. Returns the edge into the last node, or
    /// `None` if the path leaves the trie.
    pub fn walk(&self, path: &[u8]) -> IndexResult<Option<Choice>> {
        let mut here = self.root_choice();
        for &ch in path {
            match self.child(here.next, here.count, ch)? {
                Some(next) => here = next,
                None => return Ok(None),
            }
        }
        Ok(Some(here))
    }
}

/// Bounds-checked decoder over the node region
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn varint(&mut self) -> IndexResult<u64> {
        let rest = self.data.get(self.pos..).unwrap_or_default();
        let (value, used) = decode_varint(rest)
            .ok_or_else(|| IndexError::corrupt(self.pos as u64, "truncated varint"))?;
        self.pos += used;
        Ok(value)
    }

    fn label(&mut self) -> IndexResult<u8> {
        let ch = *self
            .data
            .get(self.pos)
            .ok_or_else(|| IndexError::corrupt(self.pos as u64, "truncated node"))?;
        if !is_corpus_byte(ch) {
            return Err(IndexError::corrupt(
                self.pos as u64,
                format!("label 0x{ch:02x} outside the corpus alphabet"),
            ));
        }
        self.pos += 1;
        Ok(ch)
    }

    /// Children are written first, so a child offset is a positive distance
    /// back from its parent; zero marks a leaf
    fn child(&mut self, node: NodeRef) -> IndexResult<NodeRef> {
        let delta = self.varint()?;
        if delta == 0 {
            return Ok(NO_NODE);
        }
        node.checked_sub(delta)
            .filter(|&child| child >= HEADER_SIZE as u64)
            .ok_or_else(|| IndexError::corrupt(node, "child offset outside node region"))
    }
}
