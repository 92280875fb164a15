//! Best-first search over an index, steered by a [`SearchFilter`].
//!
//! Every frontier entry is an edge into the index trie paired with a filter
//! state. Its priority is the edge count times a scale factor. A child's
//! count never exceeds its parent's and the scale only shrinks, so the
//! priority bounds everything reachable below the entry, and matches come
//! out in non-increasing score order. Equal priorities pop first-in
//! first-out, which keeps the output reproducible run to run.
//!
//! Texts are rebuilt from a breadcrumb arena rather than stored per entry.

use crate::error::{IndexError, IndexResult};
use crate::index::{Choice, IndexReader, ROOT_LABEL};
use crate::query::filter::SearchFilter;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const NO_CRUMB: u32 = u32::MAX;

/// One emitted result
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub score: f64,
    /// Matched text, trailing spaces removed
    pub text: String,
}

/// Result of one expansion step
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Match(Match),
    Continue,
    Exhausted,
}

#[derive(Debug, Clone, Copy)]
struct Crumb {
    parent: u32,
    ch: u8,
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    priority: f64,
    /// Insertion order, for first-in first-out ties
    seq: u64,
    scale: f64,
    crumb: u32,
    choice: Choice,
    state: u64,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence number
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Lazy, resumable best-first search
pub struct SearchDriver<'a, F: SearchFilter + ?Sized> {
    reader: &'a IndexReader,
    filter: &'a F,
    restart: f64,
    frontier: BinaryHeap<Frontier>,
    crumbs: Vec<Crumb>,
    seen: FxHashSet<String>,
    children: Vec<Choice>,
    seq: u64,
    nodes: u64,
}

impl<'a, F: SearchFilter + ?Sized> SearchDriver<'a, F> {
    /// Start a search at the index root.
    ///
    /// `restart` scales the score of a search that continues past a space by
    /// starting again at the root; 0 disables that. It is clamped to [0, 1]
    /// so a restart never outscores the entry it continues.
    pub fn new(reader: &'a IndexReader, filter: &'a F, restart: f64) -> Self {
        let restart = if restart.is_nan() {
            0.0
        } else {
            restart.clamp(0.0, 1.0)
        };
        let mut driver = Self {
            reader,
            filter,
            restart,
            frontier: BinaryHeap::new(),
            crumbs: Vec::new(),
            seen: FxHashSet::default(),
            children: Vec::new(),
            seq: 0,
            nodes: 0,
        };
        let seed = reader.root_choice();
        driver.push(1.0, NO_CRUMB, seed, filter.start());
        driver
    }

    /// Entries expanded so far
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    fn push(&mut self, scale: f64, crumb: u32, choice: Choice, state: u64) {
        self.frontier.push(Frontier {
            priority: choice.count as f64 * scale,
            seq: self.seq,
            scale,
            crumb,
            choice,
            state,
        });
        self.seq += 1;
    }

    /// Expand the best frontier entry
    pub fn step(&mut self) -> IndexResult<Step> {
        let Some(entry) = self.frontier.pop() else {
            return Ok(Step::Exhausted);
        };
        self.nodes += 1;
        let is_seed = entry.choice.ch == ROOT_LABEL;

        let mut children = std::mem::take(&mut self.children);
        self.reader
            .children(entry.choice.next, entry.choice.count, &mut children)?;

        // One crumb per expanded entry, shared by all of its children
        let mut child_crumb = None;
        for &child in &children {
            let Some(state) = self.filter.transition(entry.state, child.ch) else {
                continue;
            };
            let crumb = match child_crumb {
                Some(crumb) => crumb,
                None if is_seed => NO_CRUMB,
                None => {
                    let crumb = crumb_id(self.crumbs.len())?;
                    self.crumbs.push(Crumb {
                        parent: entry.crumb,
                        ch: entry.choice.ch,
                    });
                    crumb
                }
            };
            child_crumb = Some(crumb);
            self.push(entry.scale, crumb, child, state);
        }
        self.children = children;

        let root = self.reader.root();
        if self.restart > 0.0 && entry.choice.ch == b' ' && entry.choice.next != root {
            let total = self.reader.total().max(1) as f64;
            let scale = entry.scale * entry.choice.count as f64 / total * self.restart;
            let again = Choice {
                ch: b' ',
                count: self.reader.total(),
                next: root,
            };
            self.push(scale, entry.crumb, again, entry.state);
        }

        if !is_seed && self.filter.is_accepting(entry.state) {
            let text = self.text(entry.crumb, entry.choice.ch);
            if self.seen.insert(text.clone()) {
                return Ok(Step::Match(Match {
                    score: entry.priority,
                    text: text.trim_end_matches(' ').to_string(),
                }));
            }
        }

        Ok(Step::Continue)
    }

    /// Run until the next match or the end of the search
    pub fn next_match(&mut self) -> IndexResult<Option<Match>> {
        loop {
            match self.step()? {
                Step::Match(found) => return Ok(Some(found)),
                Step::Continue => {}
                Step::Exhausted => return Ok(None),
            }
        }
    }

    fn text(&self, mut crumb: u32, last: u8) -> String {
        let mut bytes = vec![last];
        while crumb != NO_CRUMB {
            let c = self.crumbs[crumb as usize];
            bytes.push(c.ch);
            crumb = c.parent;
        }
        bytes.reverse();
        // Labels are validated against the corpus alphabet on decode
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Arena slot for the next crumb; `NO_CRUMB` is never handed out
fn crumb_id(len: usize) -> IndexResult<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&id| id != NO_CRUMB)
        .ok_or(IndexError::SearchTooLarge)
}
