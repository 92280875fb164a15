use crate::error::IndexResult;
use crate::index::reader::IndexReader;
use crate::index::types::*;

struct Frame {
    choices: Vec<Choice>,
    next: usize,
}

/// Iterates every entry of an index in byte order.
///
/// Depth-first over the trie; an entry is yielded when its node is entered,
/// before anything below it, so a text always precedes its extensions.
pub struct IndexWalker<'a> {
    reader: &'a IndexReader,
    frames: Vec<Frame>,
    text: Vec<u8>,
    failed: bool,
}

impl<'a> IndexWalker<'a> {
    pub fn new(reader: &'a IndexReader) -> IndexResult<Self> {
        let root = reader.root_choice();
        let mut choices = Vec::new();
        reader.children(root.next, root.count, &mut choices)?;

        Ok(Self {
            reader,
            frames: vec![Frame { choices, next: 0 }],
            text: Vec::new(),
            failed: false,
        })
    }

    fn advance(&mut self) -> IndexResult<Option<Entry>> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };

            if frame.next == frame.choices.len() {
                self.frames.pop();
                self.text.pop();
                continue;
            }

            let choice = frame.choices[frame.next];
            frame.next += 1;

            let mut choices = Vec::new();
            let terminal = self.reader.children(choice.next, choice.count, &mut choices)?;
            self.text.push(choice.ch);
            self.frames.push(Frame { choices, next: 0 });

            if terminal > 0 {
                return Ok(Some(Entry {
                    text: self.text.iter().map(|&b| b as char).collect(),
                    count: terminal,
                }));
            }
        }
    }
}

impl Iterator for IndexWalker<'_> {
    type Item = IndexResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
