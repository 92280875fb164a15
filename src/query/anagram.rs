//! Anagram (`<...>`) compilation.
//!
//! Each part is a "tile" that must be used exactly once, in any order. Equal
//! parts are collapsed into one tile with a count, and the counts still
//! unused are packed into a single mixed-radix number. The automaton for the
//! whole anagram is determinized directly from items of the form
//! (unused counts, tile in progress, state within that tile), so the full
//! nondeterministic product is never materialized.
//!
//! A tile that can match the empty string may simply be left unused; it
//! only takes effect when it consumes at least one character.

use crate::error::{PatternError, PatternResult};
use crate::query::automaton::{Automaton, StateId, DEAD};
use crate::query::parser::Pattern;
use crate::utils::ALPHABET_SIZE;
use rustc_hash::{FxHashMap, FxHashSet};

/// Tile index for an item that is between tiles
const IDLE: u32 = u32::MAX;

/// Tile state for a tile that has been entered but has consumed nothing
const FRESH: StateId = DEAD;

struct Tile {
    automaton: Automaton,
    /// Place value of this tile's digit in the unused-count number
    place: u64,
    radix: u64,
    nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Item {
    unused: u64,
    tile: u32,
    state: StateId,
}

struct Tiles {
    tiles: Vec<Tile>,
}

impl Tiles {
    fn unused(&self, unused: u64, tile: usize) -> u64 {
        let t = &self.tiles[tile];
        (unused / t.place) % t.radix
    }

    /// Sorted closure over "enter a tile" and "finish a tile" moves
    fn close(&self, seeds: Vec<Item>) -> Vec<Item> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        let mut stack = seeds;
        while let Some(item) = stack.pop() {
            if !seen.insert(item) {
                continue;
            }
            out.push(item);

            if item.tile == IDLE {
                for tile in 0..self.tiles.len() {
                    if self.unused(item.unused, tile) > 0 {
                        stack.push(Item {
                            unused: item.unused,
                            tile: tile as u32,
                            state: FRESH,
                        });
                    }
                }
            } else {
                let tile = &self.tiles[item.tile as usize];
                if item.state != FRESH && tile.automaton.is_accepting(item.state) {
                    stack.push(Item {
                        unused: item.unused - tile.place,
                        tile: IDLE,
                        state: 0,
                    });
                }
            }
        }
        out.sort_unstable();
        out
    }

    fn step(&self, item: Item, symbol: usize) -> Option<Item> {
        if item.tile == IDLE {
            return None;
        }
        let automaton = &self.tiles[item.tile as usize].automaton;
        let from = if item.state == FRESH {
            automaton.start()
        } else {
            item.state
        };
        let next = automaton.next(from, symbol);
        (next != DEAD).then_some(Item {
            state: next,
            ..item
        })
    }

    /// Between tiles with every required tile used
    fn is_accepting(&self, set: &[Item]) -> bool {
        set.iter().any(|item| {
            item.tile == IDLE
                && self
                    .tiles
                    .iter()
                    .enumerate()
                    .all(|(i, tile)| tile.nullable || self.unused(item.unused, i) == 0)
        })
    }
}

/// Compile an anagram of `parts` to a minimal automaton
pub(crate) fn compile_anagram(
    parts: &[Pattern],
    quoted: bool,
    limit: usize,
) -> PatternResult<Automaton> {
    let mut unique: Vec<(&Pattern, u64)> = Vec::new();
    for part in parts {
        match unique.iter_mut().find(|(seen, _)| *seen == part) {
            Some((_, count)) => *count += 1,
            None => unique.push((part, 1)),
        }
    }

    let mut tiles = Vec::with_capacity(unique.len());
    let mut place: u64 = 1;
    let mut full: u64 = 0;
    for (part, count) in unique {
        let automaton = Automaton::build(part, quoted, limit)?;
        let nullable = automaton.is_accepting(automaton.start());
        if automaton.is_empty() {
            return Ok(Automaton::empty());
        }

        full += count * place;
        let radix = count + 1;
        tiles.push(Tile {
            automaton,
            place,
            radix,
            nullable,
        });
        place = place.checked_mul(radix).ok_or_else(|| {
            PatternError::AnagramTooLong(format!("{} parts", parts.len()))
        })?;
    }

    let tiles = Tiles { tiles };
    determinize(&tiles, full, limit)
}

fn determinize(tiles: &Tiles, full: u64, limit: usize) -> PatternResult<Automaton> {
    let mut index: FxHashMap<Vec<Item>, StateId> = FxHashMap::default();
    let mut sets: Vec<Vec<Item>> = Vec::new();

    let first = tiles.close(vec![Item {
        unused: full,
        tile: IDLE,
        state: 0,
    }]);
    index.insert(first.clone(), 0);
    sets.push(first);

    let mut accepting = Vec::new();
    let mut table = Vec::new();
    let mut i = 0;
    while i < sets.len() {
        accepting.push(tiles.is_accepting(&sets[i]));

        for symbol in 0..ALPHABET_SIZE {
            let moved: Vec<Item> = sets[i]
                .iter()
                .filter_map(|&item| tiles.step(item, symbol))
                .collect();
            if moved.is_empty() {
                table.push(DEAD);
                continue;
            }

            let target = tiles.close(moved);
            let id = match index.get(&target) {
                Some(&id) => id,
                None => {
                    if sets.len() >= limit {
                        return Err(PatternError::TooComplex { limit });
                    }
                    let id = sets.len() as StateId;
                    index.insert(target.clone(), id);
                    sets.push(target);
                    id
                }
            };
            table.push(id);
        }
        i += 1;
    }

    Ok(Automaton::from_table(accepting, table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_pattern;

    const LIMIT: usize = 250_000;

    fn compile(input: &str) -> Automaton {
        Automaton::compile(&parse_pattern(input).unwrap(), LIMIT).unwrap()
    }

    #[test]
    fn test_letter_anagram() {
        let a = compile("<aab>");
        for yes in ["aab", "aba", "baa", "a b a"] {
            assert!(a.accepts(yes), "{yes}");
        }
        for no in ["ab", "aabb", "abb", "bab"] {
            assert!(!a.accepts(no), "{no}");
        }
    }

    #[test]
    fn test_quoted_anagram_has_no_word_breaks() {
        let a = compile("\"<ab>\"");
        assert!(a.accepts("ba"));
        assert!(!a.accepts("b a"));
    }

    #[test]
    fn test_multi_character_tiles() {
        let a = compile("\"<(th)(er)e>\"");
        assert!(a.accepts("there"));
        assert!(!a.accepts("ethere"));
        assert!(a.accepts("erthe"));
        assert!(a.accepts("eerth"));
        assert!(!a.accepts("three"));
    }

    #[test]
    fn test_optional_tiles_may_be_skipped() {
        let a = compile("\"<(ab)?c>\"");
        assert!(a.accepts("c"));
        assert!(a.accepts("abc"));
        assert!(a.accepts("cab"));
        assert!(!a.accepts("abcab"));
        assert!(!a.accepts(""));
    }

    #[test]
    fn test_impossible_part_empties_anagram() {
        let a = compile("\"<a(b&c)>\"");
        assert!(a.is_empty());
    }

    #[test]
    fn test_counts_collapse() {
        let a = compile("\"<aaaabbckmor>\"");
        assert!(a.accepts("barackobama"));
        assert!(!a.accepts("barackobam"));
    }
}
