//! Pattern compilation.
//!
//! A [`Pattern`] is first built into a nondeterministic automaton over the
//! 37-symbol corpus alphabet, then determinized by subset construction,
//! trimmed of states that can never accept, and minimized. Intersections and
//! anagrams are compiled to their own minimal automata first and spliced back
//! in. Every construction step is bounded by a state limit; exceeding it
//! fails the whole pattern with [`PatternError::TooComplex`].

use crate::error::{PatternError, PatternResult};
use crate::query::anagram;
use crate::query::parser::{CharSet, Pattern};
use crate::utils::{symbol_index, ALPHABET_SIZE};
use rustc_hash::FxHashMap;

pub type StateId = u32;

/// No state: the transition does not exist
pub const DEAD: StateId = u32::MAX;

const SPACE: usize = 0;

/// Minimal deterministic automaton over the corpus alphabet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automaton {
    start: StateId,
    accepting: Vec<bool>,
    /// `table[state * ALPHABET_SIZE + symbol]`
    table: Vec<StateId>,
}

impl Automaton {
    /// Compile a pattern, allowing at most `max_states` states in any
    /// intermediate automaton
    pub fn compile(pattern: &Pattern, max_states: usize) -> PatternResult<Self> {
        Self::build(pattern, false, max_states)
    }

    pub(crate) fn build(pattern: &Pattern, quoted: bool, limit: usize) -> PatternResult<Self> {
        let mut compiler = Compiler {
            nfa: Nfa::new(limit),
        };
        let fragment = compiler.fragment(pattern, quoted)?;
        compiler.nfa.determinize(fragment, limit)
    }

    /// The automaton that accepts nothing
    pub fn empty() -> Self {
        Self {
            start: DEAD,
            accepting: Vec::new(),
            table: Vec::new(),
        }
    }

    /// True if no text is accepted
    pub fn is_empty(&self) -> bool {
        self.start == DEAD
    }

    pub fn num_states(&self) -> usize {
        self.accepting.len()
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn is_accepting(&self, state: StateId) -> bool {
        self.accepting.get(state as usize).copied().unwrap_or(false)
    }

    /// Transition on an alphabet symbol index
    #[inline]
    pub fn next(&self, state: StateId, symbol: usize) -> StateId {
        if state == DEAD {
            return DEAD;
        }
        self.table[state as usize * ALPHABET_SIZE + symbol]
    }

    /// Transition on a byte; `None` if there is none
    #[inline]
    pub fn step(&self, state: StateId, byte: u8) -> Option<StateId> {
        let next = self.next(state, symbol_index(byte)?);
        (next != DEAD).then_some(next)
    }

    /// Whether the whole of `text` is accepted
    pub fn accepts(&self, text: &str) -> bool {
        let mut state = self.start;
        for &byte in text.as_bytes() {
            match self.step(state, byte) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_accepting(state)
    }

    /// Product automaton accepting what both accept
    pub fn intersect(&self, other: &Automaton, limit: usize) -> PatternResult<Self> {
        if self.is_empty() || other.is_empty() {
            return Ok(Self::empty());
        }

        let mut index: FxHashMap<(StateId, StateId), StateId> = FxHashMap::default();
        let mut pairs = vec![(self.start, other.start)];
        index.insert((self.start, other.start), 0);

        let mut accepting = Vec::new();
        let mut table = Vec::new();
        let mut i = 0;
        while i < pairs.len() {
            let (a, b) = pairs[i];
            accepting.push(self.is_accepting(a) && other.is_accepting(b));
            for symbol in 0..ALPHABET_SIZE {
                let (na, nb) = (self.next(a, symbol), other.next(b, symbol));
                if na == DEAD || nb == DEAD {
                    table.push(DEAD);
                    continue;
                }
                let id = match index.get(&(na, nb)) {
                    Some(&id) => id,
                    None => {
                        if pairs.len() >= limit {
                            return Err(PatternError::TooComplex { limit });
                        }
                        let id = pairs.len() as StateId;
                        index.insert((na, nb), id);
                        pairs.push((na, nb));
                        id
                    }
                };
                table.push(id);
            }
            i += 1;
        }

        Ok(Self {
            start: 0,
            accepting,
            table,
        }
        .minimize())
    }

    /// Build from a raw transition table (start is state 0), then minimize
    pub(crate) fn from_table(accepting: Vec<bool>, table: Vec<StateId>) -> Self {
        if accepting.is_empty() {
            return Self::empty();
        }
        Self {
            start: 0,
            accepting,
            table,
        }
        .minimize()
    }

    /// Drop states that cannot reach acceptance, merge equivalent states
    /// (Moore refinement), and number what is left in breadth-first order
    fn minimize(self) -> Self {
        let n = self.num_states();
        if self.is_empty() || n == 0 {
            return Self::empty();
        }

        // Co-reachability
        let mut reverse: Vec<Vec<StateId>> = vec![Vec::new(); n];
        for state in 0..n {
            for symbol in 0..ALPHABET_SIZE {
                let target = self.table[state * ALPHABET_SIZE + symbol];
                if target != DEAD {
                    reverse[target as usize].push(state as StateId);
                }
            }
        }
        let mut live = self.accepting.clone();
        let mut stack: Vec<StateId> = (0..n as StateId).filter(|&s| live[s as usize]).collect();
        while let Some(state) = stack.pop() {
            for &from in &reverse[state as usize] {
                if !live[from as usize] {
                    live[from as usize] = true;
                    stack.push(from);
                }
            }
        }
        if !live[self.start as usize] {
            return Self::empty();
        }

        let target = |state: usize, symbol: usize| -> StateId {
            let t = self.table[state * ALPHABET_SIZE + symbol];
            if t != DEAD && live[t as usize] {
                t
            } else {
                DEAD
            }
        };

        // Refine until the number of classes stops growing
        let mut class: Vec<u32> = self.accepting.iter().map(|&a| u32::from(a)).collect();
        let mut classes = 0;
        loop {
            let mut signatures: FxHashMap<Vec<u32>, u32> = FxHashMap::default();
            let mut next_class = vec![DEAD; n];
            for state in (0..n).filter(|&s| live[s]) {
                let mut signature = Vec::with_capacity(ALPHABET_SIZE + 1);
                signature.push(class[state]);
                for symbol in 0..ALPHABET_SIZE {
                    signature.push(match target(state, symbol) {
                        DEAD => DEAD,
                        t => class[t as usize],
                    });
                }
                let fresh = signatures.len() as u32;
                next_class[state] = *signatures.entry(signature).or_insert(fresh);
            }
            let count = signatures.len();
            class = next_class;
            if count == classes {
                break;
            }
            classes = count;
        }

        // Renumber classes breadth-first from the start
        let mut number: Vec<StateId> = vec![DEAD; classes];
        let mut representative: Vec<usize> = Vec::with_capacity(classes);
        number[class[self.start as usize] as usize] = 0;
        representative.push(self.start as usize);

        let mut accepting = Vec::new();
        let mut table = Vec::new();
        let mut i = 0;
        while i < representative.len() {
            let state = representative[i];
            accepting.push(self.accepting[state]);
            for symbol in 0..ALPHABET_SIZE {
                let t = target(state, symbol);
                if t == DEAD {
                    table.push(DEAD);
                    continue;
                }
                let c = class[t as usize] as usize;
                if number[c] == DEAD {
                    number[c] = representative.len() as StateId;
                    representative.push(t as usize);
                }
                table.push(number[c]);
            }
            i += 1;
        }

        Self {
            start: 0,
            accepting,
            table,
        }
    }
}

/// A piece of the NFA with one entry and one exit
#[derive(Debug, Clone, Copy)]
struct Fragment {
    start: StateId,
    end: StateId,
}

/// Nondeterministic automaton under construction
struct Nfa {
    eps: Vec<Vec<StateId>>,
    edges: Vec<Vec<(u8, StateId)>>,
    limit: usize,
}

impl Nfa {
    fn new(limit: usize) -> Self {
        Self {
            eps: Vec::new(),
            edges: Vec::new(),
            limit,
        }
    }

    fn add_state(&mut self) -> PatternResult<StateId> {
        if self.eps.len() >= self.limit {
            return Err(PatternError::TooComplex { limit: self.limit });
        }
        self.eps.push(Vec::new());
        self.edges.push(Vec::new());
        Ok((self.eps.len() - 1) as StateId)
    }

    fn add_eps(&mut self, from: StateId, to: StateId) {
        self.eps[from as usize].push(to);
    }

    fn add_edge(&mut self, from: StateId, symbol: usize, to: StateId) {
        self.edges[from as usize].push((symbol as u8, to));
    }

    fn add_set(&mut self, from: StateId, set: CharSet, to: StateId) {
        for symbol in set.symbols() {
            self.add_edge(from, symbol, to);
        }
    }

    /// Subset construction, then minimization
    fn determinize(&self, fragment: Fragment, limit: usize) -> PatternResult<Automaton> {
        let mut closure = Closure::new(self.eps.len());
        let mut index: FxHashMap<Vec<StateId>, StateId> = FxHashMap::default();
        let mut sets: Vec<Vec<StateId>> = Vec::new();

        let first = closure.close(self, vec![fragment.start]);
        index.insert(first.clone(), 0);
        sets.push(first);

        let mut moves: Vec<Vec<StateId>> = vec![Vec::new(); ALPHABET_SIZE];
        let mut accepting = Vec::new();
        let mut table = Vec::new();
        let mut i = 0;
        while i < sets.len() {
            accepting.push(sets[i].binary_search(&fragment.end).is_ok());
            for &state in &sets[i] {
                for &(symbol, to) in &self.edges[state as usize] {
                    moves[symbol as usize].push(to);
                }
            }

            for symbol in 0..ALPHABET_SIZE {
                if moves[symbol].is_empty() {
                    table.push(DEAD);
                    continue;
                }
                let target = closure.close(self, std::mem::take(&mut moves[symbol]));
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
}

/// Epsilon closure with a reusable visited mark
struct Closure {
    marks: Vec<u32>,
    stamp: u32,
    stack: Vec<StateId>,
}

impl Closure {
    fn new(states: usize) -> Self {
        Self {
            marks: vec![0; states],
            stamp: 0,
            stack: Vec::new(),
        }
    }

    /// Sorted, deduplicated closure of `seeds`
    fn close(&mut self, nfa: &Nfa, seeds: Vec<StateId>) -> Vec<StateId> {
        self.stamp += 1;
        let mut out = Vec::with_capacity(seeds.len());
        self.stack.extend(seeds);
        while let Some(state) = self.stack.pop() {
            let mark = &mut self.marks[state as usize];
            if *mark == self.stamp {
                continue;
            }
            *mark = self.stamp;
            out.push(state);
            self.stack.extend(&nfa.eps[state as usize]);
        }
        out.sort_unstable();
        out
    }
}

struct Compiler {
    nfa: Nfa,
}

impl Compiler {
    fn fragment(&mut self, pattern: &Pattern, quoted: bool) -> PatternResult<Fragment> {
        match pattern {
            Pattern::Empty => {
                let (start, end) = (self.nfa.add_state()?, self.nfa.add_state()?);
                self.nfa.add_eps(start, end);
                Ok(Fragment { start, end })
            }
            Pattern::Class(set) => {
                let (start, end) = (self.nfa.add_state()?, self.nfa.add_state()?);
                self.nfa.add_set(start, *set, end);
                if !quoted {
                    self.nfa.add_edge(start, SPACE, start);
                    self.nfa.add_edge(end, SPACE, end);
                }
                Ok(Fragment { start, end })
            }
            Pattern::Concat(items) => {
                let start = self.nfa.add_state()?;
                let mut end = start;
                for item in items {
                    let next = self.fragment(item, quoted)?;
                    self.nfa.add_eps(end, next.start);
                    end = next.end;
                }
                Ok(Fragment { start, end })
            }
            Pattern::Alt(branches) => {
                let (start, end) = (self.nfa.add_state()?, self.nfa.add_state()?);
                for branch in branches {
                    let next = self.fragment(branch, quoted)?;
                    self.nfa.add_eps(start, next.start);
                    self.nfa.add_eps(next.end, end);
                }
                Ok(Fragment { start, end })
            }
            Pattern::Repeat { inner, min, max } => {
                let start = self.nfa.add_state()?;
                let mut end = start;
                for _ in 0..*min {
                    let next = self.fragment(inner, quoted)?;
                    self.nfa.add_eps(end, next.start);
                    end = next.end;
                }
                match max {
                    None => {
                        let hub = self.nfa.add_state()?;
                        self.nfa.add_eps(end, hub);
                        let body = self.fragment(inner, quoted)?;
                        self.nfa.add_eps(hub, body.start);
                        self.nfa.add_eps(body.end, hub);
                        end = hub;
                    }
                    Some(max) => {
                        let exit = self.nfa.add_state()?;
                        for _ in *min..*max {
                            self.nfa.add_eps(end, exit);
                            let next = self.fragment(inner, quoted)?;
                            self.nfa.add_eps(end, next.start);
                            end = next.end;
                        }
                        self.nfa.add_eps(end, exit);
                        end = exit;
                    }
                }
                Ok(Fragment { start, end })
            }
            Pattern::Quoted(inner) => self.fragment(inner, true),
            Pattern::Intersect(operands) => {
                let limit = self.nfa.limit;
                let mut product: Option<Automaton> = None;
                for operand in operands {
                    let next = Automaton::build(operand, quoted, limit)?;
                    product = Some(match product {
                        None => next,
                        Some(acc) => acc.intersect(&next, limit)?,
                    });
                }
                self.embed(&product.unwrap_or_else(Automaton::empty))
            }
            Pattern::Anagram(parts) => {
                let automaton = anagram::compile_anagram(parts, quoted, self.nfa.limit)?;
                self.embed(&automaton)
            }
        }
    }

    /// Copy a deterministic automaton into the NFA
    fn embed(&mut self, automaton: &Automaton) -> PatternResult<Fragment> {
        let end = self.nfa.add_state()?;
        if automaton.is_empty() {
            let start = self.nfa.add_state()?;
            return Ok(Fragment { start, end });
        }

        let base = self.nfa.eps.len() as StateId;
        for _ in 0..automaton.num_states() {
            self.nfa.add_state()?;
        }
        for state in 0..automaton.num_states() as StateId {
            for symbol in 0..ALPHABET_SIZE {
                let next = automaton.next(state, symbol);
                if next != DEAD {
                    self.nfa.add_edge(base + state, symbol, base + next);
                }
            }
            if automaton.is_accepting(state) {
                self.nfa.add_eps(base + state, end);
            }
        }

        Ok(Fragment {
            start: base + automaton.start(),
            end,
        })
    }
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
    fn test_literals_and_word_breaks() {
        let a = compile("ab");
        assert!(a.accepts("ab"));
        assert!(a.accepts("a b"));
        assert!(a.accepts(" a  b "));
        assert!(!a.accepts("abc"));

        let quoted = compile("\"ab\"");
        assert!(quoted.accepts("ab"));
        assert!(!quoted.accepts("a b"));
    }

    #[test]
    fn test_classes() {
        let a = compile("\"#A_.\"");
        assert!(a.accepts("1bc "));
        assert!(a.accepts("2z9x"));
        assert!(!a.accepts("a111"));
        assert!(!a.accepts("11 1"));

        let cv = compile("\"CV\"");
        assert!(cv.accepts("ya"));
        assert!(!cv.accepts("ay"));
    }

    #[test]
    fn test_repeats() {
        let a = compile("\"a{2,3}\"");
        assert!(!a.accepts("a"));
        assert!(a.accepts("aa"));
        assert!(a.accepts("aaa"));
        assert!(!a.accepts("aaaa"));

        let star = compile("\"(ab)*\"");
        assert!(star.accepts(""));
        assert!(star.accepts("abab"));
        assert!(!star.accepts("aba"));

        let plus = compile("\"x+\"");
        assert!(!plus.accepts(""));
        assert!(plus.accepts("xxx"));
    }

    #[test]
    fn test_optional_space() {
        let a = compile("\"a-b\"");
        assert!(a.accepts("ab"));
        assert!(a.accepts("a b"));
        assert!(!a.accepts("a  b"));
    }

    #[test]
    fn test_intersection() {
        let a = compile("\"_*a_*\"&\"_*b_*\"");
        assert!(a.accepts("ab"));
        assert!(a.accepts("ba"));
        assert!(!a.accepts("aa"));
    }

    #[test]
    fn test_contradiction_is_empty() {
        let a = compile("\"a\"&\"b\"");
        assert!(a.is_empty());
        assert!(!a.accepts("a"));
        assert!(!a.accepts(""));
    }

    #[test]
    fn test_minimal_and_deterministic() {
        // (a|a) and a compile to the same automaton
        assert_eq!(compile("\"(a|a)\""), compile("\"a\""));
        assert_eq!(compile("\"a\"").num_states(), 2);
    }

    #[test]
    fn test_state_limit() {
        let pattern = parse_pattern("\"(_|_ _){200}\"").unwrap();
        let err = Automaton::compile(&pattern, 100).unwrap_err();
        assert_eq!(err, PatternError::TooComplex { limit: 100 });
    }

    #[test]
    fn test_whole_words_requires_trailing_space() {
        let a = Automaton::compile(&parse_pattern("ab").unwrap().whole_words(), LIMIT).unwrap();
        assert!(a.accepts("ab "));
        assert!(!a.accepts("ab"));
    }
}
