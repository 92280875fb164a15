//! State machines that steer the search.
//!
//! The search engine never looks inside a filter: it asks for a start state,
//! feeds index labels one at a time, and checks whether the state reached
//! accepts. A compiled [`Automaton`] is the general case; the anagram and
//! keypad filters track their state arithmetically instead of compiling a
//! pattern.

use crate::error::{PatternError, PatternResult};
use crate::query::automaton::{Automaton, StateId};

/// A deterministic acceptor over corpus bytes
pub trait SearchFilter {
    fn start(&self) -> u64;

    fn is_accepting(&self, state: u64) -> bool;

    /// State reached from `state` on byte `ch`, or `None` to prune
    fn transition(&self, state: u64, ch: u8) -> Option<u64>;
}

impl SearchFilter for Automaton {
    fn start(&self) -> u64 {
        u64::from(Automaton::start(self))
    }

    fn is_accepting(&self, state: u64) -> bool {
        StateId::try_from(state).is_ok_and(|s| Automaton::is_accepting(self, s))
    }

    fn transition(&self, state: u64, ch: u8) -> Option<u64> {
        let state = StateId::try_from(state).ok()?;
        self.step(state, ch).map(u64::from)
    }
}

/// Letter-multiset filter behind `find-anagrams`.
///
/// The state counts letters used so far, one mixed-radix digit per distinct
/// letter. Spaces are free, but a phrase must end in a space after every
/// letter is used, so matches fall on word boundaries.
#[derive(Debug, Clone)]
pub struct AnagramFilter {
    /// Per-byte place value, 0 for bytes not in the anagram
    place: [u64; 256],
    /// Per-byte digit radix (letter count + 1)
    radix: [u64; 256],
    full: u64,
}

impl AnagramFilter {
    pub fn new(letters: &str) -> PatternResult<Self> {
        let mut counts = [0u64; 256];
        let mut total = 0;
        for (position, ch) in letters.bytes().enumerate() {
            match ch.to_ascii_lowercase() {
                b' ' => {}
                ch @ (b'a'..=b'z' | b'0'..=b'9') => {
                    counts[ch as usize] += 1;
                    total += 1;
                }
                _ => {
                    return Err(PatternError::syntax(
                        position,
                        format!("{:?} can't appear in an anagram", ch as char),
                    ));
                }
            }
        }
        if total == 0 {
            return Err(PatternError::syntax(0, "no letters to anagram"));
        }

        let mut place = [0u64; 256];
        let mut radix = [0u64; 256];
        let mut product: u64 = 1;
        for (ch, &count) in counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            place[ch] = product;
            radix[ch] = count + 1;
            product = product
                .checked_mul(count + 1)
                .ok_or_else(|| PatternError::AnagramTooLong(letters.to_string()))?;
        }

        Ok(Self {
            place,
            radix,
            full: product - 1,
        })
    }

    fn done(&self) -> u64 {
        self.full + 1
    }
}

impl SearchFilter for AnagramFilter {
    fn start(&self) -> u64 {
        0
    }

    fn is_accepting(&self, state: u64) -> bool {
        state == self.done()
    }

    fn transition(&self, state: u64, ch: u8) -> Option<u64> {
        if ch == b' ' {
            return Some(if state == self.full { self.done() } else { state });
        }
        if state >= self.full {
            return None;
        }

        let place = self.place[ch as usize];
        if place == 0 {
            return None;
        }
        let used = (state / place) % self.radix[ch as usize];
        (used + 1 < self.radix[ch as usize]).then_some(state + place)
    }
}

/// Telephone keypad filter behind `find-phone-words`.
///
/// The state is the number of digits matched. Each digit matches itself or
/// one of its keypad letters; spaces are free. One extra state past the end
/// accepts, and is only reached through a space.
#[derive(Debug, Clone)]
pub struct PhoneFilter {
    digits: Vec<u8>,
}

impl PhoneFilter {
    pub fn new(number: &str) -> PatternResult<Self> {
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PatternError::InvalidDigits(number.to_string()));
        }
        Ok(Self {
            digits: number.as_bytes().to_vec(),
        })
    }

    fn len(&self) -> u64 {
        self.digits.len() as u64
    }
}

/// Digit a keypad letter sits on
fn keypad_digit(ch: u8) -> Option<u8> {
    Some(match ch {
        b'a'..=b'c' => b'2',
        b'd'..=b'f' => b'3',
        b'g'..=b'i' => b'4',
        b'j'..=b'l' => b'5',
        b'm'..=b'o' => b'6',
        b'p'..=b's' => b'7',
        b't'..=b'v' => b'8',
        b'w'..=b'z' => b'9',
        b'0'..=b'9' => ch,
        _ => return None,
    })
}

impl SearchFilter for PhoneFilter {
    fn start(&self) -> u64 {
        0
    }

    fn is_accepting(&self, state: u64) -> bool {
        state == self.len() + 1
    }

    fn transition(&self, state: u64, ch: u8) -> Option<u64> {
        if state > self.len() {
            return None;
        }
        if ch == b' ' {
            return Some(if state == self.len() { state + 1 } else { state });
        }

        let wanted = *self.digits.get(state as usize)?;
        (keypad_digit(ch)? == wanted).then_some(state + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse_pattern;

    fn run<F: SearchFilter + ?Sized>(filter: &F, text: &str) -> bool {
        let mut state = filter.start();
        for ch in text.bytes() {
            match filter.transition(state, ch) {
                Some(next) => state = next,
                None => return false,
            }
        }
        filter.is_accepting(state)
    }

    #[test]
    fn test_automaton_filter() {
        let automaton = Automaton::compile(&parse_pattern("c.t").unwrap(), 1000).unwrap();
        assert!(run(&automaton, "cat"));
        assert!(!run(&automaton, "cart"));
    }

    #[test]
    fn test_empty_automaton_filter_has_no_moves() {
        let empty = Automaton::empty();
        assert_eq!(empty.transition(SearchFilter::start(&empty), b'a'), None);
        assert!(!SearchFilter::is_accepting(&empty, SearchFilter::start(&empty)));
    }

    #[test]
    fn test_anagram_filter() {
        let filter = AnagramFilter::new("Listen").unwrap();
        assert!(run(&filter, "silent "));
        assert!(run(&filter, "en list "));
        assert!(!run(&filter, "silent"));
        assert!(!run(&filter, "silents "));
        assert!(!run(&filter, "sileen "));
        assert!(!run(&filter, "silent  x"));
    }

    #[test]
    fn test_anagram_filter_rejects_bad_input() {
        assert!(matches!(
            AnagramFilter::new("ab!"),
            Err(PatternError::Syntax { position: 2, .. })
        ));
        assert!(AnagramFilter::new("  ").is_err());
    }

    #[test]
    fn test_anagram_filter_overflow() {
        let letters: String = (b'a'..=b'z')
            .chain(b'0'..=b'9')
            .flat_map(|ch| std::iter::repeat_n(ch as char, 6))
            .collect();
        assert!(matches!(
            AnagramFilter::new(&letters),
            Err(PatternError::AnagramTooLong(_))
        ));
    }

    #[test]
    fn test_phone_filter() {
        let filter = PhoneFilter::new("2255").unwrap();
        assert!(run(&filter, "call "));
        assert!(run(&filter, "ba ll "));
        assert!(run(&filter, "22 55 "));
        assert!(!run(&filter, "call"));
        assert!(!run(&filter, "calls "));
        assert!(!run(&filter, "cell "));
    }

    #[test]
    fn test_phone_filter_zero_and_one_match_themselves() {
        let filter = PhoneFilter::new("101").unwrap();
        assert!(run(&filter, "101 "));
        assert!(!run(&filter, "1a1 "));
    }

    #[test]
    fn test_phone_filter_rejects_non_digits() {
        assert!(matches!(
            PhoneFilter::new("555-1212"),
            Err(PatternError::InvalidDigits(_))
        ));
        assert!(PhoneFilter::new("").is_err());
    }
}
