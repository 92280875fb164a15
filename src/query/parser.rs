use crate::error::{PatternError, PatternResult};
use crate::utils::{is_corpus_byte, symbol_index, ALPHABET_SIZE};

/// Largest finite repetition bound accepted in `{m,n}`
pub const MAX_REPEAT: u32 = 255;

/// A set of corpus characters, one bit per alphabet symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharSet(u64);

impl CharSet {
    pub const EMPTY: CharSet = CharSet(0);
    const FULL: u64 = (1 << ALPHABET_SIZE) - 1;

    pub fn single(byte: u8) -> Self {
        let mut set = Self::EMPTY;
        set.insert(byte);
        set
    }

    pub fn from_bytes(bytes: impl IntoIterator<Item = u8>) -> Self {
        let mut set = Self::EMPTY;
        for byte in bytes {
            set.insert(byte);
        }
        set
    }

    /// `.`: any letter, digit or space
    pub fn any() -> Self {
        CharSet(Self::FULL)
    }

    /// `_`: any letter or digit
    pub fn alnum() -> Self {
        Self::from_bytes((b'0'..=b'9').chain(b'a'..=b'z'))
    }

    /// `#`
    pub fn digits() -> Self {
        Self::from_bytes(b'0'..=b'9')
    }

    /// `A`
    pub fn letters() -> Self {
        Self::from_bytes(b'a'..=b'z')
    }

    /// `C`: letters other than a, e, i, o, u (so y is a consonant)
    pub fn consonants() -> Self {
        CharSet(Self::letters().0 & !Self::vowels().0)
    }

    /// `V`
    pub fn vowels() -> Self {
        Self::from_bytes(*b"aeiou")
    }

    /// Bytes outside the corpus alphabet are ignored
    pub fn insert(&mut self, byte: u8) {
        if let Some(sym) = symbol_index(byte) {
            self.0 |= 1 << sym;
        }
    }

    pub fn contains(&self, byte: u8) -> bool {
        symbol_index(byte).is_some_and(|sym| self.0 & (1 << sym) != 0)
    }

    pub fn union(self, other: CharSet) -> Self {
        CharSet(self.0 | other.0)
    }

    /// Everything in `.` that is not in this set
    pub fn complement(self) -> Self {
        CharSet(!self.0 & Self::FULL)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Alphabet symbol indices in the set, ascending
    pub fn symbols(self) -> impl Iterator<Item = usize> {
        (0..ALPHABET_SIZE).filter(move |&sym| self.0 & (1 << sym) != 0)
    }
}

/// Parsed query pattern.
///
/// Outside quotes, every single-character atom may be surrounded by any
/// number of spaces, so word breaks can fall anywhere. `Quoted` turns that
/// off for everything inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Matches only the empty string
    Empty,
    /// One character from the set
    Class(CharSet),
    Concat(Vec<Pattern>),
    /// Any of the branches
    Alt(Vec<Pattern>),
    /// Texts matched by every operand
    Intersect(Vec<Pattern>),
    /// `min` to `max` copies; `max: None` is unbounded
    Repeat {
        inner: Box<Pattern>,
        min: u32,
        max: Option<u32>,
    },
    Quoted(Box<Pattern>),
    /// Every part used exactly once, in any order
    Anagram(Vec<Pattern>),
}

impl Pattern {
    pub fn literal(byte: u8) -> Self {
        Pattern::Class(CharSet::single(byte))
    }

    /// The pattern followed by a mandatory space, so matches end on a word
    /// boundary
    pub fn whole_words(self) -> Self {
        Pattern::Concat(vec![
            self,
            Pattern::Quoted(Box::new(Pattern::literal(b' '))),
        ])
    }
}

/// Parse a query expression
pub fn parse_pattern(input: &str) -> PatternResult<Pattern> {
    let mut parser = PatternParser::new(input);
    parser.parse()
}

/// Pattern parser
struct PatternParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PatternParser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse(&mut self) -> PatternResult<Pattern> {
        let pattern = self.parse_expr(false)?;
        match self.peek() {
            None if pattern == Pattern::Empty => {
                Err(PatternError::syntax(0, "empty expression"))
            }
            None => Ok(pattern),
            Some(b')') => Err(PatternError::syntax(self.pos, "unbalanced ')'")),
            Some(b'>') => Err(PatternError::syntax(self.pos, "unbalanced '>'")),
            Some(_) => Err(self.unexpected()),
        }
    }

    /// branch ('|' branch)*
    fn parse_expr(&mut self, quoted: bool) -> PatternResult<Pattern> {
        let mut branches = vec![self.parse_branch(quoted)?];
        while self.consume(b'|') {
            branches.push(self.parse_branch(quoted)?);
        }

        Ok(if branches.len() == 1 {
            branches.swap_remove(0)
        } else {
            Pattern::Alt(branches)
        })
    }

    /// factor ('&' factor)*
    fn parse_branch(&mut self, quoted: bool) -> PatternResult<Pattern> {
        let first_at = self.pos;
        let first = self.parse_factor(quoted)?;
        if self.peek() != Some(b'&') {
            return Ok(first);
        }

        let mut operands = vec![(first_at, first)];
        while self.consume(b'&') {
            let at = self.pos;
            operands.push((at, self.parse_factor(quoted)?));
        }

        if let Some((at, _)) = operands.iter().find(|(_, op)| *op == Pattern::Empty) {
            return Err(PatternError::syntax(*at, "empty operand to '&'"));
        }
        Ok(Pattern::Intersect(
            operands.into_iter().map(|(_, op)| op).collect(),
        ))
    }

    /// piece*
    fn parse_factor(&mut self, quoted: bool) -> PatternResult<Pattern> {
        let mut pieces = Vec::new();
        while let Some(piece) = self.parse_piece(quoted)? {
            pieces.push(piece);
        }

        Ok(match pieces.len() {
            0 => Pattern::Empty,
            1 => pieces.swap_remove(0),
            _ => Pattern::Concat(pieces),
        })
    }

    /// atom, optionally followed by one of `* + ? {m} {m,} {m,n}`
    fn parse_piece(&mut self, quoted: bool) -> PatternResult<Option<Pattern>> {
        let Some(atom) = self.parse_atom(quoted)? else {
            return Ok(None);
        };

        let (min, max) = match self.peek() {
            Some(b'{') => self.parse_bounds()?,
            Some(op @ (b'*' | b'+' | b'?')) => {
                self.advance();
                match op {
                    b'*' => (0, None),
                    b'+' => (1, None),
                    _ => (0, Some(1)),
                }
            }
            _ => return Ok(Some(atom)),
        };

        Ok(Some(Pattern::Repeat {
            inner: Box::new(atom),
            min,
            max,
        }))
    }

    fn parse_bounds(&mut self) -> PatternResult<(u32, Option<u32>)> {
        let start = self.pos;
        self.advance();

        let min = self.parse_number()?;
        let max = if self.consume(b',') {
            if self.peek() == Some(b'}') {
                None
            } else {
                Some(self.parse_number()?)
            }
        } else {
            Some(min)
        };

        if !self.consume(b'}') {
            return Err(PatternError::syntax(self.pos, "expected '}'"));
        }
        if let Some(max) = max {
            if max < min {
                return Err(PatternError::syntax(start, "repeat maximum below minimum"));
            }
            if max > MAX_REPEAT {
                return Err(PatternError::syntax(
                    start,
                    format!("repeat bound above {MAX_REPEAT}"),
                ));
            }
        }
        Ok((min, max))
    }

    /// Decimal digits; none at all reads as zero
    fn parse_number(&mut self) -> PatternResult<u32> {
        let start = self.pos;
        let mut value: u32 = 0;
        while let Some(digit @ b'0'..=b'9') = self.peek() {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u32::from(digit - b'0')))
                .ok_or_else(|| PatternError::syntax(start, "repeat count too large"))?;
            self.advance();
        }
        Ok(value)
    }

    /// Returns `None` at anything that ends a factor
    fn parse_atom(&mut self, quoted: bool) -> PatternResult<Option<Pattern>> {
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        match ch {
            b'|' | b'&' | b')' | b'>' => Ok(None),
            b'"' if quoted => Ok(None),
            b'"' => {
                self.advance();
                let inner = self.parse_expr(true)?;
                if !self.consume(b'"') {
                    return Err(PatternError::syntax(start, "unclosed quote"));
                }
                Ok(Some(Pattern::Quoted(Box::new(inner))))
            }
            b'(' => {
                self.advance();
                let inner = self.parse_expr(quoted)?;
                if !self.consume(b')') {
                    return Err(PatternError::syntax(start, "unclosed '('"));
                }
                Ok(Some(inner))
            }
            b'<' => self.parse_anagram(quoted).map(Some),
            b'[' => self.parse_bracket().map(Some),
            b'*' | b'+' | b'?' | b'{' => Err(PatternError::syntax(start, "nothing to repeat")),
            b'\\' => Err(PatternError::syntax(start, "escapes are not supported")),
            b'-' => {
                self.advance();
                Ok(Some(Pattern::Repeat {
                    inner: Box::new(Pattern::literal(b' ')),
                    min: 0,
                    max: Some(1),
                }))
            }
            _ => match class_set(ch) {
                Some(set) => {
                    self.advance();
                    Ok(Some(Pattern::Class(set)))
                }
                None => Err(self.unexpected()),
            },
        }
    }

    /// `<part part ...>`, where each part is a piece
    fn parse_anagram(&mut self, quoted: bool) -> PatternResult<Pattern> {
        let start = self.pos;
        self.advance();

        let mut parts = Vec::new();
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.advance();
                    break;
                }
                None => return Err(PatternError::syntax(start, "unclosed '<'")),
                Some(_) => match self.parse_piece(quoted)? {
                    Some(part) => parts.push(part),
                    None => return Err(self.unexpected()),
                },
            }
        }

        if parts.is_empty() {
            return Err(PatternError::syntax(start, "empty anagram"));
        }
        Ok(Pattern::Anagram(parts))
    }

    /// `[...]` or `[^...]` over single-character classes and ranges like `a-f`
    fn parse_bracket(&mut self) -> PatternResult<Pattern> {
        let start = self.pos;
        self.advance();
        let negate = self.consume(b'^');

        let mut set = CharSet::EMPTY;
        let mut previous: Option<u8> = None;
        loop {
            match self.peek() {
                None => return Err(PatternError::syntax(start, "unclosed '['")),
                Some(b']') => {
                    self.advance();
                    break;
                }
                Some(b'-') => {
                    let at = self.pos;
                    self.advance();
                    let (Some(low), Some(high)) = (previous, self.peek().filter(|&b| is_corpus_byte(b)))
                    else {
                        return Err(PatternError::syntax(at, "bad character range"));
                    };
                    if high < low {
                        return Err(PatternError::syntax(at, "reversed character range"));
                    }
                    if let Some(bad) = (low..=high).find(|&b| !is_corpus_byte(b)) {
                        return Err(PatternError::syntax(
                            at,
                            format!("range includes {:?}", bad as char),
                        ));
                    }
                    set = set.union(CharSet::from_bytes(low..=high));
                    self.advance();
                    previous = None;
                }
                Some(ch) => match class_set(ch) {
                    Some(class) => {
                        set = set.union(class);
                        previous = is_corpus_byte(ch).then_some(ch);
                        self.advance();
                    }
                    None => return Err(self.unexpected()),
                },
            }
        }

        Ok(Pattern::Class(if negate { set.complement() } else { set }))
    }

    fn unexpected(&self) -> PatternError {
        let ch = self.input[self.pos..].chars().next().unwrap_or('?');
        PatternError::syntax(self.pos, format!("unexpected character {ch:?}"))
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn consume(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Only ever called on ASCII, so `pos` stays on a char boundary
    fn advance(&mut self) {
        if self.pos < self.input.len() {
            self.pos += 1;
        }
    }
}

/// The set matched by a single-character atom
fn class_set(ch: u8) -> Option<CharSet> {
    match ch {
        b'a'..=b'z' | b'0'..=b'9' | b' ' => Some(CharSet::single(ch)),
        b'.' => Some(CharSet::any()),
        b'_' => Some(CharSet::alnum()),
        b'#' => Some(CharSet::digits()),
        b'A' => Some(CharSet::letters()),
        b'C' => Some(CharSet::consonants()),
        b'V' => Some(CharSet::vowels()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(bytes: &[u8]) -> Pattern {
        Pattern::Class(CharSet::from_bytes(bytes.iter().copied()))
    }

    fn syntax_position(input: &str) -> usize {
        match parse_pattern(input) {
            Err(PatternError::Syntax { position, .. }) => position,
            other => panic!("expected syntax error for {input:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_concat() {
        let p = parse_pattern("ab").unwrap();
        assert_eq!(p, Pattern::Concat(vec![Pattern::literal(b'a'), Pattern::literal(b'b')]));
    }

    #[test]
    fn test_named_classes() {
        assert_eq!(CharSet::any().len(), 37);
        assert_eq!(CharSet::alnum().len(), 36);
        assert_eq!(CharSet::digits().len(), 10);
        assert_eq!(CharSet::letters().len(), 26);
        assert_eq!(CharSet::vowels().len(), 5);
        assert_eq!(CharSet::consonants().len(), 21);
        assert!(CharSet::consonants().contains(b'y'));
        assert!(!CharSet::consonants().contains(b'e'));
        assert!(!CharSet::alnum().contains(b' '));
        assert!(CharSet::any().contains(b' '));
    }

    #[test]
    fn test_precedence() {
        // '|' binds loosest, then '&', then concatenation
        let p = parse_pattern("ab&c|d").unwrap();
        let Pattern::Alt(branches) = p else {
            panic!("expected alternation");
        };
        assert_eq!(branches.len(), 2);
        assert!(matches!(&branches[0], Pattern::Intersect(ops) if ops.len() == 2));
        assert_eq!(branches[1], Pattern::literal(b'd'));
    }

    #[test]
    fn test_repetition_forms() {
        let bounds = |input: &str| match parse_pattern(input).unwrap() {
            Pattern::Repeat { min, max, .. } => (min, max),
            other => panic!("expected repeat, got {other:?}"),
        };
        assert_eq!(bounds("a*"), (0, None));
        assert_eq!(bounds("a+"), (1, None));
        assert_eq!(bounds("a?"), (0, Some(1)));
        assert_eq!(bounds("a{3}"), (3, Some(3)));
        assert_eq!(bounds("a{2,}"), (2, None));
        assert_eq!(bounds("a{2,5}"), (2, Some(5)));
        assert_eq!(bounds("_{0,255}"), (0, Some(255)));
    }

    #[test]
    fn test_repeat_applies_to_one_atom() {
        let p = parse_pattern("ab*").unwrap();
        let Pattern::Concat(items) = p else {
            panic!("expected concat");
        };
        assert_eq!(items[0], Pattern::literal(b'a'));
        assert!(matches!(&items[1], Pattern::Repeat { .. }));
    }

    #[test]
    fn test_bad_bounds() {
        assert!(parse_pattern("a{5,2}").is_err());
        assert!(parse_pattern("a{256}").is_err());
        assert!(parse_pattern("a{1,300}").is_err());
        assert!(parse_pattern("a{2").is_err());
        assert!(parse_pattern("a{99999999999}").is_err());
        assert!(parse_pattern("a**").is_err());
    }

    #[test]
    fn test_brackets() {
        assert_eq!(parse_pattern("[a-c]").unwrap(), class(b"abc"));
        assert_eq!(parse_pattern("[xa-b]").unwrap(), class(b"abx"));
        assert_eq!(
            parse_pattern("[#V]").unwrap(),
            Pattern::Class(CharSet::digits().union(CharSet::vowels()))
        );
        let Pattern::Class(negated) = parse_pattern("[^a]").unwrap() else {
            panic!("expected class");
        };
        assert_eq!(negated.len(), 36);
        assert!(negated.contains(b' '));
        assert!(!negated.contains(b'a'));
    }

    #[test]
    fn test_bad_brackets() {
        assert!(parse_pattern("[a-").is_err());
        assert!(parse_pattern("[-a]").is_err());
        assert!(parse_pattern("[z-a]").is_err());
        assert!(parse_pattern("[0-z]").is_err());
        assert!(parse_pattern("[Q]").is_err());
    }

    #[test]
    fn test_dash_is_optional_space() {
        assert_eq!(
            parse_pattern("-").unwrap(),
            Pattern::Repeat {
                inner: Box::new(Pattern::literal(b' ')),
                min: 0,
                max: Some(1)
            }
        );
    }

    #[test]
    fn test_quotes_and_anagrams() {
        let p = parse_pattern("\"<ab>\"").unwrap();
        let Pattern::Quoted(inner) = p else {
            panic!("expected quote");
        };
        assert_eq!(
            *inner,
            Pattern::Anagram(vec![Pattern::literal(b'a'), Pattern::literal(b'b')])
        );
    }

    #[test]
    fn test_anagram_parts_are_pieces() {
        let p = parse_pattern("<(ab)c?>").unwrap();
        let Pattern::Anagram(parts) = p else {
            panic!("expected anagram");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[1], Pattern::Repeat { .. }));
    }

    #[test]
    fn test_error_positions() {
        assert_eq!(syntax_position(""), 0);
        assert_eq!(syntax_position("ab)"), 2);
        assert_eq!(syntax_position("(ab"), 0);
        assert_eq!(syntax_position("x\"ab"), 1);
        assert_eq!(syntax_position("a<b"), 1);
        assert_eq!(syntax_position("<>"), 0);
        assert_eq!(syntax_position("ab>"), 2);
        assert_eq!(syntax_position("a\\b"), 1);
        assert_eq!(syntax_position("abZ"), 2);
        assert_eq!(syntax_position("*a"), 0);
        assert_eq!(syntax_position("a&"), 2);
        assert_eq!(syntax_position("&a"), 0);
    }

    #[test]
    fn test_whole_words_appends_quoted_space() {
        let p = Pattern::literal(b'a').whole_words();
        assert_eq!(
            p,
            Pattern::Concat(vec![
                Pattern::literal(b'a'),
                Pattern::Quoted(Box::new(Pattern::literal(b' ')))
            ])
        );
    }

    #[test]
    fn test_empty_branch_is_allowed() {
        assert_eq!(
            parse_pattern("a|").unwrap(),
            Pattern::Alt(vec![Pattern::literal(b'a'), Pattern::Empty])
        );
    }
}
