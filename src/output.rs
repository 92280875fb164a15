//! Line protocol for search results.
//!
//! Every line on stdout is either a match, `<score> <text>`, or a heartbeat,
//! `# <nodes>`. Lines are flushed as they are written so a caller reading
//! the pipe sees progress while the search is still running.

use crate::query::{Match, ResultSink};
use std::io::{self, Write};

/// Writes matches and heartbeats to a stream, one per line
pub struct LineEmitter<W: Write> {
    out: W,
}

impl<W: Write> LineEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultSink for LineEmitter<W> {
    fn on_match(&mut self, found: &Match) -> io::Result<()> {
        writeln!(self.out, "{} {}", format_score(found.score), found.text)?;
        self.out.flush()
    }

    fn on_heartbeat(&mut self, nodes: u64) -> io::Result<()> {
        writeln!(self.out, "# {nodes}")?;
        self.out.flush()
    }
}

/// Format a score with 6 significant digits, like C's `%g`
pub fn format_score(score: f64) -> String {
    const PRECISION: i32 = 6;

    if score == 0.0 || !score.is_finite() {
        return format!("{score}");
    }

    // Round to the target precision first; rounding may bump the exponent
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, score);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (PRECISION - 1 - exponent) as usize;
        trim_fraction(&format!("{score:.decimals$}")).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(0.0), "0");
        assert_eq!(format_score(9.0), "9");
        assert_eq!(format_score(1234.5), "1234.5");
        assert_eq!(format_score(1.2000000000000002), "1.2");
        assert_eq!(format_score(0.000125), "0.000125");
        assert_eq!(format_score(3.5e-7), "3.5e-07");
        assert_eq!(format_score(123456789.0), "1.23457e+08");
        assert_eq!(format_score(999999.5), "1e+06");
        assert_eq!(format_score(123456.0), "123456");
        assert_eq!(format_score(1234567.0), "1.23457e+06");
    }

    #[test]
    fn test_emitter_lines() {
        let mut emitter = LineEmitter::new(Vec::new());
        emitter
            .on_match(&Match {
                score: 42.0,
                text: "barack obama".to_string(),
            })
            .unwrap();
        emitter.on_heartbeat(100_000).unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        assert_eq!(out, "42 barack obama\n# 100000\n");
    }
}
