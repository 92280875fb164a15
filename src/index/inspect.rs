//! Debugging views of an index: a full dump and a frequency-ordered walk.

use crate::error::IndexResult;
use crate::index::reader::IndexReader;
use crate::index::types::{NodeRef, NO_NODE};
use crate::index::walker::IndexWalker;
use std::io::Write;

/// Print every entry in byte order as `count [text]`
pub fn dump_index<W: Write>(reader: &IndexReader, out: &mut W) -> IndexResult<()> {
    for entry in IndexWalker::new(reader)? {
        let entry = entry?;
        writeln!(out, "{:5} [{}]", entry.count, entry.text)?;
    }
    out.flush()?;
    Ok(())
}

/// Walk down from the root.
///
/// The first `path.len()` levels follow `path`; deeper levels list every
/// child, most frequent first. Stops `depth` levels below the root, which
/// defaults to the length of `path`.
pub fn explore_index<W: Write>(
    reader: &IndexReader,
    path: &[u8],
    depth: Option<usize>,
    out: &mut W,
) -> IndexResult<()> {
    writeln!(
        out,
        "Root ({}) @{}",
        reader.total(),
        offset_label(reader.root())
    )?;

    let mut sofar = Vec::new();
    let root = reader.root_choice();
    walk(
        reader,
        root.next,
        root.count,
        path,
        depth.unwrap_or(path.len()),
        &mut sofar,
        out,
    )?;
    out.flush()?;
    Ok(())
}

fn walk<W: Write>(
    reader: &IndexReader,
    node: NodeRef,
    count: u64,
    path: &[u8],
    depth: usize,
    sofar: &mut Vec<u8>,
    out: &mut W,
) -> IndexResult<()> {
    if depth == 0 {
        return Ok(());
    }

    let mut children = Vec::new();
    reader.children(node, count, &mut children)?;
    let rest = match path.split_first() {
        Some((&ch, rest)) => {
            children.retain(|c| c.ch == ch);
            rest
        }
        None => path,
    };
    // Stable, so equal counts stay in byte order
    children.sort_by(|a, b| b.count.cmp(&a.count));

    for child in children {
        sofar.push(child.ch);
        writeln!(
            out,
            "{} ({}) @{}",
            String::from_utf8_lossy(sofar),
            child.count,
            offset_label(child.next)
        )?;
        walk(reader, child.next, child.count, rest, depth - 1, sofar, out)?;
        sofar.pop();
    }
    Ok(())
}

fn offset_label(node: NodeRef) -> String {
    match node {
        NO_NODE => "leaf".to_string(),
        offset => offset.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::writer::write_to_vec;

    fn reader() -> IndexReader {
        IndexReader::from_bytes(
            write_to_vec([("an ", 2), ("and ", 5), ("ant ", 1), ("bee ", 3)]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_dump_format() {
        let mut out = Vec::new();
        dump_index(&reader(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "    2 [an ]\n    5 [and ]\n    1 [ant ]\n    3 [bee ]\n"
        );
    }

    #[test]
    fn test_explore_follows_path_then_sorts_by_count() {
        let mut out = Vec::new();
        explore_index(&reader(), b"an", Some(3), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("Root (11) @"));
        assert!(lines[1].starts_with("a (8) @"));
        assert!(lines[2].starts_with("an (8) @"));
        assert!(lines[3].starts_with("and (5) @"));
        assert!(lines[4].starts_with("an  (2) @leaf"));
        assert!(lines[5].starts_with("ant (1) @"));
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_explore_default_depth_is_path_length() {
        let mut out = Vec::new();
        explore_index(&reader(), b"b", None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("b (3) @"));
    }
}
