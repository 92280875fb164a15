use crate::error::IndexResult;
use crate::index::reader::IndexReader;
use crate::index::types::INDEX_VERSION;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Summary figures for one index file
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub path: String,
    pub version: u32,
    pub file_size: u64,
    pub total: u64,
    pub entry_count: u64,
    pub node_count: u64,
    /// Most frequent first characters, with their counts
    pub top_initials: Vec<(char, u64)>,
}

impl IndexStats {
    pub fn collect(path: &Path, reader: &IndexReader) -> IndexResult<Self> {
        let summary = reader.summary();
        let root = reader.root_choice();
        let mut initials = Vec::new();
        reader.children(root.next, root.count, &mut initials)?;
        initials.sort_by(|a, b| b.count.cmp(&a.count));

        Ok(Self {
            path: path.display().to_string(),
            version: INDEX_VERSION,
            file_size: reader.byte_len(),
            total: summary.total,
            entry_count: summary.entry_count,
            node_count: summary.node_count,
            top_initials: initials
                .iter()
                .take(10)
                .map(|c| (c.ch as char, c.count))
                .collect(),
        })
    }
}

/// Display index statistics, as a table or as JSON
pub fn show_stats<W: Write>(path: &Path, json: bool, out: &mut W) -> anyhow::Result<()> {
    let reader = IndexReader::open(path)?;
    let stats = IndexStats::collect(path, &reader)?;

    if json {
        serde_json::to_writer_pretty(&mut *out, &stats)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(out, "Index Statistics")?;
    writeln!(out, "================")?;
    writeln!(out)?;
    writeln!(out, "Index file:       {}", stats.path)?;
    writeln!(out, "Index version:    {}", stats.version)?;
    writeln!(out, "Index size:       {}", format_size(stats.file_size))?;
    writeln!(out, "Total count:      {}", stats.total)?;
    writeln!(out, "Distinct texts:   {}", stats.entry_count)?;
    writeln!(out, "Stored nodes:     {}", stats.node_count)?;

    if !stats.top_initials.is_empty() {
        writeln!(out)?;
        writeln!(out, "Top initial characters:")?;
        for (ch, count) in &stats.top_initials {
            let share = *count as f64 * 100.0 / stats.total.max(1) as f64;
            writeln!(out, "  {:?} {:>12} {:6.2}%", ch, count, share)?;
        }
    }

    Ok(())
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
