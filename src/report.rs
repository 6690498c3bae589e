use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::emoji::{EmojiStat, EmojiStats};
use crate::{AppError, Result};

pub const USAGE_HEADER: [&str; 6] = [
    "Emoji",
    "is_custom",
    "reaction",
    "unique_reaction",
    "inline",
    "total",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// Distinct emoji in the usage table.
    pub used: usize,
    pub custom_used: usize,
    pub unused: usize,
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

fn colon_wrapped(name: &str) -> String {
    format!(":{}:", name)
}

/// Usage rows, most used first, ties broken by name.
pub fn usage_rows(stats: &EmojiStats) -> Vec<(&str, &EmojiStat)> {
    let mut rows: Vec<(&str, &EmojiStat)> = stats.iter().collect();
    rows.sort_by(|(a_name, a), (b_name, b)| b.total().cmp(&a.total()).then(a_name.cmp(b_name)));
    rows
}

/// Writes the usage table. Every custom emoji that shows up is removed from
/// `custom`, leaving only the unused ones. Returns the row count and how many
/// of the rows were custom emoji.
pub fn write_usage<W: Write>(
    writer: &mut W,
    stats: &EmojiStats,
    custom: &mut BTreeSet<String>,
) -> io::Result<(usize, usize)> {
    writeln!(writer, "{}", USAGE_HEADER.join(","))?;

    let mut rows = 0;
    let mut custom_used = 0;
    for (name, stat) in usage_rows(stats) {
        let is_custom = custom.remove(name);
        if is_custom {
            custom_used += 1;
        }

        writeln!(
            writer,
            "{},{},{},{},{},{}",
            csv_field(&colon_wrapped(name)),
            is_custom,
            stat.reaction,
            stat.unique_reaction,
            stat.inline,
            stat.total()
        )?;
        rows += 1;
    }

    Ok((rows, custom_used))
}

pub fn write_unused<W: Write>(writer: &mut W, unused: &BTreeSet<String>) -> io::Result<usize> {
    for name in unused {
        writeln!(writer, "{}", csv_field(&colon_wrapped(name)))?;
    }
    Ok(unused.len())
}

fn write_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let to_error = |source: io::Error| AppError::WriteFile {
        path: path.display().to_string(),
        source,
    };

    let file = File::create(path).map_err(to_error)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer).map_err(to_error)?;
    writer.flush().map_err(to_error)
}

/// Writes both report files and consumes the custom emoji set.
pub fn write_report(
    stats: &EmojiStats,
    mut custom: BTreeSet<String>,
    usage_path: &Path,
    unused_path: &Path,
) -> Result<ReportSummary> {
    let mut summary = ReportSummary::default();

    write_file(usage_path, |w| {
        let (used, custom_used) = write_usage(w, stats, &mut custom)?;
        summary.used = used;
        summary.custom_used = custom_used;
        Ok(())
    })?;

    write_file(unused_path, |w| {
        summary.unused = write_unused(w, &custom)?;
        Ok(())
    })?;

    Ok(summary)
}
