//! Statement execution and output formatting.
//!
//! Result sets are printed in two passes. The first pass fetches every row,
//! measures it, and spools it to an anonymous temp file with `bincode`; the
//! second pass reads the spool back and prints aligned columns. Only column
//! widths are held in memory.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::time::Instant;

use super::variables::Options;
use crate::core::{ColumnMetadata, IndexMetadata, Row, ShellError, ShellResult, TypeTag, Value};
use crate::driver::Cursor;

/// Placeholder printed for binary values unless `showbinary` is on.
pub const BINARY_MARKER: &str = "<binary>";

const INDEX_RULE_WIDTH: usize = 78;

fn spool_error(err: bincode::Error) -> ShellError {
    ShellError::Io(io::Error::other(err))
}

/// Echoes (if enabled), executes and times one statement.
pub fn exec_sql(
    out: &mut dyn Write,
    cursor: &mut Cursor<'_>,
    statement: &str,
    opts: &Options,
) -> ShellResult<()> {
    if opts.echo {
        writeln!(out, "{statement}")?;
    }
    let started = Instant::now();
    cursor.execute(statement, &[])?;
    if opts.timings {
        writeln!(
            out,
            "\nExecution time: {:5.3} seconds",
            started.elapsed().as_secs_f64()
        )?;
    }
    Ok(())
}

/// Row-count report for data-modifying statements.
#[must_use]
pub fn row_count_message(count: Option<i64>) -> String {
    match count {
        None | Some(-1) => "No row count available.".to_string(),
        Some(n) => {
            let n = n.max(0);
            format!("{n} row{}", if n == 1 { "" } else { "s" })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Binary,
    Number,
    Other,
}

impl ColumnKind {
    const fn from_tag(tag: Option<TypeTag>) -> Self {
        match tag {
            Some(TypeTag::Binary) => Self::Binary,
            Some(TypeTag::Number) => Self::Number,
            _ => Self::Other,
        }
    }
}

/// Printable rendering of a binary value: 0x20..=0x7E except `\` kept,
/// everything else replaced by `?`.
#[must_use]
pub fn transliterate(bytes: &[u8], max: Option<usize>) -> String {
    let limit = max.unwrap_or(usize::MAX);
    bytes
        .iter()
        .take(limit)
        .map(|&b| {
            if (0x20..=0x7e).contains(&b) && b != b'\\' {
                char::from(b)
            } else {
                '?'
            }
        })
        .collect()
}

fn format_cell(value: &Value, kind: ColumnKind, opts: &Options) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    match kind {
        ColumnKind::Binary if opts.showbinary => match value.as_bytes() {
            Some(bytes) => transliterate(bytes, opts.binarymax),
            None => transliterate(value.to_string().as_bytes(), opts.binarymax),
        },
        ColumnKind::Binary => BINARY_MARKER.to_string(),
        ColumnKind::Number => value.to_number_string(),
        ColumnKind::Other => value.to_string(),
    }
}

fn pad(text: &str, width: usize, right: bool) -> String {
    if right {
        format!("{text:>width$}")
    } else {
        format!("{text:<width$}")
    }
}

fn write_line(out: &mut dyn Write, cells: &[String]) -> io::Result<()> {
    writeln!(out, "{}", cells.join(" ").trim_end())
}

/// Prints the result set of the last execute. Returns the number of rows.
pub fn render_result_set(
    out: &mut dyn Write,
    cursor: &mut Cursor<'_>,
    opts: &Options,
) -> ShellResult<u64> {
    let Some(description) = cursor.description().map(<[_]>::to_vec) else {
        return Ok(0);
    };
    let kinds: Vec<ColumnKind> = description.iter().map(|c| ColumnKind::from_tag(c.tag)).collect();
    let mut widths: Vec<usize> = description
        .iter()
        .zip(&kinds)
        .map(|(col, kind)| {
            let name = col.name.chars().count();
            if *kind == ColumnKind::Binary {
                name.max(BINARY_MARKER.len())
            } else {
                name
            }
        })
        .collect();

    let mut spool = BufWriter::new(tempfile::tempfile()?);
    let mut total: u64 = 0;
    while let Some(row) = cursor.fetch_one()? {
        for (i, value) in row.iter().enumerate() {
            let kind = kinds.get(i).copied().unwrap_or(ColumnKind::Other);
            let width = format_cell(value, kind, opts).chars().count();
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(width);
            }
        }
        bincode::serialize_into(&mut spool, &row).map_err(spool_error)?;
        total += 1;
    }
    tracing::debug!(rows = total, "result set spooled");

    writeln!(out, "{total} row{}\n", if total == 1 { "" } else { "s" })?;
    if total == 0 {
        return Ok(0);
    }

    let headers: Vec<String> = description
        .iter()
        .zip(&widths)
        .map(|(col, w)| pad(&col.name, *w, false))
        .collect();
    write_line(out, &headers)?;
    let rules: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_line(out, &rules)?;

    let mut file: File = spool.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);
    for _ in 0..total {
        let row: Row = bincode::deserialize_from(&mut reader).map_err(spool_error)?;
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let kind = kinds.get(i).copied().unwrap_or(ColumnKind::Other);
                let width = widths.get(i).copied().unwrap_or(0);
                pad(&format_cell(value, kind, opts), width, kind == ColumnKind::Number)
            })
            .collect();
        write_line(out, &cells)?;
    }
    writeln!(out)?;
    Ok(total)
}

/// Prints table columns and, if `indexes` is given, the index section.
/// `Some(None)` means the driver cannot report indexes.
pub fn render_description(
    out: &mut dyn Write,
    table: &str,
    columns: &[ColumnMetadata],
    indexes: Option<Option<&[IndexMetadata]>>,
) -> io::Result<()> {
    let header = format!("Table {table}:");
    let dashes = "-".repeat(header.chars().count());
    write!(out, "\n{dashes}\n{header}\n{dashes}\n\n")?;

    let width = columns.iter().map(|c| c.name.chars().count()).max().unwrap_or(0);
    for col in columns {
        let line = format!(
            "{:<width$}  {} {}",
            col.name,
            col.display_type(),
            col.nullability()
        );
        writeln!(out, "{}", line.trim_end())?;
    }

    if let Some(indexes) = indexes {
        write!(out, "\n--------\nIndexes:\n--------\n\n")?;
        match indexes {
            None => writeln!(out, "Index metadata is not supported by this driver.")?,
            Some([]) => writeln!(out, "No indexes.")?,
            Some(list) => render_indexes(out, list)?,
        }
    }
    writeln!(out)
}

fn render_indexes(out: &mut dyn Write, indexes: &[IndexMetadata]) -> io::Result<()> {
    let width = indexes.iter().map(|i| i.name.chars().count()).max().unwrap_or(0);
    let rule = "-".repeat(INDEX_RULE_WIDTH);
    for (n, index) in indexes.iter().enumerate() {
        if n > 0 {
            writeln!(out, "{rule}")?;
        }
        writeln!(
            out,
            "{:<width$} Columns:     ({})",
            index.name,
            index.columns.join(", ")
        )?;
        if let Some(desc) = index.description.as_deref().filter(|d| !d.is_empty()) {
            writeln!(out, "{:width$} Description: {desc}", "")?;
        }
    }
    Ok(())
}
