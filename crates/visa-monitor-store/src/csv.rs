// crates/visa-monitor-store/src/csv.rs
// ============================================================================
// Module: CSV Codec
// Description: Minimal RFC 4180 reader and writer for batch and export files.
// Purpose: Read operator CSVs and write failure exports without extra deps.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Quote- and CRLF-tolerant parsing into rows of strings, plus a writer that
//! quotes only when needed. A leading UTF-8 byte-order mark (common in
//! spreadsheet exports) is stripped on read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::mem::take;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// UTF-8 byte-order mark.
const BOM: char = '\u{feff}';

// ============================================================================
// SECTION: Table
// ============================================================================

/// Header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    /// Header cells.
    pub headers: Vec<String>,
    /// Data rows; each row is padded to the header width.
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parses `text`, treating the first row as the header.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut rows = parse_rows(text);
        if rows.is_empty() {
            return Self::default();
        }
        let headers: Vec<String> = rows.remove(0).into_iter().map(|cell| cell.trim().to_string()).collect();
        let width = headers.len();
        for row in &mut rows {
            if row.len() < width {
                row.resize(width, String::new());
            }
        }
        Self {
            headers,
            rows,
        }
    }

    /// Returns the index of the first header matching any candidate.
    ///
    /// Exact (trimmed, ASCII case-insensitive) matches win over substring
    /// matches.
    #[must_use]
    pub fn find_column(&self, candidates: &[&str]) -> Option<usize> {
        for candidate in candidates {
            if let Some(index) =
                self.headers.iter().position(|header| header.eq_ignore_ascii_case(candidate))
            {
                return Some(index);
            }
        }
        for candidate in candidates {
            let needle = candidate.to_lowercase();
            if let Some(index) =
                self.headers.iter().position(|header| header.to_lowercase().contains(&needle))
            {
                return Some(index);
            }
        }
        None
    }

    /// Appends a column filled with empty cells and returns its index.
    pub fn add_column(&mut self, header: &str) -> usize {
        self.headers.push(header.to_string());
        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
        width - 1
    }

    /// Serializes the table with a trailing newline.
    #[must_use]
    pub fn to_csv_string(&self) -> String {
        let mut buf: Vec<u8> = Vec::new();
        let _ = write_row(&mut buf, &self.headers);
        for row in &self.rows {
            let _ = write_row(&mut buf, row);
        }
        match String::from_utf8(buf) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(&err.into_bytes()).into_owned(),
        }
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses comma-separated rows. Blank lines are skipped.
#[must_use]
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    if matches!(chars.peek(), Some('"')) {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    // Trailing row without newline, even when quotes were unterminated.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

// ============================================================================
// SECTION: Writing
// ============================================================================

/// Returns true when a cell must be quoted.
fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes one row followed by `\n`.
///
/// # Errors
///
/// Returns the writer's I/O error.
pub fn write_row<W: Write, S: AsRef<str>>(mut writer: W, row: &[S]) -> io::Result<()> {
    for (index, cell) in row.iter().enumerate() {
        if index > 0 {
            writer.write_all(b",")?;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            write!(writer, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            writer.write_all(cell.as_bytes())?;
        }
    }
    writer.write_all(b"\n")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quotes_crlf_and_bom() {
        let rows = parse_rows("\u{feff}a,\"b,c\"\r\n\"x\"\"y\",z\n\n");
        assert_eq!(rows, vec![vec!["a", "b,c"], vec!["x\"y", "z"]]);
    }

    #[test]
    fn keeps_trailing_row_without_newline() {
        let rows = parse_rows("h1,h2\nv1,");
        assert_eq!(rows, vec![vec!["h1", "h2"], vec!["v1", ""]]);
    }

    #[test]
    fn table_pads_short_rows_and_adds_columns() {
        let mut table = CsvTable::parse("日期,查询码/Code\n2025-06-02\n");
        assert_eq!(table.rows[0], vec!["2025-06-02", ""]);
        let index = table.add_column("签证状态/Status");
        assert_eq!(index, 2);
        assert_eq!(table.rows[0].len(), 3);
        assert_eq!(table.find_column(&["查询码/Code", "code"]), Some(1));
        assert_eq!(table.find_column(&["status"]), Some(2));
    }

    #[test]
    fn writer_quotes_only_when_needed() {
        let mut buf = Vec::new();
        write_row(&mut buf, &["plain", "with,comma", "quote\"d"]).unwrap_or_default();
        assert_eq!(String::from_utf8_lossy(&buf), "plain,\"with,comma\",\"quote\"\"d\"\n");
    }
}
