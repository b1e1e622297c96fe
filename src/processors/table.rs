//! Tabular text detection and table balance checks

use regex::Regex;
use std::sync::OnceLock;

use crate::core::errors::RestoreError;

/// Minimum rows for a whitespace-aligned run to count as a table
const MIN_TABLE_ROWS: usize = 2;

/// Minimum columns per row
const MIN_TABLE_COLUMNS: usize = 2;

fn column_gap() -> &'static Regex {
    static GAP: OnceLock<Regex> = OnceLock::new();
    GAP.get_or_init(|| Regex::new(r"\t+| {2,}").expect("valid column gap pattern"))
}

fn table_open() -> &'static Regex {
    static OPEN: OnceLock<Regex> = OnceLock::new();
    OPEN.get_or_init(|| Regex::new(r"(?i)<table(?:\s[^>]*)?>").expect("valid table pattern"))
}

fn table_close() -> &'static Regex {
    static CLOSE: OnceLock<Regex> = OnceLock::new();
    CLOSE.get_or_init(|| Regex::new(r"(?i)</table\s*>").expect("valid table pattern"))
}

fn split_cells(line: &str) -> Vec<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    column_gap().split(trimmed).map(str::trim).collect()
}

fn render_table(rows: &[Vec<&str>]) -> String {
    let mut html = String::from("<table>\n");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(cell);
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>");
    html
}

/// Rewrite whitespace-aligned runs of lines as explicit `<table>` markup.
///
/// Fragments that already carry a table or preformatted text are returned
/// untouched. Returns `None` when nothing was promoted.
pub fn promote_aligned_tables(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("<table") || lower.contains("<pre") {
        return None;
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut promoted = false;
    let mut i = 0;

    while i < lines.len() {
        let columns = split_cells(lines[i]).len();
        if columns >= MIN_TABLE_COLUMNS {
            let mut rows = vec![split_cells(lines[i])];
            let mut j = i + 1;
            while j < lines.len() {
                let cells = split_cells(lines[j]);
                if cells.len() != columns {
                    break;
                }
                rows.push(cells);
                j += 1;
            }

            if rows.len() >= MIN_TABLE_ROWS {
                out.push(render_table(&rows));
                promoted = true;
                i = j;
                continue;
            }
        }

        out.push(lines[i].to_string());
        i += 1;
    }

    promoted.then(|| out.join("\n"))
}

/// Reject content whose table markup does not open and close evenly
pub fn ensure_balanced_tables(text: &str) -> Result<(), RestoreError> {
    let opening = table_open().find_iter(text).count();
    let closing = table_close().find_iter(text).count();
    if opening != closing {
        return Err(RestoreError::UnbalancedTable { opening, closing });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotes_aligned_columns() {
        let text = "Opening hours\nMonday    9:00    17:00\nTuesday   9:00    18:00\nClosed on Sunday.";
        let promoted = promote_aligned_tables(text).unwrap();
        assert!(promoted.starts_with("Opening hours\n<table>\n"));
        assert!(promoted.contains("<tr><td>Monday</td><td>9:00</td><td>17:00</td></tr>"));
        assert!(promoted.contains("<tr><td>Tuesday</td><td>9:00</td><td>18:00</td></tr>"));
        assert!(promoted.ends_with("</table>\nClosed on Sunday."));
        assert!(ensure_balanced_tables(&promoted).is_ok());
    }

    #[test]
    fn test_tab_separated_rows() {
        let text = "Name\tPrice\nTea\t2.50\nCoffee\t3.00";
        let promoted = promote_aligned_tables(text).unwrap();
        assert_eq!(promoted.matches("<tr>").count(), 3);
    }

    #[test]
    fn test_leaves_prose_alone() {
        assert!(promote_aligned_tables("A normal sentence.\nAnother one here.").is_none());
        assert!(promote_aligned_tables("Single  aligned  line").is_none());
        assert!(promote_aligned_tables("<pre>a    b\nc    d</pre>").is_none());
        assert!(promote_aligned_tables("<table><tr><td>x</td></tr></table>").is_none());
    }

    #[test]
    fn test_table_balance() {
        assert!(ensure_balanced_tables("<p>no tables</p>").is_ok());
        assert!(ensure_balanced_tables("<TABLE class=\"x\"><tr><td>1</td></tr></table>").is_ok());
        assert_eq!(
            ensure_balanced_tables("<table><tr><td>1</td></tr>"),
            Err(RestoreError::UnbalancedTable { opening: 1, closing: 0 })
        );
        assert_eq!(
            ensure_balanced_tables("<table></table></table>"),
            Err(RestoreError::UnbalancedTable { opening: 1, closing: 2 })
        );
    }
}
