//! Terminal UI utilities.
//!
//! `Table` renders rows with Unicode box-drawing characters, measuring cells
//! without their ANSI colour codes and shrinking the widest column when the
//! terminal is too narrow.

use colored::*;
use console::{measure_text_width, truncate_str};

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are ignored.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn print(&self) {
        let (_height, width) = console::Term::stdout().size();
        print!("{}", self.render(width as usize));
    }

    pub fn render(&self, max_width: usize) -> String {
        if self.headers.is_empty() {
            return String::new();
        }

        let mut col_widths: Vec<usize> = self
            .headers
            .iter()
            .map(|h| measure_text_width(h))
            .collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                col_widths[i] = col_widths[i].max(measure_text_width(&sanitize_content(cell)));
            }
        }

        let overhead = 3 + 3 * self.headers.len();
        let available = max_width.saturating_sub(overhead);
        let mut total: usize = col_widths.iter().sum();
        while total > available {
            let Some((idx, &widest)) = col_widths.iter().enumerate().max_by_key(|(_, w)| **w) else {
                break;
            };
            if widest <= 8 {
                break;
            }
            col_widths[idx] -= 1;
            total -= 1;
        }

        let make_sep = |left: &str, mid: &str, right: &str| -> String {
            let inner: Vec<String> = col_widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("  {}{}{}\n", left, inner.join(mid), right)
        };
        let make_row = |cells: &[String], bold: bool| -> String {
            let mut line = String::from("  │");
            for (cell, &width) in cells.iter().zip(&col_widths) {
                let clean = sanitize_content(cell);
                let text = truncate_str(&clean, width, "...");
                let padding = width.saturating_sub(measure_text_width(&text));
                let text = if bold {
                    text.bold().to_string()
                } else {
                    text.into_owned()
                };
                line.push_str(&format!(" {}{} │", text, " ".repeat(padding)));
            }
            line.push('\n');
            line
        };

        let mut out = make_sep("┌", "┬", "┐");
        out.push_str(&make_row(&self.headers, true));
        out.push_str(&make_sep("├", "┼", "┤"));
        for row in &self.rows {
            out.push_str(&make_row(row, false));
        }
        out.push_str(&make_sep("└", "┴", "┘"));
        out
    }
}

fn sanitize_content(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_aligns_columns() {
        colored::control::set_override(false);
        let mut table = Table::new(&["Unit", "Kind"]);
        table.add_row(vec!["src/main.cpp".into(), "plain".into()]);
        table.add_row(vec!["a.cppm".into(), "interface".into()]);
        let out = table.render(120);

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "  │ Unit         │ Kind      │");
        assert_eq!(lines[3], "  │ src/main.cpp │ plain     │");
        let widths: Vec<usize> = lines.iter().map(|l| measure_text_width(l)).collect();
        assert!(widths.iter().all(|w| *w == widths[0]));
    }

    #[test]
    fn test_wrong_row_length_is_ignored() {
        let mut table = Table::new(&["A", "B"]);
        table.add_row(vec!["only one".into()]);
        assert_eq!(table.render(80).lines().count(), 4);
    }

    #[test]
    fn test_narrow_terminal_truncates() {
        colored::control::set_override(false);
        let mut table = Table::new(&["Path"]);
        table.add_row(vec!["a/very/long/path/to/some/module/interface.cppm".into()]);
        let out = table.render(20);
        assert!(out.contains("..."));
    }
}
