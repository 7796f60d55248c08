//! Plain-text answer layout: a title, bullet lines and column-aligned tables.

use std::fmt::Write as _;

/// Column-aligned text table. The first column is left aligned, the rest right aligned.
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cells: Vec<String> = cells.into_iter().map(Into::into).collect();
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(column, header)| {
                self.rows
                    .iter()
                    .map(|row| row[column].chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let mut out = String::new();

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(column, (cell, width))| pad(cell, *width, column == 0))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        out.push_str(&line(&self.headers));
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
        out.push_str(&rule.join("-+-"));
        for row in &self.rows {
            out.push('\n');
            out.push_str(&line(row));
        }
        out
    }
}

fn pad(cell: &str, width: usize, left: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(cell.chars().count()));
    if left {
        format!("{}{}", cell, fill)
    } else {
        format!("{}{}", fill, cell)
    }
}

/// Builder for a multi-section answer.
#[derive(Debug, Clone, Default)]
pub struct Report {
    out: String,
}

impl Report {
    pub fn new(title: impl AsRef<str>) -> Self {
        let mut report = Self::default();
        report.out.push_str(title.as_ref());
        report
    }

    fn newline(&mut self) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> &mut Self {
        self.newline();
        self.out.push_str(text.as_ref());
        self
    }

    pub fn bullet(&mut self, label: &str, value: impl AsRef<str>) -> &mut Self {
        self.newline();
        let _ = write!(self.out, "• {}: {}", label, value.as_ref());
        self
    }

    pub fn section(&mut self, heading: impl AsRef<str>) -> &mut Self {
        self.newline();
        self.newline();
        self.out.push_str(heading.as_ref());
        self
    }

    pub fn table(&mut self, table: &TextTable) -> &mut Self {
        self.newline();
        self.out.push_str(&table.render());
        self
    }

    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_alignment() {
        let mut table = TextTable::new(["Region", "Revenue"]);
        table.row(["North", "₹1.20 Cr"]).row(["South-East", "₹10.00 Cr"]);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Region     |   Revenue");
        assert_eq!(lines[2], "North      |  ₹1.20 Cr");
        assert_eq!(lines[3], "South-East | ₹10.00 Cr");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let mut table = TextTable::new(["A", "B", "C"]);
        table.row(["x"]);
        assert_eq!(table.len(), 1);
        assert!(table.render().lines().nth(2).unwrap().starts_with('x'));
    }

    #[test]
    fn test_report_layout() {
        let text = Report::new("Partner A")
            .bullet("Revenue", "₹0.00 Cr")
            .section("By region")
            .line("North")
            .finish();
        assert_eq!(text, "Partner A\n• Revenue: ₹0.00 Cr\n\nBy region\nNorth");
    }
}
