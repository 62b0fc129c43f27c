/// Plain-text table with left-aligned, auto-sized columns
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Missing cells render empty; extra cells are dropped
    pub fn add_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_line(&mut out, &self.headers, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        push_line(&mut out, &rule, &widths);
        for row in &self.rows {
            push_line(&mut out, row, &widths);
        }
        out
    }
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_sized_to_widest_cell() {
        let mut table = Table::new(&["Name", "X"]);
        table.add_row(vec!["Oak".to_string(), "1000".to_string()]);
        table.add_row(vec!["Cedarwood".to_string(), "7".to_string()]);

        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], "Name       X");
        assert_eq!(lines[1], "---------  ----");
        assert_eq!(lines[2], "Oak        1000");
        assert_eq!(lines[3], "Cedarwood  7");
    }

    #[test]
    fn test_short_rows_padded() {
        let mut table = Table::new(&["A", "B", "C"]);
        table.add_row(vec!["1".to_string()]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.render().lines().nth(2), Some("1"));
    }
}
