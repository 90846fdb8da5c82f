use std::fmt;

/// A single decoded cell from a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Bool(true) => f.write_str("True"),
            CellValue::Bool(false) => f.write_str("False"),
            CellValue::Int(value) => write!(f, "{value}"),
            // Debug keeps the decimal point on whole numbers (`1.0`).
            CellValue::Float(value) => write!(f, "{value:?}"),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Bytes(value) => write!(f, "b'{}'", value.escape_ascii()),
        }
    }
}

/// Render rows as a pipe-delimited text table with a dashed rule under the header.
pub fn render_table<S: AsRef<str>>(columns: &[S], rows: &[Vec<CellValue>]) -> String {
    let header = columns
        .iter()
        .map(|column| column.as_ref())
        .collect::<Vec<_>>()
        .join(" | ");

    let rule = "-".repeat(header.chars().count());
    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(header);
    lines.push(rule);

    for row in rows {
        lines.push(
            row.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_header_rule_and_rows() {
        let rendered = render_table(
            &["ArtistId", "Name"],
            &[
                vec![CellValue::Int(1), CellValue::Text("AC/DC".to_string())],
                vec![CellValue::Int(2), CellValue::Null],
            ],
        );
        assert_eq!(
            rendered,
            "ArtistId | Name\n---------------\n1 | AC/DC\n2 | NULL"
        );
    }

    #[test]
    fn rule_counts_characters_not_bytes() {
        let rendered = render_table(&["café"], &[]);
        assert_eq!(rendered, "café\n----");
    }

    #[test]
    fn formats_scalar_cells() {
        assert_eq!(CellValue::Float(1.0).to_string(), "1.0");
        assert_eq!(CellValue::Float(0.99).to_string(), "0.99");
        assert_eq!(CellValue::Bool(true).to_string(), "True");
        assert_eq!(CellValue::Bytes(vec![b'a', 0]).to_string(), "b'a\\x00'");
    }
}
