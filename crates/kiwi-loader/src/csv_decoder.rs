//! Structural CSV → markdown-ish text (§4.2.1). Hand-rolled RFC 4180 parsing
//! since this touches no external binary and is fully specified here: quoted
//! fields may embed commas, newlines, and `""`-escaped quotes.

use crate::decoder::TextDecoder;
use crate::error::{LoaderError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvDecoder;

fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => {
                row.push(std::mem::take(&mut field));
            }
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn render_markdown(rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let pad = |r: &[String]| -> String {
        let mut cells: Vec<&str> = r.iter().map(|s| s.as_str()).collect();
        while cells.len() < width {
            cells.push("");
        }
        format!("| {} |", cells.join(" | "))
    };

    let mut out = String::new();
    out.push_str(&pad(&rows[0]));
    out.push('\n');
    out.push_str(&format!("|{}", " --- |".repeat(width)));
    out.push('\n');
    for row in &rows[1..] {
        out.push_str(&pad(row));
        out.push('\n');
    }
    out
}

impl TextDecoder for CsvDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String> {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|e| LoaderError::Decode(format!("not valid utf-8: {e}")))?;
        let rows = parse_rows(&text);
        Ok(render_markdown(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_simple_csv_as_markdown_table() {
        let decoder = CsvDecoder;
        let out = decoder.decode(b"name,age\nAda,36\nGrace,85\n").unwrap();
        assert_eq!(out, "| name | age |\n| --- | --- |\n| Ada | 36 |\n| Grace | 85 |\n");
    }

    #[test]
    fn handles_quoted_commas_and_escaped_quotes() {
        let decoder = CsvDecoder;
        let out = decoder
            .decode(b"name,quote\n\"Smith, John\",\"She said \"\"hi\"\"\"\n")
            .unwrap();
        assert!(out.contains("Smith, John"));
        assert!(out.contains("She said \"hi\""));
    }

    #[test]
    fn ragged_rows_pad_to_widest() {
        let decoder = CsvDecoder;
        let out = decoder.decode(b"a,b,c\n1,2\n").unwrap();
        assert!(out.contains("| 1 | 2 |  |"));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let decoder = CsvDecoder;
        assert_eq!(decoder.decode(b"").unwrap(), "");
    }
}
