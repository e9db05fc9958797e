//! Minimal CSV reading and writing for job log and payload exports.
//!
//! Quoting follows the usual convention: fields containing commas, quotes,
//! or line breaks are wrapped in double quotes, and embedded quotes are
//! doubled (`"` becomes `""`).

/// Encode a single field, quoting only when necessary.
fn encode_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Encode rows of fields as CSV text. Rows are joined with `\n` and the
/// output ends with a trailing newline when non-empty.
pub fn to_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let encoded: Vec<String> = row.iter().map(|f| encode_field(f)).collect();
        out.push_str(&encoded.join(","));
        out.push('\n');
    }
    out
}

/// Parse CSV text into rows of fields.
///
/// Handles quoted fields containing commas and newlines, and decodes doubled
/// quotes inside quoted fields back to a single quote. Both `\n` and `\r\n`
/// line endings are accepted. A trailing newline does not produce an empty
/// final row.
pub fn parse_csv(input: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();
    let mut saw_any = false;

    while let Some(c) = chars.next() {
        saw_any = true;
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => {
                    row.push(std::mem::take(&mut field));
                }
                '\r' => {
                    // Consumed as part of \r\n; a bare \r also ends the line.
                    if chars.peek() == Some(&'\n') {
                        chars.next();
                    }
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                    saw_any = false;
                }
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                    saw_any = false;
                }
                _ => field.push(c),
            }
        }
    }

    if saw_any || !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Parsing Tests ====================

    #[test]
    fn test_parse_simple() {
        assert_eq!(
            parse_csv("a,b\n1,2"),
            vec![vec!["a".to_string(), "b".to_string()], vec!["1".to_string(), "2".to_string()]]
        );
    }

    #[test]
    fn test_parse_quoted_comma() {
        let rows = parse_csv("\"hello, world\",b");
        assert_eq!(rows, vec![vec!["hello, world".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_parse_escaped_quote() {
        let rows = parse_csv("\"he said \"\"ok\"\"\"");
        assert_eq!(rows, vec![vec!["he said \"ok\"".to_string()]]);
    }

    #[test]
    fn test_parse_quoted_newline() {
        let rows = parse_csv("\"line1\nline2\",x");
        assert_eq!(rows, vec![vec!["line1\nline2".to_string(), "x".to_string()]]);
    }

    #[test]
    fn test_parse_crlf_line_endings() {
        let rows = parse_csv("a,b\r\n1,2\r\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_parse_trailing_newline_no_empty_row() {
        let rows = parse_csv("a,b\n");
        assert_eq!(rows, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_csv("").is_empty());
    }

    #[test]
    fn test_parse_empty_fields() {
        let rows = parse_csv("a,,c");
        assert_eq!(rows, vec![vec!["a".to_string(), String::new(), "c".to_string()]]);
    }

    // ==================== Writing Tests ====================

    #[test]
    fn test_to_csv_plain() {
        let rows = vec![vec!["a".to_string(), "b".to_string()]];
        assert_eq!(to_csv(&rows), "a,b\n");
    }

    #[test]
    fn test_to_csv_quotes_comma() {
        let rows = vec![vec!["hello, world".to_string()]];
        assert_eq!(to_csv(&rows), "\"hello, world\"\n");
    }

    #[test]
    fn test_to_csv_doubles_quotes() {
        let rows = vec![vec!["he said \"ok\"".to_string()]];
        assert_eq!(to_csv(&rows), "\"he said \"\"ok\"\"\"\n");
    }

    #[test]
    fn test_to_csv_empty() {
        assert_eq!(to_csv(&[]), "");
    }

    // ==================== Round Trip ====================

    #[test]
    fn test_quoted_field_round_trip() {
        let rows = vec![vec!["plain".to_string(), "with, comma".to_string(), "with \"quote\"".to_string()]];
        let encoded = to_csv(&rows);
        assert_eq!(parse_csv(&encoded), rows);
    }
}
