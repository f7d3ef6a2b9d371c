//! RFC 4180 rendering for report downloads. Every field is quoted, embedded
//! quotes are doubled, and nulls become empty strings.

use chrono::{DateTime, Utc};

pub fn quote(field: Option<&str>) -> String {
    match field {
        Some(value) => format!("\"{}\"", value.replace('"', "\"\"")),
        None => "\"\"".to_string(),
    }
}

pub fn render(headers: &[&str], rows: &[Vec<Option<String>>]) -> String {
    let mut out = String::new();

    let header_line: Vec<String> = headers.iter().map(|h| quote(Some(h))).collect();
    out.push_str(&header_line.join(","));
    out.push('\n');

    for row in rows {
        let line: Vec<String> = row.iter().map(|cell| quote(cell.as_deref())).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }

    out
}

/// `attendance-<suffix>-report-<iso-timestamp>.csv`, with colons and dots
/// replaced so the name survives every filesystem.
pub fn filename(suffix: &str, at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        .replace([':', '.'], "-");
    format!("attendance-{}-report-{}.csv", suffix, stamp)
}

/// Minimal RFC 4180 parser used by the round-trip tests.
#[cfg(test)]
pub fn parse(input: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
        } else {
            match ch {
                '"' => in_quotes = true,
                ',' => row.push(std::mem::take(&mut field)),
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                '\r' => {}
                _ => field.push(ch),
            }
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn all_fields_are_quoted() {
        let out = render(
            &["Ward", "Present"],
            &[vec![Some("Ward 7".to_string()), Some("12".to_string())]],
        );
        assert_eq!(out, "\"Ward\",\"Present\"\n\"Ward 7\",\"12\"\n");
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        assert_eq!(quote(Some(r#"MG "Main" Road"#)), r#""MG ""Main"" Road""#);
    }

    #[test]
    fn null_renders_as_empty_string() {
        assert_eq!(quote(None), "\"\"");
    }

    #[test]
    fn ascii_round_trip_is_lossless() {
        let rows = vec![
            vec![
                Some("E001".to_string()),
                Some(r#"quote " comma , newline"#.to_string()),
                None,
            ],
            vec![Some("E002".to_string()), Some(String::new()), Some("x".to_string())],
        ];
        let out = render(&["Code", "Tricky", "Maybe"], &rows);
        let parsed = parse(&out);

        assert_eq!(parsed[0], vec!["Code", "Tricky", "Maybe"]);
        assert_eq!(parsed[1], vec!["E001", r#"quote " comma , newline"#, ""]);
        assert_eq!(parsed[2], vec!["E002", "", "x"]);
    }

    #[test]
    fn filename_replaces_colons_and_dots() {
        let at = Utc.with_ymd_and_hms(2023, 6, 15, 10, 30, 45).unwrap();
        let name = filename("ward", at);
        assert_eq!(name, "attendance-ward-report-2023-06-15T10-30-45Z.csv");
        assert!(!name[..name.len() - 4].contains(':'));
    }
}
