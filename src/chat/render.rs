//! Terminal rendering of a [`ChatResponse`].
//!
//! Row data (an array of objects) is drawn as an ASCII table in the style of
//! the MySQL CLI; any other payload is pretty-printed JSON.

use crate::models::ChatResponse;
use serde_json::{Map, Value as JsonValue};
use unicode_width::UnicodeWidthStr;

pub fn render_response(response: &ChatResponse) -> String {
    let mut output = response.description.clone();

    if let Some(data) = &response.data {
        output.push_str("\n\n");
        match as_rows(data) {
            Some(rows) => output.push_str(&format_as_table(&rows)),
            None => output.push_str(&serde_json::to_string_pretty(data).unwrap_or_default()),
        }
    }

    if let Some(sql) = &response.sql {
        output.push_str(&format!("\n\nSQL: {}", sql));
    }

    output
}

/// Rows when `data` is a non-empty array of objects.
fn as_rows(data: &JsonValue) -> Option<Vec<&Map<String, JsonValue>>> {
    let items = data.as_array()?;
    if items.is_empty() {
        return None;
    }
    items.iter().map(JsonValue::as_object).collect()
}

/// Column names in first-seen order across all rows.
fn column_names(rows: &[&Map<String, JsonValue>]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }
    names
}

fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn format_as_table(rows: &[&Map<String, JsonValue>]) -> String {
    let columns = column_names(rows);
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, column) in columns.iter().enumerate() {
            if let Some(value) = row.get(column) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    for (column, w) in columns.iter().zip(&widths) {
        output.push_str(&format!("| {} ", pad(column, *w, Align::Left)));
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for row in rows {
        for (column, w) in columns.iter().zip(&widths) {
            let value = row.get(column).unwrap_or(&JsonValue::Null);
            let align = if value.is_number() { Align::Right } else { Align::Left };
            output.push_str(&format!("| {} ", pad(&format_value(value), *w, align)));
        }
        output.push_str("|\n");
    }
    output.push_str(&separator);

    let noun = if rows.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!("{} {} in set", rows.len(), noun));
    output
}

enum Align {
    Left,
    Right,
}

// `format!` width counts chars, not display columns
fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    match align {
        Align::Left => format!("{}{}", text, fill),
        Align::Right => format!("{}{}", fill, text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(data: JsonValue) -> ChatResponse {
        let mut response = ChatResponse::text("Top customers");
        response.data = Some(data);
        response
    }

    #[test]
    fn test_text_only() {
        assert_eq!(render_response(&ChatResponse::text("hello")), "hello");
    }

    #[test]
    fn test_rows_as_table() {
        let mut r = response(json!([
            {"id": 1, "name": "Ada"},
            {"id": 12, "name": null}
        ]));
        r.sql = Some("SELECT id, name FROM customers".to_string());

        let expected = "\
Top customers

+----+------+
| id | name |
+----+------+
|  1 | Ada  |
| 12 | NULL |
+----+------+
2 rows in set

SQL: SELECT id, name FROM customers";
        assert_eq!(render_response(&r), expected);
    }

    #[test]
    fn test_wide_characters_align() {
        let table = render_response(&response(json!([{"city": "東京"}, {"city": "Oslo"}])));
        let lines: Vec<&str> = table.lines().skip(2).take(5).collect();
        let widths: Vec<usize> = lines.iter().map(|l| l.width()).collect();
        assert!(widths.iter().all(|w| *w == widths[0]), "{:?}", lines);
    }

    #[test]
    fn test_non_row_data_is_json() {
        let rendered = render_response(&response(json!({"labels": ["a"], "values": [1]})));
        assert!(rendered.contains("\"labels\""));
        assert!(!rendered.contains("+--"));
    }
}
