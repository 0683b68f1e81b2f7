//! Renders a [`QueryResult`] for terminal or machine consumption.
//!
//! Four formats, matching the original CLI's `--format table|json|csv|tree`.
//! No table-rendering crate is pulled in for this: the workspace carries
//! none, and a fixed-width column printer is a dozen lines of plain Rust.

use serde_json::Value as Json;

use crate::muql::executor::QueryResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Tree,
}

impl OutputFormat {
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Some(Self::Table),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "tree" => Some(Self::Tree),
            _ => None,
        }
    }
}

#[must_use]
pub fn format_result(result: &QueryResult, format: OutputFormat) -> String {
    if let Some(warning) = &result.warning {
        return match format {
            OutputFormat::Json => serde_json::json!({ "warning": warning, "row_count": 0 })
                .to_string(),
            _ => format!("warning: {warning}"),
        };
    }

    match format {
        OutputFormat::Table => format_table(result),
        OutputFormat::Json => format_json(result),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Tree => format_tree(result),
    }
}

fn scalar_to_cell(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn format_table(result: &QueryResult) -> String {
    if result.row_count == 0 {
        return format!("(0 rows, {:.2}ms)", result.elapsed_ms);
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(scalar_to_cell).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(String::len).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("{name:w$}"))
        .collect();
    out.push_str(&header.join(" | "));
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:w$}"))
            .collect();
        out.push_str(&line.join(" | "));
        out.push('\n');
    }
    out.push_str(&format!("({} rows, {:.2}ms)", result.row_count, result.elapsed_ms));
    out
}

fn format_json(result: &QueryResult) -> String {
    let rows: Vec<Json> = result
        .rows
        .iter()
        .map(|row| {
            let obj: serde_json::Map<String, Json> = result
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            Json::Object(obj)
        })
        .collect();
    serde_json::json!({
        "columns": result.columns,
        "rows": rows,
        "row_count": result.row_count,
        "elapsed_ms": result.elapsed_ms,
    })
    .to_string()
}

fn format_csv(result: &QueryResult) -> String {
    let mut out = result.columns.join(",");
    out.push('\n');
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(|v| csv_escape(&scalar_to_cell(v))).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn format_tree(result: &QueryResult) -> String {
    if result.row_count == 0 {
        return format!("(0 rows, {:.2}ms)", result.elapsed_ms);
    }
    let mut out = String::new();
    for (i, row) in result.rows.iter().enumerate() {
        out.push_str(&format!("[{i}]\n"));
        for (col, value) in result.columns.iter().zip(row) {
            out.push_str(&format!("  {col}: {}\n", scalar_to_cell(value)));
        }
    }
    out.push_str(&format!("({} rows, {:.2}ms)", result.row_count, result.elapsed_ms));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["name".to_string(), "complexity".to_string()],
            rows: vec![
                vec![Json::String("login".to_string()), Json::from(12)],
                vec![Json::String("logout".to_string()), Json::from(3)],
            ],
            row_count: 2,
            elapsed_ms: 1.5,
            warning: None,
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("bogus"), None);
    }

    #[test]
    fn test_table_has_header_and_separator() {
        let out = format_table(&sample());
        let mut lines = out.lines();
        assert!(lines.next().unwrap().contains("name"));
        assert!(lines.next().unwrap().starts_with("----"));
    }

    #[test]
    fn test_json_round_trips_row_count() {
        let out = format_json(&sample());
        let parsed: Json = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["row_count"], Json::from(2));
        assert_eq!(parsed["rows"][0]["name"], Json::String("login".to_string()));
    }

    #[test]
    fn test_csv_escapes_commas() {
        let mut result = sample();
        result.rows[0][0] = Json::String("a,b".to_string());
        let out = format_csv(&result);
        assert!(out.contains("\"a,b\""));
    }

    #[test]
    fn test_tree_indents_each_column() {
        let out = format_tree(&sample());
        assert!(out.contains("[0]"));
        assert!(out.contains("  name: login"));
    }

    #[test]
    fn test_warning_short_circuits_formatting() {
        let mut result = sample();
        result.warning = Some("node not found: Foo".to_string());
        result.row_count = 0;
        result.rows.clear();
        assert_eq!(
            format_result(&result, OutputFormat::Table),
            "warning: node not found: Foo"
        );
        let json = format_result(&result, OutputFormat::Json);
        assert!(json.contains("node not found"));
    }
}
