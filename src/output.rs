//! Rendering of results for the terminal.
//!
//! Text output prints one block per result: a `Result:NNN` header (1-based),
//! then tab-separated column names and rows, the update count, or the error.
//! JSON output prints one object per line for every event.

use crate::db::{ColumnSet, ResultSnapshot, RowSnapshot, Value};
use crate::error::SqlRunError;
use crate::query::{ExecutionSummary, ResultEvent, SinkEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{self, Write};

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable, tab-separated blocks.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Writes streamed results in the chosen format.
pub struct Renderer<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Writes one sink call.
    pub fn render_event(&mut self, event: &ResultEvent) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => self.text_event(event.ordinal, &event.payload),
            OutputFormat::Json => self.json_event(event.submission, event.ordinal, &event.payload),
        }
    }

    /// Writes the end of a submission.
    pub fn render_finished(&mut self, submission: u64, summary: &ExecutionSummary) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => Ok(()),
            OutputFormat::Json => self.json_line(json!({
                "submission": submission,
                "event": "finished",
                "results": summary.results,
                "success": summary.is_success(),
            })),
        }
    }

    /// Writes a whole buffered result as the first result of `submission`.
    pub fn render_snapshot(&mut self, submission: u64, result: &ResultSnapshot) -> io::Result<()> {
        let (columns, rows) = (result.columns(), result.rows());
        self.render_event(&ResultEvent {
            submission,
            ordinal: 0,
            payload: SinkEvent::Columns(columns.clone()),
        })?;
        for row in rows {
            self.render_event(&ResultEvent {
                submission,
                ordinal: 0,
                payload: SinkEvent::Row(row.clone()),
            })?;
        }
        Ok(())
    }

    fn text_event(&mut self, ordinal: usize, payload: &SinkEvent) -> io::Result<()> {
        match payload {
            SinkEvent::Columns(columns) => {
                writeln!(self.out, "{}", result_header(ordinal))?;
                writeln!(self.out, "{}", columns.names().join("\t"))
            }
            SinkEvent::Row(row) => writeln!(self.out, "{}", text_row(row)),
            SinkEvent::UpdateCount(count) => {
                writeln!(self.out, "{}", result_header(ordinal))?;
                writeln!(self.out, "Updated rows: {count}")
            }
            SinkEvent::Error(error) => {
                writeln!(self.out, "{}", result_header(ordinal))?;
                writeln!(self.out, "Error: {}", error.message())
            }
        }
    }

    fn json_event(&mut self, submission: u64, ordinal: usize, payload: &SinkEvent) -> io::Result<()> {
        let value = match payload {
            SinkEvent::Columns(columns) => json!({
                "submission": submission,
                "ordinal": ordinal,
                "event": "columns",
                "columns": json_columns(columns),
            }),
            SinkEvent::Row(row) => json!({
                "submission": submission,
                "ordinal": ordinal,
                "event": "row",
                "values": row.values().iter().map(json_value).collect::<Vec<_>>(),
            }),
            SinkEvent::UpdateCount(count) => json!({
                "submission": submission,
                "ordinal": ordinal,
                "event": "update_count",
                "count": count,
            }),
            SinkEvent::Error(error) => json_error(submission, ordinal, error),
        };
        self.json_line(value)
    }

    fn json_line(&mut self, value: serde_json::Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &value)?;
        writeln!(self.out)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn result_header(ordinal: usize) -> String {
    format!("Result:{:03}", ordinal + 1)
}

fn text_row(row: &RowSnapshot) -> String {
    row.values()
        .iter()
        .map(Value::to_display_string)
        .collect::<Vec<_>>()
        .join("\t")
}

fn json_columns(columns: &ColumnSet) -> serde_json::Value {
    columns
        .iter()
        .map(|column| {
            json!({
                "name": column.display_name(),
                "type": column.type_name(),
                "display_size": column.display_size(),
            })
        })
        .collect()
}

/// Cells as plain JSON values; temporal and decimal values keep their text form.
fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Long(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Bytes(bytes) => json!(bytes),
        other => json!(other.to_display_string()),
    }
}

fn json_error(submission: u64, ordinal: usize, error: &SqlRunError) -> serde_json::Value {
    json!({
        "submission": submission,
        "ordinal": ordinal,
        "event": "error",
        "category": error.category(),
        "message": error.message(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ColumnDescriptor;
    use pretty_assertions::assert_eq;

    fn event(ordinal: usize, payload: SinkEvent) -> ResultEvent {
        ResultEvent {
            submission: 1,
            ordinal,
            payload,
        }
    }

    fn columns() -> ColumnSet {
        ColumnSet::from(vec![
            ColumnDescriptor::new("INT4", "id", 11),
            ColumnDescriptor::new("TEXT", "name", 2_147_483_647),
        ])
    }

    fn render(format: OutputFormat, events: &[ResultEvent]) -> String {
        let mut buffer = Vec::new();
        let mut renderer = Renderer::new(&mut buffer, format);
        for event in events {
            renderer.render_event(event).unwrap();
        }
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_text_output() {
        let output = render(
            OutputFormat::Text,
            &[
                event(0, SinkEvent::UpdateCount(2)),
                event(1, SinkEvent::Columns(columns())),
                event(
                    1,
                    SinkEvent::Row(RowSnapshot::from(vec![Value::Int(1), Value::Null])),
                ),
                event(2, SinkEvent::Error(SqlRunError::execution("no such table: t"))),
            ],
        );

        assert_eq!(
            output,
            "Result:001\nUpdated rows: 2\n\
             Result:002\nid\tname\n1\tNULL\n\
             Result:003\nError: no such table: t\n"
        );
    }

    #[test]
    fn test_json_output() {
        let output = render(
            OutputFormat::Json,
            &[
                event(0, SinkEvent::Columns(columns())),
                event(
                    0,
                    SinkEvent::Row(RowSnapshot::from(vec![
                        Value::Long(7),
                        Value::from("x"),
                    ])),
                ),
            ],
        );

        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "columns");
        assert_eq!(lines[0]["columns"][0]["name"], "id");
        assert_eq!(lines[0]["columns"][0]["display_size"], 11);
        assert_eq!(lines[1]["values"], json!([7, "x"]));
    }

    #[test]
    fn test_json_error_and_finished() {
        let mut buffer = Vec::new();
        let mut renderer = Renderer::new(&mut buffer, OutputFormat::Json);
        let error = SqlRunError::connection("refused");

        renderer
            .render_event(&event(0, SinkEvent::Error(error.clone())))
            .unwrap();
        renderer
            .render_finished(
                1,
                &ExecutionSummary {
                    results: 1,
                    error: Some(error),
                },
            )
            .unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines[0]["category"], "Connection Error");
        assert_eq!(lines[0]["message"], "refused");
        assert_eq!(lines[1]["success"], false);
    }

    #[test]
    fn test_snapshot_renders_as_first_result() {
        let mut buffer = Vec::new();
        let mut renderer = Renderer::new(&mut buffer, OutputFormat::Text);
        let snapshot = ResultSnapshot::new(
            columns(),
            vec![RowSnapshot::from(vec![Value::Int(3), Value::from("c")])],
        );

        renderer.render_snapshot(1, &snapshot).unwrap();

        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "Result:001\nid\tname\n3\tc\n"
        );
    }

    #[test]
    fn test_format_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: OutputFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(parsed.format, OutputFormat::Json);
    }
}
