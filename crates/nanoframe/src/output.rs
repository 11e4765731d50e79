use std::io::{IsTerminal, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use nanoframe_frame::Notification;
use serde::Serialize;
use serde_json::Value;

pub const SCHEMA_BASE: &str = "https://schemas.nanoframe.dev/cli/v1";

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn schema_id(name: &str) -> String {
    format!("{SCHEMA_BASE}/{name}.schema.json")
}

#[derive(Serialize)]
struct CallOutput<'a> {
    schema_id: String,
    method: &'a str,
    id: u64,
    elapsed_ms: f64,
    result: &'a Value,
}

pub fn print_call_result(method: &str, id: u64, elapsed: Duration, result: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                schema_id: schema_id("call-result"),
                method,
                id,
                elapsed_ms: millis(elapsed),
                result,
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "ID", "ELAPSED", "RESULT"])
                .add_row(vec![
                    method.to_string(),
                    id.to_string(),
                    format!("{:.2}ms", millis(elapsed)),
                    value_preview(result),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
            );
        }
        OutputFormat::Raw => println!("{result}"),
    }
}

#[derive(Serialize)]
struct NotificationOutput<'a> {
    schema_id: String,
    method: &'a str,
    params: &'a Value,
    timestamp: String,
}

pub fn print_notification(note: &Notification, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = NotificationOutput {
                schema_id: schema_id("notification"),
                method: &note.method,
                params: &note.params,
                timestamp: now_unix_seconds(),
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NOTIFICATION", "PARAMS"])
                .add_row(vec![note.method.clone(), value_preview(&note.params)]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{} {}", note.method, value_preview(&note.params)),
        OutputFormat::Raw => println!("{}", note.params),
    }
}

/// One compact JSON document per line, flushed immediately so a reader on
/// the other end of a pipe sees it without waiting for exit.
pub fn print_json_line<T: Serialize>(value: &T) {
    let line = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
    let _ = out.flush();
}

pub fn millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

fn value_preview(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "(null)".to_string(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn millis_rounds_to_two_places() {
        assert_eq!(millis(Duration::from_micros(1_234_567)), 1234.57);
    }

    #[test]
    fn call_output_carries_schema_id() {
        let result = json!("pong");
        let out = CallOutput {
            schema_id: schema_id("call-result"),
            method: "ping",
            id: 1,
            elapsed_ms: 0.5,
            result: &result,
        };
        let text = serde_json::to_string(&out).expect("call output should serialize");
        assert!(text.contains("call-result.schema.json"));
        assert!(text.contains("\"result\":\"pong\""));
    }

    #[test]
    fn string_values_preview_unquoted() {
        assert_eq!(value_preview(&json!("pong")), "pong");
        assert_eq!(value_preview(&json!({"a": 1})), "{\"a\":1}");
        assert_eq!(value_preview(&Value::Null), "(null)");
    }
}
