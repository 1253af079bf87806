use serde_json::{Value, json};

use crate::executor::CommandResult;

/// Output mode for rendering command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable output.
    Pretty,
    /// Machine-parseable JSON (one JSON object per result on stdout).
    Json,
}

impl OutputMode {
    pub fn from_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Pretty }
    }
}

/// Keys and values are arbitrary bytes; show them as (lossy) UTF-8.
fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Build the JSON form of a result.
pub fn to_json(result: &CommandResult) -> Value {
    match result {
        CommandResult::Ok(msg) => json!({"ok": true, "message": msg}),
        CommandResult::Value { key, value } => {
            json!({"found": true, "key": text(key), "value": text(value)})
        }
        CommandResult::NotFound(key) => json!({"found": false, "key": text(key)}),
        CommandResult::Pairs(pairs) => {
            let items: Vec<Value> = pairs
                .iter()
                .map(|(k, v)| json!({"key": text(k), "value": text(v)}))
                .collect();
            json!({"items": items, "count": pairs.len()})
        }
    }
}

/// Render a command result to stdout in the given mode.
pub fn render(result: &CommandResult, mode: OutputMode) {
    match mode {
        OutputMode::Json => println!("{}", to_json(result)),
        OutputMode::Pretty => match result {
            CommandResult::Ok(msg) => println!("{msg}"),
            CommandResult::Value { value, .. } => println!("{}", text(value)),
            CommandResult::NotFound(key) => eprintln!("Key not found: {}", text(key)),
            CommandResult::Pairs(pairs) => {
                for (k, v) in pairs {
                    println!("{}\t{}", text(k), text(v));
                }
            }
        },
    }
}

/// Render an error to stderr in the given mode.
pub fn render_error(err: &dyn std::fmt::Display, mode: OutputMode) {
    match mode {
        OutputMode::Pretty => eprintln!("Error: {err}"),
        OutputMode::Json => eprintln!("{}", json!({"error": err.to_string()})),
    }
}
