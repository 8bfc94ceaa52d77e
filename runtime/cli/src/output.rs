//! CLI output formatting for text and JSON modes.
//!
//! JSON mode prints exactly one object per invocation, for results and for
//! errors alike, so editors and scripts can consume it without scraping.

use clap::ValueEnum;
use lambdakit::error::LambdaError;
use lambdakit::vm::Value;
use serde::Serialize;

/// Output mode for CLI execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-readable output (default)
    Text,
    /// Single JSON object after execution completes
    Json,
}

/// Error location with 1-indexed line and column.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// Stack frame for error traces.
#[derive(Debug, Clone, Serialize)]
pub struct StackFrame {
    pub unit: String,
    pub line: u32,
}

/// JSON output for a successful command.
#[derive(Debug, Clone, Serialize)]
pub struct JsonResultOutput<'a> {
    #[serde(rename = "type")]
    pub output_type: &'static str,
    pub command: &'static str,
    /// `null` when a reduce had nothing to fold
    pub value: Option<&'a Value>,
    pub duration_ms: u64,
}

/// JSON output for errors.
#[derive(Debug, Clone, Serialize)]
pub struct JsonErrorOutput {
    #[serde(rename = "type")]
    pub output_type: &'static str,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ErrorLocation>,
    pub stack: Vec<StackFrame>,
}

/// Short name for the family an error belongs to
pub fn error_kind(error: &LambdaError) -> &'static str {
    match error {
        LambdaError::Lex(_) => "lex",
        LambdaError::Parse(_) => "parse",
        LambdaError::Compile(_) => "compile",
        LambdaError::Runtime(_) => "runtime",
        LambdaError::Usage(_) => "usage",
    }
}

/// Format a LambdaError as JSON error output.
pub fn format_error_json(error: &LambdaError) -> JsonErrorOutput {
    let (location, message, stack) = match error {
        LambdaError::Lex(err) => (
            Some(ErrorLocation {
                line: err.line,
                column: err.column,
            }),
            err.message.clone(),
            vec![],
        ),
        LambdaError::Parse(err) => (
            Some(ErrorLocation {
                line: err.span.line,
                column: err.span.column,
            }),
            err.message.clone(),
            vec![],
        ),
        LambdaError::Compile(err) => (
            Some(ErrorLocation {
                line: err.span.line,
                column: err.span.column,
            }),
            err.message.clone(),
            vec![],
        ),
        LambdaError::Runtime(err) => {
            let stack = err
                .stack_trace
                .iter()
                .map(|frame| StackFrame {
                    unit: frame
                        .unit_name
                        .clone()
                        .unwrap_or_else(|| "<script>".to_string()),
                    line: frame.line,
                })
                .collect();
            // RuntimeError doesn't track columns
            (
                Some(ErrorLocation {
                    line: err.line,
                    column: 1,
                }),
                err.message.clone(),
                stack,
            )
        }
        LambdaError::Usage(err) => (None, err.to_string(), vec![]),
    };

    JsonErrorOutput {
        output_type: "error",
        kind: error_kind(error),
        message,
        location,
        stack,
    }
}

/// Format a command result as JSON.
pub fn format_result_json(
    command: &'static str,
    value: Option<&Value>,
    duration_ms: u64,
) -> serde_json::Result<String> {
    serde_json::to_string(&JsonResultOutput {
        output_type: "result",
        command,
        value,
        duration_ms,
    })
}

/// Text rendering of a result; strings are printed unquoted
pub fn format_result_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lambdakit::error::UsageError;
    use lambdakit::vm::RuntimeError;

    #[test]
    fn result_json_embeds_the_value() {
        let value = Value::dict([("a", Value::list([Value::Integer(1), Value::from(2.5)]))]);
        let json = format_result_json("map", Some(&value), 3).unwrap();

        assert_eq!(
            json,
            r#"{"type":"result","command":"map","value":{"a":[1,2.5]},"duration_ms":3}"#
        );
    }

    #[test]
    fn empty_reduce_is_null() {
        let json = format_result_json("reduce", None, 0).unwrap();
        assert!(json.contains(r#""value":null"#));
    }

    #[test]
    fn usage_error_has_no_location() {
        let error = LambdaError::from(UsageError::KeyNotFound {
            key: "z".to_string(),
        });
        let json = serde_json::to_string(&format_error_json(&error)).unwrap();

        assert_eq!(
            json,
            r#"{"type":"error","kind":"usage","message":"key \"z\" not found","stack":[]}"#
        );
    }

    #[test]
    fn runtime_error_lists_frames() {
        let mut err = RuntimeError::new("Division by zero", 1);
        err.add_frame(Some("lambda_9".to_string()), 1);
        err.add_frame(None, 2);

        let output = format_error_json(&LambdaError::from(err));

        assert_eq!(output.kind, "runtime");
        assert_eq!(output.stack.len(), 2);
        assert_eq!(output.stack[0].unit, "lambda_9");
        assert_eq!(output.stack[1].unit, "<script>");
    }

    #[test]
    fn text_strings_are_unquoted() {
        assert_eq!(format_result_text(&Value::string("hi")), "hi");
        assert_eq!(
            format_result_text(&Value::list([Value::string("hi")])),
            r#"["hi"]"#
        );
    }
}
