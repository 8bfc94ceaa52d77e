use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::vm::compiler::CompileError;
use crate::vm::runtime::RuntimeError;
use crate::vm::value::Shape;

pub use crate::vm::runtime::StackFrame;

/// Unified error type for synthesis, evaluation and the collection operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LambdaError {
    #[error("Lexical error at line {}, column {}: {}", .0.line, .0.column, .0.message)]
    Lex(#[from] LexError),

    #[error("Parse error at line {}, column {}: {}", .0.span.line, .0.span.column, .0.message)]
    Parse(#[from] ParseError),

    #[error("Compile error at line {}, column {}: {}", .0.span.line, .0.span.column, .0.message)]
    Compile(#[from] CompileError),

    #[error("Runtime error at line {}: {}", .0.line, .0.message)]
    Runtime(#[from] RuntimeError),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),
}

/// Caller mistakes, detected before any unit is synthesized
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UsageError {
    #[error("{operation} requires at least one container")]
    MissingContainer { operation: &'static str },

    #[error("{operation} expects a Sequence or Mapping, got {found}")]
    NotAContainer {
        operation: &'static str,
        found: &'static str,
    },

    #[error("{operation} expects every container to be a {expected}, got {found}")]
    ShapeMismatch {
        operation: &'static str,
        expected: Shape,
        found: &'static str,
    },

    #[error("appending to a Mapping expects a [key, value] pair, got {found}")]
    InvalidPair { found: String },

    #[error("Mapping keys must be String or Integer, got {found}")]
    InvalidKey { found: &'static str },

    #[error("Sequence index must be an Integer, got {found}")]
    InvalidIndex { found: &'static str },

    #[error("index {index} is out of range for a Sequence of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("key {key:?} not found")]
    KeyNotFound { key: String },
}

impl LambdaError {
    /// True for caller mistakes, false for errors raised by expression text
    pub fn is_usage(&self) -> bool {
        matches!(self, LambdaError::Usage(_))
    }

    fn location(&self) -> Option<(u32, u32, &str, &'static str)> {
        match self {
            LambdaError::Lex(err) => Some((err.line, err.column, &err.message, "Lexical error")),
            LambdaError::Parse(err) => Some((
                err.span.line,
                err.span.column,
                &err.message,
                "Parse error",
            )),
            LambdaError::Compile(err) => Some((
                err.span.line,
                err.span.column,
                &err.message,
                "Compile error",
            )),
            LambdaError::Runtime(err) => Some((err.line, 0, &err.message, "Runtime error")),
            LambdaError::Usage(_) => None,
        }
    }

    /// Format error with source context
    pub fn format_with_source(&self, source: &str) -> String {
        let Some((line, column, message, kind)) = self.location() else {
            return format!("\n{self}\n");
        };

        let mut output = String::new();

        // Error header
        output.push_str(&format!("\n{kind} at line {line}"));
        if column > 0 {
            output.push_str(&format!(", column {column}"));
        }
        output.push_str(&format!(": {message}\n\n"));

        // Source context (5 lines around error)
        let lines: Vec<&str> = source.lines().collect();
        let error_line_idx = (line as usize).saturating_sub(1);

        let start = error_line_idx.saturating_sub(2);
        let end = (error_line_idx + 3).min(lines.len());

        for (idx, line_content) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = idx + 1;

            if idx == error_line_idx {
                output.push_str(&format!(" → {line_num:4} | {line_content}\n"));

                if column > 0 {
                    output.push_str("        | ");
                    output.push_str(&" ".repeat(column as usize - 1));
                    output.push_str("^\n");
                }
            } else {
                output.push_str(&format!("   {line_num:4} | {line_content}\n"));
            }
        }

        if let LambdaError::Runtime(err) = self
            && !err.stack_trace.is_empty()
        {
            output.push_str("\nStack trace:\n");
            for (i, frame) in err.stack_trace.iter().enumerate() {
                let name = frame.unit_name.as_deref().unwrap_or("<script>");
                output.push_str(&format!("  {i} at {name} (line {})\n", frame.line));
            }
        }

        output
    }

    /// Format error with source context and colored output
    #[cfg(feature = "colored")]
    pub fn format_colored(&self, source: &str) -> String {
        use colored::Colorize;

        let Some((line, column, message, kind)) = self.location() else {
            return format!("\n{}\n", self.to_string().red().bold());
        };

        let mut output = String::from("\n");

        // Error header (red and bold)
        output.push_str(&format!("{kind} at line {line}").red().bold().to_string());
        if column > 0 {
            output.push_str(&format!(", column {column}").red().bold().to_string());
        }
        output.push_str(&format!(": {}\n\n", message.red()));

        let lines: Vec<&str> = source.lines().collect();
        let error_line_idx = (line as usize).saturating_sub(1);

        let start = error_line_idx.saturating_sub(2);
        let end = (error_line_idx + 3).min(lines.len());

        for (idx, line_content) in lines.iter().enumerate().take(end).skip(start) {
            let line_num = idx + 1;

            if idx == error_line_idx {
                output.push_str(
                    &format!(" → {line_num:4} | {line_content}\n")
                        .red()
                        .to_string(),
                );

                if column > 0 {
                    output.push_str(&"        | ".red().to_string());
                    output.push_str(&" ".repeat(column as usize - 1));
                    output.push_str(&"^".red().bold().to_string());
                    output.push('\n');
                }
            } else {
                output.push_str(
                    &format!("   {line_num:4} | {line_content}\n")
                        .dimmed()
                        .to_string(),
                );
            }
        }

        output
    }
}
