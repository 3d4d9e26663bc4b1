use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::resolver::ResolveError;
use crate::vm::compiler::CompileError;
use crate::vm::runtime::RuntimeError;
use std::fmt;

pub use crate::vm::runtime::StackFrame;

/// Stack trace entries printed before the rest are summarised.
const MAX_TRACE_LINES: usize = 64;

/// Unified error type for every stage of compiling and evaluating a program
#[derive(Debug)]
pub enum SeError {
    Lex(LexError),
    Parse(ParseError),
    Resolve(ResolveError),
    Compile(CompileError),
    Runtime(RuntimeError),
}

impl From<LexError> for SeError {
    fn from(err: LexError) -> Self {
        SeError::Lex(err)
    }
}

impl From<ParseError> for SeError {
    fn from(err: ParseError) -> Self {
        SeError::Parse(err)
    }
}

impl From<ResolveError> for SeError {
    fn from(err: ResolveError) -> Self {
        SeError::Resolve(err)
    }
}

impl From<CompileError> for SeError {
    fn from(err: CompileError) -> Self {
        SeError::Compile(err)
    }
}

impl From<RuntimeError> for SeError {
    fn from(err: RuntimeError) -> Self {
        SeError::Runtime(err)
    }
}

impl fmt::Display for SeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeError::Runtime(err) => write!(f, "{err}"),
            _ => {
                let (line, column, message, kind) = self.location();
                write!(f, "{kind} at line {line}, column {column}: {message}")
            }
        }
    }
}

impl std::error::Error for SeError {}

impl SeError {
    /// Lexical and parse errors.
    pub fn is_syntax(&self) -> bool {
        matches!(self, SeError::Lex(_) | SeError::Parse(_))
    }

    /// A parse error raised at the end of `source`, meaning more input could
    /// still complete it. The REPL keeps reading lines while this holds.
    pub fn is_incomplete(&self, source: &str) -> bool {
        match self {
            SeError::Parse(err) => err.span.start >= source.trim_end().len(),
            _ => false,
        }
    }

    fn location(&self) -> (u32, u32, &str, &'static str) {
        match self {
            SeError::Lex(err) => (err.line, err.column, &err.message, "Lexical error"),
            SeError::Parse(err) => (err.span.line, err.span.column, &err.message, "Parse error"),
            SeError::Resolve(err) => (
                err.span.line,
                err.span.column,
                &err.message,
                "Resolution error",
            ),
            SeError::Compile(err) => (
                err.span.line,
                err.span.column,
                &err.message,
                "Compile error",
            ),
            SeError::Runtime(err) => (err.line, 0, &err.message, "Runtime error"),
        }
    }

    /// Format error with source context
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, column, message, kind) = self.location();

        let mut output = String::new();

        output.push_str(&format!("\n{kind} at line {line}"));
        if column > 0 {
            output.push_str(&format!(", column {column}"));
        }
        output.push_str(&format!(": {message}\n\n"));

        // Two lines either side of the error
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

        if let SeError::Runtime(err) = self {
            if !err.stack_trace.is_empty() {
                output.push_str("\nStack trace:\n");
                push_stack_trace(&mut output, &err.stack_trace);
            }
        }

        output
    }
}

/// Runs of identical frames (deep recursion) print once with a count.
fn push_stack_trace(output: &mut String, frames: &[StackFrame]) {
    let mut i = 0;
    let mut printed = 0;

    while i < frames.len() {
        if printed == MAX_TRACE_LINES {
            output.push_str(&format!("  ... {} more frame(s)\n", frames.len() - i));
            break;
        }

        let frame = &frames[i];
        let run = frames[i..].iter().take_while(|f| *f == frame).count();
        output.push_str(&format!("  {i} at {} (line {})", frame.function_name, frame.line));
        if run > 1 {
            output.push_str(&format!(" repeated {run} times"));
        }
        output.push('\n');

        i += run;
        printed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Span;
    use crate::vm::runtime::RuntimeErrorKind;

    fn span(line: u32, column: u32) -> Span {
        Span {
            start: 0,
            end: 1,
            line,
            column,
        }
    }

    #[test]
    fn lex_error_display() {
        let err = SeError::Lex(LexError {
            message: "Unexpected character: '$'".to_string(),
            line: 5,
            column: 10,
        });

        assert_eq!(
            err.to_string(),
            "Lexical error at line 5, column 10: Unexpected character: '$'"
        );
        assert!(err.is_syntax());
    }

    #[test]
    fn parse_error_display() {
        let err = SeError::Parse(ParseError {
            message: "Expected ')'".to_string(),
            span: span(3, 15),
        });

        let display = err.to_string();
        assert!(display.contains("Parse error"));
        assert!(display.contains("line 3"));
        assert!(display.contains("column 15"));
        assert!(err.is_syntax());
    }

    #[test]
    fn resolve_error_display() {
        let err = SeError::Resolve(ResolveError {
            message: "undefined: foo".to_string(),
            span: span(1, 7),
        });

        assert_eq!(
            err.to_string(),
            "Resolution error at line 1, column 7: undefined: foo"
        );
        assert!(!err.is_syntax());
    }

    #[test]
    fn runtime_error_display() {
        let err = SeError::Runtime(RuntimeError::new(
            RuntimeErrorKind::DivisionByZero,
            "Division by zero",
            10,
        ));

        assert_eq!(err.to_string(), "Runtime error at line 10: Division by zero");
    }

    #[test]
    fn error_with_source_context() {
        let source = "{\n  a = 1;\n  b = 2;\n  c = a / 0;\n  d = 5;\n  c\n}";

        let err = SeError::Runtime(RuntimeError::new(
            RuntimeErrorKind::DivisionByZero,
            "Division by zero",
            4,
        ));
        let formatted = err.format_with_source(source);

        assert!(formatted.contains("line 4"));
        assert!(formatted.contains("a = 1"));
        assert!(formatted.contains("b = 2"));
        assert!(formatted.contains(" →    4 |   c = a / 0;"));
        assert!(formatted.contains("d = 5"));
        assert!(formatted.contains("  c"));
        assert!(!formatted.contains("{"));
    }

    #[test]
    fn error_with_caret_position() {
        let source = "1 + $";

        let err = SeError::Lex(LexError {
            message: "Unexpected character: '$'".to_string(),
            line: 1,
            column: 5,
        });

        let formatted = err.format_with_source(source);
        assert!(formatted.contains("        |     ^"));
    }

    #[test]
    fn error_beyond_last_line() {
        let err = SeError::Runtime(RuntimeError::new(
            RuntimeErrorKind::StackFault,
            "Some error",
            100,
        ));
        let formatted = err.format_with_source("1");
        assert!(formatted.contains("Runtime error at line 100"));
    }

    #[test]
    fn runtime_error_with_stack_trace() {
        let mut err = RuntimeError::new(RuntimeErrorKind::DivisionByZero, "Division by zero", 2);
        err.stack_trace = vec![
            StackFrame {
                function_name: "div".to_string(),
                line: 2,
            },
            StackFrame {
                function_name: "f".to_string(),
                line: 3,
            },
        ];

        let formatted = SeError::Runtime(err).format_with_source("{\n  f = x -> x / 0;\n  f(1)\n}");

        assert!(formatted.contains("Stack trace:\n  0 at div (line 2)\n  1 at f (line 3)\n"));
    }

    #[test]
    fn recursive_stack_trace_is_folded() {
        let mut err = RuntimeError::new(
            RuntimeErrorKind::StackOverflow,
            "Call depth exceeded 256",
            1,
        );
        err.stack_trace = vec![
            StackFrame {
                function_name: "count".to_string(),
                line: 1,
            };
            256
        ];

        let formatted = SeError::Runtime(err).format_with_source("count(300)");

        assert!(formatted.contains("Stack trace:\n  0 at count (line 1) repeated 256 times\n"));
        assert_eq!(formatted.matches(" at count").count(), 1);
    }

    #[test]
    fn long_stack_trace_is_capped() {
        let mut err = RuntimeError::new(
            RuntimeErrorKind::StackOverflow,
            "Call depth exceeded 100",
            1,
        );
        err.stack_trace = (0..100)
            .map(|i| StackFrame {
                function_name: if i % 2 == 0 { "even" } else { "odd" }.to_string(),
                line: 1,
            })
            .collect();

        let formatted = SeError::Runtime(err).format_with_source("even(200)");

        assert!(formatted.contains("  63 at odd (line 1)\n  ... 36 more frame(s)\n"));
        assert!(!formatted.contains("  64 at"));
    }

    #[test]
    fn parse_error_at_end_of_input_is_incomplete() {
        let source = "f = (a, b) ->\n";
        let err = SeError::Parse(ParseError {
            message: "Unexpected end of input".to_string(),
            span: Span {
                start: source.len(),
                end: source.len(),
                line: 2,
                column: 1,
            },
        });
        assert!(err.is_incomplete(source));

        let err = SeError::Parse(ParseError {
            message: "Expected expression, found ')'".to_string(),
            span: span(1, 1),
        });
        assert!(!err.is_incomplete(") + 1"));

        let err = SeError::Resolve(ResolveError {
            message: "undefined: f".to_string(),
            span: span(1, 1),
        });
        assert!(!err.is_incomplete("f"));
    }

    #[test]
    fn runtime_error_without_stack_trace() {
        let err = RuntimeError::new(RuntimeErrorKind::DivisionByZero, "Division by zero", 1);
        let formatted = SeError::Runtime(err).format_with_source("1 / 0");

        assert!(formatted.contains("Division by zero"));
        assert!(!formatted.contains("Stack trace:"));
    }
}
