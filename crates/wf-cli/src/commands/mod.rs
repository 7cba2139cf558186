pub mod check;
pub mod loot;
pub mod replay;

use std::ops::Range;
use std::path::Path;

use ariadne::{Color, Label, Report, ReportKind, Source};
use wf_core::{Document, TreeError};

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A problem found in a quest file, with its byte span.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Range<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            span,
            message: message.into(),
        }
    }

    pub fn warning(span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            span,
            message: message.into(),
        }
    }
}

/// Read and parse a quest file. Markup errors are printed before returning.
fn load_quest(file: &Path) -> Result<(String, Document), String> {
    let source = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    match Document::parse(&source) {
        Ok(document) => Ok((source, document)),
        Err(error) => {
            let span = tree_error_span(&error, source.len());
            print_diagnostics(
                &source,
                &file.display().to_string(),
                &[Diagnostic::error(span, error.to_string())],
            );
            Err("quest markup has errors".into())
        }
    }
}

fn tree_error_span(error: &TreeError, len: usize) -> Range<usize> {
    let at = match error {
        TreeError::Syntax { offset, .. }
        | TreeError::MismatchedTag { offset, .. }
        | TreeError::TooDeep { offset } => *offset,
        TreeError::UnclosedTag(_) => len.saturating_sub(1),
        _ => 0,
    };
    clamp_span(at..at + 1, len)
}

fn clamp_span(span: Range<usize>, len: usize) -> Range<usize> {
    span.start.min(len)..span.end.min(len)
}

/// Byte span of the first occurrence of `needle` at or after `from`.
fn find_span(source: &str, needle: &str, from: usize) -> Range<usize> {
    source
        .get(from..)
        .and_then(|rest| rest.find(needle))
        .map(|i| from + i..from + i + needle.len())
        .unwrap_or(0..0)
}

/// Print diagnostics to stderr using ariadne.
fn print_diagnostics(source: &str, filename: &str, diagnostics: &[Diagnostic]) {
    if diagnostics.is_empty() {
        return;
    }

    let mut output = Vec::new();
    for diag in diagnostics {
        let (kind, color) = match diag.severity {
            Severity::Error => (ReportKind::Error, Color::Red),
            Severity::Warning => (ReportKind::Warning, Color::Yellow),
        };
        let span = (filename, clamp_span(diag.span.clone(), source.len()));
        Report::build(kind, span.clone())
            .with_message(&diag.message)
            .with_label(Label::new(span).with_message(&diag.message).with_color(color))
            .finish()
            .write((filename, Source::from(source)), &mut output)
            .ok();
    }
    eprint!("{}", String::from_utf8_lossy(&output));

    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = diagnostics.len() - errors;
    eprintln!(
        "  {} error{}, {} warning{}",
        errors,
        if errors == 1 { "" } else { "s" },
        warnings,
        if warnings == 1 { "" } else { "s" },
    );
}
