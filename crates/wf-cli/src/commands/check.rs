use std::path::Path;
use std::sync::Arc;

use wf_core::{Document, ElementKind, ElementRef};
use wf_mechanics::{SkillCheck, find_encounter};
use wf_quest::QuestCursor;
use wf_quest::condition::{blocks, parse_expression, parse_program};
use wf_quest::cursor::{ID_ATTR, IF_ATTR, ON_ATTR, Trigger};

use super::{Diagnostic, Severity, find_span, load_quest, print_diagnostics};

/// Counts shown after a clean check.
#[derive(Default)]
struct Summary {
    cards: usize,
    conditions: usize,
    operations: usize,
}

pub fn run(file: &Path) -> Result<(), String> {
    let (source, document) = load_quest(file)?;
    let (diagnostics, summary) = check_document(&source, &document);
    print_diagnostics(&source, &file.display().to_string(), &diagnostics);

    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    if errors > 0 {
        return Err(format!("quest has {errors} error(s)"));
    }

    let title = document
        .root()
        .and_then(|r| r.attr("title"))
        .unwrap_or("untitled");
    println!("  All checks passed for '{title}'.");
    println!(
        "  {} cards, {} conditions, {} text operations",
        summary.cards, summary.conditions, summary.operations
    );
    Ok(())
}

fn check_document(source: &str, document: &Document) -> (Vec<Diagnostic>, Summary) {
    let mut diagnostics = Vec::new();
    let mut summary = Summary::default();

    if QuestCursor::start(Arc::new(document.clone()), 0).is_err() {
        diagnostics.push(Diagnostic::error(0..0, "quest has no starting card"));
    }

    // Spans are found by searching forward from the last element's match, so
    // repeated snippets point at the right place most of the time.
    let mut cursor = 0;
    for element in document.elements() {
        let tag_span = find_span(source, &format!("<{}", element.tag()), cursor);
        if tag_span.end > 0 {
            cursor = tag_span.start;
        }
        if element.kind().is_card() {
            summary.cards += 1;
        }

        if let Some(condition) = element.attr(IF_ATTR) {
            summary.conditions += 1;
            if let Err(e) = parse_expression(condition) {
                diagnostics.push(Diagnostic::error(
                    find_span(source, condition, cursor),
                    format!("condition on <{}>: {e}", element.tag()),
                ));
            }
        }

        for block in blocks(&element.own_text()) {
            summary.operations += 1;
            if let Err(e) = parse_program(block) {
                diagnostics.push(Diagnostic::error(
                    find_span(source, block, cursor),
                    format!("text operation: {e}"),
                ));
            }
        }

        check_element(element, document, tag_span, &mut diagnostics);
    }

    (diagnostics, summary)
}

fn check_element(
    element: ElementRef<'_>,
    document: &Document,
    span: std::ops::Range<usize>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match element.kind() {
        ElementKind::Trigger => {
            let missing = match Trigger::parse(&element.text()) {
                Trigger::Goto(target) if document.find_by_attr(ID_ATTR, &target).is_none() => {
                    Some(target)
                }
                _ => None,
            };
            if let Some(target) = missing {
                diagnostics.push(Diagnostic::error(
                    span,
                    format!("goto target `{target}` does not exist"),
                ));
            }
        }
        ElementKind::Enemy => {
            let name = element.text();
            if find_encounter(&name).is_none() && element.attr("tier").is_none() {
                diagnostics.push(Diagnostic::warning(
                    span,
                    format!("unknown enemy `{}` without a tier counts as tier 1", name.trim()),
                ));
            }
        }
        ElementKind::Event if element.attr(ON_ATTR).is_none() => {
            diagnostics.push(Diagnostic::error(span, "<event> needs an `on` attribute"));
        }
        ElementKind::Decision => {
            let has_check = element
                .children()
                .filter_map(|c| c.attr(ON_ATTR))
                .filter_map(SkillCheck::parse)
                .any(|c| c.skill.is_some());
            if !has_check {
                diagnostics.push(Diagnostic::warning(
                    span,
                    "decision has no event naming a skill check",
                ));
            }
        }
        _ => {}
    }
}
