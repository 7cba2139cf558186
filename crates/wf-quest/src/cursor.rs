//! A position in a quest plus its simulation context.

use std::sync::Arc;

use tracing::{debug, warn};
use wf_core::{Document, ElementKind, ElementRef, NodeId};

use crate::condition::{apply_text_ops, evaluate_condition};
use crate::context::{PathStep, TemplateContext};
use crate::error::{QuestError, QuestResult};

/// Attribute holding a visibility condition.
pub const IF_ATTR: &str = "if";
/// Attribute naming the event an `<event>` handles.
pub const ON_ATTR: &str = "on";
/// Attribute naming a goto target.
pub const ID_ATTR: &str = "id";

/// What a `<trigger>` asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// End the quest.
    End,
    /// Jump to the element with this `id`.
    Goto(String),
    /// Follow the nearest `<event on="...">` with this name.
    Event(String),
}

impl Trigger {
    /// Classify trigger text.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let lower = text.to_ascii_lowercase();
        if lower == "end" {
            Trigger::End
        } else if let Some(target) = lower.strip_prefix("goto").filter(|rest| {
            rest.starts_with(char::is_whitespace)
        }) {
            let offset = text.len() - target.len();
            Trigger::Goto(text[offset..].trim().to_string())
        } else {
            Trigger::Event(text.to_string())
        }
    }
}

/// A position in the quest tree paired with an owned context.
///
/// The tree is shared; the context is not. Operations never mutate a cursor
/// they were handed. They clone it and return the clone.
#[derive(Debug, Clone)]
pub struct QuestCursor {
    document: Arc<Document>,
    node: NodeId,
    ctx: TemplateContext,
}

impl QuestCursor {
    /// A cursor at `node`, which must be an element of `document`.
    pub fn new(document: Arc<Document>, node: NodeId, ctx: TemplateContext) -> QuestResult<Self> {
        if document.element(node).is_none() {
            return Err(QuestError::Tree(wf_core::TreeError::NodeNotFound(node)));
        }
        Ok(Self {
            document,
            node,
            ctx,
        })
    }

    /// The first visible card of a quest, with a fresh context.
    pub fn start(document: Arc<Document>, seed: u64) -> QuestResult<Self> {
        let root = document.root().ok_or(QuestError::NoStartCard)?.id();
        let quest = Self::new(Arc::clone(&document), root, TemplateContext::new(seed))?;
        let first = quest
            .children_with_visibility()
            .find(|c| c.kind().is_card())
            .map(|c| c.id())
            .ok_or(QuestError::NoStartCard)?;
        let mut cursor = quest.at(first);
        cursor.load();
        Ok(cursor)
    }

    /// The shared document.
    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// The current node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The simulation context.
    pub fn ctx(&self) -> &TemplateContext {
        &self.ctx
    }

    /// Mutable access to the context of this (already cloned) cursor.
    pub fn ctx_mut(&mut self) -> &mut TemplateContext {
        &mut self.ctx
    }

    /// The current element.
    pub fn element(&self) -> Option<ElementRef<'_>> {
        self.document.element(self.node)
    }

    /// The current element's role.
    pub fn kind(&self) -> Option<&ElementKind> {
        self.element().map(|e| e.kind())
    }

    /// Whether the current element has the given role.
    pub fn is(&self, kind: &ElementKind) -> bool {
        self.kind() == Some(kind)
    }

    /// The same context at another node.
    pub fn at(&self, node: NodeId) -> QuestCursor {
        QuestCursor {
            document: Arc::clone(&self.document),
            node,
            ctx: self.ctx.clone(),
        }
    }

    /// Whether `element` passes its `if` condition under this context.
    ///
    /// A condition that fails to parse or evaluate hides the element.
    pub fn is_visible(&self, element: ElementRef<'_>) -> bool {
        let Some(condition) = element.attr(IF_ATTR) else {
            return true;
        };
        match evaluate_condition(condition, &self.ctx) {
            Ok(visible) => visible,
            Err(error) => {
                warn!(node = %element.id(), condition, %error, "hiding element with bad condition");
                false
            }
        }
    }

    /// Visible child elements in document order.
    ///
    /// Visibility depends on the context, so the sequence is recomputed on
    /// every call.
    pub fn children_with_visibility(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.element()
            .into_iter()
            .flat_map(|e| e.children())
            .filter(|c| self.is_visible(*c))
    }

    /// `on` values of the visible `<event>` children.
    pub fn visible_event_keys(&self) -> Vec<String> {
        self.children_with_visibility()
            .filter(|c| c.kind() == &ElementKind::Event)
            .filter_map(|c| c.attr(ON_ATTR))
            .map(str::to_string)
            .collect()
    }

    /// The trigger at this node, if it is one.
    pub fn trigger(&self) -> Option<Trigger> {
        self.element()
            .filter(|e| e.kind() == &ElementKind::Trigger)
            .map(|e| Trigger::parse(&e.text()))
    }

    /// Follow a navigation key.
    ///
    /// - `Choice(i)` enters the i-th visible `<choice>`. On a card without
    ///   visible choices, `Choice(0)` behaves like `Sibling`.
    /// - `Event(name)` enters the visible `<event on=name>` of this node or,
    ///   failing that, of the nearest ancestor that has one.
    /// - `Sibling` moves to the next visible card after this one.
    ///
    /// Landing on `<trigger>goto ID</trigger>` jumps to the element with that
    /// `id`. The key is appended to the path and the landing card's text
    /// operations are applied. Returns `None` when the key leads nowhere.
    pub fn next(&self, step: PathStep) -> Option<QuestCursor> {
        let target = match &step {
            PathStep::Choice(index) => {
                let mut choices = self
                    .children_with_visibility()
                    .filter(|c| c.kind() == &ElementKind::Choice)
                    .peekable();
                if choices.peek().is_none() && *index == 0 {
                    self.next_sibling()
                } else {
                    choices.nth(*index).and_then(|c| self.first_visible_child(c))
                }
            }
            PathStep::Event(name) => self
                .find_event(name)
                .and_then(|e| self.first_visible_child(e)),
            PathStep::Sibling => self.next_sibling(),
        }?;

        let target = self.resolve_goto(target)?;
        let mut next = self.at(target);
        next.ctx.path.push(step);
        next.load();
        debug!(from = %self.node, to = %next.node, "navigated");
        Some(next)
    }

    /// Expand a non-goto trigger by following the nearest matching event.
    pub fn handle_trigger_event(&self) -> Option<QuestCursor> {
        match self.trigger()? {
            Trigger::Event(name) => self.next(PathStep::Event(name)),
            Trigger::End | Trigger::Goto(_) => None,
        }
    }

    /// Whether the nearest enclosing card (or this node) is a combat.
    pub fn in_combat(&self) -> bool {
        let Some(element) = self.element() else {
            return false;
        };
        std::iter::once(element)
            .chain(element.ancestors())
            .find(|e| {
                matches!(
                    e.kind(),
                    ElementKind::Combat | ElementKind::Roleplay | ElementKind::Decision
                )
            })
            .is_some_and(|e| e.kind() == &ElementKind::Combat)
    }

    /// The nearest combat at or above this node.
    pub fn combat_ancestor(&self) -> Option<NodeId> {
        let element = self.element()?;
        std::iter::once(element)
            .chain(element.ancestors())
            .find(|e| e.kind() == &ElementKind::Combat)
            .map(|e| e.id())
    }

    /// A canonical `tag[index]` path that identifies this node on every peer,
    /// e.g. `/quest[0]/roleplay[1]/choice[0]/combat[0]`.
    pub fn comparison_key(&self) -> String {
        let Some(element) = self.element() else {
            return String::new();
        };
        let mut parts: Vec<String> = std::iter::once(element)
            .chain(element.ancestors())
            .map(|e| format!("/{}[{}]", e.tag(), e.element_index()))
            .collect();
        parts.reverse();
        parts.concat()
    }

    /// Find the node a [`comparison_key`](Self::comparison_key) names.
    ///
    /// Tags are checked along the way, so a key from a different quest does
    /// not resolve by accident.
    pub fn locate_key(document: &Document, key: &str) -> Option<NodeId> {
        let mut steps = Vec::new();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            let (tag, rest) = part.split_once('[')?;
            let index: usize = rest.strip_suffix(']')?.parse().ok()?;
            steps.push((tag, index));
        }
        let ((root_tag, _), below) = steps.split_first()?;
        let mut current = document.root().filter(|r| r.tag() == *root_tag)?;
        for (tag, index) in below {
            current = current.children().nth(*index).filter(|c| c.tag() == *tag)?;
        }
        Some(current.id())
    }

    fn first_visible_child<'a>(&'a self, parent: ElementRef<'a>) -> Option<ElementRef<'a>> {
        parent.children().find(|c| self.is_visible(*c))
    }

    fn next_sibling(&self) -> Option<ElementRef<'_>> {
        self.element()?.following_siblings().find(|s| {
            !s.kind().is_branch() && s.kind() != &ElementKind::Enemy && self.is_visible(*s)
        })
    }

    fn find_event(&self, name: &str) -> Option<ElementRef<'_>> {
        let element = self.element()?;
        std::iter::once(element)
            .chain(element.ancestors())
            .find_map(|owner| {
                owner.children().find(|c| {
                    c.kind() == &ElementKind::Event
                        && c.attr(ON_ATTR) == Some(name)
                        && self.is_visible(*c)
                })
            })
    }

    fn resolve_goto<'a>(&'a self, target: ElementRef<'a>) -> Option<NodeId> {
        if target.kind() != &ElementKind::Trigger {
            return Some(target.id());
        }
        match Trigger::parse(&target.text()) {
            Trigger::Goto(id) => {
                let found = self.document.find_by_attr(ID_ATTR, &id).map(|e| e.id());
                if found.is_none() {
                    warn!(id = %id, "goto target not found");
                }
                found
            }
            _ => Some(target.id()),
        }
    }

    /// Apply the text operations of the card just landed on.
    fn load(&mut self) {
        let Some(element) = self.document.element(self.node) else {
            return;
        };
        if !element.kind().is_card() {
            return;
        }
        let mut text = element.own_text();
        for child in element.children() {
            if matches!(child.kind(), ElementKind::Other(_)) {
                text.push_str(&child.text());
            }
        }
        apply_text_ops(&text, &mut self.ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Value;

    const QUEST: &str = r#"<quest title="Test">
        <roleplay title="Intro">
            <p>{{ gold = 5 }}Welcome.</p>
            <choice text="Left"><roleplay title="Left">left</roleplay></choice>
            <choice text="Hidden" if="false"><roleplay>hidden</roleplay></choice>
            <choice text="Rich" if="gold > 3"><roleplay title="Rich">rich</roleplay></choice>
            <choice text="Broken" if="gold >"><roleplay>broken</roleplay></choice>
            <choice text="Jump"><trigger>goto finale</trigger></choice>
        </roleplay>
        <roleplay title="Second">second</roleplay>
        <combat title="Fight">
            <e>Wolf</e>
            <event on="win"><roleplay title="Won">won</roleplay></event>
            <event on="round"><roleplay title="Round">
                <choice text="Flee"><trigger>lose</trigger></choice>
            </roleplay></event>
            <event on="lose"><roleplay title="Lost">lost</roleplay></event>
        </combat>
        <roleplay title="Finale" id="finale">end</roleplay>
    </quest>"#;

    fn start() -> QuestCursor {
        let doc = Arc::new(Document::parse(QUEST).unwrap());
        QuestCursor::start(doc, 7).unwrap()
    }

    fn title(cursor: &QuestCursor) -> &str {
        cursor.element().and_then(|e| e.attr("title")).unwrap_or("")
    }

    #[test]
    fn start_applies_ops() {
        let c = start();
        assert_eq!(title(&c), "Intro");
        assert_eq!(c.ctx().lookup("gold"), Some(Value::Number(5.0)));
        assert!(c.ctx().path.is_empty());
    }

    #[test]
    fn visible_choices_skip_false_and_broken() {
        let c = start();
        let texts: Vec<_> = c
            .children_with_visibility()
            .filter(|e| e.kind() == &ElementKind::Choice)
            .filter_map(|e| e.attr("text"))
            .collect();
        assert_eq!(texts, vec!["Left", "Rich", "Jump"]);
    }

    #[test]
    fn next_by_choice() {
        let c = start();
        let rich = c.next(PathStep::Choice(1)).unwrap();
        assert_eq!(title(&rich), "Rich");
        assert_eq!(rich.ctx().path, vec![PathStep::Choice(1)]);
        assert!(c.next(PathStep::Choice(3)).is_none());
    }

    #[test]
    fn goto_jumps() {
        let c = start();
        let finale = c.next(PathStep::Choice(2)).unwrap();
        assert_eq!(title(&finale), "Finale");
    }

    #[test]
    fn sibling_and_implicit_next() {
        let c = start();
        let second = c.next(PathStep::Sibling).unwrap();
        assert_eq!(title(&second), "Second");
        let fight = second.next(PathStep::Choice(0)).unwrap();
        assert!(fight.is(&ElementKind::Combat));
        assert!(fight.in_combat());
        assert_eq!(fight.visible_event_keys(), vec!["win", "round", "lose"]);
    }

    #[test]
    fn clone_does_not_alias() {
        let c = start();
        let mut d = c.clone();
        d.ctx_mut().scope.insert("gold".into(), Value::Number(0.0));
        d.ctx_mut().path.push(PathStep::Sibling);
        assert_eq!(c.ctx().lookup("gold"), Some(Value::Number(5.0)));
        assert!(c.ctx().path.is_empty());
        assert_eq!(c.node(), d.node());
    }

    #[test]
    fn trigger_event_reaches_enclosing_combat() {
        let fight = start()
            .next(PathStep::Sibling)
            .and_then(|c| c.next(PathStep::Sibling))
            .unwrap();
        let round = fight.next(PathStep::Event("round".into())).unwrap();
        assert_eq!(title(&round), "Round");
        assert!(!round.in_combat());
        assert_eq!(round.combat_ancestor(), Some(fight.node()));

        let flee = round.next(PathStep::Choice(0)).unwrap();
        assert_eq!(flee.trigger(), Some(Trigger::Event("lose".into())));
        let lost = flee.handle_trigger_event().unwrap();
        assert_eq!(title(&lost), "Lost");
    }

    #[test]
    fn comparison_keys() {
        let c = start();
        assert_eq!(c.comparison_key(), "/quest[0]/roleplay[0]");
        let fight = c
            .next(PathStep::Sibling)
            .and_then(|c| c.next(PathStep::Sibling))
            .unwrap();
        assert_eq!(fight.comparison_key(), "/quest[0]/combat[2]");

        let doc = fight.document();
        assert_eq!(QuestCursor::locate_key(doc, &fight.comparison_key()), Some(fight.node()));
        assert_eq!(QuestCursor::locate_key(doc, "/quest[0]/roleplay[2]"), None);
        assert_eq!(QuestCursor::locate_key(doc, "nonsense"), None);
    }

    #[test]
    fn triggers_parse() {
        assert_eq!(Trigger::parse(" End "), Trigger::End);
        assert_eq!(Trigger::parse("goto Finale"), Trigger::Goto("Finale".into()));
        assert_eq!(Trigger::parse("GOTO  x"), Trigger::Goto("x".into()));
        assert_eq!(Trigger::parse("gotox"), Trigger::Event("gotox".into()));
        assert_eq!(Trigger::parse("win"), Trigger::Event("win".into()));
    }
}
