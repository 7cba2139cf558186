use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TreeResult;
use crate::markup;

/// Index of a node inside its [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The role an element plays for the interpreter.
///
/// Tag names are matched case-insensitively. Anything the interpreter has
/// no special handling for is kept as `Other` with its lowercased tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// The `<quest>` root.
    Quest,
    /// A narrative card.
    Roleplay,
    /// A combat encounter card.
    Combat,
    /// A skill-check card.
    Decision,
    /// A player-selectable branch.
    Choice,
    /// An outcome-keyed branch (`<event on="...">`).
    Event,
    /// A control-flow instruction (`goto`, `end`, or a named event).
    Trigger,
    /// An enemy listed inside a combat (`<e>`).
    Enemy,
    /// Any other tag.
    Other(String),
}

impl ElementKind {
    /// Classify a tag name.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "quest" => Self::Quest,
            "roleplay" => Self::Roleplay,
            "combat" => Self::Combat,
            "decision" => Self::Decision,
            "choice" => Self::Choice,
            "event" => Self::Event,
            "trigger" => Self::Trigger,
            "e" => Self::Enemy,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns true for elements that are shown as a card on their own.
    pub fn is_card(&self) -> bool {
        matches!(
            self,
            Self::Roleplay | Self::Combat | Self::Decision | Self::Trigger
        )
    }

    /// Returns true for elements that hold a branch of cards.
    pub fn is_branch(&self) -> bool {
        matches!(self, Self::Choice | Self::Event)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quest => write!(f, "quest"),
            Self::Roleplay => write!(f, "roleplay"),
            Self::Combat => write!(f, "combat"),
            Self::Decision => write!(f, "decision"),
            Self::Choice => write!(f, "choice"),
            Self::Event => write!(f, "event"),
            Self::Trigger => write!(f, "trigger"),
            Self::Enemy => write!(f, "e"),
            Self::Other(tag) => write!(f, "{tag}"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ElementData {
    pub(crate) tag: String,
    pub(crate) kind: ElementKind,
    pub(crate) attributes: Vec<(String, String)>,
    pub(crate) children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) data: NodeData,
}

/// An immutable arena of parsed quest markup.
///
/// Nodes are only ever appended, so a [`NodeId`] stays valid for the life of
/// the document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse quest markup into a document.
    pub fn parse(source: &str) -> TreeResult<Self> {
        markup::read(source)
    }

    /// Append an element. With no parent the element becomes the root.
    pub fn add_element(
        &mut self,
        parent: Option<NodeId>,
        tag: impl Into<String>,
        attributes: Vec<(String, String)>,
    ) -> NodeId {
        let tag = tag.into();
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            data: NodeData::Element(ElementData {
                kind: ElementKind::from_tag(&tag),
                tag,
                attributes,
                children: Vec::new(),
            }),
        });
        self.link(parent, id);
        id
    }

    /// Append a run of text under an element.
    pub fn add_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: Some(parent),
            data: NodeData::Text(text.into()),
        });
        self.link(Some(parent), id);
        id
    }

    fn link(&mut self, parent: Option<NodeId>, child: NodeId) {
        match parent {
            Some(p) => {
                if let Some(Node {
                    data: NodeData::Element(data),
                    ..
                }) = self.nodes.get_mut(p.0)
                {
                    data.children.push(child);
                }
            }
            None => {
                if self.root.is_none() {
                    self.root = Some(child);
                }
            }
        }
    }

    /// The root element, if the document is not empty.
    pub fn root(&self) -> Option<ElementRef<'_>> {
        self.root.and_then(|id| self.element(id))
    }

    /// Look up an element by id. Returns `None` for text nodes.
    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        match self.nodes.get(id.0) {
            Some(Node {
                data: NodeData::Element(data),
                ..
            }) => Some(ElementRef {
                document: self,
                id,
                data,
            }),
            _ => None,
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Number of nodes (elements and text runs).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All elements in document order.
    pub fn elements(&self) -> Vec<ElementRef<'_>> {
        let mut out = Vec::new();
        if let Some(root) = self.root() {
            collect_elements(root, &mut out);
        }
        out
    }

    /// The first element, in document order, whose attribute `key` equals `value`.
    pub fn find_by_attr(&self, key: &str, value: &str) -> Option<ElementRef<'_>> {
        self.elements()
            .into_iter()
            .find(|e| e.attr(key) == Some(value))
    }

    /// Follow element-child positions down from the root.
    pub fn locate(&self, positions: &[usize]) -> Option<ElementRef<'_>> {
        let mut current = self.root()?;
        for &index in positions {
            current = current.children().nth(index)?;
        }
        Some(current)
    }

    /// Serialize the whole document back to markup.
    pub fn to_markup(&self) -> String {
        self.root().map(|r| r.to_markup()).unwrap_or_default()
    }
}

fn collect_elements<'a>(element: ElementRef<'a>, out: &mut Vec<ElementRef<'a>>) {
    out.push(element);
    for child in element.children() {
        collect_elements(child, out);
    }
}

/// A borrowed handle to one element of a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct ElementRef<'a> {
    document: &'a Document,
    id: NodeId,
    data: &'a ElementData,
}

impl<'a> ElementRef<'a> {
    /// This element's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The document the element belongs to.
    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// The tag name as written in the source.
    pub fn tag(&self) -> &'a str {
        &self.data.tag
    }

    /// The element's role.
    pub fn kind(&self) -> &'a ElementKind {
        &self.data.kind
    }

    /// Look up an attribute by name (ASCII case-insensitive).
    pub fn attr(&self, key: &str) -> Option<&'a str> {
        self.data
            .attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All attributes in source order.
    pub fn attributes(self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.data
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Child elements in document order (text runs are skipped).
    pub fn children(self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let document = self.document;
        self.data
            .children
            .iter()
            .filter_map(move |&id| document.element(id))
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out, true);
        out
    }

    /// Concatenated text of this element's direct text children only.
    pub fn own_text(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out, false);
        out
    }

    fn push_text(&self, out: &mut String, deep: bool) {
        for &child in &self.data.children {
            match self.document.node(child).map(|n| &n.data) {
                Some(NodeData::Text(text)) => out.push_str(text),
                Some(NodeData::Element(_)) if deep => {
                    if let Some(element) = self.document.element(child) {
                        element.push_text(out, deep);
                    }
                }
                _ => {}
            }
        }
    }

    /// The parent element, or `None` for the root.
    pub fn parent(&self) -> Option<ElementRef<'a>> {
        self.document
            .node(self.id)
            .and_then(|n| n.parent)
            .and_then(|p| self.document.element(p))
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        std::iter::successors(self.parent(), |e| e.parent())
    }

    /// Position of this element among its parent's child elements.
    pub fn element_index(&self) -> usize {
        self.parent()
            .and_then(|p| p.children().position(|c| c.id == self.id))
            .unwrap_or(0)
    }

    /// Element siblings that follow this one, in document order.
    pub fn following_siblings(self) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        let index = self.element_index();
        let parent = self.parent();
        parent
            .into_iter()
            .flat_map(move |p| p.children().skip(index + 1))
    }

    /// Element-child positions from the root down to this element.
    pub fn position(&self) -> Vec<usize> {
        let mut positions: Vec<usize> = std::iter::once(*self)
            .chain(self.ancestors())
            .filter(|e| e.parent().is_some())
            .map(|e| e.element_index())
            .collect();
        positions.reverse();
        positions
    }

    /// Whether `ancestor` encloses this element (or is this element).
    pub fn is_within(&self, ancestor: NodeId) -> bool {
        self.id == ancestor || self.ancestors().any(|a| a.id == ancestor)
    }

    /// Serialize this element and its subtree to markup.
    pub fn to_markup(&self) -> String {
        markup::write(self.document, self.id)
    }
}

impl PartialEq for ElementRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.document, other.document) && self.id == other.id
    }
}

impl Eq for ElementRef<'_> {}
