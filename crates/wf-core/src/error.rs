use crate::element::NodeId;

/// Alias for `Result<T, TreeError>`.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur when reading or addressing a quest document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// The markup could not be tokenized at the given byte offset.
    #[error("syntax error at byte {offset}: {message}")]
    Syntax {
        /// Byte offset of the offending input.
        offset: usize,
        /// Human-readable description.
        message: String,
    },

    /// A closing tag did not match the innermost open element.
    #[error("mismatched closing tag at byte {offset}: expected </{expected}>, found </{found}>")]
    MismatchedTag {
        /// The tag that was open.
        expected: String,
        /// The closing tag that was found.
        found: String,
        /// Byte offset of the closing tag.
        offset: usize,
    },

    /// The input ended while an element was still open.
    #[error("unclosed element <{0}>")]
    UnclosedTag(String),

    /// Elements were nested deeper than [`crate::markup::MAX_DEPTH`].
    #[error("elements nested too deeply at byte {offset}")]
    TooDeep {
        /// Byte offset of the opening tag past the limit.
        offset: usize,
    },

    /// The input contained no root element.
    #[error("document has no root element")]
    NoRootElement,

    /// The input contained more than one top-level element.
    #[error("document has more than one root element")]
    MultipleRoots,

    /// A node id does not belong to the document it was used with.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
}
