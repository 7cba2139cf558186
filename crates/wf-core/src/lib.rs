//! Core types for Wayfarer: the immutable quest element tree.
//!
//! A quest document is parsed once into a [`Document`], an arena of element
//! and text nodes that never changes afterwards. Everything the interpreter
//! needs from the markup (tag names, attribute lookup, ordered children, text
//! content, parent lookup) is exposed through the borrowed [`ElementRef`]
//! handle, so cursors can share a single tree behind an `Arc`.

/// Element arena, node handles, and element roles.
pub mod element;
/// Error types used throughout the crate.
pub mod error;
/// Reader and writer for the quest markup subset.
pub mod markup;

/// Re-export element tree types.
pub use element::{Document, ElementKind, ElementRef, NodeId};
/// Re-export error types.
pub use error::{TreeError, TreeResult};
