//! Reader and writer for the quest markup subset.
//!
//! Supports elements, quoted and bare attributes, text, the five predefined
//! entities plus numeric character references. Comments, processing
//! instructions and declarations are skipped. This is just enough to read
//! back what [`write`] produces and the quest files the parser hands us.

use logos::Logos;

use crate::element::{Document, NodeData, NodeId};
use crate::error::{TreeError, TreeResult};

/// Deepest element nesting [`read`] accepts.
pub const MAX_DEPTH: usize = 256;

/// Tokens between tags.
#[derive(Logos, Debug, PartialEq)]
enum ContentToken {
    #[token("<!--")]
    CommentStart,

    #[regex(r"<\?[^?]*\?>")]
    Instruction,

    #[regex(r"<![A-Za-z][^>]*>")]
    Declaration,

    #[regex(r"<[A-Za-z_][A-Za-z0-9_.:\-]*")]
    OpenTag,

    #[regex(r"</[A-Za-z_][A-Za-z0-9_.:\-]*[ \t\r\n]*>")]
    CloseTag,

    #[regex(r"[^<]+")]
    Text,
}

/// Tokens inside an opening tag, after its name.
#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum TagToken {
    #[token(">")]
    End,

    #[token("/>")]
    SelfClose,

    #[regex(r#"[A-Za-z_][A-Za-z0-9_.:\-]*[ \t\r\n]*=[ \t\r\n]*"[^"]*""#)]
    DoubleQuoted,

    #[regex(r#"[A-Za-z_][A-Za-z0-9_.:\-]*[ \t\r\n]*=[ \t\r\n]*'[^']*'"#)]
    SingleQuoted,

    #[regex(r"[A-Za-z_][A-Za-z0-9_.:\-]*")]
    Bare,
}

/// Parse markup into a [`Document`].
pub fn read(source: &str) -> TreeResult<Document> {
    let mut document = Document::new();
    let mut open: Vec<(NodeId, String)> = Vec::new();
    let mut root_closed = false;
    let mut content = ContentToken::lexer(source);

    loop {
        let Some(result) = content.next() else {
            break;
        };
        let span = content.span();
        let token = result.map_err(|()| TreeError::Syntax {
            offset: span.start,
            message: "unexpected character".to_string(),
        })?;

        match token {
            ContentToken::CommentStart => {
                let Some(end) = content.remainder().find("-->") else {
                    return Err(TreeError::Syntax {
                        offset: span.start,
                        message: "unterminated comment".to_string(),
                    });
                };
                content.bump(end + "-->".len());
            }
            ContentToken::Instruction | ContentToken::Declaration => {}
            ContentToken::Text => {
                let raw = content.slice();
                match open.last() {
                    Some((parent, _)) => {
                        document.add_text(*parent, decode_entities(raw));
                    }
                    None if raw.trim().is_empty() => {}
                    None => {
                        return Err(TreeError::Syntax {
                            offset: span.start,
                            message: "text outside of the root element".to_string(),
                        });
                    }
                }
            }
            ContentToken::CloseTag => {
                let name = content.slice()[2..]
                    .trim_end_matches('>')
                    .trim_end()
                    .to_string();
                match open.pop() {
                    Some((_, expected)) if expected == name => {
                        if open.is_empty() {
                            root_closed = true;
                        }
                    }
                    Some((_, expected)) => {
                        return Err(TreeError::MismatchedTag {
                            expected,
                            found: name,
                            offset: span.start,
                        });
                    }
                    None => {
                        return Err(TreeError::Syntax {
                            offset: span.start,
                            message: format!("closing tag </{name}> without an open element"),
                        });
                    }
                }
            }
            ContentToken::OpenTag => {
                if open.is_empty() && root_closed {
                    return Err(TreeError::MultipleRoots);
                }
                if open.len() >= MAX_DEPTH {
                    return Err(TreeError::TooDeep { offset: span.start });
                }
                let name = content.slice()[1..].to_string();
                let mut attributes = Vec::new();
                let mut self_closing = false;
                let mut tag = content.morph::<TagToken>();

                loop {
                    let Some(result) = tag.next() else {
                        return Err(TreeError::UnclosedTag(name));
                    };
                    let offset = tag.span().start;
                    match result {
                        Ok(TagToken::End) => break,
                        Ok(TagToken::SelfClose) => {
                            self_closing = true;
                            break;
                        }
                        Ok(TagToken::DoubleQuoted | TagToken::SingleQuoted) => {
                            attributes.push(split_attribute(tag.slice()));
                        }
                        Ok(TagToken::Bare) => {
                            attributes.push((tag.slice().to_string(), String::new()));
                        }
                        Err(()) => {
                            return Err(TreeError::Syntax {
                                offset,
                                message: format!("malformed attribute in <{name}>"),
                            });
                        }
                    }
                }
                content = tag.morph::<ContentToken>();

                let parent = open.last().map(|(id, _)| *id);
                let id = document.add_element(parent, name.clone(), attributes);
                if self_closing {
                    if open.is_empty() {
                        root_closed = true;
                    }
                } else {
                    open.push((id, name));
                }
            }
        }
    }

    if let Some((_, name)) = open.pop() {
        return Err(TreeError::UnclosedTag(name));
    }
    if document.root().is_none() {
        return Err(TreeError::NoRootElement);
    }
    Ok(document)
}

fn split_attribute(raw: &str) -> (String, String) {
    let (name, rest) = raw.split_once('=').unwrap_or((raw, ""));
    let value = rest.trim();
    let value = value
        .strip_prefix(['"', '\''])
        .and_then(|v| v.strip_suffix(['"', '\'']))
        .unwrap_or(value);
    (name.trim().to_string(), decode_entities(value))
}

/// Replace entity and character references with the characters they name.
/// Unknown references are kept verbatim.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate.find(';').and_then(|end| {
            let name = &candidate[1..end];
            let ch = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => name
                    .strip_prefix("#x")
                    .or_else(|| name.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| name.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
}

/// Serialize the subtree rooted at `id`.
///
/// Empty elements are written as an open/close pair so the output reads the
/// same as the source quests.
pub fn write(document: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(document, id, &mut out);
    out
}

fn write_node(document: &Document, id: NodeId, out: &mut String) {
    let Some(node) = document.node(id) else {
        return;
    };
    match &node.data {
        NodeData::Text(text) => escape_text(text, out),
        NodeData::Element(data) => {
            out.push('<');
            out.push_str(&data.tag);
            for (key, value) in &data.attributes {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_attribute(value, out);
                out.push('"');
            }
            out.push('>');
            for &child in &data.children {
                write_node(document, child, out);
            }
            out.push_str("</");
            out.push_str(&data.tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;

    const BASIC: &str = r#"<?xml version="1.0"?>
<quest title="Quest Title" author="Test" minplayers="1" maxplayers="2">
    <!-- opening card -->
    <roleplay title="Roleplay Card">
        <p>Stuff</p>
        <p>And a line</p>
    </roleplay>
    <roleplay title="Another Card">
        <choice text="Decision">
            <combat>
                <e>Skeleton Swordsman</e>
                <event on="win"><trigger>end</trigger></event>
            </combat>
        </choice>
        <choice text="Sneak" if="false"/>
    </roleplay>
</quest>"#;

    #[test]
    fn reads_structure() {
        let doc = read(BASIC).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.kind(), &ElementKind::Quest);
        assert_eq!(root.attr("maxplayers"), Some("2"));
        assert_eq!(root.children().count(), 2);

        let combat = doc.locate(&[1, 0, 0]).unwrap();
        assert_eq!(combat.kind(), &ElementKind::Combat);
        let enemy = combat.children().next().unwrap();
        assert_eq!(enemy.text(), "Skeleton Swordsman");

        let hidden = doc.locate(&[1, 1]).unwrap();
        assert_eq!(hidden.attr("if"), Some("false"));
        assert_eq!(hidden.children().count(), 0);
    }

    #[test]
    fn decodes_entities() {
        let doc = read(r#"<p a="x &amp; y">1 &lt; 2 &#65;&#x42; &unknown;</p>"#).unwrap();
        let p = doc.root().unwrap();
        assert_eq!(p.attr("a"), Some("x & y"));
        assert_eq!(p.text(), "1 < 2 AB &unknown;");
    }

    #[test]
    fn single_quoted_and_bare_attributes() {
        let doc = read("<roleplay title='Intro' skipsetup></roleplay>").unwrap();
        let rp = doc.root().unwrap();
        assert_eq!(rp.attr("title"), Some("Intro"));
        assert_eq!(rp.attr("skipsetup"), Some(""));
    }

    #[test]
    fn writes_back_identically() {
        let source = r#"<quest><roleplay title="A &amp; B"><p>1 &lt; 2</p></roleplay><choice></choice></quest>"#;
        let doc = read(source).unwrap();
        assert_eq!(doc.to_markup(), source);
    }

    #[test]
    fn subtree_markup() {
        let doc = read("<quest><roleplay>expected</roleplay><roleplay>wrong</roleplay></quest>")
            .unwrap();
        let first = doc.locate(&[0]).unwrap();
        assert_eq!(first.to_markup(), "<roleplay>expected</roleplay>");
    }

    #[test]
    fn mismatched_tag() {
        let err = read("<quest><roleplay></quest>").unwrap_err();
        assert!(matches!(err, TreeError::MismatchedTag { .. }));
    }

    #[test]
    fn unclosed_tag() {
        assert_eq!(
            read("<quest><roleplay>").unwrap_err(),
            TreeError::UnclosedTag("roleplay".to_string())
        );
    }

    #[test]
    fn empty_and_multiple_roots() {
        assert_eq!(read("   ").unwrap_err(), TreeError::NoRootElement);
        assert_eq!(read("<a></a><b></b>").unwrap_err(), TreeError::MultipleRoots);
    }

    #[test]
    fn stray_text_rejected() {
        assert!(matches!(
            read("hello <quest></quest>").unwrap_err(),
            TreeError::Syntax { .. }
        ));
    }

    #[test]
    fn nesting_limit() {
        let nested = |depth: usize| format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
        let doc = read(&nested(MAX_DEPTH)).unwrap();
        assert_eq!(doc.to_markup(), nested(MAX_DEPTH));

        let err = read(&nested(100_000)).unwrap_err();
        assert_eq!(err, TreeError::TooDeep { offset: MAX_DEPTH * 3 });
    }

    #[test]
    fn unterminated_comment() {
        assert!(read("<quest><!-- oops</quest>").is_err());
    }
}
