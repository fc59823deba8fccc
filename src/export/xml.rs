//! XML escaping and the single-pass structural scanner the XML format
//! validators are built on.
//!
//! Schema conformance for the exported formats is structural: balanced
//! elements, a single expected root, required elements present, and per
//! format nesting rules. The scanner tokenizes a document into element
//! events once; format validators walk the event list with their own rules.

use crate::core::errors::{QuireError, QuireResult};

/// Escapes the five XML special characters with their entity references.
pub fn xmlescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// One element event produced by [`scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// `<name ...>`
    Open(String),
    /// `</name>`
    Close(String),
    /// `<name .../>`
    Empty(String),
}

impl Tag {
    /// The element name regardless of event kind.
    pub fn name(&self) -> &str {
        match self {
            Tag::Open(name) | Tag::Close(name) | Tag::Empty(name) => name,
        }
    }
}

/// Tokenizes `document` into element events, checking well-formedness:
/// every open tag is closed in order and exactly one root element exists.
///
/// Declarations, comments and doctype-style markup are skipped. `format` is
/// only used for error context.
///
/// # Returns
///
/// * `Ok(Vec<Tag>)` - The element events in document order.
/// * `Err(QuireError::SchemaViolation)` - On malformed markup, with line
///   context.
pub fn scan(document: &str, format: &str) -> QuireResult<Vec<Tag>> {
    let bytes = document.as_bytes();
    let mut tags = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut roots = 0usize;
    let mut pos = 0usize;

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let line = line_of(document, pos);
        let rest = &document[pos..];

        if rest.starts_with("<?") {
            pos += find_end(rest, "?>", format, line)?;
            continue;
        }
        if rest.starts_with("<!--") {
            pos += find_end(rest, "-->", format, line)?;
            continue;
        }
        if rest.starts_with("<!") {
            pos += find_end(rest, ">", format, line)?;
            continue;
        }

        let end = find_end(rest, ">", format, line)?;
        let inner = &rest[1..end - 1];
        if let Some(name) = inner.strip_prefix('/') {
            let name = name.trim().to_string();
            match stack.pop() {
                Some(open) if open == name => tags.push(Tag::Close(name)),
                Some(open) => {
                    return Err(QuireError::schema_violation(
                        format,
                        format!("line {line}: </{name}> closes <{open}>"),
                    ));
                }
                None => {
                    return Err(QuireError::schema_violation(
                        format,
                        format!("line {line}: </{name}> has no matching open tag"),
                    ));
                }
            }
        } else {
            let self_closing = inner.ends_with('/');
            let inner = inner.trim_end_matches('/');
            let name = inner
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_string();
            if name.is_empty() {
                return Err(QuireError::schema_violation(
                    format,
                    format!("line {line}: element with empty name"),
                ));
            }
            if stack.is_empty() {
                roots += 1;
                if roots > 1 {
                    return Err(QuireError::schema_violation(
                        format,
                        format!("line {line}: multiple root elements, second is <{name}>"),
                    ));
                }
            }
            if self_closing {
                tags.push(Tag::Empty(name));
            } else {
                stack.push(name.clone());
                tags.push(Tag::Open(name));
            }
        }
        pos += end;
    }

    if let Some(open) = stack.pop() {
        return Err(QuireError::schema_violation(
            format,
            format!("<{open}> is never closed"),
        ));
    }
    if roots == 0 {
        return Err(QuireError::schema_violation(format, "no root element"));
    }
    Ok(tags)
}

fn find_end(rest: &str, terminator: &str, format: &str, line: usize) -> QuireResult<usize> {
    rest.find(terminator)
        .map(|i| i + terminator.len())
        .ok_or_else(|| {
            QuireError::schema_violation(
                format,
                format!("line {line}: markup opened but '{terminator}' never follows"),
            )
        })
}

fn line_of(document: &str, pos: usize) -> usize {
    document[..pos].bytes().filter(|&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_replaces_all_five_specials() {
        assert_eq!(
            xmlescape(r#"a & b < c > "d" 'e'"#),
            "a &amp; b &lt; c &gt; &quot;d&quot; &apos;e&apos;"
        );
        assert_eq!(xmlescape("plain"), "plain");
    }

    #[test]
    fn scan_yields_events_in_document_order() {
        let tags = scan("<a><b x=\"1\"/><c>text</c></a>", "test").unwrap();
        assert_eq!(
            tags,
            vec![
                Tag::Open("a".into()),
                Tag::Empty("b".into()),
                Tag::Open("c".into()),
                Tag::Close("c".into()),
                Tag::Close("a".into()),
            ]
        );
    }

    #[test]
    fn scan_skips_declarations_and_comments() {
        let doc = "<?xml version=\"1.0\"?>\n<!-- note -->\n<root/>";
        let tags = scan(doc, "test").unwrap();
        assert_eq!(tags, vec![Tag::Empty("root".into())]);
    }

    #[test]
    fn mismatched_close_is_rejected_with_line_context() {
        let err = scan("<a>\n<b>\n</a>", "test").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 3"));
        assert!(msg.contains("</a> closes <b>"));
    }

    #[test]
    fn unclosed_element_is_rejected() {
        let err = scan("<a><b/>", "test").unwrap_err();
        assert!(err.to_string().contains("<a> is never closed"));
    }

    #[test]
    fn multiple_roots_are_rejected() {
        let err = scan("<a/><b/>", "test").unwrap_err();
        assert!(err.to_string().contains("multiple root elements"));
    }

    #[test]
    fn stray_close_is_rejected() {
        let err = scan("</a>", "test").unwrap_err();
        assert!(err.to_string().contains("no matching open tag"));
    }

    #[test]
    fn empty_document_has_no_root() {
        let err = scan("  \n ", "test").unwrap_err();
        assert!(err.to_string().contains("no root element"));
    }
}
