//! Tombstone detection for feed entries
//!
//! A deleted record is still published in the feed, with its nested
//! content carrying a namespaced marker attribute, e.g.
//! `<ns1:Document xmlns:tk="..." tk:verwijderd="true"/>`. The prefix may
//! be declared on an enclosing feed element rather than in the content.

use std::borrow::Cow;

use quick_xml::NsReader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};

use crate::feed::Entry;

/// Namespace of the Tweede Kamer data model
pub const TK_DATA_NAMESPACE: &str = "http://www.tweedekamer.nl/xsd/tkData/v1-0";

/// Which attribute marks a record as deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionMarker {
    pub namespace: String,
    pub attribute: String,
}

impl Default for DeletionMarker {
    fn default() -> Self {
        Self {
            namespace: TK_DATA_NAMESPACE.to_string(),
            attribute: "verwijderd".to_string(),
        }
    }
}

/// Nested content could not be parsed as XML
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedContentError {
    pub message: String,
}

impl MalformedContentError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for MalformedContentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed nested content: {}", self.message)
    }
}

impl std::error::Error for MalformedContentError {}

/// Whether `entry` is a tombstone.
///
/// No content, or whitespace-only content, means live.
pub fn is_deleted(entry: &Entry, marker: &DeletionMarker) -> Result<bool, MalformedContentError> {
    match entry.content.as_deref() {
        None => Ok(false),
        Some(content) => content_is_deleted(content, &entry.content_namespaces, marker),
    }
}

/// Inspect the root element of `content` and its immediate children for
/// `marker` with value exactly `"true"`.
///
/// `scope` lists the `(prefix, namespace)` bindings inherited from the
/// enclosing feed. The whole fragment is read so that syntax errors
/// anywhere surface as [`MalformedContentError`].
pub fn content_is_deleted(
    content: &str,
    scope: &[(String, String)],
    marker: &DeletionMarker,
) -> Result<bool, MalformedContentError> {
    let xml = nested_xml(content)?;
    if xml.trim().is_empty() {
        return Ok(false);
    }

    // Inherited prefixes are bound on a synthetic parent, one level above
    // the content root.
    let scoped;
    let (xml, base) = if scope.is_empty() {
        (xml.as_ref(), 0)
    } else {
        scoped = wrap_in_scope(&xml, scope);
        (scoped.as_str(), 1)
    };

    let mut reader = NsReader::from_str(xml);
    let mut depth = 0usize;
    let mut saw_element = false;
    let mut deleted = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth > base {
                    saw_element = true;
                    if depth <= base + 2 && carries_marker(&reader, &e, marker) {
                        deleted = true;
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                saw_element = true;
                if depth < base + 2 && carries_marker(&reader, &e, marker) {
                    deleted = true;
                }
            }
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| MalformedContentError::new("unexpected end tag"))?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(MalformedContentError::new(format!(
                    "{e} at byte {}",
                    reader.buffer_position()
                )));
            }
        }
    }

    if depth != 0 {
        return Err(MalformedContentError::new("unclosed element"));
    }
    if !saw_element {
        return Err(MalformedContentError::new("no element found"));
    }
    Ok(deleted)
}

/// Unwrap CDATA or entity-escaped content into markup
fn nested_xml(content: &str) -> Result<Cow<'_, str>, MalformedContentError> {
    let trimmed = content.trim();
    if let Some(inner) = trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
    {
        return Ok(Cow::Borrowed(inner));
    }
    if trimmed.starts_with("&lt;") {
        return quick_xml::escape::unescape(trimmed)
            .map(|s| Cow::Owned(s.into_owned()))
            .map_err(|e| MalformedContentError::new(e.to_string()));
    }
    Ok(Cow::Borrowed(content))
}

fn wrap_in_scope(xml: &str, scope: &[(String, String)]) -> String {
    let mut wrapped = String::from("<scope");
    for (prefix, uri) in scope {
        wrapped.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape(uri.as_str())));
    }
    wrapped.push('>');
    wrapped.push_str(xml);
    wrapped.push_str("</scope>");
    wrapped
}

fn carries_marker(reader: &NsReader<&[u8]>, e: &BytesStart, marker: &DeletionMarker) -> bool {
    e.attributes().flatten().any(|attr| {
        let (ns, local) = reader.resolve_attribute(attr.key);
        local.as_ref() == marker.attribute.as_bytes()
            && matches!(ns, ResolveResult::Bound(Namespace(uri)) if uri == marker.namespace.as_bytes())
            && &*attr.value == b"true"
    })
}
