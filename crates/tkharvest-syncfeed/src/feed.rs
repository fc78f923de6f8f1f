//! SyncFeed page parser using quick-xml
//!
//! Elements are matched by local name, so default-namespaced and
//! prefixed Atom parse the same way.

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

/// Malformed feed XML
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Body is not UTF-8
    Encoding(String),
    /// XML syntax error reported by the reader
    Syntax { position: u64, message: String },
    /// Root element is not `<feed>`
    UnexpectedRoot(String),
    /// Document ended with open elements, or had no root at all
    Truncated,
    /// Another element follows the closed `<feed>`
    TrailingElement(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encoding(msg) => write!(f, "feed is not valid UTF-8: {msg}"),
            Self::Syntax { position, message } => {
                write!(f, "feed XML error at byte {position}: {message}")
            }
            Self::UnexpectedRoot(name) => write!(f, "expected <feed> root, found <{name}>"),
            Self::Truncated => write!(f, "feed XML is truncated"),
            Self::TrailingElement(name) => write!(f, "unexpected <{name}> after </feed>"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Typed `<link>` of an entry or of the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// `rel` attribute; Atom's default is `alternate`
    pub rel: String,
    pub href: String,
    /// `type` attribute as declared in the feed (informational only)
    pub media_type: Option<String>,
}

/// One `<entry>` of a feed page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    /// Raw inner markup of `<content>`, if the element is present
    pub content: Option<String>,
    /// `xmlns:` prefix bindings in scope at `<content>`, declared on
    /// `<feed>`, `<entry>` or `<content>` itself
    pub content_namespaces: Vec<(String, String)>,
    pub links: Vec<Link>,
}

impl Entry {
    /// Payload URL: the first `enclosure` link
    pub fn enclosure_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "enclosure")
            .map(|l| l.href.as_str())
    }

    /// Hrefs of `next` links in document order
    pub fn next_hrefs(&self) -> impl Iterator<Item = &str> {
        self.links
            .iter()
            .filter(|l| l.rel == "next")
            .map(|l| l.href.as_str())
    }
}

/// One parsed response of the feed endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub entries: Vec<Entry>,
    /// Feed-level `next` link href (last one wins)
    pub next_href: Option<String>,
}

impl FeedPage {
    /// Pagination token for the following page.
    ///
    /// Entry-level `next` links are scanned in order and the last parseable
    /// token wins. Only if no entry carries one is the feed-level link used.
    pub fn next_token(&self) -> Option<i64> {
        let from_entries = self
            .entries
            .iter()
            .flat_map(Entry::next_hrefs)
            .filter_map(skiptoken_from_href)
            .last();
        if let Some(token) = from_entries {
            log::debug!("next skiptoken from entries: {token}");
            return Some(token);
        }
        let token = self.next_href.as_deref().and_then(skiptoken_from_href);
        if let Some(token) = token {
            log::debug!("next skiptoken from feed link: {token}");
        }
        token
    }
}

/// Extract the non-negative integer `skiptoken` query parameter of an href.
///
/// Relative hrefs are accepted. Returns `None` when absent or not a
/// non-negative integer.
pub fn skiptoken_from_href(href: &str) -> Option<i64> {
    let parsed = url::Url::parse(href).or_else(|_| {
        url::Url::parse("http://feed.invalid/").and_then(|base| base.join(href))
    });
    let url = match parsed {
        Ok(url) => url,
        Err(e) => {
            log::debug!("ignoring unparseable next href {href:?}: {e}");
            return None;
        }
    };
    let raw = url
        .query_pairs()
        .find(|(k, _)| k == "skiptoken")
        .map(|(_, v)| v.into_owned())?;
    match raw.trim().parse::<i64>() {
        Ok(token) if token >= 0 => Some(token),
        _ => {
            log::debug!("ignoring non-numeric skiptoken {raw:?} in {href}");
            None
        }
    }
}

fn syntax_err(reader: &Reader<&[u8]>, e: impl std::fmt::Display) -> ParseError {
    ParseError::Syntax {
        position: reader.buffer_position() as u64,
        message: e.to_string(),
    }
}

/// Parse one feed response body
pub fn parse_feed(body: &[u8]) -> Result<FeedPage, ParseError> {
    let xml = std::str::from_utf8(body).map_err(|e| ParseError::Encoding(e.to_string()))?;
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = FeedPage::default();
    // 0 = outside root, 1 = direct children of <feed>
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut feed_scope = Vec::new();

    loop {
        match reader.read_event().map_err(|e| syntax_err(&reader, e))? {
            Event::Start(e) => {
                if depth == 0 {
                    expect_single_root(&e, saw_root)?;
                    bind_prefixes(&mut feed_scope, &e);
                    saw_root = true;
                    depth = 1;
                    continue;
                }
                match (depth, e.local_name().as_ref()) {
                    (1, b"entry") => {
                        let mut scope = feed_scope.clone();
                        bind_prefixes(&mut scope, &e);
                        page.entries.push(parse_entry(&mut reader, scope)?);
                    }
                    (1, b"link") => {
                        record_feed_link(&e, &mut page);
                        reader
                            .read_to_end(e.name())
                            .map_err(|err| syntax_err(&reader, err))?;
                    }
                    _ => depth += 1,
                }
            }
            Event::Empty(e) => {
                if depth == 0 {
                    expect_single_root(&e, saw_root)?;
                    saw_root = true;
                } else if depth == 1 {
                    match e.local_name().as_ref() {
                        b"link" => record_feed_link(&e, &mut page),
                        b"entry" => {
                            log::debug!("empty <entry/> at byte {}", reader.buffer_position());
                            page.entries.push(Entry::default());
                        }
                        _ => {}
                    }
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root || depth != 0 {
        return Err(ParseError::Truncated);
    }
    Ok(page)
}

fn expect_single_root(e: &BytesStart, saw_root: bool) -> Result<(), ParseError> {
    let name = || String::from_utf8_lossy(e.name().as_ref()).into_owned();
    if saw_root {
        Err(ParseError::TrailingElement(name()))
    } else if e.local_name().as_ref() == b"feed" {
        Ok(())
    } else {
        Err(ParseError::UnexpectedRoot(name()))
    }
}

/// Merge the `xmlns:` declarations of `e` into `scope`; a rebound prefix
/// replaces the outer binding.
fn bind_prefixes(scope: &mut Vec<(String, String)>, e: &BytesStart) {
    for attr in e.attributes().flatten() {
        let Some(prefix) = attr.key.as_ref().strip_prefix(b"xmlns:") else {
            continue;
        };
        let (Ok(prefix), Ok(uri)) = (std::str::from_utf8(prefix), attr.unescape_value()) else {
            continue;
        };
        match scope.iter_mut().find(|(p, _)| p == prefix) {
            Some(binding) => binding.1 = uri.into_owned(),
            None => scope.push((prefix.to_string(), uri.into_owned())),
        }
    }
}

fn record_feed_link(e: &BytesStart, page: &mut FeedPage) {
    if let Some(link) = link_from(e) {
        if link.rel == "next" {
            page.next_href = Some(link.href);
        }
    }
}

fn link_from(e: &BytesStart) -> Option<Link> {
    let mut rel = None;
    let mut href = None;
    let mut media_type = None;
    for attr in e.attributes().flatten() {
        let Ok(value) = attr.unescape_value() else {
            continue;
        };
        match attr.key.local_name().as_ref() {
            b"rel" => rel = Some(value.into_owned()),
            b"href" => href = Some(value.into_owned()),
            b"type" => media_type = Some(value.into_owned()),
            _ => {}
        }
    }
    Some(Link {
        rel: rel.unwrap_or_else(|| "alternate".to_string()),
        href: href?,
        media_type,
    })
}

/// Parse children of `<entry>` up to and including its end tag.
///
/// `scope` holds the prefix bindings of `<feed>` and `<entry>`.
fn parse_entry(
    reader: &mut Reader<&[u8]>,
    scope: Vec<(String, String)>,
) -> Result<Entry, ParseError> {
    let mut entry = Entry::default();
    // depth relative to <entry>
    let mut depth = 0usize;

    loop {
        match reader.read_event().map_err(|e| syntax_err(reader, e))? {
            Event::Start(e) => {
                if depth == 0 {
                    match e.local_name().as_ref() {
                        b"id" => {
                            let raw = reader.read_text(e.name()).map_err(|err| syntax_err(reader, err))?;
                            entry.id = unescape(raw.trim())
                                .map_err(|err| syntax_err(reader, err))?
                                .into_owned();
                            continue;
                        }
                        b"content" => {
                            entry.content_namespaces = scope.clone();
                            bind_prefixes(&mut entry.content_namespaces, &e);
                            let raw = reader.read_text(e.name()).map_err(|err| syntax_err(reader, err))?;
                            entry.content = Some(raw.into_owned());
                            continue;
                        }
                        b"link" => {
                            entry.links.extend(link_from(&e));
                            reader
                                .read_to_end(e.name())
                                .map_err(|err| syntax_err(reader, err))?;
                            continue;
                        }
                        _ => {}
                    }
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 0 => match e.local_name().as_ref() {
                b"link" => entry.links.extend(link_from(&e)),
                b"content" => entry.content = Some(String::new()),
                _ => {}
            },
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => return Err(ParseError::Truncated),
            _ => {}
        }
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>SyncFeed</title>
  <link rel="self" href="https://example.org/Feed?category=Document"/>
  <entry>
    <id>https://example.org/Document/aaa</id>
    <link rel="enclosure" href="https://example.org/Document/aaa/resource" type="application/pdf"/>
    <link rel="next" href="https://example.org/Feed?category=Document&amp;skiptoken=100"/>
    <content type="application/xml">
      <ns1:Document xmlns:ns1="http://www.tweedekamer.nl/xsd/tkData/v1-0" id="aaa"/>
    </content>
  </entry>
  <entry>
    <id>https://example.org/Document/bbb</id>
    <link rel="next" href="https://example.org/Feed?category=Document&amp;skiptoken=101"/>
  </entry>
  <link rel="next" href="https://example.org/Feed?category=Document&amp;skiptoken=999"/>
</feed>"#;

    #[test]
    fn parses_entries_and_links() {
        let page = parse_feed(FEED.as_bytes()).unwrap();
        assert_eq!(page.entries.len(), 2);

        let first = &page.entries[0];
        assert_eq!(first.id, "https://example.org/Document/aaa");
        assert_eq!(
            first.enclosure_url(),
            Some("https://example.org/Document/aaa/resource")
        );
        assert_eq!(first.links[0].media_type.as_deref(), Some("application/pdf"));
        assert!(first.content.as_deref().unwrap().contains("ns1:Document"));

        assert_eq!(page.entries[1].enclosure_url(), None);
        assert_eq!(page.entries[1].content, None);
    }

    #[test]
    fn entry_token_beats_feed_token_and_last_wins() {
        let page = parse_feed(FEED.as_bytes()).unwrap();
        assert_eq!(
            page.next_href.as_deref(),
            Some("https://example.org/Feed?category=Document&skiptoken=999")
        );
        assert_eq!(page.next_token(), Some(101));
    }

    #[test]
    fn feed_level_token_is_fallback() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <link rel="next" href="https://example.org/Feed?skiptoken=42&amp;category=Document"/>
</feed>"#;
        let page = parse_feed(xml.as_bytes()).unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.next_token(), Some(42));
    }

    #[test]
    fn no_next_link_means_no_token() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><id>x</id></entry></feed>"#;
        assert_eq!(parse_feed(xml.as_bytes()).unwrap().next_token(), None);
    }

    #[test]
    fn prefixed_atom_parses() {
        let xml = r#"<a:feed xmlns:a="http://www.w3.org/2005/Atom">
  <a:entry>
    <a:id>p1</a:id>
    <a:link rel="enclosure" href="https://example.org/p1"></a:link>
  </a:entry>
</a:feed>"#;
        let page = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(page.entries[0].id, "p1");
        assert_eq!(page.entries[0].enclosure_url(), Some("https://example.org/p1"));
    }

    #[test]
    fn nested_link_in_content_is_not_an_entry_link() {
        let xml = r#"<feed><entry><id>x</id>
  <content type="application/xml"><doc><link rel="enclosure" href="https://wrong"/></doc></content>
</entry></feed>"#;
        let page = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(page.entries[0].enclosure_url(), None);
    }

    #[test]
    fn skiptoken_parsing() {
        assert_eq!(skiptoken_from_href("https://x/Feed?skiptoken=7"), Some(7));
        assert_eq!(skiptoken_from_href("/Feed?category=A&skiptoken=8"), Some(8));
        assert_eq!(skiptoken_from_href("https://x/Feed?skiptoken=abc"), None);
        assert_eq!(skiptoken_from_href("https://x/Feed?skiptoken=-3"), None);
        assert_eq!(skiptoken_from_href("https://x/Feed?category=A"), None);
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let xml = "<feed><entry><id>x</id></feed>";
        assert!(parse_feed(xml.as_bytes()).is_err());
    }

    #[test]
    fn truncated_xml_is_parse_error() {
        let xml = "<feed><entry><id>x</id></entry>";
        assert_eq!(parse_feed(xml.as_bytes()), Err(ParseError::Truncated));
    }

    #[test]
    fn wrong_root_rejected() {
        let err = parse_feed(b"<html><body/></html>").unwrap_err();
        assert_eq!(err, ParseError::UnexpectedRoot("html".to_string()));
    }

    #[test]
    fn empty_body_rejected() {
        assert_eq!(parse_feed(b""), Err(ParseError::Truncated));
    }

    #[test]
    fn content_namespaces_collect_outer_declarations() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:tk="urn:feed" xmlns:a="urn:a">
  <entry xmlns:tk="urn:entry">
    <content type="application/xml" xmlns:c="urn:c"><tk:Document/></content>
  </entry>
</feed>"#;
        let page = parse_feed(xml.as_bytes()).unwrap();
        let mut scope = page.entries[0].content_namespaces.clone();
        scope.sort();
        assert_eq!(
            scope,
            [
                ("a".to_string(), "urn:a".to_string()),
                ("c".to_string(), "urn:c".to_string()),
                ("tk".to_string(), "urn:entry".to_string()),
            ]
        );
    }

    #[test]
    fn self_closing_entry_counts_as_empty_entry() {
        let xml = r#"<feed><entry/><entry><id>x</id></entry></feed>"#;
        let page = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert_eq!(page.entries[0], Entry::default());
        assert_eq!(page.entries[1].id, "x");
    }

    #[test]
    fn element_after_feed_rejected() {
        let xml = r#"<feed><entry><id>x</id></entry></feed><feed/>"#;
        assert_eq!(
            parse_feed(xml.as_bytes()),
            Err(ParseError::TrailingElement("feed".to_string()))
        );
        let xml = r#"<feed/><entry><id>y</id></entry>"#;
        assert_eq!(
            parse_feed(xml.as_bytes()),
            Err(ParseError::TrailingElement("entry".to_string()))
        );
    }

    #[test]
    fn invalid_utf8_rejected() {
        assert!(matches!(
            parse_feed(&[0x3c, 0xff, 0xfe]),
            Err(ParseError::Encoding(_))
        ));
    }
}
