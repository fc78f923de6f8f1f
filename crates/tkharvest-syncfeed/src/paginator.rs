//! One page of the feed per call

use tkharvest_core::{FetchError, Transport};
use url::Url;

use crate::feed::{Entry, ParseError, parse_feed};

/// Page-level failure; ends the paging loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    Fetch(FetchError),
    Parse(ParseError),
}

impl std::fmt::Display for PageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "page fetch failed: {e}"),
            Self::Parse(e) => write!(f, "page parse failed: {e}"),
        }
    }
}

impl std::error::Error for PageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Parse(e) => Some(e),
        }
    }
}

impl From<FetchError> for PageError {
    fn from(e: FetchError) -> Self {
        Self::Fetch(e)
    }
}

impl From<ParseError> for PageError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOutcome {
    pub entries: Vec<Entry>,
    pub next_token: Option<i64>,
    /// False exactly when no next token was found
    pub has_more: bool,
}

/// Feed endpoint client
pub struct Paginator<'a> {
    transport: &'a dyn Transport,
    feed_url: Url,
}

impl<'a> Paginator<'a> {
    pub fn new(transport: &'a dyn Transport, feed_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            transport,
            feed_url: Url::parse(feed_url)?,
        })
    }

    /// `{feed_url}?category=<c>[&skiptoken=<n>]`; no skiptoken for a negative token
    pub fn request_url(&self, category: &str, token: i64) -> Url {
        let mut url = self.feed_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("category", category);
            if token >= 0 {
                query.append_pair("skiptoken", &token.to_string());
            }
        }
        url
    }

    /// Fetch and parse the page that starts after `token`
    pub fn next_page(&self, category: &str, token: i64) -> Result<PageOutcome, PageError> {
        let url = self.request_url(category, token);
        log::debug!("GET {url}");
        let response = self.transport.get(url.as_str())?;
        let page = parse_feed(&response.body)?;
        let next_token = page.next_token();
        Ok(PageOutcome {
            entries: page.entries,
            next_token,
            has_more: next_token.is_some(),
        })
    }
}
