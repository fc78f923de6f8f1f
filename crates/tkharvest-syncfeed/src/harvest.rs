//! Harvest orchestrator
//!
//! One run is an explicit state machine:
//!
//! ```text
//! Init ──read cursor──▶ Paging ──page ok, token advances──▶ Paging
//!                          │
//!                          └──end / page error / limit──▶ Done ──persist cursor──▶ Harvest
//! ```
//!
//! The cursor lives in the state, not in the store: the store is read at
//! `Init` and written once at `Done`. Entry-level failures are counted and
//! logged; page-level failures end paging; only a store failure is an error.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use rayon::prelude::*;
use tkharvest_core::{FetchError, Transport, fmt_num};
use tkharvest_store::{CursorStore, NO_PROGRESS, StoreError};

use crate::config::Config;
use crate::document::{Batch, Document};
use crate::extract::TextExtractor;
use crate::feed::Entry;
use crate::filter::is_deleted;
use crate::normalize::{RawPayload, Skip, SkipReason, normalize};
use crate::paginator::{PageError, PageOutcome, Paginator};

/// Why paging stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StopReason {
    /// Last page carried no next token
    #[default]
    EndOfFeed,
    /// Page fetch or parse failed; the cursor stays at the last good page
    PageFailed(PageError),
    /// Feed offered a token at or behind the cursor
    TokenNotAdvancing { token: i64 },
    /// `max_documents` reached at a page boundary
    DocumentLimit,
    /// `max_pages` pages processed
    PageLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndOfFeed => f.write_str("end of feed"),
            Self::PageFailed(e) => write!(f, "{e}"),
            Self::TokenNotAdvancing { token } => write!(f, "token {token} does not advance"),
            Self::DocumentLimit => f.write_str("document limit"),
            Self::PageLimit => f.write_str("page limit"),
        }
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub category: String,
    pub pages: usize,
    pub entries: usize,
    pub deleted: usize,
    pub malformed: usize,
    pub no_enclosure: usize,
    pub duplicates: usize,
    pub fetch_failures: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
    pub documents: usize,
    pub start_cursor: i64,
    pub final_cursor: i64,
    pub stop: StopReason,
    pub elapsed: Duration,
}

impl HarvestSummary {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Result of a run: the documents plus what happened
#[derive(Debug, Clone)]
pub struct Harvest {
    pub batch: Batch,
    pub summary: HarvestSummary,
}

enum HarvestState {
    Init,
    Paging { cursor: i64 },
    Done { cursor: i64, reason: StopReason },
}

/// Entry that survived filtering and is ready to fetch
struct Candidate {
    id: String,
    url: String,
}

enum EntryFailure {
    Fetch(FetchError),
    Skip(Skip),
}

/// Composes paginator, entry filter and normalizer into one resumable run
pub struct Harvester<'a> {
    config: &'a Config,
    paginator: Paginator<'a>,
    transport: &'a dyn Transport,
    extractor: &'a dyn TextExtractor,
    store: &'a dyn CursorStore,
    progress: ProgressBar,
}

impl<'a> Harvester<'a> {
    /// Fails only when `config.feed_url` is not a URL
    pub fn new(
        config: &'a Config,
        transport: &'a dyn Transport,
        extractor: &'a dyn TextExtractor,
        store: &'a dyn CursorStore,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            config,
            paginator: Paginator::new(transport, &config.feed_url)?,
            transport,
            extractor,
            store,
            progress: ProgressBar::hidden(),
        })
    }

    /// Report per-page progress on `pb`
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = pb;
        self
    }

    /// Harvest `category` from its stored cursor to the end of the feed
    /// (or a limit), then persist the final cursor.
    pub fn run(&self, category: &str) -> Result<Harvest, StoreError> {
        let start = Instant::now();
        let pool = self.worker_pool();

        let mut batch = Batch::new();
        let mut seen = HashSet::new();
        let mut summary = HarvestSummary {
            category: category.to_string(),
            ..Default::default()
        };

        let mut state = HarvestState::Init;
        loop {
            state = match state {
                HarvestState::Init => {
                    let cursor = self.store.get(category)?.unwrap_or(NO_PROGRESS);
                    log::info!("Harvesting {category} from cursor {cursor}");
                    summary.start_cursor = cursor;
                    HarvestState::Paging { cursor }
                }
                HarvestState::Paging { cursor } => match self.paginator.next_page(category, cursor) {
                    Ok(outcome) => {
                        summary.pages += 1;
                        let before = batch.len();
                        self.process_page(&outcome.entries, &mut seen, &mut batch, &mut summary, pool.as_ref());
                        log::info!(
                            "Page {}: {} entries, {} documents",
                            summary.pages,
                            outcome.entries.len(),
                            batch.len() - before
                        );
                        self.progress.set_message(format!(
                            "page {}, {} docs",
                            summary.pages,
                            fmt_num(batch.len())
                        ));
                        self.advance(cursor, &outcome, batch.len(), summary.pages)
                    }
                    Err(e) => {
                        log::warn!("Stopping at cursor {cursor}: {e}");
                        HarvestState::Done {
                            cursor,
                            reason: StopReason::PageFailed(e),
                        }
                    }
                },
                HarvestState::Done { cursor, reason } => {
                    self.store.set(category, cursor)?;
                    summary.final_cursor = cursor;
                    summary.documents = batch.len();
                    summary.stop = reason;
                    summary.elapsed = start.elapsed();
                    log::info!(
                        "Harvested {} documents from {} pages; cursor {} -> {} ({})",
                        summary.documents,
                        summary.pages,
                        summary.start_cursor,
                        summary.final_cursor,
                        summary.stop
                    );
                    self.progress.finish_and_clear();
                    return Ok(Harvest { batch, summary });
                }
            };
        }
    }

    /// Transition after a processed page
    fn advance(&self, cursor: i64, outcome: &PageOutcome, documents: usize, pages: usize) -> HarvestState {
        let next = match outcome.next_token {
            Some(next) if outcome.has_more => next,
            _ => {
                return HarvestState::Done {
                    cursor,
                    reason: StopReason::EndOfFeed,
                };
            }
        };
        if next <= cursor {
            log::warn!("Feed returned skiptoken {next} at cursor {cursor}; not advancing");
            return HarvestState::Done {
                cursor,
                reason: StopReason::TokenNotAdvancing { token: next },
            };
        }
        if self.config.max_documents.is_some_and(|max| documents >= max) {
            return HarvestState::Done {
                cursor: next,
                reason: StopReason::DocumentLimit,
            };
        }
        if self.config.max_pages.is_some_and(|max| pages >= max) {
            return HarvestState::Done {
                cursor: next,
                reason: StopReason::PageLimit,
            };
        }
        HarvestState::Paging { cursor: next }
    }

    fn process_page(
        &self,
        entries: &[Entry],
        seen: &mut HashSet<String>,
        batch: &mut Batch,
        summary: &mut HarvestSummary,
        pool: Option<&rayon::ThreadPool>,
    ) {
        summary.entries += entries.len();
        let candidates: Vec<Candidate> = entries
            .iter()
            .filter_map(|entry| self.candidate(entry, seen, summary))
            .collect();

        let fetch = |c: &Candidate| fetch_text(self.transport, self.extractor, &c.url);
        let results: Vec<Result<String, EntryFailure>> = match pool {
            Some(pool) => pool.install(|| candidates.par_iter().map(fetch).collect()),
            None => candidates.iter().map(fetch).collect(),
        };

        for (candidate, result) in candidates.into_iter().zip(results) {
            match result {
                Ok(content) => batch.push(Document {
                    url: candidate.url,
                    content,
                    source: self.config.source.clone(),
                }),
                Err(EntryFailure::Fetch(e)) => {
                    summary.fetch_failures += 1;
                    log::warn!("{}: enclosure {} failed: {e}", candidate.id, candidate.url);
                }
                Err(EntryFailure::Skip(skip)) => {
                    *summary.skipped.entry(skip.reason).or_default() += 1;
                    log::debug!("{}: skipped {}: {skip}", candidate.id, candidate.url);
                }
            }
        }
    }

    /// Deletion check, then enclosure, then within-run dedup
    fn candidate(
        &self,
        entry: &Entry,
        seen: &mut HashSet<String>,
        summary: &mut HarvestSummary,
    ) -> Option<Candidate> {
        match is_deleted(entry, &self.config.deletion_marker) {
            Ok(false) => {}
            Ok(true) => {
                summary.deleted += 1;
                log::debug!("{}: deleted", entry.id);
                return None;
            }
            Err(e) => {
                summary.malformed += 1;
                log::warn!("{}: {e}", entry.id);
                return None;
            }
        }
        let Some(url) = entry.enclosure_url() else {
            summary.no_enclosure += 1;
            log::debug!("{}: no enclosure", entry.id);
            return None;
        };
        if !seen.insert(url.to_string()) {
            summary.duplicates += 1;
            log::debug!("{}: duplicate enclosure {url}", entry.id);
            return None;
        }
        Some(Candidate {
            id: entry.id.clone(),
            url: url.to_string(),
        })
    }

    fn worker_pool(&self) -> Option<rayon::ThreadPool> {
        if self.config.workers <= 1 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("tkharvest-fetch-{i}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("Falling back to sequential fetching: {e}");
                None
            }
        }
    }
}

fn fetch_text(
    transport: &dyn Transport,
    extractor: &dyn TextExtractor,
    url: &str,
) -> Result<String, EntryFailure> {
    let payload = RawPayload::from(transport.get(url).map_err(EntryFailure::Fetch)?);
    normalize(&payload, extractor).map_err(EntryFailure::Skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tkharvest_core::HttpResponse;
    use tkharvest_store::MemoryCursorStore;

    use crate::extract::ConversionFailure;

    struct NoNetwork;

    impl Transport for NoNetwork {
        fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
            Err(FetchError::Http {
                status: None,
                message: format!("unexpected request {url}"),
            })
        }
    }

    struct NoPdf;

    impl TextExtractor for NoPdf {
        fn extract(&self, _pdf: &[u8]) -> Result<String, ConversionFailure> {
            Ok(String::new())
        }
    }

    fn outcome(next_token: Option<i64>) -> PageOutcome {
        PageOutcome {
            entries: Vec::new(),
            next_token,
            has_more: next_token.is_some(),
        }
    }

    fn done(state: HarvestState) -> (i64, StopReason) {
        match state {
            HarvestState::Done { cursor, reason } => (cursor, reason),
            HarvestState::Paging { cursor } => panic!("still paging at {cursor}"),
            HarvestState::Init => panic!("init"),
        }
    }

    #[test]
    fn advance_follows_the_token() {
        let config = Config::default();
        let store = MemoryCursorStore::new();
        let h = Harvester::new(&config, &NoNetwork, &NoPdf, &store).unwrap();
        assert!(matches!(
            h.advance(5, &outcome(Some(9)), 0, 1),
            HarvestState::Paging { cursor: 9 }
        ));
    }

    #[test]
    fn advance_refuses_backwards_tokens() {
        let config = Config::default();
        let store = MemoryCursorStore::new();
        let h = Harvester::new(&config, &NoNetwork, &NoPdf, &store).unwrap();
        assert_eq!(
            done(h.advance(9, &outcome(Some(9)), 0, 1)),
            (9, StopReason::TokenNotAdvancing { token: 9 })
        );
        assert_eq!(
            done(h.advance(9, &outcome(Some(3)), 0, 1)),
            (9, StopReason::TokenNotAdvancing { token: 3 })
        );
    }

    #[test]
    fn advance_stops_at_end_of_feed() {
        let config = Config::default();
        let store = MemoryCursorStore::new();
        let h = Harvester::new(&config, &NoNetwork, &NoPdf, &store).unwrap();
        assert_eq!(done(h.advance(4, &outcome(None), 0, 1)), (4, StopReason::EndOfFeed));
    }

    #[test]
    fn limits_adopt_the_token_first() {
        let config = Config {
            max_documents: Some(2),
            max_pages: Some(3),
            ..Default::default()
        };
        let store = MemoryCursorStore::new();
        let h = Harvester::new(&config, &NoNetwork, &NoPdf, &store).unwrap();
        assert_eq!(
            done(h.advance(1, &outcome(Some(2)), 2, 1)),
            (2, StopReason::DocumentLimit)
        );
        assert_eq!(done(h.advance(1, &outcome(Some(2)), 0, 3)), (2, StopReason::PageLimit));
        assert!(matches!(
            h.advance(1, &outcome(Some(2)), 1, 2),
            HarvestState::Paging { cursor: 2 }
        ));
    }

    #[test]
    fn page_failure_keeps_the_stored_cursor() {
        let config = Config::default();
        let store = MemoryCursorStore::with_cursor("Document", 17);
        let harvest = Harvester::new(&config, &NoNetwork, &NoPdf, &store)
            .unwrap()
            .run("Document")
            .unwrap();

        assert!(harvest.batch.is_empty());
        assert_eq!(harvest.summary.pages, 0);
        assert_eq!(harvest.summary.start_cursor, 17);
        assert_eq!(harvest.summary.final_cursor, 17);
        assert!(matches!(harvest.summary.stop, StopReason::PageFailed(PageError::Fetch(_))));
        assert_eq!(store.get("Document").unwrap(), Some(17));
    }

    #[test]
    fn invalid_feed_url() {
        let config = Config {
            feed_url: "::".to_string(),
            ..Default::default()
        };
        let store = MemoryCursorStore::new();
        assert!(Harvester::new(&config, &NoNetwork, &NoPdf, &store).is_err());
    }

    #[test]
    fn stop_reason_display() {
        assert_eq!(
            StopReason::TokenNotAdvancing { token: 3 }.to_string(),
            "token 3 does not advance"
        );
        assert_eq!(StopReason::default().to_string(), "end of feed");
    }
}
