//! Harvest run configuration

use crate::filter::DeletionMarker;

/// Public endpoint of the Tweede Kamer SyncFeed
pub const DEFAULT_FEED_URL: &str = "https://gegevensmagazijn.tweedekamer.nl/SyncFeed/2.0/Feed";

/// Runtime configuration for one harvest
#[derive(Debug, Clone)]
pub struct Config {
    /// Feed endpoint, without query
    pub feed_url: String,
    /// Feed category to harvest (one per run)
    pub category: String,
    /// `source` label stamped on every document
    pub source: String,
    /// Stop at the first page boundary with at least this many documents
    pub max_documents: Option<usize>,
    /// Stop after this many pages
    pub max_pages: Option<usize>,
    /// Enclosure fetch + normalize workers per page (1 = sequential)
    pub workers: usize,
    pub deletion_marker: DeletionMarker,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            category: "Document".to_string(),
            source: "Tweede Kamer".to_string(),
            max_documents: Some(1000),
            max_pages: None,
            workers: 1,
            deletion_marker: DeletionMarker::default(),
        }
    }
}
