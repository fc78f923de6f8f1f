//! tkharvest SyncFeed - incremental harvester for the Tweede Kamer SyncFeed
//!
//! Walks the token-paginated Atom feed from a durable cursor, drops
//! tombstoned entries, fetches each enclosure and normalizes it to plain
//! text, then hands the batch to a [`Publisher`].
//!
//! # Example
//!
//! ```ignore
//! use tkharvest_core::{HttpConfig, ReqwestTransport};
//! use tkharvest_store::JsonCursorStore;
//! use tkharvest_syncfeed::{Config, Harvester, ParquetPublisher, PdfToText, Publisher};
//!
//! let config = Config::default();
//! let transport = ReqwestTransport::new(HttpConfig::default())?;
//! let store = JsonCursorStore::new("state/progress.json");
//! let extractor = PdfToText::default();
//!
//! let harvest = Harvester::new(&config, &transport, &extractor, &store)?.run("Document")?;
//! ParquetPublisher::new("output", 3).publish(&harvest.batch, "user/ingest")?;
//! ```

pub mod config;
pub mod document;
pub mod extract;
pub mod feed;
pub mod filter;
pub mod harvest;
pub mod normalize;
pub mod paginator;
pub mod publish;
pub mod schema;
pub mod transform;

// Re-exports
pub use config::Config;
pub use document::{Batch, Document};
pub use extract::{ConversionFailure, PdfToText, TextExtractor};
pub use feed::{Entry, FeedPage, Link, ParseError, parse_feed};
pub use filter::{DeletionMarker, MalformedContentError, is_deleted};
pub use harvest::{Harvest, HarvestSummary, Harvester, StopReason};
pub use normalize::{MediaKind, RawPayload, Skip, SkipReason, normalize};
pub use paginator::{PageError, PageOutcome, Paginator};
pub use publish::{ParquetPublisher, Publisher};
