//! tkharvest core - shared infrastructure for feed harvesting
//!
//! HTTP transport over a shared runtime, logging with progress-bar
//! integration, and the Arrow accumulator and Parquet sink used when
//! publishing a batch.

pub mod accumulator;
pub mod http;
pub mod logging;
pub mod progress;
pub mod sink;

// Re-exports for convenience
pub use accumulator::{Accumulator, DEFAULT_BATCH_SIZE, write_rows};
pub use http::{FetchError, HttpConfig, HttpResponse, ReqwestTransport, Transport};
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use sink::{ParquetSink, cleanup_tmp_files, is_valid_parquet};
