//! tkharvest-store: durable resume points for feed harvesting
//!
//! One integer pagination token per feed category. A run reads its
//! category's cursor once at start and writes it once at the end.

pub mod cursor;

pub use cursor::{CursorRecord, CursorStore, JsonCursorStore, MemoryCursorStore, NO_PROGRESS, StoreError};
