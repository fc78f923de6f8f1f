//! Arrow schema of the published corpus

use std::sync::{Arc, LazyLock};

use arrow::datatypes::{DataType, Field, Schema};

/// One row per harvested document
pub static DOCUMENTS: LazyLock<Arc<Schema>> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("url", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
    ]))
});

pub fn documents() -> &'static Schema {
    &DOCUMENTS
}
