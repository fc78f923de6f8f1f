//! Documents → Arrow RecordBatch

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::Schema;
use arrow::error::ArrowError;
use tkharvest_core::accumulator::{Accumulator, DEFAULT_BATCH_SIZE};

use crate::document::Document;
use crate::schema;

/// Column buffers for the documents schema
pub struct DocumentAccumulator {
    schema: &'static Schema,
    url: Vec<String>,
    content: Vec<String>,
    source: Vec<String>,
}

impl Default for DocumentAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAccumulator {
    pub fn new() -> Self {
        Self {
            schema: schema::documents(),
            url: Vec::with_capacity(DEFAULT_BATCH_SIZE),
            content: Vec::with_capacity(DEFAULT_BATCH_SIZE),
            source: Vec::with_capacity(DEFAULT_BATCH_SIZE),
        }
    }
}

impl Accumulator for DocumentAccumulator {
    type Row = Document;

    fn push(&mut self, doc: Document) {
        self.url.push(doc.url);
        self.content.push(doc.content);
        self.source.push(doc.source);
    }

    fn len(&self) -> usize {
        self.url.len()
    }

    fn take_batch(&mut self) -> Result<RecordBatch, ArrowError> {
        let arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(std::mem::take(&mut self.url))),
            Arc::new(StringArray::from(std::mem::take(&mut self.content))),
            Arc::new(StringArray::from(std::mem::take(&mut self.source))),
        ];
        RecordBatch::try_new(Arc::new(self.schema.clone()), arrays)
    }
}
