//! Harvested document record

/// Normalized text of one enclosure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Enclosure URL, unique within a batch
    pub url: String,
    /// Non-empty plain text
    pub content: String,
    /// Human-readable origin label
    pub source: String,
}

/// Documents of one run in harvest order
pub type Batch = Vec<Document>;
