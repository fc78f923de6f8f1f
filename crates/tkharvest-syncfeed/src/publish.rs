//! Batch publisher: finished batch → Parquet artifact

use std::path::PathBuf;

use anyhow::{Context, Result};
use tkharvest_core::{ParquetSink, cleanup_tmp_files, write_rows};

use crate::document::Document;
use crate::schema;
use crate::transform::DocumentAccumulator;

/// File name of the artifact inside `{destination}/data/`
pub const ARTIFACT_NAME: &str = "latest.parquet";

/// Delivers a batch to a named destination
pub trait Publisher {
    /// Returns where the batch went, or `None` when there was nothing to publish
    fn publish(&self, batch: &[Document], destination: &str) -> Result<Option<PathBuf>>;
}

/// Writes `{output_dir}/{destination}/data/latest.parquet`, replacing the
/// previous artifact atomically.
#[derive(Debug, Clone)]
pub struct ParquetPublisher {
    output_dir: PathBuf,
    zstd_level: i32,
}

impl ParquetPublisher {
    pub fn new(output_dir: impl Into<PathBuf>, zstd_level: i32) -> Self {
        Self {
            output_dir: output_dir.into(),
            zstd_level,
        }
    }

    /// Artifact path for `destination`
    pub fn artifact_path(&self, destination: &str) -> Result<PathBuf> {
        let mut path = self.output_dir.clone();
        path.push(destination_dir(destination)?);
        path.push("data");
        path.push(ARTIFACT_NAME);
        Ok(path)
    }
}

impl Publisher for ParquetPublisher {
    fn publish(&self, batch: &[Document], destination: &str) -> Result<Option<PathBuf>> {
        if batch.is_empty() {
            log::info!("Nothing to publish to {destination}");
            return Ok(None);
        }

        let path = self.artifact_path(destination)?;
        if let Some(data_dir) = path.parent() {
            cleanup_tmp_files(data_dir)
                .with_context(|| format!("Failed to clean {}", data_dir.display()))?;
        }

        let mut sink = ParquetSink::new(&path, schema::documents(), self.zstd_level)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut acc = DocumentAccumulator::new();
        write_rows(&mut acc, batch.iter().cloned(), |b| sink.write_batch(b))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        let rows = sink
            .finalize()
            .with_context(|| format!("Failed to finalize {}", path.display()))?;

        log::info!("Published {rows} documents to {}", path.display());
        Ok(Some(path))
    }
}

/// Map a hub-style identifier (`owner/name`) onto relative path components
fn destination_dir(destination: &str) -> Result<PathBuf> {
    let parts: Vec<&str> = destination
        .split('/')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    anyhow::ensure!(!parts.is_empty(), "empty publish destination");

    let mut dir = PathBuf::new();
    for part in parts {
        anyhow::ensure!(
            part != "." && part != "..",
            "invalid publish destination {destination:?}"
        );
        let clean: String = part
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        dir.push(clean);
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_identifier_becomes_nested_dirs() {
        let publisher = ParquetPublisher::new("out", 3);
        assert_eq!(
            publisher.artifact_path("user/ingest").unwrap(),
            PathBuf::from("out/user/ingest/data/latest.parquet")
        );
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(
            destination_dir("org name/set:v1").unwrap(),
            PathBuf::from("org_name/set_v1")
        );
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(destination_dir("../etc").is_err());
        assert!(destination_dir(" / ").is_err());
    }
}
