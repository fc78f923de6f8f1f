//! Parquet publisher: read the artifact back

use std::fs::File;

use arrow::array::{Array, StringArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::TempDir;
use tkharvest_syncfeed::{Document, ParquetPublisher, Publisher};

fn doc(n: usize) -> Document {
    Document {
        url: format!("https://res.test/{n}"),
        content: format!("Kamerstuk {n}\nmet tekst"),
        source: "Tweede Kamer".to_string(),
    }
}

fn column(batch: &arrow::array::RecordBatch, name: &str) -> Vec<String> {
    let col = batch
        .column_by_name(name)
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(col.null_count(), 0);
    (0..col.len()).map(|i| col.value(i).to_string()).collect()
}

#[test]
fn batch_is_written_in_order() {
    let dir = TempDir::new().unwrap();
    let publisher = ParquetPublisher::new(dir.path(), 3);
    let batch: Vec<_> = (0..3).map(doc).collect();

    let path = publisher.publish(&batch, "user/ingest").unwrap().unwrap();

    assert_eq!(path, dir.path().join("user/ingest/data/latest.parquet"));
    assert!(tkharvest_core::is_valid_parquet(&path));
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<_> = reader.map(Result::unwrap).collect();
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    assert_eq!(rows, 3);
    assert_eq!(
        column(&batches[0], "url"),
        ["https://res.test/0", "https://res.test/1", "https://res.test/2"]
    );
    assert_eq!(column(&batches[0], "content")[1], "Kamerstuk 1\nmet tekst");
    assert!(column(&batches[0], "source").iter().all(|s| s == "Tweede Kamer"));
}

#[test]
fn empty_batch_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let publisher = ParquetPublisher::new(dir.path(), 3);

    assert_eq!(publisher.publish(&[], "user/ingest").unwrap(), None);
    assert!(!dir.path().join("user").exists());
}

#[test]
fn republish_replaces_artifact() {
    let dir = TempDir::new().unwrap();
    let publisher = ParquetPublisher::new(dir.path(), 3);
    publisher.publish(&[doc(1), doc(2)], "user/ingest").unwrap();

    let path = publisher.publish(&[doc(9)], "user/ingest").unwrap().unwrap();

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<_> = reader.map(Result::unwrap).collect();
    assert_eq!(column(&batches[0], "url"), ["https://res.test/9"]);
    assert!(!path.with_extension("parquet.tmp").exists());
}

#[test]
fn stale_tmp_file_is_removed() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("user/ingest/data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("old.parquet.tmp"), b"partial").unwrap();

    ParquetPublisher::new(dir.path(), 3)
        .publish(&[doc(1)], "user/ingest")
        .unwrap();

    assert!(!data.join("old.parquet.tmp").exists());
    assert!(data.join("latest.parquet").exists());
}
