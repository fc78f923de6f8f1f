//! Row buffer → Arrow `RecordBatch`

use arrow::array::RecordBatch;
use arrow::error::ArrowError;

/// Rows per `RecordBatch` when writing a batch out
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Column-wise row buffer flushed into record batches
pub trait Accumulator {
    type Row;

    fn push(&mut self, row: Self::Row);

    /// Number of rows currently buffered
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer reached [`DEFAULT_BATCH_SIZE`] and should be flushed
    fn is_full(&self) -> bool {
        self.len() >= DEFAULT_BATCH_SIZE
    }

    /// Take buffered rows as a RecordBatch, resetting internal state
    fn take_batch(&mut self) -> Result<RecordBatch, ArrowError>;
}

/// Push every row, handing full batches (and the remainder) to `write_batch`.
///
/// Returns the number of rows written.
pub fn write_rows<A, I>(
    acc: &mut A,
    rows: I,
    mut write_batch: impl FnMut(&RecordBatch) -> std::io::Result<()>,
) -> std::io::Result<usize>
where
    A: Accumulator,
    I: IntoIterator<Item = A::Row>,
{
    let mut written = 0usize;
    for row in rows {
        acc.push(row);
        written += 1;
        if acc.is_full() {
            write_batch(&acc.take_batch().map_err(std::io::Error::other)?)?;
        }
    }
    if !acc.is_empty() {
        write_batch(&acc.take_batch().map_err(std::io::Error::other)?)?;
    }
    Ok(written)
}
