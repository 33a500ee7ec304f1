//! Chunking of statements into bounded write batches.

use backfill_core::statement::UpsertStatement;
use std::num::NonZeroUsize;

/// Batch size used by the reference backfill.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = match NonZeroUsize::new(500) {
    Some(n) => n,
    None => unreachable!(),
};

/// A consecutive slice of statements submitted as one unit.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'s> {
    /// Zero-based position among the file's batches.
    pub index: usize,
    pub statements: &'s [UpsertStatement],
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Split statements into groups of at most `capacity`, preserving order.
///
/// Yields `ceil(len / capacity)` batches; only the last may be short.
pub fn chunk(statements: &[UpsertStatement], capacity: NonZeroUsize) -> Vec<Batch<'_>> {
    statements
        .chunks(capacity.get())
        .enumerate()
        .map(|(index, statements)| Batch { index, statements })
        .collect()
}

/// Number of batches `total` statements will occupy.
pub fn batch_count(total: usize, capacity: NonZeroUsize) -> usize {
    total.div_ceil(capacity.get())
}
