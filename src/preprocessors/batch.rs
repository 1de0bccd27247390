use super::fix::CanonicalFix;

/// Column count of one persisted fix row.
pub const FIX_COLUMN_COUNT: usize = 18;
/// PostgreSQL caps a single statement at 65535 bind parameters.
pub const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;
/// Largest chunk a single multi-row insert statement can carry.
pub const MAX_FIXES_PER_STATEMENT: usize = MAX_BIND_PARAMETERS / FIX_COLUMN_COUNT;

/// Splits normalized batches into bounded sub-batches for the persister.
#[derive(Debug, Clone, Copy)]
pub struct FixChunker {
    max_chunk: usize,
}

impl FixChunker {
    pub fn new(max_chunk: usize) -> Self {
        Self {
            max_chunk: max_chunk.clamp(1, MAX_FIXES_PER_STATEMENT),
        }
    }

    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    pub fn chunks<'a>(&self, fixes: &'a [CanonicalFix]) -> std::slice::Chunks<'a, CanonicalFix> {
        fixes.chunks(self.max_chunk)
    }
}
