use crate::domain::EntityKey;
use crate::store::MAX_BATCH_SIZE;

/// Keys for one atomic batch delete. Never empty, never spans partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteChunk {
    keys: Vec<EntityKey>,
}

impl DeleteChunk {
    pub fn keys(&self) -> &[EntityKey] {
        &self.keys
    }

    pub fn partition_key(&self) -> &str {
        &self.keys[0].partition_key
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchChunker {
    limit: usize,
}

impl BatchChunker {
    /// `limit` is clamped to `1..=MAX_BATCH_SIZE`.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.clamp(1, MAX_BATCH_SIZE),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Splits `keys` into contiguous, order-preserving chunks of at most
    /// `limit` keys. A change of partition key always starts a new chunk.
    pub fn chunk(&self, keys: impl IntoIterator<Item = EntityKey>) -> Vec<DeleteChunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<EntityKey> = Vec::with_capacity(self.limit);

        for key in keys {
            let partition_changed = current
                .first()
                .is_some_and(|first| first.partition_key != key.partition_key);
            if current.len() == self.limit || partition_changed {
                chunks.push(DeleteChunk {
                    keys: std::mem::replace(&mut current, Vec::with_capacity(self.limit)),
                });
            }
            current.push(key);
        }
        if !current.is_empty() {
            chunks.push(DeleteChunk { keys: current });
        }

        chunks
    }
}

impl Default for BatchChunker {
    fn default() -> Self {
        Self::new(MAX_BATCH_SIZE)
    }
}
