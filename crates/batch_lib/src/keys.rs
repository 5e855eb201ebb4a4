//! Reads the list of keys and splits it into batches.

use std::{io, num::NonZeroUsize, path::Path};

/// The delimiter between two keys in the keys file.
pub const KEY_DELIMITER: char = ',';

/// A fixed-size part of the key list, processed by a single worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBatch {
    /// The position of the batch in the key list.
    pub index: usize,
    /// The keys, in the order of the file.
    pub keys: Vec<String>,
}

impl KeyBatch {
    /// Returns the amount of keys in the batch.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the batch has no key.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Splits the content of a keys file into batches of `batch_size` keys.
///
/// The keys aren't trimmed nor deduplicated, so empty tokens (e.g. from a trailing delimiter)
/// are kept as empty keys. The last batch may be shorter than the others.
pub fn partition(content: &str, batch_size: NonZeroUsize) -> Vec<KeyBatch> {
    let keys = content
        .split(KEY_DELIMITER)
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();

    keys.chunks(batch_size.get())
        .enumerate()
        .map(|(index, keys)| KeyBatch {
            index,
            keys: keys.to_vec(),
        })
        .collect()
}

/// Reads the keys file at the provided path, and returns its keys split into batches.
pub async fn read_keys<P: AsRef<Path>>(
    path: P,
    batch_size: NonZeroUsize,
) -> io::Result<Vec<KeyBatch>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(partition(&content, batch_size))
}
