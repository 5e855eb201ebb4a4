//! The work done on a single batch of keys.
//!
//! A worker opens its own connection, processes its keys one after the other, then appends all
//! its entries to the output file at once. A failing key is logged and counted, it doesn't stop
//! the rest of the batch.

use deadpool_redis::redis::RedisResult;

use crate::{
    Mode,
    connector::{Connect, Store},
    derived::derive_key,
    error::BatchError,
    keys::KeyBatch,
    output::{OutputFile, RecordEntry},
};

/// The counters of a processed batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// The position of the batch in the key list.
    pub index: usize,
    /// The amount of keys in the batch.
    pub keys: usize,
    /// The amount of keys that had a value.
    pub found: usize,
    /// The amount of keys that didn't exist.
    pub missing: usize,
    /// The amount of deleted primary keys.
    pub deleted: usize,
    /// The amount of deleted derived keys.
    pub derived_deleted: usize,
    /// The amount of keys that couldn't be processed because of a Redis error.
    pub failed: usize,
}

impl BatchReport {
    fn new(batch: &KeyBatch) -> Self {
        Self {
            index: batch.index,
            keys: batch.len(),
            ..Default::default()
        }
    }
}

/// Fetches the value of every key of the batch.
///
/// Returns one entry per key, with an empty value if the key doesn't exist. Keys that couldn't
/// be fetched have no entry.
pub async fn export_batch<S: Store>(
    store: &mut S,
    batch: &KeyBatch,
) -> (BatchReport, Vec<RecordEntry>) {
    let mut report = BatchReport::new(batch);
    let mut entries = Vec::with_capacity(batch.len());

    for key in &batch.keys {
        match store.get(key).await {
            Ok(value) => {
                if value.is_some() {
                    report.found += 1;
                } else {
                    report.missing += 1;
                }
                entries.push(RecordEntry::new(key.as_str(), value));
            }
            Err(e) => {
                tracing::warn!("Cannot fetch key {key}: {e}");
                report.failed += 1;
            }
        }
    }

    (report, entries)
}

async fn delete_key<S: Store>(
    store: &mut S,
    key: &str,
    backup: &mut Vec<RecordEntry>,
    report: &mut BatchReport,
) -> RedisResult<()> {
    let Some(value) = store.get(key).await? else {
        report.missing += 1;
        return Ok(());
    };
    report.found += 1;

    let derived = derive_key(&value);
    backup.push(RecordEntry::new(key, Some(value)));

    match derived {
        Ok(Some(derived)) => {
            let derived = derived.to_string();
            let derived_value = store.get(&derived).await?;
            backup.push(RecordEntry::new(derived.as_str(), derived_value));
            store.del(&derived).await?;
            report.derived_deleted += 1;
            tracing::info!("Deleted derived key: {derived}");
        }
        Ok(None) => (),
        Err(e) => tracing::warn!("Error decoding value for key {key}: {e}"),
    }

    store.del(key).await?;
    report.deleted += 1;
    tracing::info!("Deleted key: {key}");

    Ok(())
}

/// Backs up then deletes every existing key of the batch, along with its derived key.
///
/// Returns the backup entries: every existing key with its value, and every derived key with its
/// value if it had one. Missing keys are skipped.
pub async fn delete_batch<S: Store>(
    store: &mut S,
    batch: &KeyBatch,
) -> (BatchReport, Vec<RecordEntry>) {
    let mut report = BatchReport::new(batch);
    let mut backup = Vec::new();

    for key in &batch.keys {
        if let Err(e) = delete_key(store, key, &mut backup, &mut report).await {
            tracing::warn!("Cannot delete key {key}: {e}");
            report.failed += 1;
        }
    }

    (report, backup)
}

/// Processes a batch with a new connection, and appends its entries to the output file.
#[tracing::instrument(skip_all, fields(batch = batch.index, keys = batch.len()))]
pub async fn run_batch<C: Connect>(
    connector: &C,
    mode: Mode,
    batch: KeyBatch,
    output: &OutputFile,
) -> Result<BatchReport, BatchError> {
    let mut store = connector.connect().await?;

    let (report, entries) = match mode {
        Mode::Export => export_batch(&mut store, &batch).await,
        Mode::Delete => delete_batch(&mut store, &batch).await,
    };

    output.append(&entries).await.map_err(BatchError::Output)?;
    tracing::debug!("Batch done: {report:?}");

    Ok(report)
}
