//! Dispatches the batches of a run and joins their workers.

use std::{fmt, path::Path, sync::Arc};

use tokio::{sync::Semaphore, task::JoinHandle};

use crate::{
    Mode, RunOptions,
    connector::Connect,
    error::{BatchError, RunError},
    keys::read_keys,
    output::OutputFile,
    progress::{self, CompletionGuard, Progress},
    worker::{BatchReport, run_batch},
};

/// The outcome of a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// The amount of dispatched batches.
    pub batches: usize,
    /// The amount of batches whose worker returned successfully.
    pub succeeded: usize,
    /// The amount of batches whose worker failed or panicked.
    pub failed: usize,
    /// The sum of the reports of the successful batches.
    pub totals: BatchReport,
}

impl RunSummary {
    fn add(&mut self, report: &BatchReport) {
        self.succeeded += 1;
        let totals = &mut self.totals;
        totals.keys += report.keys;
        totals.found += report.found;
        totals.missing += report.missing;
        totals.deleted += report.deleted;
        totals.derived_deleted += report.derived_deleted;
        totals.failed += report.failed;
    }

    /// Returns true if every batch succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} batches succeeded, {} failed ({} keys, {} found, {} missing, {} deleted, \
            {} derived keys deleted, {} keys failed)",
            self.succeeded,
            self.batches,
            self.failed,
            self.totals.keys,
            self.totals.found,
            self.totals.missing,
            self.totals.deleted,
            self.totals.derived_deleted,
            self.totals.failed,
        )
    }
}

/// Reads the keys file, processes every batch concurrently, and waits for all of them.
///
/// The output file is created before any batch is dispatched, and appended to if it exists.
///
/// Each batch gets its own task and its own connection. A failing batch doesn't stop the others,
/// it is counted in the returned summary.
pub async fn run<C: Connect>(
    mode: Mode,
    connector: C,
    keys_path: &Path,
    output_path: &Path,
    options: &RunOptions,
) -> Result<RunSummary, RunError> {
    let batches = read_keys(keys_path, options.batch_size)
        .await
        .map_err(RunError::ReadKeys)?;
    let output = OutputFile::create(output_path)
        .await
        .map_err(RunError::CreateOutput)?;
    tracing::debug!("Writing entries to {}", output.path().display());

    let connector = Arc::new(connector);
    let output = Arc::new(output);
    let progress = Arc::new(Progress::new(batches.len()));
    let limit = options
        .max_workers
        .map(|n| Arc::new(Semaphore::new(n.get().min(Semaphore::MAX_PERMITS))));

    tracing::info!(
        "Dispatching {} batch{} of at most {} keys",
        batches.len(),
        if batches.len() > 1 { "es" } else { "" },
        options.batch_size,
    );

    let handles: Vec<(usize, JoinHandle<Result<BatchReport, BatchError>>)> = batches
        .into_iter()
        .map(|batch| {
            let index = batch.index;
            let guard = CompletionGuard::new(progress.clone());
            let connector = connector.clone();
            let output = output.clone();
            let limit = limit.clone();
            let handle = tokio::spawn(async move {
                let _guard = guard;
                let _permit = match limit {
                    Some(limit) => limit.acquire_owned().await.ok(),
                    None => None,
                };
                run_batch(&*connector, mode, batch, &output).await
            });
            (index, handle)
        })
        .collect();

    let monitor = tokio::spawn(progress::monitor(
        progress.clone(),
        options.progress_interval,
    ));

    let mut summary = RunSummary {
        batches: handles.len(),
        ..Default::default()
    };

    let (indexes, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let results = futures::future::join_all(handles).await;

    for (index, result) in indexes.into_iter().zip(results) {
        match result {
            Ok(Ok(report)) => summary.add(&report),
            Ok(Err(e)) => {
                tracing::error!("Batch {index} failed: {e}");
                summary.failed += 1;
            }
            Err(e) => {
                tracing::error!("Batch {index} panicked: {e}");
                summary.failed += 1;
            }
        }
    }

    if let Err(e) = monitor.await {
        tracing::warn!("Progress monitor stopped unexpectedly: {e}");
    }

    Ok(summary)
}
