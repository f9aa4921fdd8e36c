//! Background indexing pipeline.
//!
//! Uploads return before extraction runs; this module owns the queue and the
//! worker pool that pick each file up afterwards: load metadata → extract
//! text → project into a search document → upsert into the index → flip the
//! stored `indexed` flag. A failed job is logged and dropped, never retried
//! inline; the `reindex` sweep is the recovery path.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::IndexerConfig;
use crate::extract;
use crate::index::SearchIndex;
use crate::models::SearchDocument;
use crate::store::MetadataStore;

/// Cloneable submission handle to the indexing queue.
#[derive(Clone)]
pub struct Indexer {
    tx: mpsc::Sender<String>,
}

impl Indexer {
    /// Enqueues a file id for indexing without blocking. When the queue is
    /// full the job is dropped and logged; the file stays `indexed = false`
    /// until a reindex sweep picks it up.
    pub fn submit(&self, file_id: &str) {
        if let Err(err) = self.tx.try_send(file_id.to_string()) {
            tracing::error!(file_id, error = %err, "indexing queue rejected job");
        }
    }
}

/// Spawns the worker pool and returns the submission handle plus the worker
/// join handles. Workers drain the queue and exit once every `Indexer` clone
/// has been dropped.
pub fn start_workers(
    config: &IndexerConfig,
    store: MetadataStore,
    index: Arc<SearchIndex>,
) -> (Indexer, Vec<JoinHandle<()>>) {
    let (tx, rx) = mpsc::channel::<String>(config.queue_capacity);
    let rx = Arc::new(Mutex::new(rx));

    let mut handles = Vec::with_capacity(config.workers);
    for worker_id in 0..config.workers {
        let rx = Arc::clone(&rx);
        let store = store.clone();
        let index = Arc::clone(&index);
        handles.push(tokio::spawn(async move {
            loop {
                let job = { rx.lock().await.recv().await };
                let Some(file_id) = job else {
                    tracing::debug!(worker_id, "indexing worker shutting down");
                    break;
                };
                if let Err(err) = index_file(&store, &index, &file_id).await {
                    tracing::error!(worker_id, file_id, error = %err, "indexing job failed");
                }
            }
        }));
    }

    (Indexer { tx }, handles)
}

/// Runs one file through the full pipeline.
async fn index_file(store: &MetadataStore, index: &Arc<SearchIndex>, file_id: &str) -> Result<()> {
    let record = store
        .get(file_id)
        .await?
        .with_context(|| format!("file {} vanished before indexing", file_id))?;

    let path = std::path::PathBuf::from(&record.storage_path);
    let original_name = record.original_name.clone();
    let mime_type = record.mime_type.clone();
    let content = tokio::task::spawn_blocking(move || {
        extract::extract_text(&path, &original_name, &mime_type)
    })
    .await
    .context("extraction task panicked")??;

    let document = SearchDocument::from_record(&record, content);
    {
        let index = Arc::clone(index);
        tokio::task::spawn_blocking(move || index.upsert(&document))
            .await
            .context("index task panicked")??;
    }

    store.set_indexed(file_id, true).await?;
    tracing::info!(file_id, "file indexed");
    Ok(())
}

/// Sweeps every stored file through the pipeline synchronously. Recovers
/// files that missed the queue and rebuilds the index after a wipe.
pub async fn reindex_all(store: &MetadataStore, index: &Arc<SearchIndex>) -> Result<ReindexReport> {
    let records = store.all_records().await?;
    let mut report = ReindexReport::default();
    for record in &records {
        match index_file(store, index, &record.id).await {
            Ok(()) => report.indexed += 1,
            Err(err) => {
                tracing::error!(file_id = %record.id, error = %err, "reindex failed for file");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

#[derive(Debug, Default)]
pub struct ReindexReport {
    pub indexed: u64,
    pub failed: u64,
}
