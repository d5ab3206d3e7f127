//! Scan pipeline orchestration.
//!
//! Coordinates one full scan: connect → list → group → extract → batch →
//! store. The listener sees `on_progress` once per directory, batches as
//! they fill, and exactly one `on_complete` however the scan ends.
//!
//! A scan's first store effect is to delete every previously discovered
//! artifact, so only one scan may run per store. [`Scanner`] enforces that
//! with a guard shared by all of its clones.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use upload_scout_core::batch::{BatchEmitter, ScanListener};
use upload_scout_core::extract::ExtractionRules;
use upload_scout_core::store::ArtifactStore;

use crate::config::Config;
use crate::db;
use crate::error::ScanError;
use crate::extractor::ArtifactExtractor;
use crate::indexer::list_remote_files;
use crate::migrate;
use crate::progress::ProgressMode;
use crate::remote::{join_remote, RemoteConnector, RemoteExecutor, SshConnector};
use crate::sqlite_store::SqliteArtifactStore;

/// Inputs of a scan that come from configuration.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub root_path: String,
    pub rules: ExtractionRules,
    pub batch_size: usize,
}

impl ScanSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root_path: config.jump_host.root_path.clone(),
            rules: config.scan.rules(),
            batch_size: config.scan.batch_size,
        }
    }
}

/// Outcome of a scan that ran to the end or was cancelled.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub scan_id: Uuid,
    pub directories_total: usize,
    pub directories_processed: usize,
    pub artifacts: usize,
    pub batches: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Run one scan to completion on the current task.
///
/// Callers that may start scans concurrently should go through
/// [`Scanner`], which serializes scans per store.
pub async fn run_scan(
    connector: &dyn RemoteConnector,
    store: &dyn ArtifactStore,
    settings: &ScanSettings,
    listener: &dyn ScanListener,
    cancel: &CancellationToken,
) -> Result<ScanSummary, ScanError> {
    let scan_id = Uuid::new_v4();
    let span = info_span!("scan", scan_id = %scan_id);
    scan_inner(scan_id, connector, store, settings, listener, cancel)
        .instrument(span)
        .await
}

async fn scan_inner(
    scan_id: Uuid,
    connector: &dyn RemoteConnector,
    store: &dyn ArtifactStore,
    settings: &ScanSettings,
    listener: &dyn ScanListener,
    cancel: &CancellationToken,
) -> Result<ScanSummary, ScanError> {
    let started_at = Utc::now();
    // Dropping the emitter on any early return still fires on_complete.
    let mut emitter = BatchEmitter::new(listener, settings.batch_size);

    let mut summary = ScanSummary {
        scan_id,
        directories_total: 0,
        directories_processed: 0,
        artifacts: 0,
        batches: 0,
        cancelled: false,
        started_at,
        finished_at: started_at,
    };

    if cancel.is_cancelled() {
        emitter.cancel();
        emitter.complete();
        summary.cancelled = true;
        summary.finished_at = Utc::now();
        return Ok(summary);
    }

    info!(root = %settings.root_path, "Connecting to jump host");
    let executor = connector.connect().await.map_err(ScanError::Connection)?;

    let result = scan_directories(
        executor.as_ref(),
        store,
        settings,
        &mut emitter,
        cancel,
        &mut summary,
    )
    .await;
    executor.close().await;

    if result.is_ok() && cancel.is_cancelled() {
        emitter.cancel();
    }
    if result.is_ok() && !emitter.is_cancelled() {
        if let Some(batch) = emitter.flush() {
            store
                .insert_artifacts(&batch)
                .await
                .map_err(ScanError::Store)?;
        }
    }
    emitter.complete();
    result?;

    summary.directories_processed = emitter.processed();
    summary.artifacts = emitter.delivered();
    summary.batches = emitter.batches();
    summary.cancelled = emitter.is_cancelled();
    summary.finished_at = Utc::now();

    info!(
        directories = summary.directories_processed,
        artifacts = summary.artifacts,
        batches = summary.batches,
        cancelled = summary.cancelled,
        "Scan finished"
    );
    Ok(summary)
}

async fn scan_directories(
    executor: &dyn RemoteExecutor,
    store: &dyn ArtifactStore,
    settings: &ScanSettings,
    emitter: &mut BatchEmitter<'_>,
    cancel: &CancellationToken,
    summary: &mut ScanSummary,
) -> Result<(), ScanError> {
    let groups = list_remote_files(executor, &settings.root_path, &settings.rules)
        .await
        .map_err(ScanError::Listing)?;

    summary.directories_total = groups.len();
    emitter.set_total(groups.len());
    if groups.is_empty() {
        info!("No build files found under root");
    }

    let removed = store
        .delete_all_artifacts()
        .await
        .map_err(ScanError::Store)?;
    info!(removed, directories = groups.len(), "Cleared previous artifacts");

    let extractor = ArtifactExtractor::new(settings.root_path.clone(), settings.rules.clone());

    for group in &groups {
        if cancel.is_cancelled() {
            break;
        }
        emitter.progress(&join_remote(&settings.root_path, &group.directory));

        let Some(candidate) = extractor.rules().candidate(group) else {
            continue;
        };
        let artifacts = extractor.extract(executor, &candidate, cancel).await;
        if cancel.is_cancelled() {
            break;
        }

        for artifact in artifacts {
            // Listeners and store writes may cancel between pushes.
            if cancel.is_cancelled() {
                break;
            }
            if let Some(batch) = emitter.push(artifact) {
                store
                    .insert_artifacts(&batch)
                    .await
                    .map_err(ScanError::Store)?;
            }
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    if cancel.is_cancelled() {
        warn!(
            processed = emitter.processed(),
            total = groups.len(),
            "Scan cancelled"
        );
        emitter.cancel();
    }
    Ok(())
}

/// Starts scans on background tasks, at most one at a time per store.
///
/// Clones share the same guard; build one `Scanner` per store.
#[derive(Clone)]
pub struct Scanner {
    connector: Arc<dyn RemoteConnector>,
    store: Arc<dyn ArtifactStore>,
    settings: ScanSettings,
    guard: Arc<Mutex<()>>,
}

impl Scanner {
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        store: Arc<dyn ArtifactStore>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            connector,
            store,
            settings,
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// Start a scan on a background task.
    ///
    /// Fails with [`ScanError::AlreadyRunning`] without touching the
    /// listener when another scan holds the store.
    pub fn spawn(&self, listener: Arc<dyn ScanListener>) -> Result<ScanHandle, ScanError> {
        let permit = self
            .guard
            .clone()
            .try_lock_owned()
            .map_err(|_| ScanError::AlreadyRunning)?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let connector = Arc::clone(&self.connector);
        let store = Arc::clone(&self.store);
        let settings = self.settings.clone();

        let task = tokio::spawn(async move {
            let _permit = permit;
            run_scan(
                connector.as_ref(),
                store.as_ref(),
                &settings,
                listener.as_ref(),
                &token,
            )
            .await
        });

        Ok(ScanHandle { cancel, task })
    }

    /// Whether a scan currently holds the store.
    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }
}

/// Handle to a scan running in the background.
pub struct ScanHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<ScanSummary, ScanError>>,
}

impl ScanHandle {
    /// Ask the scan to stop at the next directory or remote command.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the scan to finish.
    pub async fn wait(self) -> Result<ScanSummary, ScanError> {
        self.task
            .await
            .map_err(|e| ScanError::Aborted(e.to_string()))?
    }
}

/// `uscout scan`: scan the jump host into the configured database.
///
/// Ctrl-C cancels the scan; the summary is still printed.
pub async fn run_scan_command(
    config: &Config,
    batch_size: Option<usize>,
    progress: ProgressMode,
) -> anyhow::Result<()> {
    let mut settings = ScanSettings::from_config(config);
    if let Some(size) = batch_size {
        if size == 0 {
            anyhow::bail!("--batch-size must be >= 1");
        }
        settings.batch_size = size;
    }

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let connector = SshConnector::new(
        &config.jump_host,
        config.scan.connect_timeout(),
        config.scan.command_timeout(),
    );
    let store = SqliteArtifactStore::new(pool.clone());
    let scanner = Scanner::new(Arc::new(connector), Arc::new(store), settings);

    let handle = scanner.spawn(Arc::from(progress.listener()))?;
    let token = handle.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling scan");
            token.cancel();
        }
    });

    let result = handle.wait().await;
    ctrl_c.abort();
    pool.close().await;

    let summary = result?;
    println!(
        "Scan {} {}: {} directories, {} artifacts in {} batches ({:.1}s)",
        summary.scan_id,
        if summary.cancelled { "cancelled" } else { "complete" },
        summary.directories_processed,
        summary.artifacts,
        summary.batches,
        (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0
    );
    Ok(())
}
