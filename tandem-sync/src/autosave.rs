//! The auto-save engine.
//!
//! ## Cycle
//!
//! 1. Scan the open editors on the interactive context and mark changed ones.
//! 2. Settle briefly so a keystroke burst is not flushed half-way.
//! 3. Flush the dirty set if it is non-empty.
//!
//! Every flush, manual or automatic, runs under one async mutex, so at most
//! one is in flight. Disk access runs on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tandem_core::{
    AutoSaveConfig, EditorId, EditorSnapshot, InteractiveContext, StatusAlignment,
};

use crate::error::SyncError;
use crate::tracking::DirtyTracking;
use crate::writer::{write_if_changed, DiskStore, DocumentStore, WriteResult};

// ---------------------------------------------------------------------------
// Flush report
// ---------------------------------------------------------------------------

/// What one flush did, per path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub saved: Vec<PathBuf>,
    /// Disk already matched the editor.
    pub unchanged: Vec<PathBuf>,
    /// The editor was closed before the flush reached it, or its buffer was empty.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
            && self.unchanged.is_empty()
            && self.skipped.is_empty()
            && self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Cheap, cloneable handle to one auto-save engine.
#[derive(Clone)]
pub struct AutoSaveEngine {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: InteractiveContext,
    store: Arc<dyn DocumentStore>,
    tracking: Arc<DirtyTracking>,
    flush_lock: tokio::sync::Mutex<()>,
    config: AutoSaveConfig,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoSaveEngine {
    /// Engine writing to the real filesystem.
    pub fn new(ctx: InteractiveContext, config: AutoSaveConfig) -> Self {
        Self::with_store(ctx, config, Arc::new(DiskStore))
    }

    pub fn with_store(
        ctx: InteractiveContext,
        config: AutoSaveConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                store,
                tracking: Arc::new(DirtyTracking::new()),
                flush_lock: tokio::sync::Mutex::new(()),
                config,
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn tracking(&self) -> Arc<DirtyTracking> {
        self.inner.tracking.clone()
    }

    /// Spawn the periodic loop. No-op when disabled, already running or shut down.
    pub fn start(&self) -> bool {
        if !self.inner.config.enabled || self.inner.cancel.is_cancelled() {
            return false;
        }
        let mut task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return false;
        }
        let engine = self.clone();
        *task = Some(tokio::spawn(async move { engine.periodic().await }));
        tracing::info!(interval_ms = self.inner.config.interval_ms, "auto-save started");
        true
    }

    async fn periodic(self) {
        let interval = self.inner.config.interval();
        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            match self.cycle().await {
                Ok(Some(report)) if !report.failed.is_empty() => {
                    tracing::warn!(failed = report.failed.len(), "auto-save cycle had failures");
                }
                Ok(_) => {}
                Err(SyncError::Context(err)) => {
                    tracing::debug!(error = %err, "interactive context gone, stopping auto-save");
                    break;
                }
                Err(err) => tracing::warn!(error = %err, "auto-save cycle failed"),
            }
        }
        tracing::debug!("auto-save loop exited");
    }

    /// One scan / settle / flush round. `None` when nothing was flushed.
    pub async fn cycle(&self) -> Result<Option<FlushReport>, SyncError> {
        if self.scan().await?.is_none() {
            return Ok(None);
        }
        tokio::time::sleep(self.inner.config.settle()).await;
        if self.inner.tracking.pending_len() == 0 {
            return Ok(None);
        }
        self.flush().await.map(Some)
    }

    /// Mark changed editors dirty. `None` while the host is tearing down.
    pub async fn scan(&self) -> Result<Option<usize>, SyncError> {
        let tracking = self.inner.tracking.clone();
        let marked = self
            .inner
            .ctx
            .run(move |wb| {
                if wb.destroying {
                    return None;
                }
                let marked = wb
                    .editors
                    .open_editors()
                    .iter()
                    .filter(|editor| tracking.observe(editor))
                    .count();
                Some(marked)
            })
            .await?;
        if let Some(count) = marked.filter(|c| *c > 0) {
            tracing::debug!(marked = count, "dirty editors found");
        }
        Ok(marked)
    }

    /// Drain the dirty set and write every path whose editor still differs from disk.
    pub async fn flush(&self) -> Result<FlushReport, SyncError> {
        let _guard = self.inner.flush_lock.lock().await;
        let paths = self.inner.tracking.drain();
        let mut report = FlushReport::default();

        for path in paths {
            let lookup = path.clone();
            let editor = self
                .inner
                .ctx
                .run(move |wb| wb.editors.editor_for(&lookup))
                .await?;
            let Some(editor) = editor else {
                tracing::debug!(path = %path.display(), "editor closed before flush, skipping");
                report.skipped.push(path);
                continue;
            };
            self.write_one(editor, &mut report).await;
        }

        if !report.is_empty() {
            tracing::info!(
                saved = report.saved.len(),
                unchanged = report.unchanged.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "auto-save flush completed",
            );
        }
        Ok(report)
    }

    /// Manual save of every writable open editor, then re-baseline.
    pub async fn save_all(&self) -> Result<FlushReport, SyncError> {
        let _guard = self.inner.flush_lock.lock().await;
        let editors = self.open_editors().await?;
        let mut report = FlushReport::default();
        for editor in editors.iter().filter(|e| e.writable) {
            self.write_one(editor.clone(), &mut report).await;
        }
        self.inner.tracking.rebaseline(&editors);
        Ok(report)
    }

    /// A save happened outside the engine: clear the dirty set and re-baseline.
    pub async fn on_manual_save(&self) -> Result<(), SyncError> {
        let _guard = self.inner.flush_lock.lock().await;
        let editors = self.open_editors().await?;
        self.inner.tracking.rebaseline(&editors);
        Ok(())
    }

    pub fn on_editor_created(&self, id: EditorId, content: &str) {
        self.inner.tracking.baseline(id, content);
    }

    pub fn on_editor_destroyed(&self, id: EditorId, path: &Path) {
        self.inner.tracking.forget(id, path);
    }

    /// Stop the loop, flush what is left and drop all tracking.
    pub async fn shutdown(&self) -> Result<FlushReport, SyncError> {
        self.inner.cancel.cancel();
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            // The loop finishes its current cycle before observing the cancel.
            let _ = task.await;
        }
        let report = self.flush().await;
        self.inner.tracking.clear();
        report
    }

    async fn open_editors(&self) -> Result<Vec<EditorSnapshot>, SyncError> {
        Ok(self.inner.ctx.run(|wb| wb.editors.open_editors()).await?)
    }

    async fn write_one(&self, editor: EditorSnapshot, report: &mut FlushReport) {
        // An empty buffer is never written over the file on disk.
        if editor.content.is_empty() {
            tracing::debug!(path = %editor.path.display(), "empty buffer, not auto-saving");
            report.skipped.push(editor.path);
            return;
        }
        let store = self.inner.store.clone();
        let path = editor.path.clone();
        let written = tokio::task::spawn_blocking(move || {
            write_if_changed(store.as_ref(), &editor.path, &editor.content)
        })
        .await;

        match written {
            Ok(Ok(WriteResult::Written { path })) => {
                self.announce(&path);
                report.saved.push(path);
            }
            Ok(Ok(WriteResult::Unchanged { path })) => report.unchanged.push(path),
            Ok(Err(err)) => {
                tracing::warn!(path = %path.display(), error = %err, "auto-save write failed");
                report.failed.push((path, err.to_string()));
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "auto-save write task failed");
                report.failed.push((path, err.to_string()));
            }
        }
    }

    /// Self-clearing "Auto-saved" indicator.
    fn announce(&self, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let text = format!("Auto-saved: {name}");
        let shown = text.clone();
        let posted = self.inner.ctx.post(move |wb| {
            wb.set_status(&shown, StatusAlignment::Start);
            wb.surface.file_saved(&name);
        });
        if posted.is_err() {
            return;
        }
        self.inner
            .ctx
            .post_after(self.inner.config.indicator(), move |wb| {
                // A later message owns the status line now.
                if !wb.destroying && wb.status() == text {
                    wb.set_status("", StatusAlignment::Start);
                }
            });
    }
}

impl std::fmt::Debug for AutoSaveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaveEngine")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.tracking.pending_len())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}
