//! Document event dispatcher.
//!
//! Any number of producers enqueue [`DocumentEvent`]s; one consumer task
//! drains them in enqueue order. Open, change and close update the
//! [`FileManager`] before the event is rebroadcast, so subscribers always
//! see a model that already reflects the event.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tandem_core::{DocumentEvent, EditorRef};

use crate::error::DaemonError;
use crate::files::FileManager;

const REBROADCAST_CAPACITY: usize = 1024;

type EditorSlot = Arc<Mutex<Option<Weak<EditorRef>>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Exit {
    Cancelled,
    QueueClosed,
}

pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<DocumentEvent>,
    events: broadcast::Sender<DocumentEvent>,
    cancel: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
    editor: EditorSlot,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl EventDispatcher {
    /// Start the consumer for `editor`'s documents.
    pub fn spawn(editor: &Arc<EditorRef>, files: Arc<FileManager>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(REBROADCAST_CAPACITY);
        let cancel = CancellationToken::new();
        let reason = Arc::new(Mutex::new(None));
        let slot: EditorSlot = Arc::new(Mutex::new(Some(Arc::downgrade(editor))));

        let consumer = tokio::spawn(consume(
            rx,
            files,
            events.clone(),
            slot.clone(),
            cancel.clone(),
        ));
        let supervisor = {
            let reason = reason.clone();
            tokio::spawn(async move {
                match consumer.await {
                    Ok(Exit::Cancelled) => {
                        let reason = lock(&reason).clone().unwrap_or_default();
                        tracing::debug!(%reason, "document event loop cancelled");
                    }
                    Ok(Exit::QueueClosed) => {
                        tracing::error!("document event loop exited: queue closed");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "document event loop died");
                    }
                }
            })
        };

        tracing::debug!(editor = %editor.id(), "document event dispatcher started");
        Self {
            tx,
            events,
            cancel,
            reason,
            editor: slot,
            supervisor: Mutex::new(Some(supervisor)),
        }
    }

    /// Enqueue an event. Never blocks.
    pub fn dispatch(&self, event: DocumentEvent) -> Result<(), DaemonError> {
        self.tx
            .send(event)
            .map_err(|_| DaemonError::ChannelClosed("document events"))
    }

    /// Events in the order they were processed.
    pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
        self.events.subscribe()
    }

    /// Cancel the consumer with a reason and drop the editor back-reference.
    pub async fn destroy(&self, reason: &str) {
        *lock(&self.reason) = Some(reason.to_string());
        self.cancel.cancel();
        let supervisor = lock(&self.supervisor).take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.await;
        }
        *lock(&self.editor) = None;
    }

    pub fn is_destroyed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

async fn consume(
    mut rx: mpsc::UnboundedReceiver<DocumentEvent>,
    files: Arc<FileManager>,
    events: broadcast::Sender<DocumentEvent>,
    editor: EditorSlot,
    cancel: CancellationToken,
) -> Exit {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Exit::Cancelled,
            event = rx.recv() => match event {
                Some(event) => event,
                None => return Exit::QueueClosed,
            },
        };

        match &event {
            DocumentEvent::Open { path } => files.on_open(path).await,
            DocumentEvent::Change { path } => files.on_change(path).await,
            DocumentEvent::Close { path } => files.on_close(path).await,
            DocumentEvent::Save { .. } | DocumentEvent::Selected { .. } => {}
        }

        let alive = lock(&editor)
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|e| !e.is_released());
        if !alive {
            tracing::trace!(path = %event.path().display(), "editor released, dropping event");
            continue;
        }
        // No subscribers is fine.
        let _ = events.send(event);
    }
}
