//! The interactive execution context.
//!
//! A single tokio task owns the [`Workbench`] and runs posted closures one at
//! a time, in post order. This is the only place project state and UI
//! surfaces are mutated: background work computes off-context and hops back
//! with [`InteractiveContext::run`] or [`InteractiveContext::post`].

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::ContextError;
use crate::workbench::Workbench;

type Job = Box<dyn FnOnce(&mut Workbench) + Send + 'static>;

/// Cheap, cloneable handle to the interactive context.
#[derive(Clone)]
pub struct InteractiveContext {
    tx: mpsc::UnboundedSender<Job>,
}

impl InteractiveContext {
    /// Start the owner task. It returns the workbench once every handle is dropped.
    pub fn spawn(workbench: Workbench) -> (Self, JoinHandle<Workbench>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let owner = tokio::spawn(async move {
            let mut workbench = workbench;
            while let Some(job) = rx.recv().await {
                job(&mut workbench);
            }
            tracing::debug!("interactive context drained");
            workbench
        });
        (Self { tx }, owner)
    }

    /// Queue a mutation without waiting for it.
    pub fn post<F>(&self, f: F) -> Result<(), ContextError>
    where
        F: FnOnce(&mut Workbench) + Send + 'static,
    {
        self.tx.send(Box::new(f)).map_err(|_| ContextError::Closed)
    }

    /// Queue a closure and wait for its return value.
    pub async fn run<F, R>(&self, f: F) -> Result<R, ContextError>
    where
        F: FnOnce(&mut Workbench) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move |workbench| {
            let _ = tx.send(f(workbench));
        })?;
        rx.await.map_err(|_| ContextError::Dropped)
    }

    /// Queue a closure after `delay`. A closed context silently drops it.
    pub fn post_after<F>(&self, delay: Duration, f: F) -> JoinHandle<()>
    where
        F: FnOnce(&mut Workbench) + Send + 'static,
    {
        let ctx = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if ctx.post(f).is_err() {
                tracing::debug!("delayed job dropped: interactive context closed");
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for InteractiveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveContext")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ProjectState;
    use crate::types::{EditorSnapshot, StatusAlignment};
    use crate::workbench::{EditorSource, Surface};

    struct Quiet;

    impl Surface for Quiet {
        fn set_status(&mut self, _text: &str, _alignment: StatusAlignment) {}
        fn set_build_in_progress(&mut self, _in_progress: bool) {}
        fn show_sync_needed(&mut self) {}
        fn dismiss_sync_needed(&mut self) {}
        fn show_error(&mut self, _message: &str) {}
        fn file_saved(&mut self, _file_name: &str) {}
    }

    impl EditorSource for Quiet {
        fn open_editors(&self) -> Vec<EditorSnapshot> {
            Vec::new()
        }
    }

    fn workbench() -> Workbench {
        Workbench::new(ProjectState::new("/p"), Box::new(Quiet), Box::new(Quiet))
    }

    #[tokio::test]
    async fn run_returns_closure_value() {
        let (ctx, _owner) = InteractiveContext::spawn(workbench());
        let dir = ctx
            .run(|wb| wb.project.project_dir.clone())
            .await
            .expect("run");
        assert_eq!(dir, Some(std::path::PathBuf::from("/p")));
    }

    #[tokio::test]
    async fn jobs_run_in_post_order() {
        let (ctx, _owner) = InteractiveContext::spawn(workbench());
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..50u32 {
            let seen = seen.clone();
            ctx.post(move |_| seen.lock().unwrap().push(i))
                .expect("post");
        }
        ctx.run(|_| ()).await.expect("barrier");
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn post_fails_once_owner_is_gone() {
        let (ctx, owner) = InteractiveContext::spawn(workbench());
        owner.abort();
        let _ = owner.await;
        assert_eq!(ctx.post(|_| {}), Err(ContextError::Closed));
        assert!(ctx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn post_after_waits_for_delay() {
        let (ctx, _owner) = InteractiveContext::spawn(workbench());
        let delayed = ctx.post_after(Duration::from_millis(1500), |wb| {
            wb.project.initialized = true;
        });

        tokio::time::advance(Duration::from_millis(1000)).await;
        let early = ctx.run(|wb| wb.project.initialized).await.expect("run");
        assert!(!early);

        delayed.await.expect("delayed job");
        let late = ctx.run(|wb| wb.project.initialized).await.expect("run");
        assert!(late);
    }
}
