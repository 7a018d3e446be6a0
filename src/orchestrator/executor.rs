//! Execution contexts used by a reset run.
//!
//! Work hops from the [`BackgroundWorker`] onto the UI loop. Only tasks drained by
//! [`UiLoop`] ever receive `&mut Surface`.

use crate::surface::Surface;
use futures::future::BoxFuture;
use std::thread::ThreadId;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

pub(crate) type UiTask = Box<dyn FnOnce(&mut Surface) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub(crate) enum DispatchError {
    #[error("UI loop is no longer running")]
    UiClosed,
    #[error("background worker is no longer running")]
    WorkerClosed,
}

/// Posting side of the UI-affine queue.
#[derive(Clone)]
pub(crate) struct UiDispatcher {
    tx: UnboundedSender<UiTask>,
}

impl UiDispatcher {
    pub(crate) fn post<F>(&self, task: F) -> Result<(), DispatchError>
    where
        F: FnOnce(&mut Surface) + Send + 'static,
    {
        self.tx
            .send(Box::new(task))
            .map_err(|_| DispatchError::UiClosed)
    }
}

/// Receiving side of the UI-affine queue. Pinned to the first thread that drains it.
pub(crate) struct UiLoop {
    rx: UnboundedReceiver<UiTask>,
    affine: Option<ThreadId>,
}

pub(crate) fn ui_channel() -> (UiDispatcher, UiLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiDispatcher { tx }, UiLoop { rx, affine: None })
}

impl UiLoop {
    /// Apply every queued task without blocking. Returns how many ran.
    pub(crate) fn drain(&mut self, surface: &mut Surface) -> usize {
        self.pin_thread();
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(surface);
            ran += 1;
        }
        ran
    }

    /// Block until one task arrives and apply it. Returns `false` once every
    /// dispatcher is gone. Must not be called from inside the async runtime.
    pub(crate) fn run_next_blocking(&mut self, surface: &mut Surface) -> bool {
        self.pin_thread();
        match self.rx.blocking_recv() {
            Some(task) => {
                task(surface);
                true
            }
            None => false,
        }
    }

    fn pin_thread(&mut self) {
        let current = std::thread::current().id();
        let pinned = *self.affine.get_or_insert(current);
        assert_eq!(pinned, current, "UI tasks drained from a second thread");
    }
}

/// One unit of background work plus the error path that reports it.
pub(crate) struct BackgroundJob {
    pub(crate) label: &'static str,
    pub(crate) work: BoxFuture<'static, anyhow::Result<()>>,
    pub(crate) on_error: Box<dyn FnOnce(anyhow::Error) + Send + 'static>,
}

/// Single sequential worker: one job at a time, in submission order.
pub(crate) struct BackgroundWorker {
    tx: UnboundedSender<BackgroundJob>,
}

impl BackgroundWorker {
    pub(crate) fn spawn(runtime: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BackgroundJob>();
        runtime.spawn(async move {
            while let Some(job) = rx.recv().await {
                let BackgroundJob {
                    label,
                    work,
                    on_error,
                } = job;
                // Run on its own task so a panic surfaces as a JoinError instead of
                // taking the worker down.
                match tokio::spawn(work).await {
                    Ok(Ok(())) => debug!(job = label, "background job finished"),
                    Ok(Err(e)) => {
                        warn!(job = label, error = %format!("{e:#}"), "background job failed");
                        on_error(e);
                    }
                    Err(e) => {
                        warn!(job = label, error = %e, "background job aborted");
                        on_error(anyhow::Error::new(e).context(format!("{label} aborted")));
                    }
                }
            }
            debug!("background worker stopped");
        });
        Self { tx }
    }

    pub(crate) fn submit(&self, job: BackgroundJob) -> Result<(), DispatchError> {
        self.tx
            .send(job)
            .map_err(|_| DispatchError::WorkerClosed)
    }
}

/// The two contexts a run needs, created together and released together.
pub(crate) struct ExecutionResources {
    pub(crate) worker: BackgroundWorker,
    pub(crate) ui: UiDispatcher,
}

impl ExecutionResources {
    pub(crate) fn start(runtime: &Handle, ui: UiDispatcher) -> Self {
        Self {
            worker: BackgroundWorker::spawn(runtime),
            ui,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let worker = BackgroundWorker::spawn(&Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let mut done_tx = Some(done_tx);
        for i in 0..5 {
            let seen = seen.clone();
            let done = if i == 4 { done_tx.take() } else { None };
            worker
                .submit(BackgroundJob {
                    label: "order",
                    work: async move {
                        tokio::time::sleep(std::time::Duration::from_millis(5 - i)).await;
                        seen.lock().unwrap().push(i);
                        if let Some(done) = done {
                            let _ = done.send(());
                        }
                        anyhow::Ok(())
                    }
                    .boxed(),
                    on_error: Box::new(|_| {}),
                })
                .unwrap();
        }
        done_rx.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    async fn explode() -> anyhow::Result<()> {
        panic!("hop exploded")
    }

    #[tokio::test]
    async fn panicking_job_reaches_error_path_and_worker_survives() {
        let worker = BackgroundWorker::spawn(&Handle::current());
        let (err_tx, err_rx) = tokio::sync::oneshot::channel::<String>();
        worker
            .submit(BackgroundJob {
                label: "boom",
                work: explode().boxed(),
                on_error: Box::new(move |e| {
                    let _ = err_tx.send(format!("{e:#}"));
                }),
            })
            .unwrap();
        let msg = err_rx.await.unwrap();
        assert!(msg.starts_with("boom aborted"), "{msg}");

        let (ok_tx, ok_rx) = tokio::sync::oneshot::channel();
        worker
            .submit(BackgroundJob {
                label: "after",
                work: async move {
                    let _ = ok_tx.send(());
                    anyhow::Ok(())
                }
                .boxed(),
                on_error: Box::new(|_| {}),
            })
            .unwrap();
        ok_rx.await.unwrap();
    }

    #[test]
    fn dispatcher_reports_closed_loop() {
        let (ui, ui_loop) = ui_channel();
        drop(ui_loop);
        assert_eq!(ui.post(|_| {}), Err(DispatchError::UiClosed));
    }

    #[test]
    fn drain_applies_tasks_in_order() {
        let (ui, mut ui_loop) = ui_channel();
        let mut surface = Surface::bound();
        ui.post(|s| s.append("one")).unwrap();
        ui.post(|s| s.append("two")).unwrap();
        assert_eq!(ui_loop.drain(&mut surface), 2);
        assert_eq!(surface.status_text(), "one\ntwo");
    }
}
