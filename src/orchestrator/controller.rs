//! Reset lifecycle controller.
//!
//! One run: lock the trigger, hop through the background worker (which resolves the
//! target and prepares the command) onto the UI loop, issue the activation request
//! there, then report and unlock. Every path that locks the trigger ends with it
//! unlocked.

use super::executor::{BackgroundJob, DispatchError, ExecutionResources, UiDispatcher};
use crate::device::{ActivationError, ActivationRequest, DeviceProbe, LaunchPlan, Launcher, Notify};
use crate::model::{Outcome, TargetComponent};
use crate::surface::Surface;
use anyhow::Context;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub(crate) const MSG_INITIALIZING: &str = "Initializing…";
pub(crate) const MSG_READY: &str = "Ready to reset";
pub(crate) const MSG_STARTING: &str = "Reset starting…";
pub(crate) const MSG_SYSTEM_ERROR: &str = "System error: execution resources unavailable";
pub(crate) const MSG_RESTART: &str =
    "Reset requested. Restart the target app to see the result.";

/// What a trigger did synchronously. Terminal outcomes of scheduled runs arrive
/// later on the UI loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// Display elements missing; nothing changed.
    NotReady,
    /// Trigger disabled; a run is already in flight or the device is not ready.
    Ignored,
    /// Execution resources missing; reported directly.
    ResourceMissing,
    /// Worker refused the hop; reported directly.
    Rejected,
    /// Hop queued on the background worker.
    Scheduled,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ReadinessError {
    #[error("display elements are not bound")]
    NotReady,
    #[error("execution resources are missing")]
    ResourceMissing,
    #[error("readiness probe could not be scheduled: {0}")]
    Rejected(#[from] DispatchError),
}

pub(crate) struct ResetOrchestrator {
    target: TargetComponent,
    launcher: Arc<dyn Launcher>,
    probe: Option<Arc<dyn DeviceProbe>>,
    preflight: bool,
    resources: Option<ExecutionResources>,
    runs: u64,
}

impl ResetOrchestrator {
    pub(crate) fn new(
        target: TargetComponent,
        launcher: Arc<dyn Launcher>,
        resources: Option<ExecutionResources>,
    ) -> Self {
        Self {
            target,
            launcher,
            probe: None,
            preflight: false,
            resources,
            runs: 0,
        }
    }

    /// Device probe used by the readiness check and, with `preflight`, by every hop.
    pub(crate) fn with_probe(mut self, probe: Arc<dyn DeviceProbe>, preflight: bool) -> Self {
        self.probe = Some(probe);
        self.preflight = preflight;
        self
    }

    /// Confirm the surface and resources exist, then move to Idle (directly, or after
    /// the device probe reports back on the UI loop).
    pub(crate) fn initialize(&self, surface: &mut Surface) -> Result<(), ReadinessError> {
        if !surface.is_ready() {
            warn!("display elements missing; readiness check skipped");
            return Err(ReadinessError::NotReady);
        }
        let Some(resources) = self.resources.as_ref() else {
            error!("execution resources missing at initialization");
            surface.set_text(MSG_SYSTEM_ERROR);
            return Err(ReadinessError::ResourceMissing);
        };

        let Some(probe) = self.probe.clone() else {
            surface.mark_ready(MSG_READY);
            info!("ready (no device probe)");
            return Ok(());
        };

        surface.mark_initializing(MSG_INITIALIZING);
        let ui = resources.ui.clone();
        let err_ui = resources.ui.clone();
        let job = BackgroundJob {
            label: "readiness probe",
            work: async move {
                probe.probe().await?;
                ui.post(|surface| {
                    info!("device probe passed");
                    surface.mark_ready(MSG_READY);
                })?;
                anyhow::Ok(())
            }
            .boxed(),
            on_error: Box::new(move |err: anyhow::Error| {
                let text = format!("Device not ready: {err:#}");
                if let Err(e) = err_ui.post(move |surface| surface.mark_unavailable(text)) {
                    error!(error = %e, "could not report probe failure");
                }
            }),
        };
        resources.worker.submit(job)?;
        Ok(())
    }

    /// Start one reset run. Never panics on failure paths and never leaves the
    /// trigger disabled once the run has ended.
    pub(crate) fn perform_reset(&mut self, surface: &mut Surface) -> Trigger {
        if !surface.is_ready() {
            warn!("reset triggered before display elements exist");
            return Trigger::NotReady;
        }
        if !surface.trigger_enabled() {
            debug!(state = surface.state().label(), "trigger disabled; ignoring");
            return Trigger::Ignored;
        }
        let Some(resources) = self.resources.as_ref() else {
            error!("execution resources missing; reset not started");
            surface.set_text(MSG_SYSTEM_ERROR);
            surface.finish(Outcome::ResourceMissing);
            return Trigger::ResourceMissing;
        };

        self.runs += 1;
        let run = self.runs;
        surface.begin_run(MSG_STARTING);
        info!(run, class = %self.target.class, "reset starting");

        let job = self.hop(run, resources.ui.clone());
        match resources.worker.submit(job) {
            Ok(()) => Trigger::Scheduled,
            Err(e) => {
                // Already on the UI loop, so report in place.
                let err = anyhow::Error::new(e).context("could not schedule the reset");
                report_hop_failure(surface, run, &err);
                Trigger::Rejected
            }
        }
    }

    /// Background half of a run: optionally probe, resolve and prepare the request,
    /// then hand it to the UI loop.
    fn hop(&self, run: u64, ui: UiDispatcher) -> BackgroundJob {
        let err_ui = ui.clone();
        let target = self.target.clone();
        let launcher = self.launcher.clone();
        let preflight = self.probe.clone().filter(|_| self.preflight);

        BackgroundJob {
            label: "reset hop",
            work: async move {
                if let Some(probe) = preflight {
                    probe.probe().await.context("device preflight failed")?;
                }
                let prepared = match ActivationRequest::new(&target) {
                    Ok(request) => launcher.prepare(request, progress(run, ui.clone())).await,
                    Err(e) => Err(e),
                };
                ui.post(move |surface| activate(surface, run, prepared, launcher.as_ref()))
                    .context("could not hand the reset to the UI loop")?;
                anyhow::Ok(())
            }
            .boxed(),
            on_error: Box::new(move |err: anyhow::Error| {
                if let Err(e) = err_ui.post(move |surface| report_hop_failure(surface, run, &err)) {
                    error!(run, error = %e, "reset failure could not be reported");
                }
            }),
        }
    }

    /// Drop the worker queue and the dispatcher. Safe to call repeatedly and while a
    /// run is in flight; does not wait for it.
    pub(crate) fn release(&mut self) {
        if self.resources.take().is_some() {
            debug!("execution resources released");
        }
    }
}

/// Appends preparation lines to the status log, in order, ahead of the outcome.
fn progress(run: u64, ui: UiDispatcher) -> Notify {
    Arc::new(move |line: String| {
        if let Err(e) = ui.post(move |surface| surface.append(line)) {
            debug!(run, error = %e, "progress line dropped");
        }
    })
}

/// UI half of a run.
fn activate(
    surface: &mut Surface,
    run: u64,
    prepared: Result<LaunchPlan, ActivationError>,
    launcher: &dyn Launcher,
) {
    let issued = prepared.and_then(|plan| {
        launcher.launch(&plan)?;
        Ok(plan)
    });
    match issued {
        Ok(plan) => {
            let component = plan.request().component();
            info!(run, %component, "activation requested");
            surface.append(format!("Activation requested: {component}"));
            surface.finish(Outcome::Success);
            surface.append(MSG_RESTART);
        }
        Err(e) => {
            warn!(run, error = %e, "activation failed");
            surface.finish(Outcome::ActivationFailure);
            surface.append(format!("Activation failed: {e}"));
        }
    }
}

fn report_hop_failure(surface: &mut Surface, run: u64, err: &anyhow::Error) {
    error!(run, error = %format!("{err:#}"), "reset hop failed");
    surface.finish(Outcome::DispatchFailure);
    surface.append(format!("Error during reset: {err}"));
    if let Some(cause) = err.chain().nth(1) {
        surface.append(format!("Cause: {cause}"));
    }
}
