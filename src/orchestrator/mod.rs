//! Reset orchestration.
//!
//! This module owns the reset lifecycle (readiness, trigger, background hop, activation,
//! reporting) and the two execution contexts it runs on. Frontends own the `Surface`
//! and the `UiLoop`, and call into the controller from the thread that drains it.

mod controller;
mod executor;

pub(crate) use controller::{ReadinessError, ResetOrchestrator, Trigger};
pub(crate) use executor::{ui_channel, ExecutionResources, UiLoop};
