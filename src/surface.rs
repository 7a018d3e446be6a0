//! Visible state of the reset screen: the status region and the trigger control.
//!
//! A `Surface` is owned by whichever thread drains the UI loop. Work scheduled
//! elsewhere reaches it only through the UI dispatcher.

use crate::model::{Outcome, RunState};
use crate::status_log::StatusLog;

/// Enable/disable gate for starting a new run.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ActionControl {
    enabled: bool,
}

impl ActionControl {
    pub(crate) fn is_enabled(self) -> bool {
        self.enabled
    }
}

#[derive(Debug)]
pub(crate) struct Surface {
    status: Option<StatusLog>,
    trigger: Option<ActionControl>,
    state: RunState,
    last_outcome: Option<Outcome>,
    #[cfg(test)]
    pub(crate) touched_by: std::collections::HashSet<std::thread::ThreadId>,
}

impl Surface {
    /// A surface whose display elements do not exist yet.
    pub(crate) fn unbound() -> Self {
        Self {
            status: None,
            trigger: None,
            state: RunState::Initializing,
            last_outcome: None,
            #[cfg(test)]
            touched_by: Default::default(),
        }
    }

    /// A surface with both display elements present, trigger disabled.
    pub(crate) fn bound() -> Self {
        let mut s = Self::unbound();
        s.bind();
        s
    }

    pub(crate) fn bind(&mut self) {
        self.touch();
        self.status.get_or_insert_with(StatusLog::default);
        self.trigger.get_or_insert_with(ActionControl::default);
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.status.is_some() && self.trigger.is_some()
    }

    pub(crate) fn trigger_enabled(&self) -> bool {
        self.trigger.is_some_and(ActionControl::is_enabled)
    }

    pub(crate) fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    pub(crate) fn status_text(&self) -> &str {
        self.status.as_ref().map(StatusLog::text).unwrap_or_default()
    }

    pub(crate) fn entries(&self) -> &[String] {
        self.status.as_ref().map(StatusLog::entries).unwrap_or_default()
    }

    pub(crate) fn append(&mut self, line: impl Into<String>) {
        self.touch();
        if let Some(log) = self.status.as_mut() {
            log.append(line);
        }
    }

    pub(crate) fn set_text(&mut self, text: impl Into<String>) {
        self.touch();
        if let Some(log) = self.status.as_mut() {
            log.set_text(text);
        }
    }

    pub(crate) fn set_trigger_enabled(&mut self, enabled: bool) {
        self.touch();
        if let Some(trigger) = self.trigger.as_mut() {
            trigger.enabled = enabled;
        }
    }

    /// Clear the log, announce the run and lock the trigger, in that order.
    pub(crate) fn begin_run(&mut self, first_line: &str) {
        self.touch();
        if let Some(log) = self.status.as_mut() {
            log.clear();
            log.append(first_line);
        }
        self.set_trigger_enabled(false);
        self.state = RunState::Running;
        self.last_outcome = None;
    }

    /// Re-enable the trigger and record the terminal outcome of the run.
    pub(crate) fn finish(&mut self, outcome: Outcome) {
        self.set_trigger_enabled(true);
        self.state = if outcome.is_success() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        self.last_outcome = Some(outcome);
    }

    pub(crate) fn mark_initializing(&mut self, text: &str) {
        self.set_text(text);
        self.set_trigger_enabled(false);
        self.state = RunState::Initializing;
    }

    pub(crate) fn mark_ready(&mut self, text: &str) {
        self.set_text(text);
        self.set_trigger_enabled(true);
        self.state = RunState::Idle;
    }

    pub(crate) fn mark_unavailable(&mut self, text: impl Into<String>) {
        self.set_text(text);
        self.set_trigger_enabled(false);
        self.state = RunState::Unavailable;
        self.last_outcome = Some(Outcome::DeviceUnavailable);
    }

    #[cfg(test)]
    fn touch(&mut self) {
        self.touched_by.insert(std::thread::current().id());
    }

    #[cfg(not(test))]
    fn touch(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_surface_ignores_mutation() {
        let mut s = Surface::unbound();
        s.append("lost");
        s.set_trigger_enabled(true);
        assert!(!s.is_ready());
        assert!(!s.trigger_enabled());
        assert_eq!(s.status_text(), "");
    }

    #[test]
    fn run_lifecycle_toggles_trigger() {
        let mut s = Surface::bound();
        s.mark_ready("Ready to reset");
        assert!(s.trigger_enabled());
        assert_eq!(s.state(), RunState::Idle);

        s.begin_run("Reset starting…");
        assert!(!s.trigger_enabled());
        assert_eq!(s.status_text(), "Reset starting…");
        assert_eq!(s.state(), RunState::Running);

        s.finish(Outcome::ActivationFailure);
        assert!(s.trigger_enabled());
        assert_eq!(s.state(), RunState::Failed);
        assert_eq!(s.last_outcome(), Some(Outcome::ActivationFailure));

        s.begin_run("Reset starting…");
        assert_eq!(s.entries(), ["Reset starting…".to_string()]);
        assert_eq!(s.last_outcome(), None);
    }
}
