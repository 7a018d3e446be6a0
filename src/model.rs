use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TARGET_PACKAGE: &str = "com.felicanetworks.mfm.main";
pub const DEFAULT_TARGET_CLASS: &str = "com.felicanetworks.mfm.memory_clear.MemoryClearActivity";

/// Method whose result must already be forced to `true` inside the target process.
pub const INTERCEPTED_METHOD: &str = "isCallerVerification";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetConfig {
    pub target: TargetComponent,
    pub transport: Transport,
    pub use_root: bool,
    /// Start the activity as the Settings app's UID through the root shell.
    pub settings_uid: bool,
    /// Run the device probe before the trigger is enabled.
    pub probe_on_launch: bool,
    /// Run the device probe again inside every background hop.
    pub preflight: bool,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

/// Package and class of the screen to activate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetComponent {
    pub package: String,
    pub class: String,
}

impl Default for TargetComponent {
    fn default() -> Self {
        Self {
            package: DEFAULT_TARGET_PACKAGE.to_string(),
            class: DEFAULT_TARGET_CLASS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    Adb { serial: Option<String> },
    Local,
}

impl Transport {
    pub fn describe(&self) -> String {
        match self {
            Transport::Adb { serial: Some(s) } => format!("adb ({s})"),
            Transport::Adb { serial: None } => "adb".to_string(),
            Transport::Local => "local shell".to_string(),
        }
    }
}

/// Visible lifecycle of the reset trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Unavailable,
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Initializing => "Initializing",
            RunState::Unavailable => "Unavailable",
            RunState::Idle => "Idle",
            RunState::Running => "Running",
            RunState::Succeeded => "Succeeded",
            RunState::Failed => "Failed",
        }
    }
}

/// Terminal result of one reset attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    NotReady,
    DeviceUnavailable,
    ResourceMissing,
    DispatchFailure,
    ActivationFailure,
    Success,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Outcome::NotReady => "display not ready",
            Outcome::DeviceUnavailable => "device unavailable",
            Outcome::ResourceMissing => "execution resources missing",
            Outcome::DispatchFailure => "background hop failed",
            Outcome::ActivationFailure => "activation request failed",
            Outcome::Success => "activation requested",
        };
        f.write_str(s)
    }
}

/// Summary printed by the headless modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp_utc: String,
    pub target: TargetComponent,
    pub transport: Transport,
    pub use_root: bool,
    pub settings_uid: bool,
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    pub requires_override: String,
    pub outcome: Outcome,
    pub status_lines: Vec<String>,
}

impl RunReport {
    pub fn new(cfg: &ResetConfig, outcome: Outcome, status_lines: Vec<String>) -> Self {
        Self {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            target: cfg.target.clone(),
            transport: cfg.transport.clone(),
            use_root: cfg.use_root,
            settings_uid: cfg.settings_uid,
            probe_timeout: cfg.probe_timeout,
            requires_override: override_requirement(&cfg.target),
            outcome,
            status_lines,
        }
    }
}

/// Human-readable statement of the external interception the target relies on.
pub fn override_requirement(target: &TargetComponent) -> String {
    let class = target.class.rsplit('.').next().unwrap_or(&target.class);
    format!(
        "{class}#{INTERCEPTED_METHOD} forced to true in {}",
        target.package
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_requirement_names_method_and_package() {
        let s = override_requirement(&TargetComponent::default());
        assert_eq!(
            s,
            "MemoryClearActivity#isCallerVerification forced to true in com.felicanetworks.mfm.main"
        );
    }

    #[test]
    fn report_serializes_outcome_and_timeout() {
        let cfg = ResetConfig {
            target: TargetComponent::default(),
            transport: Transport::Adb {
                serial: Some("emulator-5554".into()),
            },
            use_root: true,
            settings_uid: true,
            probe_on_launch: true,
            preflight: false,
            probe_timeout: Duration::from_secs(3),
        };
        let report = RunReport::new(&cfg, Outcome::ActivationFailure, vec!["x".into()]);
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["outcome"], "activation_failure");
        assert_eq!(v["probe_timeout"], "3s");
        assert_eq!(v["settings_uid"], true);
        assert_eq!(v["transport"]["kind"], "adb");
        assert_eq!(v["transport"]["serial"], "emulator-5554");
    }
}
