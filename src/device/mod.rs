//! Talking to the Android device: activation requests and readiness probes.

mod am;
mod probe;
mod root;
pub(crate) mod shell;

pub(crate) use am::AmLauncher;
pub(crate) use probe::{DeviceProbe, ShellProbe};

use crate::model::TargetComponent;
use futures::future::BoxFuture;
use shell::ShellCommand;
use std::sync::Arc;

/// `Intent.FLAG_ACTIVITY_NEW_TASK`.
pub(crate) const FLAG_ACTIVITY_NEW_TASK: u32 = 0x1000_0000;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ActivationError {
    #[error("invalid component `{component}`: {reason}")]
    InvalidComponent {
        component: String,
        reason: &'static str,
    },
    #[error("cannot resolve {component}: {detail}")]
    Unresolved { component: String, detail: String },
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A request to start a component of another application in its own task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActivationRequest {
    package: String,
    class: String,
    flags: u32,
}

impl ActivationRequest {
    pub(crate) fn new(target: &TargetComponent) -> Result<Self, ActivationError> {
        let package = target.package.trim();
        let class = target.class.trim();
        validate_identifier(package, false).map_err(|reason| {
            ActivationError::InvalidComponent {
                component: target.package.clone(),
                reason,
            }
        })?;
        validate_identifier(class, true).map_err(|reason| ActivationError::InvalidComponent {
            component: target.class.clone(),
            reason,
        })?;
        // Android resolves a leading dot against the package name.
        let class = match class.strip_prefix('.') {
            Some(rest) => format!("{package}.{rest}"),
            None => class.to_string(),
        };
        Ok(Self {
            package: package.to_string(),
            class,
            flags: FLAG_ACTIVITY_NEW_TASK,
        })
    }

    /// `package/class`, as accepted by `am start -n`.
    pub(crate) fn component(&self) -> String {
        format!("{}/{}", self.package, self.class)
    }

    pub(crate) fn flags(&self) -> u32 {
        self.flags
    }

    /// Arguments for `am`, starting with the `start` subcommand.
    pub(crate) fn am_args(&self) -> Vec<String> {
        vec![
            "start".to_string(),
            "-n".to_string(),
            self.component(),
            "-f".to_string(),
            format!("{:#010x}", self.flags()),
        ]
    }

    /// `am start` arguments for the root path: explicit MAIN action and reuse of an
    /// existing task.
    pub(crate) fn am_args_brought_to_front(&self) -> Vec<String> {
        vec![
            "start".to_string(),
            "-a".to_string(),
            "android.intent.action.MAIN".to_string(),
            "-n".to_string(),
            self.component(),
            "-f".to_string(),
            format!("{:#010x}", self.flags()),
            "--activity-brought-to-front".to_string(),
        ]
    }
}

/// A resolved request and the command that will issue it.
#[derive(Debug, Clone)]
pub(crate) struct LaunchPlan {
    request: ActivationRequest,
    command: ShellCommand,
}

impl LaunchPlan {
    pub(crate) fn new(request: ActivationRequest, command: ShellCommand) -> Self {
        Self { request, command }
    }

    pub(crate) fn request(&self) -> &ActivationRequest {
        &self.request
    }

    pub(crate) fn command(&self) -> &ShellCommand {
        &self.command
    }
}

/// Progress lines from background preparation, in the order they happen.
pub(crate) type Notify = Arc<dyn Fn(String) + Send + Sync>;

fn validate_identifier(id: &str, allow_relative: bool) -> Result<(), &'static str> {
    let body = if allow_relative {
        id.strip_prefix('.').unwrap_or(id)
    } else {
        id
    };
    if body.is_empty() {
        return Err("identifier is empty");
    }
    for segment in body.split('.') {
        let mut chars = segment.chars();
        match chars.next() {
            None => return Err("empty segment"),
            Some(c) if c.is_ascii_digit() => return Err("segment starts with a digit"),
            Some(_) => {}
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            return Err("unexpected character");
        }
    }
    Ok(())
}

/// Issues activation requests in two halves.
pub(crate) trait Launcher: Send + Sync {
    /// Background half: confirm the target resolves and build the command. May wait
    /// on the device.
    fn prepare(
        &self,
        request: ActivationRequest,
        notify: Notify,
    ) -> BoxFuture<'static, Result<LaunchPlan, ActivationError>>;

    /// UI half: start the prepared command. Must not block.
    fn launch(&self, plan: &LaunchPlan) -> Result<(), ActivationError>;
}
