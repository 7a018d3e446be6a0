//! `am start` launcher over adb or a local shell.

use super::root;
use super::shell::{command_for, run_bounded, ShellCommand};
use super::{ActivationError, ActivationRequest, LaunchPlan, Launcher, Notify};
use crate::model::Transport;
use futures::future::{BoxFuture, FutureExt};
use std::process::Stdio;
use std::time::Duration;
use tokio::runtime::Handle;

pub(crate) fn activation_command(
    transport: &Transport,
    use_root: bool,
    request: &ActivationRequest,
) -> ShellCommand {
    command_for(transport, use_root, "am", &request.am_args())
}

/// `cmd package resolve-activity` for the request's explicit component.
pub(crate) fn resolve_command(
    transport: &Transport,
    use_root: bool,
    request: &ActivationRequest,
) -> ShellCommand {
    let component = request.component();
    command_for(
        transport,
        use_root,
        "cmd",
        &["package", "resolve-activity", "--brief", "-n", component.as_str()],
    )
}

/// Checks `resolve-activity --brief` output. The last line names the resolved
/// component, possibly with a class relative to its package.
pub(crate) fn check_resolved(request: &ActivationRequest, output: &str) -> Result<(), ActivationError> {
    let component = request.component();
    let last = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("no output");
    let expanded = match last.split_once('/') {
        Some((pkg, cls)) if cls.starts_with('.') => format!("{pkg}/{pkg}{cls}"),
        _ => last.to_string(),
    };
    if expanded == component {
        Ok(())
    } else {
        Err(ActivationError::Unresolved {
            component,
            detail: last.to_string(),
        })
    }
}

/// Resolves the target in the background and spawns `am start` without waiting.
#[derive(Clone)]
pub(crate) struct AmLauncher {
    transport: Transport,
    use_root: bool,
    settings_uid: bool,
    timeout: Duration,
    runtime: Handle,
}

impl AmLauncher {
    pub(crate) fn new(
        transport: Transport,
        use_root: bool,
        settings_uid: bool,
        timeout: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            transport,
            use_root,
            settings_uid,
            timeout,
            runtime,
        }
    }

    async fn plan(self, request: ActivationRequest, notify: Notify) -> Result<LaunchPlan, ActivationError> {
        let resolve = resolve_command(&self.transport, self.use_root, &request);
        tracing::debug!(command = %resolve, "resolving target");
        let output = run_bounded(&resolve, self.timeout)
            .await
            .map_err(|e| ActivationError::Unresolved {
                component: request.component(),
                detail: format!("{e:#}"),
            })?;
        check_resolved(&request, &output)?;

        let command = if self.settings_uid {
            root::settings_uid_command(&self.transport, &request, self.timeout, &notify).await
        } else {
            activation_command(&self.transport, self.use_root, &request)
        };
        Ok(LaunchPlan::new(request, command))
    }
}

impl Launcher for AmLauncher {
    fn prepare(
        &self,
        request: ActivationRequest,
        notify: Notify,
    ) -> BoxFuture<'static, Result<LaunchPlan, ActivationError>> {
        self.clone().plan(request, notify).boxed()
    }

    fn launch(&self, plan: &LaunchPlan) -> Result<(), ActivationError> {
        let command = plan.command();
        tracing::info!(command = %command, "issuing activation request");

        // The runtime reaps the child once it exits; nothing here awaits it.
        let _guard = self.runtime.enter();
        command
            .to_tokio()
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|source| ActivationError::Spawn {
                program: command.program.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetComponent;
    use std::sync::Arc;

    fn request() -> ActivationRequest {
        ActivationRequest::new(&TargetComponent {
            package: "com.example".into(),
            class: "com.example.Reset".into(),
        })
        .unwrap()
    }

    #[test]
    fn adb_with_serial() {
        let cmd = activation_command(
            &Transport::Adb {
                serial: Some("R58M".into()),
            },
            false,
            &request(),
        );
        assert_eq!(
            cmd.to_string(),
            "adb -s R58M shell am start -n com.example/com.example.Reset -f 0x10000000"
        );
    }

    #[test]
    fn adb_root_quotes_payload() {
        let cmd = activation_command(&Transport::Adb { serial: None }, true, &request());
        assert_eq!(
            cmd.args,
            [
                "shell",
                "su",
                "-c",
                "'am start -n com.example/com.example.Reset -f 0x10000000'"
            ]
        );
    }

    #[test]
    fn local_root_passes_payload_as_one_argument() {
        let cmd = activation_command(&Transport::Local, true, &request());
        assert_eq!(cmd.program, "su");
        assert_eq!(
            cmd.args,
            ["-c", "am start -n com.example/com.example.Reset -f 0x10000000"]
        );
    }

    #[test]
    fn resolve_uses_package_manager_brief_output() {
        let cmd = resolve_command(&Transport::Adb { serial: None }, false, &request());
        assert_eq!(
            cmd.to_string(),
            "adb shell cmd package resolve-activity --brief -n com.example/com.example.Reset"
        );
    }

    #[test]
    fn resolved_component_is_accepted_in_either_form() {
        let full = "priority=0 preferredOrder=0 match=0x108000 specificIndex=-1 isDefault=false\n\
                    com.example/com.example.Reset\n";
        assert!(check_resolved(&request(), full).is_ok());
        assert!(check_resolved(&request(), "com.example/.Reset").is_ok());
    }

    #[test]
    fn missing_activity_is_unresolved() {
        let err = check_resolved(&request(), "No activity found\n").unwrap_err();
        assert!(matches!(err, ActivationError::Unresolved { .. }));
        assert_eq!(
            err.to_string(),
            "cannot resolve com.example/com.example.Reset: No activity found"
        );

        let err = check_resolved(&request(), "com.example/com.example.Other").unwrap_err();
        assert!(err.to_string().ends_with("com.example/com.example.Other"));
        assert!(check_resolved(&request(), "").is_err());
    }

    #[tokio::test]
    async fn prepare_fails_when_resolver_is_missing() {
        // `cmd package` exists only on Android.
        if cfg!(any(target_os = "android", windows)) {
            return;
        }
        let launcher = AmLauncher::new(
            Transport::Local,
            false,
            false,
            Duration::from_secs(2),
            Handle::current(),
        );
        let err = launcher
            .prepare(request(), Arc::new(|_: String| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, ActivationError::Unresolved { .. }), "{err}");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let launcher = AmLauncher::new(
            Transport::Local,
            false,
            false,
            Duration::from_secs(2),
            Handle::current(),
        );
        // `am` exists only on Android; on a host this must fail to spawn.
        if cfg!(target_os = "android") {
            return;
        }
        let plan = LaunchPlan::new(
            request(),
            activation_command(&Transport::Local, false, &request()),
        );
        let err = launcher.launch(&plan).unwrap_err();
        assert!(matches!(err, ActivationError::Spawn { ref program, .. } if program == "am"));
    }
}
