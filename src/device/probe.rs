//! Device readiness probes.

use super::shell::{root_line, run_bounded, ShellCommand};
use crate::model::Transport;
use anyhow::{bail, Context, Result};
use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;

/// Checks that an activation request has somewhere to land.
pub(crate) trait DeviceProbe: Send + Sync {
    fn probe(&self) -> BoxFuture<'static, Result<()>>;
}

/// Probes through the same transport the launcher uses.
#[derive(Debug, Clone)]
pub(crate) struct ShellProbe {
    transport: Transport,
    use_root: bool,
    timeout: Duration,
}

impl ShellProbe {
    pub(crate) fn new(transport: Transport, use_root: bool, timeout: Duration) -> Self {
        Self {
            transport,
            use_root,
            timeout,
        }
    }

    async fn run(self) -> Result<()> {
        match &self.transport {
            Transport::Adb { serial } => {
                let mut args = Vec::new();
                if let Some(serial) = serial {
                    args.push("-s".to_string());
                    args.push(serial.clone());
                }
                args.push("get-state".to_string());
                let out = run_bounded(&ShellCommand::new("adb", args), self.timeout)
                    .await
                    .context("adb get-state")?;
                let state = out.trim();
                if state != "device" {
                    bail!("device state is `{state}`");
                }
            }
            Transport::Local => {
                let lookup = ShellCommand::new("sh", vec!["-c".into(), "command -v am".into()]);
                let out = run_bounded(&lookup, self.timeout)
                    .await
                    .context("looking up `am`")?;
                if out.trim().is_empty() {
                    bail!("`am` is not on PATH");
                }
            }
        }

        if self.use_root {
            run_bounded(&root_line(&self.transport, "id"), self.timeout)
                .await
                .context("root check (su -c id)")?;
        }
        tracing::debug!(transport = %self.transport.describe(), "device probe passed");
        Ok(())
    }
}

impl DeviceProbe for ShellProbe {
    fn probe(&self) -> BoxFuture<'static, Result<()>> {
        self.clone().run().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unattached_serial_is_not_ready() {
        let probe = ShellProbe::new(
            Transport::Adb {
                serial: Some("felica-reset-no-such-device".into()),
            },
            false,
            Duration::from_secs(2),
        );
        let err = probe.probe().await.unwrap_err();
        assert_eq!(err.to_string(), "adb get-state");
        assert!(err.chain().nth(1).is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_probe_looks_for_am() {
        if cfg!(target_os = "android") {
            return;
        }
        let probe = ShellProbe::new(Transport::Local, false, Duration::from_secs(2));
        let err = probe.probe().await.unwrap_err();
        assert_eq!(err.to_string(), "looking up `am`");
    }
}
