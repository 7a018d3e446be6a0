//! Starting the activity as the Settings app's UID through the root shell.
//!
//! The target only accepts callers it trusts, and Settings is one of them. The root
//! manager decides which `su` form can switch UID; without one, `runuser` or
//! `setuidgid` are tried, then plain root.

use super::shell::{command_for, root_line, run_bounded, run_captured, ShellCommand};
use super::{ActivationRequest, Notify};
use crate::model::Transport;
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub(crate) const SETTINGS_PACKAGE: &str = "com.android.settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootManager {
    Magisk,
    KernelSu,
    Generic,
}

impl fmt::Display for RootManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RootManager::Magisk => "Magisk",
            RootManager::KernelSu => "KernelSU",
            RootManager::Generic => "generic",
        })
    }
}

/// True if `tag` follows a dotted version whose last `parts` components are numeric,
/// e.g. `27.0:MAGISKSU` or `1.0.3:KernelSU`. `None` accepts any number of parts.
fn version_tagged(text: &str, tag: &str, parts: Option<usize>) -> bool {
    text.match_indices(tag).any(|(at, _)| {
        let head = &text[..at];
        let start = head
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
            .map_or(0, |(i, c)| i + c.len_utf8());
        let segments: Vec<&str> = head[start..].split('.').collect();
        let need = parts.unwrap_or(1);
        segments.len() >= need
            && segments[segments.len() - need..]
                .iter()
                .all(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
    })
}

/// Classifies `su -v` output. `None` when it names no known manager.
pub(crate) fn classify_su_version(text: &str) -> Option<RootManager> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if version_tagged(text, ":MAGISKSU", None) {
        return Some(RootManager::Magisk);
    }
    if version_tagged(text, ":KernelSU", Some(3)) {
        return Some(RootManager::KernelSu);
    }
    let lower = text.to_ascii_lowercase();
    if lower.contains("magisk") {
        Some(RootManager::Magisk)
    } else if lower.contains("kernelsu") {
        Some(RootManager::KernelSu)
    } else {
        None
    }
}

/// App id from `dumpsys package` output: the first line mentioning `userId` or
/// `appId`, read as `appId=N` or else `userId=N`.
pub(crate) fn parse_app_id(dumpsys: &str) -> Option<u32> {
    let line = dumpsys
        .lines()
        .find(|l| l.contains("userId") || l.contains("appId"))?;
    ["appId=", "userId="].iter().find_map(|key| {
        let (_, rest) = line.split_once(key)?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    })
}

/// How the root shell runs a command as another UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UidSwitch {
    MagiskSu,
    KernelSu,
    Runuser,
    Setuidgid,
    /// No switch: run as root.
    Root,
}

impl UidSwitch {
    fn for_manager(manager: RootManager) -> Option<Self> {
        match manager {
            RootManager::Magisk => Some(UidSwitch::MagiskSu),
            RootManager::KernelSu => Some(UidSwitch::KernelSu),
            RootManager::Generic => None,
        }
    }

    fn via(self) -> &'static str {
        match self {
            UidSwitch::MagiskSu => "Magisk",
            UidSwitch::KernelSu => "KernelSU",
            UidSwitch::Runuser => "runuser",
            UidSwitch::Setuidgid => "setuidgid",
            UidSwitch::Root => "root",
        }
    }

    /// Root-shell command line that runs `am` as `uid`.
    pub(crate) fn shell_line(self, uid: u32, am: &str) -> String {
        match self {
            UidSwitch::MagiskSu => format!("su {uid} -c \"{am}\""),
            UidSwitch::KernelSu => format!("su -c \"{am}\" -u {uid}"),
            UidSwitch::Runuser => format!("runuser -u {uid} -- {am}"),
            UidSwitch::Setuidgid => format!("setuidgid {uid} {am}"),
            UidSwitch::Root => am.to_string(),
        }
    }
}

fn am_line(request: &ActivationRequest) -> String {
    format!("am {}", request.am_args_brought_to_front().join(" "))
}

async fn detect_root_manager(transport: &Transport, limit: Duration) -> RootManager {
    let su_version = command_for(transport, false, "su", &["-v"]);
    match run_captured(&su_version, limit).await {
        Ok(out) if out.status.success() => {
            let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&out.stderr));
            if let Some(manager) = classify_su_version(&text) {
                return manager;
            }
        }
        Ok(out) => debug!(status = %out.status, "`su -v` failed"),
        Err(e) => debug!(error = %format!("{e:#}"), "`su -v` did not run"),
    }

    match run_bounded(&root_line(transport, "magisk -v"), limit).await {
        Ok(out) if !out.trim().is_empty() => RootManager::Magisk,
        _ => RootManager::Generic,
    }
}

async fn settings_app_id(transport: &Transport, limit: Duration) -> anyhow::Result<u32> {
    let dumpsys = root_line(transport, &format!("dumpsys package {SETTINGS_PACKAGE}"));
    let out = run_bounded(&dumpsys, limit).await?;
    parse_app_id(&out).ok_or_else(|| anyhow::anyhow!("no appId in dumpsys output"))
}

async fn generic_switch(transport: &Transport, limit: Duration) -> UidSwitch {
    for (tool, switch) in [
        ("runuser", UidSwitch::Runuser),
        ("setuidgid", UidSwitch::Setuidgid),
    ] {
        let lookup = root_line(transport, &format!("command -v {tool}"));
        if let Ok(out) = run_bounded(&lookup, limit).await {
            if !out.trim().is_empty() {
                return switch;
            }
        }
    }
    UidSwitch::Root
}

/// Picks the UID switch for this device and builds the root-shell launch command,
/// reporting each step through `notify`.
pub(crate) async fn settings_uid_command(
    transport: &Transport,
    request: &ActivationRequest,
    limit: Duration,
    notify: &Notify,
) -> ShellCommand {
    let am = am_line(request);
    notify("Using root".to_string());

    let manager = detect_root_manager(transport, limit).await;
    debug!(%manager, "root manager detected");
    notify(format!("Root manager: {manager}"));

    let uid = match settings_app_id(transport, limit).await {
        Ok(uid) => uid,
        Err(e) => {
            debug!(error = %format!("{e:#}"), "Settings app id lookup failed");
            notify("Could not read the Settings app UID".to_string());
            notify("Falling back to plain root".to_string());
            return root_line(transport, &am);
        }
    };
    notify(format!("Settings app UID: {uid}"));

    let switch = match UidSwitch::for_manager(manager) {
        Some(switch) => switch,
        None => generic_switch(transport, limit).await,
    };
    notify(match switch {
        UidSwitch::Root => "No UID switch available; starting as root".to_string(),
        other => format!("Switching to UID {uid} via {}…", other.via()),
    });
    root_line(transport, &switch.shell_line(uid, &am))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetComponent;
    use std::sync::{Arc, Mutex};

    #[test]
    fn su_version_strings() {
        assert_eq!(classify_su_version("27.0:MAGISKSU\n"), Some(RootManager::Magisk));
        assert_eq!(classify_su_version("v26.1.2:MAGISKSU"), Some(RootManager::Magisk));
        assert_eq!(classify_su_version("1.0.3:KernelSU"), Some(RootManager::KernelSu));
        // Two-part KernelSU versions only match by name.
        assert_eq!(classify_su_version("1.0:KernelSU"), Some(RootManager::KernelSu));
        assert_eq!(classify_su_version("kitsune magisk 27"), Some(RootManager::Magisk));
        assert_eq!(classify_su_version("16 com.android.su"), None);
        assert_eq!(classify_su_version("  \n"), None);
        assert_eq!(classify_su_version("é1.2.3:KernelSU"), Some(RootManager::KernelSu));
    }

    #[test]
    fn version_tag_needs_numeric_parts() {
        assert!(version_tagged("1.2.3:KernelSU", ":KernelSU", Some(3)));
        assert!(version_tagged("x 9.1.2.3:KernelSU", ":KernelSU", Some(3)));
        assert!(!version_tagged("1..3:KernelSU", ":KernelSU", Some(3)));
        assert!(!version_tagged(":MAGISKSU", ":MAGISKSU", None));
    }

    #[test]
    fn app_id_from_dumpsys() {
        let modern = "Packages:\n  Package [com.android.settings] (3f2a1b):\n    appId=1000\n    pkg=Package{...}\n";
        assert_eq!(parse_app_id(modern), Some(1000));
        let legacy = "  Package [com.android.settings]:\n    userId=1000 gids=[3003]\n";
        assert_eq!(parse_app_id(legacy), Some(1000));
        assert_eq!(parse_app_id("Unable to find package"), None);
        assert_eq!(parse_app_id("    userId=abc"), None);
    }

    #[test]
    fn uid_switch_lines() {
        let am = "am start -n a/a.B";
        assert_eq!(UidSwitch::MagiskSu.shell_line(1000, am), "su 1000 -c \"am start -n a/a.B\"");
        assert_eq!(UidSwitch::KernelSu.shell_line(1000, am), "su -c \"am start -n a/a.B\" -u 1000");
        assert_eq!(UidSwitch::Runuser.shell_line(1000, am), "runuser -u 1000 -- am start -n a/a.B");
        assert_eq!(UidSwitch::Setuidgid.shell_line(1000, am), "setuidgid 1000 am start -n a/a.B");
        assert_eq!(UidSwitch::Root.shell_line(1000, am), am);
    }

    #[test]
    fn magisk_line_over_adb_nests_quotes() {
        let request = ActivationRequest::new(&TargetComponent::default()).unwrap();
        let line = UidSwitch::MagiskSu.shell_line(1000, &am_line(&request));
        let cmd = root_line(&Transport::Adb { serial: None }, &line);
        assert_eq!(
            cmd.args.last().map(String::as_str),
            Some(
                "'su 1000 -c \"am start -a android.intent.action.MAIN \
                 -n com.felicanetworks.mfm.main/com.felicanetworks.mfm.memory_clear.MemoryClearActivity \
                 -f 0x10000000 --activity-brought-to-front\"'"
            )
        );
    }

    #[tokio::test]
    async fn falls_back_to_plain_root_without_a_device() {
        // Every command fails against a serial that is not attached.
        let transport = Transport::Adb {
            serial: Some("felica-reset-no-such-device".into()),
        };
        let request = ActivationRequest::new(&TargetComponent::default()).unwrap();
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = lines.clone();
        let notify: Notify = Arc::new(move |l: String| sink.lock().unwrap().push(l));

        let cmd = settings_uid_command(&transport, &request, Duration::from_secs(2), &notify).await;
        assert_eq!(cmd, root_line(&transport, &am_line(&request)));
        assert_eq!(
            *lines.lock().unwrap(),
            [
                "Using root",
                "Root manager: generic",
                "Could not read the Settings app UID",
                "Falling back to plain root",
            ]
        );
    }
}
