use crate::device::{AmLauncher, ShellProbe};
use crate::logging::{self, LogSink};
use crate::model::{
    Outcome, ResetConfig, RunReport, RunState, TargetComponent, Transport, DEFAULT_TARGET_CLASS,
    DEFAULT_TARGET_PACKAGE,
};
use crate::orchestrator::{ui_channel, ExecutionResources, ResetOrchestrator, Trigger, UiLoop};
use crate::surface::Surface;
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "felica-reset",
    version,
    about = "Request the FeliCa memory-clear screen on an Android device"
)]
pub struct Cli {
    /// Package that owns the screen to activate
    #[arg(long, default_value = DEFAULT_TARGET_PACKAGE)]
    pub package: String,

    /// Activity class to activate (a leading '.' is relative to --package)
    #[arg(long, default_value = DEFAULT_TARGET_CLASS)]
    pub class: String,

    /// adb device serial (defaults to the only connected device)
    #[arg(long, conflicts_with = "local")]
    pub serial: Option<String>,

    /// Run `am` directly instead of through adb (for on-device terminals)
    #[arg(long)]
    pub local: bool,

    /// Wrap commands in `su -c`
    #[arg(long)]
    pub root: bool,

    /// Start the activity as the Settings app's UID (detects Magisk or KernelSU)
    #[arg(long, requires = "root")]
    pub settings_uid: bool,

    /// Skip the device readiness probe at startup
    #[arg(long)]
    pub no_probe: bool,

    /// Probe the device again right before every reset
    #[arg(long)]
    pub preflight: bool,

    /// Time limit for each device command (probe, target lookup, root detection)
    #[arg(long, default_value = "3s")]
    pub probe_timeout: humantime::Duration,

    /// Run one reset, print the status log and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Run one reset, print a JSON report and exit (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Run silently: suppress all output except errors
    #[arg(long)]
    pub silent: bool,

    /// Write logs to this file (the TUI logs nowhere otherwise)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    let headless = args.text || args.json;
    let sink = match (&args.log_file, headless && !args.silent) {
        (Some(path), _) => LogSink::File(path),
        (None, true) => LogSink::Stderr,
        (None, false) => LogSink::Off,
    };
    logging::init(sink, args.verbose)?;

    if !headless {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            return run_headless(args).await;
        }
    }

    run_headless(args).await
}

/// Build a `ResetConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<ResetConfig> {
    let transport = if args.local {
        Transport::Local
    } else {
        Transport::Adb {
            serial: args.serial.clone().filter(|s| !s.trim().is_empty()),
        }
    };
    let probe_timeout = Duration::from(args.probe_timeout);
    if probe_timeout.is_zero() {
        anyhow::bail!("--probe-timeout must be greater than zero");
    }
    Ok(ResetConfig {
        target: TargetComponent {
            package: args.package.clone(),
            class: args.class.clone(),
        },
        transport,
        use_root: args.root,
        settings_uid: args.settings_uid,
        probe_on_launch: !args.no_probe,
        preflight: args.preflight,
        probe_timeout,
    })
}

/// Wire the orchestrator to the real device: `am` launcher, shell probe, fresh
/// execution contexts. The returned `UiLoop` must be drained on a single thread.
pub(crate) fn build_orchestrator(cfg: &ResetConfig, runtime: &Handle) -> (ResetOrchestrator, UiLoop) {
    let (ui, ui_loop) = ui_channel();
    let resources = ExecutionResources::start(runtime, ui);
    let launcher = Arc::new(AmLauncher::new(
        cfg.transport.clone(),
        cfg.use_root,
        cfg.settings_uid,
        cfg.probe_timeout,
        runtime.clone(),
    ));
    let mut orchestrator = ResetOrchestrator::new(cfg.target.clone(), launcher, Some(resources));
    if cfg.probe_on_launch || cfg.preflight {
        let probe = ShellProbe::new(cfg.transport.clone(), cfg.use_root, cfg.probe_timeout);
        orchestrator = orchestrator.with_probe(Arc::new(probe), cfg.preflight);
    }
    (orchestrator, ui_loop)
}

/// One reset without a terminal UI. The calling thread is not used as the UI loop;
/// a blocking thread takes that role for the whole run.
async fn run_headless(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let (orchestrator, ui_loop) = build_orchestrator(&cfg, &Handle::current());

    let report_cfg = cfg.clone();
    let (outcome, lines) =
        tokio::task::spawn_blocking(move || drive_single_reset(&report_cfg, orchestrator, ui_loop))
            .await
            .context("UI loop thread failed")?;
    let report = RunReport::new(&cfg, outcome, lines);

    if args.json {
        if !args.silent {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    } else {
        for line in &report.status_lines {
            println!("{line}");
        }
    }

    if outcome.is_success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("reset did not complete: {outcome}"))
    }
}

/// Readiness, one trigger, then wait for the terminal line. Runs on the UI thread.
fn drive_single_reset(
    cfg: &ResetConfig,
    mut orchestrator: ResetOrchestrator,
    mut ui_loop: UiLoop,
) -> (Outcome, Vec<String>) {
    let mut surface = Surface::bound();
    let outcome = single_reset(cfg, &mut orchestrator, &mut ui_loop, &mut surface);
    orchestrator.release();

    let mut lines = surface.entries().to_vec();
    let text = surface.status_text();
    if lines.is_empty() || text != lines.join("\n") {
        // The status region was overwritten directly (readiness or system errors).
        lines = text.lines().map(str::to_string).collect();
    }
    (outcome, lines)
}

fn single_reset(
    cfg: &ResetConfig,
    orchestrator: &mut ResetOrchestrator,
    ui_loop: &mut UiLoop,
    surface: &mut Surface,
) -> Outcome {
    if let Err(e) = orchestrator.initialize(surface) {
        tracing::error!(error = %e, "readiness check failed");
        return match e {
            crate::orchestrator::ReadinessError::NotReady => Outcome::NotReady,
            _ => Outcome::ResourceMissing,
        };
    }
    while surface.state() == RunState::Initializing {
        if !ui_loop.run_next_blocking(surface) {
            return Outcome::ResourceMissing;
        }
    }
    if surface.state() == RunState::Unavailable {
        return Outcome::DeviceUnavailable;
    }

    tracing::debug!(class = %cfg.target.class, "triggering reset");
    match orchestrator.perform_reset(surface) {
        Trigger::NotReady => return Outcome::NotReady,
        Trigger::Ignored => return Outcome::DeviceUnavailable,
        Trigger::ResourceMissing | Trigger::Rejected | Trigger::Scheduled => {}
    }
    while surface.state() == RunState::Running {
        if !ui_loop.run_next_blocking(surface) {
            break;
        }
    }
    surface.last_outcome().unwrap_or(Outcome::DispatchFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("felica-reset").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_target_memory_clear_over_adb() {
        let cfg = build_config(&parse(&[])).unwrap();
        assert_eq!(cfg.target, TargetComponent::default());
        assert_eq!(cfg.transport, Transport::Adb { serial: None });
        assert!(cfg.probe_on_launch);
        assert!(!cfg.preflight);
        assert_eq!(cfg.probe_timeout, Duration::from_secs(3));
    }

    #[test]
    fn local_root_with_custom_timeout() {
        let cfg = build_config(&parse(&["--local", "--root", "--probe-timeout", "500ms"])).unwrap();
        assert_eq!(cfg.transport, Transport::Local);
        assert!(cfg.use_root);
        assert_eq!(cfg.probe_timeout, Duration::from_millis(500));
    }

    #[test]
    fn serial_conflicts_with_local() {
        let res = Cli::try_parse_from(["felica-reset", "--local", "--serial", "abc"]);
        assert!(res.is_err());
    }

    #[test]
    fn settings_uid_requires_root() {
        assert!(Cli::try_parse_from(["felica-reset", "--settings-uid"]).is_err());
        let cfg = build_config(&parse(&["--root", "--settings-uid"])).unwrap();
        assert!(cfg.use_root);
        assert!(cfg.settings_uid);
        assert!(!build_config(&parse(&["--root"])).unwrap().settings_uid);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(build_config(&parse(&["--probe-timeout", "0s"])).is_err());
    }

    #[tokio::test]
    async fn silent_requires_json() {
        let err = run(parse(&["--silent", "--text"])).await.unwrap_err();
        assert!(err.to_string().contains("--silent"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn headless_run_without_probe_reports_outcome() {
        // Host has no `cmd package`, so the target never resolves.
        if cfg!(target_os = "android") {
            return;
        }
        let cfg = build_config(&parse(&["--local", "--no-probe"])).unwrap();
        let (orchestrator, ui_loop) = build_orchestrator(&cfg, &Handle::current());
        let report_cfg = cfg.clone();
        let (outcome, lines) = tokio::task::spawn_blocking(move || {
            drive_single_reset(&report_cfg, orchestrator, ui_loop)
        })
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::ActivationFailure);
        assert_eq!(lines[0], "Reset starting…");
        let last = lines.last().unwrap();
        assert!(last.starts_with("Activation failed: cannot resolve"), "{last}");
        assert!(!lines.iter().any(|l| l.starts_with("Activation requested")));
    }
}
