use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use nix::errno::Errno;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, kill, sigaction};
use nix::unistd::Pid;
use tracing::{info, warn};

use zoomcap::capture::{
    Backends, CaptureTarget, CliRecordingState, RecordingOutput, SessionController, SessionState,
    Termination, clear_cli_recording_state, pick_region_geometry, read_cli_recording_state,
    write_cli_recording_state,
};
use zoomcap::config::{CaptureRect, RecorderConfig, ZoomMode};
use zoomcap::logging::init_logging;

const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(50);
const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = 2;

static PAUSE_REQUESTED: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "zoomcap")]
#[command(about = "Screen recorder with cursor-following zoom")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start, stop or pause a recording
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Record in the foreground until stopped
    Start(StartArgs),
    /// Stop the recording started from the CLI
    Stop,
    /// Toggle pause on the recording started from the CLI
    Pause,
    /// Show the recording started from the CLI
    Status,
}

#[derive(Args)]
struct StartArgs {
    /// When to zoom: always, click-drag or smart
    #[arg(long, default_value = "always")]
    mode: ZoomMode,

    /// Zoom factor between 1.0 and 4.0
    #[arg(long, default_value_t = 2.0)]
    zoom: f64,

    /// Frames per second between 10 and 60
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Where recordings are written (default: Videos/ZoomedRecordings)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Also export a GIF next to the video
    #[arg(long)]
    gif: bool,

    /// Do not draw the cursor highlight ring
    #[arg(long)]
    no_highlight: bool,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Args)]
#[group(multiple = false)]
struct TargetArgs {
    /// Record a region given as "X,Y WxH"
    #[arg(long, value_name = "X,Y WxH")]
    region: Option<CaptureRect>,

    /// Record window bounds given as "LEFT,TOP,RIGHT,BOTTOM"
    #[arg(long, value_name = "L,T,R,B", value_parser = parse_window_bounds)]
    window: Option<CaptureTarget>,

    /// Pick a region interactively with slurp
    #[arg(long)]
    select: bool,
}

impl TargetArgs {
    fn resolve(&self) -> Result<CaptureTarget> {
        if let Some(rect) = self.region {
            return Ok(CaptureTarget::Region(rect));
        }
        if let Some(window) = self.window {
            return Ok(window);
        }
        if self.select {
            return Ok(CaptureTarget::Region(pick_region_geometry()?));
        }
        Ok(CaptureTarget::Fullscreen)
    }
}

fn parse_window_bounds(input: &str) -> Result<CaptureTarget, String> {
    let values = input
        .split(',')
        .map(|value| value.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("malformed window bounds `{input}`, expected `L,T,R,B`"))?;

    let [left, top, right, bottom] = values[..] else {
        return Err(format!("window bounds need four values, got {}", values.len()));
    };
    Ok(CaptureTarget::Window {
        left,
        top,
        right,
        bottom,
    })
}

/// Parses the command line, runs it and returns the process exit code.
pub fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() { EXIT_USAGE } else { 0 };
        }
    };

    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("failed to initialize logging: {err}");
    }

    let Commands::Record { action } = cli.command;
    let result = match action {
        RecordAction::Start(args) => record_start(args),
        RecordAction::Stop => record_stop(),
        RecordAction::Pause => record_pause(),
        RecordAction::Status => record_status(),
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err:#}");
            EXIT_FAILURE
        }
    }
}

fn record_start(args: StartArgs) -> Result<()> {
    if let Ok(state) = read_cli_recording_state() {
        if process_alive(state.pid) {
            bail!(
                "a recording started from the CLI is already running (pid {}), stop it first",
                state.pid
            );
        }
        warn!("removing stale recording state of pid {}", state.pid);
        clear_cli_recording_state();
    }

    let target = args.target.resolve()?;
    let mut config = RecorderConfig::new(args.mode)
        .with_zoom(args.zoom)
        .with_fps(args.fps)
        .with_gif(args.gif)
        .with_highlight(!args.no_highlight);
    if let Some(dir) = args.output_dir {
        config = config.with_output_dir(dir);
    }
    config.validate()?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_running.store(false, Ordering::SeqCst);
    })
    .context("failed to install the stop signal handler")?;
    install_pause_handler()?;

    let mut controller = SessionController::new(desktop_backends()?);
    controller.start(config, target)?;

    let output_path = controller
        .output_path()
        .map(Path::to_path_buf)
        .context("recording started without an output path")?;
    let state = CliRecordingState {
        pid: std::process::id(),
        output_path: output_path.clone(),
    };
    if let Err(err) = write_cli_recording_state(&state) {
        let _ = controller.stop();
        return Err(err);
    }

    println!(
        "Recording to {}\nPress Ctrl+C or run `zoomcap record stop` to finish, `zoomcap record pause` to pause or resume.",
        output_path.display()
    );

    let result = wait_for_stop(&mut controller, &running);
    clear_cli_recording_state();

    let Some(output) = result? else {
        bail!("recording produced no output");
    };
    report_output(&output)
}

fn wait_for_stop(
    controller: &mut SessionController,
    running: &AtomicBool,
) -> Result<Option<RecordingOutput>> {
    while running.load(Ordering::SeqCst) {
        if PAUSE_REQUESTED.swap(false, Ordering::SeqCst) {
            let paused = controller.toggle_pause();
            println!("{}", if paused { "Paused" } else { "Resumed" });
        }

        if controller.state() == SessionState::Stopped {
            warn!("recording ended before it was stopped");
            break;
        }

        thread::sleep(CONTROL_POLL_INTERVAL);
    }

    info!("stopping recording");
    Ok(controller.stop()?)
}

fn report_output(output: &RecordingOutput) -> Result<()> {
    println!(
        "Saved {} ({} frames)",
        output.video_path.display(),
        output.frames_written
    );
    if let Some(gif) = &output.gif_path {
        println!("Saved {}", gif.display());
    }

    match &output.termination {
        Termination::Stopped => Ok(()),
        Termination::CaptureFailed(reason) => bail!("screen capture failed: {reason}"),
        Termination::EncoderFailed(reason) => bail!("encoding failed: {reason}"),
    }
}

fn record_stop() -> Result<()> {
    let state =
        read_cli_recording_state().context("no recording started from the CLI is running")?;

    if !send_signal(state.pid, Signal::SIGINT)? {
        clear_cli_recording_state();
        bail!("recording process {} is gone, cleared its state", state.pid);
    }

    println!("Stopping recording, output: {}", state.output_path.display());
    Ok(())
}

fn record_pause() -> Result<()> {
    let state =
        read_cli_recording_state().context("no recording started from the CLI is running")?;

    if !send_signal(state.pid, Signal::SIGUSR1)? {
        clear_cli_recording_state();
        bail!("recording process {} is gone, cleared its state", state.pid);
    }

    println!("Toggled pause on pid {}", state.pid);
    Ok(())
}

fn record_status() -> Result<()> {
    match read_cli_recording_state() {
        Ok(state) if process_alive(state.pid) => {
            println!(
                "Recording (pid {}) to {}",
                state.pid,
                state.output_path.display()
            );
        }
        Ok(_) => {
            clear_cli_recording_state();
            println!("No recording in progress");
        }
        Err(_) => println!("No recording in progress"),
    }
    Ok(())
}

/// Returns false when the process no longer exists.
fn send_signal(pid: u32, signal: Signal) -> Result<bool> {
    let pid = Pid::from_raw(i32::try_from(pid).context("pid out of range")?);
    match kill(pid, signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(err) => bail!("failed to send {signal:?} to pid {pid}: {err}"),
    }
}

fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    matches!(kill(Pid::from_raw(raw), None::<Signal>), Ok(()) | Err(Errno::EPERM))
}

extern "C" fn request_pause(_: nix::libc::c_int) {
    PAUSE_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_pause_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(request_pause),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe { sigaction(Signal::SIGUSR1, &action) }
        .context("failed to install the pause signal handler")?;
    Ok(())
}

#[cfg(feature = "desktop")]
fn desktop_backends() -> Result<Backends> {
    Ok(Backends::desktop())
}

#[cfg(not(feature = "desktop"))]
fn desktop_backends() -> Result<Backends> {
    bail!("this build has no screen capture support, rebuild with `--features desktop`")
}
