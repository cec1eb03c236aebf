//! hmd CLI tools: headless session runs, backend listing.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hmd_common::helpers::env_bool;
use hmd_vr::sim::HeadlessEngine;
use hmd_vr::{Backend, DriverRegistry, SessionConfig, SessionController};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hmd")]
#[command(about = "HMD stereo session tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a headless session against the simulated driver
    Run(RunArgs),

    /// List supported backends
    Backends,

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// JSON session config file; flags below override it
    #[arg(short, long, env = "HMD_CONFIG")]
    config: Option<PathBuf>,

    /// Backend name (see `hmd backends`)
    #[arg(short, long, env = "HMD_BACKEND")]
    backend: Option<String>,

    /// Number of frames to run
    #[arg(short = 'n', long, env = "HMD_TICKS", default_value_t = 300)]
    ticks: u64,

    /// Start with the desktop mirror enabled (also HMD_MIRROR=1)
    #[arg(long)]
    mirror: bool,

    /// Mirror quad scale in (0, 1]
    #[arg(long, env = "HMD_MIRROR_SCALE")]
    mirror_scale: Option<f32>,

    /// Log full error traces (also HMD_VERBOSE=1)
    #[arg(short, long)]
    verbose: bool,

    /// Scene camera the eyes render from
    #[arg(long, env = "HMD_CAMERA")]
    camera: Option<String>,

    /// Engine logic tick rate
    #[arg(long, env = "HMD_TICK_RATE")]
    tick_rate: Option<u32>,

    /// World units per tracker meter
    #[arg(long, env = "HMD_UNIT_SCALE")]
    unit_scale: Option<f32>,

    /// Re-center the tracker on this frame
    #[arg(long)]
    recenter_at: Option<u64>,

    /// Toggle the mirror on this frame
    #[arg(long)]
    toggle_mirror_at: Option<u64>,

    /// Sleep between frames to hold the tick rate
    #[arg(long)]
    realtime: bool,
}

impl RunArgs {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config: SessionConfig = match &self.config {
            Some(path) => hmd_common::config::load_json(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(backend) = &self.backend {
            config.backend = backend.clone();
        }
        if self.mirror || env_bool("HMD_MIRROR", false) {
            config.mirror = true;
        }
        if let Some(scale) = self.mirror_scale {
            config.mirror_scale = scale;
        }
        if self.verbose || env_bool("HMD_VERBOSE", false) {
            config.verbose = true;
        }
        if let Some(camera) = &self.camera {
            config.camera = camera.clone();
        }
        if let Some(rate) = self.tick_rate {
            config.logic_tick_rate = rate;
        }
        if self.unit_scale.is_some() {
            config.unit_scale = self.unit_scale;
        }
        Ok(config)
    }
}

#[derive(Debug, Default)]
struct RunStats {
    frames: u64,
    submitted: u64,
    pose_misses: u64,
    eyes_rendered: u64,
}

fn run(args: RunArgs) -> Result<()> {
    let config = args.session_config()?;
    info!("session config: {:?}", config);

    let mut session = SessionController::new(
        HeadlessEngine::new(),
        config.clone(),
        Arc::new(DriverRegistry::simulated()),
    );
    session
        .start()
        .with_context(|| format!("failed to start \"{}\" session", config.backend))?;

    let frame_budget = Duration::from_secs_f64(1.0 / f64::from(config.logic_tick_rate));
    let started = Instant::now();
    let mut stats = RunStats::default();

    for frame in 0..args.ticks {
        let frame_start = Instant::now();

        if args.recenter_at == Some(frame) {
            match session.re_center() {
                Ok(true) => info!("re-centered at frame {}", frame),
                Ok(false) => warn!("driver ignored re-center at frame {}", frame),
                Err(e) => warn!("re-center failed: {}", e),
            }
        }
        if args.toggle_mirror_at == Some(frame) {
            let active = session.toggle_mirror();
            info!("mirror {} at frame {}", if active { "on" } else { "off" }, frame);
        }

        let outcome = session.tick()?;
        stats.frames += 1;
        stats.submitted += u64::from(outcome.submitted);
        stats.pose_misses += u64::from(!outcome.pose_updated);
        stats.eyes_rendered += u64::from(outcome.eyes_rendered);

        if session.should_exit() {
            warn!("fatal error reported, stopping at frame {}", frame);
            break;
        }
        if args.realtime {
            if let Some(rest) = frame_budget.checked_sub(frame_start.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    let mirrored = session.use_mirror();
    let non_fatal = session.log().non_fatal_count();
    let fatal = session.should_exit();
    session.shutdown();

    let summary = serde_json::json!({
        "backend": config.backend,
        "frames": stats.frames,
        "submitted": stats.submitted,
        "dropped": stats.frames - stats.submitted,
        "pose_misses": stats.pose_misses,
        "eyes_rendered": stats.eyes_rendered,
        "non_fatal_errors": non_fatal,
        "fatal": fatal,
        "mirror": mirrored,
        "elapsed_ms": started.elapsed().as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if fatal {
        anyhow::bail!("session ended with a fatal error");
    }
    Ok(())
}

fn main() -> Result<()> {
    hmd_common::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Run(run_args) => run(run_args)?,
        Command::Backends => {
            for backend in Backend::ALL {
                println!(
                    "{:<14} {:<20} {:<9} {}",
                    backend.name(),
                    backend.device_name(),
                    if backend.is_direct_mode() {
                        "direct"
                    } else {
                        "extended"
                    },
                    backend.binding()
                );
            }
        }
        Command::Version => {
            println!("hmd {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> RunArgs {
        let mut full = vec!["hmd", "run"];
        full.extend_from_slice(argv);
        match Args::try_parse_from(full).unwrap().command {
            Command::Run(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&[
            "--backend",
            "oculus_legacy",
            "--mirror",
            "--mirror-scale",
            "0.5",
            "--tick-rate",
            "90",
            "--unit-scale",
            "100",
        ]);
        let config = args.session_config().unwrap();
        assert_eq!(config.backend, "oculus_legacy");
        assert!(config.mirror);
        assert_eq!(config.mirror_scale, 0.5);
        assert_eq!(config.logic_tick_rate, 90);
        assert_eq!(config.unit_scale, Some(100.0));
        assert_eq!(config.camera, "Camera.VR");
    }

    #[test]
    fn test_short_run_succeeds() {
        let args = parse(&["--ticks", "5", "--recenter-at", "2", "--toggle-mirror-at", "3"]);
        run(args).unwrap();
    }

    #[test]
    fn test_unknown_backend_fails_to_start() {
        let args = parse(&["--backend", "vive", "--ticks", "1"]);
        let err = run(args).unwrap_err();
        assert!(format!("{err:#}").contains("vive"));
    }
}
