//! firewatchd - live fire detection daemon
//!
//! This daemon:
//! 1. Loads configuration (JSON file plus FIREWATCH_* overrides)
//! 2. Builds a detection session over the configured camera
//! 3. Serves the loopback control API (start/stop/stats/latest frame)
//! 4. Optionally starts detection right away and streams per-frame records as JSON lines

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::{mpsc, Arc};

use firewatch::{
    api::{ApiConfig, ApiServer},
    config::FirewatchConfig,
    CameraSource, DetectionSession, FanoutSink, FireDetector, FrameSink, FrameSource,
    JsonLinesSink, LatestFrameSink,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Wait for POST /api/start_detection instead of starting immediately.
    #[arg(long)]
    no_autostart: bool,
    /// Write one JSON record per processed frame to stdout.
    #[arg(long)]
    jsonl: bool,
    /// Override the control API listen address.
    #[arg(long, value_name = "ADDR")]
    api_addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = FirewatchConfig::load()?;

    let latest = Arc::new(LatestFrameSink::new());
    let mut sinks: Vec<Arc<dyn FrameSink>> = vec![latest.clone()];
    if args.jsonl {
        sinks.push(Arc::new(JsonLinesSink::new(std::io::stdout())));
    }
    let sink: Arc<dyn FrameSink> = Arc::new(FanoutSink::new(sinks));

    let camera = config.camera_config();
    log::info!(
        "camera {} at {}x{} ({} fps), frame interval {:?}",
        camera.device,
        camera.width,
        camera.height,
        camera.target_fps,
        config.frame_interval
    );
    let session = Arc::new(DetectionSession::new(
        move || Ok(Box::new(CameraSource::new(camera.clone())) as Box<dyn FrameSource>),
        Arc::new(FireDetector::new()),
        sink,
        config.session_config(),
    ));

    let api_config = ApiConfig {
        addr: args.api_addr.unwrap_or_else(|| config.api_addr.clone()),
    };
    let api_handle = ApiServer::new(api_config, session.clone(), latest).spawn()?;
    log::info!("control api listening on {}", api_handle.addr);

    if args.no_autostart {
        log::info!("autostart disabled; waiting for POST /api/start_detection");
    } else if let Err(err) = session.start() {
        // The API stays up so the operator can retry once the camera is back.
        log::error!("detection did not start: {}", err);
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    log::info!("firewatchd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping detection and API server...");
    session.stop()?;
    api_handle.stop()?;

    let stats = session.stats();
    log::info!(
        "firewatchd stopped: frames={} fire_frames={} alerts={}",
        stats.total_frames,
        stats.fire_detected_frames,
        stats.alerts_sent
    );
    Ok(())
}
