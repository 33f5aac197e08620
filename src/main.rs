use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nft_layout::{DeviceClass, Size};
use nft_overlay::capture::{FrameSource, ImageSequenceSource, SolidFrameSource};
use nft_overlay::config::{TrackerConfig, DEFAULT_CALIBRATION};
use nft_overlay::scene::{shared_node, SharedNode};
use nft_overlay::TrackingSession;
use nft_worker::replay::ReplayEngine;
use tracing_subscriber::{fmt, EnvFilter};

/// Headless NFT marker tracking:
/// - replays a recorded engine session (JSON lines)
/// - feeds it still images or synthetic frames at a fixed rate
/// - logs marker visibility as it changes
#[derive(Parser, Debug)]
#[command(name = "nft")]
#[command(about = "Run a marker-tracking session against a recorded engine")]
struct Args {
    /// Recorded engine session, one JSON event per line
    #[arg(long, env = "NFT_REPLAY")]
    replay: PathBuf,

    /// Restart the recording when it runs out of frame results
    #[arg(long)]
    loop_replay: bool,

    /// Marker slot as comma-separated candidate descriptors; repeat per slot
    #[arg(short, long = "marker", required = true, value_name = "URL[,URL...]")]
    markers: Vec<String>,

    /// Slot indices that stay visible after being lost
    #[arg(long = "persist", value_name = "SLOT")]
    persisted: Vec<usize>,

    /// Still images played as the video feed (all the same size)
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Size of synthetic frames when no images are given
    #[arg(long, default_value = "640x480", value_parser = parse_size)]
    video_size: Size,

    /// Camera-parameter asset passed to the engine
    #[arg(long, env = "NFT_CAMERA_PARA", default_value = DEFAULT_CALIBRATION)]
    calibration: String,

    #[arg(long, default_value_t = 10.0)]
    near: f64,

    #[arg(long, default_value_t = 100_000.0)]
    far: f64,

    /// Force the device class instead of inspecting the user agent
    #[arg(long, value_enum)]
    device: Option<DeviceClass>,

    #[arg(long, env = "NFT_USER_AGENT")]
    user_agent: Option<String>,

    /// Outer display width (mobile only)
    #[arg(long, default_value_t = 0.0)]
    display_width: f64,

    /// Render surface size, e.g. 1920x1080
    #[arg(long, value_parser = parse_size)]
    render_target: Option<Size>,

    #[arg(short = 'f', long, default_value_t = 30)]
    fps: u32,

    /// Stop after this long (e.g. 30s, 2m); runs until Ctrl-C otherwise
    #[arg(short, long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let builder = fmt().with_env_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    );
    if args.json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config = TrackerConfig {
        calibration: args.calibration.clone(),
        near: args.near,
        far: args.far,
        device: args.device,
        user_agent: args.user_agent.clone(),
        display_width: args.display_width,
        render_target: args.render_target,
        fps: args.fps,
        ..TrackerConfig::default()
    };
    config.validate().map_err(anyhow::Error::msg)?;

    let engine = ReplayEngine::from_path(&args.replay)?.looping(args.loop_replay);
    tracing::info!(replay = %args.replay.display(), frames = engine.frame_count(), "Replay loaded");

    let mut session = TrackingSession::builder()
        .with_config(config)
        .with_engine(engine)
        .build()
        .context("building tracking session")?;

    let mut nodes: Vec<SharedNode> = Vec::with_capacity(args.markers.len());
    for (slot, entry) in args.markers.iter().enumerate() {
        let candidates = parse_candidates(entry)?;
        let node = shared_node();
        session.register_marker(candidates, node.clone(), args.persisted.contains(&slot))?;
        nodes.push(node);
    }

    let mut source: Box<dyn FrameSource> = if args.images.is_empty() {
        Box::new(SolidFrameSource::new(args.video_size, [0, 0, 0, 255]))
    } else {
        Box::new(ImageSequenceSource::new(args.images.clone()))
    };

    let limit = args.duration;
    let shutdown = async move {
        match limit {
            Some(limit) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = tokio::time::sleep(limit) => {}
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };

    let stats = session
        .run(source.as_mut(), shutdown)
        .await
        .context("tracking session failed")?;

    for (slot, node) in nodes.iter().enumerate() {
        let node = node.read();
        tracing::info!(
            slot,
            visible = node.visible,
            updates = node.matrix_updates,
            "Final marker state"
        );
    }
    tracing::info!(?stats, "Done");
    Ok(())
}

/// Parse "WxH" into a size
fn parse_size(text: &str) -> Result<Size, String> {
    let (w, h) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Invalid size '{}': expected WIDTHxHEIGHT", text))?;
    let w = w.trim().parse::<u32>().map_err(|e| format!("Invalid width '{}': {}", w, e))?;
    let h = h.trim().parse::<u32>().map_err(|e| format!("Invalid height '{}': {}", h, e))?;
    Ok(Size { w, h })
}

/// Parse duration string like "30s", "2m", "1h"
fn parse_duration(text: &str) -> Result<Duration, String> {
    if let Ok(seconds) = text.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }
    if text.len() < 2 {
        return Err(format!("Invalid duration format: {}", text));
    }

    let (num, unit) = text.split_at(text.len() - 1);
    let num: u64 = num
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num))?;

    match unit {
        "s" => Ok(Duration::from_secs(num)),
        "m" => Ok(Duration::from_secs(num * 60)),
        "h" => Ok(Duration::from_secs(num * 3600)),
        _ => Err(format!(
            "Invalid duration unit: {}. Use 's' for seconds, 'm' for minutes, 'h' for hours",
            unit
        )),
    }
}

fn parse_candidates(entry: &str) -> Result<Vec<String>> {
    let candidates: Vec<String> = entry
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    anyhow::ensure!(!candidates.is_empty(), "marker '{}' lists no candidates", entry);
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), Size { w: 1280, h: 720 });
        assert_eq!(parse_size("640X480").unwrap(), Size { w: 640, h: 480 });
        assert!(parse_size("640").is_err());
        assert!(parse_size("ax480").is_err());
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn splits_candidates() {
        assert_eq!(parse_candidates("a, b,").unwrap(), vec!["a", "b"]);
        assert!(parse_candidates(" , ").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
