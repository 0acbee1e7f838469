use std::{path::PathBuf, time::Duration};

use clap::Parser;
use kms_overlay::{
    backend::drm::DrmDeviceFd,
    presenter::{self, OverlayPresenter, PresenterConfig, DEFAULT_DEVICE},
};
use tracing::info;

mod pattern;

use pattern::{PatternFormat, TestPattern};

/// Play a generated test pattern on a drm overlay plane
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Drm node to present on
    #[arg(long, default_value = DEFAULT_DEVICE)]
    device: PathBuf,
    /// Id of a plane to make transparent, for example a primary plane covering the overlay
    #[arg(long)]
    disable_plane: Option<u32>,
    /// Give up if no page flip arrives within this many milliseconds
    #[arg(long)]
    flip_timeout_ms: Option<u64>,
    /// Frame size in pixels
    #[arg(long, default_value = "1280x720", value_parser = size_from_string)]
    size: (u32, u32),
    /// Amount of frames to show
    #[arg(long, default_value_t = 300)]
    frames: u64,
    /// Run until interrupted
    #[arg(long, conflicts_with = "frames")]
    forever: bool,
    /// Pixel format of the frames
    #[arg(long, value_enum, default_value_t = PatternFormat::Nv12)]
    format: PatternFormat,
}

fn size_from_string(size: &str) -> Result<(u32, u32), String> {
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", size))?;
    let w = w.parse::<u32>().map_err(|err| format!("invalid width: {}", err))?;
    let h = h.parse::<u32>().map_err(|err| format!("invalid height: {}", err))?;
    Ok((w, h))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    if let Ok(env_filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().init();
    }

    let config = PresenterConfig {
        device: args.device.clone(),
        blank_plane: args.disable_plane,
        flip_timeout: args.flip_timeout_ms.map(Duration::from_millis),
    };
    // the first opener of a node becomes drm master, that has to be the presenter
    let fd = DrmDeviceFd::open(&args.device)?;
    let mut presenter = OverlayPresenter::with_device(config, fd);
    let limit = (!args.forever).then_some(args.frames);
    let mut source = TestPattern::new(&args.device, args.format, args.size, limit)?;

    let stats = presenter::run(&mut source, &mut presenter)?;
    info!(
        "Presented {} frames, dropped {}",
        stats.presented, stats.dropped
    );
    Ok(())
}
