use anyhow::{Context, Result};
use clap::Parser;
use depth_preview::capture::{
    configure_device, select_format, CaptureDevice, DiscoveryQuery, SimulatedDualCamera,
    SimulatedScene,
};
use depth_preview::output::{LoopbackOutput, PngSequenceOutput, PresentationSurface};
use depth_preview::presenter::{run_presentation_loop, DepthPresenter, DisplayModeSwitch};
use depth_preview::session::{build_session, SessionOptions};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of frames to present before exiting
    #[arg(short, long, default_value_t = 90)]
    frames: u64,

    /// Start in disparity mode instead of depth mode
    #[arg(long)]
    disparity: bool,

    /// Flip between depth and disparity every N presented frames (0 = never)
    #[arg(long, default_value_t = 0)]
    toggle_every: u64,

    /// Directory for the PNG preview sequence
    #[arg(short, long, default_value = "depth-frames")]
    output_dir: String,

    /// Present on a v4l2loopback device instead of writing PNGs
    #[arg(long)]
    loopback_device: Option<String>,

    /// Fill samples without depth before delivery
    #[arg(long)]
    filtering: bool,

    /// Queue depth frames that arrive while the previous one is still being handled
    /// instead of dropping them
    #[arg(long)]
    keep_late: bool,

    /// Deliver simulated frames as fast as possible instead of in real time
    #[arg(long)]
    unpaced: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("depth-preview starting");

    let devices: Vec<Arc<dyn CaptureDevice>> = vec![Arc::new(
        SimulatedDualCamera::new("sim-dual-back").with_scene(SimulatedScene {
            paced: !args.unpaced,
            frame_limit: None,
        }),
    )];

    let device = DiscoveryQuery::back_dual_camera()
        .discover(&devices)
        .context("No back dual camera available")?;

    let (format, depth_format) =
        select_format(device.as_ref()).context("Device cannot stream 32-bit float depth")?;

    configure_device(device.as_ref(), &format, &depth_format)
        .context("Failed to configure capture device")?;

    let mode = DisplayModeSwitch::new(args.disparity);
    let (presenter, images) = DepthPresenter::new(mode.clone());
    let dropped = presenter.dropped_frames();

    let options = SessionOptions {
        filtering_enabled: args.filtering,
        discards_late_depth_data: !args.keep_late,
        ..SessionOptions::default()
    };
    let mut session = build_session(device, &format, &depth_format, presenter, &options)
        .context("Failed to build capture session")?;

    let mut surface: Box<dyn PresentationSurface> = match &args.loopback_device {
        Some(path) => {
            let (width, height) = (depth_format.dimensions.height, depth_format.dimensions.width);
            Box::new(
                LoopbackOutput::new(path, width, height)
                    .context("Failed to initialize v4l2loopback output")?,
            )
        }
        None => Box::new(
            PngSequenceOutput::new(&args.output_dir).context("Failed to initialize PNG output")?,
        ),
    };

    session
        .start_running()
        .context("Failed to start capture session")?;

    tracing::info!(
        "Presenting {} frames in {} mode",
        args.frames,
        if args.disparity { "disparity" } else { "depth" }
    );

    let started = Instant::now();
    let result = run_presentation_loop(
        &images,
        surface.as_mut(),
        Some(args.frames),
        |image, presented| {
            // Log stats every 30 frames
            if presented % 30 == 0 {
                let fps = presented as f64 / started.elapsed().as_secs_f64();
                tracing::info!(
                    "Frame {}: t={:.3}s, {:?}, fps={:.1}",
                    presented,
                    image.timestamp.as_secs_f64(),
                    image.encoding,
                    fps
                );
            }

            if let Some(disparity) = mode.toggle_after(presented, args.toggle_every) {
                tracing::info!(
                    "Switched to {} mode",
                    if disparity { "disparity" } else { "depth" }
                );
            }
        },
    );

    session
        .stop_running()
        .context("Failed to stop capture session")?;
    let presented = result?;

    tracing::info!(
        "Presented {} frames, {} dropped before presentation",
        presented,
        dropped.load(Ordering::Relaxed)
    );

    Ok(())
}
