//! codescan: barcode and QR scanning from images or a V4L2 camera

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tracing::{info, trace};
use tracing_subscriber::EnvFilter;

use codescan::camera::{AdaptiveCameraConfig, TerminalBell};
use codescan::capture::ReplayProvider;
use codescan::detect::{CodeFormat, DetectedSymbol};
use codescan::display::RasterCanvas;
use codescan::pipeline::MainThread;
use codescan::scanner::{ScanHandler, ScannerController};
use codescan::Config;

#[derive(Parser)]
#[command(name = "codescan", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode the symbols in an image file
    Scan {
        image: PathBuf,

        /// Write the image with the viewfinder overlay drawn on top
        #[arg(long)]
        overlay: Option<PathBuf>,

        #[arg(long, value_enum)]
        format: Option<CodeFormat>,

        /// Feed the image through the live camera path instead of the still path
        #[arg(long)]
        replay: bool,

        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },

    /// Scan continuously from a V4L2 camera
    #[cfg(feature = "v4l2")]
    Live {
        /// Capture node, e.g. /dev/video0; auto-detected when omitted
        #[arg(long)]
        device: Option<String>,

        #[arg(long, default_value_t = 0)]
        rotation: u32,

        #[arg(long, value_enum)]
        format: Option<CodeFormat>,
    },
}

enum Scan {
    Found(Vec<DetectedSymbol>),
    Failed,
}

struct ChannelHandler(flume::Sender<Scan>);

impl ChannelHandler {
    fn send(&self, scan: Scan) {
        if self.0.send(scan).is_err() {
            trace!("scan receiver gone, dropping event");
        }
    }
}

impl ScanHandler for ChannelHandler {
    fn on_scan_result(&mut self, symbol: &DetectedSymbol) {
        self.send(Scan::Found(vec![symbol.clone()]));
    }

    fn on_choice_required(&mut self, symbols: &[DetectedSymbol]) {
        self.send(Scan::Found(symbols.to_vec()));
    }

    fn on_scan_failure(&mut self) {
        self.send(Scan::Failed);
    }
}

fn print_symbols(symbols: &[DetectedSymbol]) {
    for symbol in symbols {
        let b = symbol.bounds;
        println!(
            "{:?}\t{:.0},{:.0},{:.0},{:.0}\t{}",
            symbol.format, b.left, b.top, b.right, b.bottom, symbol.text
        );
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codescan=info")))
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Command::Scan {
            image,
            overlay,
            format,
            replay,
            timeout_ms,
        } => {
            if let Some(format) = format {
                config.scanner.format = format;
            }
            scan(&config, &runtime, image, overlay, replay, Duration::from_millis(timeout_ms))
        }
        #[cfg(feature = "v4l2")]
        Command::Live {
            device,
            rotation,
            format,
        } => {
            if let Some(format) = format {
                config.scanner.format = format;
            }
            live(&config, &runtime, device, rotation)
        }
    }
}

fn scan(
    config: &Config,
    runtime: &tokio::runtime::Runtime,
    path: PathBuf,
    overlay: Option<PathBuf>,
    replay: bool,
    timeout: Duration,
) -> Result<()> {
    let image = image::open(&path).map_err(|e| eyre!("failed to open {}: {e}", path.display()))?;
    info!(path = %path.display(), width = image.width(), height = image.height(), replay, "scanning image");

    let main = MainThread::new();
    let (tx, rx) = flume::unbounded();
    let provider = Arc::new(ReplayProvider::new(&image, config.pipeline.replay_interval())?);
    let camera_config = Arc::new(AdaptiveCameraConfig::new(
        config.camera.display_width,
        config.camera.display_height,
        config.camera.lens_facing,
    ));
    let mut controller = ScannerController::new(
        config,
        provider,
        camera_config,
        main.handle(),
        ChannelHandler(tx),
        runtime.handle().clone(),
    )?;
    if config.scanner.play_beep {
        controller.session().set_feedback_sink(Box::new(TerminalBell));
    }

    // The view is the image itself, so result points land on the symbols.
    controller.resize(image.width(), image.height());
    if replay {
        controller.on_create();
    }
    controller.on_start();
    controller.on_resume();
    if !replay {
        controller.analyze_image(image.clone());
    }

    let mut found = None;
    let mut failed = false;
    main.run_until(timeout, || {
        while let Ok(scan) = rx.try_recv() {
            match scan {
                Scan::Found(symbols) => found = Some(symbols),
                Scan::Failed => failed = !replay,
            }
        }
        found.is_some() || failed
    });

    if let Some(out) = &overlay {
        let mut canvas = RasterCanvas::from_image(image.to_rgba8());
        controller.draw(&mut canvas);
        canvas.into_image().save(out)?;
        info!(path = %out.display(), "overlay written");
    }

    controller.on_pause();
    controller.on_stop();
    controller.on_destroy();

    match found {
        Some(symbols) => {
            print_symbols(&symbols);
            Ok(())
        }
        None => Err(eyre!("no symbol found in {}", path.display())),
    }
}

#[cfg(feature = "v4l2")]
fn live(config: &Config, runtime: &tokio::runtime::Runtime, device: Option<String>, rotation: u32) -> Result<()> {
    use std::sync::atomic::{AtomicBool, Ordering};

    use codescan::capture::v4l2::V4l2Provider;

    let main = MainThread::new();
    let (tx, rx) = flume::unbounded();
    let camera_config = Arc::new(AdaptiveCameraConfig::new(
        config.camera.display_width,
        config.camera.display_height,
        config.camera.lens_facing,
    ));
    let mut controller = ScannerController::new(
        config,
        Arc::new(V4l2Provider::new(device, rotation)),
        camera_config,
        main.handle(),
        ChannelHandler(tx),
        runtime.handle().clone(),
    )?;
    if config.scanner.play_beep {
        controller.session().set_feedback_sink(Box::new(TerminalBell));
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                running.store(false, Ordering::Release);
            }
        });
    }

    controller.on_create();
    controller.on_start();
    controller.on_resume();
    if controller.session().camera().is_none() {
        controller.on_destroy();
        return Err(eyre!("no camera bound"));
    }
    info!("scanning, press Ctrl-C to stop");

    while running.load(Ordering::Acquire) {
        main.run_for(Duration::from_millis(100));
        while let Ok(scan) = rx.try_recv() {
            if let Scan::Found(symbols) = scan {
                print_symbols(&symbols);
                controller.resume_scanning();
            }
        }
    }

    info!("interrupted, shutting down");
    controller.on_pause();
    controller.on_stop();
    controller.on_destroy();
    Ok(())
}
