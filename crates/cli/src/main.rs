mod settings;

use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::thread;

use clap::Parser;
use crossbeam_channel::{Receiver, TryRecvError};

use live_detect_core::capture::capture_controller::CaptureController;
use live_detect_core::capture::domain::media_devices::VideoInputDevice;
use live_detect_core::capture::infrastructure::ffmpeg_media_devices::FfmpegMediaDevices;
use live_detect_core::detection::domain::object_detector::ObjectDetector;
use live_detect_core::detection::infrastructure::model_resolver;
use live_detect_core::detection::infrastructure::onnx_ssd_detector::OnnxSsdDetector;
use live_detect_core::overlay::domain::overlay_surface::DisplaySize;
use live_detect_core::overlay::infrastructure::scene_overlay_surface::SceneOverlaySurface;
use live_detect_core::pipeline::detection_loop::{DetectionLoop, FailurePolicy};
use live_detect_core::pipeline::frame_clock::{FrameClock, IntervalFrameClock};
use live_detect_core::pipeline::live_view::LiveView;
use live_detect_core::pipeline::loop_logger::LogLoopLogger;
use live_detect_core::shared::constants::{SSD_MODEL_NAME, SSD_MODEL_URL};

use settings::LiveViewSettings;

/// Live webcam object detection with overlay annotations.
#[derive(Parser)]
#[command(name = "live-detect")]
struct Cli {
    /// List video input devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Capture device to use instead of probing (repeatable; the first is
    /// the front camera, the last the back camera).
    #[arg(long = "device")]
    devices: Vec<String>,

    /// Local SSD-MobileNet ONNX model (downloaded on first use otherwise).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Display refresh rate the detection loop runs at.
    #[arg(long)]
    fps: Option<f64>,

    /// Rendered live-view width (defaults to the native frame width).
    #[arg(long, requires = "display_height")]
    display_width: Option<f64>,

    /// Rendered live-view height (defaults to the native frame height).
    #[arg(long, requires = "display_width")]
    display_height: Option<f64>,

    /// Run detection on a background thread.
    #[arg(long)]
    worker: bool,

    /// Stop detecting on the first model failure instead of retrying.
    #[arg(long)]
    halt_on_error: bool,

    /// Settings file (defaults to the user config directory).
    #[arg(long)]
    settings: Option<PathBuf>,
}

/// Interactive controls read from stdin.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Enable,
    Switch,
    Stop,
    Quit,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" => None,
            "e" => Some(Command::Enable),
            "s" => Some(Command::Switch),
            "x" => Some(Command::Stop),
            "q" => Some(Command::Quit),
            other => Some(Command::Unknown(other.to_string())),
        }
    }
}

type DetectorResult = Result<Box<dyn ObjectDetector>, String>;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = effective_settings(&cli)?;

    let media_devices = if cli.devices.is_empty() {
        FfmpegMediaDevices::new()
    } else {
        FfmpegMediaDevices::with_devices(
            cli.devices
                .iter()
                .map(|id| VideoInputDevice::new(id.as_str(), ""))
                .collect(),
        )
    };
    let capture = CaptureController::new(Box::new(media_devices))
        .with_resolution(settings.ideal_width, settings.ideal_height);

    if cli.list_devices {
        for device in capture.list_video_inputs() {
            println!("{}\t{}", device.id, device.label);
        }
        return Ok(());
    }

    let fixed_display = match (settings.display_width, settings.display_height) {
        (Some(w), Some(h)) => Some(DisplaySize::new(w, h)),
        _ => None,
    };
    let initial_size = fixed_display.unwrap_or(DisplaySize::new(
        settings.ideal_width as f64,
        settings.ideal_height as f64,
    ));
    let detection_loop = DetectionLoop::new(SceneOverlaySurface::new(initial_size))
        .with_policy(settings.failure_policy)
        .with_logger(Box::new(LogLoopLogger::default()));
    let mut live = LiveView::new(capture, detection_loop)
        .with_worker(settings.detect_on_worker)
        .with_frame_size_follow(fixed_display.is_none());

    let model_rx = load_model_in_background(settings.model_path.clone());
    let command_rx = read_commands();
    let mut clock = IntervalFrameClock::new(settings.refresh_hz);
    let mut last_revision = 0;

    eprintln!("Loading model...");
    'refresh: loop {
        match model_rx.try_recv() {
            Ok(Ok(detector)) => {
                live.attach_model(detector);
                print_controls(&live);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {}
        }

        loop {
            match command_rx.try_recv() {
                Ok(Command::Enable) => {
                    if !live.model_ready() {
                        eprintln!("Model is still loading");
                    }
                    live.enable();
                }
                Ok(Command::Switch) => {
                    live.switch_camera();
                }
                Ok(Command::Stop) => live.stop(),
                Ok(Command::Quit) | Err(TryRecvError::Disconnected) => break 'refresh,
                Ok(Command::Unknown(s)) => eprintln!("Unknown command '{s}' (e, s, x, q)"),
                Err(TryRecvError::Empty) => break,
            }
        }

        for notice in live.take_notices() {
            eprintln!("{notice}");
        }

        if let Err(e) = live.tick() {
            eprintln!("{e}");
            live.stop();
        }

        let scene = live.detection_loop().surface();
        if scene.revision() != last_revision {
            last_revision = scene.revision();
            print_scene(scene);
        }

        clock.wait_next();
    }

    live.stop();
    live.detection_loop().logger().summary();
    Ok(())
}

fn effective_settings(cli: &Cli) -> Result<LiveViewSettings, Box<dyn std::error::Error>> {
    let mut settings = match cli.settings.clone().or_else(LiveViewSettings::default_path) {
        Some(path) => LiveViewSettings::load_from(&path)?,
        None => LiveViewSettings::default(),
    };
    if let Some(fps) = cli.fps {
        settings.refresh_hz = fps;
    }
    if cli.display_width.is_some() {
        settings.display_width = cli.display_width;
        settings.display_height = cli.display_height;
    }
    if cli.worker {
        settings.detect_on_worker = true;
    }
    if cli.halt_on_error {
        settings.failure_policy = FailurePolicy::Halt;
    }
    if cli.model.is_some() {
        settings.model_path = cli.model.clone();
    }
    settings.validate()?;
    Ok(settings)
}

fn load_model_in_background(model_path: Option<PathBuf>) -> Receiver<DetectorResult> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let _ = tx.send(load_detector(model_path));
    });
    rx
}

fn load_detector(model_path: Option<PathBuf>) -> DetectorResult {
    log::info!("Resolving model: {SSD_MODEL_NAME}");
    let path = model_resolver::resolve(
        SSD_MODEL_NAME,
        SSD_MODEL_URL,
        model_path.as_deref(),
        Some(Box::new(download_progress)),
    )
    .map_err(|e| e.to_string())?;
    let detector = OnnxSsdDetector::new(&path).map_err(|e| e.to_string())?;
    Ok(Box::new(detector))
}

fn read_commands() -> Receiver<Command> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if let Some(command) = Command::parse(&line) {
                if tx.send(command).is_err() {
                    break;
                }
            }
        }
        let _ = tx.send(Command::Quit);
    });
    rx
}

fn print_controls(live: &LiveView<SceneOverlaySurface>) {
    let controls = live.controls();
    let activation = if controls.activation.enabled {
        format!("[e] {}", controls.activation.caption)
    } else {
        controls.activation.caption.clone()
    };
    eprintln!(
        "{activation}  [s] {}  [x] Stop  [q] Quit",
        controls.switch.caption
    );
}

fn print_scene(scene: &SceneOverlaySurface) {
    let lines = scene.describe();
    println!("--- overlay: {} nodes ---", lines.len());
    for line in lines {
        println!("{line}");
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading object detection model... {pct}%");
    } else {
        eprint!("\rDownloading object detection model... {downloaded} bytes");
    }
}
