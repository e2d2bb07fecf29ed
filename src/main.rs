use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use absence_capture::config::{self, Config};
use absence_capture::detect::RemoteDetector;
use absence_capture::device::DeviceClass;
use absence_capture::media::{list_devices, NativeMediaDevices};
use absence_capture::model::{FeatureModelLoader, ModelCache};
use absence_capture::surface::{Canvas, VideoElement};
use absence_capture::{CaptureSession, MediaResult};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;

/// Parse and validate a capture delay in milliseconds (0-60000)
fn parse_delay_ms(s: &str) -> Result<u64, String> {
    let ms: u64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid delay", s))?;
    if ms > 60_000 {
        return Err(format!("Delay must be at most 60000 ms, got {}", ms));
    }
    Ok(ms)
}

/// absence-capture: attendance photo capture
#[derive(Parser)]
#[command(name = "absence-capture")]
#[command(version, about = "Attendance photo capture from the front camera")]
#[command(after_help = "EXAMPLES:
    # List cameras
    absence-capture list-cameras

    # Take a photo with the default camera
    absence-capture snap --output photo.png

    # Force the mobile resolution and print the result as JSON
    absence-capture snap --mobile --json

    # Inspect the feature-extraction model served by the app
    absence-capture model-info --base-url http://localhost:8000/")]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    ListCameras,

    /// Enable the camera and capture one photo
    Snap {
        /// Output PNG path
        #[arg(short, long, default_value = "capture.png")]
        output: PathBuf,

        /// Camera device index (overrides config)
        #[arg(short, long)]
        device: Option<u32>,

        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Wait this long after the camera starts before capturing
        #[arg(long, default_value = "0", value_parser = parse_delay_ms)]
        delay_ms: u64,

        /// Use mobile constraints (360x270)
        #[arg(long, conflicts_with = "desktop")]
        mobile: bool,

        /// Use desktop constraints (640x480)
        #[arg(long)]
        desktop: bool,

        /// Print the capture result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch and describe the feature-extraction model definition
    ModelInfo {
        /// Site serving the model assets (overrides config and ABSENCE_BASE_URL)
        #[arg(long)]
        base_url: Option<String>,

        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Manage cached model definitions
    #[command(after_help = "EXAMPLES:
    absence-capture model-cache list          # List cached definitions
    absence-capture model-cache clear         # Remove all cached definitions
    absence-capture model-cache clear abc123  # Remove one by hash")]
    ModelCache {
        #[command(subcommand)]
        action: ModelCacheAction,
    },
}

#[derive(Subcommand)]
enum ModelCacheAction {
    /// List cached definitions with source URLs and sizes
    List,
    /// Clear cached definitions (all or by specific hash)
    Clear {
        /// Specific hash to clear (clears all if not provided)
        hash: Option<String>,
    },
}

/// Format a byte count for display
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn load_config(path: Option<&Path>) -> Result<Config, String> {
    let mut cfg = Config::load(path).map_err(|e| e.to_string())?;
    cfg.apply_env();
    Ok(cfg)
}

fn model_cache(cfg: &Config) -> ModelCache {
    match &cfg.model.cache_dir {
        Some(dir) => ModelCache::new(dir.clone()),
        None => ModelCache::with_default_dir(),
    }
}

fn run_list_cameras() -> Result<(), String> {
    let cameras = list_devices().map_err(|e| e.to_string())?;
    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }
    println!("Cameras:\n");
    for camera in &cameras {
        println!("  {}", camera);
    }
    Ok(())
}

struct SnapArgs {
    output: PathBuf,
    device: Option<u32>,
    config: Option<PathBuf>,
    delay_ms: u64,
    device_class: Option<DeviceClass>,
    json: bool,
}

fn run_snap(args: SnapArgs) -> Result<(), String> {
    let cfg = load_config(args.config.as_deref())?;

    let mut options = cfg.session_options();
    if args.device_class.is_some() {
        options.device_class = args.device_class;
    }

    let devices = NativeMediaDevices::new()
        .with_device_index(args.device.or(cfg.camera.device))
        .with_user_agent(cfg.camera.user_agent.clone());

    let mut session = CaptureSession::new(Arc::new(devices), options);
    if let Some(detector_config) = cfg.detector_config() {
        let detector = RemoteDetector::new(detector_config)
            .map_err(|e| format!("Failed to create face detector: {}", e))?;
        session = session.with_detector(Arc::new(detector));
    }

    let resolution = session.constraints().video.resolution();
    let interrupted = Arc::new(Notify::new());
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            eprintln!("\nReceived Ctrl+C, aborting capture...");
            interrupted.notify_one();
        })
        .map_err(|e| format!("Failed to set Ctrl+C handler: {}", e))?;
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    let result = rt.block_on(async {
        let video = Arc::new(VideoElement::new());
        let preview = Arc::new(Canvas::new(resolution.width, resolution.height));

        let snap = async {
            let enabled = session
                .enable(Arc::clone(&video), Arc::clone(&preview))
                .await
                .unwrap_or_else(MediaResult::ok);
            if !enabled.success {
                return Ok(enabled);
            }

            if args.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
            }

            let photo = Canvas::new(resolution.width, resolution.height);
            let captured = session
                .capture(&photo)
                .await
                .unwrap_or_else(|| MediaResult::failed("No video bound"));
            if captured.success {
                photo
                    .to_image()
                    .save(&args.output)
                    .map_err(|e| format!("Failed to save {}: {}", args.output.display(), e))?;
                log::info!("Saved photo to {}", args.output.display());
            }
            Ok::<_, String>(captured)
        };

        let result = tokio::select! {
            result = snap => result,
            _ = interrupted.notified() => Err("Capture aborted".to_string()),
        };
        video.stop();
        result
    })?;

    if args.json {
        let mut value = serde_json::to_value(&result).map_err(|e| e.to_string())?;
        if let Some(faces) = session.last_faces() {
            value["faces"] = serde_json::to_value(faces).map_err(|e| e.to_string())?;
        }
        println!("{}", value);
    } else if result.success {
        println!("Saved {}", args.output.display());
        if let Some(faces) = session.last_faces() {
            println!("Faces detected: {}", faces.len());
        }
    }

    match result.error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn run_model_info(base_url: Option<String>, config_path: Option<&Path>) -> Result<(), String> {
    let cfg = load_config(config_path)?;
    let base_url = base_url.unwrap_or_else(|| cfg.model.base_url.clone());

    let mut loader = FeatureModelLoader::new(base_url)
        .map_err(|e| format!("Failed to create model loader: {}", e))?
        .with_input_size(cfg.model.input_width, cfg.model.input_height);
    if cfg.model.cache {
        loader = loader.with_cache(model_cache(&cfg));
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;
    let definition = rt
        .block_on(loader.fetch_definition())
        .map_err(|e| e.to_string())?;

    println!("Model:       {}", loader.model_url());
    println!(
        "Format:      {}",
        definition.format.as_deref().unwrap_or("(unspecified)")
    );
    if let Some(converted_by) = &definition.converted_by {
        println!("Converted:   {}", converted_by);
    }
    println!("Weights:     {}", definition.weight_count());
    println!("Parameters:  {}", definition.parameter_count());
    println!("Shards:      {}", definition.weight_files().len());
    println!(
        "Input:       [1, {}, {}, 3]",
        cfg.model.input_height, cfg.model.input_width
    );
    Ok(())
}

fn run_model_cache(action: ModelCacheAction) -> Result<(), String> {
    let cfg = load_config(None)?;
    let cache = model_cache(&cfg);

    match action {
        ModelCacheAction::List => {
            let entries = cache
                .list()
                .map_err(|e| format!("Failed to list cache entries: {}", e))?;

            if entries.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }

            println!("Cached model definitions:\n");
            let mut total = 0;
            for entry in &entries {
                total += entry.size_bytes;
                println!(
                    "  {} {} {}",
                    entry.hash,
                    format_size(entry.size_bytes),
                    entry.url.as_deref().unwrap_or("(unknown source)")
                );
            }
            println!("\nTotal: {} definitions, {}", entries.len(), format_size(total));
            Ok(())
        }
        ModelCacheAction::Clear { hash: Some(h) } => {
            let removed = cache
                .remove(&h)
                .map_err(|e| format!("Failed to remove cached definition: {}", e))?;
            if removed {
                println!("Removed cached definition: {}", h);
            } else {
                println!("No cached definition found with hash: {}", h);
            }
            Ok(())
        }
        ModelCacheAction::Clear { hash: None } => {
            let count = cache
                .clear()
                .map_err(|e| format!("Failed to clear cache: {}", e))?;
            if count == 0 {
                println!("Cache is already empty.");
            } else {
                println!(
                    "Removed {} cached definition{}.",
                    count,
                    if count == 1 { "" } else { "s" }
                );
            }
            Ok(())
        }
    }
}

/// Load .env file. Does not override existing environment variables.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose);
    log::debug!("Default config path: {}", config::default_path().display());

    let result = match cli.command {
        Commands::ListCameras => run_list_cameras(),
        Commands::Snap {
            output,
            device,
            config,
            delay_ms,
            mobile,
            desktop,
            json,
        } => {
            let device_class = if mobile {
                Some(DeviceClass::Mobile)
            } else if desktop {
                Some(DeviceClass::Desktop)
            } else {
                None
            };
            run_snap(SnapArgs {
                output,
                device,
                config,
                delay_ms,
                device_class,
                json,
            })
        }
        Commands::ModelInfo { base_url, config } => run_model_info(base_url, config.as_deref()),
        Commands::ModelCache { action } => run_model_cache(action),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
