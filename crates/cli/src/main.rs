use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use signwatch_core::annotation::infrastructure::imageproc_annotator::ImageprocAnnotator;
use signwatch_core::detection::domain::arbitration::{
    ArbitrationEngine, AreaScorer, CandidateScorer, PositionalScorer,
};
use signwatch_core::detection::domain::detection_pass::{
    install_detector_panic_hook, ExecutionMode,
};
use signwatch_core::detection::domain::detector_registry::SharedRegistry;
use signwatch_core::detection::infrastructure::registry_config::RegistryConfig;
use signwatch_core::detection::infrastructure::registry_factory::build_registry;
use signwatch_core::pipeline::detect_signs_use_case::DetectSignsUseCase;
use signwatch_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use signwatch_core::pipeline::pipeline_executor::{
    PipelineConfig, PipelineExecutor, PipelineStats, ProgressCallback,
};
use signwatch_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use signwatch_core::publication::infrastructure::directory_publisher::DirectoryPublisher;
use signwatch_core::publication::infrastructure::jpeg_frame_encoder::JpegFrameEncoder;
use signwatch_core::publication::publication_adapter::PublicationAdapter;
use signwatch_core::shared::constants::DEFAULT_JPEG_QUALITY;
use signwatch_core::video::domain::frame_source::FrameSource;
use signwatch_core::video::infrastructure::image_sequence_reader::ImageSequenceReader;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scoring {
    /// Product of the region's top-left coordinates.
    Positional,
    /// Region area.
    Area,
}

/// Traffic sign detection and annotation for camera frames.
#[derive(Parser)]
#[command(name = "signwatch")]
struct Cli {
    /// Input image file or directory of frames.
    input: Option<PathBuf>,

    /// Output directory for annotated frames and labels.csv.
    output: Option<PathBuf>,

    /// Registry configuration (JSON). Defaults to the built-in sign classes.
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Directory holding the built-in classes' cascade files.
    #[arg(long, default_value = "cascades")]
    cascade_dir: PathBuf,

    /// Labels to enable (comma-separated).
    #[arg(long, value_delimiter = ',')]
    enable: Vec<String>,

    /// Labels to disable (comma-separated).
    #[arg(long, value_delimiter = ',')]
    disable: Vec<String>,

    /// Run the detectors of one frame on parallel threads.
    #[arg(long)]
    parallel: bool,

    /// Arbitration scoring rule.
    #[arg(long, value_enum, default_value = "positional")]
    scoring: Scoring,

    /// JPEG quality of published frames (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    jpeg_quality: u8,

    /// TrueType font for captions. Without it captions are drawn as markers.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Print the effective registry configuration as JSON and exit.
    #[arg(long)]
    print_default_registry: bool,
}

fn main() {
    env_logger::init();
    install_detector_panic_hook();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_registry_config(&cli)?;

    if cli.print_default_registry {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    validate(&cli)?;
    let (Some(input), Some(output)) = (cli.input.clone(), cli.output.clone()) else {
        return Err("Input and output paths are required".into());
    };

    let registry = SharedRegistry::new(build_registry(&config)?);
    let use_case = build_use_case(&cli, registry)?;

    let mut source: Box<dyn FrameSource> = Box::new(ImageSequenceReader::new(&input));
    let metadata = source.open()?;

    let publication = PublicationAdapter::new(
        Box::new(JpegFrameEncoder::new(cli.jpeg_quality)),
        Box::new(DirectoryPublisher::create(&output)?),
    );

    let cancelled = Arc::new(AtomicBool::new(false));
    install_shutdown_handler(Arc::clone(&cancelled))?;

    let total = metadata.total_frames.unwrap_or(0);
    let progress: ProgressCallback = Box::new(move |current, _| {
        eprint!("\rProcessing frame {current}/{total}");
        true
    });
    let config = PipelineConfig {
        on_progress: Some(progress),
        cancelled,
        logger: Box::new(StdoutPipelineLogger::default()),
    };

    let stats = ThreadedPipelineExecutor::new().execute(
        source,
        use_case,
        publication,
        &metadata,
        config,
    )?;
    eprintln!();

    report(&stats);
    log::info!("Output written to {}", output.display());
    Ok(())
}

/// First Ctrl-C stops the run after the frame in flight so published output
/// is flushed; a second one exits immediately.
fn install_shutdown_handler(cancelled: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if cancelled.swap(true, Ordering::SeqCst) {
            process::exit(130);
        }
        eprintln!();
        log::warn!("Interrupted, finishing pending publications (Ctrl-C again to abort)");
    })
}

fn load_registry_config(cli: &Cli) -> Result<RegistryConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.registry {
        Some(path) => RegistryConfig::load(path)?,
        None => RegistryConfig::traffic_signs(&cli.cascade_dir),
    };
    config.apply_overrides(&cli.enable, &cli.disable)?;
    Ok(config)
}

fn build_use_case(
    cli: &Cli,
    registry: SharedRegistry,
) -> Result<DetectSignsUseCase, Box<dyn std::error::Error>> {
    let scorer: Box<dyn CandidateScorer> = match cli.scoring {
        Scoring::Positional => Box::new(PositionalScorer),
        Scoring::Area => Box::new(AreaScorer),
    };

    let annotator = match &cli.font {
        Some(path) => ImageprocAnnotator::default().with_font_file(path)?,
        None => {
            log::warn!("No --font given; captions are drawn as marker bars");
            ImageprocAnnotator::default()
        }
    };

    let mode = if cli.parallel {
        ExecutionMode::Parallel
    } else {
        ExecutionMode::Sequential
    };

    Ok(
        DetectSignsUseCase::new(registry, ArbitrationEngine::new(scorer), Box::new(annotator))
            .with_mode(mode),
    )
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let Some(input) = &cli.input else {
        return Err("Input path is required".into());
    };
    if !input.exists() {
        return Err(format!("Input not found: {}", input.display()).into());
    }
    if cli.output.is_none() {
        return Err("Output directory is required".into());
    }
    if !(1..=100).contains(&cli.jpeg_quality) {
        return Err(format!(
            "JPEG quality must be between 1 and 100, got {}",
            cli.jpeg_quality
        )
        .into());
    }
    if let Some(label) = cli.enable.iter().find(|l| cli.disable.contains(l)) {
        return Err(format!("Label '{label}' is both enabled and disabled").into());
    }
    Ok(())
}

fn report(stats: &PipelineStats) {
    log::info!(
        "{} frames processed, {} dropped, {} without detection",
        stats.frames_processed,
        stats.frames_dropped,
        stats.frames_without_detection
    );
    for (label, count) in &stats.detections {
        log::info!("  {label}: {count}");
    }
    if stats.publication_failures > 0 {
        log::warn!("{} publications failed", stats.publication_failures);
    }
    if stats.cancelled {
        log::warn!("Run was cancelled before the input was exhausted");
    }
}
