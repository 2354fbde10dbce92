use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use photo_classify::{
    classify::{ClassificationPipeline, ClassifyOptions},
    config::Config,
    image::{CropRect, ImageLoader},
    models::{ModelManager, ModelSelector},
    utils::error::DISPLAY_ERROR_MESSAGE,
    web::serve,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "photo-classify")]
#[command(about = "Photo pre-processing and image classification")]
struct Args {
    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models", global = true)]
    models_dir: String,

    /// Default model (googlenet-places, squeezenet, resnet50)
    #[arg(long, default_value = "googlenet-places", global = true)]
    model: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Server bind address
        #[arg(long, default_value = "0.0.0.0:5005")]
        bind: String,

        /// Number of worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// Enable development mode
        #[arg(long)]
        dev: bool,
    },

    /// Classify a single image file
    Classify(ClassifyArgs),
}

#[derive(ClapArgs)]
struct ClassifyArgs {
    /// Image file
    path: PathBuf,

    /// Crop rectangle as x,y,width,height
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropRect>,

    /// Scale factor applied after cropping
    #[arg(long)]
    scale: Option<f64>,

    /// Contrast factor (1.0 = unchanged)
    #[arg(long)]
    contrast: Option<f64>,

    /// Skip pre-processing entirely
    #[arg(long)]
    no_preprocess: bool,

    /// Number of predictions to print
    #[arg(long, default_value_t = 1)]
    top_k: usize,

    /// Write the processed image (PNG) here
    #[arg(long)]
    output: Option<PathBuf>,
}

fn parse_crop(value: &str) -> std::result::Result<CropRect, String> {
    let parts: Vec<u32> = value
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid crop '{}': {}", value, e))?;
    match parts.as_slice() {
        [x, y, width, height] => Ok(CropRect::new(*x, *y, *width, *height)),
        _ => Err(format!("crop must be x,y,width,height, got '{}'", value)),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let default_model: ModelSelector = args.model.parse()?;

    match args.command {
        Command::Serve { bind, workers, dev } => {
            tracing::info!("Starting photo classification service...");
            tracing::info!("Bind address: {}", bind);
            tracing::info!("Models directory: {}", args.models_dir);

            let config =
                Config::new(bind, args.models_dir, workers, dev)?.with_default_model(default_model);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(config.workers)
                .enable_all()
                .build()
                .context("failed to build tokio runtime")?;

            runtime.block_on(serve(config))?;
        }
        Command::Classify(classify) => {
            let config = Config::new(String::new(), args.models_dir, Some(1), false)?
                .with_default_model(default_model);
            run_classify(config, classify)?;
        }
    }

    Ok(())
}

fn run_classify(config: Config, args: ClassifyArgs) -> Result<()> {
    let image = ImageLoader::from_path(&args.path)
        .with_context(|| format!("failed to load {}", args.path.display()))?;

    let manager = Arc::new(ModelManager::load(config));
    let pipeline = ClassificationPipeline::new(manager);

    let options = ClassifyOptions {
        preprocess: Some(!args.no_preprocess),
        crop: args.crop,
        scale: args.scale,
        contrast: args.contrast,
        top_k: Some(args.top_k.max(1)),
        ..Default::default()
    };

    let outcome = match pipeline.classify_with_options(&image, &options, None) {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("{}", DISPLAY_ERROR_MESSAGE);
            return Err(e.into());
        }
    };

    println!("{}", outcome.payload);
    for prediction in outcome.predictions.iter().skip(1) {
        println!("  {} {}", prediction.label, prediction.confidence);
    }
    if let Some(fallback) = &outcome.fallback {
        tracing::warn!("Fallback used: {:?}", fallback);
    }

    if let Some(output) = args.output {
        std::fs::write(&output, outcome.image.to_png_bytes()?)
            .with_context(|| format!("failed to write {}", output.display()))?;
        tracing::info!("Processed image written to {}", output.display());
    }

    Ok(())
}
