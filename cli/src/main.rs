//! Command-line garment try-on.
//!
//! Usage:
//!   tryon person.jpg shirt.png -o result.jpg --keypoints "210,330;430,330;320,180"
//!   tryon person.jpg shirt.png -o result.png --landmarks pose.json --save-cutout out/

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tryon::{FixedPose, KeypointSet, LandmarkFile, OutputFormat, PoseProvider, TryOn, TryOnError};

#[derive(Parser, Debug)]
#[command(name = "tryon")]
#[command(author, version, about = "Overlay a garment onto a person photo", long_about = None)]
struct Args {
    /// Photo of the person
    #[arg(required = true)]
    person: PathBuf,

    /// Garment image (pre-cut PNG with alpha, or shot on a white background)
    #[arg(required = true)]
    garment: PathBuf,

    /// Output image path
    #[arg(short, long)]
    output: PathBuf,

    /// Keypoints in pixels: "left_x,left_y;right_x,right_y;neck_x,neck_y"
    #[arg(long, conflicts_with = "landmarks")]
    keypoints: Option<KeypointSet>,

    /// JSON file with normalized body-pose landmarks for the person photo
    #[arg(long)]
    landmarks: Option<PathBuf>,

    /// Minimum landmark visibility for shoulders and nose
    #[arg(long, default_value = "0.0")]
    min_visibility: f32,

    /// Garment width relative to the shoulder span
    #[arg(long, default_value = "1.2")]
    scale: f64,

    /// Fraction of the garment height drawn above the neck
    #[arg(long, default_value = "0.2")]
    neck_offset: f64,

    /// Smallest resized garment width or height
    #[arg(long, default_value = "10")]
    min_size: u32,

    /// Luminance above which garment pixels count as background
    #[arg(long, default_value = "240")]
    threshold: u8,

    /// JPEG quality (0.0 - 1.0)
    #[arg(long, default_value = "0.9")]
    quality: f32,

    /// Output format (default: from the output extension, else jpeg)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Also write the garment cutout and mask as PNGs into this directory
    #[arg(long)]
    save_cutout: Option<PathBuf>,

    /// Show debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Jpeg,
    Png,
    Webp,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Jpeg => OutputFormat::Jpeg,
            FormatArg::Png => OutputFormat::Png,
            FormatArg::Webp => OutputFormat::Webp,
        }
    }
}

/// Exit status when the photo shows nobody usable.
const EXIT_NO_PERSON: u8 = 3;

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err.downcast_ref::<TryOnError>(), Some(TryOnError::PoseNotDetected)) {
                eprintln!("No person detected in the image. Use a front-facing clear photo.");
                return ExitCode::from(EXIT_NO_PERSON);
            }
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let provider = pose_provider(args)?;
    let format = output_format(args.format, &args.output);

    let session = TryOn::open(&args.person, provider)
        .with_context(|| format!("failed to load person photo {}", args.person.display()))?
        .garment_scale(args.scale)
        .neck_offset(args.neck_offset)
        .min_garment_size(args.min_size)
        .background_threshold(args.threshold)
        .quality(args.quality)
        .format(format);

    let garment = std::fs::read(&args.garment)
        .map_err(|e| TryOnError::ImageNotFound(format!("{}: {e}", args.garment.display())))
        .context("failed to load garment")?;

    // Nobody in the photo: stop before touching the garment.
    let keypoints = session.detect()?;
    let cutout = session.cutout(&garment).context("failed to extract garment")?;

    if let Some(dir) = &args.save_cutout {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        cutout.save(&dir.join("garment_rgba.png"), &dir.join("garment_mask.png"))?;
        log::info!("saved garment cutout and mask to {}", dir.display());
    }

    let fitted = session.fit_to(&cutout, keypoints)?;
    let result = session.encode(&fitted)?;
    std::fs::write(&args.output, &result.data)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    match result.placement {
        Some(rect) => log::info!(
            "garment {}x{} placed at ({}, {})",
            rect.width,
            rect.height,
            rect.x0,
            rect.y0
        ),
        None => log::warn!("shoulders coincide, output is the unchanged photo"),
    }
    log::info!(
        "wrote {} ({}x{}, {} bytes)",
        args.output.display(),
        result.width,
        result.height,
        result.data.len()
    );

    Ok(())
}

fn pose_provider(args: &Args) -> Result<Box<dyn PoseProvider>> {
    if let Some(keypoints) = args.keypoints {
        return Ok(Box::new(FixedPose(keypoints)));
    }
    if let Some(path) = &args.landmarks {
        let landmarks = LandmarkFile::open(path)
            .with_context(|| format!("failed to load landmarks {}", path.display()))?
            .min_visibility(args.min_visibility);
        return Ok(Box::new(landmarks));
    }
    bail!("one of --keypoints or --landmarks is required")
}

fn output_format(explicit: Option<FormatArg>, output: &Path) -> OutputFormat {
    explicit
        .map(OutputFormat::from)
        .or_else(|| {
            output
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(OutputFormat::from_extension)
        })
        .unwrap_or_default()
}
