use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use log::{info, warn};
use ringmark::{
    compose, config, pipeline, FaceCandidate, FaceLocator, FixedDetector, OutputMode, Pipeline,
    RingError,
};

const JPEG_QUALITY: u8 = 95;

#[derive(Parser)]
#[command(name = "ringmark")]
#[command(
    version,
    about = "Draw a profile status ring with curved text around the face in a photo"
)]
struct Cli {
    /// Config file (defaults to the system config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FaceArgs {
    /// Face rectangle as x,y,w,h; takes precedence over detection
    #[arg(long, value_parser = parse_face)]
    face: Option<FaceCandidate>,

    /// Skip the configured face detector
    #[arg(long)]
    no_detect: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the ring onto an image
    Render {
        input: PathBuf,
        output: PathBuf,
        /// Ring text (defaults to the configured text)
        #[arg(short, long)]
        text: Option<String>,
        #[command(flatten)]
        face: FaceArgs,
        /// Write the image unchanged when no ring fits instead of failing
        #[arg(long)]
        passthrough: bool,
    },
    /// Print the face anchor and ring geometry without rendering
    Plan {
        input: PathBuf,
        #[command(flatten)]
        face: FaceArgs,
    },
    /// Open config file in editor
    Config {
        /// Write the default config instead of opening an editor
        #[arg(long)]
        init: bool,
    },
}

fn parse_face(s: &str) -> Result<FaceCandidate, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid face rectangle {:?}: {}", s, e))?;
    match parts[..] {
        [x, y, w, h] if w > 0.0 && h > 0.0 => Ok(FaceCandidate::new(x, y, w, h)),
        _ => Err(format!("expected x,y,w,h with positive size, got {:?}", s)),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Render {
            input,
            output,
            text,
            face,
            passthrough,
        } => {
            let cfg = config::load_config(config_path)?;
            render(&cfg, &input, &output, text.as_deref(), &face, passthrough)
        }
        Commands::Plan { input, face } => {
            let cfg = config::load_config(config_path)?;
            plan(&cfg, &input, &face)
        }
        Commands::Config { init } => {
            let path = config_path.unwrap_or(&config::CONFIG_PATH);
            if init {
                config::save_config(&config::Config::default(), Some(path))?;
                info!("Wrote default config to {}", path.display());
                Ok(())
            } else {
                open_config(path)
            }
        }
    }
}

fn build_pipeline(cfg: &config::Config, face: &FaceArgs) -> Pipeline {
    let mut locator = FaceLocator::default();
    if let Some(rect) = face.face {
        locator.push(Box::new(FixedDetector::new(vec![rect])));
    }
    if !face.no_detect {
        for detector in pipeline::detectors_from_config(&cfg.detector) {
            locator.push(detector);
        }
    }
    Pipeline::new(locator, cfg)
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("decoding image {}", path.display()))
}

fn render(
    cfg: &config::Config,
    input: &Path,
    output: &Path,
    text: Option<&str>,
    face: &FaceArgs,
    passthrough: bool,
) -> Result<()> {
    let img = open_image(input)?;
    let format = ImageFormat::from_path(output)
        .with_context(|| format!("unknown output format for {}", output.display()))?;
    let mode = OutputMode::for_format(format);

    let mut pipeline = build_pipeline(cfg, face);
    let rendered = match pipeline.watermark(&img, text.unwrap_or(""), mode) {
        Ok(r) => r.image,
        Err(e @ RingError::GeometryInfeasible { .. }) if passthrough => {
            warn!("{}; writing the image unchanged", e);
            compose::finish(img.to_rgba8(), mode)
        }
        Err(e) => return Err(e).context("cannot draw the ring on this image"),
    };

    save(&rendered, output, format)?;
    info!("✓ Wrote {}", output.display());
    Ok(())
}

fn save(img: &DynamicImage, path: &Path, format: ImageFormat) -> Result<()> {
    if format == ImageFormat::Jpeg {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
        img.write_with_encoder(encoder)
            .with_context(|| format!("encoding {}", path.display()))?;
    } else {
        img.save_with_format(path, format)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn plan(cfg: &config::Config, input: &Path, face: &FaceArgs) -> Result<()> {
    let img = open_image(input)?;
    let mut pipeline = build_pipeline(cfg, face);

    let located = pipeline.locate(&img);
    println!("image:    {}x{}", img.width(), img.height());
    println!("anchor:   {} ({:?})", located.anchor, located.source);
    for (i, c) in located.candidates.iter().enumerate() {
        println!(
            "face {}:   x={:.0} y={:.0} w={:.0} h={:.0} score={:.3}",
            i, c.x, c.y, c.w, c.h, c.score
        );
    }

    match ringmark::geometry::plan(located.anchor, img.width(), img.height(), &pipeline.policy) {
        Ok(g) => {
            println!(
                "ring:     inner={} outer={} band={}",
                g.inner_radius,
                g.outer_radius,
                g.band_width()
            );
            Ok(())
        }
        Err(e) => {
            println!("ring:     {}", e);
            Err(e.into())
        }
    }
}

fn open_config(path: &Path) -> Result<()> {
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {}", path.display());

    let status = std::process::Command::new(editor)
        .arg(path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
