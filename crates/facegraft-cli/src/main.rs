use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use facegraft_core::{selector, LocatorKind, MaskBuilder, MaskConfig, NormalizerKind};
use facegraft_service::{
    build_pipeline, codec, encode_result, load_swap_config, ServiceConfig, Submission, SwapService, UserId,
};
use std::path::PathBuf;

/// Local user id for sessions driven from the command line.
const CLI_USER: UserId = 0;

#[derive(Parser)]
#[command(name = "facegraft", about = "Facegraft face region compositing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put the face from DONOR onto the face in BASE
    Swap {
        /// Photo whose face is replaced (kept as the canvas)
        base: PathBuf,
        /// Photo supplying the face
        donor: PathBuf,
        /// Output PNG path
        #[arg(short, long, default_value = "facegraft.png")]
        output: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
        /// How the donor face is fitted: rect or landmark
        #[arg(long)]
        alignment: Option<NormalizerKind>,
    },
    /// Print detected faces as JSON
    Detect {
        image: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Render a feathered mask as a greyscale PNG
    Mask {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Blur kernel size (odd)
        #[arg(long, default_value_t = MaskConfig::default().blur_kernel)]
        blur_kernel: u32,
        #[arg(short, long, default_value = "mask.png")]
        output: PathBuf,
    },
}

/// Flags layered over the `FACEGRAFT_*` environment.
#[derive(Args)]
struct EngineArgs {
    /// Face detector: cascade or scrfd
    #[arg(long)]
    detector: Option<LocatorKind>,
    /// Directory containing det_10g.onnx
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Engine tuning TOML file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl EngineArgs {
    fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::from_env();
        if let Some(detector) = self.detector {
            config.detector = detector;
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(path) = &self.config {
            config.config_path = Some(path.clone());
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Swap {
            base,
            donor,
            output,
            engine,
            alignment,
        } => {
            let mut config = engine.service_config();
            if let Some(alignment) = alignment {
                config.alignment = alignment;
            }
            tracing::debug!(
                base = %base.display(),
                donor = %donor.display(),
                detector = ?config.detector,
                alignment = ?config.alignment,
                "swap requested"
            );
            let service = SwapService::start(&config).context("failed to start swap engine")?;

            for path in [&base, &donor] {
                let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
                let submission = service
                    .submit_photo_bytes(CLI_USER, &bytes)
                    .await
                    .with_context(|| format!("failed to process {}", path.display()))?;
                match submission {
                    Submission::AwaitingDonor => {}
                    Submission::Swapped(result) => {
                        let png = encode_result(&result)?;
                        std::fs::write(&output, png).with_context(|| format!("failed to write {}", output.display()))?;
                        println!("Swapped face into {}", output.display());
                        return Ok(());
                    }
                    Submission::Failed(failure) if failure.is_user_correctable() => {
                        eprintln!("{failure}. Retake the photo with one clear, front-facing face.");
                        std::process::exit(2);
                    }
                    Submission::Failed(failure) => {
                        eprintln!("Something went wrong while swapping faces: {failure}");
                        std::process::exit(1);
                    }
                }
            }
            bail!("photo pair was not completed");
        }
        Commands::Detect { image, engine } => {
            let config = engine.service_config();
            let swap_config = load_swap_config(&config)?;
            let pipeline = build_pipeline(&config, &swap_config)?;

            let bytes = std::fs::read(&image).with_context(|| format!("failed to read {}", image.display()))?;
            let photo = codec::decode_photo(&bytes).with_context(|| format!("failed to decode {}", image.display()))?;
            let faces = pipeline
                .locator()
                .locate(&photo)
                .context("face detection failed")?;

            let report = serde_json::json!({
                "detector": pipeline.locator().name(),
                "width": photo.width(),
                "height": photo.height(),
                "faces": &faces,
                "selected": selector::select(&faces),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Mask {
            width,
            height,
            blur_kernel,
            output,
        } => {
            if width == 0 || height == 0 {
                bail!("mask dimensions must be positive");
            }
            let mask_config = MaskConfig { blur_kernel };
            mask_config.validate()?;
            let mask = MaskBuilder::new(&mask_config).build(width, height);
            mask.to_luma8()
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Wrote {width}x{height} mask to {}", output.display());
        }
    }

    Ok(())
}
