//! compose
//!
//! Renders a saved session profile over a garment image into a print PNG.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mockup_renderer::{
    Configurable, DecodeError, EngineConfig, ExportPipeline, FetchedImage, ImageFetcher,
    ImageSource, PlacementEngine, Session, SessionProfile,
};

#[derive(Parser)]
#[command(name = "compose")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Flatten a mockup profile into a print-ready PNG", long_about = None)]
struct Cli {
    /// Session profile JSON
    profile: PathBuf,

    /// Output PNG
    #[arg(short, long, default_value = "composite.png")]
    output: PathBuf,

    /// Garment image; overrides the profile's base reference
    #[arg(short, long)]
    base: Option<PathBuf>,

    /// Directory that asset references in the profile resolve against
    #[arg(short, long, default_value = ".")]
    assets: PathBuf,

    /// Engine configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device pixel multiplier (1 to 3)
    #[arg(long)]
    dpi: Option<f64>,

    /// Also write the placement summary JSON here
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Reads asset references from a local directory. References may not
/// leave the directory.
struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    fn resolve(&self, reference: &str) -> Result<PathBuf, DecodeError> {
        let relative = Path::new(reference);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(DecodeError::Fetch {
                reference: reference.to_string(),
                reason: "reference leaves the asset directory".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ImageFetcher for FsFetcher {
    async fn fetch(&self, reference: &str) -> Result<FetchedImage, DecodeError> {
        let path = self.resolve(reference)?;
        let mime = mime_for(&path).to_string();
        let data = tokio::task::spawn_blocking(move || fs::read(path))
            .await
            .map_err(|e| DecodeError::Task(e.to_string()))?
            .map_err(|e| DecodeError::Fetch {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?;
        Ok(FetchedImage { data, mime })
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        _ => "image/png",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            EngineConfig::from_json(&json).context("invalid engine config")?
        }
        None => EngineConfig::default(),
    };

    let json = fs::read_to_string(&cli.profile)
        .with_context(|| format!("failed to read {}", cli.profile.display()))?;
    let profile = SessionProfile::from_json(&json).context("invalid profile")?;

    let mut session = Session::new(config).context("invalid engine config")?;
    session.apply_profile(&profile)?;

    if let Some(path) = &cli.base {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        session.set_base(
            ImageSource::from_bytes(data, mime_for(path)),
            profile.base.clone(),
        );
    } else if session.base().is_none() {
        bail!("profile has no base image; pass --base");
    }

    let mut settings = session.config().export.clone();
    if let Some(dpi) = cli.dpi {
        settings.dpi_scale = dpi;
    }
    let pipeline = ExportPipeline::new(
        FsFetcher { root: cli.assets },
        settings,
        session.fonts().clone(),
    );
    let image = session.export(&pipeline).await?;

    fs::write(&cli.output, &image.png)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    info!(
        "wrote {}x{} composite to {}",
        image.width,
        image.height,
        cli.output.display()
    );

    if let Some(path) = &cli.summary {
        fs::write(path, session.summary().to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}
