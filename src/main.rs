use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use memetrue::compositor::DEFAULT_DOWNLOAD_NAME;
use memetrue::error_codes::classify;
use memetrue::geometry::Rect;
use memetrue::manifest::{load_and_validate_manifest, LoadedManifest};
use memetrue::session::EditorSession;
use memetrue::source::BaseImage;
use memetrue::templates::{TemplateCatalog, DEFAULT_TEMPLATE_DIR};

const VERSION: &str = match option_env!("MEMETRUE_GIT_HASH") {
    Some(hash) => hash,
    None => "unknown",
};

#[derive(Debug, Parser)]
#[command(name = "memetrue")]
#[command(about = "Compose text overlays onto meme images")]
#[command(version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render a manifest to a PNG
    Compose {
        manifest: PathBuf,
        #[arg(short = 'o', long = "output", default_value = DEFAULT_DOWNLOAD_NAME)]
        output: PathBuf,
        /// Print a `data:image/png;base64,…` URL instead of writing a file
        #[arg(long = "data-url")]
        data_url: bool,
        /// Report success and failure as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a manifest without rendering
    Check {
        manifest: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List the built-in templates
    Templates {
        #[arg(long = "dir", default_value = DEFAULT_TEMPLATE_DIR)]
        dir: PathBuf,
    },
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Self::Compose { json, .. } | Self::Check { json, .. } => *json,
            Self::Templates { .. } => false,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let json = cli.command.wants_json();

    let result = match cli.command {
        Commands::Compose {
            manifest,
            output,
            data_url,
            json,
        } => run_compose(&manifest, &output, data_url, json),
        Commands::Check { manifest, json } => run_check(&manifest, json),
        Commands::Templates { dir } => run_templates(&dir),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error, json),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_error(error: &anyhow::Error, json: bool) -> ExitCode {
    let coded = classify(error);
    if json {
        match serde_json::to_string(&coded.envelope()) {
            Ok(line) => eprintln!("{line}"),
            Err(_) => eprintln!("Error: {error:#}"),
        }
    } else {
        eprintln!("Error: {error:#}");
    }
    ExitCode::from(coded.kind.exit_code())
}

fn run_check(manifest_path: &Path, json: bool) -> Result<()> {
    let loaded = load_and_validate_manifest(manifest_path)?;
    let output = loaded.manifest.output;

    if json {
        println!(
            "{}",
            json!({
                "ok": true,
                "manifest": manifest_path.display().to_string(),
                "base": loaded.base.label(),
                "width": output.width,
                "height": output.height,
                "overlays": loaded.manifest.overlays.len(),
            })
        );
    } else {
        println!(
            "OK: {} ({}x{}, base {})",
            manifest_path.display(),
            output.width,
            output.height,
            loaded.base.label()
        );
        println!("Overlays: {}", loaded.manifest.overlays.len());
    }
    Ok(())
}

fn run_compose(manifest_path: &Path, output_path: &Path, data_url: bool, json: bool) -> Result<()> {
    let loaded = load_and_validate_manifest(manifest_path)?;
    let mut session = build_session(&loaded)?;

    let output = loaded.manifest.output;
    let result = session
        .composite(output.width, output.height)
        .with_context(|| format!("failed to compose {}", manifest_path.display()))?;
    info!(sha256 = %result.sha256_hex(), "composite finished");

    if data_url {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", result.to_data_url()).context("failed to write data URL")?;
        return Ok(());
    }

    result.write_png(output_path)?;
    if json {
        println!(
            "{}",
            json!({
                "ok": true,
                "output": output_path.display().to_string(),
                "width": result.width(),
                "height": result.height(),
                "sha256": result.sha256_hex(),
            })
        );
    } else {
        println!(
            "Wrote {} ({}x{}, sha256={})",
            output_path.display(),
            result.width(),
            result.height(),
            result.sha256_hex()
        );
    }
    Ok(())
}

/// Replays the manifest through the same editing operations a user would
/// perform: pick the base image, add each overlay, then edit it in place.
fn build_session(loaded: &LoadedManifest) -> Result<EditorSession> {
    let mut session = EditorSession::new(loaded.compositor()?)?;
    let output = loaded.manifest.output;
    session.set_canvas(Rect::from_size(output.width as f32, output.height as f32));
    session.select_base_image(BaseImage::new(loaded.base.clone()));

    for entry in &loaded.manifest.overlays {
        session.add_overlay();
        let id = session
            .overlays()
            .last()
            .map(|overlay| overlay.id.clone())
            .ok_or_else(|| anyhow!("overlay was not added"))?;
        session.update_overlay(&id, &entry.patch());
        debug!(overlay = %id, "overlay placed");
    }
    Ok(session)
}

fn run_templates(dir: &Path) -> Result<()> {
    let catalog = TemplateCatalog::builtin(dir);
    for template in catalog.templates() {
        let path = catalog.root().join(&template.file_name);
        let marker = if path.is_file() { "" } else { " (missing)" };
        println!("{}\t{}\t{}{}", template.id, template.alt, path.display(), marker);
    }
    Ok(())
}
