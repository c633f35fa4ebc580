//! Offline rendering of spec files to WAV.

use super::common::{format_bytes, load_spec};
use anyhow::Context;
use clap::Args;
use echoform_cache::{BufferCache, FileLoader};
use echoform_session::{CommitOptions, EngineConfig, Session, SessionEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Render a spec to a WAV file.
#[derive(Args)]
pub struct RenderArgs {
    /// Path to the spec JSON
    pub spec: PathBuf,

    /// Output WAV file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Render only the upstream chain of this node
    #[arg(long)]
    node: Option<String>,

    /// Minimum render length in seconds (assets and automation can extend it)
    #[arg(long)]
    duration: Option<f64>,

    /// Raise quiet renders toward the normalization target
    #[arg(long)]
    normalize: bool,

    /// Output bit depth (16 or 24)
    #[arg(long)]
    bit_depth: Option<u16>,

    /// Directory asset paths are resolved against (default: the spec's directory)
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Run the render command.
pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(render(args))
}

async fn render(args: RenderArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let spec = load_spec(&args.spec)?;
    let root = args.assets.clone().unwrap_or_else(|| {
        args.spec
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default()
    });

    let cache = Arc::new(BufferCache::new(
        config.cache.clone(),
        Arc::new(FileLoader::new(root)),
    ));
    let mut session = Session::builder(cache).config(config).build()?;
    session.events().subscribe_all(|event| {
        if let SessionEvent::Error {
            subject, message, ..
        } = event
        {
            eprintln!(
                "warning: {}{message}",
                subject.as_deref().map(|s| format!("{s}: ")).unwrap_or_default()
            );
        }
    });
    session.load(spec).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {msg}")
            .context("invalid progress template")?,
    );
    spinner.set_message(match &args.node {
        Some(node) => format!("rendering {node}"),
        None => "rendering".to_string(),
    });
    spinner.enable_steady_tick(Duration::from_millis(100));

    let options = CommitOptions {
        node_id: args.node.clone(),
        duration_override: args.duration,
        normalize: args.normalize.then_some(true),
        bit_depth: args.bit_depth,
    };
    let result = session.commit(options).await;
    spinner.finish_and_clear();
    let result = result?;

    if let Some(parent) = args.output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&args.output, result.blob.as_slice())
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!("Wrote {}", args.output.display());
    println!(
        "  {:.3}s, {} Hz, {}",
        result.duration,
        result.sample_rate,
        format_bytes(result.blob.len())
    );
    println!("  peak {:.3}, gain {:.3}", result.peak, result.gain);
    println!("  spec  {}", result.spec_hash);
    println!("  audio {}", result.audio_hash);
    Ok(())
}
