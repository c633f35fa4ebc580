//! Content hashing of spec files.

use super::common::load_spec;
use clap::Args;
use echoform_spec::{RollingHasher, SpecHasher, default_hasher, validate};
use std::path::PathBuf;

/// Print a spec's content hash.
#[derive(Args)]
pub struct HashArgs {
    /// Path to the spec JSON
    pub spec: PathBuf,

    /// Hash only the upstream chain of this node
    #[arg(long)]
    node: Option<String>,

    /// Use the 64-bit rolling hash instead of the default
    #[arg(long)]
    fast: bool,
}

/// Run the hash command.
pub fn run(args: HashArgs) -> anyhow::Result<()> {
    let mut spec = load_spec(&args.spec)?;
    validate(&spec)?;
    if let Some(node) = &args.node {
        spec = spec.restrict_to(node)?;
    }
    let hasher: std::sync::Arc<dyn SpecHasher> = if args.fast {
        std::sync::Arc::new(RollingHasher)
    } else {
        default_hasher()
    };
    println!("{}", hasher.hash_spec(&spec));
    Ok(())
}
