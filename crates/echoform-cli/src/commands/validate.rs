//! Structural validation of spec files.

use super::common::load_spec;
use clap::Args;
use echoform_spec::{GraphSpec, NodeType, validate};
use std::path::PathBuf;

/// Validate a spec file.
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the spec JSON
    pub spec: PathBuf,

    /// Treat out-of-range parameter values as errors
    #[arg(long)]
    strict: bool,
}

/// Run the validate command. Fails with the first structural problem found.
pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let spec = load_spec(&args.spec)?;
    if let Err(err) = validate(&spec) {
        anyhow::bail!("{} is invalid ({:?}): {err}", args.spec.display(), err.kind());
    }

    let warnings = range_warnings(&spec);
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    if args.strict && !warnings.is_empty() {
        anyhow::bail!("{} has {} out-of-range parameter(s)", args.spec.display(), warnings.len());
    }

    println!(
        "{}: ok ({} nodes, {} connections, {} automations)",
        args.spec.display(),
        spec.nodes.len(),
        spec.connections.len(),
        spec.automations.len()
    );
    Ok(())
}

/// Parameters a live graph would clamp.
fn range_warnings(spec: &GraphSpec) -> Vec<String> {
    let mut out = Vec::new();
    for node in &spec.nodes {
        let Ok(node_type) = node.node_type.parse::<NodeType>() else {
            continue;
        };
        for (name, value) in &node.params {
            if let Ok(param) = node_type.param(name)
                && let Err(err) = param.check(value)
            {
                out.push(format!("node '{}': {err}", node.id));
            }
        }
    }
    out
}
