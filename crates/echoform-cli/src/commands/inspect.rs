//! Spec inspection: nodes, sinks and upstream chains.

use super::common::load_spec;
use clap::Args;
use echoform_spec::{GraphSpec, NodeType, canonicalize, validate};
use serde_json::json;
use std::path::PathBuf;

/// Inspect a spec file.
#[derive(Args)]
pub struct InspectArgs {
    /// Path to the spec JSON
    pub spec: PathBuf,

    /// Show the upstream chain feeding this node
    #[arg(long)]
    node: Option<String>,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
}

/// Run the inspect command.
pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let spec = canonicalize(&load_spec(&args.spec)?);
    validate(&spec)?;

    let chain = match &args.node {
        Some(node) => Some(
            spec.upstream_closure(node)
                .ok_or_else(|| anyhow::anyhow!("node '{node}' not found"))?,
        ),
        None => None,
    };

    if args.json {
        let nodes: Vec<_> = spec
            .nodes
            .iter()
            .map(|n| {
                json!({
                    "id": n.id,
                    "type": n.node_type,
                    "assetId": n.asset_id,
                    "params": n.params,
                    "sink": spec.is_sink(&n.id),
                })
            })
            .collect();
        let out = json!({
            "nodes": nodes,
            "sinks": spec.sinks(),
            "upstream": chain,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print_summary(&spec);
    if let (Some(node), Some(chain)) = (&args.node, chain) {
        println!();
        println!("Upstream of {node}:");
        for id in &chain {
            println!("  {id}");
        }
    }
    Ok(())
}

fn print_summary(spec: &GraphSpec) {
    println!("Nodes ({}):", spec.nodes.len());
    for node in &spec.nodes {
        let sink = if spec.is_sink(&node.id) { " [sink]" } else { "" };
        let asset = node
            .asset_id
            .as_deref()
            .map(|a| format!(" <- {a}"))
            .unwrap_or_default();
        println!("  {:<16} {:<10}{asset}{sink}", node.id, node.node_type);

        let Ok(node_type) = node.node_type.parse::<NodeType>() else {
            continue;
        };
        for param in node_type.params() {
            let value = node
                .params
                .get(param.name)
                .cloned()
                .unwrap_or_else(|| param.default_value());
            println!("      {:<14} {value}", param.name);
        }
    }

    println!();
    println!("Sinks: {}", spec.sinks().join(", "));
    if !spec.automations.is_empty() {
        println!("Automations ({}):", spec.automations.len());
        for auto in &spec.automations {
            println!(
                "  {:<16} {}.{} {:.2}s..{:.2}s",
                auto.id, auto.node_id, auto.param, auto.start_time, auto.end_time
            );
        }
    }
}
