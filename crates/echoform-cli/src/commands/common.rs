//! Shared CLI helpers used across multiple commands.

use anyhow::Context;
use echoform_spec::GraphSpec;
use std::path::Path;

/// Load a spec file, adding the path to any error.
pub fn load_spec(path: &Path) -> anyhow::Result<GraphSpec> {
    GraphSpec::load(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Human-readable byte count.
pub fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
