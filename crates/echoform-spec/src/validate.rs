//! Structural validation of a [`GraphSpec`].
//!
//! Checks run in a fixed order and stop at the first failure: schema, duplicate
//! ids, node types and their parameters, references, automations. Cycles are a
//! property of the runtime graph and are rejected by the builder.

use crate::error::SpecError;
use crate::model::{GraphSpec, SCHEMA_ID, SPEC_VERSION};
use crate::registry::NodeType;
use std::collections::HashSet;

/// Validates a spec. Callers must not build a runtime graph from a spec that
/// has not passed this check.
pub fn validate(spec: &GraphSpec) -> Result<(), SpecError> {
    if spec.version != SPEC_VERSION {
        return Err(SpecError::UnsupportedVersion {
            found: spec.version,
            expected: SPEC_VERSION,
        });
    }
    if spec.schema_id != SCHEMA_ID {
        return Err(SpecError::SchemaMismatch {
            found: spec.schema_id.clone(),
            expected: SCHEMA_ID,
        });
    }

    unique("asset", spec.assets.iter().map(|a| a.id.as_str()))?;
    unique("node", spec.nodes.iter().map(|n| n.id.as_str()))?;
    unique("automation", spec.automations.iter().map(|a| a.id.as_str()))?;
    unique("bus", spec.buses.iter().map(|b| b.id.as_str()))?;

    for node in &spec.nodes {
        let node_type: NodeType = node
            .node_type
            .parse()
            .map_err(|_| SpecError::UnknownNodeType {
                node: node.id.clone(),
                node_type: node.node_type.clone(),
            })?;
        for (name, value) in &node.params {
            node_type
                .param(name)
                .and_then(|p| p.coerce(value))
                .map_err(|source| SpecError::Param {
                    node: node.id.clone(),
                    source,
                })?;
        }
        if let Some(asset) = &node.asset_id
            && spec.asset(asset).is_none()
        {
            return Err(SpecError::UnknownAsset {
                node: node.id.clone(),
                asset: asset.clone(),
            });
        }
    }

    let node_ids: HashSet<&str> = spec.nodes.iter().map(|n| n.id.as_str()).collect();
    for conn in &spec.connections {
        for end in [&conn.from, &conn.to] {
            if !node_ids.contains(end.as_str()) {
                return Err(SpecError::UnknownNode {
                    context: format!("connection {} -> {}", conn.from, conn.to),
                    node: end.clone(),
                });
            }
        }
        if conn.from == conn.to {
            return Err(SpecError::SelfConnection(conn.from.clone()));
        }
    }

    let bus_ids: HashSet<&str> = spec.buses.iter().map(|b| b.id.as_str()).collect();
    for send in &spec.sends {
        if !node_ids.contains(send.from.as_str()) {
            return Err(SpecError::UnknownNode {
                context: format!("send to bus '{}'", send.bus),
                node: send.from.clone(),
            });
        }
        if !bus_ids.contains(send.bus.as_str()) {
            return Err(SpecError::UnknownBus {
                node: send.from.clone(),
                bus: send.bus.clone(),
            });
        }
    }

    for auto in &spec.automations {
        validate_automation(spec, auto)?;
    }

    Ok(())
}

fn validate_automation(
    spec: &GraphSpec,
    auto: &crate::model::AutomationDef,
) -> Result<(), SpecError> {
    let invalid = |reason: &str| SpecError::InvalidAutomation {
        id: auto.id.clone(),
        reason: reason.to_string(),
    };

    if auto.id.is_empty() {
        return Err(invalid("missing id"));
    }
    if !auto.curve.mode.is_supported() {
        let mode = serde_json::to_value(auto.curve.mode)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        return Err(SpecError::ReservedCurveMode {
            id: auto.id.clone(),
            mode,
        });
    }
    if !auto.start_time.is_finite() || !auto.end_time.is_finite() || auto.start_time < 0.0 {
        return Err(invalid("start and end times must be finite and non-negative"));
    }
    if auto.end_time < auto.start_time {
        return Err(invalid("endTime precedes startTime"));
    }
    if auto.curve.points.is_empty() {
        return Err(invalid("curve has no points"));
    }
    if auto.curve.points.iter().any(|p| !p.t.is_finite() || p.t < 0.0 || !p.value.is_finite()) {
        return Err(invalid("curve points must be finite with t >= 0"));
    }

    let node = spec.node(&auto.node_id).ok_or_else(|| SpecError::UnknownNode {
        context: format!("automation '{}'", auto.id),
        node: auto.node_id.clone(),
    })?;
    let node_type: NodeType = node
        .node_type
        .parse()
        .map_err(|_| SpecError::UnknownNodeType {
            node: node.id.clone(),
            node_type: node.node_type.clone(),
        })?;
    node_type
        .automatable_param(&auto.param)
        .map_err(|source| SpecError::Param {
            node: node.id.clone(),
            source,
        })?;
    Ok(())
}

fn unique<'a>(
    collection: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), SpecError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SpecError::DuplicateId {
                collection,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpecErrorKind;
    use crate::model::{Asset, AutomationDef, BusDef, CurveMode, NodeDef, SendDef};

    fn chain() -> GraphSpec {
        GraphSpec::default()
            .with_asset(Asset::sample("kick", "kick.wav"))
            .with_node(NodeDef::new("p", "player").with_asset("kick"))
            .with_node(NodeDef::new("g", "gain").with_param("gain", 0.5))
            .with_connection("p", "g")
    }

    #[test]
    fn accepts_valid_chain() {
        assert_eq!(validate(&chain()), Ok(()));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut spec = chain();
        spec.version = 9;
        assert_eq!(validate(&spec).unwrap_err().kind(), SpecErrorKind::Schema);
    }

    #[test]
    fn rejects_duplicate_node() {
        let spec = chain().with_node(NodeDef::new("g", "gain"));
        assert_eq!(
            validate(&spec),
            Err(SpecError::DuplicateId {
                collection: "node",
                id: "g".into()
            })
        );
    }

    #[test]
    fn rejects_unknown_type() {
        let spec = chain().with_node(NodeDef::new("r", "reverb"));
        assert_eq!(validate(&spec).unwrap_err().kind(), SpecErrorKind::UnknownType);
    }

    #[test]
    fn rejects_dangling_connection() {
        let spec = chain().with_connection("g", "ghost");
        assert!(matches!(
            validate(&spec),
            Err(SpecError::UnknownNode { node, .. }) if node == "ghost"
        ));
    }

    #[test]
    fn rejects_unknown_asset_and_bus() {
        let spec = chain().with_node(NodeDef::new("p2", "player").with_asset("snare"));
        assert!(matches!(validate(&spec), Err(SpecError::UnknownAsset { .. })));

        let mut spec = chain();
        spec.sends.push(SendDef {
            from: "g".into(),
            bus: "verb".into(),
            amount: 0.3,
        });
        assert!(matches!(validate(&spec), Err(SpecError::UnknownBus { .. })));
        spec.buses.push(BusDef {
            id: "verb".into(),
            gain: 1.0,
        });
        assert!(validate(&spec).is_ok());
    }

    #[test]
    fn rejects_bad_enum_but_not_out_of_range() {
        let spec = chain().with_node(NodeDef::new("f", "filter").with_param("type", "comb"));
        assert_eq!(validate(&spec).unwrap_err().kind(), SpecErrorKind::Param);

        let spec = chain().with_node(NodeDef::new("f", "filter").with_param("frequency", 1e9));
        assert!(validate(&spec).is_ok());
    }

    #[test]
    fn rejects_reserved_curve_modes() {
        let spec = chain().with_automation(AutomationDef::with_mode(
            "a1",
            "g",
            "gain",
            CurveMode::ExpRamp,
            0.0,
            1.0,
            &[(0.0, 1.0), (1.0, 0.0)],
        ));
        assert_eq!(
            validate(&spec),
            Err(SpecError::ReservedCurveMode {
                id: "a1".into(),
                mode: "expRamp".into()
            })
        );
    }

    #[test]
    fn rejects_inverted_window_and_bad_target() {
        let spec = chain().with_automation(AutomationDef::linear(
            "a1",
            "g",
            "gain",
            2.0,
            1.0,
            &[(0.0, 1.0)],
        ));
        assert_eq!(validate(&spec).unwrap_err().kind(), SpecErrorKind::Automation);

        let spec = chain().with_automation(AutomationDef::linear(
            "a1",
            "p",
            "loop",
            0.0,
            1.0,
            &[(0.0, 1.0)],
        ));
        assert_eq!(validate(&spec).unwrap_err().kind(), SpecErrorKind::Param);
    }
}
