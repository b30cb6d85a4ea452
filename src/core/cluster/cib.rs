//! Cluster Information Base parsing
//!
//! Turns the resource manager's CIB document into a typed `ClusterSnapshot`.
//! Text booleans and timestamps are converted here, once, at the boundary.

use std::collections::HashMap;
use tracing::{info, warn};

use crate::domain::entities::{AgentIdentity, ClusterSnapshot, HostId, NodeState};
use crate::error::{AppError, CollectionFailure};

/// Fencing retry count the resource manager uses when none is configured
pub const DEFAULT_STONITH_MAX_ATTEMPTS: u32 = 10;

/// Parse a resource-manager boolean (`true/false`, `yes/no`, `on/off`, `1/0`).
pub fn parse_pcmk_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "y" | "1" => Some(true),
        "false" | "no" | "off" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Status attributes are either a keyword or, on newer releases, the
/// timestamp at which the state was entered (`0` meaning never).
fn status_flag(value: Option<&str>, keyword: &str) -> bool {
    match value {
        None => false,
        Some(v) if v.eq_ignore_ascii_case(keyword) => true,
        Some(v) => v.trim().parse::<u64>().map(|ts| ts > 0).unwrap_or(false),
    }
}

fn child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    tag: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
}

fn nvpairs(node: roxmltree::Node<'_, '_>) -> HashMap<String, String> {
    node.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "nvpair")
        .filter_map(|n| {
            let name = n.attribute("name")?;
            let value = n.attribute("value").unwrap_or("");
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn bool_property(
    properties: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, CollectionFailure> {
    match properties.get(name) {
        None => Ok(default),
        Some(value) => parse_pcmk_bool(value).ok_or_else(|| {
            CollectionFailure::malformed(format!("property {} has non-boolean value {:?}", name, value))
        }),
    }
}

struct NodeStatus {
    in_membership: bool,
    is_daemon_member: bool,
    is_cluster_joined: bool,
}

/// Host carrying a CIB node: by its name, or for a renamed node by the
/// scheduler id it had in the last recorded snapshot.
fn resolve_node(
    identity: &AgentIdentity,
    previous: Option<&ClusterSnapshot>,
    uname: &str,
    id: &str,
) -> Option<HostId> {
    if let Some(host_id) = identity.resolve_host(uname) {
        return Some(host_id);
    }
    let known = previous?
        .nodes
        .values()
        .find(|n| n.scheduler_internal_id == id)?;
    info!(
        host_id = %known.host_id,
        old_name = %known.node_name,
        new_name = %uname,
        "Resolved renamed node by scheduler id"
    );
    Some(known.host_id.clone())
}

/// Parse a CIB document for the pair described by `identity`.
///
/// `previous` is the last recorded snapshot of the pair, used to follow a
/// node whose name changed. Structural problems fail the whole parse; a node
/// that resolves to no known host is logged and skipped.
pub fn parse_cib(
    xml: &str,
    identity: &AgentIdentity,
    previous: Option<&ClusterSnapshot>,
) -> Result<ClusterSnapshot, CollectionFailure> {
    let document = roxmltree::Document::parse(xml)
        .map_err(|e| CollectionFailure::malformed(format!("invalid CIB XML: {}", e)))?;

    let cib = document.root_element();
    if cib.tag_name().name() != "cib" {
        return Err(CollectionFailure::malformed(format!(
            "unexpected root element <{}>",
            cib.tag_name().name()
        )));
    }

    let configuration = child(cib, "configuration")
        .ok_or_else(|| CollectionFailure::malformed("CIB has no <configuration> section"))?;
    let raw_config_blob = xml[configuration.range()].to_string();

    let properties = child(configuration, "crm_config")
        .map(nvpairs)
        .unwrap_or_default();

    let cluster_name = properties
        .get("cluster-name")
        .filter(|name| !name.is_empty())
        .cloned()
        .ok_or_else(|| CollectionFailure::malformed("CIB does not define cluster-name"))?;
    let stonith_enabled = bool_property(&properties, "stonith-enabled", true)?;
    let cluster_maintenance = bool_property(&properties, "maintenance-mode", false)?;
    let stonith_max_attempts = match properties.get("stonith-max-attempts") {
        None => DEFAULT_STONITH_MAX_ATTEMPTS,
        Some(value) => value.trim().parse::<u32>().map_err(|_| {
            CollectionFailure::malformed(format!(
                "stonith-max-attempts is not a number: {:?}",
                value
            ))
        })?,
    };

    let mut statuses: HashMap<String, NodeStatus> = HashMap::new();
    if let Some(status) = child(cib, "status") {
        for node_state in status
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "node_state")
        {
            let Some(id) = node_state.attribute("id") else {
                continue;
            };
            statuses.insert(
                id.to_string(),
                NodeStatus {
                    in_membership: status_flag(node_state.attribute("in_ccm"), "true"),
                    is_daemon_member: status_flag(node_state.attribute("crmd"), "online"),
                    is_cluster_joined: node_state.attribute("join") == Some("member"),
                },
            );
        }
    }

    let mut nodes = Vec::new();
    if let Some(node_list) = child(configuration, "nodes") {
        for node in node_list
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "node")
        {
            let (Some(id), Some(uname)) = (node.attribute("id"), node.attribute("uname")) else {
                warn!(
                    pair_id = %identity.pair_id,
                    "{}",
                    AppError::InconsistentPeerData("node entry without id or uname".to_string())
                );
                continue;
            };
            let Some(host_id) = resolve_node(identity, previous, uname, id) else {
                warn!(
                    pair_id = %identity.pair_id,
                    node_name = %uname,
                    "{}",
                    AppError::InconsistentPeerData(format!(
                        "node {} does not resolve to a known host",
                        uname
                    ))
                );
                continue;
            };

            let node_maintenance = child(node, "instance_attributes")
                .map(nvpairs)
                .and_then(|attrs| attrs.get("maintenance").and_then(|v| parse_pcmk_bool(v)))
                .unwrap_or(false);
            let status = statuses.get(id);

            nodes.push(NodeState {
                host_id,
                node_name: uname.to_string(),
                scheduler_internal_id: id.to_string(),
                in_membership: status.map(|s| s.in_membership).unwrap_or(false),
                is_daemon_member: status.map(|s| s.is_daemon_member).unwrap_or(false),
                is_cluster_joined: status.map(|s| s.is_cluster_joined).unwrap_or(false),
                maintenance_mode: node_maintenance || cluster_maintenance,
            });
        }
    }

    Ok(ClusterSnapshot {
        pair_id: identity.pair_id.clone(),
        cluster_name,
        stonith_enabled,
        stonith_max_attempts,
        raw_config_blob,
        nodes: HashMap::new(),
    }
    .with_nodes(nodes))
}
