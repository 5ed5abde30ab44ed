//! Snapshot view: a read-only, serializable record of one tick's results,
//! built fresh from the graph for external consumers.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::node::PositiveSymptom;
use crate::graph::Graph;
use crate::severity::Severity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomView {
    pub id: String,
    pub weight: u32,
    pub label: String,
    pub start_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Impacting,
    Informational,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyView {
    pub id: String,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    pub id: String,
    pub label: String,
    pub health_score: u32,
    pub last_change: DateTime<Utc>,
    pub symptoms: Vec<SymptomView>,
    pub dependencies: Vec<DependencyView>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parameters: Option<NodeParameters>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeParameters {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub dependency_graph_changed: DateTime<Utc>,
    pub nodes: Vec<NodeView>,
    pub health_scores: HashMap<String, u32>,
    pub symptoms: Vec<SymptomRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomRecord {
    pub owner: String,
    pub rule_name: String,
    pub severity: Severity,
    pub start_ts: DateTime<Utc>,
}

/// A fired symptom's identity is stable across ticks and unique per
/// (rule, bound node) pair, so the same rule firing on two different nodes
/// (two interfaces, two VMs, ...) never collides.
fn symptom_id(rule_name: &str, fullname: &str) -> String {
    let mut hasher = DefaultHasher::new();
    rule_name.hash(&mut hasher);
    fullname.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl Snapshot {
    pub fn from_graph(graph: &Graph, symptoms: Vec<(String, PositiveSymptom)>) -> Self {
        let mut nodes = Vec::new();
        let mut health_scores = HashMap::new();

        for (id, record) in graph.arena.iter_live() {
            let fullname = graph.fullname_of(id);
            health_scores.insert(fullname.clone(), record.health_score);

            let symptom_views: Vec<SymptomView> = record
                .symptoms
                .iter()
                .filter(|b| b.currently_firing)
                .map(|b| SymptomView {
                    id: symptom_id(&b.rule.name, &fullname),
                    weight: b.rule.severity.weight(),
                    label: b.rule.name.clone(),
                    start_ts: b.start_ts.unwrap_or_else(Utc::now),
                })
                .collect();

            let dependencies: Vec<DependencyView> = record
                .children
                .iter()
                .filter_map(|(child_id, impacting)| {
                    graph.arena.get(*child_id)?;
                    Some(DependencyView {
                        id: graph.fullname_of(*child_id),
                        kind: if *impacting {
                            DependencyKind::Impacting
                        } else {
                            DependencyKind::Informational
                        },
                    })
                })
                .collect();

            nodes.push(NodeView {
                id: fullname,
                label: record.name.clone(),
                health_score: record.health_score,
                last_change: record.last_change,
                symptoms: symptom_views,
                dependencies,
                parameters: Some(NodeParameters {
                    path: record.type_path.clone(),
                    name: record.instance.clone().unwrap_or_else(|| record.name.clone()),
                }),
            });
        }

        let symptom_records = symptoms
            .into_iter()
            .map(|(owner, s)| SymptomRecord {
                owner,
                rule_name: s.rule_name,
                severity: s.severity,
                start_ts: s.start_ts,
            })
            .collect();

        Snapshot {
            dependency_graph_changed: graph.dependency_graph_changed,
            nodes,
            health_scores,
            symptoms: symptom_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::HostOs;

    #[test]
    fn snapshot_contains_an_entry_for_every_live_node() {
        let graph = Graph::build(Vec::new(), HostOs::Linux, 3);
        let snapshot = Snapshot::from_graph(&graph, Vec::new());
        assert!(snapshot.nodes.iter().any(|n| n.id == "/node"));
        assert!(snapshot.nodes.iter().any(|n| n.id == "/node/bm"));
        assert!(snapshot.nodes.iter().any(|n| n.id == "/node/bm/cpu"));
    }

    #[test]
    fn serializing_then_deserializing_a_snapshot_is_an_identity() {
        let graph = Graph::build(Vec::new(), HostOs::Linux, 3);
        let snapshot = Snapshot::from_graph(&graph, Vec::new());
        let json = serde_json::to_string(&snapshot).unwrap();
        let round_tripped: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped.health_scores, snapshot.health_scores);
        assert_eq!(round_tripped.nodes.len(), snapshot.nodes.len());
    }

    #[test]
    fn symptom_id_is_stable_and_distinguishes_same_rule_on_different_nodes() {
        let a = symptom_id("net_link_down", "/node[name=h]/bm/net/if[name=eth0]");
        let b = symptom_id("net_link_down", "/node[name=h]/bm/net/if[name=eth1]");
        assert_ne!(a, b);
        assert_eq!(a, symptom_id("net_link_down", "/node[name=h]/bm/net/if[name=eth0]"));
    }
}
