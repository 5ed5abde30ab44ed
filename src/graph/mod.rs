//! Subservice dependency graph: fixed topology template with dynamic
//! vm/kb instances, bottom-up health aggregation.

pub mod arena;
pub mod node;
pub mod reconcile;
pub mod refresh;

use chrono::{DateTime, Utc};

use arena::{Arena, NodeId};
use node::{HostOs, NodeRecord, PositiveSymptom, SubserviceKind, SymptomBinding};
use refresh::RefreshTable;

use crate::metrics::{MetricRegistry, MetricStore, Scope};
use crate::rules::{evaluate, CompiledRule};

pub struct Graph {
    pub arena: Arena,
    pub root: NodeId,
    pub host_os: HostOs,
    pub rules: Vec<CompiledRule>,
    pub dependency_graph_changed: DateTime<Utc>,
    sample_period_secs: u64,
    refresh_table: RefreshTable,
}

/// Static topology branches hung directly off `node/bm`:
/// `bm ── { cpu, sensors, disks, mem, proc, net }`.
const BAREMETAL_RESOURCES: &[&str] = &["cpu", "sensors", "disks", "mem", "proc", "net"];

impl Graph {
    pub fn build(rules: Vec<CompiledRule>, host_os: HostOs, sample_period_secs: u64) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(NodeRecord::new(
            SubserviceKind::Node,
            "node".to_string(),
            None,
            "node".to_string(),
            "node".to_string(),
            None,
        ));
        bind_symptoms(&mut arena, root, &rules, "node");

        let bm = arena.insert(NodeRecord::new(
            SubserviceKind::Baremetal,
            "bm".to_string(),
            None,
            "node/bm".to_string(),
            "node/bm".to_string(),
            Some(root),
        ));
        bind_symptoms(&mut arena, bm, &rules, "node/bm");
        arena.get_mut(root).unwrap().add_child(bm, true);

        for resource in BAREMETAL_RESOURCES {
            let type_path = format!("node/bm/{resource}");
            let id = arena.insert(NodeRecord::new(
                SubserviceKind::Resource,
                resource.to_string(),
                None,
                type_path.clone(),
                type_path.clone(),
                Some(bm),
            ));
            bind_symptoms(&mut arena, id, &rules, &type_path);
            arena.get_mut(bm).unwrap().add_child(id, true);
        }

        Self {
            arena,
            root,
            host_os,
            rules,
            dependency_graph_changed: Utc::now(),
            sample_period_secs,
            refresh_table: RefreshTable::build(),
        }
    }

    fn bm_id(&self) -> NodeId {
        self.arena.get(self.root).unwrap().children[0].0
    }

    /// IETF-service-assurance-style fullname, built by walking
    /// parent pointers from `id` to the root: each instance-bearing ancestor
    /// (vm/kb/if) renders as `kind[name=instance]`, e.g.
    /// `/node[name=host]/vm[name=v1]/net/if[name=eth0]`.
    pub fn fullname_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.arena.get(cur).unwrap();
            segments.push(match &node.instance {
                Some(inst) => format!("{}[name={}]", node.name, inst),
                None => node.name.clone(),
            });
            current = node.parent;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    pub fn reconcile_graph(&mut self, store: &mut MetricStore) {
        reconcile::reconcile(self, store);
    }

    /// Pre-order walk refreshing assurance metrics from raw producer data,
    /// skipping inactive subtrees.
    pub fn refresh_metrics(&mut self, store: &mut MetricStore, registry: &MetricRegistry) {
        let root = self.root;
        self.refresh_node(root, store, registry);
    }

    fn refresh_node(&mut self, id: NodeId, store: &mut MetricStore, registry: &MetricRegistry) {
        let Some(node) = self.arena.get(id) else { return };
        if !node.active {
            return;
        }
        let type_path = node.type_path.clone();
        let instance_path = node.instance_path.clone();
        let children: Vec<NodeId> = node.children.iter().map(|(id, _)| *id).collect();

        let key = owning_type_key(&type_path);
        if let Some(refresh_fn) = self.refresh_table.get(self.host_os, &key) {
            let raw_path = raw_path_for(&instance_path);
            if let Err(e) = refresh_fn(store, registry, &raw_path, &instance_path, self.sample_period_secs) {
                log::warn!("refresh of {instance_path} ({key}) failed: {e}");
            }
        }

        for child in children {
            self.refresh_node(child, store, registry);
        }
    }

    /// Post-order health aggregation. Returns the flat list of all firing
    /// positive symptoms across the whole tree.
    pub fn aggregate_health(&mut self, store: &MetricStore) -> Vec<(String, PositiveSymptom)> {
        let root = self.root;
        let mut out = Vec::new();
        self.aggregate_node(root, store, &mut out);
        out
    }

    fn aggregate_node(
        &mut self,
        id: NodeId,
        store: &MetricStore,
        out: &mut Vec<(String, PositiveSymptom)>,
    ) -> u32 {
        let children: Vec<(NodeId, bool)> = self.arena.get(id).unwrap().children.clone();

        let mut child_malus = 0u32;
        for (child_id, impacting) in &children {
            let child_score = self.aggregate_node(*child_id, store, out);
            if *impacting {
                child_malus += 100 - child_score;
            }
        }

        let fullname = self.fullname_of(id);
        let node = self.arena.get_mut(id).unwrap();
        let scope_path = node.instance_path.clone();
        let now = Utc::now();
        let mut symptom_malus = 0u32;

        for binding in &mut node.symptoms {
            let firing = evaluate(&binding.rule.expr, store, &scope_path);
            if firing {
                if !binding.currently_firing {
                    binding.start_ts = Some(now);
                }
                binding.currently_firing = true;
                symptom_malus += binding.rule.severity.weight();
                out.push((
                    fullname.clone(),
                    PositiveSymptom {
                        rule_name: binding.rule.name.clone(),
                        severity: binding.rule.severity,
                        start_ts: binding.start_ts.unwrap_or(now),
                    },
                ));
            } else {
                binding.currently_firing = false;
                binding.start_ts = None;
            }
        }

        let score = 100u32.saturating_sub(child_malus).saturating_sub(symptom_malus);
        let node = self.arena.get_mut(id).unwrap();
        if node.health_score != score {
            node.last_change = now;
        }
        node.health_score = score;
        node.positive_symptoms = out
            .iter()
            .filter(|(owner, _)| owner == &fullname)
            .map(|(_, s)| s.clone())
            .collect();
        score
    }
}

/// Type path (instance-free) to refresh-dispatch key: just the segments
/// after `node/`. `node/bm/net/if` and `node/bm/cpu` both dispatch by their
/// full remaining path, so an `if` child's refresh function is distinct from
/// its owning `net` resource's.
fn owning_type_key(type_path: &str) -> String {
    type_path.strip_prefix("node/").unwrap_or(type_path).to_string()
}

/// Maps an assurance instance path to the raw scope a producer publishes
/// into for that subtree. Baremetal reads from the top-level raw namespaces
/// `/proc` producers publish into; vm/kb read from their instance-qualified namespace
/// under `hypervisor/vms/<name>/...` / `gnmi/<name>/...`. A `net` child's
/// `if` instance (e.g. `node/bm/net/eth0`) resolves one level deeper, to the
/// interface's own raw sub-scope.
fn raw_path_for(instance_path: &str) -> String {
    if let Some(rest) = instance_path.strip_prefix("node/bm/") {
        let mut segments = rest.splitn(2, '/');
        match segments.next().unwrap_or(rest) {
            "cpu" => "stat/cpu/cpu0".to_string(),
            "mem" => "meminfo".to_string(),
            "disks" => "diskstats".to_string(),
            "sensors" => "sensors".to_string(),
            "net" => match segments.next() {
                Some(ifname) => format!("net/dev/{ifname}"),
                None => "net/dev".to_string(),
            },
            _ => rest.to_string(),
        }
    } else if let Some(rest) = instance_path.strip_prefix("node/vm/") {
        format!("hypervisor/vms/{rest}")
    } else if let Some(rest) = instance_path.strip_prefix("node/kb/") {
        format!("gnmi/{rest}")
    } else {
        instance_path.to_string()
    }
}

/// Binds every rule whose `path` names `type_path` exactly. A per-interface
/// rule's path already equals an `if` child's own `type_path` (e.g.
/// `node/bm/net/if`), since each discovered interface is a real node in the
/// arena — no special-casing is needed here, unlike dispatch over a single
/// shared scope.
fn bind_symptoms(arena: &mut Arena, id: NodeId, rules: &[CompiledRule], type_path: &str) {
    let bindings: Vec<SymptomBinding> = rules
        .iter()
        .filter(|r| r.path == type_path)
        .map(|r| SymptomBinding {
            rule: r.clone(),
            currently_firing: false,
            start_ts: None,
        })
        .collect();
    arena.get_mut(id).unwrap().symptoms = bindings;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricRegistry, RingBuffer, ValueType};
    use std::io::Write;

    fn registry_with_cpu_idle() -> MetricRegistry {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "name,owner_class,value_type,unit,is_list,is_counter,warn,crit").unwrap();
        writeln!(f, "cpu_idle,bm/cpu,float,,0,0,,").unwrap();
        MetricRegistry::load(f.path()).unwrap().0
    }

    fn rules(rows: &[(&str, &str, &str, &str)]) -> Vec<CompiledRule> {
        let registry = registry_with_cpu_idle();
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "name,path,severity,rule").unwrap();
        for (name, path, sev, rule) in rows {
            writeln!(f, "{name},{path},{sev},\"{rule}\"").unwrap();
        }
        crate::rules::load(f.path(), &registry).unwrap().0
    }

    #[test]
    fn score_arithmetic_scenario() {
        let rules = rules(&[("R1", "node/bm/cpu", "orange", "cpu_idle.top < 5")]);
        let mut graph = Graph::build(rules, HostOs::Linux, 3);
        let mut store = MetricStore::new();
        store
            .ensure(Scope::Assurance, "node/bm/cpu/cpu_idle", || {
                RingBuffer::new(4, ValueType::Float, None, false, None)
            })
            .append("cpu_idle", 3.0.into())
            .unwrap();

        let symptoms = graph.aggregate_health(&store);
        let cpu_id = graph.arena.get(graph.bm_id()).unwrap().children[0].0;
        assert_eq!(graph.arena.get(cpu_id).unwrap().health_score, 50);
        assert_eq!(graph.arena.get(graph.bm_id()).unwrap().health_score, 50);
        assert_eq!(graph.arena.get(graph.root).unwrap().health_score, 50);
        assert_eq!(symptoms.len(), 1);
        assert_eq!(symptoms[0].1.rule_name, "R1");
    }

    #[test]
    fn node_with_no_symptoms_and_no_impacting_children_scores_100() {
        let graph = Graph::build(Vec::new(), HostOs::Linux, 3);
        let store = MetricStore::new();
        let mut graph = graph;
        graph.aggregate_health(&store);
        let leaf = graph.arena.get(graph.bm_id()).unwrap().children[0].0;
        assert_eq!(graph.arena.get(leaf).unwrap().health_score, 100);
    }

    #[test]
    fn rule_that_never_fires_contributes_zero_malus() {
        let rules = rules(&[("R1", "node/bm/cpu", "red", "cpu_idle.top < 5")]);
        let mut graph = Graph::build(rules, HostOs::Linux, 3);
        let mut store = MetricStore::new();
        store
            .ensure(Scope::Assurance, "node/bm/cpu/cpu_idle", || {
                RingBuffer::new(4, ValueType::Float, None, false, None)
            })
            .append("cpu_idle", 50.0.into())
            .unwrap();
        graph.aggregate_health(&store);
        let cpu_id = graph.arena.get(graph.bm_id()).unwrap().children[0].0;
        assert_eq!(graph.arena.get(cpu_id).unwrap().health_score, 100);
    }
}
