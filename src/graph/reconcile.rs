//! Reconciliation: diff observed vm/kb instances against the current graph,
//! add/remove children, recompute `active`.

use chrono::Utc;

use super::arena::NodeId;
use super::node::{HostOs, NodeRecord, SubserviceKind};
use super::{bind_symptoms, Graph};
use crate::metrics::{MetricStore, RingBuffer, Scope, ValueType};

/// Raw scope vm/kb instances are discovered under:
/// `<hypervisor>/vms/<name>/...` and `<framework>/gnmi/<name>/...`.
const RAW_VM_SCOPE: &str = "hypervisor/vms";
const RAW_KB_SCOPE: &str = "gnmi";

/// Static resource children hung under every `vm`/`kb` instance, per the
/// fixed topology template.
const VM_RESOURCES: &[&str] = &["cpu", "mem", "net", "proc"];
const KB_RESOURCES: &[&str] = &["proc", "mem", "net"];

pub fn reconcile(graph: &mut Graph, store: &mut MetricStore) -> bool {
    let mut changed = false;
    changed |= reconcile_kind(graph, store, SubserviceKind::Vm, RAW_VM_SCOPE, "vm", VM_RESOURCES);
    changed |= reconcile_kind(graph, store, SubserviceKind::KbNet, RAW_KB_SCOPE, "kb", KB_RESOURCES);
    changed |= reconcile_interfaces(graph, store);
    update_active_flags(graph, store);
    if changed {
        graph.dependency_graph_changed = Utc::now();
    }
    changed
}

fn reconcile_kind(
    graph: &mut Graph,
    store: &mut MetricStore,
    kind: SubserviceKind,
    raw_scope: &str,
    segment: &str,
    resources: &[&str],
) -> bool {
    let observed: Vec<String> = store.keys_under(Scope::Raw, raw_scope);
    let root = graph.root;

    let current: Vec<(NodeId, String)> = graph
        .arena
        .get(root)
        .unwrap()
        .children
        .iter()
        .filter_map(|(id, _)| {
            let node = graph.arena.get(*id)?;
            if node.kind == kind {
                Some((*id, node.instance.clone().unwrap_or_default()))
            } else {
                None
            }
        })
        .collect();

    let mut changed = false;

    for (id, name) in &current {
        if !observed.contains(name) {
            detach(graph, store, *id);
            changed = true;
        }
    }

    for name in &observed {
        if !current.iter().any(|(_, n)| n == name) {
            attach(graph, kind, segment, name, resources);
            changed = true;
        }
    }

    changed
}

fn detach(graph: &mut Graph, store: &mut MetricStore, id: NodeId) {
    let mut stack = vec![id];
    let mut to_remove = Vec::new();
    while let Some(current) = stack.pop() {
        if let Some(node) = graph.arena.get(current) {
            stack.extend(node.children.iter().map(|(c, _)| *c));
            to_remove.push(current);
        }
    }
    let Some(node) = graph.arena.get(id) else { return };
    let instance_path = node.instance_path.clone();
    let parent = node.parent;
    store.drop_subtree(Scope::Assurance, &instance_path);
    store.drop_subtree(Scope::Raw, &instance_path);
    for removed in to_remove {
        graph.arena.remove(removed);
    }
    if let Some(parent) = parent {
        if let Some(parent_node) = graph.arena.get_mut(parent) {
            parent_node.remove_child(id);
        }
    }
}

fn attach(graph: &mut Graph, kind: SubserviceKind, segment: &str, name: &str, resources: &[&str]) {
    let root = graph.root;
    let instance_path = format!("node/{segment}/{name}");
    let type_path = format!("node/{segment}");
    let id = graph.arena.insert(NodeRecord::new(
        kind,
        segment.to_string(),
        Some(name.to_string()),
        instance_path.clone(),
        type_path.clone(),
        Some(root),
    ));
    bind_symptoms(&mut graph.arena, id, &graph.rules, &type_path);
    graph.arena.get_mut(root).unwrap().add_child(id, true);

    for resource in resources {
        let resource_instance_path = format!("{instance_path}/{resource}");
        let resource_type_path = format!("{type_path}/{resource}");
        let resource_id = graph.arena.insert(NodeRecord::new(
            SubserviceKind::Resource,
            resource.to_string(),
            None,
            resource_instance_path,
            resource_type_path.clone(),
            Some(id),
        ));
        bind_symptoms(&mut graph.arena, resource_id, &graph.rules, &resource_type_path);
        graph.arena.get_mut(id).unwrap().add_child(resource_id, true);
    }
}

/// Discovers the interface instances under every live `net` resource node
/// (`net ── if*`) and reconciles `if` children exactly like `reconcile_kind`
/// does for `vm`/`kb`, keyed by the raw scope the owning `net` node itself
/// resolves to (the `/node/bm/net/<ifname>/rx_bytes` path form).
fn reconcile_interfaces(graph: &mut Graph, store: &mut MetricStore) -> bool {
    let net_nodes: Vec<NodeId> = graph
        .arena
        .iter_live()
        .filter(|(_, n)| n.kind == SubserviceKind::Resource && n.name == "net")
        .map(|(id, _)| id)
        .collect();

    let mut changed = false;
    for net_id in net_nodes {
        let node = graph.arena.get(net_id).unwrap();
        let net_instance_path = node.instance_path.clone();
        let net_type_path = node.type_path.clone();
        let raw_scope = super::raw_path_for(&net_instance_path);
        let observed: Vec<String> = store.keys_under(Scope::Raw, &raw_scope);

        let current: Vec<(NodeId, String)> = graph
            .arena
            .get(net_id)
            .unwrap()
            .children
            .iter()
            .filter_map(|(id, _)| {
                let n = graph.arena.get(*id)?;
                (n.kind == SubserviceKind::Resource && n.name == "if")
                    .then(|| (*id, n.instance.clone().unwrap_or_default()))
            })
            .collect();

        for (id, name) in &current {
            if !observed.contains(name) {
                detach(graph, store, *id);
                changed = true;
            }
        }

        for name in &observed {
            if current.iter().any(|(_, n)| n == name) {
                continue;
            }
            let if_instance_path = format!("{net_instance_path}/{name}");
            let if_type_path = format!("{net_type_path}/if");
            let if_id = graph.arena.insert(NodeRecord::new(
                SubserviceKind::Resource,
                "if".to_string(),
                Some(name.clone()),
                if_instance_path,
                if_type_path.clone(),
                Some(net_id),
            ));
            bind_symptoms(&mut graph.arena, if_id, &graph.rules, &if_type_path);
            graph.arena.get_mut(net_id).unwrap().add_child(if_id, true);
            changed = true;
        }
    }
    changed
}

/// Computes `active` from the raw liveness field and copies that same field
/// into the assurance scope unconditionally. This runs ahead of the
/// active-gated refresh pass so an "is down" symptom bound to an inactive
/// vm/kb node still has the one metric it needs to fire: inactive subtrees
/// skip refresh but still evaluate symptoms.
fn update_active_flags(graph: &mut Graph, store: &mut MetricStore) {
    let root = graph.root;
    let children: Vec<NodeId> = graph.arena.get(root).unwrap().children.iter().map(|(id, _)| *id).collect();
    for id in children {
        let node = graph.arena.get(id).unwrap();
        let (active, liveness_field, raw_value) = match node.kind {
            SubserviceKind::Vm => {
                let name = node.instance.clone().unwrap_or_default();
                let raw_value = store
                    .get(Scope::Raw, &format!("{RAW_VM_SCOPE}/{name}/state"))
                    .ok()
                    .and_then(|b| b.top().cloned());
                let active = raw_value
                    .as_ref()
                    .and_then(|v| v.as_str().map(|s| s == "Running"))
                    .unwrap_or(true);
                (active, Some("state"), raw_value)
            }
            SubserviceKind::KbNet => {
                let name = node.instance.clone().unwrap_or_default();
                let raw_value = store
                    .get(Scope::Raw, &format!("{RAW_KB_SCOPE}/{name}/status"))
                    .ok()
                    .and_then(|b| b.top().cloned());
                let active = raw_value
                    .as_ref()
                    .and_then(|v| v.as_str().map(|s| s == "synced"))
                    .unwrap_or(true);
                (active, Some("status"), raw_value)
            }
            _ => (true, None, None),
        };
        let instance_path = graph.arena.get(id).unwrap().instance_path.clone();
        graph.arena.get_mut(id).unwrap().active = active;

        if let (Some(field), Some(value)) = (liveness_field, raw_value) {
            store
                .ensure(Scope::Assurance, &format!("{instance_path}/{field}"), || {
                    RingBuffer::new(5, ValueType::Str, None, false, None)
                })
                .append(field, value)
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricValue, RingBuffer, ValueType};

    fn graph() -> Graph {
        Graph::build(Vec::new(), HostOs::Linux, 3)
    }

    fn mark_observed(store: &mut MetricStore, scope: &str, name: &str) {
        store
            .ensure(Scope::Raw, &format!("{scope}/{name}/state"), || {
                RingBuffer::new(4, ValueType::Str, None, false, None)
            })
            .append("state", MetricValue::Str("Running".into()))
            .unwrap();
    }

    #[test]
    fn reconciliation_adds_and_removes_vm_children() {
        let mut graph = graph();
        let mut store = MetricStore::new();
        mark_observed(&mut store, RAW_VM_SCOPE, "vm1");
        mark_observed(&mut store, RAW_VM_SCOPE, "vm2");
        reconcile(&mut graph, &mut store);

        let vm_names = |g: &Graph| -> Vec<String> {
            g.arena
                .get(g.root)
                .unwrap()
                .children
                .iter()
                .filter_map(|(id, _)| g.arena.get(*id))
                .filter(|n| n.kind == SubserviceKind::Vm)
                .filter_map(|n| n.instance.clone())
                .collect()
        };
        let mut names = vm_names(&graph);
        names.sort();
        assert_eq!(names, vec!["vm1", "vm2"]);

        store.drop_subtree(Scope::Raw, &format!("{RAW_VM_SCOPE}/vm2"));
        reconcile(&mut graph, &mut store);
        assert_eq!(vm_names(&graph), vec!["vm1".to_string()]);
        assert!(store.get(Scope::Assurance, "node/vm/vm2/cpu/usage").is_err());
    }

    #[test]
    fn vm_fullname_embeds_instance_identity_without_a_redundant_segment() {
        let mut graph = graph();
        let mut store = MetricStore::new();
        mark_observed(&mut store, RAW_VM_SCOPE, "vm1");
        reconcile(&mut graph, &mut store);

        let vm_id = graph
            .arena
            .get(graph.root)
            .unwrap()
            .children
            .iter()
            .find(|(id, _)| graph.arena.get(*id).unwrap().kind == SubserviceKind::Vm)
            .unwrap()
            .0;
        assert_eq!(graph.fullname_of(vm_id), "/node/vm[name=vm1]");

        let cpu_id = graph
            .arena
            .get(vm_id)
            .unwrap()
            .children
            .iter()
            .find(|(id, _)| graph.arena.get(*id).unwrap().name == "cpu")
            .unwrap()
            .0;
        assert_eq!(graph.fullname_of(cpu_id), "/node/vm[name=vm1]/cpu");
    }

    #[test]
    fn discovered_interfaces_become_if_children_of_their_net_node() {
        let mut graph = graph();
        let mut store = MetricStore::new();
        store
            .ensure(Scope::Raw, "net/dev/eth0/rx_bytes", || {
                RingBuffer::new(4, ValueType::Int, None, true, None)
            })
            .append("rx_bytes", MetricValue::Int(100))
            .unwrap();
        reconcile(&mut graph, &mut store);

        let bm_id = graph.arena.get(graph.root).unwrap().children[0].0;
        let net_id = graph
            .arena
            .get(bm_id)
            .unwrap()
            .children
            .iter()
            .find(|(id, _)| graph.arena.get(*id).unwrap().name == "net")
            .unwrap()
            .0;
        let if_names: Vec<String> = graph
            .arena
            .get(net_id)
            .unwrap()
            .children
            .iter()
            .filter_map(|(id, _)| graph.arena.get(*id).unwrap().instance.clone())
            .collect();
        assert_eq!(if_names, vec!["eth0".to_string()]);

        let if_id = graph.arena.get(net_id).unwrap().children[0].0;
        assert_eq!(graph.fullname_of(if_id), "/node/bm/net/if[name=eth0]");

        store.drop_subtree(Scope::Raw, "net/dev/eth0");
        reconcile(&mut graph, &mut store);
        assert!(graph.arena.get(net_id).unwrap().children.is_empty());
    }

    #[test]
    fn inactive_vm_is_flagged_and_skips_refresh_but_keeps_symptoms_bound() {
        let rules = {
            let mut f = tempfile::NamedTempFile::new().unwrap();
            use std::io::Write;
            let mut rf = tempfile::NamedTempFile::new().unwrap();
            writeln!(f, "name,owner_class,value_type,unit,is_list,is_counter,warn,crit").unwrap();
            writeln!(f, "state,vm,str,,0,0,,").unwrap();
            let (registry, _) = crate::metrics::MetricRegistry::load(f.path()).unwrap();
            writeln!(rf, "name,path,severity,rule").unwrap();
            writeln!(rf, "R1,node/vm,red,\"state != \"\"Running\"\"\"").unwrap();
            crate::rules::load(rf.path(), &registry).unwrap().0
        };
        let mut graph = Graph::build(rules, HostOs::Linux, 3);
        let mut store = MetricStore::new();
        store
            .ensure(Scope::Raw, &format!("{RAW_VM_SCOPE}/vm1/state"), || {
                RingBuffer::new(4, ValueType::Str, None, false, None)
            })
            .append("state", MetricValue::Str("PoweredOff".into()))
            .unwrap();
        reconcile(&mut graph, &mut store);

        let vm_id = graph
            .arena
            .get(graph.root)
            .unwrap()
            .children
            .iter()
            .find(|(id, _)| graph.arena.get(*id).unwrap().kind == SubserviceKind::Vm)
            .unwrap()
            .0;
        assert!(!graph.arena.get(vm_id).unwrap().active);
        assert_eq!(graph.arena.get(vm_id).unwrap().symptoms.len(), 1);
    }
}
