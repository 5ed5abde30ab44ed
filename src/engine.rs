//! Health engine: drives one tick —
//! `reconcile_graph → refresh_metrics → aggregate_health → publish`.

use crate::error::AgentError;
use crate::graph::node::HostOs;
use crate::graph::Graph;
use crate::metrics::{MetricRegistry, MetricStore};
use crate::rules::CompiledRule;
use crate::snapshot::Snapshot;

pub struct HealthEngine {
    graph: Graph,
    registry: MetricRegistry,
}

impl HealthEngine {
    pub fn new(
        registry: MetricRegistry,
        rules: Vec<CompiledRule>,
        host_os: HostOs,
        sample_period_secs: u64,
    ) -> Self {
        Self {
            graph: Graph::build(rules, host_os, sample_period_secs),
            registry,
        }
    }

    /// Runs exactly one tick against `store`. The ordering is strict and the
    /// whole cycle always completes: a failing producer or a missing raw
    /// metric degrades individual samples, never the publication.
    pub fn update(&mut self, store: &mut MetricStore) -> Snapshot {
        self.graph.reconcile_graph(store);
        self.graph.refresh_metrics(store, &self.registry);
        let symptoms = self.graph.aggregate_health(store);
        Snapshot::from_graph(&self.graph, symptoms)
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineInitError {
    #[error(transparent)]
    Agent(#[from] AgentError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Scope;
    use std::io::Write;

    fn build_engine(rule_rows: &[(&str, &str, &str, &str)]) -> (HealthEngine, MetricStore) {
        let mut desc_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(desc_file, "name,owner_class,value_type,unit,is_list,is_counter,warn,crit").unwrap();
        writeln!(desc_file, "cpu_idle,bm/cpu,float,,0,0,,").unwrap();
        let (registry, _) = MetricRegistry::load(desc_file.path()).unwrap();

        let mut rule_file = tempfile::NamedTempFile::new().unwrap();
        writeln!(rule_file, "name,path,severity,rule").unwrap();
        for (name, path, sev, rule) in rule_rows {
            writeln!(rule_file, "{name},{path},{sev},\"{rule}\"").unwrap();
        }
        let (rules, _) = crate::rules::load(rule_file.path(), &registry).unwrap();

        (HealthEngine::new(registry, rules, HostOs::Linux, 3), MetricStore::new())
    }

    #[test]
    fn tick_publishes_a_complete_snapshot_even_with_no_raw_data() {
        let (mut engine, mut store) = build_engine(&[]);
        let snapshot = engine.update(&mut store);
        assert!(snapshot.nodes.iter().any(|n| n.id == "/node"));
        assert_eq!(snapshot.health_scores.get("/node"), Some(&100));
    }

    #[test]
    fn two_consecutive_ticks_with_no_raw_change_are_idempotent() {
        let (mut engine, mut store) = build_engine(&[("R1", "node/bm/cpu", "orange", "cpu_idle.top < 5")]);
        store
            .ensure(Scope::Assurance, "node/bm/cpu/cpu_idle", || {
                crate::metrics::RingBuffer::new(4, crate::metrics::ValueType::Float, None, false, None)
            })
            .append("cpu_idle", 3.0.into())
            .unwrap();
        let first = engine.update(&mut store);
        let second = engine.update(&mut store);
        assert_eq!(first.health_scores, second.health_scores);
    }
}
