//! Subservice node record. Polymorphism across subservice kinds is a tagged
//! variant, not inheritance; shared machinery (symptoms, scoring, children)
//! lives on `NodeRecord` itself.

use chrono::{DateTime, Utc};

use super::arena::NodeId;
use crate::rules::CompiledRule;
use crate::severity::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubserviceKind {
    Node,
    Baremetal,
    Vm,
    KbNet,
    Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Linux,
    Windows,
    MacOs,
}

#[derive(Debug, Clone)]
pub struct PositiveSymptom {
    pub rule_name: String,
    pub severity: Severity,
    pub start_ts: DateTime<Utc>,
}

/// One binding of a loaded rule to a node, plus the bookkeeping needed to
/// compute `start_ts`, which resets after one silent cycle.
#[derive(Debug, Clone)]
pub struct SymptomBinding {
    pub rule: CompiledRule,
    pub currently_firing: bool,
    pub start_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub kind: SubserviceKind,
    /// The node's own path segment, e.g. "cpu", "vm".
    pub name: String,
    /// Instance name for a dynamic `vm`/`kb` node (e.g. "v1"), absent on
    /// static topology nodes.
    pub instance: Option<String>,
    /// Store path, instance-qualified: "node/vm/v1/cpu".
    pub instance_path: String,
    /// Type path, instance-free: "node/vm/cpu". Used for rule binding and
    /// refresh dispatch, which are defined over the fixed topology template.
    pub type_path: String,
    pub parent: Option<NodeId>,
    pub children: Vec<(NodeId, bool)>,
    /// True until reconciliation determines otherwise (vm/kb liveness check).
    pub active: bool,
    pub health_score: u32,
    pub last_change: DateTime<Utc>,
    pub symptoms: Vec<SymptomBinding>,
    pub positive_symptoms: Vec<PositiveSymptom>,
}

impl NodeRecord {
    pub fn new(
        kind: SubserviceKind,
        name: String,
        instance: Option<String>,
        instance_path: String,
        type_path: String,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            kind,
            name,
            instance,
            instance_path,
            type_path,
            parent,
            children: Vec::new(),
            active: true,
            health_score: 100,
            last_change: Utc::now(),
            symptoms: Vec::new(),
            positive_symptoms: Vec::new(),
        }
    }

    pub fn add_child(&mut self, child: NodeId, impacting: bool) {
        self.children.push((child, impacting));
    }

    pub fn remove_child(&mut self, child: NodeId) {
        self.children.retain(|(id, _)| *id != child);
    }
}
