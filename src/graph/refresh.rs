//! Metric refresh dispatch: `(host_os, type_path) -> refresh fn`. Only the
//! Linux entries do real work; Windows/MacOS are present as documented
//! no-ops, since this host doesn't yet have a `/proc`-equivalent collector
//! wired up for them.

use std::collections::HashMap;

use log::debug;

use super::node::HostOs;
use crate::error::AgentError;
use crate::metrics::{MetricRegistry, MetricStore, Scope};

pub type RefreshFn = fn(&mut MetricStore, &MetricRegistry, &str, &str, u64) -> Result<(), AgentError>;

/// Copies the latest raw sample of every metric declared against
/// `owner_class` from `raw_path` into the matching assurance ring buffer
/// under `assurance_path`. The group of assurance buffers is materialised
/// through `MetricRegistry::init_group`, the same constructor subservice
/// nodes use everywhere else, so every metric in the group gets a
/// consistently capacity- and threshold-configured buffer rather than one
/// built ad hoc per call site. A metric missing from the raw scope is a
/// silent no-op for that metric; one miss never aborts the refresh of
/// sibling metrics.
fn refresh_owner_class(
    owner_class: &str,
) -> impl Fn(&mut MetricStore, &MetricRegistry, &str, &str, u64) -> Result<(), AgentError> + 'static
{
    let owner_class = owner_class.to_string();
    move |store, registry, raw_path, assurance_path, sample_period_secs| {
        let group = registry.init_group(&owner_class, sample_period_secs);
        for (name, template) in group {
            let raw_metric_path = format!("{raw_path}/{name}");
            let raw_value = match store.get(Scope::Raw, &raw_metric_path) {
                Ok(buf) => buf.top().cloned(),
                Err(_) => {
                    debug!("missing raw scope {raw_metric_path}");
                    continue;
                }
            };
            let Some(value) = raw_value else { continue };
            let assurance_metric_path = format!("{assurance_path}/{name}");
            let buf = store.ensure(Scope::Assurance, &assurance_metric_path, || template);
            buf.append(&name, value)?;
        }
        Ok(())
    }
}

fn noop(_: &mut MetricStore, _: &MetricRegistry, _: &str, _: &str, _: u64) -> Result<(), AgentError> {
    Ok(())
}

/// `type_path` keys mirror the fixed subservice topology template.
pub const LINUX_OWNER_CLASSES: &[&str] = &[
    "bm/cpu",
    "bm/sensors",
    "bm/disks",
    "bm/mem",
    "bm/proc",
    "bm/net",
    "bm/net/if",
    "vm/cpu",
    "vm/mem",
    "vm/net",
    "vm/proc",
    "kb/proc",
    "kb/mem",
    "kb/net",
    "vm",
    "kb",
];

pub struct RefreshTable {
    table: HashMap<(HostOs, &'static str), RefreshFn>,
}

impl RefreshTable {
    pub fn build() -> Self {
        let mut table: HashMap<(HostOs, &'static str), RefreshFn> = HashMap::new();
        // Linux entries do real work, dispatching by owner_class/type_path.
        // `refresh_owner_class` closures can't be stored as plain fn pointers,
        // so the handful of fixed owner classes get a dedicated shim each.
        table.insert((HostOs::Linux, "bm/cpu"), refresh_bm_cpu);
        table.insert((HostOs::Linux, "bm/sensors"), refresh_bm_sensors);
        table.insert((HostOs::Linux, "bm/disks"), refresh_bm_disks);
        table.insert((HostOs::Linux, "bm/mem"), refresh_bm_mem);
        table.insert((HostOs::Linux, "bm/proc"), refresh_bm_proc);
        table.insert((HostOs::Linux, "bm/net"), refresh_bm_net);
        table.insert((HostOs::Linux, "bm/net/if"), refresh_bm_net_if);
        table.insert((HostOs::Linux, "vm/cpu"), refresh_vm_cpu);
        table.insert((HostOs::Linux, "vm/mem"), refresh_vm_mem);
        table.insert((HostOs::Linux, "vm/net"), refresh_vm_net);
        table.insert((HostOs::Linux, "vm/proc"), refresh_vm_proc);
        table.insert((HostOs::Linux, "kb/proc"), refresh_kb_proc);
        table.insert((HostOs::Linux, "kb/mem"), refresh_kb_mem);
        table.insert((HostOs::Linux, "kb/net"), refresh_kb_net);
        table.insert((HostOs::Linux, "vm"), refresh_vm_top);
        table.insert((HostOs::Linux, "kb"), refresh_kb_top);
        for path in LINUX_OWNER_CLASSES {
            table.entry((HostOs::Windows, path)).or_insert(noop);
            table.entry((HostOs::MacOs, path)).or_insert(noop);
        }
        Self { table }
    }

    pub fn get(&self, host_os: HostOs, type_path: &str) -> Option<RefreshFn> {
        self.table.get(&(host_os, type_path)).copied()
    }
}

macro_rules! owner_class_fn {
    ($fn_name:ident, $owner_class:literal) => {
        fn $fn_name(
            store: &mut MetricStore,
            registry: &MetricRegistry,
            raw_path: &str,
            assurance_path: &str,
            sample_period_secs: u64,
        ) -> Result<(), AgentError> {
            refresh_owner_class($owner_class)(store, registry, raw_path, assurance_path, sample_period_secs)
        }
    };
}

owner_class_fn!(refresh_bm_cpu, "bm/cpu");
owner_class_fn!(refresh_bm_sensors, "bm/sensors");
owner_class_fn!(refresh_bm_disks, "bm/disks");
owner_class_fn!(refresh_bm_mem, "bm/mem");
owner_class_fn!(refresh_bm_proc, "bm/proc");
owner_class_fn!(refresh_bm_net, "bm/net");
owner_class_fn!(refresh_bm_net_if, "bm/net/if");
owner_class_fn!(refresh_vm_cpu, "vm/cpu");
owner_class_fn!(refresh_vm_mem, "vm/mem");
owner_class_fn!(refresh_vm_net, "vm/net");
owner_class_fn!(refresh_vm_proc, "vm/proc");
owner_class_fn!(refresh_kb_proc, "kb/proc");
owner_class_fn!(refresh_kb_mem, "kb/mem");
owner_class_fn!(refresh_kb_net, "kb/net");
owner_class_fn!(refresh_vm_top, "vm");
owner_class_fn!(refresh_kb_top, "kb");
