//! Generic directory-of-JSON-documents producer. Stands in for the
//! hypervisor SDK and dataplane-stats collectors, which live outside this
//! crate; this lets graph reconciliation and the rule engine be driven
//! end-to-end without vendoring a hypervisor client.

use std::fs;
use std::path::PathBuf;

use log::debug;
use serde_json::Value;

use super::Producer;
use crate::error::AgentError;
use crate::metrics::{MetricStore, MetricValue, RingBuffer, Scope, ValueType};

pub struct JsonScopeProducer {
    label: String,
    directory: PathBuf,
    /// Raw store scope each document's instance name is published under,
    /// e.g. `"hypervisor/vms"` or `"gnmi"`.
    raw_scope: String,
    capacity: usize,
}

impl JsonScopeProducer {
    pub fn new(
        label: impl Into<String>,
        directory: impl Into<PathBuf>,
        raw_scope: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            label: label.into(),
            directory: directory.into(),
            raw_scope: raw_scope.into(),
            capacity,
        }
    }

    fn write_value(&self, store: &mut MetricStore, path: &str, value: &Value) {
        let metric_value: Option<MetricValue> = match value {
            Value::String(s) => Some(MetricValue::Str(s.clone())),
            Value::Bool(b) => Some(MetricValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(MetricValue::Float),
            _ => None,
        };
        let Some(metric_value) = metric_value else { return };
        let value_type = match &metric_value {
            MetricValue::Str(_) => ValueType::Str,
            MetricValue::Bool(_) => ValueType::Bool,
            _ => ValueType::Float,
        };
        store
            .ensure(Scope::Raw, path, || {
                RingBuffer::new(self.capacity, value_type, None, false, None)
            })
            .append(path, metric_value)
            .ok();
    }

    fn walk(&self, store: &mut MetricStore, prefix: &str, value: &Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    self.walk(store, &format!("{prefix}/{key}"), child);
                }
            }
            leaf => self.write_value(store, prefix, leaf),
        }
    }
}

impl Producer for JsonScopeProducer {
    fn name(&self) -> &str {
        &self.label
    }

    fn collect(&mut self, store: &mut MetricStore) -> Result<(), AgentError> {
        let entries = fs::read_dir(&self.directory).map_err(|e| AgentError::ProducerFault {
            producer: self.label.clone(),
            reason: format!("reading {}: {e}", self.directory.display()),
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let text = match fs::read_to_string(&path) {
                Ok(t) => t,
                Err(e) => {
                    debug!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            let value: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    debug!("skipping {}: invalid json: {e}", path.display());
                    continue;
                }
            };
            self.walk(store, &format!("{}/{stem}", self.raw_scope), &value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_a_json_document_into_the_raw_scope() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("vm1.json"),
            r#"{"state": "Running", "cpu": {"load": 0.5}}"#,
        )
        .unwrap();

        let mut producer = JsonScopeProducer::new("hypervisor", dir.path(), "hypervisor/vms", 10);
        let mut store = MetricStore::new();
        producer.collect(&mut store).unwrap();

        let state = store.get(Scope::Raw, "hypervisor/vms/vm1/state").unwrap();
        assert_eq!(state.top().unwrap().as_str(), Some("Running"));
        let load = store.get(Scope::Raw, "hypervisor/vms/vm1/cpu/load").unwrap();
        assert_eq!(load.top().unwrap().as_f64(), Some(0.5));
    }

    #[test]
    fn non_json_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let mut producer = JsonScopeProducer::new("hypervisor", dir.path(), "hypervisor/vms", 10);
        let mut store = MetricStore::new();
        assert!(producer.collect(&mut store).is_ok());
        assert!(store.keys_under(Scope::Raw, "hypervisor/vms").is_empty());
    }
}
