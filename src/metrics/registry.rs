//! Metric registry: CSV-backed descriptor table.

use std::collections::HashMap;
use std::path::Path;

use log::warn;

use super::buffer::{RingBuffer, Thresholds};
use super::value::ValueType;
use crate::error::AgentError;

#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    pub name: String,
    pub owner_class: String,
    pub value_type: ValueType,
    pub unit: Option<String>,
    pub is_list: bool,
    pub is_counter: bool,
    pub thresholds: Option<Thresholds>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    descriptors: HashMap<String, MetricDescriptor>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads descriptor rows from a CSV file with header
    /// `name,owner_class,value_type,unit,is_list,is_counter,warn,crit`.
    /// Malformed rows are skipped and logged as `LoadError`; the load never
    /// aborts on a single bad row.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<AgentError>), AgentError> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path).map_err(|e| AgentError::Fatal(format!(
            "cannot open metric descriptor file {}: {e}",
            path.display()
        )))?;

        let mut registry = MetricRegistry::new();
        let mut errors = Vec::new();

        for (line, record) in reader.deserialize::<RawRow>().enumerate() {
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    let err = AgentError::LoadError {
                        file: path.display().to_string(),
                        line,
                        reason: e.to_string(),
                    };
                    warn!("{err}");
                    errors.push(err);
                    continue;
                }
            };
            match row.into_descriptor() {
                Ok(desc) => {
                    registry.descriptors.insert(desc.name.clone(), desc);
                }
                Err(reason) => {
                    let err = AgentError::LoadError {
                        file: path.display().to_string(),
                        line,
                        reason,
                    };
                    warn!("{err}");
                    errors.push(err);
                }
            }
        }

        Ok((registry, errors))
    }

    pub fn get(&self, name: &str) -> Option<&MetricDescriptor> {
        self.descriptors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn names_for_owner(&self, owner_class: &str) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.values().filter(move |d| d.owner_class == owner_class)
    }

    /// Materializes a fresh `RingBuffer` per descriptor owned by `owner_class`,
    /// keyed by metric name, sized to `sample_period_secs`.
    pub fn init_group(&self, owner_class: &str, sample_period_secs: u64) -> HashMap<String, RingBuffer> {
        let capacity = super::buffer::capacity_for_period(sample_period_secs);
        self.names_for_owner(owner_class)
            .map(|d| {
                let buf = RingBuffer::new(
                    capacity,
                    d.value_type,
                    d.unit.clone(),
                    d.is_counter,
                    d.thresholds,
                );
                (d.name.clone(), buf)
            })
            .collect()
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawRow {
    name: String,
    owner_class: String,
    value_type: String,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    is_list: String,
    #[serde(default)]
    is_counter: String,
    #[serde(default)]
    warn: String,
    #[serde(default)]
    crit: String,
}

impl RawRow {
    fn into_descriptor(self) -> Result<MetricDescriptor, String> {
        if self.name.trim().is_empty() {
            return Err("empty metric name".to_string());
        }
        let value_type = self
            .value_type
            .parse::<ValueType>()
            .map_err(|e| format!("metric {:?}: {e}", self.name))?;

        let thresholds = match (self.warn.trim(), self.crit.trim()) {
            ("", "") => None,
            (warn, crit) => {
                let warn = warn
                    .parse::<f64>()
                    .map_err(|e| format!("metric {:?}: bad warn threshold: {e}", self.name))?;
                let crit = crit
                    .parse::<f64>()
                    .map_err(|e| format!("metric {:?}: bad crit threshold: {e}", self.name))?;
                Some(Thresholds { warn, crit })
            }
        };

        Ok(MetricDescriptor {
            name: self.name,
            owner_class: self.owner_class,
            value_type,
            unit: if self.unit.trim().is_empty() { None } else { Some(self.unit) },
            is_list: parse_bool(&self.is_list),
            is_counter: parse_bool(&self.is_counter),
            thresholds,
        })
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{contents}").unwrap();
        f
    }

    #[test]
    fn loads_well_formed_rows() {
        let f = write_csv(
            "name,owner_class,value_type,unit,is_list,is_counter,warn,crit\n\
             cpu.usage,bm/cpu,float,percent,0,0,80,95\n\
             rx_bytes,bm/net/if,int,bytes,1,1,,\n",
        );
        let (registry, errors) = MetricRegistry::load(f.path()).unwrap();
        assert!(errors.is_empty());
        let cpu = registry.get("cpu.usage").unwrap();
        assert_eq!(cpu.value_type, ValueType::Float);
        assert!(cpu.thresholds.is_some());
        let rx = registry.get("rx_bytes").unwrap();
        assert!(rx.is_counter);
        assert!(rx.thresholds.is_none());
    }

    #[test]
    fn skips_rows_with_bad_value_type_without_aborting() {
        let f = write_csv(
            "name,owner_class,value_type,unit,is_list,is_counter,warn,crit\n\
             good.metric,bm/cpu,float,,0,0,,\n\
             bad.metric,bm/cpu,notatype,,0,0,,\n",
        );
        let (registry, errors) = MetricRegistry::load(f.path()).unwrap();
        assert_eq!(errors.len(), 1);
        assert!(registry.get("good.metric").is_some());
        assert!(registry.get("bad.metric").is_none());
    }

    #[test]
    fn init_group_builds_one_buffer_per_owned_metric() {
        let f = write_csv(
            "name,owner_class,value_type,unit,is_list,is_counter,warn,crit\n\
             cpu.usage,bm/cpu,float,,0,0,,\n\
             cpu.iowait,bm/cpu,float,,0,0,,\n\
             mem.used,bm/mem,int,,0,0,,\n",
        );
        let (registry, _) = MetricRegistry::load(f.path()).unwrap();
        let group = registry.init_group("bm/cpu", 3);
        assert_eq!(group.len(), 2);
        assert!(group.contains_key("cpu.usage"));
        assert!(!group.contains_key("mem.used"));
    }
}
