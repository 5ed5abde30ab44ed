//! Baremetal raw-scope producer reading `/proc/stat`, `/proc/meminfo`,
//! `/proc/diskstats`, and `/proc/net/dev`.

use std::fs;

use log::debug;

use super::Producer;
use crate::error::AgentError;
use crate::metrics::{MetricStore, RingBuffer, Scope, ValueType};

pub struct ProcLinuxProducer {
    proc_root: String,
    capacity: usize,
}

impl ProcLinuxProducer {
    pub fn new(proc_root: impl Into<String>, capacity: usize) -> Self {
        Self { proc_root: proc_root.into(), capacity }
    }

    fn put(&self, store: &mut MetricStore, path: &str, value: f64) {
        store
            .ensure(Scope::Raw, path, || {
                RingBuffer::new(self.capacity, ValueType::Float, None, false, None)
            })
            .append(path, value.into())
            .ok();
    }

    fn put_counter(&self, store: &mut MetricStore, path: &str, value: f64) {
        store
            .ensure(Scope::Raw, path, || {
                RingBuffer::new(self.capacity, ValueType::Int, None, true, None)
            })
            .append(path, (value as i64).into())
            .ok();
    }

    fn collect_cpu(&self, store: &mut MetricStore) -> Result<(), AgentError> {
        let path = format!("{}/stat", self.proc_root);
        let text = fs::read_to_string(&path).map_err(|e| AgentError::ProducerFault {
            producer: self.name_owned(),
            reason: format!("reading {path}: {e}"),
        })?;

        for line in text.lines() {
            if !line.starts_with("cpu") {
                continue;
            }
            let mut fields = line.split_whitespace();
            let Some(label) = fields.next() else { continue };
            let values: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
            if values.len() < 4 {
                continue;
            }
            let (user, nice, system, idle) = (values[0], values[1], values[2], values[3]);
            let total = values.iter().sum::<u64>().max(1) as f64;
            self.put(store, &format!("stat/cpu/{label}/idle_all_perc"), idle as f64 / total * 100.0);
            self.put(
                store,
                &format!("stat/cpu/{label}/user_perc"),
                (user + nice) as f64 / total * 100.0,
            );
            self.put(store, &format!("stat/cpu/{label}/system_all_perc"), system as f64 / total * 100.0);
        }
        Ok(())
    }

    fn collect_mem(&self, store: &mut MetricStore) -> Result<(), AgentError> {
        let path = format!("{}/meminfo", self.proc_root);
        let text = fs::read_to_string(&path).map_err(|e| AgentError::ProducerFault {
            producer: self.name_owned(),
            reason: format!("reading {path}: {e}"),
        })?;

        for line in text.lines() {
            let Some((key, rest)) = line.split_once(':') else { continue };
            let key = key.trim();
            if !matches!(key, "MemTotal" | "MemFree" | "MemAvailable" | "Buffers" | "Cached") {
                continue;
            }
            let kb: f64 = rest.trim().trim_end_matches(" kB").trim().parse().unwrap_or(0.0);
            self.put(store, &format!("meminfo/{key}"), kb);
        }
        Ok(())
    }

    fn collect_net(&self, store: &mut MetricStore) -> Result<(), AgentError> {
        let path = format!("{}/net/dev", self.proc_root);
        let text = fs::read_to_string(&path).map_err(|e| AgentError::ProducerFault {
            producer: self.name_owned(),
            reason: format!("reading {path}: {e}"),
        })?;

        for line in text.lines().skip(2) {
            let Some((iface, rest)) = line.split_once(':') else { continue };
            let iface = iface.trim();
            let cols: Vec<f64> = rest.split_whitespace().filter_map(|f| f.parse().ok()).collect();
            if cols.len() < 9 {
                continue;
            }
            self.put_counter(store, &format!("net/dev/{iface}/rx_bytes"), cols[0]);
            self.put_counter(store, &format!("net/dev/{iface}/rx_packets"), cols[1]);
            self.put_counter(store, &format!("net/dev/{iface}/tx_bytes"), cols[8]);
        }
        Ok(())
    }

    fn name_owned(&self) -> String {
        self.name().to_string()
    }
}

impl Producer for ProcLinuxProducer {
    fn name(&self) -> &str {
        "proc_linux"
    }

    fn collect(&mut self, store: &mut MetricStore) -> Result<(), AgentError> {
        for step in [Self::collect_cpu, Self::collect_mem, Self::collect_net] {
            if let Err(e) = step(self, store) {
                debug!("{e}");
            }
        }
        Ok(())
    }

    fn exit(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cpu_stat_lines_into_raw_scope() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stat"), "cpu  100 0 50 850 0 0 0 0 0 0\n").unwrap();
        std::fs::write(dir.path().join("meminfo"), "MemTotal:       16384 kB\n").unwrap();
        std::fs::create_dir_all(dir.path().join("net")).unwrap();
        std::fs::write(dir.path().join("net/dev"), "Inter-|   Receive\n face |bytes packets errs drop fifo frame compressed multicast|bytes\neth0:  100 2 0 0 0 0 0 0 50 0 0 0 0 0 0 0\n").unwrap();

        let mut producer = ProcLinuxProducer::new(dir.path().to_str().unwrap(), 20);
        let mut store = MetricStore::new();
        producer.collect(&mut store).unwrap();

        let idle = store.get(Scope::Raw, "stat/cpu/cpu/idle_all_perc").unwrap();
        assert!(idle.top().unwrap().as_f64().unwrap() > 0.0);
        assert!(store.get(Scope::Raw, "meminfo/MemTotal").is_ok());
        assert!(store.get(Scope::Raw, "net/dev/eth0/rx_bytes").is_ok());
    }

    #[test]
    fn missing_proc_file_is_a_producer_fault_not_a_panic() {
        let mut producer = ProcLinuxProducer::new("/nonexistent/path", 20);
        let mut store = MetricStore::new();
        assert!(producer.collect(&mut store).is_ok());
    }
}
