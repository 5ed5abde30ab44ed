//! Writes the published snapshot as pretty JSON to a file every tick.
//! Stands in for the shared-memory IPC consumer feeding a terminal
//! dashboard and the gNMI exporter, both external to this crate.

use std::fs;
use std::path::PathBuf;

use super::SnapshotConsumer;
use crate::error::AgentError;
use crate::snapshot::Snapshot;

pub struct FileSnapshotSink {
    path: PathBuf,
}

impl FileSnapshotSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotConsumer for FileSnapshotSink {
    fn name(&self) -> &str {
        "file_snapshot_sink"
    }

    fn publish(&mut self, snapshot: &Snapshot) -> Result<(), AgentError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| AgentError::Fatal(format!("serializing snapshot: {e}")))?;
        fs::write(&self.path, json).map_err(|e| AgentError::ProducerFault {
            producer: self.name().to_string(),
            reason: format!("writing {}: {e}", self.path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::HostOs;
    use crate::graph::Graph;

    #[test]
    fn publish_writes_valid_json_to_the_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut sink = FileSnapshotSink::new(&path);

        let graph = Graph::build(Vec::new(), HostOs::Linux, 3);
        let snapshot = Snapshot::from_graph(&graph, Vec::new());
        sink.publish(&snapshot).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let _: Snapshot = serde_json::from_str(&contents).unwrap();
    }
}
