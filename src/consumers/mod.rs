//! Snapshot consumer capability interface and a concrete reference sink.

pub mod file_sink;

use crate::error::AgentError;
use crate::snapshot::Snapshot;

/// A consumer publishes the tick's snapshot somewhere external. On
/// shutdown, consumer resources are released last, after every producer
/// has been given its own exit hook.
pub trait SnapshotConsumer: Send {
    fn name(&self) -> &str;
    fn publish(&mut self, snapshot: &Snapshot) -> Result<(), AgentError>;
    fn exit(&mut self) {}
}

pub use file_sink::FileSnapshotSink;
