//! Producer capability interface (`{ collect(store), exit() }`) and
//! concrete reference implementations.

pub mod json_scope;
pub mod proc_linux;

use crate::error::AgentError;
use crate::metrics::MetricStore;

/// A producer publishes into the raw input scope of the store; the set of
/// producers is fixed at start — discovery of new VMs/KBNets is data-driven,
/// not plug-in-driven.
pub trait Producer: Send {
    /// Human-readable name used in `ProducerFault` reports.
    fn name(&self) -> &str;

    /// Collects one round of samples into `store`'s raw scope. A failure is
    /// contained here and reported as `ProducerFault`; the store keeps
    /// whatever it already had.
    fn collect(&mut self, store: &mut MetricStore) -> Result<(), AgentError>;

    /// Releases any external handle this producer holds, called once at
    /// shutdown after the final tick completes.
    fn exit(&mut self) {}
}

pub use json_scope::JsonScopeProducer;
pub use proc_linux::ProcLinuxProducer;
