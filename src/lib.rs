//! Node-resident service-assurance agent: bounded metric history, a
//! subservice dependency graph with bottom-up health scoring, and a safe
//! embedded symptom rule engine.

pub mod cli;
pub mod config;
pub mod consumers;
pub mod engine;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod producers;
pub mod rules;
pub mod severity;
pub mod snapshot;

pub use config::Config;
pub use engine::HealthEngine;
pub use error::AgentError;
pub use snapshot::Snapshot;
