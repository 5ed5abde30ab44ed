//! Error taxonomy. Every kind except `Fatal` is contained at the
//! collaborator boundary that produced it and never aborts a tick.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Schema/rule file row could not be loaded; the row is skipped, startup continues.
    #[error("load error in {file} line {line}: {reason}")]
    LoadError {
        file: String,
        line: usize,
        reason: String,
    },

    /// Rule DSL text failed to parse or failed whitelist validation; the rule is dropped.
    #[error("parse error in rule {name:?}: {reason}")]
    ParseError { name: String, reason: String },

    /// A sample failed coercion to the declared type on append; the sample is dropped.
    #[error("type error on metric {metric:?}: {reason}")]
    TypeError { metric: String, reason: String },

    /// A refresh function read a raw key that is absent; a silent no-op upstream of this error.
    #[error("missing scope: {path}")]
    MissingScope { path: String },

    /// A producer raised during collection; its scope retains prior samples.
    #[error("producer fault in {producer}: {reason}")]
    ProducerFault { producer: String, reason: String },

    /// Schema/rule files entirely unreadable, or the snapshot consumer handle unrecoverable at init.
    #[error("fatal: {0}")]
    Fatal(String),
}
