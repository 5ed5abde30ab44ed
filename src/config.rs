//! Start-up configuration and its validation.

use std::path::PathBuf;

use crate::cli::Commands;
use crate::error::AgentError;

#[derive(Debug, Clone)]
pub struct Config {
    pub input_period_seconds: u64,
    pub resources_directory: PathBuf,
    pub hypervisor_target: Option<PathBuf>,
    pub gnmi_target: Option<PathBuf>,
    pub snapshot_path: PathBuf,
    pub disable_ipc_snapshot: bool,
    pub verbose: bool,
}

impl Config {
    pub fn from_command(command: Commands) -> Self {
        let Commands::Run {
            input_period_seconds,
            resources_directory,
            hypervisor_target,
            gnmi_target,
            snapshot_path,
            disable_ipc_snapshot,
            verbose,
        } = command;

        Config {
            input_period_seconds,
            resources_directory: PathBuf::from(resources_directory),
            hypervisor_target: hypervisor_target.map(PathBuf::from),
            gnmi_target: gnmi_target.map(PathBuf::from),
            snapshot_path: PathBuf::from(snapshot_path),
            disable_ipc_snapshot,
            verbose,
        }
    }

    pub fn metrics_descriptor_path(&self) -> PathBuf {
        self.resources_directory.join("metrics.csv")
    }

    pub fn rules_path(&self) -> PathBuf {
        self.resources_directory.join("rules.csv")
    }

    /// Validates required paths exist. Missing descriptor files are an
    /// unrecoverable init failure (`Fatal`, non-zero exit).
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.input_period_seconds == 0 {
            return Err(AgentError::Fatal("input_period_seconds must be > 0".to_string()));
        }
        for path in [self.metrics_descriptor_path(), self.rules_path()] {
            if !path.exists() {
                return Err(AgentError::Fatal(format!("missing required resource file: {}", path.display())));
            }
        }
        Ok(())
    }
}
