use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Node-resident service-assurance agent", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the periodic reconcile/refresh/aggregate/publish cycle
    Run {
        /// Seconds between ticks
        #[arg(long = "input-period", value_name = "SECONDS", default_value_t = 3)]
        input_period_seconds: u64,

        /// Directory containing the metric descriptor and rule CSV files
        #[arg(long = "resources-dir", value_name = "DIR", default_value = "resources")]
        resources_directory: String,

        /// Directory of hypervisor VM state documents (JsonScopeProducer); unset disables VM discovery
        #[arg(long = "hypervisor-target", value_name = "DIR")]
        hypervisor_target: Option<String>,

        /// Directory of gNMI/dataplane framework documents (JsonScopeProducer); unset disables kb discovery
        #[arg(long = "gnmi-target", value_name = "DIR")]
        gnmi_target: Option<String>,

        /// Path the snapshot is written to every tick
        #[arg(long = "snapshot-path", value_name = "PATH", default_value = "snapshot.json")]
        snapshot_path: String,

        /// Skip writing the snapshot file, e.g. when another consumer owns publication
        #[arg(long)]
        disable_ipc_snapshot: bool,

        /// Enable debug-level logging regardless of RUST_LOG
        #[arg(short, long)]
        verbose: bool,
    },
}
