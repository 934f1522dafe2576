//! Command-line arguments.

use clap::{Parser, Subcommand};
use kindling_core::SettingsOverrides;
use std::path::PathBuf;

/// Provision a local Kubernetes environment: Lima VM, Docker context, kind cluster.
#[derive(Debug, Parser)]
#[command(name = "kindling", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML settings file
    #[arg(long, global = true, env = "KINDLING_CONFIG")]
    pub config: Option<PathBuf>,

    /// Lima VM name
    #[arg(long, global = true)]
    pub vm_name: Option<String>,

    /// vCPUs for the VM
    #[arg(long, global = true)]
    pub cpus: Option<u32>,

    /// VM memory in GiB
    #[arg(long, global = true)]
    pub memory: Option<u32>,

    /// VM disk in GiB
    #[arg(long, global = true)]
    pub disk: Option<u32>,

    /// kind cluster name
    #[arg(long, global = true)]
    pub cluster_name: Option<String>,

    /// Directory the cluster topology file is written to [default: current dir]
    #[arg(long, global = true)]
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create or reuse the VM and cluster, then verify them
    Up {
        /// Print the outputs as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove everything `up` created
    Down,
    /// Run the health checks only
    Verify,
    /// Show the step order without running anything
    Plan,
}

impl Cli {
    /// Flag values as the highest-priority settings layer.
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            vm_name: self.vm_name.clone(),
            cpus: self.cpus,
            memory: self.memory,
            disk: self.disk,
            cluster_name: self.cluster_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["kindling", "up", "--cpus", "4", "--cluster-name", "dev", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Up { json: true }));
        let overrides = cli.overrides();
        assert_eq!(overrides.cpus, Some(4));
        assert_eq!(overrides.cluster_name.as_deref(), Some("dev"));
        assert_eq!(overrides.memory, None);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["kindling"]).is_err());
    }
}
