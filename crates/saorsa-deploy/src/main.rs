mod binary_source;
mod bootstrap;
mod commands;
mod remote;
#[cfg(test)]
mod testing;
mod utils;

use clap::{Parser, Subcommand};
use commands::NodeServiceArgs;
use commands::build::BuildArgs;
use commands::infra::{DEFAULT_REGION_COUNTS, InfraArgs};
use commands::provision::ProvisionArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "saorsa-deploy")]
#[command(about = "Deploy saorsa-node testnets across cloud regions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the bootstrap VM and provision node VMs in every region
    Infra {
        /// Deployment name, used for resource names and the state record
        #[arg(long)]
        name: String,
        /// VMs per region
        #[arg(long)]
        vm_count: u32,
        /// Number of regions to deploy to [default: 3]
        #[arg(long, value_name = "COUNT")]
        region_counts: Option<String>,
        /// Single-region testnet in the default region
        #[arg(long)]
        testnet: bool,
        /// Size in GB of the volume attached to each node VM
        #[arg(long, default_value_t = 20)]
        attached_volume_size: u32,
    },
    /// Tear down every region, the bootstrap VM and the state record
    Destroy {
        /// Deployment name
        #[arg(long)]
        name: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Install and start the genesis node on the bootstrap VM
    ProvisionGenesis {
        /// Deployment name
        #[arg(long)]
        name: String,
        /// Port the genesis node listens on; nodes use it as their bootstrap address
        #[arg(long)]
        port: u16,
        #[command(flatten)]
        node: NodeServiceArgs,
    },
    /// Install and start saorsa-node services on the node VMs
    Provision {
        /// Deployment name
        #[arg(long)]
        name: String,
        /// Services per VM
        #[arg(long)]
        node_count: u32,
        /// First port; node i listens on port + i - 1
        #[arg(long)]
        port: Option<u16>,
        /// Only provision one region (provider/region, e.g. digitalocean/lon1)
        #[arg(long)]
        region: Option<String>,
        #[command(flatten)]
        node: NodeServiceArgs,
    },
    /// Build saorsa-node from a branch and upload it for --repo-owner/--branch-name
    BuildSaorsaNodeBinary {
        /// GitHub owner of the saorsa-node fork
        #[arg(long)]
        repo_owner: String,
        /// Branch to build
        #[arg(long)]
        branch_name: String,
        /// SSH key used to log in to the build droplet
        #[arg(long, default_value = "~/.ssh/id_rsa")]
        ssh_key_path: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Commands::Infra {
            name,
            vm_count,
            region_counts,
            testnet,
            attached_volume_size,
        } => {
            tracing::debug!(
                "infra: name={} region_counts={}",
                name,
                region_counts.as_deref().unwrap_or(DEFAULT_REGION_COUNTS)
            );
            commands::infra::handle(InfraArgs {
                name,
                vm_count,
                region_counts,
                testnet,
                attached_volume_size,
            })
            .await?;
        }
        Commands::Destroy { name, force } => {
            commands::destroy::handle(name, force).await?;
        }
        Commands::ProvisionGenesis { name, port, node } => {
            commands::provision_genesis::handle(name, port, node).await?;
        }
        Commands::Provision {
            name,
            node_count,
            port,
            region,
            node,
        } => {
            commands::provision::handle(ProvisionArgs {
                name,
                node_count,
                port,
                region,
                node,
            })
            .await?;
        }
        Commands::BuildSaorsaNodeBinary {
            repo_owner,
            branch_name,
            ssh_key_path,
        } => {
            commands::build::handle(BuildArgs {
                repo_owner,
                branch_name,
                ssh_key_path,
            })
            .await?;
        }
        Commands::Version => {
            println!("saorsa-deploy {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
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
    fn test_infra_defaults() {
        let cli = Cli::parse_from([
            "saorsa-deploy",
            "infra",
            "--name",
            "DEV-01",
            "--vm-count",
            "2",
        ]);
        match cli.command {
            Commands::Infra {
                vm_count,
                region_counts,
                attached_volume_size,
                testnet,
                ..
            } => {
                assert_eq!(vm_count, 2);
                assert_eq!(region_counts, None);
                assert_eq!(attached_volume_size, 20);
                assert!(!testnet);
            }
            _ => panic!("expected infra"),
        }
    }

    #[test]
    fn test_provision_flags() {
        let cli = Cli::parse_from([
            "saorsa-deploy",
            "provision",
            "--name",
            "DEV-01",
            "--node-count",
            "5",
            "--port",
            "13000",
            "--region",
            "digitalocean/lon1",
            "--repo-owner",
            "alice",
            "--branch-name",
            "main",
        ]);
        match cli.command {
            Commands::Provision {
                node_count,
                port,
                region,
                node,
                ..
            } => {
                assert_eq!(node_count, 5);
                assert_eq!(port, Some(13000));
                assert_eq!(region.as_deref(), Some("digitalocean/lon1"));
                assert_eq!(node.repo_owner.as_deref(), Some("alice"));
            }
            _ => panic!("expected provision"),
        }
    }

    #[test]
    fn test_counts_and_genesis_port_are_required() {
        assert!(Cli::try_parse_from(["saorsa-deploy", "infra", "--name", "DEV-01"]).is_err());
        assert!(Cli::try_parse_from(["saorsa-deploy", "provision", "--name", "DEV-01"]).is_err());
        assert!(
            Cli::try_parse_from(["saorsa-deploy", "provision-genesis", "--name", "DEV-01"])
                .is_err()
        );

        let cli = Cli::parse_from([
            "saorsa-deploy",
            "provision-genesis",
            "--name",
            "DEV-01",
            "--port",
            "12000",
        ]);
        assert!(matches!(
            cli.command,
            Commands::ProvisionGenesis { port: 12000, .. }
        ));
    }
}
