use crate::binary_source::BinaryResolver;
use crate::commands::{self, NodeServiceArgs};
use crate::remote::{
    BinaryStatus, GENESIS_SERVICE, GenesisPlan, HostReport, NodeInstaller, RemoteShell,
    ServiceParams, ServiceStatus, SshNodeInstaller,
};
use anyhow::{Context, bail};
use colored::Colorize;
use saorsa_cloud::{DeploymentRecord, DeploymentStateStore, DeploymentUpdate};

pub async fn handle(name: String, port: u16, node: NodeServiceArgs) -> anyhow::Result<()> {
    let source = node.binary_source()?;
    let store = commands::open_state_store().await?;

    println!(
        "{}",
        format!("Loading deployment state for '{}'...", name).bold()
    );
    let record = store.load(&name).await?;
    bootstrap_ip(&record)?;

    tracing::debug!("Binary source: {:?}", source);
    let params = node.resolve(&BinaryResolver::new()).await?;
    let installer = SshNodeInstaller::new(RemoteShell::new(node.ssh_key()));

    println!(
        "{}",
        format!("Provisioning genesis node at {}...", record.bootstrap_ip).bold()
    );
    println!("  Port: {}", port);
    node.print_summary();
    println!();

    run(&record, port, params, &installer, &store).await?;
    Ok(())
}

fn bootstrap_ip(record: &DeploymentRecord) -> anyhow::Result<&str> {
    if record.bootstrap_ip.is_empty() {
        bail!(
            "No bootstrap IP found in deployment state. \
             Was this deployment created with a recent version of the infra command?"
        );
    }
    Ok(&record.bootstrap_ip)
}

/// Install the genesis service on the bootstrap host and record its port
pub async fn run(
    record: &DeploymentRecord,
    port: u16,
    params: ServiceParams,
    installer: &dyn NodeInstaller,
    store: &DeploymentStateStore,
) -> anyhow::Result<HostReport> {
    let host = bootstrap_ip(record)?.to_string();
    installer.forget_hosts(std::slice::from_ref(&host)).await;

    let plan = GenesisPlan { host, port, params };
    let report = installer
        .install_genesis(&plan)
        .await
        .context("Failed to provision genesis node")?;

    print_report(&report);
    println!();
    println!(
        "{}",
        "Genesis node provisioned successfully.".green().bold()
    );

    match store
        .update(&record.name, DeploymentUpdate::bootstrap_port(port))
        .await
    {
        Ok(()) => println!("{}", "Bootstrap port saved to deployment state.".dimmed()),
        Err(e) => println!(
            "{}",
            format!("Warning: Failed to save bootstrap port to state: {}", e).yellow()
        ),
    }

    Ok(report)
}

fn print_report(report: &HostReport) {
    match report.binary {
        Some(BinaryStatus::AlreadyInstalled) => println!("  Binary: already installed"),
        Some(BinaryStatus::Installed) => println!("  Binary: installed"),
        None => {}
    }
    if report.count(ServiceStatus::AlreadyRunning) > 0 {
        println!("  Service: {} already running", GENESIS_SERVICE);
    } else if report.count(ServiceStatus::Started) > 0 {
        println!("  Service: {} started and enabled", GENESIS_SERVICE);
    }
}
