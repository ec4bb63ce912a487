use crate::binary_source::BinaryResolver;
use crate::commands::{self, NodeServiceArgs};
use crate::remote::{
    BinaryStatus, HostReport, NodeInstaller, NodePlan, RemoteShell, ServiceParams, ServiceStatus,
    SshNodeInstaller,
};
use anyhow::bail;
use colored::Colorize;
use saorsa_cloud::{DeploymentRecord, DeploymentStateStore, DeploymentUpdate};

#[derive(Debug, Clone)]
pub struct ProvisionArgs {
    pub name: String,
    pub node_count: u32,
    pub port: Option<u16>,
    pub region: Option<String>,
    pub node: NodeServiceArgs,
}

/// Hosts and bootstrap address taken from the deployment record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTargets {
    pub hosts: Vec<String>,
    pub regions: usize,
    pub bootstrap_ip: String,
    pub bootstrap_port: u16,
}

impl NodeTargets {
    /// All VMs, or only those of `region` (`provider/region`)
    pub fn from_record(record: &DeploymentRecord, region: Option<&str>) -> anyhow::Result<Self> {
        let vm_ips = match &record.vm_ips {
            Some(ips) if !ips.is_empty() => ips,
            _ => bail!(
                "No VM IPs found in deployment state. \
                 Was this deployment created with a recent version of the infra command?"
            ),
        };
        if record.bootstrap_ip.is_empty() {
            bail!("No bootstrap IP found in deployment state.");
        }
        let Some(bootstrap_port) = record.bootstrap_port else {
            bail!(
                "No bootstrap port found in deployment state. \
                 Has the provision-genesis command been run?"
            );
        };

        let (hosts, regions) = match region {
            Some(region) => match vm_ips.get(region) {
                Some(ips) => (ips.clone(), 1),
                None => bail!(
                    "Region '{}' not found. Available regions: {}",
                    region,
                    vm_ips.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            },
            // BTreeMap iteration keeps regions sorted
            None => (vm_ips.values().flatten().cloned().collect(), vm_ips.len()),
        };

        Ok(Self {
            hosts,
            regions,
            bootstrap_ip: record.bootstrap_ip.clone(),
            bootstrap_port,
        })
    }
}

/// `port + node_count - 1` must still be a valid port
pub fn check_port_range(port: Option<u16>, node_count: u32) -> anyhow::Result<()> {
    if let Some(port) = port
        && u32::from(port) + node_count.saturating_sub(1) > u32::from(u16::MAX)
    {
        bail!(
            "Port range {}..{} exceeds {}",
            port,
            u32::from(port) + node_count,
            u16::MAX
        );
    }
    Ok(())
}

pub async fn handle(args: ProvisionArgs) -> anyhow::Result<()> {
    args.node.binary_source()?;
    check_port_range(args.port, args.node_count)?;
    let store = commands::open_state_store().await?;

    println!(
        "{}",
        format!("Loading deployment state for '{}'...", args.name).bold()
    );
    let record = store.load(&args.name).await?;
    let targets = NodeTargets::from_record(&record, args.region.as_deref())?;

    let params = args.node.resolve(&BinaryResolver::new()).await?;
    let installer = SshNodeInstaller::new(RemoteShell::new(args.node.ssh_key()));

    match &args.region {
        Some(region) => println!(
            "{}",
            format!("Provisioning {} VM(s) in {}...", targets.hosts.len(), region).bold()
        ),
        None => println!(
            "{}",
            format!(
                "Provisioning {} VM(s) across {} region(s)...",
                targets.hosts.len(),
                targets.regions
            )
            .bold()
        ),
    }
    println!(
        "  Bootstrap: {}:{}",
        targets.bootstrap_ip, targets.bootstrap_port
    );
    println!("  Node count per VM: {}", args.node_count);
    if let Some(port) = args.port {
        println!("  Port range start: {}", port);
    }
    args.node.print_summary();
    println!();

    run(&args, targets, params, &installer, &store).await?;
    Ok(())
}

/// Install `node_count` services on every target host and record the count
pub async fn run(
    args: &ProvisionArgs,
    targets: NodeTargets,
    params: ServiceParams,
    installer: &dyn NodeInstaller,
    store: &DeploymentStateStore,
) -> anyhow::Result<Vec<HostReport>> {
    installer.forget_hosts(&targets.hosts).await;

    let plan = NodePlan {
        hosts: targets.hosts,
        bootstrap_ip: targets.bootstrap_ip,
        bootstrap_port: targets.bootstrap_port,
        node_count: args.node_count,
        initial_port: args.port,
        params,
    };
    let results = installer.install_nodes(&plan).await;

    let total = results.len();
    let mut reports = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for (host, result) in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => failures.push((host, e)),
        }
    }

    println!();
    println!(
        "{}",
        format!(
            "Provisioning complete: {}/{} hosts succeeded, {} node(s) per host",
            reports.len(),
            total,
            args.node_count
        )
        .bold()
    );
    if !failures.is_empty() {
        for (host, error) in &failures {
            println!("  {}", format!("Failed: {} ({:#})", host, error).red());
        }
        bail!("{} host(s) failed provisioning", failures.len());
    }

    print_summary(&reports);
    println!();
    println!("{}", "All nodes provisioned successfully.".green().bold());

    match store
        .update(&args.name, DeploymentUpdate::node_count(args.node_count))
        .await
    {
        Ok(()) => println!("{}", "Node count saved to deployment state.".dimmed()),
        Err(e) => println!(
            "{}",
            format!("Warning: Failed to save node count to state: {}", e).yellow()
        ),
    }

    Ok(reports)
}

fn print_summary(reports: &[HostReport]) {
    let installed = reports
        .iter()
        .filter(|r| r.binary == Some(BinaryStatus::Installed))
        .count();
    let skipped = reports
        .iter()
        .filter(|r| r.binary == Some(BinaryStatus::AlreadyInstalled))
        .count();

    if skipped == reports.len() {
        println!("  Binary: already installed on all hosts");
    } else if installed == reports.len() {
        println!("  Binary: installed on all hosts");
    } else {
        println!(
            "  Binary: installed on {}, already installed on {}",
            installed, skipped
        );
    }

    let started: usize = reports.iter().map(|r| r.count(ServiceStatus::Started)).sum();
    let running: usize = reports
        .iter()
        .map(|r| r.count(ServiceStatus::AlreadyRunning))
        .sum();
    match (started, running) {
        (0, 0) => {}
        (0, running) => println!("  Services: all {} already running", running),
        (started, 0) => println!("  Services: {} started", started),
        (started, running) => println!(
            "  Services: {} started, {} already running",
            started, running
        ),
    }
}
