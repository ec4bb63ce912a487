use crate::bootstrap;
use crate::commands::{self, Workspace};
use anyhow::Context;
use colored::Colorize;
use saorsa_cloud::{
    ApplyAction, ApplyResult, ComputeProvider, DeploymentRecord, DeploymentStateStore,
    ProviderCatalog,
};
use saorsa_cloud_digitalocean::DigitalOceanProvider;
use saorsa_terraform::{ApplyRunner, ParallelExecutor, TerraformRunner};
use std::collections::BTreeMap;

pub const DEFAULT_REGION_COUNTS: &str = "3";

#[derive(Debug, Clone)]
pub struct InfraArgs {
    pub name: String,
    pub vm_count: u32,
    pub region_counts: Option<String>,
    pub testnet: bool,
    pub attached_volume_size: u32,
}

impl InfraArgs {
    /// Variables recorded with the deployment; `region` is added per run
    pub fn terraform_variables(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("name".to_string(), self.name.clone()),
            ("vm_count".to_string(), self.vm_count.to_string()),
            (
                "attached_volume_size".to_string(),
                self.attached_volume_size.to_string(),
            ),
        ])
    }
}

/// `provider/region` → VM addresses, for every region that reported any
pub fn collect_vm_ips(results: &[ApplyResult]) -> BTreeMap<String, Vec<String>> {
    results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.instance_ips().map(|ips| (r.key(), ips.to_vec())))
        .collect()
}

pub async fn handle(args: InfraArgs) -> anyhow::Result<()> {
    let provider = DigitalOceanProvider::from_env()?;
    let workspace = Workspace::discover()?;
    let store = commands::open_state_store().await?;
    let executor = ParallelExecutor::new(TerraformRunner::new());

    run(
        &args,
        &provider,
        &ProviderCatalog::builtin(),
        &executor,
        &store,
        &workspace,
    )
    .await?;
    Ok(())
}

/// Bootstrap VM, then one apply per region; the record is only written when
/// every region succeeded.
pub async fn run<R: ApplyRunner + 'static>(
    args: &InfraArgs,
    provider: &dyn ComputeProvider,
    catalog: &ProviderCatalog,
    executor: &ParallelExecutor<R>,
    store: &DeploymentStateStore,
    workspace: &Workspace,
) -> anyhow::Result<DeploymentRecord> {
    // The name keys the state record; refuse it before anything is created.
    DeploymentStateStore::key(&args.name)?;

    if args.testnet && args.region_counts.is_some() {
        println!(
            "{}",
            format!(
                "Warning: --region-counts is ignored when --testnet is used (testnet uses a single region: {})",
                catalog.default_provider().default_region
            )
            .yellow()
        );
    }
    let region_counts = args
        .region_counts
        .as_deref()
        .unwrap_or(DEFAULT_REGION_COUNTS);
    let regions = catalog.resolve_regions(region_counts, args.testnet)?;
    let variables = args.terraform_variables();
    let configs = workspace.configurations(catalog, &regions, &variables)?;

    println!(
        "{}",
        format!("Bootstrap VM ({})...", bootstrap::bootstrap_instance_name(&args.name)).bold()
    );
    let host = bootstrap::ensure_bootstrap(provider, &args.name)
        .await
        .context("Failed to create bootstrap VM")?;
    let verb = if host.created { "created" } else { "already exists" };
    println!(
        "{}",
        format!("Bootstrap VM {}: {} ({})", verb, host.instance_name, host.ip_address).green()
    );
    println!();

    println!(
        "{}",
        format!("Provisioning infrastructure across {} region(s)...", configs.len()).bold()
    );
    println!();

    let results = executor.run_all(configs, ApplyAction::Apply).await;
    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        println!("{}", format!("{} region(s) failed.", failed).red().bold());
        anyhow::bail!("{} of {} region(s) failed to provision", failed, results.len());
    }
    println!(
        "{}",
        format!("All {} region(s) provisioned successfully.", results.len())
            .green()
            .bold()
    );

    let record = DeploymentRecord::new(&args.name, regions, variables, host.ip_address)
        .with_vm_ips(collect_vm_ips(&results));
    store
        .save(&record)
        .await
        .context("Failed to save deployment state")?;
    println!(
        "{}",
        format!("Deployment state saved to {}.", store.location()).dimmed()
    );

    Ok(record)
}
