use crate::bootstrap::{self, BootstrapTeardown};
use crate::commands::{self, Workspace};
use crate::utils;
use anyhow::Context;
use colored::Colorize;
use saorsa_cloud::{
    ApplyAction, CloudError, ComputeProvider, DeploymentRecord, DeploymentStateStore,
    ProviderCatalog, best_effort,
};
use saorsa_cloud_digitalocean::DigitalOceanProvider;
use saorsa_terraform::{ApplyRunner, ParallelExecutor, TerraformRunner};

pub async fn handle(name: String, force: bool) -> anyhow::Result<()> {
    let provider = DigitalOceanProvider::from_env()?;
    let workspace = Workspace::discover()?;
    let store = commands::open_state_store().await?;

    println!(
        "{}",
        format!("Loading deployment state for '{}'...", name).bold()
    );
    let record = store.load(&name).await?;

    println!(
        "{}",
        format!("Found {} region(s) to destroy.", record.regions.len()).dimmed()
    );
    for pair in &record.regions {
        println!("  {}", pair.to_string().dimmed());
    }
    println!();

    if !force {
        let prompt = format!(
            "This will destroy all infrastructure for '{}'. Type 'yes' to confirm: ",
            name
        );
        if !utils::confirm(&prompt)? {
            println!("{}", "Aborted.".yellow());
            return Ok(());
        }
        println!();
    }

    let executor = ParallelExecutor::new(TerraformRunner::new());
    run(
        &record,
        &provider,
        &ProviderCatalog::builtin(),
        &executor,
        &store,
        &workspace,
    )
    .await?;
    Ok(())
}

/// Destroy every region, then the bootstrap VM, then the record.
///
/// Any region failure stops before the bootstrap VM so the deployment can be
/// retried from its record.
pub async fn run<R: ApplyRunner + 'static>(
    record: &DeploymentRecord,
    provider: &dyn ComputeProvider,
    catalog: &ProviderCatalog,
    executor: &ParallelExecutor<R>,
    store: &DeploymentStateStore,
    workspace: &Workspace,
) -> anyhow::Result<BootstrapTeardown> {
    let configs = workspace.configurations(catalog, &record.regions, &record.terraform_variables)?;

    println!(
        "{}",
        format!("Destroying infrastructure across {} region(s)...", configs.len()).bold()
    );
    println!();

    let results = executor.run_all(configs.clone(), ApplyAction::Destroy).await;
    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        println!(
            "{}",
            format!("{} region(s) failed to destroy.", failed).red().bold()
        );
        println!(
            "{}",
            "Bootstrap VM was NOT destroyed due to Terraform failures.".yellow()
        );
        return Err(CloudError::PartialDestroy {
            failed,
            total: results.len(),
        }
        .into());
    }
    println!(
        "{}",
        format!("All {} region(s) destroyed successfully.", results.len())
            .green()
            .bold()
    );
    println!();

    let instance_name = bootstrap::bootstrap_instance_name(&record.name);
    println!(
        "{}",
        format!("Destroying bootstrap VM ({})...", instance_name).bold()
    );
    let teardown = bootstrap::destroy_bootstrap(provider, &record.name)
        .await
        .context("Failed to destroy bootstrap VM")?;
    if teardown.found() {
        println!(
            "{}",
            format!("Bootstrap VM destroyed: {}", instance_name).green()
        );
    } else {
        println!(
            "{}",
            format!(
                "Bootstrap VM not found: {} (may already be destroyed)",
                instance_name
            )
            .yellow()
        );
    }

    if best_effort(
        "delete deployment state",
        store.delete(&record.name).await,
    )
    .is_some()
    {
        println!(
            "{}",
            format!("Deployment state removed from {}.", store.location()).dimmed()
        );
    }

    for config in &configs {
        if config.working_dir.exists() {
            best_effort(
                "remove working directory",
                tokio::fs::remove_dir_all(&config.working_dir).await,
            );
        }
    }

    println!();
    println!(
        "{}",
        format!("Deployment '{}' fully destroyed.", record.name)
            .green()
            .bold()
    );
    Ok(teardown)
}
