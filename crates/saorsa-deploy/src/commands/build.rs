//! `build-saorsa-node-binary`: compile a branch on a throwaway droplet and
//! upload the binary to the builds bucket.

use crate::binary_source::{self, BUILDS_BUCKET};
use crate::bootstrap::SSH_KEY_IDS;
use crate::remote::{self, RemoteShell};
use crate::utils;
use anyhow::Context;
use colored::Colorize;
use saorsa_cloud::{ComputeProvider, InstanceSpec, PollPolicy, best_effort};
use saorsa_cloud_digitalocean::DigitalOceanProvider;
use saorsa_terraform::CommandExecutor;
use std::path::PathBuf;

pub const BUILD_REGION: &str = "lon1";
pub const BUILD_SIZE: &str = "c-16";
pub const BUILD_IMAGE: &str = "ubuntu-24-04-x64";

pub const ACCESS_KEY_VAR: &str = "SAORSA_BUILD_AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_VAR: &str = "SAORSA_BUILD_AWS_SECRET_ACCESS_KEY";

#[derive(Debug, Clone)]
pub struct BuildArgs {
    pub repo_owner: String,
    pub branch_name: String,
    pub ssh_key_path: PathBuf,
}

/// Upload credentials handed to the build droplet
#[derive(Clone)]
pub struct BuildCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl BuildCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            access_key_id: utils::require_env(ACCESS_KEY_VAR)?,
            secret_access_key: utils::require_env(SECRET_KEY_VAR)?,
        })
    }
}

impl std::fmt::Debug for BuildCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

pub fn build_instance_name(owner: &str, branch: &str) -> String {
    format!("saorsa-build-{}-{}", owner, branch)
}

pub fn build_instance_spec(owner: &str, branch: &str) -> InstanceSpec {
    InstanceSpec {
        name: build_instance_name(owner, branch),
        region: BUILD_REGION.to_string(),
        size: BUILD_SIZE.to_string(),
        image: BUILD_IMAGE.to_string(),
        ssh_keys: SSH_KEY_IDS.to_vec(),
    }
}

/// Shell script run as root on the build droplet
pub fn build_script(owner: &str, branch: &str, credentials: &BuildCredentials) -> String {
    [
        "set -e".to_string(),
        "cloud-init status --wait".to_string(),
        "apt-get update -qq && apt-get install -y -qq \
         curl build-essential pkg-config libssl-dev git unzip"
            .to_string(),
        "curl -sSL https://awscli.amazonaws.com/awscli-exe-linux-x86_64.zip -o /tmp/awscliv2.zip && \
         unzip -q /tmp/awscliv2.zip -d /tmp && \
         /tmp/aws/install && \
         rm -rf /tmp/awscliv2.zip /tmp/aws"
            .to_string(),
        "curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y".to_string(),
        format!(
            "git clone --branch {} --depth 1 https://github.com/{}/saorsa-node.git /root/saorsa-node",
            branch, owner
        ),
        "cd /root/saorsa-node && /root/.cargo/bin/cargo build --release --bin saorsa-node"
            .to_string(),
        format!(
            "AWS_ACCESS_KEY_ID={} AWS_SECRET_ACCESS_KEY={} \
             aws s3 cp /root/saorsa-node/target/release/saorsa-node s3://{}/{}",
            credentials.access_key_id,
            credentials.secret_access_key,
            BUILDS_BUCKET,
            binary_source::custom_build_key(owner, branch)
        ),
    ]
    .join("\n")
}

pub async fn handle(args: BuildArgs) -> anyhow::Result<()> {
    let credentials = BuildCredentials::from_env()?;
    let provider = DigitalOceanProvider::from_env()?;
    let shell = RemoteShell::new(utils::expand_home(&args.ssh_key_path));

    println!(
        "{}",
        format!(
            "Building saorsa-node from {}/saorsa-node (branch: {})...",
            args.repo_owner, args.branch_name
        )
        .bold()
    );
    println!();

    let url = run(
        &args.repo_owner,
        &args.branch_name,
        &credentials,
        &provider,
        &shell,
        PollPolicy::ssh(),
    )
    .await
    .context("Build failed")?;

    println!();
    println!("{}", "Build complete.".green().bold());
    println!("  Binary URL: {}", url);
    Ok(())
}

/// Build on a droplet named after owner and branch, returning the public
/// download URL. The droplet is destroyed whether or not the build succeeds.
pub async fn run<E: CommandExecutor>(
    owner: &str,
    branch: &str,
    credentials: &BuildCredentials,
    provider: &dyn ComputeProvider,
    shell: &RemoteShell<E>,
    ssh_policy: PollPolicy,
) -> anyhow::Result<String> {
    println!("{}", "Creating build droplet...".bold());
    let instance = provider
        .ensure_instance(&build_instance_spec(owner, branch))
        .await
        .context("Failed to create build droplet")?;
    let name = build_instance_name(owner, branch);
    if instance.created {
        println!(
            "{}",
            format!("Build droplet created: {} ({})", name, instance.ip_address).green()
        );
    } else {
        println!(
            "{}",
            format!("Reusing existing build droplet: {} ({})", name, instance.ip_address).yellow()
        );
    }

    let outcome: anyhow::Result<String> = async {
        println!("Waiting for SSH...");
        remote::wait_for_port(&instance.ip_address, shell.port(), ssh_policy).await?;
        println!("{}", "SSH ready.".green());
        println!();

        shell.forget_host(&instance.ip_address).await;

        println!("Running build on {}...", instance.ip_address);
        shell
            .run(&instance.ip_address, &build_script(owner, branch, credentials))
            .await?;
        Ok(binary_source::custom_build_url(owner, branch))
    }
    .await;

    println!();
    println!("Destroying build droplet...");
    if best_effort(
        "destroy build droplet",
        provider.destroy_instance(instance.id).await,
    )
    .is_some()
    {
        println!("{}", "Build droplet destroyed.".green());
    } else {
        println!(
            "{}",
            format!("Warning: Failed to destroy build droplet {}", name).yellow()
        );
    }

    outcome
}
