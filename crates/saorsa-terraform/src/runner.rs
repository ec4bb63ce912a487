//! Single-region Terraform runs
//!
//! A run is a strict pipeline: prepare the working directory, `init`, then
//! `apply` (or `apply -destroy`). Each step only starts when the previous one
//! succeeded. Failures never surface as `Err`; they are folded into a failed
//! [`ApplyResult`] so the coordinator can report every region uniformly.

use crate::command::{CommandExecutor, CommandOutput, Invocation, ProcessExecutor};
use crate::error::{Result, TerraformError};
use crate::output::{parse_list_outputs, parse_resource_counts};
use async_trait::async_trait;
use saorsa_cloud::{ApplyAction, ApplyConfiguration, ApplyResult};
use std::collections::BTreeMap;
use tokio::fs;

/// Runs one unit of declarative-apply work
#[async_trait]
pub trait ApplyRunner: Send + Sync {
    async fn run(&self, config: &ApplyConfiguration, action: ApplyAction) -> ApplyResult;
}

/// Environment forwarded to Terraform, derived from the caller's environment.
///
/// `DO_TOKEN` becomes `TF_VAR_do_token`; nothing else is added.
pub fn forwarded_credentials(lookup: impl Fn(&str) -> Option<String>) -> Vec<(String, String)> {
    lookup("DO_TOKEN")
        .map(|token| vec![("TF_VAR_do_token".to_string(), token)])
        .unwrap_or_default()
}

/// Copy every `*.tf` file from the template directory into the working
/// directory, creating it if needed. Returns the number of files copied.
pub async fn prepare_workspace(config: &ApplyConfiguration) -> Result<usize> {
    let workspace_err = |source| TerraformError::Workspace {
        path: config.working_dir.display().to_string(),
        source,
    };

    fs::create_dir_all(&config.working_dir)
        .await
        .map_err(workspace_err)?;

    let mut entries = fs::read_dir(&config.template_dir)
        .await
        .map_err(workspace_err)?;

    let mut copied = 0;
    while let Some(entry) = entries.next_entry().await.map_err(workspace_err)? {
        let path = entry.path();
        let is_template = path.extension().is_some_and(|ext| ext == "tf");
        if !is_template || !entry.file_type().await.map_err(workspace_err)?.is_file() {
            continue;
        }

        fs::copy(&path, config.working_dir.join(entry.file_name()))
            .await
            .map_err(workspace_err)?;
        copied += 1;
    }

    tracing::debug!(
        "Copied {} template(s) into {}",
        copied,
        config.working_dir.display()
    );
    Ok(copied)
}

/// Arguments of `terraform init`
pub fn init_args(config: &ApplyConfiguration) -> Vec<String> {
    vec![
        "init".to_string(),
        "-input=false".to_string(),
        format!("-backend-config=key={}", config.state_key),
    ]
}

/// Arguments of `terraform apply`, variables in lexicographic order
pub fn apply_args(config: &ApplyConfiguration, action: ApplyAction) -> Vec<String> {
    let mut args = vec!["apply".to_string()];
    if action == ApplyAction::Destroy {
        args.push("-destroy".to_string());
    }
    args.push("-auto-approve".to_string());
    args.push("-input=false".to_string());

    let variables: &BTreeMap<String, String> = &config.variables;
    args.extend(variables.iter().map(|(k, v)| format!("-var={}={}", k, v)));
    args
}

/// [`ApplyRunner`] backed by the `terraform` binary
pub struct TerraformRunner<E = ProcessExecutor> {
    executor: E,
    program: String,
    env: Vec<(String, String)>,
}

impl TerraformRunner<ProcessExecutor> {
    pub fn new() -> Self {
        Self::with_executor(ProcessExecutor)
    }
}

impl Default for TerraformRunner<ProcessExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> TerraformRunner<E> {
    /// Create a runner that forwards credentials from the current environment
    pub fn with_executor(executor: E) -> Self {
        Self {
            executor,
            program: "terraform".to_string(),
            env: forwarded_credentials(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the forwarded environment
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// Run `program` instead of `terraform` from `PATH`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn invocation(&self, config: &ApplyConfiguration, args: Vec<String>) -> Invocation {
        Invocation {
            program: self.program.clone(),
            args,
            cwd: config.working_dir.clone(),
            env: self.env.clone(),
        }
    }

    async fn execute(&self, invocation: &Invocation) -> std::result::Result<CommandOutput, String> {
        self.executor
            .execute(invocation)
            .await
            .map_err(|e| e.to_string())
    }
}

#[async_trait]
impl<E: CommandExecutor> ApplyRunner for TerraformRunner<E> {
    async fn run(&self, config: &ApplyConfiguration, action: ApplyAction) -> ApplyResult {
        if let Err(e) = prepare_workspace(config).await {
            return ApplyResult::failure(config, "", e.to_string());
        }

        let init = match self.execute(&self.invocation(config, init_args(config))).await {
            Ok(output) => output,
            Err(message) => return ApplyResult::failure(config, "", message),
        };
        if !init.success() {
            tracing::debug!("terraform init failed for {}", config.key());
            return ApplyResult::failure(config, init.stdout, init.stderr);
        }

        let apply = match self
            .execute(&self.invocation(config, apply_args(config, action)))
            .await
        {
            Ok(output) => output,
            Err(message) => return ApplyResult::failure(config, "", message),
        };

        let success = apply.success();
        let outputs = if success && action == ApplyAction::Apply {
            parse_list_outputs(&apply.stdout)
        } else {
            BTreeMap::new()
        };

        ApplyResult {
            success,
            provider: config.provider.clone(),
            region: config.region.clone(),
            counts: parse_resource_counts(&apply.stdout),
            outputs,
            stdout: apply.stdout,
            stderr: apply.stderr,
        }
    }
}
