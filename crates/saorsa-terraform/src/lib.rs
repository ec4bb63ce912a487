//! Terraform orchestration for saorsa-deploy
//!
//! Runs `terraform init` + `apply` (or `apply -destroy`) for many
//! provider/region units at once, with a bounded pool and a live status
//! board.
//!
//! # Example
//!
//! ```ignore
//! use saorsa_terraform::{ParallelExecutor, TerraformRunner};
//! use saorsa_cloud::ApplyAction;
//!
//! let executor = ParallelExecutor::new(TerraformRunner::new());
//! let results = executor.run_all(configs, ApplyAction::Apply).await;
//! let failed = results.iter().filter(|r| !r.success).count();
//! ```

pub mod command;
pub mod error;
pub mod executor;
pub mod output;
pub mod progress;
pub mod runner;

pub use command::{CommandExecutor, CommandOutput, Invocation, ProcessExecutor};
pub use error::{Result, TerraformError};
pub use executor::{
    DEFAULT_MAX_CONCURRENT, DEFAULT_TICK, ExecutorOptions, ParallelExecutor, failure_report,
    total_counts,
};
pub use output::{parse_list_outputs, parse_resource_counts};
pub use runner::{
    ApplyRunner, TerraformRunner, apply_args, forwarded_credentials, init_args, prepare_workspace,
};
