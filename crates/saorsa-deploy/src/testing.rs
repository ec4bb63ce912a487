//! In-memory stand-ins for the cloud, Terraform, ssh and remote hosts

use crate::remote::{GenesisPlan, HostReport, NodeInstaller, NodePlan, parse_report};
use async_trait::async_trait;
use saorsa_cloud::{
    ApplyAction, ApplyConfiguration, ApplyResult, CloudError, ComputeProvider, EnsuredInstance,
    EnsuredVolume, Instance, InstanceSpec, ResourceCounts, Result, Volume, VolumeSpec,
};
use saorsa_terraform::{ApplyRunner, CommandExecutor, CommandOutput, Invocation};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct World {
    next_id: u64,
    instances: Vec<Instance>,
    volumes: Vec<Volume>,
    calls: Vec<String>,
}

/// Provider whose resources live in memory; every mutating call is logged
#[derive(Default)]
pub struct FakeProvider {
    world: Mutex<World>,
    failing: Mutex<HashSet<&'static str>>,
    loopback: bool,
}

impl FakeProvider {
    /// Every instance gets 127.0.0.1, so local listeners stand in for hosts
    pub fn on_loopback() -> Self {
        Self {
            loopback: true,
            ..Default::default()
        }
    }

    /// Make every call of `operation` (as logged) fail
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    fn record(&self, operation: &'static str, arg: impl std::fmt::Display) -> Result<()> {
        self.world
            .lock()
            .unwrap()
            .calls
            .push(format!("{} {}", operation, arg));
        if self.failing.lock().unwrap().contains(operation) {
            return Err(CloudError::Api {
                status: 500,
                body: format!("{} failed", operation),
            });
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.world.lock().unwrap().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .count()
    }

    /// Calls from the first `operation` onwards
    pub fn calls_after(&self, operation: &str) -> Vec<String> {
        let calls = self.calls();
        let start = calls
            .iter()
            .position(|c| c.split(' ').next() == Some(operation))
            .unwrap_or(calls.len());
        calls[start..].to_vec()
    }

    pub fn instance(&self, name: &str) -> Option<Instance> {
        let world = self.world.lock().unwrap();
        world.instances.iter().find(|i| i.name == name).cloned()
    }

    pub fn volume(&self, name: &str) -> Option<Volume> {
        let world = self.world.lock().unwrap();
        world.volumes.iter().find(|v| v.name == name).cloned()
    }
}

#[async_trait]
impl ComputeProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn find_instance(&self, name: &str) -> Result<Option<Instance>> {
        Ok(self.instance(name))
    }

    async fn ensure_instance(&self, spec: &InstanceSpec) -> Result<EnsuredInstance> {
        if let Some(existing) = self.instance(&spec.name) {
            return Ok(EnsuredInstance {
                id: existing.id,
                ip_address: existing.ip_address.unwrap_or_default(),
                created: false,
            });
        }

        self.record("create-instance", &spec.name)?;
        let mut world = self.world.lock().unwrap();
        world.next_id += 1;
        let id = world.next_id;
        let ip_address = if self.loopback {
            "127.0.0.1".to_string()
        } else {
            format!("10.0.0.{}", id)
        };
        world.instances.push(Instance {
            id,
            name: spec.name.clone(),
            region: Some(spec.region.clone()),
            status: "active".to_string(),
            ip_address: Some(ip_address.clone()),
        });
        Ok(EnsuredInstance {
            id,
            ip_address,
            created: true,
        })
    }

    async fn find_volume(&self, name: &str, _region: &str) -> Result<Option<Volume>> {
        Ok(self.volume(name))
    }

    async fn ensure_volume(&self, spec: &VolumeSpec) -> Result<EnsuredVolume> {
        if let Some(existing) = self.volume(&spec.name) {
            return Ok(EnsuredVolume {
                id: existing.id,
                created: false,
            });
        }

        self.record("create-volume", &spec.name)?;
        let mut world = self.world.lock().unwrap();
        world.next_id += 1;
        let id = format!("vol-{}", world.next_id);
        world.volumes.push(Volume {
            id: id.clone(),
            name: spec.name.clone(),
            region: Some(spec.region.clone()),
            attached_instance_ids: Vec::new(),
        });
        Ok(EnsuredVolume { id, created: true })
    }

    async fn ensure_attached(&self, volume_id: &str, instance_id: u64, _region: &str) -> Result<bool> {
        let attached = {
            let world = self.world.lock().unwrap();
            world
                .volumes
                .iter()
                .any(|v| v.id == volume_id && v.is_attached_to(instance_id))
        };
        if attached {
            return Ok(false);
        }

        self.record("attach", volume_id)?;
        let mut world = self.world.lock().unwrap();
        if let Some(volume) = world.volumes.iter_mut().find(|v| v.id == volume_id) {
            volume.attached_instance_ids.push(instance_id);
        }
        Ok(true)
    }

    async fn detach_volume(&self, volume_id: &str, instance_id: u64, _region: &str) -> Result<()> {
        self.record("detach", volume_id)?;
        let mut world = self.world.lock().unwrap();
        if let Some(volume) = world.volumes.iter_mut().find(|v| v.id == volume_id) {
            volume.attached_instance_ids.retain(|id| *id != instance_id);
        }
        Ok(())
    }

    async fn destroy_instance(&self, instance_id: u64) -> Result<()> {
        self.record("destroy-instance", instance_id)?;
        self.world
            .lock()
            .unwrap()
            .instances
            .retain(|i| i.id != instance_id);
        Ok(())
    }

    async fn destroy_volume(&self, volume_id: &str) -> Result<()> {
        self.record("destroy-volume", volume_id)?;
        self.world
            .lock()
            .unwrap()
            .volumes
            .retain(|v| v.id != volume_id);
        Ok(())
    }

    fn detach_settle(&self) -> Duration {
        Duration::ZERO
    }
}

/// Apply runner that succeeds unless the unit's key was marked failing.
/// Successful applies report two IPs per region.
#[derive(Clone, Default)]
pub struct FakeRunner {
    failing: Arc<HashSet<String>>,
    runs: Arc<Mutex<Vec<(String, ApplyAction, BTreeMap<String, String>)>>>,
}

impl FakeRunner {
    pub fn failing<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            failing: Arc::new(keys.into_iter().map(str::to_string).collect()),
            runs: Arc::default(),
        }
    }

    pub fn runs(&self) -> Vec<(String, ApplyAction, BTreeMap<String, String>)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApplyRunner for FakeRunner {
    async fn run(&self, config: &ApplyConfiguration, action: ApplyAction) -> ApplyResult {
        self.runs
            .lock()
            .unwrap()
            .push((config.key(), action, config.variables.clone()));

        if self.failing.contains(&config.key()) {
            return ApplyResult::failure(config, String::new(), "Error: quota exceeded".to_string());
        }

        let mut outputs = BTreeMap::new();
        if action == ApplyAction::Apply {
            outputs.insert(
                saorsa_cloud::INSTANCE_IPS_OUTPUT.to_string(),
                vec![format!("{}-a", config.region), format!("{}-b", config.region)],
            );
        }

        ApplyResult {
            success: true,
            provider: config.provider.clone(),
            region: config.region.clone(),
            stdout: String::new(),
            stderr: String::new(),
            outputs,
            counts: ResourceCounts::default(),
        }
    }
}

/// Command executor answering from a table; matches on the command line
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    responses: Arc<Vec<(String, CommandOutput)>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExecutor {
    pub fn respond(self, pattern: &str, exit_code: i32, stdout: &str) -> Self {
        let mut responses = (*self.responses).clone();
        responses.push((
            pattern.to_string(),
            CommandOutput {
                exit_code: Some(exit_code),
                stdout: stdout.to_string(),
                stderr: if exit_code == 0 {
                    String::new()
                } else {
                    "Connection refused".to_string()
                },
            },
        ));
        Self {
            responses: Arc::new(responses),
            seen: self.seen,
        }
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, invocation: &Invocation) -> saorsa_terraform::Result<CommandOutput> {
        let line = invocation.command_line();
        self.seen.lock().unwrap().push(line.clone());
        Ok(self
            .responses
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or(CommandOutput {
                exit_code: Some(0),
                ..Default::default()
            }))
    }
}

/// Installer that reports fresh installs and remembers the plans it saw
#[derive(Default)]
pub struct FakeInstaller {
    pub failing_hosts: HashSet<String>,
    pub forgotten: Mutex<Vec<String>>,
    pub genesis: Mutex<Vec<GenesisPlan>>,
    pub nodes: Mutex<Vec<NodePlan>>,
}

impl FakeInstaller {
    pub fn failing<'a>(hosts: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            failing_hosts: hosts.into_iter().map(str::to_string).collect(),
            ..Default::default()
        }
    }

    fn outcome(&self, host: &str, services: &[String]) -> anyhow::Result<HostReport> {
        if self.failing_hosts.contains(host) {
            anyhow::bail!("{}: remote script exited with 255: Connection refused", host);
        }
        let mut stdout = String::from("SAORSA_BINARY:INSTALLED\n");
        for service in services {
            stdout.push_str(&format!("SAORSA_SVC:STARTED:{}\n", service));
        }
        Ok(parse_report(host, &stdout))
    }
}

#[async_trait]
impl NodeInstaller for FakeInstaller {
    async fn forget_hosts(&self, hosts: &[String]) {
        self.forgotten.lock().unwrap().extend(hosts.iter().cloned());
    }

    async fn install_genesis(&self, plan: &GenesisPlan) -> anyhow::Result<HostReport> {
        self.genesis.lock().unwrap().push(plan.clone());
        self.outcome(&plan.host, &[crate::remote::GENESIS_SERVICE.to_string()])
    }

    async fn install_nodes(&self, plan: &NodePlan) -> Vec<(String, anyhow::Result<HostReport>)> {
        self.nodes.lock().unwrap().push(plan.clone());
        let services: Vec<String> = (1..=plan.node_count)
            .map(crate::remote::node_service_name)
            .collect();
        plan.hosts
            .iter()
            .map(|host| (host.clone(), self.outcome(host, &services)))
            .collect()
    }
}
