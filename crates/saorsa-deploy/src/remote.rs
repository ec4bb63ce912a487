//! Remote node installation over SSH
//!
//! Every host gets one shell script that installs the binary (unless
//! present), writes the systemd units and starts the services that are not
//! already running. The script echoes markers that are parsed back into a
//! [`HostReport`] so reruns can tell what actually changed.

use crate::binary_source::{RELEASE_ASSET_NAME, ResolvedBinary};
use anyhow::bail;
use async_trait::async_trait;
use futures_util::StreamExt;
use saorsa_cloud::{PollPolicy, best_effort, poll_until};
use saorsa_terraform::{CommandExecutor, Invocation, ProcessExecutor};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;

pub const BINARY_INSTALL_PATH: &str = "/usr/local/bin/saorsa-node";
pub const GENESIS_SERVICE: &str = "saorsa-genesis-node";
pub const SSH_PORT: u16 = 22;
pub const DEFAULT_MAX_HOSTS: usize = 10;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const BINARY_SKIPPED: &str = "SAORSA_BINARY:SKIP";
const BINARY_INSTALLED: &str = "SAORSA_BINARY:INSTALLED";
const SERVICE_RUNNING: &str = "SAORSA_SVC:RUNNING:";
const SERVICE_STARTED: &str = "SAORSA_SVC:STARTED:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum IpVersion {
    #[default]
    #[value(name = "v4")]
    V4,
    #[value(name = "v6")]
    V6,
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "ipv4"),
            IpVersion::V6 => write!(f, "ipv6"),
        }
    }
}

/// Settings shared by the genesis node and regular nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceParams {
    pub binary: ResolvedBinary,
    pub ip_version: IpVersion,
    pub log_level: Option<String>,
    pub testnet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisPlan {
    pub host: String,
    pub port: u16,
    pub params: ServiceParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlan {
    pub hosts: Vec<String>,
    pub bootstrap_ip: String,
    pub bootstrap_port: u16,

    /// Services per host
    pub node_count: u32,

    /// Node `i` listens on `initial_port + i`; random ports when unset
    pub initial_port: Option<u16>,
    pub params: ServiceParams,
}

/// 1-based
pub fn node_service_name(index: u32) -> String {
    format!("saorsa-node-{}", index)
}

/// `ExecStart=` line of a service unit
pub fn exec_start(bootstrap: Option<(&str, u16)>, port: Option<u32>, params: &ServiceParams) -> String {
    let mut parts = vec![BINARY_INSTALL_PATH.to_string()];
    if let Some((ip, bootstrap_port)) = bootstrap {
        parts.push(format!("--bootstrap {}:{}", ip, bootstrap_port));
    }
    if let Some(port) = port {
        parts.push(format!("--port {}", port));
    }
    parts.push(format!("--ip-version {}", params.ip_version));
    if let Some(level) = &params.log_level {
        parts.push(format!("--log-level {}", level));
    }
    parts.push("--disable-payment-verification".to_string());
    if params.testnet {
        parts.push("--network-mode testnet".to_string());
    }
    parts.join(" ")
}

pub fn unit_file(description: &str, exec_start: &str) -> String {
    format!(
        "[Unit]
Description={description}
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={exec_start}
Restart=always
RestartSec=5

[Install]
WantedBy=multi-user.target
"
    )
}

/// Download the binary unless it is already installed
pub fn install_binary_command(binary: &ResolvedBinary) -> String {
    let fetch = if binary.archive {
        format!(
            "wget -q {url} -O /tmp/{asset} && \
             tar -xzf /tmp/{asset} -C /tmp/ && \
             mv /tmp/saorsa-node {path} && \
             chmod +x {path} && \
             rm -f /tmp/{asset}",
            url = binary.url,
            asset = RELEASE_ASSET_NAME,
            path = BINARY_INSTALL_PATH,
        )
    } else {
        format!(
            "wget -q {url} -O {path} && chmod +x {path}",
            url = binary.url,
            path = BINARY_INSTALL_PATH,
        )
    };

    format!(
        "test -f {path} && echo '{BINARY_SKIPPED}' || ({fetch} && echo '{BINARY_INSTALLED}')",
        path = BINARY_INSTALL_PATH,
    )
}

fn write_unit_command(service: &str, content: &str) -> String {
    format!(
        "cat > /etc/systemd/system/{}.service << 'UNIT_EOF'\n{}UNIT_EOF",
        service, content
    )
}

fn start_service_command(service: &str) -> String {
    format!(
        "systemctl is-active --quiet {service} && echo '{SERVICE_RUNNING}{service}' \
         || (systemctl enable --now {service} && echo '{SERVICE_STARTED}{service}')"
    )
}

pub fn genesis_script(plan: &GenesisPlan) -> String {
    let exec = exec_start(None, Some(u32::from(plan.port)), &plan.params);
    [
        "set -e".to_string(),
        install_binary_command(&plan.params.binary),
        write_unit_command(GENESIS_SERVICE, &unit_file("Saorsa Genesis Node", &exec)),
        "systemctl daemon-reload".to_string(),
        start_service_command(GENESIS_SERVICE),
    ]
    .join("\n")
}

pub fn node_script(plan: &NodePlan) -> String {
    let mut lines = vec![
        "set -e".to_string(),
        install_binary_command(&plan.params.binary),
    ];

    let services: Vec<String> = (1..=plan.node_count).map(node_service_name).collect();
    for (offset, service) in (0u32..).zip(&services) {
        let port = plan.initial_port.map(|p| u32::from(p) + offset);
        let exec = exec_start(
            Some((plan.bootstrap_ip.as_str(), plan.bootstrap_port)),
            port,
            &plan.params,
        );
        let description = format!("Saorsa Node ({})", service);
        lines.push(write_unit_command(service, &unit_file(&description, &exec)));
    }

    lines.push("systemctl daemon-reload".to_string());
    lines.extend(services.iter().map(|s| start_service_command(s)));
    lines.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryStatus {
    Installed,
    AlreadyInstalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Started,
    AlreadyRunning,
}

/// What one host's script changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    pub host: String,
    pub binary: Option<BinaryStatus>,
    pub services: Vec<(String, ServiceStatus)>,
}

impl HostReport {
    pub fn count(&self, status: ServiceStatus) -> usize {
        self.services.iter().filter(|(_, s)| *s == status).count()
    }
}

pub fn parse_report(host: &str, stdout: &str) -> HostReport {
    let mut report = HostReport {
        host: host.to_string(),
        binary: None,
        services: Vec::new(),
    };

    for line in stdout.lines().map(str::trim) {
        if line.contains(BINARY_SKIPPED) {
            report.binary = Some(BinaryStatus::AlreadyInstalled);
        } else if line.contains(BINARY_INSTALLED) {
            report.binary = Some(BinaryStatus::Installed);
        } else if let Some(service) = line.strip_prefix(SERVICE_RUNNING) {
            report
                .services
                .push((service.to_string(), ServiceStatus::AlreadyRunning));
        } else if let Some(service) = line.strip_prefix(SERVICE_STARTED) {
            report
                .services
                .push((service.to_string(), ServiceStatus::Started));
        }
    }

    report
}

/// Installs and starts saorsa-node services on remote hosts
#[async_trait]
pub trait NodeInstaller: Send + Sync {
    /// Drop stale host keys; addresses get reused across deployments
    async fn forget_hosts(&self, hosts: &[String]);

    async fn install_genesis(&self, plan: &GenesisPlan) -> anyhow::Result<HostReport>;

    /// One entry per host in `plan.hosts`, in the same order
    async fn install_nodes(&self, plan: &NodePlan) -> Vec<(String, anyhow::Result<HostReport>)>;
}

/// Runs scripts as root through the `ssh` binary
pub struct RemoteShell<E = ProcessExecutor> {
    executor: E,
    ssh_key: PathBuf,
    port: u16,
}

impl RemoteShell<ProcessExecutor> {
    pub fn new(ssh_key: impl Into<PathBuf>) -> Self {
        Self::with_executor(ProcessExecutor, ssh_key)
    }
}

impl<E: CommandExecutor> RemoteShell<E> {
    pub fn with_executor(executor: E, ssh_key: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            ssh_key: ssh_key.into(),
            port: SSH_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn invocation(&self, host: &str, script: &str) -> Invocation {
        Invocation {
            program: "ssh".to_string(),
            args: vec![
                "-i".to_string(),
                self.ssh_key.display().to_string(),
                "-p".to_string(),
                self.port.to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=accept-new".to_string(),
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                "-o".to_string(),
                "ConnectTimeout=10".to_string(),
                format!("root@{}", host),
                script.to_string(),
            ],
            cwd: PathBuf::from("."),
            env: Vec::new(),
        }
    }

    /// Run `script` on `host` and return its stdout
    pub async fn run(&self, host: &str, script: &str) -> anyhow::Result<String> {
        let output = self.executor.execute(&self.invocation(host, script)).await?;
        if !output.success() {
            let detail = output
                .stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output");
            match output.exit_code {
                Some(code) => bail!("{}: remote script exited with {}: {}", host, code, detail),
                None => bail!("{}: ssh terminated by signal: {}", host, detail),
            }
        }
        Ok(output.stdout)
    }

    pub async fn forget_host(&self, host: &str) {
        let invocation = Invocation {
            program: "ssh-keygen".to_string(),
            args: vec!["-R".to_string(), host.to_string()],
            cwd: PathBuf::from("."),
            env: Vec::new(),
        };
        best_effort(
            "clear known_hosts entry",
            self.executor.execute(&invocation).await,
        );
    }
}

/// [`NodeInstaller`] over [`RemoteShell`], a bounded number of hosts at a time
pub struct SshNodeInstaller<E = ProcessExecutor> {
    shell: RemoteShell<E>,
    max_hosts: usize,
}

impl<E: CommandExecutor> SshNodeInstaller<E> {
    pub fn new(shell: RemoteShell<E>) -> Self {
        Self {
            shell,
            max_hosts: DEFAULT_MAX_HOSTS,
        }
    }

    pub fn with_max_hosts(mut self, max_hosts: usize) -> Self {
        self.max_hosts = max_hosts.max(1);
        self
    }
}

#[async_trait]
impl<E: CommandExecutor> NodeInstaller for SshNodeInstaller<E> {
    async fn forget_hosts(&self, hosts: &[String]) {
        for host in hosts {
            self.shell.forget_host(host).await;
        }
    }

    async fn install_genesis(&self, plan: &GenesisPlan) -> anyhow::Result<HostReport> {
        let stdout = self.shell.run(&plan.host, &genesis_script(plan)).await?;
        Ok(parse_report(&plan.host, &stdout))
    }

    async fn install_nodes(&self, plan: &NodePlan) -> Vec<(String, anyhow::Result<HostReport>)> {
        let script = node_script(plan);
        let shell = &self.shell;
        let script = &script;

        let mut results: Vec<(usize, String, anyhow::Result<HostReport>)> =
            futures_util::stream::iter(plan.hosts.iter().cloned().enumerate())
                .map(|(index, host)| {
                    async move {
                        tracing::info!("Provisioning {}", host);
                        let report = shell
                            .run(&host, script)
                            .await
                            .map(|stdout| parse_report(&host, &stdout));
                        (index, host, report)
                    }
                })
                .buffer_unordered(self.max_hosts)
                .collect()
                .await;

        results.sort_by_key(|(index, _, _)| *index);
        results
            .into_iter()
            .map(|(_, host, report)| (host, report))
            .collect()
    }
}

/// Wait until `host:port` accepts TCP connections
pub async fn wait_for_port(host: &str, port: u16, policy: PollPolicy) -> saorsa_cloud::Result<()> {
    let address = format!("{}:{}", host, port);
    poll_until(policy, &format!("SSH on {}", host), || {
        let address = address.clone();
        async move {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(address.as_str())).await {
                Ok(Ok(_)) => Ok(Some(())),
                _ => Ok(None),
            }
        }
    })
    .await
}
