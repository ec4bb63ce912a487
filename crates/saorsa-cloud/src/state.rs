//! Deployment state management
//!
//! One JSON document per deployment name records the region topology, the
//! variables used at creation time and the VM inventory. Later commands
//! reload it instead of re-deriving anything.
//!
//! Writes replace the whole document. There is no optimistic concurrency
//! control: two processes updating the same deployment can overwrite each
//! other.

use crate::catalog::RegionPair;
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

pub const STATE_KEY_PREFIX: &str = "saorsa-deploy/deployments";

/// The durable record of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,

    pub regions: Vec<RegionPair>,

    pub terraform_variables: BTreeMap<String, String>,

    pub bootstrap_ip: String,

    /// Set once the genesis node is running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_port: Option<u16>,

    /// VM addresses keyed by `provider/region`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_ips: Option<BTreeMap<String, Vec<String>>>,

    /// Node services per VM, set once nodes are provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
}

impl DeploymentRecord {
    pub fn new(
        name: impl Into<String>,
        regions: Vec<RegionPair>,
        terraform_variables: BTreeMap<String, String>,
        bootstrap_ip: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            regions,
            terraform_variables,
            bootstrap_ip: bootstrap_ip.into(),
            bootstrap_port: None,
            vm_ips: None,
            node_count: None,
        }
    }

    pub fn with_vm_ips(mut self, vm_ips: BTreeMap<String, Vec<String>>) -> Self {
        self.vm_ips = Some(vm_ips);
        self
    }
}

/// Top-level fields to overwrite in an existing record.
///
/// Only fields that are `Some` are written; everything else in the stored
/// document is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_ips: Option<BTreeMap<String, Vec<String>>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,
}

impl DeploymentUpdate {
    pub fn bootstrap_port(port: u16) -> Self {
        Self {
            bootstrap_port: Some(port),
            ..Default::default()
        }
    }

    pub fn node_count(count: u32) -> Self {
        Self {
            node_count: Some(count),
            ..Default::default()
        }
    }

    fn into_fields(self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            _ => Err(CloudError::StateError(
                "deployment update did not serialize to an object".to_string(),
            )),
        }
    }
}

/// Raw storage for state documents
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Human-readable location, used in log lines
    fn describe(&self) -> String;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, body: &[u8]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Backend storing each key as a file below a root directory
pub struct FileStateBackend {
    root: PathBuf,
}

impl FileStateBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Keys are relative paths that stay below the root
    fn path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(CloudError::StateError(format!(
                "state key '{}' escapes {}",
                key,
                self.root.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StateBackend for FileStateBackend {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)?).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, body).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reads and writes [`DeploymentRecord`]s through a [`StateBackend`]
#[derive(Clone)]
pub struct DeploymentStateStore {
    backend: Arc<dyn StateBackend>,
}

impl DeploymentStateStore {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self { backend }
    }

    /// Storage key of a deployment's document.
    ///
    /// Names become a single key segment, so separators and `..` are refused.
    pub fn key(name: &str) -> Result<String> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(CloudError::InvalidConfig(format!(
                "deployment name '{}' must be non-empty and contain no path separators or '..'",
                name
            )));
        }
        Ok(format!("{}/{}.json", STATE_KEY_PREFIX, name))
    }

    pub fn location(&self) -> String {
        self.backend.describe()
    }

    pub async fn save(&self, record: &DeploymentRecord) -> Result<()> {
        let key = Self::key(&record.name)?;
        let body = serde_json::to_vec_pretty(record)?;
        self.backend.put(&key, &body).await?;
        tracing::debug!(
            "Saved deployment state for {} to {}",
            record.name,
            self.backend.describe()
        );
        Ok(())
    }

    pub async fn load(&self, name: &str) -> Result<DeploymentRecord> {
        let fields = self.load_fields(name).await?;
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Overwrite the given top-level fields, keeping every other field
    pub async fn update(&self, name: &str, update: DeploymentUpdate) -> Result<()> {
        let mut fields = self.load_fields(name).await?;
        for (field, value) in update.into_fields()? {
            fields.insert(field, value);
        }

        let body = serde_json::to_vec_pretty(&Value::Object(fields))?;
        self.backend.put(&Self::key(name)?, &body).await?;
        tracing::debug!("Updated deployment state for {}", name);
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.backend.delete(&Self::key(name)?).await?;
        tracing::debug!("Deleted deployment state for {}", name);
        Ok(())
    }

    async fn load_fields(&self, name: &str) -> Result<Map<String, Value>> {
        let body = self
            .backend
            .get(&Self::key(name)?)
            .await?
            .ok_or_else(|| CloudError::DeploymentNotFound(name.to_string()))?;

        match serde_json::from_slice(&body)? {
            Value::Object(fields) => Ok(fields),
            _ => Err(CloudError::StateError(format!(
                "deployment state for '{}' is not a JSON object",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record() -> DeploymentRecord {
        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), "DEV-01".to_string());
        vars.insert("vm_count".to_string(), "2".to_string());

        DeploymentRecord::new(
            "DEV-01",
            vec![
                RegionPair::new("digitalocean", "lon1"),
                RegionPair::new("digitalocean", "nyc1"),
            ],
            vars,
            "143.198.100.50",
        )
    }

    fn store_in(dir: &Path) -> DeploymentStateStore {
        DeploymentStateStore::new(Arc::new(FileStateBackend::new(dir)))
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());
        let record = sample_record();

        store.save(&record).await.unwrap();
        let loaded = store.load("DEV-01").await.unwrap();

        assert_eq!(loaded.regions, record.regions);
        assert_eq!(loaded.terraform_variables, record.terraform_variables);
        assert_eq!(loaded.bootstrap_ip, record.bootstrap_ip);
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_document_layout() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());
        store.save(&sample_record()).await.unwrap();

        let path = temp_dir
            .path()
            .join("saorsa-deploy/deployments/DEV-01.json");
        let doc: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();

        assert_eq!(
            doc["regions"],
            serde_json::json!([["digitalocean", "lon1"], ["digitalocean", "nyc1"]])
        );
        assert_eq!(doc["bootstrap_ip"], "143.198.100.50");
        assert!(doc.get("bootstrap_port").is_none());
        assert!(doc.get("node_count").is_none());
    }

    #[tokio::test]
    async fn test_update_only_changes_listed_fields() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());
        let mut vm_ips = BTreeMap::new();
        vm_ips.insert(
            "digitalocean/lon1".to_string(),
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
        );
        let record = sample_record().with_vm_ips(vm_ips);
        store.save(&record).await.unwrap();

        store
            .update("DEV-01", DeploymentUpdate::node_count(5))
            .await
            .unwrap();

        let loaded = store.load("DEV-01").await.unwrap();
        assert_eq!(loaded.node_count, Some(5));
        assert_eq!(
            DeploymentRecord {
                node_count: None,
                ..loaded
            },
            record
        );
    }

    #[tokio::test]
    async fn test_update_preserves_unknown_fields() {
        let temp_dir = tempdir().unwrap();
        let backend = Arc::new(FileStateBackend::new(temp_dir.path()));
        let store = DeploymentStateStore::new(backend.clone());

        let doc = serde_json::json!({
            "name": "OLD",
            "regions": [["digitalocean", "lon1"]],
            "terraform_variables": {},
            "bootstrap_ip": "10.0.0.9",
            "operator": "alice"
        });
        backend
            .put(&DeploymentStateStore::key("OLD").unwrap(), doc.to_string().as_bytes())
            .await
            .unwrap();

        store
            .update("OLD", DeploymentUpdate::bootstrap_port(12000))
            .await
            .unwrap();

        let raw = backend
            .get(&DeploymentStateStore::key("OLD").unwrap())
            .await
            .unwrap()
            .unwrap();
        let stored: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored["operator"], "alice");
        assert_eq!(stored["bootstrap_port"], 12000);
    }

    #[tokio::test]
    async fn test_load_missing_deployment() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let err = store.load("NONEXISTENT").await.unwrap_err();
        assert!(matches!(err, CloudError::DeploymentNotFound(ref n) if n == "NONEXISTENT"));
        assert!(err.to_string().contains("No deployment state found"));
    }

    #[tokio::test]
    async fn test_update_missing_deployment() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());

        let result = store
            .update("GHOST", DeploymentUpdate::node_count(1))
            .await;
        assert!(matches!(result, Err(CloudError::DeploymentNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = tempdir().unwrap();
        let store = store_in(temp_dir.path());
        store.save(&sample_record()).await.unwrap();

        store.delete("DEV-01").await.unwrap();
        assert!(matches!(
            store.load("DEV-01").await,
            Err(CloudError::DeploymentNotFound(_))
        ));

        // deleting twice is fine
        store.delete("DEV-01").await.unwrap();
    }

    #[tokio::test]
    async fn test_names_cannot_leave_the_prefix() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join("state");
        let store = store_in(&root);

        for name in ["", "../escape", "a/b", "a\\b", "..", "DEV..01"] {
            assert!(
                matches!(DeploymentStateStore::key(name), Err(CloudError::InvalidConfig(_))),
                "{:?} accepted",
                name
            );
            assert!(matches!(store.load(name).await, Err(CloudError::InvalidConfig(_))));
            assert!(matches!(store.delete(name).await, Err(CloudError::InvalidConfig(_))));
        }

        let mut record = sample_record();
        record.name = "../../outside".to_string();
        assert!(matches!(store.save(&record).await, Err(CloudError::InvalidConfig(_))));
        assert!(!temp_dir.path().join("outside.json").exists());
        assert!(!root.exists());

        assert_eq!(
            DeploymentStateStore::key("DEV-01.test").unwrap(),
            "saorsa-deploy/deployments/DEV-01.test.json"
        );
    }

    #[tokio::test]
    async fn test_file_backend_rejects_escaping_keys() {
        let temp_dir = tempdir().unwrap();
        let backend = FileStateBackend::new(temp_dir.path().join("state"));

        for key in ["../x.json", "/etc/passwd", "a/../../x", ""] {
            assert!(matches!(
                backend.put(key, b"{}").await,
                Err(CloudError::StateError(_))
            ));
            assert!(backend.get(key).await.is_err());
        }
        assert!(!temp_dir.path().join("x.json").exists());
    }
}
