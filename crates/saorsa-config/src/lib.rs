pub mod error;

pub use error::*;

use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "saorsa-deploy";

/// デプロイ記録を保存する S3 バケット (既定値)
pub const DEFAULT_STATE_BUCKET: &str = "maidsafe-org-infra-tfstate";
pub const DEFAULT_STATE_REGION: &str = "eu-west-2";

/// ローカル作業ディレクトリのルート (カレントディレクトリ基準)
pub const LOCAL_DIR: &str = ".saorsa";

/// Terraform テンプレートを含む resources ディレクトリを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 SAORSA_RESOURCES_DIR (直接パス指定)
/// 2. ./resources
/// 3. ./.saorsa/resources
/// 4. ~/.config/saorsa-deploy/resources
pub fn find_resources_dir() -> Result<PathBuf> {
    let env_override = std::env::var_os("SAORSA_RESOURCES_DIR").map(PathBuf::from);
    let current_dir = std::env::current_dir()?;
    let config_dir = dirs::config_dir().map(|d| d.join(APP_NAME));

    resolve_resources_dir(env_override, &current_dir, config_dir.as_deref())
}

fn resolve_resources_dir(
    env_override: Option<PathBuf>,
    current_dir: &Path,
    config_dir: Option<&Path>,
) -> Result<PathBuf> {
    // 1. 環境変数で直接指定 (存在しなければエラー)
    if let Some(path) = env_override {
        if path.is_dir() {
            return Ok(path);
        }
        return Err(ConfigError::InvalidResourcesDir(path.display().to_string()));
    }

    // 2-3. カレントディレクトリ
    let local = [
        current_dir.join("resources"),
        current_dir.join(LOCAL_DIR).join("resources"),
    ];
    if let Some(found) = local.into_iter().find(|p| p.is_dir()) {
        return Ok(found);
    }

    // 4. グローバル設定
    if let Some(global) = config_dir.map(|d| d.join("resources"))
        && global.is_dir()
    {
        return Ok(global);
    }

    Err(ConfigError::ResourcesDirNotFound)
}

/// リージョンごとの Terraform 作業ディレクトリを置く場所
pub fn workspace_base() -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(LOCAL_DIR).join("workspaces"))
}

/// デプロイ記録の保存先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBackendSettings {
    /// SAORSA_STATE_DIR 配下のファイル
    File { root: PathBuf },
    S3 { bucket: String, region: String },
}

impl StateBackendSettings {
    /// 環境変数から保存先を決定
    ///
    /// - SAORSA_STATE_DIR があればファイル
    /// - なければ S3 (SAORSA_STATE_BUCKET / SAORSA_STATE_REGION で上書き可)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup("SAORSA_STATE_DIR") {
            return Self::File {
                root: PathBuf::from(root),
            };
        }

        Self::S3 {
            bucket: lookup("SAORSA_STATE_BUCKET")
                .unwrap_or_else(|| DEFAULT_STATE_BUCKET.to_string()),
            region: lookup("SAORSA_STATE_REGION")
                .unwrap_or_else(|| DEFAULT_STATE_REGION.to_string()),
        }
    }
}
