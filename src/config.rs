//! Layered configuration for the clobberer service.
//!
//! Values are resolved file → environment → CLI. The file is
//! `clobberer.toml` (or whatever `--config` points at); every key is
//! optional and falls back to the defaults below.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8010
//! db_path = "clobberer.db"
//! dev_mode = false
//!
//! [buildbot]
//! release_builddir_prefix = "rel-"
//! release_builder_prefix = "release-"
//!
//! [taskcluster]
//! root_url = "https://firefox-ci-tc.services.mozilla.com"
//! index_root = "gecko.v2"
//! decision_namespace = "gecko.v2.{branch}.latest.firefox.decision"
//! graph_artifact = "public/graph.json"
//! namespace_limit = 1000
//! timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "clobberer.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClobbererConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub buildbot: BuildbotSection,
    #[serde(default)]
    pub taskcluster: TaskclusterSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Bind on all interfaces with permissive CORS.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8010
}

fn default_db_path() -> PathBuf {
    PathBuf::from("clobberer.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

/// Prefixes hiding release automation from the buildbot views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildbotSection {
    #[serde(default = "default_release_builddir_prefix")]
    pub release_builddir_prefix: String,
    #[serde(default = "default_release_builder_prefix")]
    pub release_builder_prefix: String,
}

fn default_release_builddir_prefix() -> String {
    "rel-".to_string()
}

fn default_release_builder_prefix() -> String {
    "release-".to_string()
}

impl Default for BuildbotSection {
    fn default() -> Self {
        Self {
            release_builddir_prefix: default_release_builddir_prefix(),
            release_builder_prefix: default_release_builder_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskclusterSection {
    #[serde(default = "default_root_url")]
    pub root_url: String,
    /// Namespace whose children are treated as branches.
    #[serde(default = "default_index_root")]
    pub index_root: String,
    /// Index path of a branch's decision task; `{branch}` is substituted.
    #[serde(default = "default_decision_namespace")]
    pub decision_namespace: String,
    #[serde(default = "default_graph_artifact")]
    pub graph_artifact: String,
    /// Page size for the namespace listing. Only the first page is read.
    #[serde(default = "default_namespace_limit")]
    pub namespace_limit: u32,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_root_url() -> String {
    "https://firefox-ci-tc.services.mozilla.com".to_string()
}

fn default_index_root() -> String {
    "gecko.v2".to_string()
}

fn default_decision_namespace() -> String {
    "gecko.v2.{branch}.latest.firefox.decision".to_string()
}

fn default_graph_artifact() -> String {
    "public/graph.json".to_string()
}

fn default_namespace_limit() -> u32 {
    1000
}

impl Default for TaskclusterSection {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            index_root: default_index_root(),
            decision_namespace: default_decision_namespace(),
            graph_artifact: default_graph_artifact(),
            namespace_limit: default_namespace_limit(),
            timeout_secs: None,
        }
    }
}

impl TaskclusterSection {
    pub fn decision_namespace_for(&self, branch: &str) -> String {
        self.decision_namespace.replace("{branch}", branch)
    }
}

impl ClobbererConfig {
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the file then apply `CLOBBERER_*` environment overrides.
    pub fn from_file_and_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLOBBERER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("CLOBBERER_PORT") {
            self.server.port = v.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "CLOBBERER_PORT",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("CLOBBERER_DB_PATH") {
            self.server.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLOBBERER_DEV_MODE") {
            self.server.dev_mode = v == "true" || v == "1";
        }
        if let Some(v) = lookup("CLOBBERER_RELEASE_BUILDDIR_PREFIX") {
            self.buildbot.release_builddir_prefix = v;
        }
        if let Some(v) = lookup("CLOBBERER_RELEASE_BUILDER_PREFIX") {
            self.buildbot.release_builder_prefix = v;
        }
        if let Some(v) = lookup("TASKCLUSTER_ROOT_URL") {
            self.taskcluster.root_url = v;
        }
        if let Some(v) = lookup("CLOBBERER_NAMESPACE_LIMIT") {
            self.taskcluster.namespace_limit = v.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "CLOBBERER_NAMESPACE_LIMIT",
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    /// Returns a list of warnings about questionable settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.buildbot.release_builddir_prefix.is_empty() {
            warnings.push("buildbot.release_builddir_prefix is empty; release builddirs will be shown".into());
        }
        if self.buildbot.release_builder_prefix.is_empty() {
            warnings.push("buildbot.release_builder_prefix is empty; release builders will be shown".into());
        }
        if !self.taskcluster.decision_namespace.contains("{branch}") {
            warnings.push(
                "taskcluster.decision_namespace has no {branch} placeholder; every branch resolves to the same task".into(),
            );
        }
        if self.taskcluster.namespace_limit == 0 {
            warnings.push("taskcluster.namespace_limit is 0; no branches will be listed".into());
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClobbererConfig::default();
        assert_eq!(config.server.port, 8010);
        assert_eq!(config.buildbot.release_builddir_prefix, "rel-");
        assert_eq!(config.buildbot.release_builder_prefix, "release-");
        assert_eq!(config.taskcluster.index_root, "gecko.v2");
        assert_eq!(config.taskcluster.namespace_limit, 1000);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = ClobbererConfig::parse(
            r#"
            [server]
            port = 9000

            [taskcluster]
            namespace_limit = 50
            "#,
            Path::new("clobberer.toml"),
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.taskcluster.namespace_limit, 50);
        assert_eq!(config.taskcluster.graph_artifact, "public/graph.json");
        assert_eq!(config.buildbot, BuildbotSection::default());
    }

    #[test]
    fn test_parse_error_carries_path() {
        let err = ClobbererConfig::parse("[server\nport=", Path::new("/etc/c.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("/etc/c.toml"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClobbererConfig::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, ClobbererConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clobberer.toml");
        std::fs::write(&path, "[buildbot]\nrelease_builder_prefix = \"rls-\"\n").unwrap();
        let config = ClobbererConfig::load(&path).unwrap();
        assert_eq!(config.buildbot.release_builder_prefix, "rls-");
        assert_eq!(config.buildbot.release_builddir_prefix, "rel-");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CLOBBERER_PORT", "9999"),
            ("CLOBBERER_DB_PATH", "/tmp/c.db"),
            ("CLOBBERER_DEV_MODE", "1"),
            ("TASKCLUSTER_ROOT_URL", "http://localhost:1234"),
            ("CLOBBERER_NAMESPACE_LIMIT", "10"),
        ]
        .into_iter()
        .collect();
        let mut config = ClobbererConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/c.db"));
        assert!(config.server.dev_mode);
        assert_eq!(config.taskcluster.root_url, "http://localhost:1234");
        assert_eq!(config.taskcluster.namespace_limit, 10);
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = ClobbererConfig::default();
        let err = config
            .apply_env(|k| (k == "CLOBBERER_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: "CLOBBERER_PORT",
                ..
            }
        ));
    }

    #[test]
    fn test_decision_namespace_for() {
        let tc = TaskclusterSection::default();
        assert_eq!(
            tc.decision_namespace_for("mozilla-central"),
            "gecko.v2.mozilla-central.latest.firefox.decision"
        );
    }

    #[test]
    fn test_validate_warns_on_empty_prefixes() {
        let mut config = ClobbererConfig::default();
        config.buildbot.release_builddir_prefix.clear();
        config.taskcluster.decision_namespace = "static.ns".into();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
    }
}
