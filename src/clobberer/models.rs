use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::BuildbotSection;

/// A clobberable build: one builder working in one build directory on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: i64,
    pub branch: String,
    pub builddir: String,
    pub buildername: String,
    pub last_build_time: i64,
}

/// Semantic identity of a [`Build`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildKey {
    pub branch: String,
    pub builddir: String,
    pub buildername: String,
}

impl BuildKey {
    pub fn new(branch: &str, builddir: &str, buildername: &str) -> Self {
        Self {
            branch: branch.to_string(),
            builddir: builddir.to_string(),
            buildername: buildername.to_string(),
        }
    }
}

/// A single clobber request. `slave == None` clobbers the builddir on every agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClobberTime {
    pub id: i64,
    pub branch: String,
    pub builddir: String,
    pub slave: Option<String>,
    pub lastclobber: i64,
    pub who: Option<String>,
}

/// Semantic identity of a [`ClobberTime`] request record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeKey {
    pub branch: String,
    pub slave: Option<String>,
    pub builddir: String,
}

impl TimeKey {
    pub fn new(branch: &str, slave: Option<&str>, builddir: &str) -> Self {
        Self {
            branch: branch.to_string(),
            slave: slave.map(str::to_string),
            builddir: builddir.to_string(),
        }
    }
}

/// One line of a branch summary: the newest clobber for a builddir, or
/// nulls when the builddir has never been clobbered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClobberRecord {
    pub branch: String,
    pub builddir: String,
    pub slave: Option<String>,
    pub lastclobber: Option<i64>,
    pub who: Option<String>,
}

/// builder name → newest clobber per builddir. `BTreeMap` keeps builders in
/// lexicographic order.
pub type BranchSummary = BTreeMap<String, Vec<ClobberRecord>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchBuilders {
    pub name: String,
    pub builders: BranchSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClobberRequest {
    pub branch: String,
    pub builddir: String,
    #[serde(default)]
    pub slave: Option<String>,
}

/// Name prefixes that mark release automation, hidden from user-facing views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasePrefixes {
    pub builddir: String,
    pub builder: String,
}

impl ReleasePrefixes {
    /// An empty prefix disables that exclusion.
    pub fn is_release_builddir(&self, builddir: &str) -> bool {
        !self.builddir.is_empty() && builddir.starts_with(&self.builddir)
    }

    pub fn is_release_builder(&self, buildername: &str) -> bool {
        !self.builder.is_empty() && buildername.starts_with(&self.builder)
    }
}

impl Default for ReleasePrefixes {
    fn default() -> Self {
        BuildbotSection::default().into()
    }
}

impl From<BuildbotSection> for ReleasePrefixes {
    fn from(section: BuildbotSection) -> Self {
        Self {
            builddir: section.release_builddir_prefix,
            builder: section.release_builder_prefix,
        }
    }
}

/// Render a clobber the way buildbot agents parse it: `builddir:lastclobber:who`.
pub fn format_lastclobber(time: &ClobberTime) -> String {
    format!(
        "{}:{}:{}",
        time.builddir,
        time.lastclobber,
        time.who.as_deref().unwrap_or("")
    )
}

// ── Taskcluster summaries ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerType {
    pub name: String,
    pub caches: std::collections::BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchWorkerTypes {
    pub name: String,
    #[serde(rename = "provisionerId", skip_serializing_if = "Option::is_none")]
    pub provisioner_id: Option<String>,
    #[serde(rename = "workerTypes")]
    pub worker_types: BTreeMap<String, WorkerType>,
}

impl BranchWorkerTypes {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// branch name → provisioner and worker-type caches.
pub type WorkerTypeCacheMap = BTreeMap<String, BranchWorkerTypes>;
