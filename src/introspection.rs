//! Registry of the blueprints (route groups) this service is built from,
//! and the packaging metadata behind them.

use std::collections::BTreeMap;

use axum::Router;
use serde::Serialize;

use crate::clobberer::api::{self, SharedState};

/// Packaging metadata for one distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribution {
    pub project_name: &'static str,
    pub version: &'static str,
    /// `(key, value)` pairs published as relengapi metadata.
    pub relengapi_metadata: &'static [(&'static str, &'static str)],
}

/// A named route group and the distribution that provides it.
pub struct Blueprint {
    pub name: &'static str,
    pub dist: &'static Distribution,
    pub routes: fn() -> Router<SharedState>,
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("name", &self.name)
            .field("dist", &self.dist.project_name)
            .finish()
    }
}

pub static BASE_DISTRIBUTION: Distribution = Distribution {
    project_name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    relengapi_metadata: &[(
        "repository_of_record",
        "https://github.com/mozilla/build-relengapi",
    )],
};

pub static TASKCLUSTER_DISTRIBUTION: Distribution = Distribution {
    project_name: "clobberer-taskcluster",
    version: env!("CARGO_PKG_VERSION"),
    relengapi_metadata: &[],
};

static BLUEPRINTS: [Blueprint; 3] = [
    Blueprint {
        name: "base",
        dist: &BASE_DISTRIBUTION,
        routes: api::base_routes,
    },
    Blueprint {
        name: "clobberer",
        dist: &BASE_DISTRIBUTION,
        routes: api::clobberer_routes,
    },
    Blueprint {
        name: "taskcluster",
        dist: &TASKCLUSTER_DISTRIBUTION,
        routes: api::taskcluster_routes,
    },
];

pub fn get_blueprints() -> &'static [Blueprint] {
    &BLUEPRINTS
}

/// Project name → distribution, for the base distribution and every
/// distribution that provides a blueprint.
pub fn get_distributions() -> BTreeMap<&'static str, &'static Distribution> {
    let mut dists = BTreeMap::new();
    dists.insert(BASE_DISTRIBUTION.project_name, &BASE_DISTRIBUTION);
    for bp in get_blueprints() {
        dists.insert(bp.dist.project_name, bp.dist);
    }
    dists
}

pub fn relengapi_metadata(dist: &Distribution) -> BTreeMap<String, String> {
    dist.relengapi_metadata
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ── /versions payload ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DistributionInfo {
    pub project_name: String,
    pub version: String,
    pub relengapi_metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct BlueprintInfo {
    pub distribution: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct Versions {
    pub distributions: BTreeMap<String, DistributionInfo>,
    pub blueprints: BTreeMap<String, BlueprintInfo>,
}

pub fn versions() -> Versions {
    let distributions = get_distributions()
        .into_iter()
        .map(|(name, dist)| {
            (
                name.to_string(),
                DistributionInfo {
                    project_name: dist.project_name.to_string(),
                    version: dist.version.to_string(),
                    relengapi_metadata: relengapi_metadata(dist),
                },
            )
        })
        .collect();
    let blueprints = get_blueprints()
        .iter()
        .map(|bp| {
            (
                bp.name.to_string(),
                BlueprintInfo {
                    distribution: bp.dist.project_name.to_string(),
                    version: bp.dist.version.to_string(),
                },
            )
        })
        .collect();
    Versions {
        distributions,
        blueprints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_blueprints() {
        let names: Vec<_> = get_blueprints().iter().map(|bp| bp.name).collect();
        assert!(names.contains(&"base"));
        assert!(names.contains(&"clobberer"));
        assert!(names.contains(&"taskcluster"));
    }

    #[test]
    fn test_get_distributions() {
        let dists = get_distributions();
        assert_eq!(dists["clobberer"].project_name, "clobberer");
        assert!(dists.contains_key("clobberer-taskcluster"));
        assert_eq!(dists.len(), 2);
    }

    #[test]
    fn test_relengapi_metadata() {
        let dist = get_distributions()["clobberer"];
        let meta = relengapi_metadata(dist);
        assert!(meta["repository_of_record"].starts_with("https://"));
    }

    #[test]
    fn test_relengapi_metadata_missing() {
        assert!(relengapi_metadata(&TASKCLUSTER_DISTRIBUTION).is_empty());
    }

    #[test]
    fn test_versions_payload() {
        let json = serde_json::to_value(versions()).unwrap();
        assert_eq!(json["blueprints"]["taskcluster"]["distribution"], "clobberer-taskcluster");
        assert_eq!(json["distributions"]["clobberer"]["version"], env!("CARGO_PKG_VERSION"));
    }
}
