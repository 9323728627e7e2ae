//! One-shot buildbot queries and writes against the local database.

use anyhow::Result;

use clobberer::clobberer::buildbot::check_clobber_requests;
use clobberer::clobberer::models::{BuildKey, ClobberRequest, ReleasePrefixes, format_lastclobber};
use clobberer::clobberer::server::open_db;
use clobberer::config::ClobbererConfig;

use super::print_json;

fn prefixes(config: &ClobbererConfig) -> ReleasePrefixes {
    config.buildbot.clone().into()
}

pub fn cmd_summary(config: &ClobbererConfig, branch: &str) -> Result<()> {
    let db = open_db(&config.server.db_path)?;
    let summary = db.branch_summary(branch, &prefixes(config))?;
    print_json(&summary)
}

pub fn cmd_branches(config: &ClobbererConfig) -> Result<()> {
    let db = open_db(&config.server.db_path)?;
    let branches = db.list_branches(&prefixes(config))?;
    print_json(&branches)
}

pub fn cmd_clobber(
    config: &ClobbererConfig,
    branch: &str,
    builddir: &str,
    slave: Option<&str>,
    who: Option<&str>,
) -> Result<()> {
    let requests = vec![ClobberRequest {
        branch: branch.to_string(),
        builddir: builddir.to_string(),
        slave: slave.map(str::to_string),
    }];
    check_clobber_requests(&requests, &prefixes(config))?;

    let db = open_db(&config.server.db_path)?;
    let inserted = db.clobber(&requests, who)?;
    tracing::info!(branch, builddir, count = inserted.len(), "clobber recorded");
    print_json(&serde_json::json!({ "inserted": inserted.len() }))
}

pub fn cmd_lastclobber(
    config: &ClobbererConfig,
    branch: &str,
    builddir: Option<&str>,
    slave: Option<&str>,
    buildername: Option<&str>,
) -> Result<()> {
    let db = open_db(&config.server.db_path)?;
    if let (Some(builddir), Some(buildername)) = (builddir, buildername) {
        db.touch_build(&BuildKey::new(branch, builddir, buildername))?;
    }
    for time in db.last_clobbers(branch, builddir, slave)? {
        println!("{}", format_lastclobber(&time));
    }
    Ok(())
}
