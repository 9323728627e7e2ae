//! `clobberer taskcluster`: one-shot worker-type cache summary.

use anyhow::{Context, Result};

use clobberer::clobberer::taskcluster::{TaskclusterClient, summarize_branches};
use clobberer::config::ClobbererConfig;

use super::print_json;

pub async fn cmd_taskcluster(config: &ClobbererConfig) -> Result<()> {
    let client = TaskclusterClient::from_config(&config.taskcluster)?;
    let branches = summarize_branches(&client, &config.taskcluster)
        .await
        .with_context(|| format!("Failed to summarize branches from {}", config.taskcluster.root_url))?;
    print_json(&branches)
}
