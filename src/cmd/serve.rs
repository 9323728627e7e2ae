//! `clobberer serve` and `clobberer init`.

use anyhow::Result;

use clobberer::clobberer::server::{self, ServerConfig};
use clobberer::config::ClobbererConfig;

pub async fn cmd_serve(mut config: ClobbererConfig, port: Option<u16>, dev: bool) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    config.server.dev_mode |= dev;
    server::start_server(ServerConfig::from(config)).await
}

pub fn cmd_init(config: &ClobbererConfig) -> Result<()> {
    server::open_db(&config.server.db_path)?;
    println!(
        "Initialized clobberer database at {}",
        config.server.db_path.display()
    );
    Ok(())
}
