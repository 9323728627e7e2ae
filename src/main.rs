use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clobberer::config::{ClobbererConfig, DEFAULT_CONFIG_FILE};

mod cmd;

#[derive(Parser)]
#[command(name = "clobberer")]
#[command(version, about = "Track and serve build-directory clobber requests")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// SQLite database path. Overrides the config file and CLOBBERER_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "CLOBBERER_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (bind all interfaces, permissive CORS)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and its tables
    Init,
    /// Print the newest clobber per builddir for a branch, grouped by builder
    Summary { branch: String },
    /// Print every branch with its builder summary
    Branches,
    /// Summarize worker-type caches from the latest Taskcluster decision tasks
    Taskcluster,
    /// Record a clobber request
    Clobber {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        builddir: String,
        /// Restrict the clobber to one agent (default: every agent)
        #[arg(long)]
        slave: Option<String>,
        #[arg(long)]
        who: Option<String>,
    },
    /// Print the clobbers an agent must honour, one `builddir:time:who` per line
    Lastclobber {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        builddir: Option<String>,
        #[arg(long)]
        slave: Option<String>,
        #[arg(long)]
        buildername: Option<String>,
    },
    /// Print distribution and blueprint versions
    Versions,
}

impl Cli {
    /// File config, then environment, then CLI flags.
    fn load_config(&self) -> Result<ClobbererConfig> {
        let mut config = ClobbererConfig::from_file_and_env(&self.config)?;
        if let Some(db_path) = &self.db_path {
            config.server.db_path = db_path.clone();
        }
        for warning in config.validate() {
            tracing::warn!(config = %self.config.display(), "{}", warning);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    clobberer::logging::init(cli.log_json);
    if let Err(e) = dotenv {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let config = cli.load_config()?;

    match &cli.command {
        Commands::Serve { port, dev } => cmd::cmd_serve(config, *port, *dev).await?,
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Summary { branch } => cmd::cmd_summary(&config, branch)?,
        Commands::Branches => cmd::cmd_branches(&config)?,
        Commands::Taskcluster => cmd::cmd_taskcluster(&config).await?,
        Commands::Clobber {
            branch,
            builddir,
            slave,
            who,
        } => cmd::cmd_clobber(&config, branch, builddir, slave.as_deref(), who.as_deref())?,
        Commands::Lastclobber {
            branch,
            builddir,
            slave,
            buildername,
        } => cmd::cmd_lastclobber(
            &config,
            branch,
            builddir.as_deref(),
            slave.as_deref(),
            buildername.as_deref(),
        )?,
        Commands::Versions => cmd::cmd_versions()?,
    }

    Ok(())
}
