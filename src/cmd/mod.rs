//! CLI command implementations.
//!
//! | Module        | Commands handled                                  |
//! |---------------|----------------------------------------------------|
//! | `serve`       | `Serve`, `Init`                                   |
//! | `buildbot`    | `Summary`, `Branches`, `Clobber`, `Lastclobber`   |
//! | `taskcluster` | `Taskcluster`                                     |
//! | `versions`    | `Versions`                                        |

pub mod buildbot;
pub mod serve;
pub mod taskcluster;
pub mod versions;

pub use buildbot::{cmd_branches, cmd_clobber, cmd_lastclobber, cmd_summary};
pub use serve::{cmd_init, cmd_serve};
pub use taskcluster::cmd_taskcluster;
pub use versions::cmd_versions;

/// Pretty-print a value as JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
