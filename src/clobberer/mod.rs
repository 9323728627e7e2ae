//! Clobberer: records requests to wipe build directories and reports the
//! newest clobber per builddir back to build agents.
//!
//! | Module        | Responsibility                                         |
//! |---------------|--------------------------------------------------------|
//! | `models`      | Row types, request/response payloads, release prefixes |
//! | `schema`      | `UniqueRecord` keys and filters for both tables        |
//! | `clock`       | Insert-time "now" source                               |
//! | `db`          | SQLite connection, migrations, inserts                 |
//! | `buildbot`    | Branch summaries and `lastclobber` queries             |
//! | `taskcluster` | Index/queue client and worker-type cache summaries     |
//! | `api`         | axum handlers                                          |
//! | `server`      | Router assembly and serve loop                         |

pub mod api;
pub mod buildbot;
pub mod clock;
pub mod db;
pub mod models;
pub mod schema;
pub mod server;
pub mod taskcluster;
