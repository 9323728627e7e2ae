use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, params, params_from_iter};

use super::clock::{Clock, SystemClock};
use super::models::*;
use super::schema::{Filter, UniqueRecord};
use crate::errors::ClobbererError;

/// Async-safe handle to the clobberer database.
///
/// Wraps `ClobbererDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<ClobbererDb>>,
}

impl DbHandle {
    pub fn new(db: ClobbererDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ClobbererDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| ClobbererError::LockPoisoned)?;
            let result = f(&guard);
            guard.end_session();
            result
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For CLI commands and tests;
    /// never call this from an async request path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, ClobbererDb>> {
        self.inner
            .lock()
            .map_err(|_| ClobbererError::LockPoisoned.into())
    }
}

pub struct ClobbererDb {
    pub(super) conn: Connection,
    clock: Arc<dyn Clock>,
    /// `unique_hash` → row id, per table. Cleared by `end_session`.
    unique_cache: RefCell<HashMap<(&'static str, String), i64>>,
}

impl ClobbererDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        Self::open(path, Arc::new(SystemClock))
    }

    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        Self::with_connection(conn, clock)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        Self::in_memory_with_clock(Arc::new(SystemClock))
    }

    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::with_connection(conn, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        let db = Self {
            conn,
            clock,
            unique_cache: RefCell::new(HashMap::new()),
        };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Forget the identity cache. `DbHandle::call` ends a session after each call.
    pub fn end_session(&self) {
        self.unique_cache.borrow_mut().clear();
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS clobberer_builds (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    branch VARCHAR(50) NOT NULL,
                    builddir VARCHAR(100) NOT NULL,
                    buildername VARCHAR(100) NOT NULL,
                    last_build_time INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS clobberer_times (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    branch VARCHAR(50) NOT NULL,
                    builddir VARCHAR(100) NOT NULL,
                    slave VARCHAR(30),
                    lastclobber INTEGER NOT NULL,
                    who VARCHAR(50)
                );

                CREATE INDEX IF NOT EXISTS ix_clobberer_builds_branch ON clobberer_builds(branch);
                CREATE INDEX IF NOT EXISTS ix_clobberer_builds_builddir ON clobberer_builds(builddir);
                CREATE INDEX IF NOT EXISTS ix_clobberer_builds_branch_builddir ON clobberer_builds(branch, builddir);
                CREATE INDEX IF NOT EXISTS ix_clobberer_times_branch ON clobberer_times(branch);
                CREATE INDEX IF NOT EXISTS ix_clobberer_times_builddir ON clobberer_times(builddir);
                CREATE INDEX IF NOT EXISTS ix_clobberer_times_slave ON clobberer_times(slave);
                CREATE INDEX IF NOT EXISTS ix_clobberer_times_lastclobber ON clobberer_times(lastclobber);
                CREATE INDEX IF NOT EXISTS ix_clobberer_times_branch_builddir ON clobberer_times(branch, builddir);
                CREATE INDEX IF NOT EXISTS ix_get_clobberer_times ON clobberer_times(slave, builddir, branch);
                ",
            )
            .context("Failed to create clobberer tables")?;
        Ok(())
    }

    // ── Generic record access ─────────────────────────────────────────

    /// All rows of `R` matching `filter`, in insertion order.
    pub fn select<R: UniqueRecord>(&self, filter: &Filter) -> Result<Vec<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY id",
            R::COLUMNS,
            R::TABLE,
            filter.to_sql()
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Failed to prepare select on {}", R::TABLE))?;
        let rows = stmt
            .query_map(params_from_iter(filter.params()), R::from_row)
            .with_context(|| format!("Failed to query {}", R::TABLE))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row.with_context(|| format!("Failed to read {} row", R::TABLE))?);
        }
        Ok(records)
    }

    pub fn get<R: UniqueRecord>(&self, id: i64) -> Result<Option<R>> {
        let mut found = self.select::<R>(&Filter::new().eq("id", id))?;
        Ok(found.pop())
    }

    /// Get-or-create the row identified by `key`.
    ///
    /// Lookups go through the identity cache first, then `unique_filter`;
    /// only a miss on both inserts a new row stamped with the clock. A cached
    /// row whose key differs from `key` (a `unique_hash` collision) is ignored.
    pub fn as_unique<R: UniqueRecord>(&self, key: &R::Key) -> Result<R> {
        let cache_key = (R::TABLE, R::unique_hash(key));

        let cached_id = self.unique_cache.borrow().get(&cache_key).copied();
        if let Some(id) = cached_id
            && let Some(record) = self.get::<R>(id)?
            && record.key() == *key
        {
            return Ok(record);
        }

        let record = match self.select::<R>(&R::unique_filter(key))?.into_iter().next() {
            Some(record) => record,
            None => {
                self.conn
                    .execute(R::INSERT, params_from_iter(R::insert_params(key, self.now())))
                    .with_context(|| format!("Failed to insert into {}", R::TABLE))?;
                let id = self.conn.last_insert_rowid();
                self.get::<R>(id)?
                    .with_context(|| format!("{} row not found after insert", R::TABLE))?
            }
        };

        self.unique_cache
            .borrow_mut()
            .insert(cache_key, record.id());
        Ok(record)
    }

    // ── Builds ────────────────────────────────────────────────────────

    /// Insert a build. `last_build_time` defaults to the clock at insert time.
    pub fn insert_build(&self, key: &BuildKey, last_build_time: Option<i64>) -> Result<Build> {
        let last_build_time = last_build_time.unwrap_or_else(|| self.now());
        self.conn
            .execute(
                Build::INSERT,
                params![key.branch, key.builddir, key.buildername, last_build_time],
            )
            .context("Failed to insert build")?;
        let id = self.conn.last_insert_rowid();
        self.get::<Build>(id)?.context("Build not found after insert")
    }

    /// Record that a builder just ran in a builddir: get-or-create the build
    /// and refresh its `last_build_time`.
    pub fn touch_build(&self, key: &BuildKey) -> Result<Build> {
        let build = self.as_unique::<Build>(key)?;
        let now = self.now();
        self.conn
            .execute(
                "UPDATE clobberer_builds SET last_build_time = ?1 WHERE id = ?2",
                params![now, build.id],
            )
            .context("Failed to update last_build_time")?;
        Ok(Build {
            last_build_time: now,
            ..build
        })
    }

    // ── Clobber times ─────────────────────────────────────────────────

    /// Insert one clobber occurrence. `lastclobber` defaults to the clock at
    /// insert time.
    pub fn insert_clobber_time(
        &self,
        key: &TimeKey,
        who: Option<&str>,
        lastclobber: Option<i64>,
    ) -> Result<ClobberTime> {
        let lastclobber = lastclobber.unwrap_or_else(|| self.now());
        self.conn
            .execute(
                "INSERT INTO clobberer_times (branch, slave, builddir, lastclobber, who) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![key.branch, key.slave, key.builddir, lastclobber, who],
            )
            .context("Failed to insert clobber time")?;
        let id = self.conn.last_insert_rowid();
        self.get::<ClobberTime>(id)?
            .context("Clobber time not found after insert")
    }

    /// Insert one clobber row per request, atomically.
    pub fn clobber(&self, requests: &[ClobberRequest], who: Option<&str>) -> Result<Vec<ClobberTime>> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut inserted = Vec::with_capacity(requests.len());
        for req in requests {
            let key = TimeKey::new(&req.branch, req.slave.as_deref(), &req.builddir);
            inserted.push(self.insert_clobber_time(&key, who, None)?);
        }
        tx.commit().context("Failed to commit clobber requests")?;
        Ok(inserted)
    }
}
