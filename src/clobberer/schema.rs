//! Table mappings for the two clobberer record kinds.
//!
//! Each kind knows its table, its column list, how to read itself from a
//! row, and how to express its semantic identity: [`UniqueRecord::unique_hash`]
//! for cache keys and [`UniqueRecord::unique_filter`] for the matching
//! `WHERE` predicate.

use rusqlite::Row;
use rusqlite::types::Value;

use super::models::{Build, BuildKey, ClobberTime, TimeKey};

/// A `WHERE` predicate with positional parameters, composable with `AND`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self.clauses
            .push(format!("{} = ?{}", column, self.params.len()));
        self
    }

    /// `column IS value`; matches NULL against NULL.
    pub fn is(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self.clauses
            .push(format!("{} IS ?{}", column, self.params.len()));
        self
    }

    pub fn to_sql(&self) -> String {
        if self.clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// A record kind with a semantic identity independent of its surrogate `id`.
pub trait UniqueRecord: Sized {
    type Key: PartialEq;

    const TABLE: &'static str;
    const COLUMNS: &'static str;
    /// Insert statement taking the parameters from [`UniqueRecord::insert_params`].
    const INSERT: &'static str;

    fn id(&self) -> i64;

    /// The semantic key this row was stored under.
    fn key(&self) -> Self::Key;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Colon-joined key fields.
    fn unique_hash(key: &Self::Key) -> String;

    /// Predicate selecting exactly the rows with this key.
    fn unique_filter(key: &Self::Key) -> Filter;

    /// Parameters for a fresh row with this key, stamped `now`.
    fn insert_params(key: &Self::Key, now: i64) -> Vec<Value>;
}

impl UniqueRecord for Build {
    type Key = BuildKey;

    const TABLE: &'static str = "clobberer_builds";
    const COLUMNS: &'static str = "id, branch, builddir, buildername, last_build_time";
    const INSERT: &'static str = "INSERT INTO clobberer_builds (branch, builddir, buildername, last_build_time) VALUES (?1, ?2, ?3, ?4)";

    fn id(&self) -> i64 {
        self.id
    }

    fn key(&self) -> BuildKey {
        BuildKey::new(&self.branch, &self.builddir, &self.buildername)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Build {
            id: row.get(0)?,
            branch: row.get(1)?,
            builddir: row.get(2)?,
            buildername: row.get(3)?,
            last_build_time: row.get(4)?,
        })
    }

    fn unique_hash(key: &BuildKey) -> String {
        format!("{}:{}:{}", key.branch, key.builddir, key.buildername)
    }

    fn unique_filter(key: &BuildKey) -> Filter {
        Filter::new()
            .eq("branch", key.branch.clone())
            .eq("builddir", key.builddir.clone())
            .eq("buildername", key.buildername.clone())
    }

    fn insert_params(key: &BuildKey, now: i64) -> Vec<Value> {
        vec![
            key.branch.clone().into(),
            key.builddir.clone().into(),
            key.buildername.clone().into(),
            now.into(),
        ]
    }
}

/// Get-or-create through [`UniqueRecord::insert_params`] never records an
/// actor: such rows carry `who = NULL`. Attributed clobbers go through
/// `ClobbererDb::insert_clobber_time`.
impl UniqueRecord for ClobberTime {
    type Key = TimeKey;

    const TABLE: &'static str = "clobberer_times";
    const COLUMNS: &'static str = "id, branch, builddir, slave, lastclobber, who";
    const INSERT: &'static str = "INSERT INTO clobberer_times (branch, slave, builddir, lastclobber) VALUES (?1, ?2, ?3, ?4)";

    fn id(&self) -> i64 {
        self.id
    }

    fn key(&self) -> TimeKey {
        TimeKey::new(&self.branch, self.slave.as_deref(), &self.builddir)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ClobberTime {
            id: row.get(0)?,
            branch: row.get(1)?,
            builddir: row.get(2)?,
            slave: row.get(3)?,
            lastclobber: row.get(4)?,
            who: row.get(5)?,
        })
    }

    fn unique_hash(key: &TimeKey) -> String {
        format!(
            "{}:{}:{}",
            key.branch,
            key.slave.as_deref().unwrap_or(""),
            key.builddir
        )
    }

    fn unique_filter(key: &TimeKey) -> Filter {
        Filter::new()
            .eq("branch", key.branch.clone())
            .is("slave", key.slave.clone())
            .eq("builddir", key.builddir.clone())
    }

    fn insert_params(key: &TimeKey, now: i64) -> Vec<Value> {
        vec![
            key.branch.clone().into(),
            key.slave.clone().into(),
            key.builddir.clone().into(),
            now.into(),
        ]
    }
}
