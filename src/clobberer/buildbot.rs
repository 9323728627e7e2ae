//! Buildbot-facing clobber queries.
//!
//! The central query is the "greatest n per group" branch summary:
//!
//! ```text
//! latest   = MAX(lastclobber) per (builddir, branch)        -- branch only
//! winners  = clobberer_times ⋈ latest on (builddir, branch, lastclobber)
//! summary  = clobberer_builds ⟕ winners on (builddir, branch)
//!            minus release builddirs / builders, grouped by buildername
//! ```
//!
//! Ties at the maximum are not broken: every agent row sharing the newest
//! timestamp is returned.

use anyhow::{Context, Result};
use rusqlite::params;

use super::db::ClobbererDb;
use super::models::*;
use super::schema::UniqueRecord;
use crate::errors::ClobbererError;

const BRANCH_SUMMARY_SQL: &str = "
    WITH latest AS (
        SELECT MAX(lastclobber) AS lastclobber, builddir, branch
        FROM clobberer_times
        WHERE branch = ?1
        GROUP BY builddir, branch
    ),
    winners AS (
        SELECT t.builddir, t.branch, t.slave, t.lastclobber, t.who
        FROM clobberer_times t
        JOIN latest m
          ON t.builddir = m.builddir
         AND t.lastclobber = m.lastclobber
         AND t.branch = m.branch
    )
    SELECT DISTINCT b.buildername, b.builddir, w.slave, w.lastclobber, w.who
    FROM clobberer_builds b
    LEFT OUTER JOIN winners w
      ON b.builddir = w.builddir
     AND b.branch = w.branch
    WHERE b.branch = ?1
      AND (?2 = '' OR substr(b.builddir, 1, length(?2)) <> ?2)
      AND (?3 = '' OR substr(b.buildername, 1, length(?3)) <> ?3)
    ORDER BY b.buildername, b.builddir, w.lastclobber, w.slave, w.who
";

const LAST_CLOBBER_SQL: &str = "
    WITH latest AS (
        SELECT MAX(lastclobber) AS lastclobber, builddir, branch
        FROM clobberer_times
        WHERE branch = ?1
          AND (slave = ?2 OR slave IS NULL)
          AND (?3 IS NULL OR builddir = ?3)
        GROUP BY builddir, branch
    )
    SELECT t.id, t.branch, t.builddir, t.slave, t.lastclobber, t.who
    FROM clobberer_times t
    JOIN latest m
      ON t.builddir = m.builddir
     AND t.lastclobber = m.lastclobber
     AND t.branch = m.branch
    WHERE (t.slave = ?2 OR t.slave IS NULL)
    ORDER BY t.builddir, t.slave, t.id
";

/// Reject clobber batches users may not submit: empty batches, blank
/// fields, and release builddirs (which are hidden from every view).
pub fn check_clobber_requests(
    requests: &[ClobberRequest],
    prefixes: &ReleasePrefixes,
) -> Result<(), ClobbererError> {
    if requests.is_empty() {
        return Err(ClobbererError::BadRequest("no clobbers requested".into()));
    }
    for req in requests {
        if req.branch.trim().is_empty() || req.builddir.trim().is_empty() {
            return Err(ClobbererError::BadRequest(
                "branch and builddir are required".into(),
            ));
        }
        if prefixes.is_release_builddir(&req.builddir) {
            return Err(ClobbererError::BadRequest(format!(
                "release builddir '{}' cannot be clobbered here",
                req.builddir
            )));
        }
    }
    Ok(())
}

impl ClobbererDb {
    /// Newest clobber per builddir for every builder on `branch`.
    pub fn branch_summary(&self, branch: &str, prefixes: &ReleasePrefixes) -> Result<BranchSummary> {
        let mut stmt = self
            .conn
            .prepare(BRANCH_SUMMARY_SQL)
            .context("Failed to prepare branch_summary")?;
        let rows = stmt
            .query_map(params![branch, prefixes.builddir, prefixes.builder], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ClobberRecord {
                        branch: branch.to_string(),
                        builddir: row.get(1)?,
                        slave: row.get(2)?,
                        lastclobber: row.get(3)?,
                        who: row.get(4)?,
                    },
                ))
            })
            .context("Failed to query branch summary")?;

        let mut summary = BranchSummary::new();
        for row in rows {
            let (buildername, record) = row.context("Failed to read branch summary row")?;
            summary.entry(buildername).or_default().push(record);
        }
        Ok(summary)
    }

    /// Every branch with at least one non-release build, each with its summary.
    pub fn list_branches(&self, prefixes: &ReleasePrefixes) -> Result<Vec<BranchBuilders>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT branch FROM clobberer_builds
                 WHERE (?1 = '' OR substr(builddir, 1, length(?1)) <> ?1)
                 ORDER BY branch",
            )
            .context("Failed to prepare list_branches")?;
        let names = stmt
            .query_map(params![prefixes.builddir], |row| row.get::<_, String>(0))
            .context("Failed to query branches")?;

        let mut branches = Vec::new();
        for name in names {
            let name = name.context("Failed to read branch row")?;
            let builders = self.branch_summary(&name, prefixes)?;
            branches.push(BranchBuilders { name, builders });
        }
        Ok(branches)
    }

    /// Clobbers an agent must honour on `branch`: the newest row per builddir
    /// addressed either to `slave` or to every agent (`slave IS NULL`).
    pub fn last_clobbers(
        &self,
        branch: &str,
        builddir: Option<&str>,
        slave: Option<&str>,
    ) -> Result<Vec<ClobberTime>> {
        let mut stmt = self
            .conn
            .prepare(LAST_CLOBBER_SQL)
            .context("Failed to prepare last_clobbers")?;
        let rows = stmt
            .query_map(params![branch, slave, builddir], ClobberTime::from_row)
            .context("Failed to query last clobbers")?;
        let mut times = Vec::new();
        for row in rows {
            times.push(row.context("Failed to read clobber time row")?);
        }
        Ok(times)
    }
}
