//! # Datastore
//!
//! Table-oriented storage of the engine: rows are flat `column → value` maps ([`Row`]) grouped
//! in named tables. Every table keyed by target carries an `sdbid` column.
//!
//! The [`Datastore`] trait offers the four operations the engine needs:
//!
//! | operation | semantics |
//! |-----------|-----------|
//! | [`select`](Datastore::select) | rows matching a [`Filter`] |
//! | [`insert`](Datastore::insert) | append a row; under [`WritePolicy::Replace`] the rows of the same `sdbid` are removed first |
//! | [`delete_where`](Datastore::delete_where) | remove the rows matching a [`Filter`] |
//! | [`insert_unique`](Datastore::insert_unique) | atomic insert-if-absent on a key column, the uniqueness constraint |
//!
//! `insert_unique` is the only primitive that must be atomic with respect to concurrent writers:
//! the registry claims identifiers with it, and the cross-identification table binds external
//! identifiers with it.
//!
//! Backends:
//! - [`memory::MemoryDatastore`]: a mutex-guarded map, shared between threads
//! - [`csv_store::CsvDatastore`]: one CSV file per table in a directory, with per-table lock files
//!   so that several processes can share it

pub mod csv_store;
pub mod memory;

use crate::{
    config::WritePolicy,
    constants::{Degree, Row, SDBID_COLUMN},
    epoch::SkyCoord,
    sdb_errors::SdbError,
};

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The row was inserted
    Claimed,
    /// A row with the same key already existed, nothing was written
    AlreadyClaimed,
}

/// Row selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Column equal to a value
    Eq { column: String, value: String },
    /// Coarse positional pre-filter: a box of `half_width` degrees around `center`, the RA side
    /// widened by `1 / cos(dec)`
    Box {
        ra_column: String,
        dec_column: String,
        center: SkyCoord,
        half_width: Degree,
    },
    /// Every filter matches
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(column: &str, value: &str) -> Self {
        Filter::Eq {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    /// Rows of one target.
    pub fn sdbid(value: &str) -> Self {
        Self::eq(SDBID_COLUMN, value)
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Eq { column, value } => row.get(column) == Some(value),
            Filter::Box {
                ra_column,
                dec_column,
                center,
                half_width,
            } => {
                let number = |col: &String| row.get(col).and_then(|v| v.trim().parse::<f64>().ok());
                let (Some(ra), Some(dec)) = (number(ra_column), number(dec_column)) else {
                    return false;
                };
                if (dec - center.dec_deg).abs() > *half_width {
                    return false;
                }
                let cos_dec = center.dec_deg.to_radians().cos();
                let ra_half = if cos_dec > half_width.to_radians().sin() {
                    half_width / cos_dec
                } else {
                    180.0
                };
                let mut dra = (ra - center.ra_deg).rem_euclid(360.0);
                if dra > 180.0 {
                    dra = 360.0 - dra;
                }
                dra <= ra_half
            }
        }
    }
}

pub trait Datastore: Send + Sync {
    /// Rows of `table` matching `filter`; an unknown table has no rows.
    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, SdbError>;

    /// Append `row` to `table`.
    ///
    /// With [`WritePolicy::Replace`], rows of `table` sharing the `sdbid` of `row` are deleted
    /// first, in the same operation.
    fn insert(&self, table: &str, row: Row, policy: WritePolicy) -> Result<(), SdbError>;

    /// Delete the rows matching `filter`, returns how many were removed.
    fn delete_where(&self, table: &str, filter: &Filter) -> Result<usize, SdbError>;

    /// Insert `row` unless a row of `table` has the same value in `key_column`.
    fn insert_unique(
        &self,
        table: &str,
        key_column: &str,
        row: Row,
    ) -> Result<ClaimOutcome, SdbError>;

    fn count(&self, table: &str) -> Result<usize, SdbError> {
        Ok(self.select(table, &Filter::All)?.len())
    }
}

/// Apply an insert on an in-memory table, shared by the backends.
pub(crate) fn apply_insert(rows: &mut Vec<Row>, row: Row, policy: WritePolicy) {
    if policy == WritePolicy::Replace {
        if let Some(id) = row.get(SDBID_COLUMN) {
            rows.retain(|r| r.get(SDBID_COLUMN) != Some(id));
        }
    }
    rows.push(row);
}

/// Apply an insert-if-absent on an in-memory table, shared by the backends.
pub(crate) fn apply_insert_unique(rows: &mut Vec<Row>, key_column: &str, row: Row) -> Result<ClaimOutcome, SdbError> {
    let key = row.get(key_column).ok_or_else(|| {
        SdbError::DatastoreError(format!("row without key column {key_column}"))
    })?;
    if rows.iter().any(|r| r.get(key_column) == Some(key)) {
        return Ok(ClaimOutcome::AlreadyClaimed);
    }
    rows.push(row);
    Ok(ClaimOutcome::Claimed)
}
