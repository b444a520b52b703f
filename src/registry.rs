//! # Target registry
//!
//! Owns the identifier namespace. A target goes through three states:
//!
//! ```text
//! Absent ──claim──▶ Incomplete ──mark_complete──▶ Complete
//!    ▲                  │                            │
//!    └──────────────────┴────────── reserve ─────────┘  (delete every row, then claim)
//! ```
//!
//! - `claim` is a single insert-if-absent on the position table, so two concurrent invocations
//!   racing on the same identifier cannot both win.
//! - The completion marker is written only after every ingestion step ran. A target left
//!   `Incomplete` by an interrupted run is resumed, not skipped.
//! - `reserve` is destructive: every row keyed by the identifier, in every target table, is
//!   deleted before the claim.
//!
//! Processing a target happens under a lease, a row of the lease table inserted with the same
//! insert-if-absent. Only the lease holder may resume an `Incomplete` target or rewrite it, so
//! two runs never both work on it. A lease older than the configured time to live belongs to a
//! run that died: it is deleted (only if unchanged since it was read) and taken over.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    config::WritePolicy,
    constants::{
        Row, ARCSEC_PER_DEG, COMPLETE_TABLE, LEASE_ACQUIRED_COLUMN, LEASE_OWNER_COLUMN,
        LEASE_TABLE, POSITION_TABLE, SDBID_COLUMN, XID_TABLE,
    },
    datastore::{ClaimOutcome, Datastore, Filter},
    identifier::SdbId,
    position::PositionRecord,
    sdb_errors::SdbError,
};

/// Canonical positions closer than this are considered the same target.
const SAME_POSITION_TOLERANCE: f64 = 1e-3;

const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(600);

static LEASE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Token unique to one lease request: process, time and a per-process counter.
fn lease_owner() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!(
        "{}-{}-{}",
        std::process::id(),
        nanos,
        LEASE_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Absent,
    /// Position record present, ingestion not finished
    Incomplete,
    Complete,
}

/// Exclusive right to process one target, released on drop.
pub struct TargetLease {
    store: Arc<dyn Datastore>,
    sdbid: SdbId,
    owner: String,
}

impl TargetLease {
    pub fn sdbid(&self) -> &SdbId {
        &self.sdbid
    }
}

impl Drop for TargetLease {
    fn drop(&mut self) {
        let filter = Filter::And(vec![
            Filter::sdbid(self.sdbid.as_str()),
            Filter::eq(LEASE_OWNER_COLUMN, &self.owner),
        ]);
        match self.store.delete_where(LEASE_TABLE, &filter) {
            Ok(0) => tracing::warn!(sdbid = %self.sdbid, "lease was taken over before release"),
            Ok(_) => tracing::debug!(sdbid = %self.sdbid, "lease released"),
            Err(err) => tracing::warn!(sdbid = %self.sdbid, error = %err, "unable to release lease"),
        }
    }
}

#[derive(Clone)]
pub struct TargetRegistry {
    store: Arc<dyn Datastore>,
    /// Tables keyed by `sdbid` besides the position, Xid and completion tables
    target_tables: Vec<String>,
    lease_ttl: Duration,
}

impl TargetRegistry {
    pub fn new(store: Arc<dyn Datastore>, target_tables: Vec<String>) -> Self {
        TargetRegistry {
            store,
            target_tables,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    /// Take the processing lease of `id`.
    ///
    /// Return
    /// ------
    /// * The lease, or `None` while another run holds a lease younger than the time to live
    pub fn acquire_lease(&self, id: &SdbId) -> Result<Option<TargetLease>, SdbError> {
        let owner = lease_owner();
        let row = Row::from([
            (SDBID_COLUMN.to_string(), id.to_string()),
            (LEASE_OWNER_COLUMN.to_string(), owner.clone()),
            (LEASE_ACQUIRED_COLUMN.to_string(), unix_now().to_string()),
        ]);

        // a second attempt only after a stale or vanished lease
        for _ in 0..2 {
            if self.store.insert_unique(LEASE_TABLE, SDBID_COLUMN, row.clone())?
                == ClaimOutcome::Claimed
            {
                tracing::debug!(sdbid = %id, owner = %owner, "lease acquired");
                return Ok(Some(TargetLease {
                    store: self.store.clone(),
                    sdbid: id.clone(),
                    owner,
                }));
            }

            let Some(held) = self
                .store
                .select(LEASE_TABLE, &Filter::sdbid(id.as_str()))?
                .into_iter()
                .next()
            else {
                continue;
            };
            let acquired = held
                .get(LEASE_ACQUIRED_COLUMN)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            let age = unix_now().saturating_sub(acquired);
            if age < self.lease_ttl.as_secs() {
                tracing::debug!(sdbid = %id, age, "lease held by another run");
                return Ok(None);
            }

            tracing::warn!(
                sdbid = %id,
                holder = held.get(LEASE_OWNER_COLUMN).map(String::as_str).unwrap_or("-"),
                age,
                "breaking a stale lease"
            );
            // only this exact row: a fresh lease taken meanwhile survives
            let unchanged = Filter::And(held.iter().map(|(k, v)| Filter::eq(k, v)).collect());
            self.store.delete_where(LEASE_TABLE, &unchanged)?;
        }
        Ok(None)
    }

    /// True when a position record exists for `id`, complete or not.
    pub fn exists(&self, id: &SdbId) -> Result<bool, SdbError> {
        Ok(self.record(id)?.is_some())
    }

    pub fn state(&self, id: &SdbId) -> Result<TargetState, SdbError> {
        if !self.exists(id)? {
            return Ok(TargetState::Absent);
        }
        let complete = !self
            .store
            .select(COMPLETE_TABLE, &Filter::sdbid(id.as_str()))?
            .is_empty();
        Ok(if complete {
            TargetState::Complete
        } else {
            TargetState::Incomplete
        })
    }

    /// The stored position record of `id`.
    pub fn record(&self, id: &SdbId) -> Result<Option<PositionRecord>, SdbError> {
        self.store
            .select(POSITION_TABLE, &Filter::sdbid(id.as_str()))?
            .first()
            .map(PositionRecord::from_row)
            .transpose()
    }

    /// Fail with [`SdbError::IdentifierCollision`] if `id` is already used by a target whose
    /// canonical position differs from `record`'s.
    pub fn check_collision(&self, record: &PositionRecord) -> Result<(), SdbError> {
        if let Some(existing) = self.record(&record.sdbid)? {
            let ra_diff = (existing.ra_deg0() - record.ra_deg0()).abs() * ARCSEC_PER_DEG;
            let de_diff = (existing.de_deg0() - record.de_deg0()).abs() * ARCSEC_PER_DEG;
            if ra_diff > SAME_POSITION_TOLERANCE || de_diff > SAME_POSITION_TOLERANCE {
                return Err(SdbError::IdentifierCollision(record.sdbid.clone()));
            }
        }
        Ok(())
    }

    /// Atomically insert the position record unless the identifier is taken.
    pub fn claim(&self, record: &PositionRecord) -> Result<ClaimOutcome, SdbError> {
        let outcome = self
            .store
            .insert_unique(POSITION_TABLE, SDBID_COLUMN, record.to_row())?;
        tracing::debug!(sdbid = %record.sdbid, ?outcome, "claim");
        Ok(outcome)
    }

    /// Delete every row of the target, then claim it again.
    pub fn reserve(&self, record: &PositionRecord) -> Result<ClaimOutcome, SdbError> {
        let filter = Filter::sdbid(record.sdbid.as_str());
        let mut removed = 0;
        for table in self.all_tables() {
            removed += self.store.delete_where(table, &filter)?;
        }
        if removed > 0 {
            tracing::warn!(sdbid = %record.sdbid, removed, "previous rows deleted");
        }
        self.claim(record)
    }

    pub fn mark_complete(&self, id: &SdbId) -> Result<(), SdbError> {
        let row = Row::from([(SDBID_COLUMN.to_string(), id.to_string())]);
        self.store
            .insert_unique(COMPLETE_TABLE, SDBID_COLUMN, row)
            .map(|_| ())
    }

    /// Rows of `id` in `table`, used to count what a target owns.
    pub fn rows_of(&self, table: &str, id: &SdbId) -> Result<Vec<Row>, SdbError> {
        self.store.select(table, &Filter::sdbid(id.as_str()))
    }

    fn all_tables(&self) -> impl Iterator<Item = &str> {
        [COMPLETE_TABLE, XID_TABLE]
            .into_iter()
            .chain(self.target_tables.iter().map(String::as_str))
            .chain([POSITION_TABLE])
    }

    pub(crate) fn policy_claim(
        &self,
        record: &PositionRecord,
        policy: WritePolicy,
    ) -> Result<ClaimOutcome, SdbError> {
        match policy {
            WritePolicy::Append => self.claim(record),
            WritePolicy::Replace => self.reserve(record),
        }
    }
}

#[cfg(test)]
mod registry_test {
    use super::*;
    use crate::{
        datastore::memory::MemoryDatastore,
        epoch::{EpochPositions, SkyCoord},
        identifier::IdentifierDeriver,
    };

    fn record(ra: f64, dec: f64) -> PositionRecord {
        let coord = SkyCoord::new(ra, dec);
        let id = IdentifierDeriver::default().derive_coord(coord);
        PositionRecord::new(id, EpochPositions::replicated(coord), None)
    }

    fn registry() -> (Arc<MemoryDatastore>, TargetRegistry) {
        let store = Arc::new(MemoryDatastore::new());
        let registry = TargetRegistry::new(store.clone(), vec!["tmass".to_string()]);
        (store, registry)
    }

    #[test]
    fn test_state_transitions() {
        let (_, registry) = registry();
        let rec = record(10.0, -20.0);

        assert_eq!(registry.state(&rec.sdbid).unwrap(), TargetState::Absent);
        assert_eq!(registry.claim(&rec).unwrap(), ClaimOutcome::Claimed);
        assert_eq!(registry.state(&rec.sdbid).unwrap(), TargetState::Incomplete);
        assert_eq!(registry.claim(&rec).unwrap(), ClaimOutcome::AlreadyClaimed);

        registry.mark_complete(&rec.sdbid).unwrap();
        registry.mark_complete(&rec.sdbid).unwrap();
        assert_eq!(registry.state(&rec.sdbid).unwrap(), TargetState::Complete);
        assert_eq!(registry.record(&rec.sdbid).unwrap(), Some(rec));
    }

    #[test]
    fn test_reserve_wipes_target_rows() {
        let (store, registry) = registry();
        let rec = record(10.0, -20.0);
        let other = record(11.0, -20.0);
        registry.claim(&rec).unwrap();
        registry.claim(&other).unwrap();
        registry.mark_complete(&rec.sdbid).unwrap();
        for id in [&rec.sdbid, &other.sdbid] {
            let row = Row::from([
                ("sdbid".to_string(), id.to_string()),
                ("Jmag".to_string(), "9.1".to_string()),
            ]);
            store.insert("tmass", row, WritePolicy::Append).unwrap();
        }

        assert_eq!(registry.reserve(&rec).unwrap(), ClaimOutcome::Claimed);
        assert_eq!(registry.state(&rec.sdbid).unwrap(), TargetState::Incomplete);
        assert!(registry.rows_of("tmass", &rec.sdbid).unwrap().is_empty());
        assert_eq!(registry.rows_of("tmass", &other.sdbid).unwrap().len(), 1);
        assert_eq!(store.count(POSITION_TABLE).unwrap(), 2);
    }

    #[test]
    fn test_collision() {
        let (_, registry) = registry();
        let rec = record(10.0, -20.0);
        registry.claim(&rec).unwrap();

        // same rounded identifier, different position
        let mut shifted = record(10.0 + 0.0005 / 3600.0, -20.0);
        assert_eq!(shifted.sdbid, rec.sdbid);
        assert!(registry.check_collision(&shifted).is_ok());

        shifted = PositionRecord::new(
            rec.sdbid.clone(),
            EpochPositions::replicated(SkyCoord::new(10.0 + 0.02 / 3600.0, -20.0)),
            None,
        );
        assert_eq!(
            registry.check_collision(&shifted),
            Err(SdbError::IdentifierCollision(rec.sdbid.clone()))
        );
    }

    #[test]
    fn test_lease_is_exclusive_until_dropped() {
        let (store, registry) = registry();
        let rec = record(10.0, -20.0);

        let lease = registry.acquire_lease(&rec.sdbid).unwrap().unwrap();
        assert_eq!(lease.sdbid(), &rec.sdbid);
        assert!(registry.acquire_lease(&rec.sdbid).unwrap().is_none());
        // other targets are not affected
        assert!(registry.acquire_lease(&record(11.0, -20.0).sdbid).unwrap().is_some());

        drop(lease);
        assert_eq!(store.count(LEASE_TABLE).unwrap(), 0);
        assert!(registry.acquire_lease(&rec.sdbid).unwrap().is_some());
    }

    #[test]
    fn test_stale_lease_is_broken() {
        let (store, registry) = registry();
        let registry = registry.with_lease_ttl(Duration::from_secs(60));
        let rec = record(10.0, -20.0);
        let dead_run = Row::from([
            (SDBID_COLUMN.to_string(), rec.sdbid.to_string()),
            (LEASE_OWNER_COLUMN.to_string(), "1-0-0".to_string()),
            (LEASE_ACQUIRED_COLUMN.to_string(), (unix_now() - 3600).to_string()),
        ]);
        store.insert(LEASE_TABLE, dead_run, WritePolicy::Append).unwrap();

        let lease = registry.acquire_lease(&rec.sdbid).unwrap().unwrap();
        let rows = store.select(LEASE_TABLE, &Filter::All).unwrap();
        assert_eq!(rows.len(), 1);
        assert_ne!(rows[0][LEASE_OWNER_COLUMN], "1-0-0");
        drop(lease);

        // a fresh foreign lease is respected
        let live_run = Row::from([
            (SDBID_COLUMN.to_string(), rec.sdbid.to_string()),
            (LEASE_OWNER_COLUMN.to_string(), "2-0-0".to_string()),
            (LEASE_ACQUIRED_COLUMN.to_string(), unix_now().to_string()),
        ]);
        store.insert(LEASE_TABLE, live_run, WritePolicy::Append).unwrap();
        assert!(registry.acquire_lease(&rec.sdbid).unwrap().is_none());
        assert_eq!(store.count(LEASE_TABLE).unwrap(), 1);
    }

    #[test]
    fn test_reserve_keeps_lease() {
        let (store, registry) = registry();
        let rec = record(10.0, -20.0);
        registry.claim(&rec).unwrap();
        let _lease = registry.acquire_lease(&rec.sdbid).unwrap().unwrap();

        assert_eq!(registry.reserve(&rec).unwrap(), ClaimOutcome::Claimed);
        assert_eq!(store.count(LEASE_TABLE).unwrap(), 1);
    }
}
