//! # Cross-identification
//!
//! Alternate identifiers (Xids) of a target come from two places:
//!
//! 1. the identifier directory, queried with the target's name;
//! 2. bulk catalogues mirrored in the datastore (IRAS FSC and PSC), matched by position against
//!    their error ellipses at the catalogue epoch.
//!
//! An external identifier maps to at most one target. Binding goes through
//! [`Datastore::insert_unique`] on the `xid` column, so a concurrent binding of the same external
//! identifier to another target is detected rather than silently doubled.
//!
//! - The name the target was requested (or reverse-resolved) with is mandatory: a conflict on it
//!   is fatal and reported as [`SdbError::IdentifierConflict`].
//! - Alternates returned by the directory are optional: a conflicting one is skipped with a
//!   warning, the other ones are still bound.

use std::sync::Arc;

use regex::Regex;

use crate::{
    catalogue::EllipseColumns,
    constants::{ArcSec, Degree, Row, SDBID_COLUMN, XID_COLUMN, XID_TABLE},
    datastore::{ClaimOutcome, Datastore, Filter},
    epoch::Epoch,
    identifier::SdbId,
    position::PositionRecord,
    sdb_errors::SdbError,
    services::{EllipseCandidate, EllipseMatchService, EllipseParams, IdentifierDirectory},
};

/// A cross-identifier: an external name bound to a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    pub sdbid: SdbId,
    pub xid: String,
}

impl Xid {
    pub fn new(sdbid: &SdbId, xid: &str) -> Self {
        Xid {
            sdbid: sdbid.clone(),
            xid: normalize_xid(xid),
        }
    }

    pub fn to_row(&self) -> Row {
        Row::from([
            (SDBID_COLUMN.to_string(), self.sdbid.to_string()),
            (XID_COLUMN.to_string(), self.xid.clone()),
        ])
    }

    pub fn from_row(row: &Row) -> Result<Self, SdbError> {
        let sdbid = row
            .get(SDBID_COLUMN)
            .ok_or_else(|| SdbError::DatastoreError("xid row without sdbid".into()))?
            .parse()?;
        let xid = row
            .get(XID_COLUMN)
            .ok_or_else(|| SdbError::DatastoreError("xid row without xid".into()))?
            .clone();
        Ok(Xid { sdbid, xid })
    }
}

/// Collapse runs of whitespace, external identifiers are compared in this form.
pub fn normalize_xid(xid: &str) -> String {
    xid.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A bulk catalogue mirrored locally and matched against error ellipses.
#[derive(Debug, Clone)]
pub struct BulkXidSpec {
    pub name: String,
    /// Datastore table holding the mirror
    pub table: String,
    pub epoch: Epoch,
    /// Xids of this catalogue; a target already having one is not matched again
    pub pattern: Regex,
    /// Prepended to the catalogue name column to form the Xid
    pub xid_prefix: String,
    pub name_column: String,
    pub columns: EllipseColumns,
    /// Half width of the pre-filter box, degrees
    pub box_half_width: Degree,
    pub params: EllipseParams,
}

impl BulkXidSpec {
    fn iras(name: &str, table: &str, pattern: &str) -> Result<Self, SdbError> {
        Ok(BulkXidSpec {
            name: name.to_string(),
            table: table.to_string(),
            epoch: Epoch::J1983_5,
            pattern: Regex::new(pattern).map_err(|e| SdbError::ConfigError(e.to_string()))?,
            xid_prefix: "IRAS ".to_string(),
            name_column: "name".to_string(),
            columns: EllipseColumns::iras(),
            box_half_width: 0.1,
            params: EllipseParams::default(),
        })
    }

    /// IRAS Faint Source Catalogue, names `Fhhmmm+ddmm`.
    pub fn iras_fsc() -> Result<Self, SdbError> {
        Self::iras("IRAS FSC", "iras_fsc", r"^IRAS F")
    }

    /// IRAS Point Source Catalogue, names `hhmmm+ddmm`.
    pub fn iras_psc() -> Result<Self, SdbError> {
        Self::iras("IRAS PSC", "iras_psc", r"^IRAS \d")
    }

    pub fn defaults() -> Result<Vec<Self>, SdbError> {
        Ok(vec![Self::iras_fsc()?, Self::iras_psc()?])
    }
}

/// A bulk catalogue match, before binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkMatch {
    pub xid: String,
    pub normalized_distance: f64,
    pub separation_arcsec: ArcSec,
}

#[derive(Clone)]
pub struct CrossIdCollector {
    store: Arc<dyn Datastore>,
    directory: Arc<dyn IdentifierDirectory>,
    ellipse: Arc<dyn EllipseMatchService>,
    bulk: Vec<BulkXidSpec>,
}

impl CrossIdCollector {
    pub fn new(
        store: Arc<dyn Datastore>,
        directory: Arc<dyn IdentifierDirectory>,
        ellipse: Arc<dyn EllipseMatchService>,
        bulk: Vec<BulkXidSpec>,
    ) -> Self {
        CrossIdCollector {
            store,
            directory,
            ellipse,
            bulk,
        }
    }

    pub fn bulk_specs(&self) -> &[BulkXidSpec] {
        &self.bulk
    }

    /// Every Xid bound to `id`.
    pub fn xids_of(&self, id: &SdbId) -> Result<Vec<Xid>, SdbError> {
        self.store
            .select(XID_TABLE, &Filter::sdbid(id.as_str()))?
            .iter()
            .map(Xid::from_row)
            .collect()
    }

    /// The target `external_id` is bound to, if any.
    pub fn bound_to(&self, external_id: &str) -> Result<Option<SdbId>, SdbError> {
        self.store
            .select(XID_TABLE, &Filter::eq(XID_COLUMN, &normalize_xid(external_id)))?
            .first()
            .map(|row| Xid::from_row(row).map(|x| x.sdbid))
            .transpose()
    }

    /// Check that `external_id` is free or already bound to `id`.
    ///
    /// Return
    /// ------
    /// * `Ok(true)` if the pair `(id, external_id)` already exists, `Ok(false)` if `external_id`
    ///   is free, [`SdbError::IdentifierConflict`] if it is bound to another target
    pub fn check_conflict(&self, id: &SdbId, external_id: &str) -> Result<bool, SdbError> {
        match self.bound_to(external_id)? {
            None => Ok(false),
            Some(bound) if &bound == id => Ok(true),
            Some(bound) => Err(SdbError::IdentifierConflict {
                external_id: external_id.to_string(),
                bound_to: bound,
                requested_by: id.clone(),
            }),
        }
    }

    /// Bind `external_id` to `id`; `Ok(false)` when the pair already existed.
    fn bind(&self, id: &SdbId, external_id: &str) -> Result<bool, SdbError> {
        let xid = Xid::new(id, external_id);
        if xid.xid.is_empty() {
            return Ok(false);
        }
        match self.store.insert_unique(XID_TABLE, XID_COLUMN, xid.to_row())? {
            ClaimOutcome::Claimed => Ok(true),
            ClaimOutcome::AlreadyClaimed => self.check_conflict(id, &xid.xid).map(|_| false),
        }
    }

    /// Bind the name the target was requested with; a conflict is fatal.
    pub fn add_supplied(&self, id: &SdbId, name: &str) -> Result<bool, SdbError> {
        self.bind(id, name)
    }

    /// Gather and bind the alternate identifiers of a target.
    ///
    /// Arguments
    /// ---------
    /// * `record`: the target's position record, bulk catalogues are matched at their epoch
    /// * `name`: the target name, used to query the identifier directory
    ///
    /// Return
    /// ------
    /// * The Xids written by this call; optional sources failing are logged and skipped
    pub fn collect(&self, record: &PositionRecord, name: Option<&str>) -> Result<Vec<Xid>, SdbError> {
        let id = &record.sdbid;
        let mut written = Vec::new();

        if let Some(name) = name {
            match self.directory.alternate_ids(name) {
                Ok(alternates) => {
                    for alternate in alternates {
                        self.bind_optional(id, &alternate, &mut written)?;
                    }
                }
                Err(err) => {
                    tracing::warn!(sdbid = %id, name, error = %err, "identifier directory unavailable")
                }
            }
        }

        for spec in &self.bulk {
            let existing = self.xids_of(id)?;
            if existing.iter().any(|x| spec.pattern.is_match(&x.xid)) {
                tracing::debug!(sdbid = %id, catalogue = %spec.name, "already cross-identified");
                continue;
            }
            match self.match_bulk(spec, record) {
                Ok(Some(found)) => self.bind_optional(id, &found.xid, &mut written)?,
                Ok(None) => tracing::debug!(sdbid = %id, catalogue = %spec.name, "no ellipse match"),
                Err(err) => {
                    tracing::warn!(sdbid = %id, catalogue = %spec.name, error = %err, "bulk match failed")
                }
            }
        }

        Ok(written)
    }

    fn bind_optional(&self, id: &SdbId, external_id: &str, written: &mut Vec<Xid>) -> Result<(), SdbError> {
        match self.bind(id, external_id) {
            Ok(true) => written.push(Xid::new(id, external_id)),
            Ok(false) => {}
            Err(err @ SdbError::IdentifierConflict { .. }) => {
                tracing::warn!(sdbid = %id, xid = external_id, error = %err, "conflicting alternate identifier skipped")
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Best ellipse match of the target in a bulk catalogue.
    pub fn match_bulk(
        &self,
        spec: &BulkXidSpec,
        record: &PositionRecord,
    ) -> Result<Option<BulkMatch>, SdbError> {
        let position = record.at(spec.epoch);
        let filter = Filter::Box {
            ra_column: spec.columns.ra.clone(),
            dec_column: spec.columns.dec.clone(),
            center: position,
            half_width: spec.box_half_width,
        };
        let candidates: Vec<EllipseCandidate> = self
            .store
            .select(&spec.table, &filter)?
            .into_iter()
            .filter_map(|row| spec.columns.candidate(row))
            .collect();

        let best = self.ellipse.match_best(position, &spec.params, candidates)?;
        Ok(best.and_then(|m| {
            let name = m.candidate.row.get(&spec.name_column)?.trim();
            Some(BulkMatch {
                xid: format!("{}{}", spec.xid_prefix, name),
                normalized_distance: m.normalized_distance,
                separation_arcsec: m.separation_arcsec,
            })
        }))
    }
}

#[cfg(test)]
mod crossid_test {
    use super::*;
    use crate::{
        config::WritePolicy,
        datastore::memory::MemoryDatastore,
        epoch::{EpochPositions, SkyCoord},
        identifier::IdentifierDeriver,
        services::{ellipse::NormalizedEllipseMatcher, local::LocalNameResolver},
    };

    fn record(ra: f64, dec: f64) -> PositionRecord {
        let coord = SkyCoord::new(ra, dec);
        let id = IdentifierDeriver::default().derive_coord(coord);
        PositionRecord::new(id, EpochPositions::replicated(coord), None)
    }

    fn iras_row(name: &str, ra: f64, dec: f64, major: f64, minor: f64, pa: f64) -> Row {
        Row::from([
            ("name".to_string(), name.to_string()),
            ("ra".to_string(), ra.to_string()),
            ("dec".to_string(), dec.to_string()),
            ("major".to_string(), major.to_string()),
            ("minor".to_string(), minor.to_string()),
            ("posang".to_string(), pa.to_string()),
        ])
    }

    fn collector(store: Arc<MemoryDatastore>, directory: LocalNameResolver) -> CrossIdCollector {
        CrossIdCollector::new(
            store,
            Arc::new(directory),
            Arc::new(NormalizedEllipseMatcher),
            BulkXidSpec::defaults().unwrap(),
        )
    }

    #[test]
    fn test_xid_row() {
        let rec = record(10.0, -20.0);
        let xid = Xid::new(&rec.sdbid, "HD   1234 ");
        assert_eq!(xid.xid, "HD 1234");
        assert_eq!(Xid::from_row(&xid.to_row()).unwrap(), xid);
    }

    #[test]
    fn test_patterns() {
        let fsc = BulkXidSpec::iras_fsc().unwrap();
        let psc = BulkXidSpec::iras_psc().unwrap();
        assert!(fsc.pattern.is_match("IRAS F18352+3844"));
        assert!(!fsc.pattern.is_match("IRAS 18352+3844"));
        assert!(psc.pattern.is_match("IRAS 18352+3844"));
        assert!(!psc.pattern.is_match("IRAS F18352+3844"));
    }

    #[test]
    fn test_conflict_and_idempotence() {
        let store = Arc::new(MemoryDatastore::new());
        let collector = collector(store.clone(), LocalNameResolver::new());
        let a = record(10.0, -20.0);
        let b = record(50.0, 20.0);

        assert_eq!(collector.check_conflict(&a.sdbid, "X"), Ok(false));
        assert_eq!(collector.add_supplied(&a.sdbid, "X"), Ok(true));
        assert_eq!(collector.add_supplied(&a.sdbid, "X"), Ok(false));
        assert_eq!(collector.check_conflict(&a.sdbid, "X"), Ok(true));

        let conflict = || SdbError::IdentifierConflict {
            external_id: "X".into(),
            bound_to: a.sdbid.clone(),
            requested_by: b.sdbid.clone(),
        };
        assert_eq!(collector.check_conflict(&b.sdbid, "X"), Err(conflict()));
        assert_eq!(collector.add_supplied(&b.sdbid, "X"), Err(conflict()));
        assert_eq!(store.count(XID_TABLE).unwrap(), 1);
    }

    #[test]
    fn test_collect_directory_and_bulk() {
        let store = Arc::new(MemoryDatastore::new());
        let rec = record(279.234735, 38.783689);
        let other = record(100.0, 0.0);

        let directory = LocalNameResolver::new().with_object(
            "* alf Lyr",
            rec.at(Epoch::J2000),
            &["Vega", "HD 172167", "Taken"],
        );
        let collector = collector(store.clone(), directory);
        collector.add_supplied(&other.sdbid, "Taken").unwrap();

        // PSC entry 10″ south, inside a 20″ ellipse; a FSC entry too far away
        store
            .insert(
                "iras_psc",
                iras_row("18352+3844", 279.234735, 38.783689 - 10.0 / 3600.0, 20.0, 8.0, 0.0),
                WritePolicy::Append,
            )
            .unwrap();
        store
            .insert(
                "iras_fsc",
                iras_row("F18352+3844", 279.234735, 38.783689 + 60.0 / 3600.0, 20.0, 8.0, 0.0),
                WritePolicy::Append,
            )
            .unwrap();

        let written = collector.collect(&rec, Some("Vega")).unwrap();
        let names: Vec<&str> = written.iter().map(|x| x.xid.as_str()).collect();
        assert_eq!(names, vec!["* alf Lyr", "Vega", "HD 172167", "IRAS 18352+3844"]);
        assert_eq!(collector.bound_to("Taken").unwrap(), Some(other.sdbid.clone()));

        // second pass writes nothing
        assert!(collector.collect(&rec, Some("Vega")).unwrap().is_empty());
        assert_eq!(collector.xids_of(&rec.sdbid).unwrap().len(), 4);
    }

    #[test]
    fn test_bulk_short_circuit() {
        let store = Arc::new(MemoryDatastore::new());
        let rec = record(10.0, -20.0);
        let collector = collector(store.clone(), LocalNameResolver::new());
        collector.add_supplied(&rec.sdbid, "IRAS 00375-2017").unwrap();

        store
            .insert(
                "iras_psc",
                iras_row("00375-2018", 10.0, -20.0, 20.0, 8.0, 0.0),
                WritePolicy::Append,
            )
            .unwrap();
        assert!(collector.collect(&rec, None).unwrap().is_empty());
    }
}
