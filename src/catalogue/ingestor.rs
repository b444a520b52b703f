//! Match a target in each catalogue and write the best counterpart.
//!
//! Each catalogue is independent: a missing counterpart, a timeout or a service failure only
//! omits that catalogue's row. Under [`WritePolicy::Append`] a catalogue already holding a row
//! for the target is skipped, so re-running ingestion on a partially ingested target only fills
//! the missing catalogues. The write itself is an insert-if-absent on `sdbid`: two runs resuming
//! the same target concurrently still leave a single row per catalogue.

use std::sync::Arc;

use crate::{
    config::WritePolicy,
    constants::{Row, SDBID_COLUMN},
    datastore::{ClaimOutcome, Datastore, Filter},
    identifier::SdbId,
    position::PositionRecord,
    sdb_errors::SdbError,
    services::{closest, ConeQuery, ConeSearchService, EllipseMatchService},
};

use super::{CatalogueSpec, SearchMode};

/// Separation of the match, arcseconds
pub const SEPARATION_COLUMN: &str = "_r";
/// Normalized ellipse distance of the match
pub const ELLIPSE_DISTANCE_COLUMN: &str = "_nd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// One row written
    Written,
    /// No counterpart in the catalogue
    NoMatch,
    /// A row already exists for the target
    Skipped,
}

/// Tally of one target's ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub written: usize,
    pub no_match: usize,
    pub skipped: usize,
    /// Catalogues whose search failed, counted as no match
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct CatalogueIngestor {
    store: Arc<dyn Datastore>,
    cone: Arc<dyn ConeSearchService>,
    ellipse: Arc<dyn EllipseMatchService>,
}

impl CatalogueIngestor {
    pub fn new(
        store: Arc<dyn Datastore>,
        cone: Arc<dyn ConeSearchService>,
        ellipse: Arc<dyn EllipseMatchService>,
    ) -> Self {
        CatalogueIngestor {
            store,
            cone,
            ellipse,
        }
    }

    /// Match one target in one catalogue.
    ///
    /// Arguments
    /// ---------
    /// * `record`: the target, searched at the position of `spec.epoch`
    /// * `spec`: the catalogue
    /// * `policy`: `Append` skips a catalogue already holding a row for the target, `Replace`
    ///   overwrites it
    ///
    /// Return
    /// ------
    /// * The outcome, or the search / datastore error
    pub fn ingest(
        &self,
        record: &PositionRecord,
        spec: &CatalogueSpec,
        policy: WritePolicy,
    ) -> Result<IngestOutcome, SdbError> {
        let id = &record.sdbid;
        if policy == WritePolicy::Append
            && !self
                .store
                .select(&spec.table, &Filter::sdbid(id.as_str()))?
                .is_empty()
        {
            return Ok(IngestOutcome::Skipped);
        }

        let position = record.at(spec.epoch);
        let found = match &spec.mode {
            SearchMode::Cone { source, radius } => {
                let source = source.clone().with_extra_columns(&spec.fields);
                let query = ConeQuery::native(position, *radius);
                let matches = self.cone.search(std::slice::from_ref(&source), &query)?;
                closest(matches).map(|m| {
                    let mut row = spec.project(&m.fields);
                    row.insert(SEPARATION_COLUMN.to_string(), format!("{:.3}", m.separation_arcsec));
                    row
                })
            }
            SearchMode::LocalEllipse {
                table,
                columns,
                box_half_width,
                params,
            } => {
                let filter = Filter::Box {
                    ra_column: columns.ra.clone(),
                    dec_column: columns.dec.clone(),
                    center: position,
                    half_width: *box_half_width,
                };
                let candidates = self
                    .store
                    .select(table, &filter)?
                    .into_iter()
                    .filter_map(|row| columns.candidate(row))
                    .collect();
                self.ellipse
                    .match_best(position, params, candidates)?
                    .map(|m| {
                        let mut row = spec.project(&m.candidate.row);
                        row.insert(SEPARATION_COLUMN.to_string(), format!("{:.3}", m.separation_arcsec));
                        row.insert(
                            ELLIPSE_DISTANCE_COLUMN.to_string(),
                            format!("{:.4}", m.normalized_distance),
                        );
                        row
                    })
            }
        };

        match found {
            Some(mut row) => {
                row.insert(SDBID_COLUMN.to_string(), id.to_string());
                match policy {
                    WritePolicy::Append => {
                        let outcome = self.store.insert_unique(&spec.table, SDBID_COLUMN, row)?;
                        if outcome == ClaimOutcome::AlreadyClaimed {
                            return Ok(IngestOutcome::Skipped);
                        }
                    }
                    WritePolicy::Replace => self.store.insert(&spec.table, row, policy)?,
                }
                tracing::debug!(sdbid = %id, catalogue = %spec.label, "counterpart written");
                Ok(IngestOutcome::Written)
            }
            None => Ok(IngestOutcome::NoMatch),
        }
    }

    /// Run every catalogue in order; search failures are logged and counted, not propagated.
    ///
    /// A datastore failure is not a search failure and aborts the loop.
    pub fn ingest_all(
        &self,
        record: &PositionRecord,
        specs: &[CatalogueSpec],
        policy: WritePolicy,
    ) -> Result<IngestSummary, SdbError> {
        let mut summary = IngestSummary::default();
        for spec in specs {
            match self.ingest(record, spec, policy) {
                Ok(IngestOutcome::Written) => summary.written += 1,
                Ok(IngestOutcome::NoMatch) => summary.no_match += 1,
                Ok(IngestOutcome::Skipped) => summary.skipped += 1,
                Err(err @ SdbError::DatastoreError(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(sdbid = %record.sdbid, catalogue = %spec.label, error = %err, "catalogue search failed, no counterpart recorded");
                    summary.failed.push(spec.label.clone());
                }
            }
        }
        Ok(summary)
    }

    /// Catalogue rows of a target.
    pub fn rows_of(&self, spec: &CatalogueSpec, id: &SdbId) -> Result<Vec<Row>, SdbError> {
        self.store.select(&spec.table, &Filter::sdbid(id.as_str()))
    }
}
