//! # External collaborators
//!
//! The engine never talks to a network service or a storage engine directly: it goes through the
//! traits defined here.
//!
//! | trait | role |
//! |-------|------|
//! | [`NameResolver`] | name → position, and position → name within a radius |
//! | [`IdentifierDirectory`] | name → every alternate identifier of the same object |
//! | [`ConeSearchService`] | positional query against one or several catalogues |
//! | [`EllipseMatchService`] | best match of a position against error ellipses |
//!
//! Implementations:
//! - [`cds`]: Sesame, SIMBAD TAP and VizieR over HTTP, sharing one [`SdbEnv`](crate::env_state::SdbEnv)
//! - [`local`]: in-memory resolvers and catalogues, used offline and in tests
//! - [`ellipse`]: the normalized-distance ellipse matcher
//!
//! Transient failures are retried inside the HTTP adapters; what reaches the caller is final.

pub mod cds;
pub mod ellipse;
pub mod local;

use std::collections::BTreeMap;

use crate::{
    constants::{ArcSec, DecimalYear, Row},
    epoch::{Epoch, SkyCoord},
    sdb_errors::SdbError,
};

pub trait NameResolver: Send + Sync {
    /// Position of a named object at epoch 2000.0, `None` when the name is unknown.
    fn resolve_by_name(&self, name: &str) -> Result<Option<SkyCoord>, SdbError>;

    /// Name of the closest object within `radius`, `None` when there is none.
    fn resolve_by_position(
        &self,
        coord: SkyCoord,
        radius: ArcSec,
    ) -> Result<Option<String>, SdbError>;
}

pub trait IdentifierDirectory: Send + Sync {
    /// Every identifier designating the same object as `name`, `name` itself included.
    fn alternate_ids(&self, name: &str) -> Result<Vec<String>, SdbError>;
}

/// Column names of the proper motion in a catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct ProperMotionColumns {
    /// μα·cosδ, mas/yr
    pub pm_ra: String,
    /// μδ, mas/yr
    pub pm_dec: String,
}

/// How to query one catalogue positionally.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueSource {
    /// Catalogue identifier at the service (e.g. the VizieR table `II/246/out`)
    pub name: String,
    pub ra_column: String,
    pub dec_column: String,
    /// Epoch of the catalogued positions
    pub reference_epoch: DecimalYear,
    /// Proper-motion columns, for catalogues able to propagate their positions
    pub proper_motion: Option<ProperMotionColumns>,
    /// Extra columns returned with each match; empty returns every column
    pub columns: Vec<String>,
}

impl CatalogueSource {
    pub fn new(name: &str, ra_column: &str, dec_column: &str, reference_epoch: DecimalYear) -> Self {
        CatalogueSource {
            name: name.to_string(),
            ra_column: ra_column.to_string(),
            dec_column: dec_column.to_string(),
            reference_epoch,
            proper_motion: None,
            columns: Vec::new(),
        }
    }

    pub fn with_proper_motion(mut self, pm_ra: &str, pm_dec: &str) -> Self {
        self.proper_motion = Some(ProperMotionColumns {
            pm_ra: pm_ra.to_string(),
            pm_dec: pm_dec.to_string(),
        });
        self
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Add `extra` to the returned columns, keeping the existing order.
    pub fn with_extra_columns(mut self, extra: &[String]) -> Self {
        for column in extra {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
        self
    }

    /// Columns a query must ask for: position, proper motion, then the extra columns.
    /// `None` when every column is wanted.
    pub fn requested_columns(&self) -> Option<Vec<String>> {
        if self.columns.is_empty() {
            return None;
        }
        let mut requested = vec![self.ra_column.clone(), self.dec_column.clone()];
        if let Some(pm) = &self.proper_motion {
            requested.push(pm.pm_ra.clone());
            requested.push(pm.pm_dec.clone());
        }
        for column in &self.columns {
            if !requested.contains(column) {
                requested.push(column.clone());
            }
        }
        Some(requested)
    }
}

/// A cone search request.
#[derive(Debug, Clone, PartialEq)]
pub struct ConeQuery {
    pub center: SkyCoord,
    pub radius: ArcSec,
    /// Epoch at which separations are measured; `None` uses each catalogue's native epoch
    pub match_epoch: Option<Epoch>,
    /// Epochs the matched positions must be returned at
    pub epochs: Vec<Epoch>,
}

impl ConeQuery {
    /// A query at the native epoch of the catalogues, without propagated positions.
    pub fn native(center: SkyCoord, radius: ArcSec) -> Self {
        ConeQuery {
            center,
            radius,
            match_epoch: None,
            epochs: Vec::new(),
        }
    }
}

/// One entry returned by a cone search.
#[derive(Debug, Clone, PartialEq)]
pub struct ConeMatch {
    pub catalogue: String,
    pub separation_arcsec: ArcSec,
    /// Position at each requested epoch
    pub positions: BTreeMap<Epoch, SkyCoord>,
    /// Catalogue columns of the entry
    pub fields: Row,
}

impl ConeMatch {
    pub fn position_at(&self, epoch: Epoch) -> Option<SkyCoord> {
        self.positions.get(&epoch).copied()
    }
}

/// Keep the closest match of a cone search result.
pub fn closest(matches: Vec<ConeMatch>) -> Option<ConeMatch> {
    matches
        .into_iter()
        .min_by(|a, b| a.separation_arcsec.total_cmp(&b.separation_arcsec))
}

/// Search `catalogues` one at a time and merge the matches by increasing separation.
///
/// A catalogue whose search fails is logged and contributes no match. The search fails only
/// when no catalogue answered.
pub(crate) fn search_each(
    catalogues: &[CatalogueSource],
    mut search_one: impl FnMut(&CatalogueSource) -> Result<Vec<ConeMatch>, SdbError>,
) -> Result<Vec<ConeMatch>, SdbError> {
    let mut matches = Vec::new();
    let mut answered = false;
    let mut first_error = None;
    for catalogue in catalogues {
        match search_one(catalogue) {
            Ok(found) => {
                answered = true;
                matches.extend(found);
            }
            Err(err) => {
                tracing::warn!(catalogue = %catalogue.name, error = %err, "catalogue search failed, no match taken from it");
                first_error.get_or_insert(err);
            }
        }
    }
    if let (false, Some(err)) = (answered, first_error) {
        return Err(err);
    }
    matches.sort_by(|a, b| a.separation_arcsec.total_cmp(&b.separation_arcsec));
    Ok(matches)
}

pub trait ConeSearchService: Send + Sync {
    /// Entries of `catalogues` within the query cone, ordered by increasing separation.
    fn search(
        &self,
        catalogues: &[CatalogueSource],
        query: &ConeQuery,
    ) -> Result<Vec<ConeMatch>, SdbError>;
}

/// A positional error ellipse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub semi_major: ArcSec,
    pub semi_minor: ArcSec,
    /// Position angle of the major axis, degrees east of north
    pub position_angle: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EllipseCandidate {
    pub coord: SkyCoord,
    pub ellipse: Ellipse,
    pub row: Row,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseParams {
    /// Largest accepted normalized distance (1.0 = on the ellipse)
    pub max_normalized: f64,
}

impl Default for EllipseParams {
    fn default() -> Self {
        EllipseParams {
            max_normalized: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EllipseMatch {
    pub candidate: EllipseCandidate,
    pub normalized_distance: f64,
    pub separation_arcsec: ArcSec,
}

pub trait EllipseMatchService: Send + Sync {
    /// The candidate whose ellipse best contains `position`, if any.
    fn match_best(
        &self,
        position: SkyCoord,
        params: &EllipseParams,
        candidates: Vec<EllipseCandidate>,
    ) -> Result<Option<EllipseMatch>, SdbError>;
}

#[cfg(test)]
mod services_test {
    use super::*;

    fn cone_match(catalogue: &str, sep: f64) -> ConeMatch {
        ConeMatch {
            catalogue: catalogue.to_string(),
            separation_arcsec: sep,
            positions: BTreeMap::new(),
            fields: Row::new(),
        }
    }

    #[test]
    fn test_closest() {
        let best = closest(vec![
            cone_match("a", 1.2),
            cone_match("b", 0.4),
            cone_match("c", 0.9),
        ])
        .unwrap();
        assert_eq!(best.catalogue, "b");
        assert!(closest(Vec::new()).is_none());
    }

    #[test]
    fn test_requested_columns() {
        let tmass = CatalogueSource::new("II/246/out", "RAJ2000", "DEJ2000", 1999.3);
        assert_eq!(tmass.requested_columns(), None);

        let fields = vec!["Jmag".to_string(), "RAJ2000".to_string(), "Kmag".to_string()];
        let tmass = tmass.with_extra_columns(&fields);
        assert_eq!(
            tmass.requested_columns().unwrap(),
            vec!["RAJ2000", "DEJ2000", "Jmag", "Kmag"]
        );

        let gaia = CatalogueSource::new("I/345/gaia2", "RA_ICRS", "DE_ICRS", 2015.5)
            .with_proper_motion("pmRA", "pmDE")
            .with_columns(&["Source"])
            .with_extra_columns(&["Source".to_string(), "Gmag".to_string()]);
        assert_eq!(
            gaia.requested_columns().unwrap(),
            vec!["RA_ICRS", "DE_ICRS", "pmRA", "pmDE", "Source", "Gmag"]
        );
    }

    #[test]
    fn test_search_each_skips_failing_catalogue() {
        let catalogues = vec![
            CatalogueSource::new("gaia", "RA", "DE", 2015.5),
            CatalogueSource::new("hip", "RA", "DE", 1991.25),
            CatalogueSource::new("tyc", "RA", "DE", 1991.25),
        ];
        let found = search_each(&catalogues, |c| match c.name.as_str() {
            "gaia" => Err(SdbError::Timeout("gaia".into())),
            "hip" => Ok(vec![cone_match("hip", 0.8)]),
            _ => Ok(vec![cone_match("tyc", 0.3)]),
        })
        .unwrap();
        let order: Vec<&str> = found.iter().map(|m| m.catalogue.as_str()).collect();
        assert_eq!(order, vec!["tyc", "hip"]);
    }

    #[test]
    fn test_search_each_all_failing() {
        let catalogues = vec![
            CatalogueSource::new("gaia", "RA", "DE", 2015.5),
            CatalogueSource::new("hip", "RA", "DE", 1991.25),
        ];
        let result = search_each(&catalogues, |c| Err(SdbError::Timeout(c.name.clone())));
        assert_eq!(result, Err(SdbError::Timeout("gaia".into())));
        assert_eq!(search_each(&[], |_| Ok(Vec::new())), Ok(Vec::new()));
    }
}
