//! # Position resolution
//!
//! Turns a [`TargetRequest`] (a name, a coordinate pair, or both) into the canonical epoch-2000.0
//! [`Position`] of the target and its [`PositionRecord`] at the six epochs.
//!
//! ## Algorithm
//!
//! 1. Coordinates only: reverse name resolution within the reverse radius. A name found there is
//!    kept for cross-identification; nothing found is not an error.
//! 2. A name that is not coordinate-shaped is resolved forward. When it cannot be resolved the
//!    supplied coordinates are used instead; without coordinates the resolution fails.
//!    A coordinate-shaped name (`sdb-v1-…`, `… J183656.3+384701`) is decoded directly.
//! 3. One cone search over the proper-motion catalogues, at epoch 2000.0, with the positions
//!    requested at every epoch.
//! 4. The closest entry seeds the position record. Without any entry the position is replicated
//!    at every epoch, i.e. the proper motion is assumed to be zero; this is logged.
//!
//! The identifier is derived from the epoch-2000.0 position of the record.

use std::sync::Arc;

use crate::{
    constants::{ArcSec, Degree},
    conversion::validate_coordinates,
    epoch::{Epoch, EpochPositions, SkyCoord},
    identifier::{parse_coordinate_name, IdentifierDeriver},
    position::{Position, PositionRecord, SourcePriority},
    sdb_errors::SdbError,
    services::{closest, CatalogueSource, ConeMatch, ConeQuery, ConeSearchService, NameResolver},
};

/// What the caller asks to process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetRequest {
    pub name: Option<String>,
    pub ra: Option<Degree>,
    pub dec: Option<Degree>,
}

impl TargetRequest {
    pub fn new(name: Option<&str>, ra: Option<Degree>, dec: Option<Degree>) -> Self {
        TargetRequest {
            name: name.map(str::to_string),
            ra,
            dec,
        }
    }

    pub fn by_name(name: &str) -> Self {
        Self::new(Some(name), None, None)
    }

    pub fn by_coordinates(ra: Degree, dec: Degree) -> Self {
        Self::new(None, Some(ra), Some(dec))
    }

    /// The name, blank names counting as absent.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// Check the request before any service is contacted.
    ///
    /// Return
    /// ------
    /// * The supplied coordinates, if any
    pub fn validate(&self) -> Result<Option<SkyCoord>, SdbError> {
        let coord = match (self.ra, self.dec) {
            (Some(ra), Some(dec)) => {
                validate_coordinates(ra, dec)?;
                Some(SkyCoord::new(ra, dec))
            }
            (None, None) => None,
            _ => {
                return Err(SdbError::InvalidInvocation(
                    "both ra and dec must be given".into(),
                ))
            }
        };
        if coord.is_none() && self.name().is_none() {
            return Err(SdbError::InvalidInvocation(
                "a name or a coordinate pair is required".into(),
            ));
        }
        Ok(coord)
    }
}

impl std::fmt::Display for TargetRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.name(), self.ra, self.dec) {
            (Some(name), _, _) => write!(f, "{name}"),
            (None, Some(ra), Some(dec)) => write!(f, "({ra}, {dec})"),
            _ => write!(f, "<empty request>"),
        }
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Canonical epoch-2000.0 position
    pub position: Position,
    pub record: PositionRecord,
    /// Supplied or reverse-resolved name, bound as a cross-identifier
    pub name: Option<String>,
}

#[derive(Clone)]
pub struct PositionResolver {
    names: Arc<dyn NameResolver>,
    cone: Arc<dyn ConeSearchService>,
    deriver: IdentifierDeriver,
    pm_catalogues: Vec<CatalogueSource>,
    reverse_radius: ArcSec,
    pm_radius: ArcSec,
}

impl PositionResolver {
    pub fn new(
        names: Arc<dyn NameResolver>,
        cone: Arc<dyn ConeSearchService>,
        deriver: IdentifierDeriver,
        pm_catalogues: Vec<CatalogueSource>,
        reverse_radius: ArcSec,
        pm_radius: ArcSec,
    ) -> Self {
        PositionResolver {
            names,
            cone,
            deriver,
            pm_catalogues,
            reverse_radius,
            pm_radius,
        }
    }

    pub fn deriver(&self) -> &IdentifierDeriver {
        &self.deriver
    }

    /// Resolve a request into a position and a position record.
    ///
    /// Arguments
    /// ---------
    /// * `request`: name and/or coordinates of the target
    ///
    /// Return
    /// ------
    /// * The [`Resolution`], [`SdbError::InvalidInvocation`] / [`SdbError::InvalidCoordinates`]
    ///   for a malformed request, [`SdbError::ResolutionFailure`] when no position can be formed
    pub fn resolve(&self, request: &TargetRequest) -> Result<Resolution, SdbError> {
        let user_coord = request.validate()?;
        let mut name = request.name().map(str::to_string);

        if name.is_none() {
            name = user_coord.and_then(|coord| self.reverse_resolve(coord));
        }

        let base = self.base_position(name.as_deref(), user_coord)?;
        tracing::info!(
            target_name = name.as_deref().unwrap_or("-"),
            ra = base.ra_deg,
            dec = base.dec_deg,
            source = %base.source_priority,
            "position resolved"
        );

        let (position, positions, pm_source) = match self.proper_motion_match(base.coord()) {
            Some((rank, m)) => match seed_positions(&m) {
                Some(positions) => {
                    let canonical = positions.canonical();
                    let position = Position {
                        ra_deg: canonical.ra_deg,
                        dec_deg: canonical.dec_deg,
                        source_priority: SourcePriority::ProperMotionCatalogue {
                            rank,
                            catalogue: m.catalogue.clone(),
                        },
                        ..base
                    };
                    (position, positions, Some(m.catalogue))
                }
                None => {
                    tracing::warn!(catalogue = %m.catalogue, "incomplete epoch positions, assuming zero proper motion");
                    let positions = EpochPositions::replicated(base.coord());
                    (base, positions, None)
                }
            },
            None => {
                tracing::warn!(
                    ra = base.ra_deg,
                    dec = base.dec_deg,
                    "no proper-motion catalogue entry, assuming zero proper motion"
                );
                let positions = EpochPositions::replicated(base.coord());
                (base, positions, None)
            }
        };

        let sdbid = self.deriver.derive(&position);
        tracing::info!(sdbid = %sdbid, pm_source = pm_source.as_deref().unwrap_or("-"), "identifier derived");

        Ok(Resolution {
            position,
            record: PositionRecord::new(sdbid, positions, pm_source),
            name,
        })
    }

    fn reverse_resolve(&self, coord: SkyCoord) -> Option<String> {
        match self.names.resolve_by_position(coord, self.reverse_radius) {
            Ok(Some(found)) => {
                tracing::debug!(name = %found, "reverse name resolution");
                Some(found)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "reverse name resolution failed");
                None
            }
        }
    }

    fn base_position(
        &self,
        name: Option<&str>,
        user_coord: Option<SkyCoord>,
    ) -> Result<Position, SdbError> {
        let position = |coord: SkyCoord, source_priority| Position {
            ra_deg: coord.ra_deg,
            dec_deg: coord.dec_deg,
            epoch: Epoch::J2000.year(),
            search_radius_arcsec: self.pm_radius,
            source_priority,
        };

        let Some(name) = name else {
            return user_coord
                .map(|c| position(c, SourcePriority::UserCoordinates))
                .ok_or_else(|| SdbError::InvalidInvocation("nothing to resolve".into()));
        };

        if let Some(coord) = parse_coordinate_name(name) {
            return Ok(match user_coord {
                Some(c) => position(c, SourcePriority::UserCoordinates),
                None => position(coord, SourcePriority::CoordinateName),
            });
        }

        let failure = match self.names.resolve_by_name(name) {
            Ok(Some(coord)) => return Ok(position(coord, SourcePriority::NameResolver)),
            Ok(None) => format!("{name}: unknown name"),
            Err(err) => format!("{name}: {err}"),
        };

        match user_coord {
            Some(coord) => {
                tracing::warn!(reason = %failure, "name resolution failed, using the supplied coordinates");
                Ok(position(coord, SourcePriority::UserCoordinates))
            }
            None => Err(SdbError::ResolutionFailure(failure)),
        }
    }

    /// Closest proper-motion catalogue entry and the priority rank of its catalogue.
    fn proper_motion_match(&self, center: SkyCoord) -> Option<(usize, ConeMatch)> {
        if self.pm_catalogues.is_empty() {
            return None;
        }
        let query = ConeQuery {
            center,
            radius: self.pm_radius,
            match_epoch: Some(Epoch::J2000),
            epochs: Epoch::ALL.to_vec(),
        };
        match self.cone.search(&self.pm_catalogues, &query) {
            Ok(matches) => closest(matches).map(|m| {
                let rank = self
                    .pm_catalogues
                    .iter()
                    .position(|c| c.name == m.catalogue)
                    .unwrap_or(self.pm_catalogues.len());
                (rank, m)
            }),
            Err(err) => {
                tracing::warn!(error = %err, "proper-motion catalogue search failed");
                None
            }
        }
    }
}

/// Epoch positions of a cone match, `None` unless all six are present.
fn seed_positions(m: &ConeMatch) -> Option<EpochPositions> {
    if Epoch::ALL.iter().any(|e| m.position_at(*e).is_none()) {
        return None;
    }
    Some(EpochPositions::from_fn(|epoch| {
        m.position_at(epoch).unwrap_or(SkyCoord::new(f64::NAN, f64::NAN))
    }))
}

#[cfg(test)]
mod resolver_test {
    use super::*;
    use crate::services::local::{LocalConeSearch, LocalNameResolver, LocalSource};
    use approx::assert_relative_eq;

    fn hip() -> CatalogueSource {
        CatalogueSource::new("hip", "RA", "DE", 1991.25).with_proper_motion("pmRA", "pmDE")
    }

    fn resolver(names: LocalNameResolver, cone: LocalConeSearch) -> PositionResolver {
        resolver_with(names, cone, vec![hip()])
    }

    fn resolver_with(
        names: LocalNameResolver,
        cone: LocalConeSearch,
        pm_catalogues: Vec<CatalogueSource>,
    ) -> PositionResolver {
        PositionResolver::new(
            Arc::new(names),
            Arc::new(cone),
            IdentifierDeriver::default(),
            pm_catalogues,
            2.0,
            5.0,
        )
    }

    fn vega_names() -> LocalNameResolver {
        LocalNameResolver::new().with_object(
            "* alf Lyr",
            SkyCoord::new(279.234735, 38.783689),
            &["Vega"],
        )
    }

    #[test]
    fn test_invalid_requests() {
        let r = resolver(LocalNameResolver::new(), LocalConeSearch::new());
        assert!(matches!(
            r.resolve(&TargetRequest::default()),
            Err(SdbError::InvalidInvocation(_))
        ));
        assert!(matches!(
            r.resolve(&TargetRequest::new(Some("  "), None, None)),
            Err(SdbError::InvalidInvocation(_))
        ));
        assert!(matches!(
            r.resolve(&TargetRequest::new(None, Some(10.0), None)),
            Err(SdbError::InvalidInvocation(_))
        ));
        assert_eq!(
            r.resolve(&TargetRequest::by_coordinates(400.0, 0.0)),
            Err(SdbError::InvalidCoordinates { ra: 400.0, dec: 0.0 })
        );
    }

    #[test]
    fn test_name_without_proper_motion_match() {
        let r = resolver(vega_names(), LocalConeSearch::new());
        let res = r.resolve(&TargetRequest::by_name("Vega")).unwrap();
        assert_eq!(res.record.sdbid.as_str(), "sdb-v1-183656.34+384701.3");
        assert_eq!(res.position.source_priority, SourcePriority::NameResolver);
        assert_eq!(res.name.as_deref(), Some("Vega"));
        for epoch in Epoch::PROPAGATED {
            assert_eq!(res.record.at(epoch), res.record.at(Epoch::J2000));
        }
        assert!(res.record.pm_source.is_none());
    }

    #[test]
    fn test_unresolvable_name() {
        let r = resolver(vega_names(), LocalConeSearch::new());
        assert!(matches!(
            r.resolve(&TargetRequest::by_name("Nowhere")),
            Err(SdbError::ResolutionFailure(_))
        ));

        // falls back on the supplied coordinates
        let res = r
            .resolve(&TargetRequest::new(Some("Nowhere"), Some(10.0), Some(-20.0)))
            .unwrap();
        assert_eq!(res.record.sdbid.as_str(), "sdb-v1-004000.00-200000.0");
        assert_eq!(res.position.source_priority, SourcePriority::UserCoordinates);
        assert_eq!(res.name.as_deref(), Some("Nowhere"));
    }

    #[test]
    fn test_coordinates_with_reverse_resolution() {
        let r = resolver(vega_names(), LocalConeSearch::new());
        let res = r
            .resolve(&TargetRequest::by_coordinates(279.2347, 38.7837))
            .unwrap();
        assert_eq!(res.name.as_deref(), Some("* alf Lyr"));
        // the forward resolution of the found name gives the position
        assert_eq!(res.record.sdbid.as_str(), "sdb-v1-183656.34+384701.3");

        let res = r.resolve(&TargetRequest::by_coordinates(10.0, -20.0)).unwrap();
        assert!(res.name.is_none());
        assert_eq!(res.position.source_priority, SourcePriority::UserCoordinates);
    }

    #[test]
    fn test_coordinate_shaped_name() {
        let r = resolver(LocalNameResolver::new(), LocalConeSearch::new());
        let res = r
            .resolve(&TargetRequest::by_name("sdb-v1-004000.00-200000.0"))
            .unwrap();
        assert_eq!(res.record.sdbid.as_str(), "sdb-v1-004000.00-200000.0");
        assert_eq!(res.position.source_priority, SourcePriority::CoordinateName);
    }

    #[test]
    fn test_proper_motion_seed() {
        // catalogued at 1991.25, moving 1.2″/yr north: at J2000 it sits 10.5″ north
        let cone = LocalConeSearch::new().with_source(
            LocalSource::new("hip", SkyCoord::new(100.0, 0.0), 1991.25).with_proper_motion(0.0, 1200.0),
        );
        let names = LocalNameResolver::new().with_object(
            "HIP 1",
            SkyCoord::new(100.0, 10.0 / 3600.0),
            &[],
        );
        let r = resolver(names, cone);
        let res = r.resolve(&TargetRequest::by_name("HIP 1")).unwrap();

        assert_eq!(res.record.pm_source.as_deref(), Some("hip"));
        assert_eq!(
            res.position.source_priority,
            SourcePriority::ProperMotionCatalogue {
                rank: 0,
                catalogue: "hip".into()
            }
        );
        assert_relative_eq!(res.record.de_deg0(), 10.5 / 3600.0, epsilon = 1e-12);
        assert_relative_eq!(res.record.at(Epoch::J1991_25).dec_deg, 0.0, epsilon = 1e-12);
        assert_relative_eq!(res.record.at(Epoch::J1983_5).dec_deg, -9.3 / 3600.0, epsilon = 1e-12);
        assert_eq!(res.record.sdbid.as_str(), "sdb-v1-064000.00+000010.5");
    }

    #[test]
    fn test_name_service_down_without_coordinates() {
        let r = resolver(vega_names().with_unavailable(), LocalConeSearch::new());
        let err = r.resolve(&TargetRequest::by_name("Vega")).unwrap_err();
        let SdbError::ResolutionFailure(reason) = err else {
            panic!("expected a resolution failure, got {err:?}");
        };
        assert!(reason.starts_with("Vega: "));
    }

    #[test]
    fn test_name_service_down_with_coordinates() {
        let r = resolver(vega_names().with_unavailable(), LocalConeSearch::new());
        let res = r
            .resolve(&TargetRequest::new(Some("Vega"), Some(10.0), Some(-20.0)))
            .unwrap();
        assert_eq!(res.record.sdbid.as_str(), "sdb-v1-004000.00-200000.0");
        assert_eq!(res.position.source_priority, SourcePriority::UserCoordinates);
        assert_eq!(res.name.as_deref(), Some("Vega"));
    }

    #[test]
    fn test_reverse_resolution_down() {
        let r = resolver(vega_names().with_unavailable(), LocalConeSearch::new());
        let res = r
            .resolve(&TargetRequest::by_coordinates(279.2347, 38.7837))
            .unwrap();
        assert!(res.name.is_none());
        assert_eq!(res.position.source_priority, SourcePriority::UserCoordinates);
        assert_eq!(res.record.sdbid.as_str(), "sdb-v1-183656.33+384701.3");
    }

    #[test]
    fn test_proper_motion_seed_survives_catalogue_outage() {
        let gaia = CatalogueSource::new("gaia", "RA_ICRS", "DE_ICRS", 2015.5)
            .with_proper_motion("pmRA", "pmDE");
        let names = || {
            LocalNameResolver::new().with_object("HIP 1", SkyCoord::new(100.0, 10.0 / 3600.0), &[])
        };
        let cone = || {
            LocalConeSearch::new().with_source(
                LocalSource::new("hip", SkyCoord::new(100.0, 0.0), 1991.25)
                    .with_proper_motion(0.0, 1200.0),
            )
        };
        let request = TargetRequest::by_name("HIP 1");

        let healthy = resolver_with(names(), cone(), vec![gaia.clone(), hip()])
            .resolve(&request)
            .unwrap();
        let degraded = resolver_with(names(), cone().with_unavailable("gaia"), vec![gaia, hip()])
            .resolve(&request)
            .unwrap();

        assert_eq!(degraded.record.sdbid, healthy.record.sdbid);
        assert_eq!(degraded.record.pm_source.as_deref(), Some("hip"));
        assert_eq!(degraded.record.sdbid.as_str(), "sdb-v1-064000.00+000010.5");
    }
}
