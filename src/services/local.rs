//! In-memory implementations of the collaborator traits.
//!
//! These serve offline runs (targets and catalogues loaded from local files by the caller) and
//! tests. [`LocalConeSearch`] behaves like a real proper-motion catalogue: entries are stored at
//! their catalogue epoch and propagated linearly on request.

use std::collections::{BTreeMap, HashMap};

use crate::{
    constants::{ArcSec, DecimalYear, Row},
    epoch::{propagate, Epoch, ProperMotion, SkyCoord},
    sdb_errors::SdbError,
};

use super::{
    search_each, CatalogueSource, ConeMatch, ConeQuery, ConeSearchService, IdentifierDirectory,
    NameResolver,
};

#[derive(Debug, Clone)]
struct LocalObject {
    coord: SkyCoord,
    alternates: Vec<String>,
}

/// Name resolver and identifier directory over a fixed set of objects.
#[derive(Debug, Clone, Default)]
pub struct LocalNameResolver {
    objects: Vec<LocalObject>,
    by_name: HashMap<String, usize>,
    unavailable: bool,
}

impl LocalNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under its main name and alternate identifiers.
    pub fn add_object(&mut self, main_name: &str, coord: SkyCoord, alternates: &[&str]) {
        let idx = self.objects.len();
        let mut names = vec![main_name.to_string()];
        names.extend(alternates.iter().map(|s| s.to_string()));
        for name in &names {
            self.by_name.insert(normalize_name(name), idx);
        }
        self.objects.push(LocalObject {
            coord,
            alternates: names,
        });
    }

    pub fn with_object(mut self, main_name: &str, coord: SkyCoord, alternates: &[&str]) -> Self {
        self.add_object(main_name, coord, alternates);
        self
    }

    /// Make every lookup fail with a timeout.
    pub fn with_unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn lookup(&self, name: &str) -> Result<Option<&LocalObject>, SdbError> {
        if self.unavailable {
            return Err(SdbError::Timeout("local name resolver".into()));
        }
        Ok(self
            .by_name
            .get(&normalize_name(name))
            .map(|idx| &self.objects[*idx]))
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl NameResolver for LocalNameResolver {
    fn resolve_by_name(&self, name: &str) -> Result<Option<SkyCoord>, SdbError> {
        Ok(self.lookup(name)?.map(|obj| obj.coord))
    }

    fn resolve_by_position(
        &self,
        coord: SkyCoord,
        radius: ArcSec,
    ) -> Result<Option<String>, SdbError> {
        if self.unavailable {
            return Err(SdbError::Timeout("local name resolver".into()));
        }
        Ok(self
            .objects
            .iter()
            .map(|obj| (obj, obj.coord.separation(&coord)))
            .filter(|(_, sep)| *sep <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(obj, _)| obj.alternates[0].clone()))
    }
}

impl IdentifierDirectory for LocalNameResolver {
    fn alternate_ids(&self, name: &str) -> Result<Vec<String>, SdbError> {
        Ok(self
            .lookup(name)?
            .map(|obj| obj.alternates.clone())
            .unwrap_or_default())
    }
}

/// One catalogued source of a [`LocalConeSearch`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSource {
    pub catalogue: String,
    /// Position at `reference_epoch`
    pub coord: SkyCoord,
    pub proper_motion: ProperMotion,
    pub reference_epoch: DecimalYear,
    pub fields: Row,
}

impl LocalSource {
    pub fn new(catalogue: &str, coord: SkyCoord, reference_epoch: DecimalYear) -> Self {
        LocalSource {
            catalogue: catalogue.to_string(),
            coord,
            proper_motion: ProperMotion::default(),
            reference_epoch,
            fields: Row::new(),
        }
    }

    pub fn with_proper_motion(mut self, pm_ra_cosdec: f64, pm_dec: f64) -> Self {
        self.proper_motion = ProperMotion {
            pm_ra_cosdec,
            pm_dec,
        };
        self
    }

    pub fn with_field(mut self, column: &str, value: &str) -> Self {
        self.fields.insert(column.to_string(), value.to_string());
        self
    }

    fn at_year(&self, year: DecimalYear) -> SkyCoord {
        propagate(self.coord, self.proper_motion, self.reference_epoch, year)
    }
}

/// Cone search over in-memory catalogues.
#[derive(Debug, Clone, Default)]
pub struct LocalConeSearch {
    sources: Vec<LocalSource>,
    unavailable: Vec<String>,
}

impl LocalConeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: LocalSource) {
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: LocalSource) -> Self {
        self.add_source(source);
        self
    }

    /// Make every query touching `catalogue` fail with a timeout.
    pub fn with_unavailable(mut self, catalogue: &str) -> Self {
        self.unavailable.push(catalogue.to_string());
        self
    }
}

impl LocalConeSearch {
    fn search_one(
        &self,
        catalogue: &CatalogueSource,
        query: &ConeQuery,
    ) -> Result<Vec<ConeMatch>, SdbError> {
        if self.unavailable.contains(&catalogue.name) {
            return Err(SdbError::Timeout(catalogue.name.clone()));
        }
        let requested = catalogue.requested_columns();

        Ok(self
            .sources
            .iter()
            .filter(|s| s.catalogue == catalogue.name)
            .filter_map(|source| {
                let at_match = match query.match_epoch {
                    Some(epoch) => source.at_year(epoch.year()),
                    None => source.coord,
                };
                let separation = at_match.separation(&query.center);
                if separation > query.radius {
                    return None;
                }
                let positions: BTreeMap<Epoch, SkyCoord> = query
                    .epochs
                    .iter()
                    .map(|epoch| (*epoch, source.at_year(epoch.year())))
                    .collect();
                let fields = match &requested {
                    Some(columns) => source
                        .fields
                        .iter()
                        .filter(|(k, _)| columns.contains(k))
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                    None => source.fields.clone(),
                };
                Some(ConeMatch {
                    catalogue: source.catalogue.clone(),
                    separation_arcsec: separation,
                    positions,
                    fields,
                })
            })
            .collect())
    }
}

impl ConeSearchService for LocalConeSearch {
    fn search(
        &self,
        catalogues: &[CatalogueSource],
        query: &ConeQuery,
    ) -> Result<Vec<ConeMatch>, SdbError> {
        search_each(catalogues, |catalogue| self.search_one(catalogue, query))
    }
}
