//! HTTP adapters for the CDS services.
//!
//! - [`SesameResolver`]: forward name resolution and alternate identifiers, from the Sesame
//!   plain-text output (`-oI`): the `%J` line carries the J2000 position, `%I` lines the
//!   identifiers.
//! - [`SimbadTapResolver`]: reverse resolution, an ADQL cone on the SIMBAD `basic` table through
//!   the TAP synchronous endpoint (CSV output).
//! - [`CdsNameResolver`]: the two above behind one [`NameResolver`].
//! - [`VizierConeSearch`]: cone searches on VizieR tables through the ASU-TSV interface. Epoch
//!   positions are propagated locally from the returned proper motions.
//!
//! Every request goes through [`SdbEnv::get_text`], which applies the global timeout and the
//! retry policy.

use std::collections::BTreeMap;

use itertools::Itertools;
use regex::Regex;

use crate::{
    constants::{ArcSec, Row, ARCSEC_PER_DEG},
    env_state::SdbEnv,
    epoch::{propagate, ProperMotion, SkyCoord},
    sdb_errors::SdbError,
};

use super::{
    search_each, CatalogueSource, ConeMatch, ConeQuery, ConeSearchService, IdentifierDirectory,
    NameResolver,
};

/// Extra radius queried on proper-motion catalogues when matching at another epoch.
const PM_SEARCH_MARGIN: ArcSec = 30.0;

/// Forward name resolution and identifier directory through CDS Sesame.
#[derive(Debug, Clone)]
pub struct SesameResolver {
    env: SdbEnv,
    url: String,
    position_regex: Regex,
    ident_regex: Regex,
}

impl SesameResolver {
    pub fn new(env: SdbEnv, url: &str) -> Result<Self, SdbError> {
        let position_regex = Regex::new(r"(?m)^%J\s+([+-]?\d+(?:\.\d*)?)\s+([+-]?\d+(?:\.\d*)?)")
            .map_err(|e| SdbError::ConfigError(e.to_string()))?;
        let ident_regex = Regex::new(r"(?m)^%I(?:\.0)?\s+(.+?)\s*$")
            .map_err(|e| SdbError::ConfigError(e.to_string()))?;
        Ok(SesameResolver {
            env,
            url: url.trim_end_matches('?').to_string(),
            position_regex,
            ident_regex,
        })
    }

    fn query_url(&self, name: &str) -> String {
        format!("{}?{}", self.url, urlencoding::encode(name.trim()))
    }

    fn query(&self, name: &str) -> Result<String, SdbError> {
        self.env.get_text("sesame", &self.query_url(name), &[])
    }

    pub(crate) fn parse_position(&self, response: &str) -> Option<SkyCoord> {
        let caps = self.position_regex.captures(response)?;
        let ra: f64 = caps.get(1)?.as_str().parse().ok()?;
        let dec: f64 = caps.get(2)?.as_str().parse().ok()?;
        Some(SkyCoord::new(ra, dec))
    }

    pub(crate) fn parse_identifiers(&self, response: &str) -> Vec<String> {
        self.ident_regex
            .captures_iter(response)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().split_whitespace().join(" "))
            .unique()
            .collect()
    }
}

/// Reverse name resolution through the SIMBAD TAP service.
#[derive(Debug, Clone)]
pub struct SimbadTapResolver {
    env: SdbEnv,
    url: String,
}

#[derive(Debug, serde::Deserialize, PartialEq)]
struct SimbadRecord {
    main_id: String,
    dist: f64,
}

impl SimbadTapResolver {
    pub fn new(env: SdbEnv, url: &str) -> Self {
        SimbadTapResolver {
            env,
            url: url.to_string(),
        }
    }

    fn cone_adql(coord: SkyCoord, radius: ArcSec) -> String {
        format!(
            "SELECT TOP 1 main_id, DISTANCE(POINT('ICRS', ra, dec), POINT('ICRS', {ra}, {dec})) AS dist \
             FROM basic \
             WHERE CONTAINS(POINT('ICRS', ra, dec), CIRCLE('ICRS', {ra}, {dec}, {r})) = 1 \
             ORDER BY dist",
            ra = coord.ra_deg,
            dec = coord.dec_deg,
            r = radius / ARCSEC_PER_DEG,
        )
    }
}

fn deserialize_simbad(response: &str) -> Result<Vec<SimbadRecord>, SdbError> {
    let mut reader = csv::Reader::from_reader(response.as_bytes());
    reader
        .deserialize::<SimbadRecord>()
        .map(|r| r.map_err(SdbError::from))
        .collect()
}

/// Sesame for names, SIMBAD TAP for positions.
#[derive(Debug, Clone)]
pub struct CdsNameResolver {
    pub sesame: SesameResolver,
    pub simbad: SimbadTapResolver,
}

impl NameResolver for SesameResolver {
    fn resolve_by_name(&self, name: &str) -> Result<Option<SkyCoord>, SdbError> {
        let response = self.query(name)?;
        Ok(self.parse_position(&response))
    }

    fn resolve_by_position(
        &self,
        _coord: SkyCoord,
        _radius: ArcSec,
    ) -> Result<Option<String>, SdbError> {
        Ok(None)
    }
}

impl IdentifierDirectory for SesameResolver {
    fn alternate_ids(&self, name: &str) -> Result<Vec<String>, SdbError> {
        let response = self.query(name)?;
        Ok(self.parse_identifiers(&response))
    }
}

impl NameResolver for SimbadTapResolver {
    fn resolve_by_name(&self, _name: &str) -> Result<Option<SkyCoord>, SdbError> {
        Ok(None)
    }

    fn resolve_by_position(
        &self,
        coord: SkyCoord,
        radius: ArcSec,
    ) -> Result<Option<String>, SdbError> {
        let query = [
            ("REQUEST", "doQuery".to_string()),
            ("LANG", "ADQL".to_string()),
            ("FORMAT", "csv".to_string()),
            ("QUERY", Self::cone_adql(coord, radius)),
        ];
        let response = self.env.get_text("simbad", &self.url, &query)?;
        Ok(deserialize_simbad(&response)?
            .into_iter()
            .min_by(|a, b| a.dist.total_cmp(&b.dist))
            .map(|r| r.main_id.split_whitespace().join(" ")))
    }
}

impl NameResolver for CdsNameResolver {
    fn resolve_by_name(&self, name: &str) -> Result<Option<SkyCoord>, SdbError> {
        self.sesame.resolve_by_name(name)
    }

    fn resolve_by_position(
        &self,
        coord: SkyCoord,
        radius: ArcSec,
    ) -> Result<Option<String>, SdbError> {
        self.simbad.resolve_by_position(coord, radius)
    }
}

impl IdentifierDirectory for CdsNameResolver {
    fn alternate_ids(&self, name: &str) -> Result<Vec<String>, SdbError> {
        self.sesame.alternate_ids(name)
    }
}

/// Cone searches on VizieR tables.
#[derive(Debug, Clone)]
pub struct VizierConeSearch {
    env: SdbEnv,
    url: String,
    max_rows: usize,
}

impl VizierConeSearch {
    pub fn new(env: SdbEnv, url: &str) -> Self {
        VizierConeSearch {
            env,
            url: url.to_string(),
            max_rows: 20,
        }
    }

    /// ASU parameters of a cone search on one catalogue.
    pub(crate) fn params(
        &self,
        catalogue: &CatalogueSource,
        query: &ConeQuery,
    ) -> Vec<(&'static str, String)> {
        let mut radius = query.radius;
        if query.match_epoch.is_some() && catalogue.proper_motion.is_some() {
            radius += PM_SEARCH_MARGIN;
        }

        let mut params = vec![
            ("-source", catalogue.name.clone()),
            (
                "-c",
                format!("{:.7} {:+.7}", query.center.ra_deg, query.center.dec_deg),
            ),
            ("-c.rs", format!("{radius:.3}")),
        ];
        match catalogue.requested_columns() {
            Some(columns) => params.push(("-out", columns.join(","))),
            None => params.push(("-out.all", "1".to_string())),
        }
        params.push(("-out.max", self.max_rows.to_string()));
        params.push(("-oc.form", "d".to_string()));
        params
    }

    fn search_one(
        &self,
        catalogue: &CatalogueSource,
        query: &ConeQuery,
    ) -> Result<Vec<ConeMatch>, SdbError> {
        let response = self
            .env
            .get_text("vizier", &self.url, &self.params(catalogue, query))?;
        let rows = parse_asu_tsv(&response)?;
        tracing::debug!(catalogue = %catalogue.name, rows = rows.len(), "vizier cone search");
        Ok(rows
            .into_iter()
            .filter_map(|row| row_to_match(catalogue, row, query))
            .collect())
    }
}

/// Rows of an ASU-TSV response: comment lines start with `#`, the header is followed by a unit
/// line and a dash line.
pub(crate) fn parse_asu_tsv(response: &str) -> Result<Vec<Row>, SdbError> {
    let mut lines = response
        .lines()
        .filter(|l| !l.starts_with('#') && !l.trim().is_empty());

    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let header: Vec<String> = header.split('\t').map(|h| h.trim().to_string()).collect();

    let data = lines
        .skip(2)
        .filter(|l| !l.starts_with("--"))
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(data.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = header
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Turn one catalogue row into a cone match, `None` if outside the cone or without position.
pub(crate) fn row_to_match(
    catalogue: &CatalogueSource,
    row: Row,
    query: &ConeQuery,
) -> Option<ConeMatch> {
    let number = |col: &str| row.get(col).and_then(|v| v.parse::<f64>().ok());

    let native = SkyCoord::new(number(&catalogue.ra_column)?, number(&catalogue.dec_column)?);
    let pm = catalogue
        .proper_motion
        .as_ref()
        .map(|cols| ProperMotion {
            pm_ra_cosdec: number(&cols.pm_ra).unwrap_or(0.0),
            pm_dec: number(&cols.pm_dec).unwrap_or(0.0),
        })
        .unwrap_or_default();

    let at_match = match query.match_epoch {
        Some(epoch) => propagate(native, pm, catalogue.reference_epoch, epoch.year()),
        None => native,
    };
    let separation = at_match.separation(&query.center);
    if separation > query.radius {
        return None;
    }

    let positions: BTreeMap<_, _> = query
        .epochs
        .iter()
        .map(|epoch| {
            (
                *epoch,
                propagate(native, pm, catalogue.reference_epoch, epoch.year()),
            )
        })
        .collect();

    Some(ConeMatch {
        catalogue: catalogue.name.clone(),
        separation_arcsec: separation,
        positions,
        fields: row,
    })
}

impl ConeSearchService for VizierConeSearch {
    fn search(
        &self,
        catalogues: &[CatalogueSource],
        query: &ConeQuery,
    ) -> Result<Vec<ConeMatch>, SdbError> {
        search_each(catalogues, |catalogue| self.search_one(catalogue, query))
    }
}
