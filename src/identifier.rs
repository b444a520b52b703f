//! # Canonical identifiers
//!
//! A target is keyed by an identifier derived from its epoch-2000.0 position:
//!
//! ```text
//! sdb-v1-183656.34+384701.3
//! └─────┘└───────┘│└───────┘
//!  prefix  HHMMSS.ss  sign DDMMSS.s
//! ```
//!
//! Right ascension seconds are rounded to [`RA_SEC_STEPS`](crate::constants::RA_SEC_STEPS)ths of
//! a second and declination arcseconds to [`DEC_ARCSEC_STEPS`](crate::constants::DEC_ARCSEC_STEPS)ths
//! of an arcsecond. Rounding is done once on integer step counts so that carries (60.00 s, 60.0″)
//! propagate into the minutes and hours/degrees instead of producing out-of-range fields.
//!
//! Derivation is a pure function: the same position always yields the same identifier, which is
//! what makes the identifier usable as the deduplication key across independent runs.
//!
//! The module also hosts the [nom] parsers that recognise coordinate-shaped names, either an
//! identifier produced by this crate or a `J`-style designation such as `2MASS J18365633+3847012`.

use std::{fmt, str::FromStr};

use nom::{
    bytes::complete::{tag, take_while_m_n},
    character::complete::{char, digit1, one_of},
    combinator::{eof, map_res, opt, recognize},
    sequence::preceded,
    IResult, Parser,
};

use crate::{
    constants::{
        ARCSEC_PER_DEG, DEC_ARCSEC_STEPS, DEG_PER_HOUR, RA_SEC_STEPS, RA_STEPS_PER_CIRCLE,
        SDBID_PREFIX,
    },
    conversion::normalize_ra,
    epoch::SkyCoord,
    position::Position,
    sdb_errors::SdbError,
};

/// A canonical, position-derived target identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SdbId(String);

impl SdbId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the (rounded) epoch-2000.0 position carried by the identifier.
    pub fn coord(&self) -> SkyCoord {
        // validated on construction
        parse_sdbid(&self.0)
            .map(|(_, coord)| coord)
            .unwrap_or(SkyCoord::new(f64::NAN, f64::NAN))
    }
}

impl fmt::Display for SdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SdbId {
    type Err = SdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        parse_sdbid(s).map_err(|e| SdbError::InvalidIdentifier(format!("{s}: {e}")))?;
        Ok(SdbId(s.to_string()))
    }
}

impl AsRef<str> for SdbId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Formats epoch-2000.0 positions into identifiers.
#[derive(Debug, Clone)]
pub struct IdentifierDeriver {
    prefix: String,
}

impl Default for IdentifierDeriver {
    fn default() -> Self {
        IdentifierDeriver {
            prefix: SDBID_PREFIX.to_string(),
        }
    }
}

impl IdentifierDeriver {
    /// Create a deriver with a custom version prefix (e.g. `"sdb-v2-"`).
    ///
    /// The prefix must have the shape `sdb-v<digits>-` so that identifiers stay parseable.
    pub fn new(prefix: &str) -> Result<Self, SdbError> {
        let check: IResult<&str, &str> =
            recognize((tag("sdb-v"), digit1, char('-'), eof)).parse(prefix);
        check.map_err(|_| SdbError::ConfigError(format!("invalid identifier prefix: {prefix}")))?;
        Ok(IdentifierDeriver {
            prefix: prefix.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the identifier of an epoch-2000.0 position.
    pub fn derive(&self, position: &Position) -> SdbId {
        self.derive_coord(position.coord())
    }

    /// Derive the identifier of a bare coordinate pair.
    ///
    /// Arguments
    /// ---------
    /// * `coord`: position at epoch 2000.0, in degrees
    ///
    /// Return
    /// ------
    /// * The identifier `<prefix>HHMMSS.ss±DDMMSS.s`
    pub fn derive_coord(&self, coord: SkyCoord) -> SdbId {
        let ra_steps = (normalize_ra(coord.ra_deg) * ARCSEC_PER_DEG / DEG_PER_HOUR * RA_SEC_STEPS)
            .round() as i64
            % RA_STEPS_PER_CIRCLE;
        let steps_per_sec = RA_SEC_STEPS as i64;
        let ra_sec = ra_steps / steps_per_sec;
        let ra_frac = ra_steps % steps_per_sec;
        let (hh, mm, ss) = (ra_sec / 3600, ra_sec % 3600 / 60, ra_sec % 60);

        let dec_steps = (coord.dec_deg.abs() * ARCSEC_PER_DEG * DEC_ARCSEC_STEPS).round() as i64;
        let steps_per_arcsec = DEC_ARCSEC_STEPS as i64;
        let dec_sec = dec_steps / steps_per_arcsec;
        let dec_frac = dec_steps % steps_per_arcsec;
        let (dd, dm, ds) = (dec_sec / 3600, dec_sec % 3600 / 60, dec_sec % 60);
        let sign = if coord.dec_deg < 0.0 && dec_steps > 0 {
            '-'
        } else {
            '+'
        };

        SdbId(format!(
            "{}{hh:02}{mm:02}{ss:02}.{ra_frac:02}{sign}{dd:02}{dm:02}{ds:02}.{dec_frac}",
            self.prefix
        ))
    }
}

fn two_digits(input: &str) -> IResult<&str, u32> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_digit()),
        |s: &str| s.parse::<u32>(),
    )
    .parse(input)
}

/// Seconds field with exactly `n` decimals.
fn fixed_seconds<'a>(n: usize) -> impl FnMut(&'a str) -> IResult<&'a str, f64> {
    move |input: &'a str| {
        map_res(
            recognize((
                two_digits,
                char('.'),
                take_while_m_n(n, n, |c: char| c.is_ascii_digit()),
            )),
            |s: &str| s.parse::<f64>(),
        )
        .parse(input)
    }
}

/// Seconds field with any number of decimals, or none.
fn free_seconds(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize((two_digits, opt(preceded(char('.'), digit1)))),
        |s: &str| s.parse::<f64>(),
    )
    .parse(input)
}

fn sign(input: &str) -> IResult<&str, f64> {
    one_of("+-")
        .map(|c| if c == '-' { -1.0 } else { 1.0 })
        .parse(input)
}

fn to_coord(ra: (u32, u32, f64), sign: f64, dec: (u32, u32, f64)) -> Option<SkyCoord> {
    let (h, m, s) = ra;
    let (d, dm, ds) = dec;
    if h >= 24 || m >= 60 || s >= 60.0 || dm >= 60 || ds >= 60.0 || d > 90 {
        return None;
    }
    let ra_deg = (h as f64 + m as f64 / 60.0 + s / 3600.0) * DEG_PER_HOUR;
    let dec_deg = sign * (d as f64 + dm as f64 / 60.0 + ds / 3600.0);
    if dec_deg.abs() > 90.0 {
        return None;
    }
    Some(SkyCoord::new(ra_deg, dec_deg))
}

/// Parse a full identifier: `sdb-v<n>-HHMMSS.ss±DDMMSS.s`.
fn parse_sdbid(input: &str) -> IResult<&str, SkyCoord> {
    let (rest, (_, _, _, h, m, s, sg, d, dm, ds, _)) = (
        tag("sdb-v"),
        digit1,
        char('-'),
        two_digits,
        two_digits,
        fixed_seconds(2),
        sign,
        two_digits,
        two_digits,
        fixed_seconds(1),
        eof,
    )
        .parse(input)?;

    match to_coord((h, m, s), sg, (d, dm, ds)) {
        Some(coord) => Ok((rest, coord)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

/// Parse the trailing `HHMMSS[.s…]±DDMMSS[.s…]` part of a designation.
fn coordinate_body(input: &str) -> IResult<&str, SkyCoord> {
    let (rest, (h, m, s, sg, d, dm, ds, _)) = (
        two_digits,
        two_digits,
        free_seconds,
        sign,
        two_digits,
        two_digits,
        free_seconds,
        eof,
    )
        .parse(input)?;

    match to_coord((h, m, s), sg, (d, dm, ds)) {
        Some(coord) => Ok((rest, coord)),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

/// Decode a name that is itself expressed as coordinates.
///
/// Accepts identifiers produced by this crate (`sdb-v1-183656.34+384701.3`) and `J`-style
/// designations whose suffix is `HHMMSS[.ss]±DDMMSS[.s]`, optionally preceded by a catalogue
/// label (`2MASS J18365633+3847012` is *not* accepted as its seconds are packed without a
/// decimal point, `WISEA J183656.33+384701.2` is).
///
/// Return
/// ------
/// * `Some(coord)` when the name is coordinate-shaped, `None` otherwise
pub fn parse_coordinate_name(name: &str) -> Option<SkyCoord> {
    let name = name.trim();
    if let Ok((_, coord)) = parse_sdbid(name) {
        return Some(coord);
    }

    let j_pos = name.rfind('J')?;
    let body = &name[j_pos + 1..];
    let label = &name[..j_pos];
    if !label.is_empty() && !label.ends_with(' ') {
        return None;
    }
    coordinate_body(body).ok().map(|(_, coord)| coord)
}

/// Whether a name is coordinate-shaped (see [`parse_coordinate_name`]).
pub fn is_coordinate_name(name: &str) -> bool {
    parse_coordinate_name(name).is_some()
}

#[cfg(test)]
mod identifier_test {
    use super::*;
    use approx::assert_relative_eq;
    use regex::Regex;

    fn derive(ra: f64, dec: f64) -> String {
        IdentifierDeriver::default()
            .derive_coord(SkyCoord::new(ra, dec))
            .to_string()
    }

    #[test]
    fn test_derive_vega() {
        assert_eq!(derive(279.234735, 38.783689), "sdb-v1-183656.34+384701.3");
    }

    #[test]
    fn test_derive_matches_pattern() {
        let pattern = Regex::new(r"^sdb-v1-\d{6,8}\.\d{2}[+-]\d{6,7}\.\d$").unwrap();
        for (ra, dec) in [
            (279.234735, 38.783689),
            (10.0, -20.0),
            (0.0, 0.0),
            (359.99999, -89.99999),
            (123.456789, 89.9),
        ] {
            let id = derive(ra, dec);
            assert!(pattern.is_match(&id), "{id} does not match");
        }
    }

    #[test]
    fn test_derive_deterministic() {
        let deriver = IdentifierDeriver::default();
        let coord = SkyCoord::new(201.298247, -43.019112);
        assert_eq!(deriver.derive_coord(coord), deriver.derive_coord(coord));
    }

    #[test]
    fn test_derive_negative_and_zero_dec() {
        assert_eq!(derive(10.0, -20.0), "sdb-v1-004000.00-200000.0");
        assert_eq!(derive(0.0, 0.0), "sdb-v1-000000.00+000000.0");
        // rounds to zero: no negative zero in identifiers
        assert_eq!(derive(0.0, -0.00001), "sdb-v1-000000.00+000000.0");
        assert_eq!(derive(0.0, -0.0001), "sdb-v1-000000.00-000000.4");
    }

    #[test]
    fn test_derive_carries() {
        // 59.995 s of RA rounds up into the next minute
        let ra = (59.0 / 60.0 + 59.996 / 3600.0) * 15.0;
        assert_eq!(derive(ra, 0.0), "sdb-v1-010000.00+000000.0");
        // the last hundredth of a second before 24h wraps to 0h
        assert_eq!(derive(359.99999, 0.0), "sdb-v1-000000.00+000000.0");
        // 59.96″ of Dec rounds up into the next minute
        let dec = -(10.0 + 59.0 / 60.0 + 59.96 / 3600.0);
        assert_eq!(derive(0.0, dec), "sdb-v1-000000.00-110000.0");
    }

    #[test]
    fn test_rounding_boundary() {
        let deriver = IdentifierDeriver::default();
        // 1 RA step is 0.01 s = 0.15″ = 1/24000 deg; pick a position in the middle of a step
        let base = SkyCoord::new(150.0 + 0.3 / 24000.0, 30.0 + 0.03 / 3600.0);
        let id = deriver.derive_coord(base);

        let tiny_ra = SkyCoord::new(base.ra_deg + 0.1 / 24000.0, base.dec_deg);
        let tiny_dec = SkyCoord::new(base.ra_deg, base.dec_deg + 0.01 / 3600.0);
        assert_eq!(deriver.derive_coord(tiny_ra), id);
        assert_eq!(deriver.derive_coord(tiny_dec), id);

        let big_ra = SkyCoord::new(base.ra_deg + 1.5 / 24000.0, base.dec_deg);
        let big_dec = SkyCoord::new(base.ra_deg, base.dec_deg + 0.15 / 3600.0);
        assert_ne!(deriver.derive_coord(big_ra), id);
        assert_ne!(deriver.derive_coord(big_dec), id);
    }

    #[test]
    fn test_custom_prefix() {
        let deriver = IdentifierDeriver::new("sdb-v2-").unwrap();
        let id = deriver.derive_coord(SkyCoord::new(10.0, -20.0));
        assert_eq!(id.as_str(), "sdb-v2-004000.00-200000.0");
        assert!(IdentifierDeriver::new("foo").is_err());
        assert!(IdentifierDeriver::new("sdb-v1").is_err());
    }

    #[test]
    fn test_sdbid_from_str() {
        let id: SdbId = "sdb-v1-183656.34+384701.3".parse().unwrap();
        let coord = id.coord();
        assert_relative_eq!(coord.ra_deg, 279.23475, epsilon = 1e-9);
        assert_relative_eq!(coord.dec_deg, 38.78369444444444, epsilon = 1e-9);

        assert!("sdb-v1-183656.3+384701.3".parse::<SdbId>().is_err());
        assert!("sdb-v1-183656.34+384701.34".parse::<SdbId>().is_err());
        assert!("sdb-v1-246000.00+000000.0".parse::<SdbId>().is_err());
        assert!("Vega".parse::<SdbId>().is_err());
    }

    #[test]
    fn test_derive_then_parse_is_stable() {
        let deriver = IdentifierDeriver::default();
        let id = deriver.derive_coord(SkyCoord::new(10.0, -20.0));
        let again = deriver.derive_coord(id.coord());
        assert_eq!(id, again);
    }

    #[test]
    fn test_coordinate_names() {
        assert!(is_coordinate_name("sdb-v1-183656.34+384701.3"));
        assert!(is_coordinate_name("WISEA J183656.33+384701.2"));
        assert!(is_coordinate_name("J004000.00-200000.0"));
        assert!(!is_coordinate_name("Vega"));
        assert!(!is_coordinate_name("HD 172167"));
        assert!(!is_coordinate_name("2MASS J18365633+3847012"));
        assert!(!is_coordinate_name("FooJ183656.33+384701.2"));

        let coord = parse_coordinate_name("J004000.00-200000.0").unwrap();
        assert_relative_eq!(coord.ra_deg, 10.0, epsilon = 1e-12);
        assert_relative_eq!(coord.dec_deg, -20.0, epsilon = 1e-12);
    }
}
