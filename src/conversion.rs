use crate::{
    constants::{ArcSec, Degree, ARCSEC_PER_DEG, DEG_PER_HOUR, RADEG},
    sdb_errors::SdbError,
};

/// Parse a right ascension string to degrees
///
/// Arguments
/// ---------
/// * `ra`: a string representing the right ascension in the format `HH MM SS.SS`
///   (colons are accepted as separators too)
///
/// Returns
/// -------
/// * `Option<Degree>`: the right ascension in degrees, `None` if the input format is invalid.
pub(crate) fn parse_ra_to_deg(ra: &str) -> Option<Degree> {
    let parts: Vec<&str> = ra.split([' ', ':']).filter(|p| !p.is_empty()).collect();
    if parts.len() != 3 {
        return None;
    }

    let h: f64 = parts[0].parse().ok()?;
    let m: f64 = parts[1].parse().ok()?;
    let s: f64 = parts[2].parse().ok()?;

    Some((h + m / 60.0 + s / 3600.0) * DEG_PER_HOUR)
}

/// Parse a declination string to degrees
///
/// Arguments
/// ---------
/// * `dec`: a string representing the declination in the format `±DD MM SS.SS`
///
/// Returns
/// -------
/// * `Option<Degree>`: the declination in degrees, `None` if the input format is invalid.
pub(crate) fn parse_dec_to_deg(dec: &str) -> Option<Degree> {
    let parts: Vec<&str> = dec.split([' ', ':']).filter(|p| !p.is_empty()).collect();
    if parts.len() != 3 {
        return None;
    }

    let sign = if parts[0].starts_with('-') { -1.0 } else { 1.0 };
    let d: f64 = parts[0].trim_start_matches(&['-', '+'][..]).parse().ok()?;
    let m: f64 = parts[1].parse().ok()?;
    let s: f64 = parts[2].parse().ok()?;

    Some(sign * (d + m / 60.0 + s / 3600.0))
}

/// Parse a coordinate given either in decimal degrees or in sexagesimal form.
///
/// `is_ra` selects the sexagesimal interpretation (hours for right ascension, degrees for
/// declination). Decimal input is always degrees.
pub fn parse_coordinate(field: &str, is_ra: bool) -> Option<Degree> {
    let field = field.trim();
    if let Ok(value) = field.parse::<f64>() {
        return Some(value);
    }
    if is_ra {
        parse_ra_to_deg(field)
    } else {
        parse_dec_to_deg(field)
    }
}

/// Reject coordinates outside `[0, 360)` × `[-90, 90]` or non finite values.
pub fn validate_coordinates(ra: Degree, dec: Degree) -> Result<(), SdbError> {
    if !ra.is_finite() || !dec.is_finite() || !(0.0..360.0).contains(&ra) || dec.abs() > 90.0 {
        return Err(SdbError::InvalidCoordinates { ra, dec });
    }
    Ok(())
}

/// Wrap a right ascension into `[0, 360)`.
pub fn normalize_ra(ra: Degree) -> Degree {
    let wrapped = ra.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Great-circle separation between two positions, in arcseconds (haversine formula).
pub fn angular_separation(ra1: Degree, dec1: Degree, ra2: Degree, dec2: Degree) -> ArcSec {
    let (d1, d2) = (dec1 * RADEG, dec2 * RADEG);
    let half_ddec = (d2 - d1) / 2.0;
    let half_dra = (ra2 - ra1) * RADEG / 2.0;

    let h = half_ddec.sin().powi(2) + d1.cos() * d2.cos() * half_dra.sin().powi(2);
    2.0 * h.sqrt().min(1.0).asin() / RADEG * ARCSEC_PER_DEG
}

/// Tangent-plane offsets of `(ra, dec)` relative to `(ra0, dec0)`, in arcseconds.
///
/// Return
/// ------
/// * `(east, north)`: east offset (Δα·cosδ, with wrap-around at 0/360) and north offset (Δδ)
pub fn offset_east_north(ra0: Degree, dec0: Degree, ra: Degree, dec: Degree) -> (ArcSec, ArcSec) {
    let mut dra = ra - ra0;
    if dra > 180.0 {
        dra -= 360.0;
    } else if dra < -180.0 {
        dra += 360.0;
    }
    let mean_dec = (dec0 + dec) / 2.0 * RADEG;
    (
        dra * mean_dec.cos() * ARCSEC_PER_DEG,
        (dec - dec0) * ARCSEC_PER_DEG,
    )
}
