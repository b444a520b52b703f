//! Positional matching against error ellipses.
//!
//! The offset of the target from a candidate is projected on the candidate's ellipse axes:
//!
//! ```text
//! u = east·sin(PA) + north·cos(PA)     (along the major axis)
//! v = east·cos(PA) − north·sin(PA)     (along the minor axis)
//! d = sqrt((u / a)² + (v / b)²)
//! ```
//!
//! `d <= 1` means the target lies inside the ellipse. The best candidate is the one with the
//! smallest `d`; equal distances are broken by the smaller angular separation.

use std::cmp::Ordering;

use crate::{
    conversion::offset_east_north,
    epoch::SkyCoord,
    sdb_errors::SdbError,
};

use super::{Ellipse, EllipseCandidate, EllipseMatch, EllipseMatchService, EllipseParams};

/// Normalized distance of `position` from the center of `candidate`'s ellipse.
pub fn normalized_distance(position: SkyCoord, center: SkyCoord, ellipse: &Ellipse) -> f64 {
    let (east, north) = offset_east_north(
        center.ra_deg,
        center.dec_deg,
        position.ra_deg,
        position.dec_deg,
    );
    let pa = ellipse.position_angle.to_radians();
    let u = east * pa.sin() + north * pa.cos();
    let v = east * pa.cos() - north * pa.sin();

    let a = ellipse.semi_major.max(f64::MIN_POSITIVE);
    let b = ellipse.semi_minor.max(f64::MIN_POSITIVE);
    ((u / a).powi(2) + (v / b).powi(2)).sqrt()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedEllipseMatcher;

impl EllipseMatchService for NormalizedEllipseMatcher {
    fn match_best(
        &self,
        position: SkyCoord,
        params: &EllipseParams,
        candidates: Vec<EllipseCandidate>,
    ) -> Result<Option<EllipseMatch>, SdbError> {
        let best = candidates
            .into_iter()
            .map(|candidate| {
                let normalized = normalized_distance(position, candidate.coord, &candidate.ellipse);
                let separation = position.separation(&candidate.coord);
                EllipseMatch {
                    candidate,
                    normalized_distance: normalized,
                    separation_arcsec: separation,
                }
            })
            .filter(|m| m.normalized_distance <= params.max_normalized)
            .min_by(|a, b| {
                match a.normalized_distance.total_cmp(&b.normalized_distance) {
                    Ordering::Equal => a.separation_arcsec.total_cmp(&b.separation_arcsec),
                    other => other,
                }
            });
        Ok(best)
    }
}
