//! # Reference epochs and linear propagation
//!
//! Every target carries its position at six fixed epochs: the canonical epoch 2000.0 and the
//! characteristic epoch of each family of catalogues that is matched against it.
//!
//! | variant      | year     | catalogues observed around this date |
//! |--------------|----------|--------------------------------------|
//! | `J2000`      | 2000.0   | canonical identifier, APASS, DENIS, SEIP |
//! | `J2010_3`    | 2010.3   | AllWISE |
//! | `J2007_0`    | 2007.0   | AKARI IRC / FIS |
//! | `J1999_3`    | 1999.3   | 2MASS |
//! | `J1991_25`   | 1991.25  | Hipparcos, Tycho-2 |
//! | `J1983_5`    | 1983.5   | IRAS |
//!
//! Propagation is linear in (α, δ): the proper motion in right ascension is given as
//! `μα·cosδ` and converted back with the declination of the reference position.

use std::fmt;

use crate::{
    constants::{Degree, DecimalYear, MilliArcSec, MAS_PER_DEG, RADEG},
    conversion::normalize_ra,
};

/// One of the six fixed epochs a position is tabulated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Epoch {
    J2000,
    J2010_3,
    J2007_0,
    J1999_3,
    J1991_25,
    J1983_5,
}

impl Epoch {
    /// All epochs, canonical first then in the column order of a position record.
    pub const ALL: [Epoch; 6] = [
        Epoch::J2000,
        Epoch::J2010_3,
        Epoch::J2007_0,
        Epoch::J1999_3,
        Epoch::J1991_25,
        Epoch::J1983_5,
    ];

    /// The five non canonical epochs.
    pub const PROPAGATED: [Epoch; 5] = [
        Epoch::J2010_3,
        Epoch::J2007_0,
        Epoch::J1999_3,
        Epoch::J1991_25,
        Epoch::J1983_5,
    ];

    pub fn year(&self) -> DecimalYear {
        match self {
            Epoch::J2000 => 2000.0,
            Epoch::J2010_3 => 2010.3,
            Epoch::J2007_0 => 2007.0,
            Epoch::J1999_3 => 1999.3,
            Epoch::J1991_25 => 1991.25,
            Epoch::J1983_5 => 1983.5,
        }
    }

    /// Column suffix used in the position table, e.g. `"2010_3"`.
    pub fn column_suffix(&self) -> &'static str {
        match self {
            Epoch::J2000 => "2000",
            Epoch::J2010_3 => "2010_3",
            Epoch::J2007_0 => "2007_0",
            Epoch::J1999_3 => "1999_3",
            Epoch::J1991_25 => "1991_25",
            Epoch::J1983_5 => "1983_5",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Epoch::J2000 => 0,
            Epoch::J2010_3 => 1,
            Epoch::J2007_0 => 2,
            Epoch::J1999_3 => 3,
            Epoch::J1991_25 => 4,
            Epoch::J1983_5 => 5,
        }
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "J{}", self.year())
    }
}

/// A position on the sky, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    pub ra_deg: Degree,
    pub dec_deg: Degree,
}

impl SkyCoord {
    pub fn new(ra_deg: Degree, dec_deg: Degree) -> Self {
        SkyCoord { ra_deg, dec_deg }
    }

    /// Separation to another position, in arcseconds.
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        crate::conversion::angular_separation(
            self.ra_deg,
            self.dec_deg,
            other.ra_deg,
            other.dec_deg,
        )
    }
}

/// Proper motion in milliarcseconds per year.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProperMotion {
    /// μα·cosδ
    pub pm_ra_cosdec: MilliArcSec,
    /// μδ
    pub pm_dec: MilliArcSec,
}

/// Linearly propagate `coord`, valid at `from`, to the year `to`.
///
/// Arguments
/// ---------
/// * `coord`: the position at the reference epoch
/// * `pm`: the proper motion, `μα·cosδ` and `μδ` in mas/yr
/// * `from`: reference epoch of `coord` (decimal year)
/// * `to`: target epoch (decimal year)
///
/// Return
/// ------
/// * The position at `to`; right ascension wrapped into `[0, 360)`, declination clamped to the poles
pub fn propagate(coord: SkyCoord, pm: ProperMotion, from: DecimalYear, to: DecimalYear) -> SkyCoord {
    let dt = to - from;
    let cos_dec = (coord.dec_deg * RADEG).cos();

    let dec = coord.dec_deg + pm.pm_dec * dt / MAS_PER_DEG;
    let ra = if cos_dec.abs() < f64::EPSILON {
        coord.ra_deg
    } else {
        coord.ra_deg + pm.pm_ra_cosdec * dt / MAS_PER_DEG / cos_dec
    };

    SkyCoord {
        ra_deg: normalize_ra(ra),
        dec_deg: dec.clamp(-90.0, 90.0),
    }
}

/// Position of one source at each of the six epochs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochPositions([SkyCoord; 6]);

impl EpochPositions {
    /// Zero proper motion: the same position at every epoch.
    pub fn replicated(coord: SkyCoord) -> Self {
        EpochPositions([coord; 6])
    }

    /// Propagate a catalogued position to every epoch.
    pub fn propagated(coord: SkyCoord, pm: ProperMotion, reference: DecimalYear) -> Self {
        EpochPositions(Epoch::ALL.map(|epoch| propagate(coord, pm, reference, epoch.year())))
    }

    pub fn from_fn(mut f: impl FnMut(Epoch) -> SkyCoord) -> Self {
        EpochPositions(Epoch::ALL.map(&mut f))
    }

    pub fn at(&self, epoch: Epoch) -> SkyCoord {
        self.0[epoch.index()]
    }

    pub fn canonical(&self) -> SkyCoord {
        self.at(Epoch::J2000)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Epoch, SkyCoord)> + '_ {
        Epoch::ALL.iter().map(move |epoch| (*epoch, self.at(*epoch)))
    }
}
