//! # Positions and position records
//!
//! [`Position`] is the resolved, canonical epoch-2000.0 position of a target, along with where it
//! came from. [`PositionRecord`] is the persisted entity: the identifier and the position at
//! each of the six epochs, stored as one row of the position table.
//!
//! Column layout of a position record row:
//!
//! ```text
//! sdbid | raj2000 | dej2000 | ra_2010_3 | de_2010_3 | ... | ra_1983_5 | de_1983_5 | pm_source
//! ```

use std::fmt;

use crate::{
    constants::{ArcSec, DecimalYear, Degree, Row, SDBID_COLUMN},
    epoch::{Epoch, EpochPositions, SkyCoord},
    identifier::SdbId,
    sdb_errors::SdbError,
};

/// Where the canonical position of a target comes from.
///
/// Ordered from most to least trusted when several sources are available.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SourcePriority {
    /// Closest entry of the proper-motion catalogue at this index of the priority list
    ProperMotionCatalogue { rank: usize, catalogue: String },
    /// Position returned by forward name resolution
    NameResolver,
    /// Coordinates supplied by the caller
    UserCoordinates,
    /// Coordinates decoded from a coordinate-shaped name
    CoordinateName,
}

impl fmt::Display for SourcePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePriority::ProperMotionCatalogue { catalogue, .. } => write!(f, "{catalogue}"),
            SourcePriority::NameResolver => write!(f, "name_resolver"),
            SourcePriority::UserCoordinates => write!(f, "user_coordinates"),
            SourcePriority::CoordinateName => write!(f, "coordinate_name"),
        }
    }
}

/// A best-known position of a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ra_deg: Degree,
    pub dec_deg: Degree,
    pub epoch: DecimalYear,
    pub search_radius_arcsec: ArcSec,
    pub source_priority: SourcePriority,
}

impl Position {
    pub fn coord(&self) -> SkyCoord {
        SkyCoord::new(self.ra_deg, self.dec_deg)
    }
}

/// The persisted position of a target at the six fixed epochs.
///
/// Created once when the identifier is claimed and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub sdbid: SdbId,
    pub positions: EpochPositions,
    /// Proper-motion catalogue the epoch positions were taken from, `None` if replicated
    pub pm_source: Option<String>,
}

impl PositionRecord {
    pub fn new(sdbid: SdbId, positions: EpochPositions, pm_source: Option<String>) -> Self {
        PositionRecord {
            sdbid,
            positions,
            pm_source,
        }
    }

    pub fn ra_deg0(&self) -> Degree {
        self.positions.canonical().ra_deg
    }

    pub fn de_deg0(&self) -> Degree {
        self.positions.canonical().dec_deg
    }

    /// Position at a given epoch.
    pub fn at(&self, epoch: Epoch) -> SkyCoord {
        self.positions.at(epoch)
    }

    pub(crate) fn ra_column(epoch: Epoch) -> String {
        match epoch {
            Epoch::J2000 => "raj2000".to_string(),
            other => format!("ra_{}", other.column_suffix()),
        }
    }

    pub(crate) fn de_column(epoch: Epoch) -> String {
        match epoch {
            Epoch::J2000 => "dej2000".to_string(),
            other => format!("de_{}", other.column_suffix()),
        }
    }

    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(SDBID_COLUMN.to_string(), self.sdbid.to_string());
        for (epoch, coord) in self.positions.iter() {
            row.insert(Self::ra_column(epoch), coord.ra_deg.to_string());
            row.insert(Self::de_column(epoch), coord.dec_deg.to_string());
        }
        row.insert(
            "pm_source".to_string(),
            self.pm_source.clone().unwrap_or_default(),
        );
        row
    }

    pub fn from_row(row: &Row) -> Result<Self, SdbError> {
        let field = |name: &str| -> Result<f64, SdbError> {
            row.get(name)
                .and_then(|v| v.parse::<f64>().ok())
                .ok_or_else(|| {
                    SdbError::DatastoreError(format!("position record: bad or missing column {name}"))
                })
        };

        let sdbid = row
            .get(SDBID_COLUMN)
            .ok_or_else(|| SdbError::DatastoreError("position record without sdbid".into()))?
            .parse::<SdbId>()?;

        let mut coords = Vec::with_capacity(Epoch::ALL.len());
        for epoch in Epoch::ALL {
            coords.push(SkyCoord::new(
                field(&Self::ra_column(epoch))?,
                field(&Self::de_column(epoch))?,
            ));
        }
        let positions = EpochPositions::from_fn(|epoch| coords[epoch.index()]);

        let pm_source = row
            .get("pm_source")
            .filter(|s| !s.is_empty())
            .cloned();

        Ok(PositionRecord {
            sdbid,
            positions,
            pm_source,
        })
    }
}

#[cfg(test)]
mod position_test {
    use super::*;
    use crate::identifier::IdentifierDeriver;

    #[test]
    fn test_record_row_columns() {
        let coord = SkyCoord::new(10.0, -20.0);
        let id = IdentifierDeriver::default().derive_coord(coord);
        let record = PositionRecord::new(id, EpochPositions::replicated(coord), None);

        let row = record.to_row();
        assert_eq!(row.len(), 1 + 12 + 1);
        assert_eq!(row["sdbid"], "sdb-v1-004000.00-200000.0");
        assert_eq!(row["raj2000"], "10");
        assert_eq!(row["de_1983_5"], "-20");
        assert_eq!(row["pm_source"], "");
    }

    #[test]
    fn test_record_from_row() {
        let coord = SkyCoord::new(279.234735, 38.783689);
        let id = IdentifierDeriver::default().derive_coord(coord);
        let record = PositionRecord::new(
            id,
            EpochPositions::replicated(coord),
            Some("I/311/hip2".into()),
        );
        let back = PositionRecord::from_row(&record.to_row()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_record_from_incomplete_row() {
        let mut row = Row::new();
        row.insert("sdbid".into(), "sdb-v1-004000.00-200000.0".into());
        row.insert("raj2000".into(), "10".into());
        assert!(matches!(
            PositionRecord::from_row(&row),
            Err(SdbError::DatastoreError(_))
        ));
    }
}
