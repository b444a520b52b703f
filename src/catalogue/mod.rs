//! # Catalogues
//!
//! A [`CatalogueSpec`] describes one photometric or astrometric catalogue the targets are matched
//! against: the table it is written to, the epoch its positions are valid at, how to search it
//! and which of its columns to keep. One ingestion loop ([`ingestor::CatalogueIngestor`]) runs
//! over a list of specs, there is no per-catalogue code.
//!
//! - [`defaults`]: the default photometric list (ordered by wavelength), the proper-motion
//!   catalogues used to seed positions
//! - [`ingestor`]: the match-and-write loop

pub mod defaults;
pub mod ingestor;

use crate::{
    constants::{ArcSec, Degree, Row},
    epoch::{Epoch, SkyCoord},
    services::{CatalogueSource, Ellipse, EllipseCandidate, EllipseParams},
};

/// Column names of an error ellipse in a mirrored table.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipseColumns {
    pub ra: String,
    pub dec: String,
    pub major: String,
    pub minor: String,
    pub position_angle: String,
}

impl EllipseColumns {
    /// Column layout of the IRAS mirrors.
    pub fn iras() -> Self {
        EllipseColumns {
            ra: "ra".to_string(),
            dec: "dec".to_string(),
            major: "major".to_string(),
            minor: "minor".to_string(),
            position_angle: "posang".to_string(),
        }
    }

    /// Read a match candidate from a mirrored row, `None` if a column is missing or not a number.
    /// A missing position angle counts as 0.
    pub fn candidate(&self, row: Row) -> Option<EllipseCandidate> {
        let number = |col: &str| row.get(col).and_then(|v| v.trim().parse::<f64>().ok());
        let coord = SkyCoord::new(number(&self.ra)?, number(&self.dec)?);
        let ellipse = Ellipse {
            semi_major: number(&self.major)?,
            semi_minor: number(&self.minor)?,
            position_angle: number(&self.position_angle).unwrap_or(0.0),
        };
        Some(EllipseCandidate {
            coord,
            ellipse,
            row,
        })
    }
}

/// How a catalogue is searched.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchMode {
    /// Remote cone search, closest entry within `radius`
    Cone {
        source: CatalogueSource,
        radius: ArcSec,
    },
    /// Locally mirrored table: box pre-filter then best ellipse match
    LocalEllipse {
        table: String,
        columns: EllipseColumns,
        box_half_width: Degree,
        params: EllipseParams,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueSpec {
    /// Datastore table the matches are written to
    pub table: String,
    /// Human readable name
    pub label: String,
    /// Epoch of the target position the catalogue is searched with
    pub epoch: Epoch,
    /// Characteristic wavelength, microns
    pub wavelength_um: f64,
    pub mode: SearchMode,
    /// Catalogue columns written with a match; empty keeps every column
    pub fields: Vec<String>,
}

impl CatalogueSpec {
    /// A catalogue searched by cone.
    pub fn cone(
        table: &str,
        label: &str,
        epoch: Epoch,
        wavelength_um: f64,
        source: CatalogueSource,
        radius: ArcSec,
    ) -> Self {
        CatalogueSpec {
            table: table.to_string(),
            label: label.to_string(),
            epoch,
            wavelength_um,
            mode: SearchMode::Cone { source, radius },
            fields: Vec::new(),
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Keep the configured columns of a matched row.
    pub fn project(&self, row: &Row) -> Row {
        if self.fields.is_empty() {
            return row.clone();
        }
        self.fields
            .iter()
            .filter_map(|f| row.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }
}

/// Sort catalogues by increasing wavelength, the processing order.
pub fn sort_by_wavelength(specs: &mut [CatalogueSpec]) {
    specs.sort_by(|a, b| a.wavelength_um.total_cmp(&b.wavelength_um));
}

#[cfg(test)]
mod catalogue_test {
    use super::*;

    #[test]
    fn test_project() {
        let source = CatalogueSource::new("II/246/out", "RAJ2000", "DEJ2000", 1999.3);
        let spec = CatalogueSpec::cone("tmass", "2MASS", Epoch::J1999_3, 1.25, source.clone(), 2.0)
            .with_fields(&["Jmag", "Kmag"]);
        let row = Row::from([
            ("Jmag".to_string(), "5.1".to_string()),
            ("Hmag".to_string(), "4.9".to_string()),
        ]);
        assert_eq!(spec.project(&row), Row::from([("Jmag".to_string(), "5.1".to_string())]));

        let all = CatalogueSpec::cone("tmass", "2MASS", Epoch::J1999_3, 1.25, source, 2.0);
        assert_eq!(all.project(&row), row);
    }
}
