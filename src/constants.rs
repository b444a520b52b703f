//! # Constants and type definitions for sdbid
//!
//! This module centralizes the **unit conversions**, the **identifier formatting rules**, the
//! **default search radii** and the **table names** used throughout the crate.
//!
//! ## Overview
//!
//! - Unit aliases for angles and epochs
//! - Conversion factors (degrees ↔ arcseconds ↔ milliarcseconds ↔ hours)
//! - Rounding precision of the canonical identifier
//! - Default radii for name resolution and proper-motion searches
//! - Names of the tables owned by the registry, the cross-identifier collector and the ingestor
//!
//! The rounding rules are kept here as named constants so that tests can target them directly.

use std::collections::BTreeMap;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in arcseconds
pub type ArcSec = f64;
/// Angle in milliarcseconds
pub type MilliArcSec = f64;
/// Epoch expressed as a decimal (Julian) year, e.g. `2000.0`
pub type DecimalYear = f64;

/// A datastore row: column name → textual value.
///
/// Rows are deliberately untyped at the storage boundary; typed entities
/// ([`crate::position::PositionRecord`], [`crate::crossid::Xid`]) convert to and from it.
pub type Row = BTreeMap<String, String>;

// -------------------------------------------------------------------------------------------------
// Unit conversions
// -------------------------------------------------------------------------------------------------

/// Arcseconds in one degree
pub const ARCSEC_PER_DEG: f64 = 3600.0;

/// Milliarcseconds in one degree
pub const MAS_PER_DEG: f64 = 3_600_000.0;

/// Degrees of right ascension per hour
pub const DEG_PER_HOUR: f64 = 15.0;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

// -------------------------------------------------------------------------------------------------
// Identifier formatting
// -------------------------------------------------------------------------------------------------

/// Version prefix of every identifier produced by this crate
pub const SDBID_PREFIX: &str = "sdb-v1-";

/// Right ascension seconds are rounded to 1 / `RA_SEC_STEPS` of a second (0.01 s)
pub const RA_SEC_STEPS: f64 = 100.0;

/// Declination arcseconds are rounded to 1 / `DEC_ARCSEC_STEPS` of an arcsecond (0.1″)
pub const DEC_ARCSEC_STEPS: f64 = 10.0;

/// Number of rounded right ascension steps in a full circle (24 h)
pub const RA_STEPS_PER_CIRCLE: i64 = 24 * 3600 * RA_SEC_STEPS as i64;

// -------------------------------------------------------------------------------------------------
// Default search radii
// -------------------------------------------------------------------------------------------------

/// Radius used for reverse name resolution from coordinates
pub const DEFAULT_REVERSE_RADIUS: ArcSec = 2.0;

/// Radius of the combined proper-motion catalogue cone search
pub const DEFAULT_PM_RADIUS: ArcSec = 5.0;

// -------------------------------------------------------------------------------------------------
// Table names
// -------------------------------------------------------------------------------------------------

/// Column carrying the canonical identifier in every target-keyed table
pub const SDBID_COLUMN: &str = "sdbid";

/// Position records, unique on [`SDBID_COLUMN`]
pub const POSITION_TABLE: &str = "sdb_pm";

/// Cross-identifiers (`sdbid`, `xid`)
pub const XID_TABLE: &str = "xids";

/// Column carrying the external identifier in [`XID_TABLE`]
pub const XID_COLUMN: &str = "xid";

/// Completion markers, written once every ingestion step ran for a target
pub const COMPLETE_TABLE: &str = "sdb_complete";

/// Processing leases, unique on [`SDBID_COLUMN`]
pub const LEASE_TABLE: &str = "sdb_lease";

/// Token of the run holding a lease
pub const LEASE_OWNER_COLUMN: &str = "owner";

/// Unix time, in seconds, at which a lease was taken
pub const LEASE_ACQUIRED_COLUMN: &str = "acquired";
