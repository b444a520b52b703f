use thiserror::Error;

use crate::identifier::SdbId;

#[derive(Error, Debug)]
pub enum SdbError {
    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    #[error("Invalid coordinates: ra = {ra}, dec = {dec}")]
    InvalidCoordinates { ra: f64, dec: f64 },

    #[error("Unable to resolve target: {0}")]
    ResolutionFailure(String),

    #[error("External identifier {external_id} is already bound to {bound_to}, refusing to bind it to {requested_by}")]
    IdentifierConflict {
        external_id: String,
        bound_to: SdbId,
        requested_by: SdbId,
    },

    #[error("Identifier {0} is already used by a different position")]
    IdentifierCollision(SdbId),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Service failure ({service}): {reason}")]
    ServiceFailure { service: String, reason: String },

    #[error("Timeout while calling {0}")]
    Timeout(String),

    #[error("HTTP ureq error: {0}")]
    UreqHttpError(#[from] ureq::Error),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Datastore error: {0}")]
    DatastoreError(String),

    #[error("Error during the nom parsing: {0}")]
    NomParsingError(String),
}

impl From<serde_yaml::Error> for SdbError {
    fn from(err: serde_yaml::Error) -> Self {
        SdbError::ConfigError(err.to_string())
    }
}

impl SdbError {
    /// Whether the failure is worth retrying at the collaborator boundary.
    ///
    /// Timeouts, I/O failures and HTTP errors that are not a definitive client-side
    /// answer (connection issues, 5xx, 429) are transient; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            SdbError::Timeout(_) | SdbError::IoError(_) => true,
            SdbError::ServiceFailure { .. } => true,
            SdbError::UreqHttpError(err) => match err {
                ureq::Error::StatusCode(code) => *code >= 500 || *code == 429,
                ureq::Error::Timeout(_)
                | ureq::Error::Io(_)
                | ureq::Error::HostNotFound
                | ureq::Error::ConnectionFailed => true,
                _ => false,
            },
            _ => false,
        }
    }
}

impl PartialEq for SdbError {
    fn eq(&self, other: &Self) -> bool {
        use SdbError::*;
        match (self, other) {
            (InvalidInvocation(a), InvalidInvocation(b)) => a == b,
            (
                InvalidCoordinates { ra: ra1, dec: dec1 },
                InvalidCoordinates { ra: ra2, dec: dec2 },
            ) => ra1 == ra2 && dec1 == dec2,
            (ResolutionFailure(a), ResolutionFailure(b)) => a == b,
            (
                IdentifierConflict {
                    external_id: e1,
                    bound_to: b1,
                    requested_by: r1,
                },
                IdentifierConflict {
                    external_id: e2,
                    bound_to: b2,
                    requested_by: r2,
                },
            ) => e1 == e2 && b1 == b2 && r1 == r2,
            (IdentifierCollision(a), IdentifierCollision(b)) => a == b,
            (InvalidIdentifier(a), InvalidIdentifier(b)) => a == b,
            (
                ServiceFailure {
                    service: s1,
                    reason: r1,
                },
                ServiceFailure {
                    service: s2,
                    reason: r2,
                },
            ) => s1 == s2 && r1 == r2,
            (Timeout(a), Timeout(b)) => a == b,

            // not comparable: equal when the variant matches
            (UreqHttpError(_), UreqHttpError(_)) => true,
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,

            (ConfigError(a), ConfigError(b)) => a == b,
            (DatastoreError(a), DatastoreError(b)) => a == b,
            (NomParsingError(a), NomParsingError(b)) => a == b,

            _ => false,
        }
    }
}

#[cfg(test)]
mod sdb_errors_test {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SdbError::Timeout("sesame".into()).is_transient());
        assert!(SdbError::UreqHttpError(ureq::Error::StatusCode(503)).is_transient());
        assert!(SdbError::UreqHttpError(ureq::Error::StatusCode(429)).is_transient());
        assert!(!SdbError::UreqHttpError(ureq::Error::StatusCode(404)).is_transient());
        assert!(!SdbError::ResolutionFailure("Vega".into()).is_transient());
        assert!(!SdbError::InvalidInvocation("empty".into()).is_transient());
    }

    #[test]
    fn test_partial_eq_on_payload() {
        assert_eq!(
            SdbError::ResolutionFailure("a".into()),
            SdbError::ResolutionFailure("a".into())
        );
        assert_ne!(
            SdbError::ResolutionFailure("a".into()),
            SdbError::ResolutionFailure("b".into())
        );
        assert_ne!(
            SdbError::ResolutionFailure("a".into()),
            SdbError::InvalidIdentifier("a".into())
        );
    }
}
