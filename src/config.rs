//! # Configuration
//!
//! [`SdbConfig`] gathers every tunable of a run: identifier prefix, search radii, write policy,
//! HTTP timeout and retry policy, service endpoints and the datastore directory.
//!
//! Every field has a default, so a YAML file only needs to list what it overrides:
//!
//! ```yaml
//! write_policy: Replace
//! pm_radius_arcsec: 10.0
//! retry:
//!   max_attempts: 5
//! ```

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::{
    constants::{ArcSec, DEFAULT_PM_RADIUS, DEFAULT_REVERSE_RADIUS, SDBID_PREFIX},
    sdb_errors::SdbError,
};

/// How writes treat rows already present for the same identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum WritePolicy {
    /// Keep existing rows; a completed target is never processed twice.
    #[default]
    Append,
    /// Delete every row of the target first, then repopulate from scratch.
    Replace,
}

/// Retry with exponential backoff, applied at the collaborator boundary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 500,
            backoff_factor: 2,
        }
    }
}

impl RetryPolicy {
    /// A policy that calls the operation exactly once.
    pub fn none() -> Self {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff_ms: 0,
            backoff_factor: 1,
        }
    }

    /// Delay to wait before attempt number `attempt` (1-based, the first attempt waits nothing).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = (self.backoff_factor.max(1) as u64).saturating_pow(attempt - 2);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }

    /// Run `op` until it succeeds, fails with a non transient error, or attempts are exhausted.
    ///
    /// Arguments
    /// ---------
    /// * `what`: label of the call, used in logs
    /// * `op`: the fallible operation
    ///
    /// Return
    /// ------
    /// * The first success, or the last error
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, SdbError>,
    ) -> Result<T, SdbError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    tracing::warn!(call = what, attempt, error = %err, ?delay, "transient failure, retrying");
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SdbConfig {
    /// Version prefix of derived identifiers
    pub id_prefix: String,
    /// Radius of the reverse name resolution, in arcseconds
    pub reverse_radius_arcsec: ArcSec,
    /// Radius of the proper-motion catalogue search, in arcseconds
    pub pm_radius_arcsec: ArcSec,
    pub write_policy: WritePolicy,
    /// Global timeout of every HTTP call, in seconds
    pub http_timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Directory of the file-backed datastore
    pub data_dir: Option<Utf8PathBuf>,
    /// Age after which the processing lease of a target is considered abandoned, in seconds
    pub lease_ttl_secs: u64,
    pub sesame_url: String,
    pub simbad_tap_url: String,
    pub vizier_url: String,
}

impl Default for SdbConfig {
    fn default() -> Self {
        SdbConfig {
            id_prefix: SDBID_PREFIX.to_string(),
            reverse_radius_arcsec: DEFAULT_REVERSE_RADIUS,
            pm_radius_arcsec: DEFAULT_PM_RADIUS,
            write_policy: WritePolicy::Append,
            http_timeout_secs: 10,
            retry: RetryPolicy::default(),
            data_dir: None,
            lease_ttl_secs: 600,
            sesame_url: "https://cds.unistra.fr/cgi-bin/nph-sesame/-oI/SNV".to_string(),
            simbad_tap_url: "https://simbad.cds.unistra.fr/simbad/sim-tap/sync".to_string(),
            vizier_url: "https://vizier.cds.unistra.fr/viz-bin/asu-tsv".to_string(),
        }
    }
}

impl SdbConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SdbError> {
        let config: SdbConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Utf8Path) -> Result<Self, SdbError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), SdbError> {
        if !(self.reverse_radius_arcsec > 0.0) || !(self.pm_radius_arcsec > 0.0) {
            return Err(SdbError::ConfigError(
                "search radii must be strictly positive".into(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(SdbError::ConfigError("http timeout must be non zero".into()));
        }
        if self.lease_ttl_secs == 0 {
            return Err(SdbError::ConfigError("lease ttl must be non zero".into()));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    /// The datastore directory, defaulting to the per-user data directory.
    pub fn data_dir(&self) -> Result<Utf8PathBuf, SdbError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let dirs = ProjectDirs::from("", "", "sdbid")
            .ok_or_else(|| SdbError::ConfigError("cannot find the user data directory".into()))?;
        Utf8Path::from_path(dirs.data_dir())
            .map(|p| p.to_path_buf())
            .ok_or_else(|| SdbError::ConfigError("user data directory is not UTF-8".into()))
    }
}
