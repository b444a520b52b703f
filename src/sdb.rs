//! # Orchestrator: from a target request to a registered target
//!
//! [`Orchestrator`] wires the engine together and exposes the single entry point
//! [`process_target`](Orchestrator::process_target):
//!
//! ```text
//! resolve ─▶ derive id ─▶ registry state ─▶ conflict check ─▶ lease ─▶ claim ─▶ cross-ids ─▶ catalogues ─▶ complete
//! ```
//!
//! 1. **Resolution** ([`PositionResolver`]): canonical position and position record. A failure
//!    here aborts before any write.
//! 2. **Registry** ([`TargetRegistry`]): a `Complete` target returns
//!    [`ProcessOutcome::AlreadyExists`] under [`WritePolicy::Append`]. An `Incomplete` one is
//!    resumed. Under [`WritePolicy::Replace`] the target's rows are deleted and the target
//!    reclaimed.
//! 3. **Conflict check**: the target's name must not be bound to another identifier. This runs
//!    before the claim, a conflicting request writes nothing.
//! 4. **Lease and claim**: only the holder of the target's lease goes further, a target leased
//!    by a concurrent invocation yields `AlreadyExists`. The state is read again under the lease,
//!    then the claim (atomic as well) or the resumption happens. The lease is released when
//!    processing ends, successful or not.
//! 5. **Cross-identification** ([`CrossIdCollector`]) and **catalogue ingestion**
//!    ([`CatalogueIngestor`]): optional sources, failures are logged and skipped.
//! 6. **Completion marker**, written last.
//!
//! [`process_batch`](Orchestrator::process_batch) runs a list of requests and never stops on a
//! per-target error; [`read_target_list`] loads such a list from a CSV file.
//!
//! ## Typical usage
//!
//! ```rust, no_run
//! use sdbid::config::SdbConfig;
//! use sdbid::resolver::TargetRequest;
//! use sdbid::sdb::Orchestrator;
//!
//! let orchestrator = Orchestrator::from_config(SdbConfig::default()).unwrap();
//! let outcome = orchestrator.process_target(&TargetRequest::by_name("Vega")).unwrap();
//! println!("{outcome}");
//! ```

use std::{fmt, sync::Arc};

use camino::Utf8Path;
use serde::Deserialize;

use crate::{
    catalogue::{
        defaults::{photometry_catalogues, proper_motion_catalogues},
        ingestor::CatalogueIngestor,
        CatalogueSpec,
    },
    config::{SdbConfig, WritePolicy},
    conversion::parse_coordinate,
    crossid::{BulkXidSpec, CrossIdCollector},
    datastore::{csv_store::CsvDatastore, ClaimOutcome, Datastore},
    env_state::SdbEnv,
    identifier::{IdentifierDeriver, SdbId},
    registry::{TargetRegistry, TargetState},
    resolver::{PositionResolver, TargetRequest},
    sdb_errors::SdbError,
    services::{
        cds::{CdsNameResolver, SesameResolver, SimbadTapResolver, VizierConeSearch},
        ellipse::NormalizedEllipseMatcher,
        CatalogueSource, ConeSearchService, EllipseMatchService, IdentifierDirectory,
        NameResolver,
    },
};

/// The collaborators of the engine.
#[derive(Clone)]
pub struct Services {
    pub names: Arc<dyn NameResolver>,
    pub directory: Arc<dyn IdentifierDirectory>,
    pub cone: Arc<dyn ConeSearchService>,
    pub ellipse: Arc<dyn EllipseMatchService>,
    pub store: Arc<dyn Datastore>,
}

impl Services {
    /// CDS services over HTTP, sharing one [`SdbEnv`].
    pub fn cds(config: &SdbConfig, store: Arc<dyn Datastore>) -> Result<Self, SdbError> {
        let env = SdbEnv::new(config);
        let names = Arc::new(CdsNameResolver {
            sesame: SesameResolver::new(env.clone(), &config.sesame_url)?,
            simbad: SimbadTapResolver::new(env.clone(), &config.simbad_tap_url),
        });
        Ok(Services {
            names: names.clone(),
            directory: names,
            cone: Arc::new(VizierConeSearch::new(env, &config.vizier_url)),
            ellipse: Arc::new(NormalizedEllipseMatcher),
            store,
        })
    }
}

/// The catalogue lists the engine runs with.
#[derive(Debug, Clone)]
pub struct Catalogues {
    pub photometry: Vec<CatalogueSpec>,
    pub proper_motion: Vec<CatalogueSource>,
    pub bulk: Vec<BulkXidSpec>,
}

impl Catalogues {
    pub fn defaults() -> Result<Self, SdbError> {
        Ok(Catalogues {
            photometry: photometry_catalogues(),
            proper_motion: proper_motion_catalogues(),
            bulk: BulkXidSpec::defaults()?,
        })
    }
}

/// Successful outcome of [`Orchestrator::process_target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The target was registered (or its interrupted registration completed)
    Added(SdbId),
    /// A previous run already registered the target, nothing was written
    AlreadyExists(SdbId),
}

impl ProcessOutcome {
    pub fn sdbid(&self) -> &SdbId {
        match self {
            ProcessOutcome::Added(id) | ProcessOutcome::AlreadyExists(id) => id,
        }
    }
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::Added(id) => write!(f, "{id}"),
            ProcessOutcome::AlreadyExists(id) => write!(f, "{id} (already exists)"),
        }
    }
}

/// Result of one request of a batch.
#[derive(Debug)]
pub struct BatchEntry {
    pub request: TargetRequest,
    pub result: Result<ProcessOutcome, SdbError>,
}

impl BatchEntry {
    /// Short status of the entry: `added`, `already_exists`, `resolution_failed`,
    /// `conflict_detected` or `error`.
    pub fn status(&self) -> &'static str {
        match &self.result {
            Ok(ProcessOutcome::Added(_)) => "added",
            Ok(ProcessOutcome::AlreadyExists(_)) => "already_exists",
            Err(SdbError::ResolutionFailure(_)) => "resolution_failed",
            Err(SdbError::IdentifierConflict { .. }) | Err(SdbError::IdentifierCollision(_)) => {
                "conflict_detected"
            }
            Err(_) => "error",
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    fn count(&self, status: &str) -> usize {
        self.entries.iter().filter(|e| e.status() == status).count()
    }

    pub fn added(&self) -> usize {
        self.count("added")
    }

    pub fn already_exists(&self) -> usize {
        self.count("already_exists")
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_err()).count()
    }
}

pub struct Orchestrator {
    write_policy: WritePolicy,
    resolver: PositionResolver,
    registry: TargetRegistry,
    crossid: CrossIdCollector,
    ingestor: CatalogueIngestor,
    catalogues: Vec<CatalogueSpec>,
}

impl Orchestrator {
    /// Build an orchestrator from its collaborators and catalogue lists.
    ///
    /// Arguments
    /// ---------
    /// * `config`: identifier prefix, radii and default write policy
    /// * `services`: name resolution, identifier directory, cone search, ellipse matching, storage
    /// * `catalogues`: photometric, proper-motion and bulk cross-identification catalogues
    ///
    /// Return
    /// ------
    /// * The orchestrator, or a [`SdbError::ConfigError`] for an invalid configuration
    pub fn new(
        config: &SdbConfig,
        services: Services,
        catalogues: Catalogues,
    ) -> Result<Self, SdbError> {
        config.validate()?;
        let deriver = IdentifierDeriver::new(&config.id_prefix)?;

        let mut photometry = catalogues.photometry;
        crate::catalogue::sort_by_wavelength(&mut photometry);

        let target_tables = photometry.iter().map(|c| c.table.clone()).collect();

        Ok(Orchestrator {
            write_policy: config.write_policy,
            resolver: PositionResolver::new(
                services.names,
                services.cone.clone(),
                deriver,
                catalogues.proper_motion,
                config.reverse_radius_arcsec,
                config.pm_radius_arcsec,
            ),
            registry: TargetRegistry::new(services.store.clone(), target_tables)
                .with_lease_ttl(config.lease_ttl()),
            crossid: CrossIdCollector::new(
                services.store.clone(),
                services.directory,
                services.ellipse.clone(),
                catalogues.bulk,
            ),
            ingestor: CatalogueIngestor::new(services.store, services.cone, services.ellipse),
            catalogues: photometry,
        })
    }

    /// CDS services, CSV datastore in the configured directory and default catalogues.
    pub fn from_config(config: SdbConfig) -> Result<Self, SdbError> {
        let dir = config.data_dir()?;
        let store = Arc::new(CsvDatastore::open(&dir)?);
        tracing::info!(data_dir = %dir, "datastore opened");
        let services = Services::cds(&config, store)?;
        Self::new(&config, services, Catalogues::defaults()?)
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn crossid(&self) -> &CrossIdCollector {
        &self.crossid
    }

    pub fn catalogues(&self) -> &[CatalogueSpec] {
        &self.catalogues
    }

    /// Process one target with the configured write policy.
    pub fn process_target(&self, request: &TargetRequest) -> Result<ProcessOutcome, SdbError> {
        self.process_target_with(request, self.write_policy)
    }

    /// Process one target.
    ///
    /// Arguments
    /// ---------
    /// * `request`: name and/or coordinates
    /// * `policy`: [`WritePolicy::Append`] leaves registered targets untouched,
    ///   [`WritePolicy::Replace`] deletes the target's rows and repopulates them
    ///
    /// Return
    /// ------
    /// * [`ProcessOutcome::Added`] or [`ProcessOutcome::AlreadyExists`]
    /// * [`SdbError::ResolutionFailure`] when no position can be formed
    /// * [`SdbError::IdentifierConflict`] when the target's name belongs to another target
    /// * [`SdbError::IdentifierCollision`] when the identifier is taken by another position
    pub fn process_target_with(
        &self,
        request: &TargetRequest,
        policy: WritePolicy,
    ) -> Result<ProcessOutcome, SdbError> {
        let resolution = self.resolver.resolve(request)?;
        let record = &resolution.record;
        let id = &record.sdbid;

        self.registry.check_collision(record)?;
        let state = self.registry.state(id)?;
        if policy == WritePolicy::Append && state == TargetState::Complete {
            tracing::info!(sdbid = %id, "already registered");
            return Ok(ProcessOutcome::AlreadyExists(id.clone()));
        }

        if let Some(name) = &resolution.name {
            self.crossid.check_conflict(id, name)?;
        }

        let Some(_lease) = self.registry.acquire_lease(id)? else {
            tracing::info!(sdbid = %id, "in progress in a concurrent run");
            return Ok(ProcessOutcome::AlreadyExists(id.clone()));
        };
        // a run holding the lease before us may have finished the target
        let resumed = match (policy, self.registry.state(id)?) {
            (WritePolicy::Append, TargetState::Complete) => {
                tracing::info!(sdbid = %id, "registered by a concurrent run");
                return Ok(ProcessOutcome::AlreadyExists(id.clone()));
            }
            (WritePolicy::Append, TargetState::Incomplete) => {
                tracing::warn!(sdbid = %id, "resuming an incomplete target");
                true
            }
            _ => {
                if self.registry.policy_claim(record, policy)? == ClaimOutcome::AlreadyClaimed {
                    tracing::info!(sdbid = %id, "claimed by a concurrent run");
                    return Ok(ProcessOutcome::AlreadyExists(id.clone()));
                }
                false
            }
        };

        if let Some(name) = &resolution.name {
            self.crossid.add_supplied(id, name)?;
        }
        let xids = self.crossid.collect(record, resolution.name.as_deref())?;
        let summary = self.ingestor.ingest_all(record, &self.catalogues, policy)?;

        self.registry.mark_complete(id)?;
        tracing::info!(
            sdbid = %id,
            xids = xids.len(),
            catalogues = summary.written,
            failed = summary.failed.len(),
            resumed,
            "target registered"
        );
        Ok(ProcessOutcome::Added(id.clone()))
    }

    /// Process every request in order; a failing request does not stop the batch.
    pub fn process_batch(&self, requests: &[TargetRequest]) -> BatchReport {
        let entries: Vec<BatchEntry> = requests
            .iter()
            .map(|request| {
                let result = self.process_target(request);
                if let Err(err) = &result {
                    tracing::warn!(target_name = %request, error = %err, "target not processed");
                }
                BatchEntry {
                    request: request.clone(),
                    result,
                }
            })
            .collect();

        let report = BatchReport { entries };
        tracing::info!(
            total = report.entries.len(),
            added = report.added(),
            already_exists = report.already_exists(),
            failed = report.failed(),
            "batch done"
        );
        report
    }
}

#[derive(Debug, Deserialize)]
struct TargetLine {
    name: Option<String>,
    ra: Option<String>,
    dec: Option<String>,
}

/// Read a target list: a CSV file with a `name,ra,dec` header, any cell may be empty.
///
/// Coordinates are decimal degrees, or sexagesimal (`HH MM SS.s` / `±DD MM SS.s`).
pub fn read_target_list(path: &Utf8Path) -> Result<Vec<TargetRequest>, SdbError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut requests = Vec::new();
    for (idx, line) in reader.deserialize::<TargetLine>().enumerate() {
        let line = line?;
        let coordinate = |field: &Option<String>, is_ra: bool| -> Result<Option<f64>, SdbError> {
            match field.as_deref().filter(|f| !f.is_empty()) {
                None => Ok(None),
                Some(value) => parse_coordinate(value, is_ra).map(Some).ok_or_else(|| {
                    SdbError::InvalidInvocation(format!(
                        "{path}, line {}: invalid coordinate {value:?}",
                        idx + 2
                    ))
                }),
            }
        };
        requests.push(TargetRequest {
            name: line.name.filter(|n| !n.is_empty()),
            ra: coordinate(&line.ra, true)?,
            dec: coordinate(&line.dec, false)?,
        });
    }
    Ok(requests)
}
