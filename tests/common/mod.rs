#![allow(dead_code)]

use std::sync::Arc;

use sdbid::{
    config::SdbConfig,
    constants::{COMPLETE_TABLE, POSITION_TABLE, XID_TABLE},
    datastore::Datastore,
    epoch::SkyCoord,
    sdb::{Catalogues, Orchestrator, Services},
    services::{ellipse::NormalizedEllipseMatcher, local::LocalConeSearch, local::LocalNameResolver},
};

pub const VEGA: (f64, f64) = (279.234735, 38.783689);
pub const VEGA_ID: &str = "sdb-v1-183656.34+384701.3";

pub fn vega_names() -> LocalNameResolver {
    LocalNameResolver::new().with_object(
        "* alf Lyr",
        SkyCoord::new(VEGA.0, VEGA.1),
        &["Vega", "HD 172167"],
    )
}

/// An orchestrator over local services and the default catalogue lists.
pub fn orchestrator(
    store: Arc<dyn Datastore>,
    names: LocalNameResolver,
    cone: LocalConeSearch,
) -> Orchestrator {
    orchestrator_with(&SdbConfig::default(), store, names, cone)
}

pub fn orchestrator_with(
    config: &SdbConfig,
    store: Arc<dyn Datastore>,
    names: LocalNameResolver,
    cone: LocalConeSearch,
) -> Orchestrator {
    let names = Arc::new(names);
    let services = Services {
        names: names.clone(),
        directory: names,
        cone: Arc::new(cone),
        ellipse: Arc::new(NormalizedEllipseMatcher),
        store,
    };
    Orchestrator::new(config, services, Catalogues::defaults().unwrap()).unwrap()
}

/// Row counts of the engine tables, catalogue tables summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCounts {
    pub positions: usize,
    pub xids: usize,
    pub complete: usize,
    pub catalogue_rows: usize,
}

pub fn row_counts(store: &dyn Datastore, orchestrator: &Orchestrator) -> RowCounts {
    RowCounts {
        positions: store.count(POSITION_TABLE).unwrap(),
        xids: store.count(XID_TABLE).unwrap(),
        complete: store.count(COMPLETE_TABLE).unwrap(),
        catalogue_rows: orchestrator
            .catalogues()
            .iter()
            .map(|spec| store.count(&spec.table).unwrap())
            .sum(),
    }
}
