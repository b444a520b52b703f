use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use crate::{config::WritePolicy, constants::Row, sdb_errors::SdbError};

use super::{apply_insert, apply_insert_unique, ClaimOutcome, Datastore, Filter};

/// In-memory datastore, every operation holds a single lock.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Row>>>, SdbError> {
        self.tables
            .lock()
            .map_err(|_| SdbError::DatastoreError("memory datastore lock poisoned".into()))
    }
}

impl Datastore for MemoryDatastore {
    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, SdbError> {
        let tables = self.lock()?;
        Ok(tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    fn insert(&self, table: &str, row: Row, policy: WritePolicy) -> Result<(), SdbError> {
        let mut tables = self.lock()?;
        apply_insert(tables.entry(table.to_string()).or_default(), row, policy);
        Ok(())
    }

    fn delete_where(&self, table: &str, filter: &Filter) -> Result<usize, SdbError> {
        let mut tables = self.lock()?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok(before - rows.len())
    }

    fn insert_unique(
        &self,
        table: &str,
        key_column: &str,
        row: Row,
    ) -> Result<ClaimOutcome, SdbError> {
        let mut tables = self.lock()?;
        apply_insert_unique(tables.entry(table.to_string()).or_default(), key_column, row)
    }
}

#[cfg(test)]
mod memory_test {
    use std::{sync::Arc, thread};

    use super::*;

    fn row(sdbid: &str, value: &str) -> Row {
        Row::from([
            ("sdbid".to_string(), sdbid.to_string()),
            ("value".to_string(), value.to_string()),
        ])
    }

    #[test]
    fn test_select_insert_delete() {
        let store = MemoryDatastore::new();
        assert!(store.select("t", &Filter::All).unwrap().is_empty());

        store.insert("t", row("a", "1"), WritePolicy::Append).unwrap();
        store.insert("t", row("b", "2"), WritePolicy::Append).unwrap();
        store.insert("t", row("a", "3"), WritePolicy::Append).unwrap();
        assert_eq!(store.count("t").unwrap(), 3);
        assert_eq!(store.select("t", &Filter::sdbid("a")).unwrap().len(), 2);

        store.insert("t", row("a", "4"), WritePolicy::Replace).unwrap();
        let a = store.select("t", &Filter::sdbid("a")).unwrap();
        assert_eq!(a, vec![row("a", "4")]);

        assert_eq!(store.delete_where("t", &Filter::sdbid("b")).unwrap(), 1);
        assert_eq!(store.delete_where("missing", &Filter::All).unwrap(), 0);
        assert_eq!(store.count("t").unwrap(), 1);
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let store = Arc::new(MemoryDatastore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .insert_unique("sdb_pm", "sdbid", row("same", &i.to_string()))
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<ClaimOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let claimed = outcomes
            .iter()
            .filter(|o| **o == ClaimOutcome::Claimed)
            .count();
        assert_eq!(claimed, 1);
        assert_eq!(store.count("sdb_pm").unwrap(), 1);
    }
}
