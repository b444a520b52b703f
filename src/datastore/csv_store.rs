//! File-backed datastore: one `<table>.csv` per table inside a directory.
//!
//! Every operation on a table runs under an exclusive advisory lock on `<table>.lock`. The
//! operating system drops the lock with the process, so a lock file left behind by a crashed run
//! does not block anyone. Writes rewrite the table into `<table>.csv.tmp` and rename it over the
//! original, a reader never sees a half-written file.
//!
//! The header of a table is the union of the columns of its rows; cells a row does not have are
//! written empty and dropped when read back.

use std::{
    collections::BTreeSet,
    fs::{self, File, OpenOptions, TryLockError},
    io::Write,
    thread,
    time::Duration,
};

use camino::{Utf8Path, Utf8PathBuf};

use crate::{config::WritePolicy, constants::Row, sdb_errors::SdbError};

use super::{apply_insert, apply_insert_unique, ClaimOutcome, Datastore, Filter};

const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);
const LOCK_MAX_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct CsvDatastore {
    dir: Utf8PathBuf,
}

/// Exclusive lock of one table, released when the file handle closes.
struct TableLock {
    path: Utf8PathBuf,
    file: File,
}

impl Drop for TableLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(lock = %self.path, error = %err, "unable to release table lock");
        }
    }
}

impl CsvDatastore {
    /// Open (and create if needed) a datastore directory.
    pub fn open(dir: &Utf8Path) -> Result<Self, SdbError> {
        fs::create_dir_all(dir)?;
        Ok(CsvDatastore {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn table_path(&self, table: &str) -> Result<Utf8PathBuf, SdbError> {
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(SdbError::DatastoreError(format!("invalid table name {table:?}")));
        }
        Ok(self.dir.join(format!("{table}.csv")))
    }

    fn lock(&self, table: &str) -> Result<TableLock, SdbError> {
        let path = self.dir.join(format!("{table}.lock"));
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        for _ in 0..LOCK_MAX_ATTEMPTS {
            match file.try_lock() {
                Ok(()) => {
                    // owner pid, for whoever inspects the directory
                    file.set_len(0)?;
                    writeln!(file, "{}", std::process::id())?;
                    return Ok(TableLock { path, file });
                }
                Err(TryLockError::WouldBlock) => thread::sleep(LOCK_RETRY_DELAY),
                Err(TryLockError::Error(err)) => return Err(err.into()),
            }
        }
        Err(SdbError::DatastoreError(format!(
            "table {table} is locked by another writer ({path})"
        )))
    }

    fn read_table(&self, path: &Utf8Path) -> Result<Vec<Row>, SdbError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .filter(|(_, value)| !value.is_empty())
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }

    fn write_table(&self, path: &Utf8Path, rows: &[Row]) -> Result<(), SdbError> {
        if rows.is_empty() {
            if path.exists() {
                fs::remove_file(path)?;
            }
            return Ok(());
        }

        let columns: BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
        let tmp = path.with_extension("csv.tmp");

        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(columns.iter().map(|c| c.as_str()))?;
        for row in rows {
            writer.write_record(
                columns
                    .iter()
                    .map(|c| row.get(*c).map(String::as_str).unwrap_or("")),
            )?;
        }
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read-modify-write of one table under its lock.
    fn update<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Vec<Row>) -> Result<(T, bool), SdbError>,
    ) -> Result<T, SdbError> {
        let path = self.table_path(table)?;
        let _lock = self.lock(table)?;
        let mut rows = self.read_table(&path)?;
        let (value, changed) = f(&mut rows)?;
        if changed {
            self.write_table(&path, &rows)?;
        }
        Ok(value)
    }
}

impl Datastore for CsvDatastore {
    fn select(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, SdbError> {
        let path = self.table_path(table)?;
        let _lock = self.lock(table)?;
        Ok(self
            .read_table(&path)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }

    fn insert(&self, table: &str, row: Row, policy: WritePolicy) -> Result<(), SdbError> {
        self.update(table, |rows| {
            apply_insert(rows, row, policy);
            Ok(((), true))
        })
    }

    fn delete_where(&self, table: &str, filter: &Filter) -> Result<usize, SdbError> {
        self.update(table, |rows| {
            let before = rows.len();
            rows.retain(|r| !filter.matches(r));
            let removed = before - rows.len();
            Ok((removed, removed > 0))
        })
    }

    fn insert_unique(
        &self,
        table: &str,
        key_column: &str,
        row: Row,
    ) -> Result<ClaimOutcome, SdbError> {
        self.update(table, |rows| {
            let outcome = apply_insert_unique(rows, key_column, row)?;
            Ok((outcome, outcome == ClaimOutcome::Claimed))
        })
    }
}

#[cfg(test)]
mod csv_store_test {
    use super::*;

    fn utf8_tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_rows_with_different_columns() {
        let (_guard, dir) = utf8_tempdir();
        let store = CsvDatastore::open(&dir).unwrap();

        let a = Row::from([
            ("sdbid".to_string(), "a".to_string()),
            ("Jmag".to_string(), "5.1".to_string()),
        ]);
        let b = Row::from([
            ("sdbid".to_string(), "b".to_string()),
            ("Kmag".to_string(), "4.2".to_string()),
        ]);
        store.insert("tmass", a.clone(), WritePolicy::Append).unwrap();
        store.insert("tmass", b.clone(), WritePolicy::Append).unwrap();

        assert_eq!(store.select("tmass", &Filter::All).unwrap(), vec![a, b]);
        assert!(dir.join("tmass.csv").exists());
    }

    #[test]
    fn test_stale_lock_file_does_not_block() {
        let (_guard, dir) = utf8_tempdir();
        // left behind by a process that died while holding the lock
        fs::write(dir.join("sdb_pm.lock"), "4242\n").unwrap();
        let store = CsvDatastore::open(&dir).unwrap();

        let started = std::time::Instant::now();
        let row = Row::from([("sdbid".to_string(), "a".to_string())]);
        assert_eq!(
            store.insert_unique("sdb_pm", "sdbid", row).unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(store.count("sdb_pm").unwrap(), 1);
        assert!(started.elapsed() < LOCK_RETRY_DELAY * 100);
    }

    #[test]
    fn test_held_lock_blocks_and_releases() {
        let (_guard, dir) = utf8_tempdir();
        let store = CsvDatastore::open(&dir).unwrap();

        let held = store.lock("xids").unwrap();
        let other = OpenOptions::new()
            .write(true)
            .open(dir.join("xids.lock"))
            .unwrap();
        assert!(matches!(other.try_lock(), Err(TryLockError::WouldBlock)));

        drop(held);
        other.try_lock().unwrap();
        other.unlock().unwrap();
        assert!(store.select("xids", &Filter::All).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_table_name() {
        let (_guard, dir) = utf8_tempdir();
        let store = CsvDatastore::open(&dir).unwrap();
        let err = store.select("../escape", &Filter::All).unwrap_err();
        assert!(matches!(err, SdbError::DatastoreError(_)));
    }
}
