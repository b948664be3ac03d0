/**
 * JOURNAL FICHIER JSON - Persistance durable des activations
 *
 * FONCTIONNEMENT :
 * - Tableau JSON d'`ActivationRecord`, partageable entre plusieurs process
 *   (un kernel par ruche pointant sur le même fichier)
 * - Chaque mutation prend un verrou exclusif OS sur `<fichier>.lock`, relit
 *   le disque, applique ouvrir/clore puis réécrit : le fichier est l'arbitre
 *   de la règle "au plus une activation ouverte par ruche"
 * - Écriture via fichier temporaire + rename, les lecteurs sans verrou ne
 *   voient jamais un fichier tronqué
 * - Échec d'écriture = rien n'a changé (ni disque ni mémoire)
 */

use super::{ActivationHistory, ActivationLedger, RecordTable, TimeRange};
use crate::error::LedgerError;
use crate::models::ActivationRecord;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct JsonFileLedger {
    storage_path: PathBuf,
    lock_path: PathBuf,
    // Sérialise les écrivains du process avant le verrou fichier
    writer: Mutex<()>,
}

impl JsonFileLedger {
    /// Ouvre (ou crée) le journal au chemin donné
    pub fn open<P: Into<PathBuf>>(storage_path: P) -> Result<Self, LedgerError> {
        let storage_path = storage_path.into();
        if let Some(parent) = storage_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let ledger = Self {
            lock_path: storage_path.with_extension("json.lock"),
            storage_path,
            writer: Mutex::new(()),
        };

        let records = {
            let _store = ledger.lock_store()?;
            ledger.load_or_create()?
        };
        let open = records.iter().filter(|r| r.is_open()).count();
        info!(
            path = ?ledger.storage_path,
            records = records.len(),
            open,
            "activation ledger loaded"
        );
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    /// Verrou exclusif inter-process, relâché à la fermeture du fichier
    fn lock_store(&self) -> Result<File, LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock()?;
        Ok(file)
    }

    fn load_or_create(&self) -> Result<Vec<ActivationRecord>, LedgerError> {
        if !self.storage_path.exists() {
            self.save_to_disk(&[])?;
            return Ok(Vec::new());
        }
        self.load_from_disk()
    }

    fn load_from_disk(&self) -> Result<Vec<ActivationRecord>, LedgerError> {
        if !self.storage_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.storage_path)?;
        if content.trim().is_empty() {
            warn!(path = ?self.storage_path, "empty ledger file, starting fresh");
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save_to_disk(&self, records: &[ActivationRecord]) -> Result<(), LedgerError> {
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.storage_path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.storage_path)?;
        Ok(())
    }

    /// Relit le disque sous verrou, applique `mutate` et réécrit le tableau.
    /// Une erreur de `mutate` laisse le fichier intact.
    fn transact<T>(
        &self,
        mutate: impl FnOnce(&mut RecordTable) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let _writer = self.writer.lock();
        let _store = self.lock_store()?;

        let mut table = RecordTable::from_records(self.load_from_disk()?);
        let outcome = mutate(&mut table)?;
        self.save_to_disk(&table.records)?;
        Ok(outcome)
    }
}

impl ActivationLedger for JsonFileLedger {
    fn open_activation(
        &self,
        unit_id: &str,
        start_time: OffsetDateTime,
        temperature: f64,
        humidity: f64,
    ) -> Result<ActivationRecord, LedgerError> {
        self.transact(|table| table.open(unit_id, start_time, temperature, humidity))
    }

    fn close_open_activation(
        &self,
        unit_id: &str,
        end_time: OffsetDateTime,
    ) -> Result<Option<ActivationRecord>, LedgerError> {
        self.transact(|table| Ok(table.close(unit_id, end_time)))
    }

    fn list_activations(
        &self,
        unit_id: &str,
        range: TimeRange,
    ) -> Result<ActivationHistory, LedgerError> {
        let table = RecordTable::from_records(self.load_from_disk()?);
        Ok(table.list(unit_id, range))
    }

    fn flush(&self) -> Result<(), LedgerError> {
        // Chaque mutation est déjà sur disque : on vérifie seulement le fichier
        let _writer = self.writer.lock();
        let _store = self.lock_store()?;
        let records = self.load_from_disk()?;
        OpenOptions::new().write(true).open(&self.storage_path)?.sync_all()?;
        debug!(path = ?self.storage_path, records = records.len(), "activation ledger flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;
    use time::Duration;

    #[test]
    fn creates_missing_file_and_parent_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("air_pump_activations.json");
        let ledger = JsonFileLedger::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(ledger.path(), path.as_path());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("activations.json");
        let t1 = datetime!(2025-07-01 14:00 UTC);

        {
            let ledger = JsonFileLedger::open(&path).unwrap();
            ledger.open_activation("1", t1, 39.2, 80.0).unwrap();
            ledger.open_activation("2", t1, 30.0, 90.0).unwrap();
            ledger.close_open_activation("2", t1 + Duration::seconds(90)).unwrap();
        }

        let ledger = JsonFileLedger::open(&path).unwrap();
        // L'activation ouverte de la ruche 1 est toujours autoritaire
        let err = ledger.open_activation("1", t1 + Duration::hours(1), 20.0, 80.0).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateOpenActivation { .. }));

        let closed = ledger
            .close_open_activation("1", t1 + Duration::seconds(30))
            .unwrap()
            .unwrap();
        assert_eq!(closed.temperature_at_start, 39.2);
        assert_eq!(closed.duration_seconds, Some(30.0));

        let hive2 = ledger.list_activations("2", TimeRange::all()).unwrap();
        assert_eq!(hive2.len(), 1);
        assert_eq!(hive2.iter().next().unwrap().duration_seconds, Some(90.0));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("activations.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFileLedger::open(&path), Err(LedgerError::Serialization(_))));
    }

    #[test]
    fn list_filters_by_range() {
        let dir = tempdir().unwrap();
        let ledger = JsonFileLedger::open(dir.path().join("a.json")).unwrap();
        let day = datetime!(2025-07-01 00:00 UTC);
        for h in [1, 5, 23, 25] {
            let start = day + Duration::hours(h);
            ledger.open_activation("1", start, 25.0, 80.0).unwrap();
            ledger.close_open_activation("1", start + Duration::minutes(10)).unwrap();
        }

        let range = TimeRange {
            from: Some(day),
            to: Some(day + Duration::days(1)),
        };
        let starts: Vec<_> = ledger
            .list_activations("1", range)
            .unwrap()
            .into_iter()
            .map(|r| r.start_time.hour())
            .collect();
        assert_eq!(starts, vec![1, 5, 23]);
    }

    fn open_records(ledger: &JsonFileLedger, unit_id: &str) -> usize {
        ledger
            .list_activations(unit_id, TimeRange::all())
            .unwrap()
            .iter()
            .filter(|r| r.is_open())
            .count()
    }

    #[test]
    fn instances_sharing_a_file_see_each_other() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("activations.json");
        let hive1 = JsonFileLedger::open(&path).unwrap();
        let hive2 = JsonFileLedger::open(&path).unwrap();
        let t = datetime!(2025-07-01 10:00 UTC);

        hive1.open_activation("1", t, 25.0, 80.0).unwrap();
        hive2.open_activation("2", t + Duration::minutes(1), 39.0, 80.0).unwrap();

        // Le second process ne peut pas ouvrir une deuxième activation pour la ruche 1
        let err = hive2
            .open_activation("1", t + Duration::minutes(2), 25.0, 80.0)
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateOpenActivation { .. }));

        // Et peut clore celle ouverte par l'autre
        let closed = hive2.close_open_activation("1", t + Duration::minutes(5)).unwrap();
        assert_eq!(closed.unwrap().duration_seconds, Some(300.0));

        let reopened = JsonFileLedger::open(&path).unwrap();
        assert_eq!(reopened.list_activations("1", TimeRange::all()).unwrap().len(), 1);
        assert_eq!(open_records(&reopened, "1"), 0);
        assert_eq!(open_records(&reopened, "2"), 1);
    }

    #[test]
    fn concurrent_instances_keep_every_record_and_one_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("activations.json");
        let t = datetime!(2025-07-01 10:00 UTC);
        JsonFileLedger::open(&path).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let ledger = JsonFileLedger::open(&path).unwrap();
                    let own = format!("u{i}");
                    ledger.open_activation(&own, t, 30.0, 80.0).unwrap();
                    ledger.open_activation("1", t + Duration::seconds(i), 25.0, 80.0).is_ok()
                })
            })
            .collect();
        let accepted = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);

        let reopened = JsonFileLedger::open(&path).unwrap();
        assert_eq!(open_records(&reopened, "1"), 1);
        assert_eq!(reopened.list_activations("1", TimeRange::all()).unwrap().len(), 1);
        for i in 0..8 {
            assert_eq!(open_records(&reopened, &format!("u{i}")), 1);
        }
    }

    #[test]
    fn shared_instance_across_threads_loses_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.json");
        let ledger = std::sync::Arc::new(JsonFileLedger::open(path).unwrap());
        let t = datetime!(2025-07-01 10:00 UTC);

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    let unit = format!("{}", i % 2);
                    let start = t + Duration::minutes(i);
                    if ledger.open_activation(&unit, start, 25.0, 80.0).is_ok() {
                        let end = start + Duration::seconds(10);
                        ledger.close_open_activation(&unit, end).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        for unit in ["0", "1"] {
            let history = ledger.list_activations(unit, TimeRange::all()).unwrap();
            assert!(!history.is_empty());
            assert!(history.iter().all(|r| !r.is_open()));
        }
        ledger.flush().unwrap();
    }

    #[test]
    fn failed_write_leaves_open_and_close_unapplied() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("activations.json");
        let ledger = JsonFileLedger::open(&path).unwrap();
        let t = datetime!(2025-07-01 10:00 UTC);
        // Un répertoire à la place du fichier temporaire fait échouer l'écriture
        let blocker = path.with_extension("json.tmp");

        fs::create_dir(&blocker).unwrap();
        let err = ledger.open_activation("1", t, 25.0, 80.0).unwrap_err();
        assert!(err.is_persistence_failure());
        fs::remove_dir(&blocker).unwrap();
        assert!(ledger.list_activations("1", TimeRange::all()).unwrap().is_empty());

        ledger.open_activation("1", t, 25.0, 80.0).unwrap();
        fs::create_dir(&blocker).unwrap();
        let err = ledger.close_open_activation("1", t + Duration::minutes(1)).unwrap_err();
        assert!(err.is_persistence_failure());
        fs::remove_dir(&blocker).unwrap();
        assert_eq!(open_records(&ledger, "1"), 1);

        let closed = ledger.close_open_activation("1", t + Duration::minutes(2)).unwrap();
        assert_eq!(closed.unwrap().duration_seconds, Some(120.0));
    }
}
