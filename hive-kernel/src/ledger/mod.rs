/**
 * JOURNAL DES ACTIVATIONS - Historique durable des intervalles ON de la pompe
 *
 * RÔLE :
 * Interface de persistance commune (trait `ActivationLedger`) + deux
 * implémentations : mémoire (tests, déploiement sans disque) et fichier JSON.
 *
 * INVARIANT :
 * Pour un unit_id donné, au plus un enregistrement sans `end_time`.
 * Le journal l'impose lui-même, indépendamment de la machine d'état :
 * `open_activation` refuse un second ouvert, `close_open_activation` est
 * un no-op s'il n'y en a aucun.
 *
 * CONCURRENCE :
 * Chaque opération s'exécute sous un seul verrou (lecture + écriture
 * conditionnelle), plusieurs acteurs peuvent partager le même journal.
 */

mod json_file;
mod memory;

pub use json_file::JsonFileLedger;
pub use memory::MemoryLedger;

use crate::error::LedgerError;
use crate::models::ActivationRecord;
use time::OffsetDateTime;
use uuid::Uuid;

/// Fenêtre sur `start_time`, semi-ouverte : `from <= start < to`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, t: OffsetDateTime) -> bool {
        self.from.map_or(true, |from| t >= from) && self.to.map_or(true, |to| t < to)
    }
}

/// Activations d'un unit, triées par `start_time` croissant.
/// Matérialisées en entier à la lecture du journal ; `iter()` peut être
/// rappelé autant de fois que nécessaire.
#[derive(Debug, Clone, Default)]
pub struct ActivationHistory {
    records: Vec<ActivationRecord>,
}

impl ActivationHistory {
    fn new(mut records: Vec<ActivationRecord>) -> Self {
        records.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Self { records }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ActivationRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Durée cumulée des activations closes
    pub fn total_duration_seconds(&self) -> f64 {
        self.iter().filter_map(|r| r.duration_seconds).sum()
    }
}

impl<'a> IntoIterator for &'a ActivationHistory {
    type Item = &'a ActivationRecord;
    type IntoIter = std::slice::Iter<'a, ActivationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for ActivationHistory {
    type Item = ActivationRecord;
    type IntoIter = std::vec::IntoIter<ActivationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Interface commune des backends de journal
pub trait ActivationLedger: Send + Sync {
    /// Insère une activation ouverte. `DuplicateOpenActivation` si une est déjà ouverte.
    fn open_activation(
        &self,
        unit_id: &str,
        start_time: OffsetDateTime,
        temperature: f64,
        humidity: f64,
    ) -> Result<ActivationRecord, LedgerError>;

    /// Clôt l'activation ouverte du unit. `Ok(None)` si aucune n'est ouverte.
    fn close_open_activation(
        &self,
        unit_id: &str,
        end_time: OffsetDateTime,
    ) -> Result<Option<ActivationRecord>, LedgerError>;

    fn list_activations(
        &self,
        unit_id: &str,
        range: TimeRange,
    ) -> Result<ActivationHistory, LedgerError>;

    /// Force l'écriture de l'état courant (appelé à l'arrêt)
    fn flush(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Table d'enregistrements partagée par les deux backends
#[derive(Debug, Default)]
struct RecordTable {
    records: Vec<ActivationRecord>,
}

impl RecordTable {
    fn from_records(records: Vec<ActivationRecord>) -> Self {
        Self { records }
    }

    fn open(
        &mut self,
        unit_id: &str,
        start_time: OffsetDateTime,
        temperature: f64,
        humidity: f64,
    ) -> Result<ActivationRecord, LedgerError> {
        if self.records.iter().any(|r| r.unit_id == unit_id && r.is_open()) {
            return Err(LedgerError::DuplicateOpenActivation {
                unit_id: unit_id.to_string(),
            });
        }

        let record = ActivationRecord {
            id: Uuid::new_v4().to_string(),
            unit_id: unit_id.to_string(),
            start_time,
            end_time: None,
            duration_seconds: None,
            temperature_at_start: temperature,
            humidity_at_start: humidity,
        };
        self.records.push(record.clone());
        Ok(record)
    }

    fn close(&mut self, unit_id: &str, end_time: OffsetDateTime) -> Option<ActivationRecord> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.unit_id == unit_id && r.is_open())?;

        let elapsed = (end_time - record.start_time).as_seconds_f64();
        record.end_time = Some(end_time);
        record.duration_seconds = Some(elapsed.max(0.0));
        Some(record.clone())
    }

    fn list(&self, unit_id: &str, range: TimeRange) -> ActivationHistory {
        ActivationHistory::new(
            self.records
                .iter()
                .filter(|r| r.unit_id == unit_id && range.contains(r.start_time))
                .cloned()
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn time_range_is_half_open() {
        let range = TimeRange {
            from: Some(datetime!(2025-01-01 00:00 UTC)),
            to: Some(datetime!(2025-01-02 00:00 UTC)),
        };
        assert!(range.contains(datetime!(2025-01-01 00:00 UTC)));
        assert!(range.contains(datetime!(2025-01-01 23:59 UTC)));
        assert!(!range.contains(datetime!(2025-01-02 00:00 UTC)));
        assert!(!range.contains(datetime!(2024-12-31 23:59 UTC)));
        assert!(TimeRange::all().contains(datetime!(1999-01-01 00:00 UTC)));
    }

    #[test]
    fn table_rejects_second_open_and_keeps_first() {
        let mut table = RecordTable::default();
        let first = table.open("1", datetime!(2025-01-01 10:00 UTC), 25.0, 80.0).unwrap();

        let err = table.open("1", datetime!(2025-01-01 10:05 UTC), 20.0, 70.0).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::DuplicateOpenActivation { ref unit_id } if unit_id == "1"
        ));

        let open: Vec<_> = table.records.iter().filter(|r| r.is_open()).collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, first.id);
    }

    #[test]
    fn table_clamps_negative_duration() {
        let mut table = RecordTable::default();
        table.open("1", datetime!(2025-01-01 10:00 UTC), 25.0, 80.0).unwrap();
        let closed = table.close("1", datetime!(2025-01-01 09:59 UTC)).unwrap();
        assert_eq!(closed.duration_seconds, Some(0.0));
    }

    #[test]
    fn history_is_sorted_and_restartable() {
        let mut table = RecordTable::default();
        for hour in [14, 9, 11] {
            let start = datetime!(2025-01-01 00:00 UTC) + time::Duration::hours(hour);
            table.open("1", start, 25.0, 80.0).unwrap();
            table.close("1", start + time::Duration::minutes(30));
        }

        let history = table.list("1", TimeRange::all());
        let first_pass: Vec<_> = history.iter().map(|r| r.start_time.hour()).collect();
        let second_pass: Vec<_> = (&history).into_iter().map(|r| r.start_time.hour()).collect();
        assert_eq!(first_pass, vec![9, 11, 14]);
        assert_eq!(first_pass, second_pass);
        assert_eq!(history.total_duration_seconds(), 3.0 * 1800.0);
    }
}
