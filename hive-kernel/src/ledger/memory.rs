use super::{ActivationHistory, ActivationLedger, RecordTable, TimeRange};
use crate::error::LedgerError;
use crate::models::ActivationRecord;
use parking_lot::Mutex;
use time::OffsetDateTime;

/// Journal en mémoire, perdu à l'arrêt du process
#[derive(Debug, Default)]
pub struct MemoryLedger {
    table: Mutex<RecordTable>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre d'activations ouvertes pour un unit (au plus 1)
    pub fn open_count(&self, unit_id: &str) -> usize {
        self.table
            .lock()
            .records
            .iter()
            .filter(|r| r.unit_id == unit_id && r.is_open())
            .count()
    }
}

impl ActivationLedger for MemoryLedger {
    fn open_activation(
        &self,
        unit_id: &str,
        start_time: OffsetDateTime,
        temperature: f64,
        humidity: f64,
    ) -> Result<ActivationRecord, LedgerError> {
        self.table.lock().open(unit_id, start_time, temperature, humidity)
    }

    fn close_open_activation(
        &self,
        unit_id: &str,
        end_time: OffsetDateTime,
    ) -> Result<Option<ActivationRecord>, LedgerError> {
        Ok(self.table.lock().close(unit_id, end_time))
    }

    fn list_activations(
        &self,
        unit_id: &str,
        range: TimeRange,
    ) -> Result<ActivationHistory, LedgerError> {
        Ok(self.table.lock().list(unit_id, range))
    }
}
