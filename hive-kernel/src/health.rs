use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct ControllerHealth {
    pub uptime_seconds: u64,
    pub units_tracked: u32,
    pub mqtt_status: String,
    pub mqtt_reconnects: u64,
    pub readings_accepted: u64,
    pub payloads_rejected: u64,
    pub transitions: u64,
    pub ledger_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    reconnects: AtomicU64,
    readings_accepted: AtomicU64,
    payloads_rejected: AtomicU64,
    transitions: AtomicU64,
    ledger_failures: AtomicU64,
}

/// Compteurs partagés entre transport, acteurs et API
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
    mqtt_status: Arc<Mutex<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
            mqtt_status: Arc::new(Mutex::new("connecting".to_string())),
        }
    }

    pub fn mark_mqtt_connected(&self) {
        *self.mqtt_status.lock() = "connected".to_string();
    }

    pub fn mark_mqtt_disconnected(&self) {
        *self.mqtt_status.lock() = "disconnected".to_string();
    }

    pub fn increment_reconnects(&self) {
        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
        *self.mqtt_status.lock() = "reconnecting".to_string();
    }

    pub fn record_reading(&self) {
        self.counters.readings_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_payload(&self) {
        self.counters.payloads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.counters.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ledger_failure(&self) {
        self.counters.ledger_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_status(&self) -> String {
        self.mqtt_status.lock().clone()
    }

    pub fn get_health(&self, units_tracked: usize) -> ControllerHealth {
        let c = &self.counters;
        ControllerHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            units_tracked: units_tracked as u32,
            mqtt_status: self.mqtt_status(),
            mqtt_reconnects: c.reconnects.load(Ordering::Relaxed),
            readings_accepted: c.readings_accepted.load(Ordering::Relaxed),
            payloads_rejected: c.payloads_rejected.load(Ordering::Relaxed),
            transitions: c.transitions.load(Ordering::Relaxed),
            ledger_failures: c.ledger_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
