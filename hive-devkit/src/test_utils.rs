/*!
Harness de test pour le contrôleur de pompe

Monte de vrais acteurs de ruche (kernel) branchés sur le MockMqttClient et un
journal en mémoire. Les lectures passent par la même file que celles du
broker ; `settle()` attend qu'elles soient évaluées et journalisées.
*/

use crate::mqtt_stub::{HiveMessageBuilder, MockMqttClient};
use anyhow::{bail, Result};
use hive_kernel::actor::{spawn_unit, ActorDeps, UnitHandle};
use hive_kernel::health::HealthTracker;
use hive_kernel::ledger::{ActivationHistory, ActivationLedger, MemoryLedger, TimeRange};
use hive_kernel::models::{ActivationRecord, PumpState, ReadingKind, UnitBoard, UnitSnapshot};
use hive_kernel::state::{new_state, SharedBoard};
use hive_kernel::topics::MonitoredUnit;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const TEST_NAMESPACE: &str = "devkit";

/// Active les logs dans les tests (RUST_LOG), idempotent
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub struct TestHarness {
    pub mqtt_client: MockMqttClient,
    pub ledger: Arc<MemoryLedger>,
    pub board: SharedBoard,
    pub health: HealthTracker,
    units: HashMap<String, UnitHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl TestHarness {
    /// Harness avec une ruche "1"
    pub fn new() -> Self {
        Self::with_ledger(Arc::new(MemoryLedger::new())).with_unit("1")
    }

    /// Harness sans ruche, sur un journal fourni (pré-rempli éventuellement)
    pub fn with_ledger(ledger: Arc<MemoryLedger>) -> Self {
        init_test_tracing();
        Self {
            mqtt_client: MockMqttClient::new(),
            ledger,
            board: new_state(UnitBoard::new()),
            health: HealthTracker::new(),
            units: HashMap::new(),
            tasks: Vec::new(),
        }
    }

    /// Ajoute une ruche et démarre son acteur
    pub fn with_unit(mut self, unit_id: &str) -> Self {
        let deps = ActorDeps {
            publisher: Arc::new(self.mqtt_client.clone()),
            ledger: self.ledger.clone(),
            board: self.board.clone(),
            health: self.health.clone(),
        };
        let unit = MonitoredUnit::new(unit_id, TEST_NAMESPACE);
        for topic in unit.subscriptions() {
            self.mqtt_client.subscribe(topic);
        }
        let (handle, task) = spawn_unit(unit, deps);
        self.units.insert(unit_id.to_string(), handle);
        self.tasks.push(task);
        self
    }

    pub fn unit(&self, unit_id: &str) -> Result<&MonitoredUnit> {
        Ok(self.handle(unit_id)?.unit())
    }

    fn handle(&self, unit_id: &str) -> Result<&UnitHandle> {
        match self.units.get(unit_id) {
            Some(h) => Ok(h),
            None => bail!("unit '{unit_id}' not mounted in harness"),
        }
    }

    fn builder(&self, unit_id: &str) -> Result<HiveMessageBuilder> {
        Ok(HiveMessageBuilder::new(self.unit(unit_id)?.clone()))
    }

    fn deliver(&self, unit_id: &str, (topic, payload): (String, Vec<u8>)) -> Result<()> {
        if !self.handle(unit_id)?.deliver(topic.as_str(), payload) {
            bail!("actor for unit '{unit_id}' has stopped");
        }
        Ok(())
    }

    pub fn send_temperature(&self, unit_id: &str, value: f64) -> Result<()> {
        let msg = self.builder(unit_id)?.temperature(value);
        self.deliver(unit_id, msg)
    }

    pub fn send_humidity(&self, unit_id: &str, value: f64) -> Result<()> {
        let msg = self.builder(unit_id)?.humidity(value);
        self.deliver(unit_id, msg)
    }

    pub fn send_raw(&self, unit_id: &str, kind: ReadingKind, payload: &[u8]) -> Result<()> {
        let msg = self.builder(unit_id)?.raw(kind, payload);
        self.deliver(unit_id, msg)
    }

    /// Envoie une paire température puis humidité
    pub fn send_pair(&self, unit_id: &str, temperature: f64, humidity: f64) -> Result<()> {
        self.send_temperature(unit_id, temperature)?;
        self.send_humidity(unit_id, humidity)
    }

    /// Attend que toutes les ruches aient traité et journalisé ce qui a été envoyé
    pub async fn settle(&self) {
        for handle in self.units.values() {
            handle.sync().await;
        }
    }

    pub fn commands(&self, unit_id: &str) -> Result<Vec<String>> {
        Ok(self.mqtt_client.commands_for(self.unit(unit_id)?))
    }

    pub fn snapshot(&self, unit_id: &str) -> Option<UnitSnapshot> {
        self.board.lock().get(unit_id).cloned()
    }

    pub fn history(&self, unit_id: &str) -> Result<ActivationHistory> {
        Ok(self.ledger.list_activations(unit_id, TimeRange::all())?)
    }

    pub fn open_records(&self, unit_id: &str) -> Result<Vec<ActivationRecord>> {
        Ok(self.history(unit_id)?.into_iter().filter(|r| r.is_open()).collect())
    }

    pub fn assert_commands(&self, unit_id: &str, expected: &[&str]) -> Result<()> {
        let actual = self.commands(unit_id)?;
        if actual != expected {
            bail!("unit '{unit_id}' commands mismatch: expected {expected:?}, got {actual:?}");
        }
        info!(unit = unit_id, ?actual, "commands verified");
        Ok(())
    }

    pub fn assert_pump(&self, unit_id: &str, expected: PumpState) -> Result<()> {
        let Some(snap) = self.snapshot(unit_id) else {
            bail!("no snapshot for unit '{unit_id}'");
        };
        if snap.pump != expected {
            bail!("unit '{unit_id}' pump is {}, expected {expected}", snap.pump);
        }
        Ok(())
    }

    /// Au plus un enregistrement ouvert, et seulement si la pompe est ON
    pub fn assert_ledger_consistent(&self, unit_id: &str) -> Result<()> {
        let open = self.open_records(unit_id)?.len();
        if open > 1 {
            bail!("unit '{unit_id}' has {open} open activations");
        }
        let pump = self.snapshot(unit_id).map(|s| s.pump).unwrap_or_default();
        if (pump == PumpState::On) != (open == 1) {
            bail!("unit '{unit_id}' pump {pump} but {open} open activation(s)");
        }
        Ok(())
    }

    /// Ferme les files et attend la fin des acteurs et de leurs écritures
    pub async fn shutdown(mut self) -> Result<()> {
        self.units.clear();
        for task in self.tasks.drain(..) {
            task.await?;
        }
        Ok(())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
