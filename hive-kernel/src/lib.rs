//! Hive Kernel - pilotage de la pompe à air d'une ruche.
//!
//! Boucle de contrôle : lectures température/humidité reçues par MQTT,
//! évaluation de la bande optimale, commande ON/OFF de la pompe, et journal
//! durable des intervalles d'activation (au plus un ouvert par ruche).

pub mod actor;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod health;
pub mod http;
pub mod ledger;
pub mod models;
pub mod mqtt;
pub mod publisher;
pub mod reading;
pub mod state;
pub mod thresholds;
pub mod topics;

pub use actor::{spawn_unit, ActorDeps, UnitEvent, UnitHandle};
pub use controller::{ControllerState, PumpController, Transition};
pub use ledger::{ActivationHistory, ActivationLedger, JsonFileLedger, MemoryLedger, TimeRange};
pub use models::{ActivationRecord, PumpState, Reading, ReadingKind, UnitSnapshot};
pub use publisher::{CommandPublisher, MqttCommandPublisher};
pub use thresholds::desired_state;
pub use topics::MonitoredUnit;
