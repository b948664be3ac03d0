/*!
Mock MQTT Client pour développement sans broker

Se branche à la place du publisher MQTT d'un acteur de ruche : enregistre
chaque commande pompe et chaque abonnement pour les assertions de tests.
Peut aussi simuler un transport saturé (échec de publication).
*/

use hive_kernel::error::PublishError;
use hive_kernel::models::{PumpState, ReadingKind};
use hive_kernel::publisher::CommandPublisher;
use hive_kernel::topics::MonitoredUnit;
use parking_lot::Mutex;
use rumqttc::QoS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl MockMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// Mock MQTT Client qui simule le client partagé du kernel
#[derive(Clone, Default)]
pub struct MockMqttClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    failing: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toutes les publications suivantes échouent (file pleine côté transport)
    pub fn fail_publishes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Simule l'abonnement à un topic
    pub fn subscribe(&self, topic: impl Into<String>) {
        let topic = topic.into();
        info!(%topic, "[MOCK] subscribed");
        self.subscriptions.lock().push(topic);
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().clone()
    }

    /// Récupère les abonnements (pour assertions de tests)
    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    /// Trouve les messages publiés sur un topic donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Séquence des commandes envoyées à une ruche, dans l'ordre
    pub fn commands_for(&self, unit: &MonitoredUnit) -> Vec<String> {
        self.find_messages_by_topic(&unit.air_pump_topic())
            .iter()
            .map(|m| m.payload_str().to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.published_messages.lock().clear();
        self.subscriptions.lock().clear();
    }
}

impl CommandPublisher for MockMqttClient {
    fn publish(&self, unit: &MonitoredUnit, state: PumpState) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Client("mock request queue full".into()));
        }
        let message = MockMessage {
            topic: unit.air_pump_topic(),
            payload: state.as_payload().as_bytes().to_vec(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };
        info!(topic = %message.topic, command = %state, "[MOCK] published");
        self.published_messages.lock().push(message);
        Ok(())
    }
}

/// Construction des messages de lecture tels que les capteurs les publient
#[derive(Debug, Clone)]
pub struct HiveMessageBuilder {
    unit: MonitoredUnit,
}

impl HiveMessageBuilder {
    pub fn new(unit: MonitoredUnit) -> Self {
        Self { unit }
    }

    pub fn reading(&self, kind: ReadingKind, value: f64) -> (String, Vec<u8>) {
        (self.unit.reading_topic(kind), value.to_string().into_bytes())
    }

    pub fn temperature(&self, value: f64) -> (String, Vec<u8>) {
        self.reading(ReadingKind::Temperature, value)
    }

    pub fn humidity(&self, value: f64) -> (String, Vec<u8>) {
        self.reading(ReadingKind::Humidity, value)
    }

    /// Payload arbitraire sur un canal de lecture (tests de rejet)
    pub fn raw(&self, kind: ReadingKind, payload: &[u8]) -> (String, Vec<u8>) {
        (self.unit.reading_topic(kind), payload.to_vec())
    }
}
