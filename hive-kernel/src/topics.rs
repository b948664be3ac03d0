//! Composition des noms de canaux MQTT d'un unit surveillé.
//!
//! Schéma : `{namespace}/moldPrevention/hive{unit_id}/{suffixe}` avec les
//! suffixes `temp`, `humidity` (consommés) et `air_pump` (produit).

use crate::models::ReadingKind;

const TEMP_SUFFIX: &str = "temp";
const HUMIDITY_SUFFIX: &str = "humidity";
const AIR_PUMP_SUFFIX: &str = "air_pump";

/// Une ruche et son espace de noms transport, immuable pour la vie du contrôleur
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredUnit {
    unit_id: String,
    namespace: String,
}

impl MonitoredUnit {
    pub fn new(unit_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            namespace: namespace.into(),
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    fn channel(&self, suffix: &str) -> String {
        format!("{}/moldPrevention/hive{}/{}", self.namespace, self.unit_id, suffix)
    }

    pub fn temperature_topic(&self) -> String {
        self.channel(TEMP_SUFFIX)
    }

    pub fn humidity_topic(&self) -> String {
        self.channel(HUMIDITY_SUFFIX)
    }

    pub fn air_pump_topic(&self) -> String {
        self.channel(AIR_PUMP_SUFFIX)
    }

    pub fn reading_topic(&self, kind: ReadingKind) -> String {
        match kind {
            ReadingKind::Temperature => self.temperature_topic(),
            ReadingKind::Humidity => self.humidity_topic(),
        }
    }

    /// Topics auxquels le contrôleur s'abonne pour ce unit
    pub fn subscriptions(&self) -> [String; 2] {
        [self.temperature_topic(), self.humidity_topic()]
    }

    /// Type de lecture porté par un topic entrant, `None` s'il n'appartient pas à ce unit
    pub fn classify(&self, topic: &str) -> Option<ReadingKind> {
        if topic == self.temperature_topic() {
            Some(ReadingKind::Temperature)
        } else if topic == self.humidity_topic() {
            Some(ReadingKind::Humidity)
        } else {
            None
        }
    }
}
