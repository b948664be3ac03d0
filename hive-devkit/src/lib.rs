/*!
# Hive DevKit - Stubs et Utilitaires pour le contrôleur de pompe

Bibliothèque facilitant les tests du kernel sans broker :
- Client MQTT simulé qui enregistre les commandes pompe publiées
- Construction des topics/payloads de lecture d'une ruche
- Harness qui monte un acteur de ruche complet (journal en mémoire)
*/

pub mod mqtt_stub;
pub mod test_utils;

pub use mqtt_stub::{HiveMessageBuilder, MockMessage, MockMqttClient};
pub use test_utils::{init_test_tracing, TestHarness};
