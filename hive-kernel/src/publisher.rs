use crate::error::PublishError;
use crate::models::PumpState;
use crate::topics::MonitoredUnit;
use rumqttc::{AsyncClient, QoS};

/// Envoi de la commande pompe sur le canal `air_pump` d'un unit.
///
/// Non bloquant : l'implémentation met le message en file et rend la main,
/// la livraison (at-least-once) est l'affaire du transport.
pub trait CommandPublisher: Send + Sync {
    fn publish(&self, unit: &MonitoredUnit, state: PumpState) -> Result<(), PublishError>;
}

/// Publication via le client MQTT partagé
#[derive(Clone)]
pub struct MqttCommandPublisher {
    client: AsyncClient,
}

impl MqttCommandPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl CommandPublisher for MqttCommandPublisher {
    fn publish(&self, unit: &MonitoredUnit, state: PumpState) -> Result<(), PublishError> {
        self.client
            .try_publish(unit.air_pump_topic(), QoS::AtLeastOnce, false, state.as_payload())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::MqttOptions;

    #[tokio::test]
    async fn full_request_queue_surfaces_as_publish_error() {
        let opts = MqttOptions::new("hive-test", "localhost", 1883);
        let (client, _eventloop) = AsyncClient::new(opts, 1);
        let publisher = MqttCommandPublisher::new(client);
        let unit = MonitoredUnit::new("4", "ns");

        // Sans broker ni poll, la file (capacité 1) se remplit au premier envoi
        publisher.publish(&unit, PumpState::On).unwrap();
        let err = publisher.publish(&unit, PumpState::Off).unwrap_err();
        assert!(matches!(err, PublishError::Client(_)));
    }
}
