/**
 * TRANSPORT MQTT - Adaptateur entre le broker et les acteurs de unit
 *
 * RÔLE :
 * - Connexion initiale avec attente du premier ConnAck (échec = ConnectError)
 * - Table de routage topic -> acteur construite une seule fois
 * - (Ré)abonnement à chaque ConnAck : les appels répétés ne dupliquent
 *   jamais le routage
 * - Boucle de poll : chaque publish entrant est déposé tel quel dans la file
 *   de l'acteur propriétaire, le décodage se fait côté acteur
 *
 * RECONNEXION :
 * Laissée à rumqttc (on continue de poller après une erreur, avec pause).
 */

use crate::actor::UnitHandle;
use crate::config::MqttConf;
use crate::credentials::Namespace;
use crate::error::ConnectError;
use crate::health::HealthTracker;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Incoming, MqttOptions,
    Outgoing, QoS,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

const RECONNECT_PAUSE: Duration = Duration::from_secs(2);

pub fn mqtt_options(cfg: &MqttConf, ns: &Namespace) -> MqttOptions {
    let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
    opts.set_clean_session(true);

    // Identifiants explicites de la config, sinon ceux de l'annuaire
    let username = cfg.username.clone().or_else(|| ns.mqtt_username.clone());
    let password = cfg.password.clone().or_else(|| ns.mqtt_password.clone());
    if let Some(user) = username {
        opts.set_credentials(user, password.unwrap_or_default());
    }
    opts
}

/// Taille de la file de requêtes du client : abonnements + commandes en vol
pub fn request_capacity(units: usize) -> usize {
    (units * 4).max(10)
}

/// Ouvre la connexion et attend le premier ConnAck
pub async fn connect(
    cfg: &MqttConf,
    ns: &Namespace,
    capacity: usize,
) -> Result<(AsyncClient, EventLoop), ConnectError> {
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(cfg, ns), capacity);
    let secs = cfg.connect_timeout_secs;

    let handshake = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(ConnectError::Refused(format!("{code:?}"))),
                    };
                }
                Ok(_) => continue,
                Err(ConnectionError::ConnectionRefused(code)) => {
                    return Err(ConnectError::Refused(format!("{code:?}")));
                }
                Err(e) => return Err(ConnectError::Transport(e.to_string())),
            }
        }
    };

    match tokio::time::timeout(Duration::from_secs(secs), handshake).await {
        Ok(Ok(())) => {
            info!(host = %cfg.host, port = cfg.port, "connected to MQTT broker");
            Ok((client, eventloop))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ConnectError::Timeout {
            host: cfg.host.clone(),
            port: cfg.port,
            secs,
        }),
    }
}

/// Routage des topics de lecture vers les acteurs
#[derive(Debug, Default)]
pub struct TopicRouter {
    routes: HashMap<String, UnitHandle>,
}

impl TopicRouter {
    pub fn new(handles: &[UnitHandle]) -> Self {
        let mut routes = HashMap::new();
        for handle in handles {
            for topic in handle.unit().subscriptions() {
                routes.insert(topic, handle.clone());
            }
        }
        Self { routes }
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Dépose le payload chez l'acteur propriétaire ; faux si topic inconnu ou acteur arrêté
    pub fn route(&self, topic: &str, payload: &[u8]) -> bool {
        match self.routes.get(topic) {
            Some(handle) => handle.deliver(topic, payload),
            None => false,
        }
    }

    /// Abonne le client à tous les topics routés, retourne le nombre de demandes mises en file
    pub fn subscribe_all(&self, client: &AsyncClient) -> usize {
        let mut queued = 0;
        for topic in self.topics() {
            match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                Ok(()) => queued += 1,
                Err(e) => warn!(%topic, "subscribe failed: {e}"),
            }
        }
        info!(queued, "subscriptions requested");
        queued
    }
}

/// Boucle de poll ; rend l'EventLoop à l'arrêt pour que l'appelant puisse
/// vider les commandes en attente avant de se déconnecter
pub fn spawn_mqtt_listener(
    mut eventloop: EventLoop,
    client: AsyncClient,
    router: Arc<TopicRouter>,
    health: HealthTracker,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<EventLoop> {
    health.mark_mqtt_connected();
    task::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("MQTT (re)connected");
                        health.mark_mqtt_connected();
                        router.subscribe_all(&client);
                    }
                    Ok(Event::Incoming(Incoming::Publish(p))) => {
                        if !router.route(&p.topic, &p.payload) {
                            debug!(topic = %p.topic, "publish without live route");
                        }
                    }
                    Ok(Event::Incoming(Incoming::Disconnect)) => {
                        health.mark_mqtt_disconnected();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT error: {e}");
                        health.increment_reconnects();
                        tokio::time::sleep(RECONNECT_PAUSE).await;
                    }
                }
            }
        }
        debug!("MQTT listener stopped");
        eventloop
    })
}

/// Envoie DISCONNECT après les requêtes déjà en file, borné par `grace`
pub async fn disconnect(
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    health: &HealthTracker,
    grace: Duration,
) {
    if let Err(e) = client.try_disconnect() {
        warn!("could not queue MQTT disconnect: {e}");
        return;
    }

    let flushed = tokio::time::timeout(grace, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    })
    .await;

    if flushed.is_err() {
        warn!("MQTT disconnect not acknowledged within {grace:?}");
    }
    health.mark_mqtt_disconnected();
    info!("MQTT connection closed");
}
