/**
 * HIVE SIM - Capteurs simulés d'une ruche
 *
 * RÔLE : Publie une séquence scriptée de lectures température/humidité sur
 * les topics d'une ruche et journalise les commandes `air_pump` reçues en
 * retour, pour vérifier un kernel de bout en bout sur un vrai broker.
 *
 * CONFIG (env) : HIVE_SIM_NAMESPACE (obligatoire), HIVE_SIM_UNIT,
 * HIVE_SIM_BROKER, HIVE_SIM_PORT, HIVE_SIM_INTERVAL_SECS
 */

use anyhow::{anyhow, Context, Result};
use hive_kernel::models::ReadingKind;
use hive_kernel::topics::MonitoredUnit;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::env;
use tokio::task::JoinError;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const CLIENT_ID: &str = "hive-sim";

struct SimConfig {
    namespace: String,
    unit_id: String,
    broker: String,
    port: u16,
    interval: Duration,
}

impl SimConfig {
    fn from_env() -> Result<Self> {
        let namespace = env::var("HIVE_SIM_NAMESPACE").context("HIVE_SIM_NAMESPACE must be set")?;
        let port = match env::var("HIVE_SIM_PORT") {
            Ok(p) => p.parse().with_context(|| format!("invalid HIVE_SIM_PORT '{p}'"))?,
            Err(_) => 1883,
        };
        let interval_secs: u64 = match env::var("HIVE_SIM_INTERVAL_SECS") {
            Ok(s) => s.parse().with_context(|| format!("invalid HIVE_SIM_INTERVAL_SECS '{s}'"))?,
            Err(_) => 5,
        };
        Ok(Self {
            namespace,
            unit_id: env::var("HIVE_SIM_UNIT").unwrap_or_else(|_| "1".into()),
            broker: env::var("HIVE_SIM_BROKER").unwrap_or_else(|_| "test.mosquitto.org".into()),
            port,
            interval: Duration::from_secs(interval_secs),
        })
    }
}

/// Scénario : bande optimale, froid, retour, humidité haute, retour
fn scripted_readings() -> Vec<(ReadingKind, f64)> {
    use ReadingKind::{Humidity, Temperature};
    vec![
        (Temperature, 30.0),
        (Humidity, 80.0),
        (Temperature, 25.0),
        (Temperature, 27.5),
        (Humidity, 90.0),
        (Humidity, 82.0),
        (Temperature, 39.0),
        (Temperature, 33.0),
    ]
}

async fn run_script(client: AsyncClient, unit: MonitoredUnit, interval: Duration) -> Result<()> {
    for (kind, value) in scripted_readings() {
        let topic = unit.reading_topic(kind);
        client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, value.to_string())
            .await
            .with_context(|| format!("publish to {topic} failed"))?;
        info!(%topic, value, "reading sent");
        sleep(interval).await;
    }
    info!("script finished");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hive_sim=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = SimConfig::from_env()?;
    let unit = MonitoredUnit::new(cfg.unit_id.clone(), cfg.namespace.clone());
    info!(unit = %cfg.unit_id, broker = %cfg.broker, port = cfg.port, "starting hive simulator");

    let mut mqttoptions = MqttOptions::new(CLIENT_ID, &cfg.broker, cfg.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

    client.subscribe(unit.air_pump_topic(), QoS::AtLeastOnce).await?;

    let mut script = tokio::spawn(run_script(client.clone(), unit.clone(), cfg.interval));
    let mut script_done = false;
    let mut outcome = Ok(());
    let pump_topic = unit.air_pump_topic();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            // Script terminé : on continue d'écouter les dernières commandes
            joined = &mut script, if !script_done => {
                script_done = true;
                if let Err(e) = script_outcome(joined) {
                    error!("script failed: {e:#}");
                    outcome = Err(e);
                    break;
                }
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::Publish(p))) if p.topic == pump_topic => {
                    let command = String::from_utf8_lossy(&p.payload);
                    info!(unit = %cfg.unit_id, %command, "air pump command received");
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => debug!("connected"),
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {e}. Reconnecting...");
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    if !script_done {
        script.abort();
        if let Err(e) = script_outcome(script.await) {
            error!("script failed: {e:#}");
        }
    }
    if let Err(e) = client.disconnect().await {
        error!("disconnect failed: {e}");
    }
    outcome
}

/// Résultat du script ; une annulation (Ctrl-C) n'est pas une erreur
fn script_outcome(joined: Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(anyhow!("script task panicked: {e}")),
    }
}
