/**
 * HIVE KERNEL - Point d'entrée du contrôleur de pompe à air
 *
 * RÔLE : Bootstrap config -> espace de noms -> journal -> MQTT -> acteurs -> API.
 * Seul l'échec de connexion au broker au démarrage est fatal.
 *
 * ARRÊT : SIGINT/SIGTERM -> arrêt HTTP, arrêt du poll MQTT, drain des acteurs
 * et de leurs écritures, envoi des commandes restantes, DISCONNECT, flush du journal.
 */

use anyhow::{Context, Result};
use hive_kernel::actor::{spawn_unit, ActorDeps};
use hive_kernel::config::{load_config, KernelConfig};
use hive_kernel::health::HealthTracker;
use hive_kernel::http::{build_router, AppState};
use hive_kernel::ledger::{ActivationLedger, JsonFileLedger, MemoryLedger};
use hive_kernel::models::UnitBoard;
use hive_kernel::mqtt::{self, TopicRouter};
use hive_kernel::publisher::MqttCommandPublisher;
use hive_kernel::state::new_state;
use hive_kernel::topics::MonitoredUnit;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn open_ledger(cfg: &KernelConfig) -> Result<Arc<dyn ActivationLedger>> {
    match &cfg.ledger.path {
        Some(path) => {
            let ledger = JsonFileLedger::open(path).with_context(|| {
                format!("failed to open activation ledger at {}", path.display())
            })?;
            Ok(Arc::new(ledger))
        }
        None => {
            warn!("no ledger path configured, activations are kept in memory only");
            Ok(Arc::new(MemoryLedger::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("termination signal received, shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hive_kernel=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = load_config().await;
    let namespace = cfg
        .namespace
        .resolver()
        .resolve()
        .context("failed to resolve transport namespace")?;
    let ledger = open_ledger(&cfg)?;
    let health = HealthTracker::new();
    let board = new_state(UnitBoard::new());
    // Bind avant la connexion broker : aucun échec possible une fois les ressources ouvertes
    let listener = TcpListener::bind(cfg.http.bind.as_str())
        .await
        .with_context(|| format!("failed to bind {}", cfg.http.bind))?;

    let capacity = mqtt::request_capacity(cfg.units.len());
    let (client, eventloop) = mqtt::connect(&cfg.mqtt, &namespace, capacity)
        .await
        .context("MQTT broker unreachable")?;

    // Un acteur par ruche, journal et client partagés
    let deps = ActorDeps {
        publisher: Arc::new(MqttCommandPublisher::new(client.clone())),
        ledger: ledger.clone(),
        board: board.clone(),
        health: health.clone(),
    };
    let mut handles = Vec::new();
    let mut actor_tasks = Vec::new();
    for unit_cfg in &cfg.units {
        let unit = MonitoredUnit::new(unit_cfg.unit_id.clone(), namespace.token.clone());
        let (handle, task) = spawn_unit(unit, deps.clone());
        handles.push(handle);
        actor_tasks.push(task);
    }
    info!(units = handles.len(), "unit actors started");

    let router = Arc::new(TopicRouter::new(&handles));
    drop(handles);
    router.subscribe_all(&client);

    let (stop_tx, stop_rx) = watch::channel(false);
    let listener_task = mqtt::spawn_mqtt_listener(
        eventloop,
        client.clone(),
        router.clone(),
        health.clone(),
        stop_rx.clone(),
    );

    // API de reporting
    let app = build_router(AppState {
        board: board.clone(),
        ledger: ledger.clone(),
        health: health.clone(),
    });
    info!("reporting API listening on http://{}", cfg.http.bind);
    let mut http_stop = stop_rx;
    let http_task = tokio::spawn(async move {
        let graceful = async move {
            let _ = http_stop.wait_for(|stop| *stop).await;
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(graceful).await {
            error!("reporting API failed: {e}");
        }
    });

    shutdown_signal().await;
    let _ = stop_tx.send(true);

    if let Err(e) = http_task.await {
        error!("reporting API task failed: {e}");
    }
    let mut eventloop = listener_task.await.context("MQTT listener task failed")?;

    // Plus aucune route : les files se ferment et les acteurs se vident
    drop(router);
    for task in actor_tasks {
        if let Err(e) = task.await {
            error!("unit actor failed: {e}");
        }
    }

    mqtt::disconnect(&client, &mut eventloop, &health, Duration::from_secs(3)).await;

    if let Err(e) = ledger.flush() {
        error!("final ledger flush failed: {e}");
    }
    info!("hive kernel stopped");
    Ok(())
}
