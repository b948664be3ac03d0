/**
 * ACTEUR PAR UNIT - Traitement sériel des lectures d'une ruche
 *
 * RÔLE :
 * Une file entrante par unit, un seul consommateur qui applique
 * décodage -> cache -> évaluation -> transition comme une étape atomique.
 * Aucune lecture du même unit n'est traitée pendant qu'une autre est évaluée.
 *
 * EFFETS :
 * - Commande pompe : publiée immédiatement (non bloquant, priorité sécurité)
 * - Journal : confié à une tâche d'écriture dédiée, dans l'ordre des
 *   transitions, pour que l'acteur n'attende jamais le disque
 * - Snapshot : posté sur le tableau partagé après chaque événement
 *
 * ARRÊT :
 * Fermer la file (drop des handles) draine l'acteur, puis la tâche
 * d'écriture termine les opérations en attente.
 */

use crate::controller::{PumpController, Transition};
use crate::health::HealthTracker;
use crate::ledger::ActivationLedger;
use crate::publisher::CommandPublisher;
use crate::reading::decode_reading;
use crate::state::{post_snapshot, SharedBoard};
use crate::topics::MonitoredUnit;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Événement entrant d'un acteur
#[derive(Debug)]
pub enum UnitEvent {
    /// Payload brut reçu sur un des canaux du unit
    Message {
        topic: String,
        payload: Vec<u8>,
        received_at: OffsetDateTime,
    },
    /// Répond une fois tous les événements précédents appliqués, journal compris
    Sync(oneshot::Sender<()>),
}

#[derive(Debug)]
enum LedgerOp {
    Open {
        at: OffsetDateTime,
        temperature: f64,
        humidity: f64,
    },
    Close {
        at: OffsetDateTime,
    },
    Sync(oneshot::Sender<()>),
}

/// Côté émetteur de la file d'un unit, clonable
#[derive(Debug, Clone)]
pub struct UnitHandle {
    unit: MonitoredUnit,
    tx: mpsc::UnboundedSender<UnitEvent>,
}

impl UnitHandle {
    pub fn unit(&self) -> &MonitoredUnit {
        &self.unit
    }

    /// Dépose un payload brut horodaté à l'arrivée. Faux si l'acteur est arrêté.
    pub fn deliver(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> bool {
        self.tx
            .send(UnitEvent::Message {
                topic: topic.into(),
                payload: payload.into(),
                received_at: OffsetDateTime::now_utc(),
            })
            .is_ok()
    }

    /// Attend que tout ce qui a été déposé avant soit traité et journalisé
    pub async fn sync(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(UnitEvent::Sync(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Dépendances partagées injectées dans chaque acteur
#[derive(Clone)]
pub struct ActorDeps {
    pub publisher: Arc<dyn CommandPublisher>,
    pub ledger: Arc<dyn ActivationLedger>,
    pub board: SharedBoard,
    pub health: HealthTracker,
}

struct UnitActor {
    unit: MonitoredUnit,
    controller: PumpController,
    publisher: Arc<dyn CommandPublisher>,
    ledger_tx: mpsc::UnboundedSender<LedgerOp>,
    board: SharedBoard,
    health: HealthTracker,
}

/// Démarre l'acteur d'un unit et sa tâche d'écriture journal
pub fn spawn_unit(unit: MonitoredUnit, deps: ActorDeps) -> (UnitHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ledger_tx, ledger_rx) = mpsc::unbounded_channel();

    let writer = tokio::spawn(run_ledger_writer(
        unit.unit_id().to_string(),
        deps.ledger,
        ledger_rx,
        deps.health.clone(),
    ));

    let actor = UnitActor {
        controller: PumpController::new(unit.unit_id()),
        unit: unit.clone(),
        publisher: deps.publisher,
        ledger_tx,
        board: deps.board,
        health: deps.health,
    };
    post_snapshot(&actor.board, actor.controller.snapshot());

    let task = tokio::spawn(async move {
        actor.run(rx).await;
        if let Err(e) = writer.await {
            error!("ledger writer task failed: {e}");
        }
    });

    (UnitHandle { unit, tx }, task)
}

impl UnitActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<UnitEvent>) {
        info!(unit = %self.unit.unit_id(), "unit actor started");
        while let Some(event) = rx.recv().await {
            match event {
                UnitEvent::Message { topic, payload, received_at } => {
                    self.on_message(&topic, &payload, received_at);
                }
                UnitEvent::Sync(done) => {
                    // Le journal répond quand ses écritures précédentes sont faites
                    let _ = self.ledger_tx.send(LedgerOp::Sync(done));
                }
            }
        }
        info!(unit = %self.unit.unit_id(), "unit actor stopped");
        // drop(self) ferme ledger_tx : la tâche d'écriture draine puis s'arrête
    }

    fn on_message(&mut self, topic: &str, payload: &[u8], received_at: OffsetDateTime) {
        let Some(kind) = self.unit.classify(topic) else {
            debug!(unit = %self.unit.unit_id(), topic, "ignoring foreign topic");
            return;
        };

        let reading = match decode_reading(topic, kind, payload, received_at) {
            Ok(r) => r,
            Err(e) => {
                warn!(unit = %self.unit.unit_id(), "{e}");
                self.health.record_rejected_payload();
                return;
            }
        };
        self.health.record_reading();
        debug!(unit = %self.unit.unit_id(), ?kind, value = reading.value, "reading accepted");

        if let Some(transition) = self.controller.handle(&reading) {
            self.apply(transition);
        }
        post_snapshot(&self.board, self.controller.snapshot());
    }

    fn apply(&mut self, transition: Transition) {
        let command = transition.command();
        self.health.record_transition();

        match transition {
            Transition::Activated { temperature, humidity, .. } => {
                info!(unit = %self.unit.unit_id(), temperature, humidity, "air pump -> ON");
            }
            Transition::Deactivated { started_at, at } => {
                let on_for = started_at.map(|s| (at - s).whole_seconds());
                info!(unit = %self.unit.unit_id(), on_for_secs = ?on_for, "air pump -> OFF");
            }
        }

        // La commande part même si le journal échoue ensuite
        if let Err(e) = self.publisher.publish(&self.unit, command) {
            error!(unit = %self.unit.unit_id(), %command, "failed to publish pump command: {e}");
        }

        let op = match transition {
            Transition::Activated {
                at,
                temperature,
                humidity,
            } => LedgerOp::Open {
                at,
                temperature,
                humidity,
            },
            Transition::Deactivated { at, .. } => LedgerOp::Close { at },
        };
        if self.ledger_tx.send(op).is_err() {
            error!(unit = %self.unit.unit_id(), "ledger writer is gone, activation not recorded");
            self.health.record_ledger_failure();
        }
    }
}

async fn run_ledger_writer(
    unit_id: String,
    ledger: Arc<dyn ActivationLedger>,
    mut rx: mpsc::UnboundedReceiver<LedgerOp>,
    health: HealthTracker,
) {
    while let Some(op) = rx.recv().await {
        let op = match op {
            LedgerOp::Sync(done) => {
                let _ = done.send(());
                continue;
            }
            op => op,
        };

        let ledger = ledger.clone();
        let id = unit_id.clone();
        let outcome = tokio::task::spawn_blocking(move || match op {
            LedgerOp::Open { at, temperature, humidity } => {
                ledger.open_activation(&id, at, temperature, humidity).map(|_| ())
            }
            LedgerOp::Close { at } => ledger.close_open_activation(&id, at).map(|closed| {
                if closed.is_none() {
                    debug!(unit = %id, "no open activation to close");
                }
            }),
            LedgerOp::Sync(_) => Ok(()),
        })
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_persistence_failure() => {
                error!(unit = %unit_id, "persistence failure: {e}");
                health.record_ledger_failure();
            }
            Ok(Err(e)) => {
                warn!(unit = %unit_id, "{e}, keeping existing record");
            }
            Err(e) => {
                error!(unit = %unit_id, "ledger task panicked: {e}");
                health.record_ledger_failure();
            }
        }
    }
}
