/**
 * MACHINE D'ÉTAT POMPE - Cœur de décision, sans I/O
 *
 * RÔLE :
 * Replier chaque lecture dans le cache, évaluer la bande optimale, et
 * produire au plus une `Transition` quand l'état désiré diffère de l'état
 * courant. Les effets (publication MQTT, journal) sont exécutés par
 * l'acteur du unit, une fois par transition réelle.
 *
 * ÉTATS :
 * OFF (initial) --[hors bande]--> ON --[dans la bande]--> OFF
 */

use crate::models::{PumpState, Reading, UnitSnapshot};
use crate::reading::ReadingCache;
use crate::thresholds::desired_state;
use time::OffsetDateTime;

/// Effet à appliquer suite à un changement d'état
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// OFF -> ON : publier ON et ouvrir une activation
    Activated {
        at: OffsetDateTime,
        temperature: f64,
        humidity: f64,
    },
    /// ON -> OFF : publier OFF et clore l'activation ouverte
    Deactivated {
        at: OffsetDateTime,
        started_at: Option<OffsetDateTime>,
    },
}

impl Transition {
    pub fn command(&self) -> PumpState {
        match self {
            Transition::Activated { .. } => PumpState::On,
            Transition::Deactivated { .. } => PumpState::Off,
        }
    }
}

/// État mutable d'un unit, possédé exclusivement par son acteur
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    pub cache: ReadingCache,
    pub pump: PumpState,
    pub open_activation_start: Option<OffsetDateTime>,
}

#[derive(Debug)]
pub struct PumpController {
    unit_id: String,
    state: ControllerState,
}

impl PumpController {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            state: ControllerState::default(),
        }
    }

    pub fn unit_id(&self) -> &str {
        &self.unit_id
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Mise à jour du cache puis évaluation, en une seule étape
    pub fn handle(&mut self, reading: &Reading) -> Option<Transition> {
        self.state.cache.update(reading);

        // Cache incomplet : rien à décider
        let (temperature, humidity) = self.state.cache.pair()?;
        let desired = desired_state(temperature, humidity);
        if desired == self.state.pump {
            return None;
        }

        let at = reading.observed_at;
        self.state.pump = desired;
        let transition = match desired {
            PumpState::On => {
                self.state.open_activation_start = Some(at);
                Transition::Activated { at, temperature, humidity }
            }
            PumpState::Off => Transition::Deactivated {
                at,
                started_at: self.state.open_activation_start.take(),
            },
        };
        Some(transition)
    }

    pub fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            unit_id: self.unit_id.clone(),
            temperature: self.state.cache.temperature(),
            humidity: self.state.cache.humidity(),
            pump: self.state.pump,
            open_activation_start: self.state.open_activation_start,
            last_reading_at: self.state.cache.last_observed_at(),
        }
    }
}
