use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;

/// État commandé de la pompe à air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PumpState {
    On,
    #[default]
    Off,
}

impl PumpState {
    /// Payload littéral publié sur le canal `air_pump`
    pub fn as_payload(self) -> &'static str {
        match self {
            PumpState::On => "ON",
            PumpState::Off => "OFF",
        }
    }
}

impl fmt::Display for PumpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_payload())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingKind {
    Temperature,
    Humidity,
}

/// Échantillon typé sorti du décodeur, jamais persisté tel quel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub kind: ReadingKind,
    pub value: f64,
    pub observed_at: OffsetDateTime,
}

/// Intervalle pendant lequel la pompe a été commandée ON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub id: String,
    pub unit_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub temperature_at_start: f64,
    pub humidity_at_start: f64,
}

impl ActivationRecord {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Vue d'un unit pour les collaborateurs de reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub unit_id: String,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pump: PumpState,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub open_activation_start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_reading_at: Option<OffsetDateTime>,
}

pub type UnitBoard = HashMap<String, UnitSnapshot>;
