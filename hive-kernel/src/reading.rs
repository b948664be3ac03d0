/**
 * READINGS - Décodage des payloads capteurs et cache des dernières valeurs
 *
 * RÔLE :
 * Isoler le reste du pipeline de la représentation fil : un payload brut
 * (nombre décimal UTF-8, sans enveloppe) devient un `Reading` typé ou une
 * `ParseError`.
 *
 * CACHE :
 * Dernière valeur gagnante, sans moyenne ni contrôle d'ordre temporel.
 * Complet dès que température ET humidité ont été vues une fois.
 */

use crate::error::ParseError;
use crate::models::{Reading, ReadingKind};
use time::OffsetDateTime;

/// Décode un payload brut reçu sur `topic`
pub fn decode_reading(
    topic: &str,
    kind: ReadingKind,
    payload: &[u8],
    observed_at: OffsetDateTime,
) -> Result<Reading, ParseError> {
    let fail = |reason: String| ParseError {
        topic: topic.to_string(),
        payload: String::from_utf8_lossy(payload).into_owned(),
        reason,
    };

    let text = std::str::from_utf8(payload).map_err(|e| fail(e.to_string()))?;
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|e: std::num::ParseFloatError| fail(e.to_string()))?;
    // "NaN" et "inf" passent le parseur mais ne sont pas des mesures
    if !value.is_finite() {
        return Err(fail("non-finite value".into()));
    }

    Ok(Reading { kind, value, observed_at })
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadingCache {
    temperature: Option<f64>,
    humidity: Option<f64>,
    last_observed_at: Option<OffsetDateTime>,
}

impl ReadingCache {
    pub fn update(&mut self, reading: &Reading) {
        match reading.kind {
            ReadingKind::Temperature => self.temperature = Some(reading.value),
            ReadingKind::Humidity => self.humidity = Some(reading.value),
        }
        self.last_observed_at = Some(reading.observed_at);
    }

    pub fn is_complete(&self) -> bool {
        self.temperature.is_some() && self.humidity.is_some()
    }

    /// Paire (température, humidité) si le cache est complet
    pub fn pair(&self) -> Option<(f64, f64)> {
        Some((self.temperature?, self.humidity?))
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity
    }

    pub fn last_observed_at(&self) -> Option<OffsetDateTime> {
        self.last_observed_at
    }
}
