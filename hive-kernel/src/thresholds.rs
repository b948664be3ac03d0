//! Bande optimale température/humidité.
//!
//! Bornes inclusives côté OFF : une valeur exactement sur une borne n'active
//! jamais la pompe. Politique sans mémoire, recalculée à chaque paire complète.

use crate::models::PumpState;

pub const TEMPERATURE_MIN: f64 = 26.0;
pub const TEMPERATURE_MAX: f64 = 38.0;
pub const HUMIDITY_MIN: f64 = 76.5;
pub const HUMIDITY_MAX: f64 = 85.6;

/// État désiré de la pompe pour une paire (température °C, humidité %)
pub fn desired_state(temperature: f64, humidity: f64) -> PumpState {
    let out_of_band = temperature < TEMPERATURE_MIN
        || temperature > TEMPERATURE_MAX
        || humidity < HUMIDITY_MIN
        || humidity > HUMIDITY_MAX;

    if out_of_band {
        PumpState::On
    } else {
        PumpState::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_optimal() {
        assert_eq!(desired_state(26.0, 80.0), PumpState::Off);
        assert_eq!(desired_state(38.0, 80.0), PumpState::Off);
        assert_eq!(desired_state(30.0, 76.5), PumpState::Off);
        assert_eq!(desired_state(30.0, 85.6), PumpState::Off);
        assert_eq!(desired_state(26.0, 76.5), PumpState::Off);
        assert_eq!(desired_state(38.0, 85.6), PumpState::Off);
    }

    #[test]
    fn just_outside_any_bound_activates() {
        assert_eq!(desired_state(25.9, 80.0), PumpState::On);
        assert_eq!(desired_state(38.1, 80.0), PumpState::On);
        assert_eq!(desired_state(30.0, 76.4), PumpState::On);
        assert_eq!(desired_state(30.0, 85.7), PumpState::On);
    }

    #[test]
    fn matches_band_definition_over_a_grid() {
        let mut t = 20.0;
        while t <= 44.0 {
            let mut h = 70.0;
            while h <= 92.0 {
                let expected = t < 26.0 || t > 38.0 || h < 76.5 || h > 85.6;
                assert_eq!(desired_state(t, h) == PumpState::On, expected, "t={t} h={h}");
                h += 0.3;
            }
            t += 0.25;
        }
    }
}
