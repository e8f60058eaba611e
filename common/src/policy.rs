use crate::{config::ClimateThresholds, types::EnvironmentReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MistDirective {
    /// Leave any running dose alone.
    Keep,
    /// Start a computed dose (only emitted when no dose is active).
    Start,
    /// Force-stop any running dose.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub fan: bool,
    pub heater: bool,
    pub mist: MistDirective,
}

/// Banding rules for autonomous mode. The caller guarantees the reading is valid.
pub fn evaluate(
    reading: &EnvironmentReading,
    thresholds: &ClimateThresholds,
    mist_active: bool,
) -> PolicyDecision {
    let temp = reading.temperature_c;
    let humidity = reading.humidity_pct;
    let dry = humidity < thresholds.humidity_min_pct && !mist_active;

    if temp > thresholds.temp_max_c {
        return PolicyDecision {
            fan: true,
            heater: false,
            mist: if dry {
                MistDirective::Start
            } else {
                MistDirective::Keep
            },
        };
    }

    if temp < thresholds.temp_min_c {
        return PolicyDecision {
            fan: false,
            heater: true,
            mist: if dry {
                MistDirective::Start
            } else {
                MistDirective::Keep
            },
        };
    }

    if humidity > thresholds.humidity_max_pct {
        PolicyDecision {
            fan: true,
            heater: false,
            mist: MistDirective::Stop,
        }
    } else if dry {
        PolicyDecision {
            fan: false,
            heater: false,
            mist: MistDirective::Start,
        }
    } else {
        // Covers both the comfortable band and "dry but already dosing".
        PolicyDecision {
            fan: false,
            heater: false,
            mist: MistDirective::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temp: f32, humidity: f32) -> EnvironmentReading {
        EnvironmentReading::from_raw(temp, humidity)
    }

    #[test]
    fn hot_and_dry_runs_fan_and_requests_dose() {
        let decision = evaluate(&reading(32.0, 70.0), &ClimateThresholds::default(), false);

        assert_eq!(
            decision,
            PolicyDecision {
                fan: true,
                heater: false,
                mist: MistDirective::Start,
            }
        );
    }

    #[test]
    fn hot_and_dry_keeps_running_dose() {
        let decision = evaluate(&reading(32.0, 70.0), &ClimateThresholds::default(), true);
        assert_eq!(decision.mist, MistDirective::Keep);
    }

    #[test]
    fn cold_runs_heater_without_touching_humid_dose() {
        let decision = evaluate(&reading(20.0, 90.0), &ClimateThresholds::default(), true);

        assert!(decision.heater);
        assert!(!decision.fan);
        assert_eq!(decision.mist, MistDirective::Keep);
    }

    #[test]
    fn in_band_humid_vents_and_stops_dose() {
        let decision = evaluate(&reading(29.0, 90.0), &ClimateThresholds::default(), true);

        assert!(decision.fan);
        assert!(!decision.heater);
        assert_eq!(decision.mist, MistDirective::Stop);
    }

    #[test]
    fn in_band_dry_requests_dose_with_fan_off() {
        let decision = evaluate(&reading(29.0, 60.0), &ClimateThresholds::default(), false);

        assert!(!decision.fan);
        assert_eq!(decision.mist, MistDirective::Start);
    }

    #[test]
    fn in_band_dry_while_dosing_falls_through_to_stop() {
        let decision = evaluate(&reading(29.0, 60.0), &ClimateThresholds::default(), true);
        assert_eq!(decision.mist, MistDirective::Stop);
    }

    #[test]
    fn band_edges_are_exclusive() {
        let t = ClimateThresholds::default();

        let at_max = evaluate(&reading(31.0, 80.0), &t, false);
        assert!(!at_max.fan && !at_max.heater);

        let at_min = evaluate(&reading(27.0, 75.0), &t, false);
        assert!(!at_min.heater);
        assert_eq!(at_min.mist, MistDirective::Stop);
    }
}
