use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Autonomous,
    Manual,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Autonomous => "AUTO",
            Self::Manual => "MANUAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actuator {
    Fog,
    Fan,
    Heater,
    Indicator,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [Self::Fog, Self::Fan, Self::Heater, Self::Indicator];

    pub fn label(self) -> &'static str {
        match self {
            Self::Fog => "FOG",
            Self::Fan => "FAN",
            Self::Heater => "HEATER",
            Self::Indicator => "LED",
        }
    }

    /// Key stem used by the direct-chain protocol; the floor number is appended.
    pub fn key_stem(self) -> &'static str {
        match self {
            Self::Fog => "fog",
            Self::Fan => "fan",
            Self::Heater => "heater",
            Self::Indicator => "led",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub valid: bool,
}

impl EnvironmentReading {
    /// Builds a reading from raw driver output; a NaN in either channel marks it invalid.
    pub fn from_raw(temperature_c: f32, humidity_pct: f32) -> Self {
        Self {
            temperature_c,
            humidity_pct,
            valid: !temperature_c.is_nan() && !humidity_pct.is_nan(),
        }
    }

    pub fn invalid() -> Self {
        Self::from_raw(f32::NAN, f32::NAN)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorState {
    pub fog: bool,
    pub fan: bool,
    pub heater: bool,
    pub indicator: bool,
}

impl ActuatorState {
    pub fn get(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Fog => self.fog,
            Actuator::Fan => self.fan,
            Actuator::Heater => self.heater,
            Actuator::Indicator => self.indicator,
        }
    }

    pub fn set(&mut self, actuator: Actuator, on: bool) {
        match actuator {
            Actuator::Fog => self.fog = on,
            Actuator::Fan => self.fan = on,
            Actuator::Heater => self.heater = on,
            Actuator::Indicator => self.indicator = on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub floor: u8,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            id: "ESP002".to_string(),
            display_name: "Tang 2".to_string(),
            floor: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub id: String,
    pub name: String,
    pub floor: u8,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub fog: bool,
    pub fan: bool,
    pub heater: bool,
    pub indicator: bool,
}

impl StatusMessage {
    pub fn snapshot(
        identity: &NodeIdentity,
        temperature_c: f32,
        humidity_pct: f32,
        actuators: &ActuatorState,
    ) -> Self {
        Self {
            id: identity.id.clone(),
            name: identity.display_name.clone(),
            floor: identity.floor,
            temperature_c,
            humidity_pct,
            fog: actuators.fog,
            fan: actuators.fan,
            heater: actuators.heater,
            indicator: actuators.indicator,
        }
    }

    pub fn actuators(&self) -> ActuatorState {
        ActuatorState {
            fog: self.fog,
            fan: self.fan,
            heater: self.heater,
            indicator: self.indicator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMessage {
    pub target: Actuator,
    pub value: bool,
}

/// Side effects requested by the core; executors apply them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeAction {
    SetOutput(Actuator, bool),
    SendLine(String),
    ModeChanged(ControlMode),
    Restart { grace_ms: u64 },
}

/// Millisecond tick elapsed since `since`, safe across counter wraparound.
pub fn elapsed_ms(now_ms: u32, since_ms: u32) -> u32 {
    now_ms.wrapping_sub(since_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_channel_marks_reading_invalid() {
        assert!(EnvironmentReading::from_raw(25.0, 80.0).valid);
        assert!(!EnvironmentReading::from_raw(f32::NAN, 80.0).valid);
        assert!(!EnvironmentReading::from_raw(25.0, f32::NAN).valid);
    }

    #[test]
    fn elapsed_survives_wraparound() {
        assert_eq!(elapsed_ms(10, u32::MAX - 9), 20);
        assert_eq!(elapsed_ms(5_000, 1_000), 4_000);
    }
}
