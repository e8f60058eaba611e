use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::NodeIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// `#`-delimited key/value commands on a direct UART chain.
    Chain,
    /// `:`-delimited fixed-position commands through a radio bridge.
    Bridge,
}

impl ProtocolVariant {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "chain" | "a" => Some(Self::Chain),
            "bridge" | "b" => Some(Self::Bridge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateThresholds {
    pub temp_min_c: f32,
    pub temp_max_c: f32,
    pub humidity_min_pct: f32,
    pub humidity_max_pct: f32,
}

impl Default for ClimateThresholds {
    fn default() -> Self {
        Self {
            temp_min_c: 27.0,
            temp_max_c: 31.0,
            humidity_min_pct: 75.0,
            humidity_max_pct: 85.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConstants {
    pub volume_m3: f32,
    /// Mist output in the same volume unit per minute.
    pub mist_flow_rate: f32,
    pub evaporation_factor: f32,
}

impl Default for RoomConstants {
    fn default() -> Self {
        Self {
            volume_m3: 12.0,
            mist_flow_rate: 36.0,
            evaporation_factor: 0.07,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub identity: NodeIdentity,
    pub variant: ProtocolVariant,
    pub thresholds: ClimateThresholds,
    pub room: RoomConstants,
    pub sample_interval_ms: u32,
    pub idle_ms: u64,
    pub line_capacity: usize,
    pub max_command_len: usize,
    pub echo_prefixes: Vec<String>,
    pub max_consecutive_faults: u8,
    pub restart_grace_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: NodeIdentity::default(),
            variant: ProtocolVariant::Chain,
            thresholds: ClimateThresholds::default(),
            room: RoomConstants::default(),
            sample_interval_ms: 5_000,
            idle_ms: 50,
            line_capacity: 100,
            max_command_len: 50,
            echo_prefixes: vec!["ESP001".to_string(), "ESP002".to_string()],
            max_consecutive_faults: 5,
            restart_grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("temperature band is empty ({min} >= {max})")]
    TemperatureBand { min: f32, max: f32 },
    #[error("humidity band is empty ({min} >= {max})")]
    HumidityBand { min: f32, max: f32 },
    #[error("room constant `{0}` must be positive")]
    RoomConstant(&'static str),
    #[error("node id must not be empty")]
    EmptyNodeId,
    #[error("invalid json config: {0}")]
    Json(String),
}

impl NodeConfig {
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let mut config: NodeConfig =
            serde_json::from_slice(raw).map_err(|err| ConfigError::Json(err.to_string()))?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    pub fn sanitize(&mut self) {
        self.sample_interval_ms = self.sample_interval_ms.clamp(500, 600_000);
        self.idle_ms = self.idle_ms.clamp(1, 1_000);
        self.line_capacity = self.line_capacity.clamp(16, 512);
        self.max_command_len = self.max_command_len.clamp(4, self.line_capacity);
        self.max_consecutive_faults = self.max_consecutive_faults.max(1);
        self.restart_grace_ms = self.restart_grace_ms.min(60_000);
        self.thresholds.humidity_min_pct = self.thresholds.humidity_min_pct.clamp(0.0, 100.0);
        self.thresholds.humidity_max_pct = self.thresholds.humidity_max_pct.clamp(0.0, 100.0);

        self.echo_prefixes.retain(|prefix| !prefix.is_empty());
        if !self.identity.id.is_empty() && !self.echo_prefixes.contains(&self.identity.id) {
            self.echo_prefixes.push(self.identity.id.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if t.temp_min_c >= t.temp_max_c {
            return Err(ConfigError::TemperatureBand {
                min: t.temp_min_c,
                max: t.temp_max_c,
            });
        }
        if t.humidity_min_pct >= t.humidity_max_pct {
            return Err(ConfigError::HumidityBand {
                min: t.humidity_min_pct,
                max: t.humidity_max_pct,
            });
        }

        let room = &self.room;
        if !(room.volume_m3 > 0.0) {
            return Err(ConfigError::RoomConstant("volume_m3"));
        }
        if !(room.mist_flow_rate > 0.0) {
            return Err(ConfigError::RoomConstant("mist_flow_rate"));
        }
        if !(room.evaporation_factor > 0.0) {
            return Err(ConfigError::RoomConstant("evaporation_factor"));
        }

        if self.identity.id.is_empty() {
            return Err(ConfigError::EmptyNodeId);
        }
        Ok(())
    }
}
