use climate_common::{elapsed_ms, Actuator, ActuatorState, EnvironmentReading, SensorReader};
use tracing::info;

const AMBIENT_PULL_PER_SEC: f32 = 0.002;
const HEATER_C_PER_SEC: f32 = 0.05;
const FAN_C_PER_SEC: f32 = 0.03;
const FAN_RH_PER_SEC: f32 = 0.08;
const FOG_RH_PER_SEC: f32 = 0.4;

/// A single room whose climate drifts toward ambient and answers the actuators.
#[derive(Debug, Clone)]
pub struct SimulatedRoom {
    ambient_c: f32,
    ambient_rh: f32,
    temperature_c: f32,
    humidity_pct: f32,
    last_tick_ms: Option<u32>,
    fault_every: Option<u32>,
    reads: u32,
}

impl SimulatedRoom {
    pub fn new(ambient_c: f32, ambient_rh: f32) -> Self {
        Self {
            ambient_c,
            ambient_rh,
            temperature_c: ambient_c,
            humidity_pct: ambient_rh,
            last_tick_ms: None,
            fault_every: None,
            reads: 0,
        }
    }

    /// Every `n`th read comes back as NaN. Zero disables injection.
    pub fn with_fault_every(mut self, n: u32) -> Self {
        self.fault_every = (n > 0).then_some(n);
        self
    }

    pub fn temperature_c(&self) -> f32 {
        self.temperature_c
    }

    pub fn humidity_pct(&self) -> f32 {
        self.humidity_pct
    }

    pub fn advance(&mut self, now_ms: u32, outputs: &ActuatorState) {
        let Some(last) = self.last_tick_ms.replace(now_ms) else {
            return;
        };
        let secs = elapsed_ms(now_ms, last) as f32 / 1000.0;
        if secs <= 0.0 {
            return;
        }

        let pull = (AMBIENT_PULL_PER_SEC * secs).min(1.0);
        self.temperature_c += (self.ambient_c - self.temperature_c) * pull;
        self.humidity_pct += (self.ambient_rh - self.humidity_pct) * pull;

        if outputs.heater {
            self.temperature_c += HEATER_C_PER_SEC * secs;
        }
        if outputs.fan {
            self.temperature_c -= FAN_C_PER_SEC * secs;
            self.humidity_pct -= FAN_RH_PER_SEC * secs;
        }
        if outputs.fog {
            self.humidity_pct += FOG_RH_PER_SEC * secs;
        }
        self.humidity_pct = self.humidity_pct.clamp(0.0, 100.0);
    }
}

impl SensorReader for SimulatedRoom {
    fn read(&mut self) -> EnvironmentReading {
        self.reads = self.reads.wrapping_add(1);
        if let Some(every) = self.fault_every {
            if self.reads % every == 0 {
                return EnvironmentReading::invalid();
            }
        }
        EnvironmentReading::from_raw(self.temperature_c, self.humidity_pct)
    }
}

/// Output levels as the simulated relays would hold them.
#[derive(Debug, Clone, Default)]
pub struct SimulatedOutputs {
    state: ActuatorState,
    writes: u32,
}

impl SimulatedOutputs {
    pub fn state(&self) -> &ActuatorState {
        &self.state
    }

    pub fn writes(&self) -> u32 {
        self.writes
    }

    pub fn set(&mut self, actuator: Actuator, on: bool) {
        self.writes = self.writes.saturating_add(1);
        self.state.set(actuator, on);
        info!(
            "relay {} -> {}",
            actuator.label(),
            if on { "HIGH" } else { "LOW" }
        );
    }
}
