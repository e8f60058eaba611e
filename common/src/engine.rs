use log::{debug, info};

use crate::{
    config::NodeConfig,
    fault::{FaultMonitor, FaultVerdict},
    framing::LineAssembler,
    mist::MistDoser,
    mode::ModeController,
    policy::{self, MistDirective},
    protocol::{build_profile, ProtocolProfile},
    types::{
        Actuator, ActuatorState, CommandMessage, ControlMode, EnvironmentReading, NodeAction,
        StatusMessage,
    },
};

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// All mutable node state for one boot cycle, built once at boot.
#[derive(Debug)]
pub struct ClimateNode {
    config: NodeConfig,
    profile: Box<dyn ProtocolProfile>,
    actuators: ActuatorState,
    mode: ModeController,
    mist: MistDoser,
    faults: FaultMonitor,
    lines: LineAssembler,
    last_reading: Option<EnvironmentReading>,
    halted: bool,
}

impl ClimateNode {
    pub fn new(config: NodeConfig) -> Self {
        let profile = build_profile(&config);
        Self {
            profile,
            actuators: ActuatorState::default(),
            mode: ModeController::new(),
            mist: MistDoser::new(config.room, &config.thresholds),
            faults: FaultMonitor::new(config.max_consecutive_faults),
            lines: LineAssembler::new(config.line_capacity),
            last_reading: None,
            halted: false,
            config,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn actuators(&self) -> ActuatorState {
        self.actuators
    }

    pub fn mode(&self) -> ControlMode {
        self.mode.mode()
    }

    pub fn mist(&self) -> &MistDoser {
        &self.mist
    }

    pub fn fault_count(&self) -> u8 {
        self.faults.count()
    }

    pub fn pending_line(&self) -> &str {
        self.lines.pending()
    }

    /// Set once the fatal fault path has fired; the node ignores further input.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Drives every output low, matching the hardware state at power-on.
    pub fn boot(&mut self) -> Vec<NodeAction> {
        self.actuators = ActuatorState::default();
        Actuator::ALL
            .iter()
            .map(|&actuator| NodeAction::SetOutput(actuator, false))
            .collect()
    }

    pub fn status_message(&self) -> StatusMessage {
        let (temperature_c, humidity_pct) = self
            .last_reading
            .map(|reading| (reading.temperature_c, reading.humidity_pct))
            .unwrap_or((0.0, 0.0));
        StatusMessage::snapshot(
            &self.config.identity,
            temperature_c,
            humidity_pct,
            &self.actuators,
        )
    }

    pub fn on_sample(&mut self, reading: EnvironmentReading, now_ms: u32) -> Vec<NodeAction> {
        let mut actions = Vec::new();
        if self.halted {
            return actions;
        }

        match self.faults.on_reading(&reading) {
            FaultVerdict::Fatal => {
                self.stop_dose(&mut actions);
                self.halted = true;
                actions.push(NodeAction::Restart {
                    grace_ms: self.config.restart_grace_ms,
                });
                return actions;
            }
            FaultVerdict::Transient(_) => {
                self.stop_dose(&mut actions);
                return actions;
            }
            FaultVerdict::Healthy => {}
        }

        self.last_reading = Some(reading);
        self.log_reading(&reading);

        if self.mode.is_autonomous() {
            self.apply_policy(&reading, now_ms, &mut actions);
        }

        self.emit_status(&mut actions);
        actions
    }

    /// Ends an expired dose; announces the change when it does.
    pub fn poll_mist(&mut self, now_ms: u32) -> Vec<NodeAction> {
        let mut actions = Vec::new();
        if self.halted {
            return actions;
        }

        if self.mist.poll(now_ms) {
            self.write_output(Actuator::Fog, false, &mut actions);
            self.emit_status(&mut actions);
        }
        actions
    }

    pub fn on_bytes(&mut self, bytes: &[u8], now_ms: u32) -> Vec<NodeAction> {
        let mut actions = Vec::new();
        for line in self.lines.feed(bytes) {
            if self.halted {
                break;
            }
            actions.extend(self.handle_line(&line, now_ms));
        }
        actions
    }

    pub fn handle_line(&mut self, line: &str, now_ms: u32) -> Vec<NodeAction> {
        let mut actions = Vec::new();
        if self.halted {
            return actions;
        }

        let commands = match self.profile.decode_command(line) {
            Ok(commands) => commands,
            Err(reason) => {
                debug!("discarding line {line:?}: {reason}");
                return actions;
            }
        };

        if let Some(mode) = self.mode.on_command_accepted() {
            actions.push(NodeAction::ModeChanged(mode));
        }

        let mut changed = false;
        for command in commands {
            changed |= self.apply_command(command, now_ms, &mut actions);
        }

        if changed {
            self.emit_status(&mut actions);
        }
        actions
    }

    fn apply_command(
        &mut self,
        command: CommandMessage,
        now_ms: u32,
        actions: &mut Vec<NodeAction>,
    ) -> bool {
        let CommandMessage { target, value } = command;
        if self.actuators.get(target) == value {
            return false;
        }

        if target == Actuator::Fog {
            if value {
                self.mist.start_override(now_ms);
            } else {
                self.mist.stop();
            }
        }

        self.write_output(target, value, actions);
        info!("[CONTROL] {}: {}", target.label(), on_off(value));
        true
    }

    fn apply_policy(
        &mut self,
        reading: &EnvironmentReading,
        now_ms: u32,
        actions: &mut Vec<NodeAction>,
    ) {
        let decision = policy::evaluate(reading, &self.config.thresholds, self.mist.is_active());

        self.write_output(Actuator::Fan, decision.fan, actions);
        self.write_output(Actuator::Heater, decision.heater, actions);

        match decision.mist {
            MistDirective::Start => {
                if self
                    .mist
                    .start(reading.humidity_pct, reading.temperature_c, now_ms)
                    .is_some()
                {
                    self.write_output(Actuator::Fog, true, actions);
                }
            }
            MistDirective::Stop => self.stop_dose(actions),
            MistDirective::Keep => {}
        }
    }

    fn stop_dose(&mut self, actions: &mut Vec<NodeAction>) {
        if self.mist.stop() {
            self.write_output(Actuator::Fog, false, actions);
        }
    }

    /// Writes only when the commanded level differs from the current one.
    fn write_output(&mut self, actuator: Actuator, on: bool, actions: &mut Vec<NodeAction>) {
        if self.actuators.get(actuator) == on {
            return;
        }
        self.actuators.set(actuator, on);
        actions.push(NodeAction::SetOutput(actuator, on));
    }

    fn emit_status(&self, actions: &mut Vec<NodeAction>) {
        let line = self.profile.encode_status(&self.status_message());
        info!("[TX] {line}");
        actions.push(NodeAction::SendLine(line));
    }

    fn log_reading(&self, reading: &EnvironmentReading) {
        let identity = &self.config.identity;
        info!(
            "===== {} ({}) ===== Temp: {:.1}°C | Hum: {:.1}% | Mode: {}",
            identity.display_name,
            identity.id,
            reading.temperature_c,
            reading.humidity_pct,
            self.mode.mode().as_str()
        );
        info!(
            "LED:{} FOG:{} FAN:{} HEAT:{}",
            on_off(self.actuators.indicator),
            on_off(self.actuators.fog),
            on_off(self.actuators.fan),
            on_off(self.actuators.heater)
        );
    }
}
