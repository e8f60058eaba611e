use std::time::Duration;

use crate::{
    engine::ClimateNode,
    types::{elapsed_ms, EnvironmentReading, NodeAction},
};

/// Read-side port for the temperature/humidity driver.
pub trait SensorReader {
    /// A NaN channel must come back as an invalid reading, never as a number.
    fn read(&mut self) -> EnvironmentReading;
}

/// Cooperative loop body: one call per pass, followed by [`Scheduler::idle`].
#[derive(Debug)]
pub struct Scheduler {
    node: ClimateNode,
    sample_interval_ms: u32,
    last_sample_ms: u32,
}

impl Scheduler {
    pub fn new(node: ClimateNode, boot_ms: u32) -> Self {
        Self {
            sample_interval_ms: node.config().sample_interval_ms,
            node,
            last_sample_ms: boot_ms,
        }
    }

    pub fn node(&self) -> &ClimateNode {
        &self.node
    }

    pub fn boot(&mut self) -> Vec<NodeAction> {
        self.node.boot()
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.node.config().idle_ms)
    }

    /// Sampling, mist timer, then inbound bytes. Stops early once the node halts.
    pub fn run_pass<S>(&mut self, now_ms: u32, sensor: &mut S, incoming: &[u8]) -> Vec<NodeAction>
    where
        S: SensorReader + ?Sized,
    {
        let mut actions = Vec::new();
        if self.node.is_halted() {
            return actions;
        }

        if elapsed_ms(now_ms, self.last_sample_ms) >= self.sample_interval_ms {
            let reading = sensor.read();
            actions.extend(self.node.on_sample(reading, now_ms));
            self.last_sample_ms = now_ms;
            if self.node.is_halted() {
                return actions;
            }
        }

        actions.extend(self.node.poll_mist(now_ms));

        if !incoming.is_empty() {
            actions.extend(self.node.on_bytes(incoming, now_ms));
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        config::NodeConfig,
        types::{Actuator, ControlMode},
    };

    struct ScriptedSensor {
        readings: VecDeque<EnvironmentReading>,
        reads: usize,
    }

    impl ScriptedSensor {
        fn new(readings: &[(f32, f32)]) -> Self {
            Self {
                readings: readings
                    .iter()
                    .map(|&(t, h)| EnvironmentReading::from_raw(t, h))
                    .collect(),
                reads: 0,
            }
        }
    }

    impl SensorReader for ScriptedSensor {
        fn read(&mut self) -> EnvironmentReading {
            self.reads += 1;
            self.readings
                .pop_front()
                .unwrap_or_else(EnvironmentReading::invalid)
        }
    }

    fn scheduler() -> Scheduler {
        let mut config = NodeConfig::default();
        config.sanitize();
        Scheduler::new(ClimateNode::new(config), 0)
    }

    fn restarts(actions: &[NodeAction]) -> usize {
        actions
            .iter()
            .filter(|action| matches!(action, NodeAction::Restart { .. }))
            .count()
    }

    #[test]
    fn samples_on_interval_only() {
        let mut scheduler = scheduler();
        let mut sensor = ScriptedSensor::new(&[(29.0, 80.0), (29.0, 80.0)]);

        assert!(scheduler.run_pass(4_999, &mut sensor, &[]).is_empty());
        assert_eq!(sensor.reads, 0);

        let actions = scheduler.run_pass(5_000, &mut sensor, &[]);
        assert_eq!(sensor.reads, 1);
        assert_eq!(
            actions,
            vec![NodeAction::SendLine(
                "ESP002#Tang 2#29.0#80.0#0#0#0#0".to_string()
            )]
        );

        scheduler.run_pass(9_999, &mut sensor, &[]);
        assert_eq!(sensor.reads, 1);
        scheduler.run_pass(10_000, &mut sensor, &[]);
        assert_eq!(sensor.reads, 2);
    }

    #[test]
    fn mist_timer_is_polled_between_samples() {
        let mut config = NodeConfig::default();
        config.sample_interval_ms = 60_000;
        config.sanitize();
        let mut scheduler = Scheduler::new(ClimateNode::new(config), 0);
        let mut sensor = ScriptedSensor::new(&[(29.0, 74.0)]);

        scheduler.run_pass(60_000, &mut sensor, &[]);
        assert!(scheduler.node().actuators().fog);

        assert!(scheduler.run_pass(65_000, &mut sensor, &[]).is_empty());
        let actions = scheduler.run_pass(65_001, &mut sensor, &[]);
        assert_eq!(actions[0], NodeAction::SetOutput(Actuator::Fog, false));
        assert_eq!(sensor.reads, 1);
    }

    #[test]
    fn five_invalid_samples_restart_exactly_once() {
        let mut scheduler = scheduler();
        let mut sensor = ScriptedSensor::new(&[]);
        let mut total = 0;

        for pass in 1..=4 {
            total += restarts(&scheduler.run_pass(pass * 5_000, &mut sensor, &[]));
        }
        assert_eq!(total, 0);

        let actions = scheduler.run_pass(25_000, &mut sensor, b"fan2#1\n");
        assert_eq!(actions, vec![NodeAction::Restart { grace_ms: 2_000 }]);

        for pass in 6..=8 {
            assert!(scheduler
                .run_pass(pass * 5_000, &mut sensor, b"fan2#1\n")
                .is_empty());
        }
        assert_eq!(sensor.reads, 5);
    }

    #[test]
    fn scenario_fan_command_while_autonomous() {
        let mut scheduler = scheduler();
        let mut sensor = ScriptedSensor::new(&[]);

        let actions = scheduler.run_pass(100, &mut sensor, b"fan2#1\n");

        assert_eq!(scheduler.node().mode(), ControlMode::Manual);
        assert!(scheduler.node().actuators().fan);
        assert!(actions
            .iter()
            .any(|action| matches!(action, NodeAction::SendLine(_))));
    }

    #[test]
    fn scenario_self_echo_is_discarded() {
        let mut scheduler = scheduler();
        let mut sensor = ScriptedSensor::new(&[]);

        let actions = scheduler.run_pass(100, &mut sensor, b"ESP002#26.8#80.0#1#1#0#1\n");

        assert!(actions.is_empty());
        assert_eq!(scheduler.node().mode(), ControlMode::Autonomous);
    }

    #[test]
    fn each_completed_line_is_dispatched() {
        let mut scheduler = scheduler();
        let mut sensor = ScriptedSensor::new(&[]);

        let actions = scheduler.run_pass(100, &mut sensor, b"fan2#1\nheater2#1\nled2");

        let lines = actions
            .iter()
            .filter(|action| matches!(action, NodeAction::SendLine(_)))
            .count();
        assert_eq!(lines, 2);
        assert_eq!(scheduler.node().pending_line(), "led2");
    }

    #[test]
    fn sampling_survives_tick_wraparound() {
        let mut config = NodeConfig::default();
        config.sanitize();
        let mut scheduler = Scheduler::new(ClimateNode::new(config), u32::MAX - 1_000);
        let mut sensor = ScriptedSensor::new(&[(29.0, 80.0)]);

        scheduler.run_pass(3_998, &mut sensor, &[]);
        assert_eq!(sensor.reads, 0);
        scheduler.run_pass(3_999, &mut sensor, &[]);
        assert_eq!(sensor.reads, 1);
    }
}
