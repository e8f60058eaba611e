use log::{error, warn};

use crate::types::EnvironmentReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultVerdict {
    Healthy,
    /// Invalid reading below the escalation threshold; carries the consecutive count.
    Transient(u8),
    /// Threshold reached; the node must restart.
    Fatal,
}

/// Counts consecutive invalid sensor readings.
#[derive(Debug, Clone)]
pub struct FaultMonitor {
    max_consecutive: u8,
    count: u8,
}

impl FaultMonitor {
    pub fn new(max_consecutive: u8) -> Self {
        Self {
            max_consecutive: max_consecutive.max(1),
            count: 0,
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn on_reading(&mut self, reading: &EnvironmentReading) -> FaultVerdict {
        if reading.valid {
            self.count = 0;
            return FaultVerdict::Healthy;
        }

        self.count = self.count.saturating_add(1);
        if self.count >= self.max_consecutive {
            error!("sensor error limit reached ({}), restarting", self.count);
            FaultVerdict::Fatal
        } else {
            warn!(
                "sensor read error ({}/{})",
                self.count, self.max_consecutive
            );
            FaultVerdict::Transient(self.count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_only_at_threshold() {
        let mut monitor = FaultMonitor::new(5);
        let bad = EnvironmentReading::invalid();

        for expected in 1..5 {
            assert_eq!(monitor.on_reading(&bad), FaultVerdict::Transient(expected));
        }
        assert_eq!(monitor.on_reading(&bad), FaultVerdict::Fatal);
    }

    #[test]
    fn valid_reading_resets_count() {
        let mut monitor = FaultMonitor::new(5);
        let bad = EnvironmentReading::invalid();

        for _ in 0..4 {
            monitor.on_reading(&bad);
        }
        assert_eq!(
            monitor.on_reading(&EnvironmentReading::from_raw(28.0, 80.0)),
            FaultVerdict::Healthy
        );
        assert_eq!(monitor.count(), 0);
        assert_eq!(monitor.on_reading(&bad), FaultVerdict::Transient(1));
    }
}
