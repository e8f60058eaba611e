use log::info;

use crate::types::ControlMode;

/// Autonomous until the first accepted remote command; manual is sticky until reboot.
#[derive(Debug, Clone)]
pub struct ModeController {
    mode: ControlMode,
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeController {
    pub fn new() -> Self {
        Self {
            mode: ControlMode::Autonomous,
        }
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn is_autonomous(&self) -> bool {
        self.mode == ControlMode::Autonomous
    }

    /// Returns the new mode the first time a command is accepted, `None` afterwards.
    pub fn on_command_accepted(&mut self) -> Option<ControlMode> {
        if self.mode == ControlMode::Manual {
            return None;
        }
        self.mode = ControlMode::Manual;
        info!("[MODE] AUTO -> MANUAL");
        Some(self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_command_switches_to_manual_once() {
        let mut mode = ModeController::new();
        assert!(mode.is_autonomous());

        assert_eq!(mode.on_command_accepted(), Some(ControlMode::Manual));
        assert_eq!(mode.on_command_accepted(), None);
        assert_eq!(mode.mode(), ControlMode::Manual);
    }
}
