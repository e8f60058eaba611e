pub mod config;
pub mod engine;
pub mod fault;
pub mod framing;
pub mod mist;
pub mod mode;
pub mod policy;
pub mod protocol;
pub mod scheduler;
pub mod types;

pub use config::{ClimateThresholds, ConfigError, NodeConfig, ProtocolVariant, RoomConstants};
pub use engine::ClimateNode;
pub use fault::{FaultMonitor, FaultVerdict};
pub use framing::LineAssembler;
pub use mist::{DoseKind, MistDoser, MistTimer};
pub use mode::ModeController;
pub use policy::{MistDirective, PolicyDecision};
pub use protocol::{
    build_profile, frame_line, BridgeProfile, ChainProfile, LineRejected, ProtocolProfile,
};
pub use scheduler::{Scheduler, SensorReader};
pub use types::{
    elapsed_ms, Actuator, ActuatorState, CommandMessage, ControlMode, EnvironmentReading,
    NodeAction, NodeIdentity, StatusMessage,
};
