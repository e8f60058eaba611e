use std::{
    io::ErrorKind,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tracing::{info, warn};

use climate_common::{
    frame_line, ClimateNode, ControlMode, NodeAction, NodeConfig, ProtocolVariant, Scheduler,
};

use crate::sim::{SimulatedOutputs, SimulatedRoom};

const DEFAULT_LINK_ADDR: &str = "127.0.0.1:7000";
const LINK_RETRY_BACKOFF: Duration = Duration::from_secs(2);
const READ_CHUNK: usize = 256;
const ROOM_AMBIENT_C: f32 = 29.5;
const ROOM_AMBIENT_RH: f32 = 72.0;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = ConfigStore::from_env();
    let mut config = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load node config from {}: {err:#}", store.path.display());
        NodeConfig::default()
    });
    apply_env_overrides(&mut config);
    config.sanitize();
    config.validate().context("invalid node configuration")?;

    let link_addr =
        std::env::var("NODE_LINK_ADDR").unwrap_or_else(|_| DEFAULT_LINK_ADDR.to_string());
    let fault_every = std::env::var("NODE_FAULT_EVERY")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(0);

    info!(
        "climate node {} ({}) floor {} starting, {:?} link at {}",
        config.identity.id,
        config.identity.display_name,
        config.identity.floor,
        config.variant,
        link_addr
    );

    let clock = TickClock::start();
    let mut room = SimulatedRoom::new(ROOM_AMBIENT_C, ROOM_AMBIENT_RH).with_fault_every(fault_every);
    let mut outputs = SimulatedOutputs::default();
    let mut link = SerialLink::new(link_addr);

    let mut scheduler = Scheduler::new(ClimateNode::new(config.clone()), clock.now_ms());
    let boot = scheduler.boot();
    execute_node_actions(boot, &mut outputs, &mut link).await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut incoming = Vec::with_capacity(READ_CHUNK);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!("ctrl-c listener failed: {err}");
                }
                info!("shutting down");
                break;
            }
            _ = tokio::time::sleep(scheduler.idle()) => {}
        }

        link.ensure_connected().await;
        incoming.clear();
        link.drain(&mut incoming);

        let now_ms = clock.now_ms();
        room.advance(now_ms, outputs.state());
        let actions = scheduler.run_pass(now_ms, &mut room, &incoming);

        if let Some(grace_ms) = execute_node_actions(actions, &mut outputs, &mut link).await {
            tokio::time::sleep(Duration::from_millis(grace_ms)).await;
            warn!("restarting node after repeated sensor faults");
            scheduler = Scheduler::new(ClimateNode::new(config.clone()), clock.now_ms());
            let boot = scheduler.boot();
            execute_node_actions(boot, &mut outputs, &mut link).await;
        }
    }

    Ok(())
}

/// Applies actions in order. Returns the grace delay when a restart was requested.
async fn execute_node_actions(
    actions: Vec<NodeAction>,
    outputs: &mut SimulatedOutputs,
    link: &mut SerialLink,
) -> Option<u64> {
    for action in actions {
        match action {
            NodeAction::SetOutput(actuator, on) => outputs.set(actuator, on),
            NodeAction::SendLine(line) => link.send_line(&line).await,
            NodeAction::ModeChanged(ControlMode::Manual) => {
                info!("autonomous control disabled until restart");
            }
            NodeAction::ModeChanged(mode) => info!("control mode now {}", mode.as_str()),
            NodeAction::Restart { grace_ms } => return Some(grace_ms),
        }
    }
    None
}

fn apply_env_overrides(config: &mut NodeConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// A floor override without an explicit id or name renumbers both, so the status
/// line and the command keys stay on the same floor.
fn apply_overrides(config: &mut NodeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(floor) = lookup("NODE_FLOOR").and_then(|value| value.parse::<u8>().ok()) {
        config.identity.floor = floor;
        config.identity.id = format!("ESP{floor:03}");
        config.identity.display_name = format!("Tang {floor}");
    }

    if let Some(id) = lookup("NODE_ID").filter(|value| !value.is_empty()) {
        config.identity.id = id;
    }
    if let Some(name) = lookup("NODE_NAME").filter(|value| !value.is_empty()) {
        config.identity.display_name = name;
    }

    if let Some(value) = lookup("NODE_VARIANT") {
        match ProtocolVariant::parse(&value) {
            Some(variant) => config.variant = variant,
            None => warn!("ignoring unknown NODE_VARIANT `{value}`"),
        }
    }
}

/// Microcontroller-style millisecond counter: wraps at `u32::MAX`.
struct TickClock {
    started: Instant,
}

impl TickClock {
    fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn now_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }
}

struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    fn from_env() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate-node"));
        Self {
            path: data_dir.join("node.json"),
        }
    }

    async fn load(&self) -> anyhow::Result<NodeConfig> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(NodeConfig::from_json(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(NodeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Serial line stand-in: a TCP stream to a serial bridge or coordinator.
struct SerialLink {
    addr: String,
    stream: Option<TcpStream>,
    retry_at: Option<Instant>,
}

impl SerialLink {
    fn new(addr: String) -> Self {
        Self {
            addr,
            stream: None,
            retry_at: None,
        }
    }

    async fn ensure_connected(&mut self) {
        if self.stream.is_some() {
            return;
        }
        if self.retry_at.is_some_and(|at| Instant::now() < at) {
            return;
        }

        match TcpStream::connect(&self.addr).await {
            Ok(stream) => {
                if let Err(err) = stream.set_nodelay(true) {
                    warn!("failed to set TCP_NODELAY on link: {err}");
                }
                info!("link connected to {}", self.addr);
                self.stream = Some(stream);
                self.retry_at = None;
            }
            Err(err) => {
                warn!("link connect to {} failed: {err}", self.addr);
                self.retry_at = Some(Instant::now() + LINK_RETRY_BACKOFF);
            }
        }
    }

    /// Appends whatever the link has buffered without waiting for more.
    fn drain(&mut self, incoming: &mut Vec<u8>) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };

        let mut chunk = [0_u8; READ_CHUNK];
        loop {
            match stream.try_read(&mut chunk) {
                Ok(0) => {
                    warn!("link closed by peer");
                    self.disconnect();
                    return;
                }
                Ok(n) => incoming.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return,
                Err(err) => {
                    warn!("link read failed: {err}");
                    self.disconnect();
                    return;
                }
            }
        }
    }

    async fn send_line(&mut self, line: &str) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        if let Err(err) = stream.write_all(&frame_line(line)).await {
            warn!("link write failed: {err}");
            self.disconnect();
        }
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.retry_at = Some(Instant::now() + LINK_RETRY_BACKOFF);
    }
}
