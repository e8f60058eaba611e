use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::dht22;
use esp_idf_hal::{
    delay::{Ets, NON_BLOCK},
    gpio::{AnyIOPin, AnyOutputPin, IOPin, InputOutput, Output, OutputPin, PinDriver, Pull},
    uart::{config::Config as UartConfig, UartDriver},
    units::Hertz,
};
use esp_idf_svc::{
    hal::prelude::Peripherals,
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
};
use log::{info, warn};

use climate_common::{
    frame_line, Actuator, ClimateNode, EnvironmentReading, NodeAction, NodeConfig, Scheduler,
    SensorReader,
};

const NVS_NAMESPACE: &str = "climate";
const NVS_CONFIG_KEY: &str = "node_json";

const DHT22_PIN: i32 = 4;
const LINK_BAUD: u32 = 115_200;
const READ_CHUNK: usize = 128;
const WATCHDOG_TIMEOUT_SEC: u32 = 30;

struct Dht22Sensor {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
}

impl Dht22Sensor {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        Ok(Self { pin, delay: Ets })
    }
}

impl SensorReader for Dht22Sensor {
    fn read(&mut self) -> EnvironmentReading {
        if let Err(err) = self.pin.set_high() {
            warn!("failed to set DHT22 line high before read: {err:?}");
            return EnvironmentReading::invalid();
        }

        match dht22::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => {
                EnvironmentReading::from_raw(reading.temperature, reading.relative_humidity)
            }
            Err(err) => {
                warn!("failed to read DHT22 on GPIO{}: {err:?}", DHT22_PIN);
                EnvironmentReading::invalid()
            }
        }
    }
}

/// The four relay/LED outputs, driven active-high.
struct OutputBank {
    fog: PinDriver<'static, AnyOutputPin, Output>,
    fan: PinDriver<'static, AnyOutputPin, Output>,
    heater: PinDriver<'static, AnyOutputPin, Output>,
    indicator: PinDriver<'static, AnyOutputPin, Output>,
}

impl OutputBank {
    fn new(
        fog: AnyOutputPin,
        fan: AnyOutputPin,
        heater: AnyOutputPin,
        indicator: AnyOutputPin,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            fog: PinDriver::output(fog)?,
            fan: PinDriver::output(fan)?,
            heater: PinDriver::output(heater)?,
            indicator: PinDriver::output(indicator)?,
        })
    }

    fn set(&mut self, actuator: Actuator, on: bool) -> anyhow::Result<()> {
        let pin = match actuator {
            Actuator::Fog => &mut self.fog,
            Actuator::Fan => &mut self.fan,
            Actuator::Heater => &mut self.heater,
            Actuator::Indicator => &mut self.indicator,
        };
        if on {
            pin.set_high()?;
        } else {
            pin.set_low()?;
        }
        Ok(())
    }
}

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

impl NvsStore {
    fn load_node_config(&self) -> anyhow::Result<NodeConfig> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 2048];

        match nvs.get_str(NVS_CONFIG_KEY, &mut buffer)? {
            Some(value) => Ok(NodeConfig::from_json(value.as_bytes())?),
            None => Ok(NodeConfig::default()),
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let nvs_store = NvsStore {
        partition: EspDefaultNvsPartition::take()?,
    };
    let config = nvs_store.load_node_config().unwrap_or_else(|err| {
        warn!("failed to load node config from NVS: {err:#}");
        NodeConfig::default()
    });

    let Peripherals { pins, uart2, .. } = Peripherals::take()?;

    let uart = UartDriver::new(
        uart2,
        pins.gpio17,
        pins.gpio16,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::new().baudrate(Hertz(LINK_BAUD)),
    )
    .context("failed to initialize link UART")?;

    let mut outputs = OutputBank::new(
        pins.gpio12.downgrade_output(),
        pins.gpio13.downgrade_output(),
        pins.gpio14.downgrade_output(),
        pins.gpio2.downgrade_output(),
    )
    .context("failed to initialize output pins")?;

    let mut sensor =
        Dht22Sensor::new(pins.gpio4.downgrade()).context("failed to initialize DHT22")?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    info!(
        "climate node {} ({}) floor {} starting with {:?} protocol",
        config.identity.id, config.identity.display_name, config.identity.floor, config.variant
    );

    let started = Instant::now();
    let mut scheduler = Scheduler::new(ClimateNode::new(config), tick_ms(started));
    let boot = scheduler.boot();
    execute_node_actions(boot, &mut outputs, &uart);

    let mut chunk = [0_u8; READ_CHUNK];
    let mut incoming = Vec::with_capacity(READ_CHUNK);

    loop {
        feed_watchdog();

        incoming.clear();
        loop {
            match uart.read(&mut chunk, NON_BLOCK) {
                Ok(0) => break,
                Ok(n) => incoming.extend_from_slice(&chunk[..n]),
                Err(err) => {
                    warn!("link read failed: {err:?}");
                    break;
                }
            }
        }

        let actions = scheduler.run_pass(tick_ms(started), &mut sensor, &incoming);
        if let Some(grace_ms) = execute_node_actions(actions, &mut outputs, &uart) {
            warn!("restarting after repeated sensor faults");
            thread::sleep(Duration::from_millis(grace_ms));
            unsafe { esp_idf_svc::sys::esp_restart() };
        }

        thread::sleep(scheduler.idle());
    }
}

fn execute_node_actions(
    actions: Vec<NodeAction>,
    outputs: &mut OutputBank,
    uart: &UartDriver<'_>,
) -> Option<u64> {
    for action in actions {
        match action {
            NodeAction::SetOutput(actuator, on) => {
                if let Err(err) = outputs.set(actuator, on) {
                    warn!("failed to drive {} output: {err:#}", actuator.label());
                }
            }
            NodeAction::SendLine(line) => {
                if let Err(err) = write_frame(uart, &frame_line(&line)) {
                    warn!("link write failed: {err:?}");
                }
            }
            NodeAction::ModeChanged(mode) => info!("control mode now {}", mode.as_str()),
            NodeAction::Restart { grace_ms } => return Some(grace_ms),
        }
    }
    None
}

/// Pushes the whole frame through the driver so a line never goes out split.
fn write_frame(uart: &UartDriver<'_>, frame: &[u8]) -> Result<(), esp_idf_svc::sys::EspError> {
    let mut sent = 0;
    while sent < frame.len() {
        sent += uart.write(&frame[sent..])?;
    }
    Ok(())
}

fn tick_ms(started: Instant) -> u32 {
    started.elapsed().as_millis() as u32
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
}
