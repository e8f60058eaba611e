use log::info;

use crate::{
    config::{ClimateThresholds, RoomConstants},
    types::elapsed_ms,
};

pub const MIN_DOSE_SECS: f32 = 5.0;
pub const MAX_DOSE_SECS: f32 = 30.0;
/// Fixed length of a dose started by a remote fog command.
pub const OVERRIDE_DOSE_SECS: f32 = 30.0;

const COMPENSATION_REFERENCE_C: f32 = 28.0;
const COMPENSATION_PER_DEGREE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseKind {
    Computed,
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MistTimer {
    pub start_ms: u32,
    pub duration_secs: f32,
    pub kind: DoseKind,
}

/// Owns the fog pulse timer. `fog` on the node is true exactly while a timer is held here.
#[derive(Debug, Clone)]
pub struct MistDoser {
    room: RoomConstants,
    humidity_min_pct: f32,
    timer: Option<MistTimer>,
}

/// Dose length for a humidity deficit, compensated for temperature and clamped to the dose bounds.
pub fn dose_duration_secs(
    room: &RoomConstants,
    humidity_min_pct: f32,
    humidity_pct: f32,
    temperature_c: f32,
) -> f32 {
    let deficit = humidity_min_pct - humidity_pct;
    let water_needed = room.volume_m3 * deficit * room.evaporation_factor;
    let raw_secs = (water_needed / room.mist_flow_rate) * 60.0;
    let compensation =
        1.0 - COMPENSATION_PER_DEGREE * (temperature_c - COMPENSATION_REFERENCE_C).max(0.0);
    let secs = raw_secs * compensation;

    if secs.is_nan() {
        return MIN_DOSE_SECS;
    }
    secs.clamp(MIN_DOSE_SECS, MAX_DOSE_SECS)
}

impl MistDoser {
    pub fn new(room: RoomConstants, thresholds: &ClimateThresholds) -> Self {
        Self {
            room,
            humidity_min_pct: thresholds.humidity_min_pct,
            timer: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    pub fn timer(&self) -> Option<MistTimer> {
        self.timer
    }

    /// Starts a computed dose. Refused while another dose runs; returns the duration when started.
    pub fn start(&mut self, humidity_pct: f32, temperature_c: f32, now_ms: u32) -> Option<f32> {
        if self.timer.is_some() {
            return None;
        }

        let duration_secs =
            dose_duration_secs(&self.room, self.humidity_min_pct, humidity_pct, temperature_c);
        self.timer = Some(MistTimer {
            start_ms: now_ms,
            duration_secs,
            kind: DoseKind::Computed,
        });
        info!("[AUTO] Spray: {duration_secs:.1}s");
        Some(duration_secs)
    }

    /// Starts the fixed-length dose requested by a remote command, replacing any running timer.
    pub fn start_override(&mut self, now_ms: u32) {
        self.timer = Some(MistTimer {
            start_ms: now_ms,
            duration_secs: OVERRIDE_DOSE_SECS,
            kind: DoseKind::Override,
        });
    }

    /// Returns true when a running dose was actually stopped.
    pub fn stop(&mut self) -> bool {
        if self.timer.take().is_some() {
            info!("[AUTO] Stop mist");
            true
        } else {
            false
        }
    }

    /// Stops the dose once its duration has strictly elapsed; returns true on auto-stop.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        let Some(timer) = self.timer else {
            return false;
        };

        let limit_ms = (timer.duration_secs * 1000.0) as u32;
        if elapsed_ms(now_ms, timer.start_ms) > limit_ms {
            self.stop()
        } else {
            false
        }
    }
}
