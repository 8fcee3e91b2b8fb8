use embassy_time::Duration;

use crate::state::Geometry;

// ── Structural sizes ──────────────────────────────────────────────────────────

/// Median window per temperature channel. Must be odd.
pub const MEDIAN_WINDOW: usize = 5;
/// Raw current samples averaged per measurement.
pub const CURRENT_SAMPLES: usize = 10;

pub const UPLINK_QUEUE_DEPTH: usize = 5;
pub const PULSE_QUEUE_DEPTH: usize = 5;
pub const HEATER_QUEUE_DEPTH: usize = 4;
pub const OPERATOR_QUEUE_DEPTH: usize = 4;

/// Calibration offsets outside ±this (K) are clamped or discarded.
pub const OFFSET_LIMIT_K: f32 = 10.0;

/// Accepted range for operator-supplied sample thickness and diameter (mm).
pub const GEOMETRY_MIN_MM: f32 = 0.01;
pub const GEOMETRY_MAX_MM: f32 = 1000.0;

/// Status returned by the collection endpoint when it accepted a record.
pub const UPLINK_ACCEPTED_STATUS: u16 = 302;

pub const CELSIUS_TO_KELVIN: f32 = 273.15;

const _: () = assert!(MEDIAN_WINDOW % 2 == 1);

// ── Timing ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub struct RigConfig {
    pub measure_interval: Duration,
    pub uplink_interval: Duration,
    /// Cooperative sleep at the end of every control iteration.
    pub loop_yield: Duration,
    pub prefill_spacing: Duration,
    pub current_sample_spacing: Duration,
    pub long_press: Duration,
    pub button_poll: Duration,
    pub link_blink_on: Duration,
    pub link_blink_off: Duration,
    /// Re-check period while the link indicator is held solid.
    pub link_idle_poll: Duration,
    pub data_pulse: Duration,
    pub uplink_timeout: Duration,
    pub logout_timeout: Duration,
    pub default_geometry: Geometry,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            measure_interval: Duration::from_millis(1000),
            uplink_interval: Duration::from_millis(30_000),
            loop_yield: Duration::from_millis(10),
            prefill_spacing: Duration::from_millis(100),
            current_sample_spacing: Duration::from_millis(10),
            long_press: Duration::from_millis(3000),
            button_poll: Duration::from_millis(50),
            link_blink_on: Duration::from_millis(100),
            link_blink_off: Duration::from_millis(4900),
            link_idle_poll: Duration::from_millis(10),
            data_pulse: Duration::from_millis(100),
            uplink_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(5),
            default_geometry: Geometry::DEFAULT,
        }
    }
}
