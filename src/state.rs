//! Shared state types for inter-task communication.
//!
//! Value types are `Copy` so they can travel through channels and be read
//! out of the shared cell without holding a lock.

use core::cell::Cell;
use core::f32::consts::PI;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::heater::HeaterDuty;
use crate::physics::Conductivity;

// ── Data types ────────────────────────────────────────────────────────────────

/// One control cycle's measurements. Temperatures in K, power in mW.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Snapshot {
    pub temp1: f32,
    pub temp2: f32,
    pub bus_voltage: f32,
    pub current_ma: f32,
    pub power_mw: f32,
}

/// Sample dimensions in mm.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    pub thickness_mm: f32,
    pub diameter_mm: f32,
}

impl Geometry {
    pub const DEFAULT: Self = Self {
        thickness_mm: 5.0,
        diameter_mm: 10.0,
    };

    /// Cross-section of a cylindrical sample, mm².
    pub fn area_mm2(&self) -> f32 {
        let r = self.diameter_mm / 2.0;
        PI * r * r
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Quantities derived from a snapshot and the geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Derived {
    /// Signed `temp1 - temp2`, K
    pub delta_t: f32,
    pub area_mm2: f32,
    pub conductivity: Conductivity,
}

/// Everything readers may ask for, copied out as one consistent value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstrumentState {
    /// `None` until the first measurement cycle completes.
    pub reading: Option<Snapshot>,
    pub derived: Option<Derived>,
    pub geometry: Geometry,
    pub offset_k: f32,
    pub heater: HeaterDuty,
}

impl InstrumentState {
    pub const fn new(geometry: Geometry) -> Self {
        Self {
            reading: None,
            derived: None,
            geometry,
            offset_k: 0.0,
            heater: HeaterDuty::OFF,
        }
    }
}

// ── Shared container ──────────────────────────────────────────────────────────

/// Single owned container handed by reference to every task.
///
/// Field ownership:
/// - `state`: written by the control task only (measurements, geometry,
///   offset, heater). Everyone else copies it out.
/// - `link_up`: written by the network collaborator, read by the link LED.
/// - `long_press`: raised by the input task, taken by the control task.
/// - counters: bumped by the control task.
pub struct SharedState {
    state: Mutex<CriticalSectionRawMutex, Cell<InstrumentState>>,
    link_up: AtomicBool,
    long_press: AtomicBool,
    uplink_drops: AtomicU32,
    sensor_faults: AtomicU32,
}

impl SharedState {
    pub const fn new(geometry: Geometry) -> Self {
        Self {
            state: Mutex::new(Cell::new(InstrumentState::new(geometry))),
            link_up: AtomicBool::new(false),
            long_press: AtomicBool::new(false),
            uplink_drops: AtomicU32::new(0),
            sensor_faults: AtomicU32::new(0),
        }
    }

    /// Consistent copy of the whole record.
    pub fn snapshot(&self) -> InstrumentState {
        self.state.lock(|s| s.get())
    }

    /// Read-modify-write under the critical section. Control task only.
    pub(crate) fn modify(&self, f: impl FnOnce(&mut InstrumentState)) {
        self.state.lock(|s| {
            let mut next = s.get();
            f(&mut next);
            s.set(next);
        });
    }

    pub fn link_up(&self) -> bool {
        self.link_up.load(Ordering::Acquire)
    }

    pub fn set_link_up(&self, up: bool) {
        self.link_up.store(up, Ordering::Release);
    }

    pub fn raise_long_press(&self) {
        self.long_press.store(true, Ordering::Release);
    }

    /// Edge-triggered: returns `true` once per raise.
    pub fn take_long_press(&self) -> bool {
        self.long_press.swap(false, Ordering::AcqRel)
    }

    /// Returns the new total.
    pub(crate) fn note_uplink_drop(&self) -> u32 {
        self.uplink_drops.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn uplink_drops(&self) -> u32 {
        self.uplink_drops.load(Ordering::Relaxed)
    }

    pub(crate) fn note_sensor_fault(&self) -> u32 {
        self.sensor_faults.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn sensor_faults(&self) -> u32 {
        self.sensor_faults.load(Ordering::Relaxed)
    }
}
