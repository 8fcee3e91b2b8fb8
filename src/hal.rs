//! Hardware collaborator traits.
//!
//! The core only talks to sensors and outputs through these. The firmware
//! binary implements them over the board drivers; tests use fakes.

#![allow(async_fn_in_trait)]

use crate::error::SensorError;
use crate::heater::HeaterDuty;

/// Temperature probe position on the sample stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Probe {
    /// Heated side
    T1,
    /// Cold side, carries the calibration offset
    T2,
}

pub trait ProbeBank {
    /// Calibrated probe temperature in °C.
    async fn read_celsius(&mut self, probe: Probe) -> Result<f32, SensorError>;
}

/// Shunt monitor on the heater supply.
pub trait PowerMonitor {
    /// Bus voltage, V
    async fn bus_voltage(&mut self) -> Result<f32, SensorError>;
    /// Heater current, mA
    async fn current_ma(&mut self) -> Result<f32, SensorError>;
}

pub trait HeaterDrive {
    fn write_duty(&mut self, duty: HeaterDuty);
}

/// A single on/off status output.
pub trait Indicator {
    fn set(&mut self, on: bool);
}

pub trait PushButton {
    fn is_pressed(&mut self) -> bool;
}
