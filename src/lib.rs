//! Measurement and control core of a thermal conductivity rig.
//!
//! Two RTD probes across a sample, a shunt monitor on the heater supply and
//! an operator-set heater. Everything here is board independent; the
//! firmware binary supplies the collaborators in [`hal`], [`calibration`]
//! and [`uplink`].
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod button;
pub mod calibration;
pub mod channels;
pub mod config;
pub mod control;
pub mod error;
pub mod filter;
pub mod hal;
pub mod heater;
pub mod hostline;
pub mod indicator;
pub mod physics;
pub mod request;
pub mod state;
pub mod uplink;

#[cfg(test)]
mod fakes;

pub use config::RigConfig;
pub use control::{ControlLinks, Controller, RigIo};
pub use state::{Geometry, SharedState};
