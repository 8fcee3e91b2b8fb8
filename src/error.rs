//! Error types, one enum per concern.
//!
//! None of these are fatal at runtime: every task logs and carries on.

use core::fmt;

/// Sensor read failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// SPI/I2C transaction failed
    Bus,
    /// Converter reported a fault condition (open RTD, overrange)
    Fault,
    /// Reading is non-finite or below absolute zero
    Implausible,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "sensor bus error"),
            Self::Fault => write!(f, "sensor fault"),
            Self::Implausible => write!(f, "implausible sensor reading"),
        }
    }
}

impl core::error::Error for SensorError {}

/// Network collaborator failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetError {
    /// No link to the collection endpoint
    Offline,
    /// Operation exceeded its time budget
    Timeout,
    /// Connect/send/receive failed
    Transport,
    /// Payload did not fit the frame buffer
    Encode,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "link down"),
            Self::Timeout => write!(f, "network timeout"),
            Self::Transport => write!(f, "transport error"),
            Self::Encode => write!(f, "payload encoding failed"),
        }
    }
}

impl core::error::Error for NetError {}

/// Persistent storage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    Bus,
    Timeout,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => write!(f, "storage bus error"),
            Self::Timeout => write!(f, "storage busy timeout"),
        }
    }
}

impl core::error::Error for StorageError {}

/// Operator input rejected at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// Body could not be decoded (non-numeric field, bad JSON)
    Malformed,
    /// NaN or infinite value
    NonFinite,
    /// Value outside what the instrument accepts
    OutOfRange,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed request"),
            Self::NonFinite => write!(f, "non-finite value"),
            Self::OutOfRange => write!(f, "value out of range"),
        }
    }
}

impl core::error::Error for RequestError {}
