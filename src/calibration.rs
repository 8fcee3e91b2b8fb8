//! Calibration offset for probe T2 and its persistence boundary.

#![allow(async_fn_in_trait)]

#[allow(unused_imports)]
use micromath::F32Ext;

use crate::config::OFFSET_LIMIT_K;
use crate::error::{RequestError, StorageError};

/// Offset in K added to T2 before filtering. Always finite and within
/// ±`OFFSET_LIMIT_K`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationOffset(f32);

impl CalibrationOffset {
    pub const ZERO: Self = Self(0.0);

    /// Validate a value read back from storage. Anything non-finite or out
    /// of range (including erased flash) becomes zero.
    pub fn from_stored(raw: f32) -> Self {
        if raw.is_finite() && raw.abs() <= OFFSET_LIMIT_K {
            Self(raw)
        } else {
            Self::ZERO
        }
    }

    /// Operator input: finite values are clamped into range.
    pub fn clamped(value: f32) -> Result<Self, RequestError> {
        if !value.is_finite() {
            return Err(RequestError::NonFinite);
        }
        Ok(Self(value.clamp(-OFFSET_LIMIT_K, OFFSET_LIMIT_K)))
    }

    pub fn adjust(self, delta: f32) -> Result<Self, RequestError> {
        Self::clamped(self.0 + delta)
    }

    pub const fn value(self) -> f32 {
        self.0
    }
}

/// Persistent storage for the offset.
pub trait OffsetStore {
    /// Raw stored value, unvalidated.
    async fn load(&mut self) -> Result<f32, StorageError>;
    async fn save(&mut self, value: f32) -> Result<(), StorageError>;
}

/// Boot-time load. Storage errors fall back to zero.
pub async fn load_offset<S: OffsetStore>(store: &mut S) -> CalibrationOffset {
    match store.load().await {
        Ok(raw) => {
            let offset = CalibrationOffset::from_stored(raw);
            if offset.value() != raw {
                warn!("stored offset {} rejected, using 0", raw);
            } else {
                info!("offset loaded: {} K", offset.value());
            }
            offset
        }
        Err(e) => {
            warn!("offset load failed: {}", e);
            CalibrationOffset::ZERO
        }
    }
}
