//! Fourier's law on a cylindrical sample: k = (Q · Δx) / (A · |ΔT|).
//!
//! Inputs are in instrument units (mW, mm, K). Power is converted to W at
//! the boundary, so the result is in W·mm⁻¹·K⁻¹.

#[allow(unused_imports)]
use micromath::F32Ext;

use crate::state::{Derived, Geometry};

/// mW per W.
pub const UNIT_SCALE: f32 = 1000.0;

/// Why no conductivity could be derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Singularity {
    NoGradient,
    NoThickness,
    NoArea,
    /// Finite inputs whose quotient is not representable
    Overflow,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Conductivity {
    /// W·mm⁻¹·K⁻¹
    Defined(f32),
    Undefined(Singularity),
}

impl Conductivity {
    pub fn value(self) -> Option<f32> {
        match self {
            Self::Defined(k) => Some(k),
            Self::Undefined(_) => None,
        }
    }

    /// Wire/display form: undefined reads as `0.0`, never NaN.
    pub fn or_zero(self) -> f32 {
        self.value().unwrap_or(0.0)
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Self::Defined(_))
    }
}

pub fn compute_conductivity(power_mw: f32, geometry: Geometry, t1: f32, t2: f32) -> Derived {
    let delta_t = t1 - t2;
    let gradient = delta_t.abs();
    let area_mm2 = geometry.area_mm2();

    let conductivity = if !(gradient > 0.0) {
        Conductivity::Undefined(Singularity::NoGradient)
    } else if !(geometry.thickness_mm > 0.0) {
        Conductivity::Undefined(Singularity::NoThickness)
    } else if !(geometry.diameter_mm > 0.0) || !(area_mm2 > 0.0) {
        Conductivity::Undefined(Singularity::NoArea)
    } else {
        let power_w = power_mw / UNIT_SCALE;
        let k = power_w * geometry.thickness_mm / (area_mm2 * gradient);
        if k.is_finite() {
            Conductivity::Defined(k)
        } else {
            Conductivity::Undefined(Singularity::Overflow)
        }
    };

    Derived {
        delta_t,
        area_mm2,
        conductivity,
    }
}
