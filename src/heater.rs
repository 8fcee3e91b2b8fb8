//! Heater actuator: inverted duty value, intents, and the single owner that
//! applies them.

use crate::hal::{HeaterDrive, Indicator};

/// Inverted PWM setting: `0` is full power, `255` is off.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaterDuty(u8);

impl HeaterDuty {
    pub const OFF: Self = Self(u8::MAX);
    pub const FULL: Self = Self(0);

    pub const fn from_duty(duty: u8) -> Self {
        Self(duty)
    }

    /// Power level (0 = off, 255 = full), clamped, then inverted.
    pub fn from_level(level: i32) -> Self {
        let level = level.clamp(0, u8::MAX as i32) as u8;
        Self(u8::MAX - level)
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Power level, the inverse of `from_level`.
    pub const fn level(self) -> u8 {
        u8::MAX - self.0
    }

    pub const fn is_on(self) -> bool {
        self.0 != u8::MAX
    }

    /// On goes to off. Off goes to full power.
    pub const fn toggled(self) -> Self {
        if self.is_on() {
            Self::OFF
        } else {
            Self::FULL
        }
    }
}

impl Default for HeaterDuty {
    fn default() -> Self {
        Self::OFF
    }
}

/// A request to change the heater, sent to its owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaterIntent {
    Toggle,
    /// Raw inverted duty value
    Set(HeaterDuty),
}

/// Sole writer of the heater output and its status LED.
pub struct Heater<D, L> {
    drive: D,
    led: L,
    duty: HeaterDuty,
}

impl<D: HeaterDrive, L: Indicator> Heater<D, L> {
    /// Starts with the output forced off.
    pub fn new(mut drive: D, mut led: L) -> Self {
        drive.write_duty(HeaterDuty::OFF);
        led.set(false);
        Self {
            drive,
            led,
            duty: HeaterDuty::OFF,
        }
    }

    pub fn duty(&self) -> HeaterDuty {
        self.duty
    }

    /// Returns the duty now in effect.
    pub fn apply(&mut self, intent: HeaterIntent) -> HeaterDuty {
        let next = match intent {
            HeaterIntent::Toggle => self.duty.toggled(),
            HeaterIntent::Set(duty) => duty,
        };
        self.set(next);
        next
    }

    fn set(&mut self, duty: HeaterDuty) {
        if duty != self.duty {
            info!("heater duty {=u8} -> {=u8}", self.duty.value(), duty.value());
        }
        self.drive.write_duty(duty);
        self.led.set(duty.is_on());
        self.duty = duty;
    }

    #[cfg(test)]
    pub(crate) fn parts(&self) -> (&D, &L) {
        (&self.drive, &self.led)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeDrive, FakeLed};

    #[test]
    fn level_is_clamped_then_inverted() {
        assert_eq!(HeaterDuty::from_level(0), HeaterDuty::OFF);
        assert_eq!(HeaterDuty::from_level(255), HeaterDuty::FULL);
        assert_eq!(HeaterDuty::from_level(55).value(), 200);
        assert_eq!(HeaterDuty::from_level(-40), HeaterDuty::OFF);
        assert_eq!(HeaterDuty::from_level(9000), HeaterDuty::FULL);
        assert_eq!(HeaterDuty::from_level(55).level(), 55);
    }

    #[test]
    fn toggle_flips_between_off_and_full() {
        assert_eq!(HeaterDuty::OFF.toggled(), HeaterDuty::FULL);
        assert_eq!(HeaterDuty::from_duty(180).toggled(), HeaterDuty::OFF);
    }

    #[test]
    fn owner_drives_output_and_led() {
        let mut heater = Heater::new(FakeDrive::default(), FakeLed::default());
        assert_eq!(heater.parts().0.last, Some(HeaterDuty::OFF));

        heater.apply(HeaterIntent::Toggle);
        assert_eq!(heater.duty(), HeaterDuty::FULL);
        assert_eq!(heater.parts().0.last, Some(HeaterDuty::FULL));
        assert!(heater.parts().1.on);

        heater.apply(HeaterIntent::Set(HeaterDuty::from_duty(128)));
        assert!(heater.parts().1.on);

        heater.apply(HeaterIntent::Toggle);
        assert_eq!(heater.duty(), HeaterDuty::OFF);
        assert!(!heater.parts().1.on);
    }
}
