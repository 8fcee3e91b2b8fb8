//! Status LEDs. Both tasks only read shared state or wait on their queue;
//! neither writes instrument state.

use embassy_time::{Duration, Timer};

use crate::channels::PulseReceiver;
use crate::config::RigConfig;
use crate::hal::Indicator;
use crate::state::SharedState;

// ── Connectivity ──────────────────────────────────────────────────────────────

/// Solid while the link is down, short blink with a long pause while up.
pub struct LinkBlinker {
    on: Duration,
    off: Duration,
    idle_poll: Duration,
    pulse_next: bool,
}

impl LinkBlinker {
    pub fn new(config: &RigConfig) -> Self {
        Self {
            on: config.link_blink_on,
            off: config.link_blink_off,
            idle_poll: config.link_idle_poll,
            pulse_next: true,
        }
    }

    /// LED level to show and how long to hold it.
    pub fn next(&mut self, link_up: bool) -> (bool, Duration) {
        if !link_up {
            self.pulse_next = true;
            return (true, self.idle_poll);
        }
        let lit = self.pulse_next;
        self.pulse_next = !lit;
        (lit, if lit { self.on } else { self.off })
    }
}

pub struct LinkIndicator<'a, L> {
    led: L,
    shared: &'a SharedState,
    blinker: LinkBlinker,
}

impl<'a, L: Indicator> LinkIndicator<'a, L> {
    pub fn new(led: L, shared: &'a SharedState, config: &RigConfig) -> Self {
        Self {
            led,
            shared,
            blinker: LinkBlinker::new(config),
        }
    }

    pub async fn run(mut self) -> ! {
        loop {
            let (lit, hold) = self.blinker.next(self.shared.link_up());
            self.led.set(lit);
            Timer::after(hold).await;
        }
    }
}

// ── Data ──────────────────────────────────────────────────────────────────────

pub struct DataIndicator<'a, L> {
    led: L,
    pulses: PulseReceiver<'a>,
    hold: Duration,
}

impl<'a, L: Indicator> DataIndicator<'a, L> {
    pub fn new(mut led: L, pulses: PulseReceiver<'a>, config: &RigConfig) -> Self {
        led.set(false);
        Self {
            led,
            pulses,
            hold: config.data_pulse,
        }
    }

    pub async fn run(mut self) -> ! {
        loop {
            self.step().await;
        }
    }

    /// Wait for one pulse request and flash once.
    pub async fn step(&mut self) {
        self.pulses.receive().await;
        self.led.set(true);
        Timer::after(self.hold).await;
        self.led.set(false);
    }

    #[cfg(test)]
    pub(crate) fn led(&self) -> &L {
        &self.led
    }
}
