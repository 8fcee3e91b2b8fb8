//! Push button: short press toggles the heater, long press ends the network
//! session.
//!
//! The poll period doubles as debounce. A long press fires as soon as the
//! threshold is reached, without waiting for release, and the button must be
//! released and pressed again before anything else fires.

use embassy_time::{Duration, Instant, Ticker};

use crate::channels::HeaterSender;
use crate::config::RigConfig;
use crate::hal::PushButton;
use crate::heater::HeaterIntent;
use crate::state::SharedState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonState {
    Idle,
    Pressed { since: Instant },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PressEvent {
    Short,
    Long,
}

pub struct PressTracker {
    state: ButtonState,
    long_press: Duration,
    was_down: bool,
}

impl PressTracker {
    pub fn new(long_press: Duration) -> Self {
        Self {
            state: ButtonState::Idle,
            long_press,
            was_down: false,
        }
    }

    pub fn state(&self) -> ButtonState {
        self.state
    }

    /// Feed one sampled level.
    pub fn poll(&mut self, pressed: bool, now: Instant) -> Option<PressEvent> {
        let rising = pressed && !self.was_down;
        self.was_down = pressed;

        match self.state {
            ButtonState::Idle => {
                if rising {
                    self.state = ButtonState::Pressed { since: now };
                }
                None
            }
            ButtonState::Pressed { since } => {
                let held = now.checked_duration_since(since).unwrap_or(Duration::MIN);
                // Held time decides, not the level at this poll: a release first
                // seen past the threshold is reported as long, never dropped.
                if held >= self.long_press {
                    self.state = ButtonState::Idle;
                    Some(PressEvent::Long)
                } else if !pressed {
                    self.state = ButtonState::Idle;
                    Some(PressEvent::Short)
                } else {
                    None
                }
            }
        }
    }
}

/// Input task. Never blocks on its outputs.
pub struct ButtonTask<'a, B> {
    button: B,
    shared: &'a SharedState,
    heater: HeaterSender<'a>,
    tracker: PressTracker,
    poll: Duration,
}

impl<'a, B: PushButton> ButtonTask<'a, B> {
    pub fn new(
        button: B,
        shared: &'a SharedState,
        heater: HeaterSender<'a>,
        config: &RigConfig,
    ) -> Self {
        Self {
            button,
            shared,
            heater,
            tracker: PressTracker::new(config.long_press),
            poll: config.button_poll,
        }
    }

    pub async fn run(mut self) -> ! {
        let mut ticker = Ticker::every(self.poll);
        loop {
            ticker.next().await;
            self.poll_at(Instant::now());
        }
    }

    pub fn poll_at(&mut self, now: Instant) -> Option<PressEvent> {
        let event = self.tracker.poll(self.button.is_pressed(), now)?;
        match event {
            PressEvent::Long => {
                info!("long press");
                self.shared.raise_long_press();
            }
            PressEvent::Short => {
                debug!("short press, toggling heater");
                if self.heater.try_send(HeaterIntent::Toggle).is_err() {
                    warn!("heater queue full, toggle dropped");
                }
            }
        }
        Some(event)
    }

    #[cfg(test)]
    pub(crate) fn button_mut(&mut self) -> &mut B {
        &mut self.button
    }
}
