//! Cross-task queues and signals. All are statically sized and live in
//! `static`s owned by the firmware (or on the stack in tests).

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;

use crate::config::{HEATER_QUEUE_DEPTH, PULSE_QUEUE_DEPTH, UPLINK_QUEUE_DEPTH};
use crate::heater::HeaterIntent;
use crate::uplink::UplinkRecord;

/// One data-LED blink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pulse;

/// One-shot network actions requested from outside the uplink worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionAction {
    Logout,
}

/// Control task → uplink worker. Producer never waits (drop-on-full).
pub type UplinkQueue = Channel<CriticalSectionRawMutex, UplinkRecord, UPLINK_QUEUE_DEPTH>;
pub type UplinkSender<'a> = Sender<'a, CriticalSectionRawMutex, UplinkRecord, UPLINK_QUEUE_DEPTH>;
pub type UplinkReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, UplinkRecord, UPLINK_QUEUE_DEPTH>;

/// Uplink worker → data indicator. Producer waits when full.
pub type PulseQueue = Channel<CriticalSectionRawMutex, Pulse, PULSE_QUEUE_DEPTH>;
pub type PulseSender<'a> = Sender<'a, CriticalSectionRawMutex, Pulse, PULSE_QUEUE_DEPTH>;
pub type PulseReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, Pulse, PULSE_QUEUE_DEPTH>;

/// Input task → control task, the heater's only owner.
pub type HeaterQueue = Channel<CriticalSectionRawMutex, HeaterIntent, HEATER_QUEUE_DEPTH>;
pub type HeaterSender<'a> = Sender<'a, CriticalSectionRawMutex, HeaterIntent, HEATER_QUEUE_DEPTH>;
pub type HeaterReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, HeaterIntent, HEATER_QUEUE_DEPTH>;

/// Control task → uplink worker. Latest value wins.
pub type SessionSignal = Signal<CriticalSectionRawMutex, SessionAction>;
