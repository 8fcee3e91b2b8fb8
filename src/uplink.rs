//! Best-effort cloud uplink.
//!
//! The worker owns the network collaborator. It takes records off the uplink
//! queue one at a time and delivers each at most once: no retry, no re-queue.
//! It also runs the session logout raised by a long press, so that no
//! network call ever sits on the control task.

#![allow(async_fn_in_trait)]

use embassy_futures::select::{select, Either};
use embassy_time::{with_timeout, Duration};
use serde::Serialize;

use crate::channels::{Pulse, PulseSender, SessionAction, SessionSignal, UplinkReceiver};
use crate::config::{RigConfig, UPLINK_ACCEPTED_STATUS};
use crate::error::NetError;
use crate::state::InstrumentState;

/// Frame buffer for one encoded record.
pub const RECORD_BUF: usize = 320;

/// Network collaborator.
pub trait Uplink {
    fn is_connected(&self) -> bool;
    /// POST one JSON body, returning the response status.
    async fn post(&mut self, body: &[u8]) -> Result<u16, NetError>;
    /// End the captive-portal session.
    async fn logout(&mut self) -> Result<(), NetError>;
}

// ── Record ────────────────────────────────────────────────────────────────────

/// Measurement plus geometry as sent to the collection endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UplinkRecord {
    pub temp1: f32,
    pub temp2: f32,
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
    pub thickness: f32,
    pub diameter: f32,
    pub area: f32,
    pub conductivity: f32,
    #[serde(rename = "conductivityValid")]
    pub conductivity_valid: bool,
}

impl UplinkRecord {
    /// `None` until the first measurement has been published.
    pub fn compose(state: &InstrumentState) -> Option<Self> {
        let reading = state.reading?;
        let derived = state.derived?;
        let conductivity = derived.conductivity.value();
        Some(Self {
            temp1: reading.temp1,
            temp2: reading.temp2,
            voltage: reading.bus_voltage,
            current: reading.current_ma,
            power: reading.power_mw,
            thickness: state.geometry.thickness_mm,
            diameter: state.geometry.diameter_mm,
            area: derived.area_mm2,
            conductivity: conductivity.unwrap_or(0.0),
            conductivity_valid: conductivity.is_some(),
        })
    }

    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, NetError> {
        serde_json_core::to_slice(self, buf).map_err(|_| NetError::Encode)
    }
}

// ── Delivery ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Delivery {
    Accepted,
    /// Endpoint answered with some other status
    Refused(u16),
    /// Not attempted, link down
    Offline,
    Failed(NetError),
}

/// One delivery attempt, bounded by `timeout`.
pub async fn deliver<U: Uplink>(uplink: &mut U, record: &UplinkRecord, timeout: Duration) -> Delivery {
    if !uplink.is_connected() {
        return Delivery::Offline;
    }

    let mut buf = [0u8; RECORD_BUF];
    let len = match record.encode(&mut buf) {
        Ok(len) => len,
        Err(e) => return Delivery::Failed(e),
    };

    match with_timeout(timeout, uplink.post(&buf[..len])).await {
        Ok(Ok(UPLINK_ACCEPTED_STATUS)) => Delivery::Accepted,
        Ok(Ok(status)) => Delivery::Refused(status),
        Ok(Err(e)) => Delivery::Failed(e),
        Err(_) => Delivery::Failed(NetError::Timeout),
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkerEvent {
    Delivered(Delivery),
    LoggedOut(Result<(), NetError>),
}

pub struct UplinkWorker<'a, U> {
    uplink: U,
    queue: UplinkReceiver<'a>,
    pulses: PulseSender<'a>,
    session: &'a SessionSignal,
    upload_timeout: Duration,
    logout_timeout: Duration,
}

impl<'a, U: Uplink> UplinkWorker<'a, U> {
    pub fn new(
        uplink: U,
        queue: UplinkReceiver<'a>,
        pulses: PulseSender<'a>,
        session: &'a SessionSignal,
        config: &RigConfig,
    ) -> Self {
        Self {
            uplink,
            queue,
            pulses,
            session,
            upload_timeout: config.uplink_timeout,
            logout_timeout: config.logout_timeout,
        }
    }

    pub async fn run(mut self) -> ! {
        loop {
            self.step().await;
        }
    }

    /// Wait for the next record or session action and handle it.
    pub async fn step(&mut self) -> WorkerEvent {
        let next = select(self.queue.receive(), self.session.wait()).await;
        match next {
            Either::First(record) => WorkerEvent::Delivered(self.upload(record).await),
            Either::Second(SessionAction::Logout) => WorkerEvent::LoggedOut(self.logout().await),
        }
    }

    async fn upload(&mut self, record: UplinkRecord) -> Delivery {
        let outcome = deliver(&mut self.uplink, &record, self.upload_timeout).await;
        match outcome {
            Delivery::Accepted => {
                debug!("uplink accepted");
                self.pulses.send(Pulse).await;
            }
            Delivery::Refused(status) => warn!("uplink refused, status {=u16}", status),
            Delivery::Offline => debug!("uplink offline, record discarded"),
            Delivery::Failed(e) => warn!("uplink failed: {}", e),
        }
        outcome
    }

    async fn logout(&mut self) -> Result<(), NetError> {
        let result = match with_timeout(self.logout_timeout, self.uplink.logout()).await {
            Ok(r) => r,
            Err(_) => Err(NetError::Timeout),
        };
        match result {
            Ok(()) => info!("session logged out"),
            Err(e) => warn!("logout abandoned: {}", e),
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn uplink(&self) -> &U {
        &self.uplink
    }
}
