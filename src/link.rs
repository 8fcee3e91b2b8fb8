//! Host link over USB CDC, speaking the [`cryo_kmeter::hostline`] protocol.
//!
//! The host bridge performs the actual HTTP POST and captive-portal
//! exchange and reports the outcome back on the same line protocol.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_usb::driver::EndpointError;
use serde::Serialize;

use cryo_kmeter::error::NetError;
use cryo_kmeter::hostline::{await_ack, frame_upload, AckSignal, HostLine, Line, UploadSeq, LINE_MAX};
use cryo_kmeter::request::{OperatorPort, OperatorReply, StateReport};
use cryo_kmeter::state::SharedState;
use cryo_kmeter::uplink::Uplink;

use crate::usb::{UsbSerial, MAX_PACKET};

static OUTBOX: Channel<CriticalSectionRawMutex, Line, 2> = Channel::new();
static UPLINK_ACK: AckSignal = Signal::new();
static PORTAL_ACK: Signal<CriticalSectionRawMutex, bool> = Signal::new();

#[derive(Serialize)]
struct StateLine<'a> {
    state: &'a StateReport,
}

// ── Uplink collaborator ───────────────────────────────────────────────────────

pub struct HostUplink {
    shared: &'static SharedState,
    seq: UploadSeq,
}

impl HostUplink {
    pub fn new(shared: &'static SharedState) -> Self {
        Self {
            shared,
            seq: UploadSeq::new(),
        }
    }
}

impl Uplink for HostUplink {
    fn is_connected(&self) -> bool {
        self.shared.link_up()
    }

    async fn post(&mut self, body: &[u8]) -> Result<u16, NetError> {
        let seq = self.seq.next();
        let line = frame_upload(seq, body)?;

        UPLINK_ACK.reset();
        OUTBOX.send(line).await;
        Ok(await_ack(&UPLINK_ACK, seq).await)
    }

    async fn logout(&mut self) -> Result<(), NetError> {
        if !self.shared.link_up() {
            return Err(NetError::Offline);
        }
        let mut line = Line::new();
        line.extend_from_slice(b"{\"logout\":true}\n").map_err(|_| NetError::Encode)?;

        PORTAL_ACK.reset();
        OUTBOX.send(line).await;
        if PORTAL_ACK.wait().await {
            Ok(())
        } else {
            Err(NetError::Transport)
        }
    }
}

// ── Serial session ────────────────────────────────────────────────────────────

#[embassy_executor::task]
pub async fn host_link_task(
    mut serial: UsbSerial<'static>,
    shared: &'static SharedState,
    operator: &'static OperatorPort,
) -> ! {
    loop {
        serial.wait_connection().await;
        shared.set_link_up(true);
        defmt::info!("host link up");

        let _ = session(&mut serial, operator).await;

        shared.set_link_up(false);
        defmt::info!("host link down");
    }
}

async fn session(serial: &mut UsbSerial<'static>, operator: &OperatorPort) -> Result<(), EndpointError> {
    let mut packet = [0u8; MAX_PACKET];
    let mut line = Line::new();
    let mut overflow = false;

    loop {
        let event = select(serial.read_packet(&mut packet), OUTBOX.receive()).await;
        match event {
            Either::First(read) => {
                let n = read?;
                for &b in &packet[..n] {
                    if b == b'\n' {
                        if !overflow {
                            handle_line(serial, operator, &line).await?;
                        }
                        line.clear();
                        overflow = false;
                    } else if b != b'\r' && line.push(b).is_err() {
                        if !overflow {
                            defmt::warn!("host line too long, dropped");
                        }
                        overflow = true;
                    }
                }
            }
            Either::Second(out) => write_line(serial, &out).await?,
        }
    }
}

async fn handle_line(
    serial: &mut UsbSerial<'static>,
    operator: &OperatorPort,
    line: &[u8],
) -> Result<(), EndpointError> {
    if line.is_empty() {
        return Ok(());
    }
    let form = match HostLine::parse(line) {
        Ok(HostLine::Ack { seq, status }) => {
            UPLINK_ACK.signal((seq, status));
            return Ok(());
        }
        Ok(HostLine::Portal(ok)) => {
            PORTAL_ACK.signal(ok);
            return Ok(());
        }
        Ok(HostLine::Form(form)) => form,
        Err(e) => {
            defmt::warn!("host line rejected: {}", e);
            return Ok(());
        }
    };
    for request in form.into_requests() {
        match operator.call(request).await {
            OperatorReply::State(report) => {
                let mut buf = [0u8; LINE_MAX];
                match serde_json_core::to_slice(&StateLine { state: &report }, &mut buf[..LINE_MAX - 1]) {
                    Ok(n) => {
                        buf[n] = b'\n';
                        write_line(serial, &buf[..=n]).await?;
                    }
                    Err(_) => defmt::warn!("state report does not fit a line"),
                }
            }
            OperatorReply::Applied => {}
            OperatorReply::Rejected(e) => defmt::warn!("{} rejected: {}", request, e),
        }
    }
    Ok(())
}

async fn write_line(serial: &mut UsbSerial<'static>, line: &[u8]) -> Result<(), EndpointError> {
    for chunk in line.chunks(MAX_PACKET) {
        serial.write_packet(chunk).await?;
    }
    // a full last packet needs a ZLP to end the transfer
    if line.len() % MAX_PACKET == 0 {
        serial.write_packet(&[]).await?;
    }
    Ok(())
}
