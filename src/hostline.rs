//! Line protocol spoken with the host bridge over the serial link.
//!
//! device → host: `{"seq":N,"upload":{..}}`, `{"logout":true}`, `{"state":{..}}`
//! host → device: `{"ack":302,"seq":N}`, `{"portal":true}`, or an operator form
//!
//! Every upload carries a sequence number that the host echoes in its ack,
//! so an ack for an upload abandoned on timeout cannot answer a later one.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::Vec;
use serde::Deserialize;

use crate::error::{NetError, RequestError};
use crate::request::OperatorForm;

pub const LINE_MAX: usize = 512;
pub type Line = Vec<u8, LINE_MAX>;

/// Latest `(seq, status)` reported by the host.
pub type AckSignal = Signal<CriticalSectionRawMutex, (u32, u16)>;

#[derive(Deserialize)]
struct HostAck {
    ack: u16,
    seq: u32,
}

#[derive(Deserialize)]
struct PortalAck {
    portal: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HostLine {
    Ack { seq: u32, status: u16 },
    Portal(bool),
    Form(OperatorForm),
}

impl HostLine {
    pub fn parse(line: &[u8]) -> Result<Self, RequestError> {
        if let Ok((HostAck { ack, seq }, _)) = serde_json_core::from_slice::<HostAck>(line) {
            return Ok(Self::Ack { seq, status: ack });
        }
        if let Ok((PortalAck { portal }, _)) = serde_json_core::from_slice::<PortalAck>(line) {
            return Ok(Self::Portal(portal));
        }
        OperatorForm::decode(line).map(Self::Form)
    }
}

/// Upload sequence numbers, wrapping.
#[derive(Debug, Default)]
pub struct UploadSeq(u32);

impl UploadSeq {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn next(&mut self) -> u32 {
        let seq = self.0;
        self.0 = self.0.wrapping_add(1);
        seq
    }
}

/// `{"seq":N,"upload":<body>}\n`
pub fn frame_upload(seq: u32, body: &[u8]) -> Result<Line, NetError> {
    let mut digits = [0u8; 10];
    let n = serde_json_core::to_slice(&seq, &mut digits).map_err(|_| NetError::Encode)?;

    let mut line = Line::new();
    let parts: [&[u8]; 5] = [b"{\"seq\":", &digits[..n], b",\"upload\":", body, b"}\n"];
    for part in parts {
        line.extend_from_slice(part).map_err(|_| NetError::Encode)?;
    }
    Ok(line)
}

/// Wait for the ack of upload `seq`, skipping stale ones.
pub async fn await_ack(acks: &AckSignal, seq: u32) -> u16 {
    loop {
        let (got, status) = acks.wait().await;
        if got == seq {
            return status;
        }
        warn!("stale ack for upload {=u32} ignored (waiting on {=u32})", got, seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::join::join;
    use embassy_futures::{block_on, yield_now};

    #[test]
    fn upload_line_carries_sequence() {
        let line = frame_upload(42, br#"{"temp1":300.0}"#).unwrap();
        assert_eq!(line.as_slice(), b"{\"seq\":42,\"upload\":{\"temp1\":300.0}}\n".as_slice());
    }

    #[test]
    fn oversized_body_is_an_encode_error() {
        let body = [b'1'; LINE_MAX];
        assert_eq!(frame_upload(0, &body), Err(NetError::Encode));
    }

    #[test]
    fn sequence_wraps() {
        let mut seq = UploadSeq(u32::MAX);
        assert_eq!(seq.next(), u32::MAX);
        assert_eq!(seq.next(), 0);
    }

    #[test]
    fn lines_are_told_apart() {
        assert_eq!(
            HostLine::parse(br#"{"ack":302,"seq":7}"#),
            Ok(HostLine::Ack { seq: 7, status: 302 })
        );
        assert_eq!(HostLine::parse(br#"{"portal":false}"#), Ok(HostLine::Portal(false)));
        assert!(matches!(
            HostLine::parse(br#"{"thickness":4.0}"#),
            Ok(HostLine::Form(OperatorForm { thickness: Some(t), .. })) if t == 4.0
        ));
        assert_eq!(HostLine::parse(b"garbage"), Err(RequestError::Malformed));
    }

    #[test]
    fn late_ack_of_abandoned_upload_does_not_answer_the_next() {
        let acks = AckSignal::new();
        let (status, _) = block_on(join(await_ack(&acks, 8), async {
            acks.signal((7, 302));
            yield_now().await;
            acks.signal((8, 500));
        }));
        assert_eq!(status, 500);
    }
}
