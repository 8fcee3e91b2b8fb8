//! Operator request surface.
//!
//! Requests arrive through an [`OperatorPort`] and are served by the control
//! task, which is the only writer of geometry, offset and heater duty.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::config::{GEOMETRY_MAX_MM, GEOMETRY_MIN_MM, OPERATOR_QUEUE_DEPTH};
use crate::error::RequestError;
use crate::state::InstrumentState;

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatorRequest {
    ReadState,
    /// mm
    SetThickness(f32),
    /// mm
    SetDiameter(f32),
    /// K, added to the current offset
    AdjustOffset(f32),
    /// K
    SetOffset(f32),
    /// Power level 0..=255, inverted to a duty value when applied
    SetHeaterLevel(u8),
}

impl OperatorRequest {
    /// Boundary check. Geometry outside the rig's mm range is rejected;
    /// offsets are clamped later, not rejected.
    pub fn validate(&self) -> Result<(), RequestError> {
        match *self {
            Self::SetThickness(mm) | Self::SetDiameter(mm) => {
                if !mm.is_finite() {
                    Err(RequestError::NonFinite)
                } else if !(GEOMETRY_MIN_MM..=GEOMETRY_MAX_MM).contains(&mm) {
                    Err(RequestError::OutOfRange)
                } else {
                    Ok(())
                }
            }
            Self::AdjustOffset(k) | Self::SetOffset(k) if !k.is_finite() => {
                Err(RequestError::NonFinite)
            }
            _ => Ok(()),
        }
    }
}

/// Settings form as posted by the operator page. Every field is optional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct OperatorForm {
    #[serde(default)]
    pub thickness: Option<f32>,
    #[serde(rename = "sampleDiameter", default)]
    pub sample_diameter: Option<f32>,
    #[serde(rename = "temperatureoffset", default)]
    pub temperature_offset: Option<f32>,
    #[serde(rename = "pwmValue", default)]
    pub pwm_value: Option<i32>,
}

/// Writes carried by one form plus the trailing state read.
pub type FormRequests = Vec<OperatorRequest, 5>;

impl OperatorForm {
    pub fn decode(body: &[u8]) -> Result<Self, RequestError> {
        serde_json_core::from_slice::<Self>(body)
            .map(|(form, _)| form)
            .map_err(|_| RequestError::Malformed)
    }

    /// Requests in field order, always ending with `ReadState`.
    pub fn into_requests(self) -> FormRequests {
        let mut out = FormRequests::new();
        let writes = [
            self.thickness.map(OperatorRequest::SetThickness),
            self.sample_diameter.map(OperatorRequest::SetDiameter),
            self.temperature_offset.map(OperatorRequest::AdjustOffset),
            self.pwm_value
                .map(|level| OperatorRequest::SetHeaterLevel(level.clamp(0, 255) as u8)),
        ];
        for req in writes.into_iter().flatten() {
            // capacity is one more than the number of fields
            let _ = out.push(req);
        }
        let _ = out.push(OperatorRequest::ReadState);
        out
    }
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// Full instrument state as reported to the operator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StateReport {
    pub temp1: f32,
    pub temp2: f32,
    #[serde(rename = "dT")]
    pub delta_t: f32,
    #[serde(rename = "power_mW")]
    pub power_mw: f32,
    #[serde(rename = "busVoltage")]
    pub bus_voltage: f32,
    #[serde(rename = "current_mA")]
    pub current_ma: f32,
    #[serde(rename = "thermalConductivity")]
    pub conductivity: f32,
    #[serde(rename = "conductivityValid")]
    pub conductivity_valid: bool,
    #[serde(rename = "mosfetState")]
    pub heater_on: bool,
    #[serde(rename = "heaterLevel")]
    pub heater_level: u8,
    pub thickness: f32,
    #[serde(rename = "sampleDiameter")]
    pub diameter: f32,
    #[serde(rename = "temperatureOffset")]
    pub offset: f32,
    #[serde(rename = "uplinkDropped")]
    pub uplink_dropped: u32,
    #[serde(rename = "sensorFaults")]
    pub sensor_faults: u32,
}

impl StateReport {
    pub fn new(state: &InstrumentState, uplink_dropped: u32, sensor_faults: u32) -> Self {
        let reading = state.reading.unwrap_or_default();
        let (delta_t, conductivity) = match state.derived {
            Some(d) => (d.delta_t, d.conductivity.value()),
            None => (0.0, None),
        };
        Self {
            temp1: reading.temp1,
            temp2: reading.temp2,
            delta_t,
            power_mw: reading.power_mw,
            bus_voltage: reading.bus_voltage,
            current_ma: reading.current_ma,
            conductivity: conductivity.unwrap_or(0.0),
            conductivity_valid: conductivity.is_some(),
            heater_on: state.heater.is_on(),
            heater_level: state.heater.level(),
            thickness: state.geometry.thickness_mm,
            diameter: state.geometry.diameter_mm,
            offset: state.offset_k,
            uplink_dropped,
            sensor_faults,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OperatorReply {
    State(StateReport),
    Applied,
    Rejected(RequestError),
}

// ── Port ──────────────────────────────────────────────────────────────────────

/// Request/reply pair of queues between one operator client and the control
/// task. Replies are matched to requests by order, so there must be a single
/// client awaiting `call` at a time.
pub struct OperatorPort {
    requests: Channel<CriticalSectionRawMutex, OperatorRequest, OPERATOR_QUEUE_DEPTH>,
    replies: Channel<CriticalSectionRawMutex, OperatorReply, OPERATOR_QUEUE_DEPTH>,
}

impl OperatorPort {
    pub const fn new() -> Self {
        Self {
            requests: Channel::new(),
            replies: Channel::new(),
        }
    }

    /// Client side: submit and wait for the answer.
    pub async fn call(&self, request: OperatorRequest) -> OperatorReply {
        self.requests.send(request).await;
        self.replies.receive().await
    }

    /// Server side: next pending request, if any.
    pub fn try_take(&self) -> Option<OperatorRequest> {
        self.requests.try_receive().ok()
    }

    /// Server side: never waits on the client.
    pub fn reply(&self, reply: OperatorReply) {
        if self.replies.try_send(reply).is_err() {
            warn!("operator reply dropped, client not reading");
        }
    }
}

impl Default for OperatorPort {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heater::HeaterDuty;
    use crate::physics::{Conductivity, Singularity};
    use crate::state::{Derived, Geometry, Snapshot};

    #[test]
    fn form_decodes_page_field_names() {
        let form = OperatorForm::decode(
            br#"{"thickness":4.5,"sampleDiameter":12,"temperatureoffset":-0.25,"pwmValue":300}"#,
        )
        .unwrap();
        assert_eq!(form.thickness, Some(4.5));
        assert_eq!(form.sample_diameter, Some(12.0));

        let reqs = form.into_requests();
        assert_eq!(
            reqs.as_slice(),
            &[
                OperatorRequest::SetThickness(4.5),
                OperatorRequest::SetDiameter(12.0),
                OperatorRequest::AdjustOffset(-0.25),
                OperatorRequest::SetHeaterLevel(255),
                OperatorRequest::ReadState,
            ]
        );
    }

    #[test]
    fn partial_form_only_carries_present_fields() {
        let reqs = OperatorForm::decode(br#"{"pwmValue":-5}"#).unwrap().into_requests();
        assert_eq!(
            reqs.as_slice(),
            &[OperatorRequest::SetHeaterLevel(0), OperatorRequest::ReadState]
        );
    }

    #[test]
    fn geometry_outside_rig_range_is_rejected() {
        assert_eq!(OperatorRequest::SetDiameter(1e-20).validate(), Err(RequestError::OutOfRange));
        assert_eq!(OperatorRequest::SetThickness(1e38).validate(), Err(RequestError::OutOfRange));
        assert_eq!(OperatorRequest::SetDiameter(GEOMETRY_MIN_MM).validate(), Ok(()));
        assert_eq!(OperatorRequest::SetThickness(GEOMETRY_MAX_MM).validate(), Ok(()));
    }

    #[test]
    fn non_numeric_field_is_malformed() {
        assert_eq!(
            OperatorForm::decode(br#"{"thickness":"thick"}"#),
            Err(RequestError::Malformed)
        );
        assert_eq!(OperatorForm::decode(b"thickness=4"), Err(RequestError::Malformed));
    }

    #[test]
    fn geometry_must_be_positive_and_finite() {
        assert_eq!(OperatorRequest::SetThickness(0.0).validate(), Err(RequestError::OutOfRange));
        assert_eq!(OperatorRequest::SetDiameter(-3.0).validate(), Err(RequestError::OutOfRange));
        assert_eq!(
            OperatorRequest::SetDiameter(f32::INFINITY).validate(),
            Err(RequestError::NonFinite)
        );
        assert_eq!(
            OperatorRequest::AdjustOffset(f32::NAN).validate(),
            Err(RequestError::NonFinite)
        );
        assert!(OperatorRequest::SetOffset(50.0).validate().is_ok());
        assert!(OperatorRequest::SetThickness(2.0).validate().is_ok());
    }

    #[test]
    fn report_uses_zero_for_undefined_conductivity() {
        let mut state = InstrumentState::new(Geometry::DEFAULT);
        state.reading = Some(Snapshot {
            temp1: 290.0,
            temp2: 290.0,
            ..Snapshot::default()
        });
        state.derived = Some(Derived {
            delta_t: 0.0,
            area_mm2: 78.5,
            conductivity: Conductivity::Undefined(Singularity::NoGradient),
        });
        state.heater = HeaterDuty::from_level(64);

        let report = StateReport::new(&state, 3, 1);
        assert_eq!(report.conductivity, 0.0);
        assert!(!report.conductivity_valid);
        assert!(report.heater_on);
        assert_eq!(report.heater_level, 64);
        assert_eq!(report.uplink_dropped, 3);

        let mut buf = [0u8; 512];
        let n = serde_json_core::to_slice(&report, &mut buf).unwrap();
        let text = core::str::from_utf8(&buf[..n]).unwrap();
        assert!(text.contains(r#""mosfetState":true"#));
        assert!(text.contains(r#""conductivityValid":false"#));
        assert!(text.contains(r#""dT":"#));
    }

    #[test]
    fn port_replies_in_order() {
        let port = OperatorPort::new();
        assert_eq!(port.try_take(), None);
        port.reply(OperatorReply::Applied);
        port.reply(OperatorReply::Rejected(RequestError::OutOfRange));
        let first = embassy_futures::block_on(port.replies.receive());
        assert_eq!(first, OperatorReply::Applied);
    }
}
