//! In-memory collaborators for host tests.

use core::future::pending;

use embassy_time::Duration;

use crate::calibration::OffsetStore;
use crate::config::RigConfig;
use crate::error::{NetError, SensorError, StorageError};
use crate::hal::{HeaterDrive, Indicator, PowerMonitor, Probe, ProbeBank, PushButton};
use crate::heater::HeaterDuty;
use crate::uplink::Uplink;

/// Zero waits everywhere except the network bounds, which tests rely on.
pub fn test_config() -> RigConfig {
    RigConfig {
        measure_interval: Duration::from_ticks(0),
        uplink_interval: Duration::from_ticks(0),
        loop_yield: Duration::from_ticks(0),
        prefill_spacing: Duration::from_ticks(0),
        current_sample_spacing: Duration::from_ticks(0),
        data_pulse: Duration::from_ticks(0),
        uplink_timeout: Duration::from_millis(20),
        logout_timeout: Duration::from_millis(20),
        ..RigConfig::default()
    }
}

pub struct FakeProbes {
    pub t1_c: f32,
    pub t2_c: f32,
    pub fail: bool,
}

impl FakeProbes {
    pub fn new(t1_c: f32, t2_c: f32) -> Self {
        Self {
            t1_c,
            t2_c,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0.0, 0.0)
        }
    }
}

impl ProbeBank for FakeProbes {
    async fn read_celsius(&mut self, probe: Probe) -> Result<f32, SensorError> {
        if self.fail {
            return Err(SensorError::Bus);
        }
        Ok(match probe {
            Probe::T1 => self.t1_c,
            Probe::T2 => self.t2_c,
        })
    }
}

/// Constant bus voltage. Current reads walk `currents` cyclically when it is
/// non-empty, otherwise return `milliamps`.
pub struct FakePower {
    pub volts: f32,
    pub milliamps: f32,
    pub currents: Vec<f32>,
    pub current_reads: usize,
}

impl FakePower {
    pub fn new(volts: f32, milliamps: f32) -> Self {
        Self {
            volts,
            milliamps,
            currents: Vec::new(),
            current_reads: 0,
        }
    }

    pub fn sequence(volts: f32, currents: &[f32]) -> Self {
        Self {
            currents: currents.to_vec(),
            ..Self::new(volts, 0.0)
        }
    }
}

impl PowerMonitor for FakePower {
    async fn bus_voltage(&mut self) -> Result<f32, SensorError> {
        Ok(self.volts)
    }

    async fn current_ma(&mut self) -> Result<f32, SensorError> {
        let value = if self.currents.is_empty() {
            self.milliamps
        } else {
            self.currents[self.current_reads % self.currents.len()]
        };
        self.current_reads += 1;
        Ok(value)
    }
}

#[derive(Default)]
pub struct FakeDrive {
    pub last: Option<HeaterDuty>,
}

impl HeaterDrive for FakeDrive {
    fn write_duty(&mut self, duty: HeaterDuty) {
        self.last = Some(duty);
    }
}

#[derive(Default)]
pub struct FakeLed {
    pub on: bool,
    pub rising_edges: u32,
}

impl Indicator for FakeLed {
    fn set(&mut self, on: bool) {
        if on && !self.on {
            self.rising_edges += 1;
        }
        self.on = on;
    }
}

#[derive(Default)]
pub struct FakeButton {
    pub pressed: bool,
}

impl PushButton for FakeButton {
    fn is_pressed(&mut self) -> bool {
        self.pressed
    }
}

/// Four bytes of "flash", little-endian like the board store.
pub struct MemStore {
    raw: [u8; 4],
    fail: bool,
    pub saved: Option<f32>,
}

impl MemStore {
    pub fn with_raw(raw: [u8; 4]) -> Self {
        Self {
            raw,
            fail: false,
            saved: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::with_raw(0.0f32.to_le_bytes())
    }
}

impl OffsetStore for MemStore {
    async fn load(&mut self) -> Result<f32, StorageError> {
        if self.fail {
            return Err(StorageError::Bus);
        }
        Ok(f32::from_le_bytes(self.raw))
    }

    async fn save(&mut self, value: f32) -> Result<(), StorageError> {
        if self.fail {
            return Err(StorageError::Bus);
        }
        self.raw = value.to_le_bytes();
        self.saved = Some(value);
        Ok(())
    }
}

pub struct FakeUplink {
    connected: bool,
    status: u16,
    pub hang: bool,
    pub fail: bool,
    pub posts: u32,
    pub logouts: u32,
}

impl FakeUplink {
    pub fn online(status: u16) -> Self {
        Self {
            connected: true,
            status,
            hang: false,
            fail: false,
            posts: 0,
            logouts: 0,
        }
    }

    pub fn offline() -> Self {
        Self {
            connected: false,
            ..Self::online(0)
        }
    }
}

impl Uplink for FakeUplink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn post(&mut self, _body: &[u8]) -> Result<u16, NetError> {
        self.posts += 1;
        if self.hang {
            pending::<()>().await;
        }
        if self.fail {
            return Err(NetError::Transport);
        }
        Ok(self.status)
    }

    async fn logout(&mut self) -> Result<(), NetError> {
        self.logouts += 1;
        if self.hang {
            pending::<()>().await;
        }
        Ok(())
    }
}
