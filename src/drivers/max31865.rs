use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Instance, Spi};
use embassy_time::{Duration, Timer};
use micromath::F32Ext;

use cryo_kmeter::error::SensorError;
use cryo_kmeter::hal::{Probe, ProbeBank};

const REG_CONFIG: u8 = 0x00;
const REG_RTD_MSB: u8 = 0x01;
const REG_FAULT_STATUS: u8 = 0x07;
const WRITE: u8 = 0x80;

const CFG_BIAS: u8 = 0x80;
const CFG_ONE_SHOT: u8 = 0x20;
const CFG_THREE_WIRE: u8 = 0x10;
const CFG_FAULT_CLEAR: u8 = 0x02;
const CFG_FILTER_50HZ: u8 = 0x01;

// PT200 on a 430 Ω reference
const R_NOMINAL: f32 = 200.0;
const R_REF: f32 = 430.0;

// Callendar-Van Dusen, IEC 60751
const CVD_A: f32 = 3.9083e-3;
const CVD_B: f32 = -5.775e-7;

/// Two 2-wire MAX31865 converters sharing one SPI bus (mode 1).
pub struct Max31865Pair<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    /// [T1, T2]
    cs: [Output<'d, AnyPin>; 2],
}

impl<'d, T: Instance> Max31865Pair<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs_t1: Output<'d, AnyPin>, cs_t2: Output<'d, AnyPin>) -> Self {
        Self {
            spi,
            cs: [cs_t1, cs_t2],
        }
    }

    /// 2-wire, bias off, 50 Hz notch, faults cleared.
    pub fn init(&mut self) -> Result<(), SensorError> {
        for idx in 0..2 {
            let cfg = (CFG_FILTER_50HZ | CFG_FAULT_CLEAR) & !CFG_THREE_WIRE;
            self.write_reg(idx, REG_CONFIG, cfg)?;
        }
        Ok(())
    }

    fn write_reg(&mut self, idx: usize, reg: u8, value: u8) -> Result<(), SensorError> {
        let buf = [reg | WRITE, value];
        self.cs[idx].set_low();
        let res = self.spi.blocking_write(&buf);
        self.cs[idx].set_high();
        res.map_err(|_| SensorError::Bus)
    }

    fn read_regs<const N: usize>(&mut self, idx: usize, reg: u8) -> Result<[u8; N], SensorError> {
        let mut tx = [0u8; 3];
        let mut rx = [0u8; 3];
        tx[0] = reg & !WRITE;

        self.cs[idx].set_low();
        let res = self.spi.blocking_transfer(&mut rx[..N + 1], &tx[..N + 1]);
        self.cs[idx].set_high();
        res.map_err(|_| SensorError::Bus)?;

        let mut out = [0u8; N];
        out.copy_from_slice(&rx[1..N + 1]);
        Ok(out)
    }

    /// One-shot conversion, 15-bit RTD ratio.
    async fn read_rtd(&mut self, idx: usize) -> Result<u16, SensorError> {
        let [cfg] = self.read_regs::<1>(idx, REG_CONFIG)?;
        let cfg = (cfg & !0x2C) | CFG_FAULT_CLEAR;
        self.write_reg(idx, REG_CONFIG, cfg | CFG_BIAS)?;
        Timer::after(Duration::from_millis(10)).await;
        self.write_reg(idx, REG_CONFIG, cfg | CFG_BIAS | CFG_ONE_SHOT)?;
        Timer::after(Duration::from_millis(65)).await;

        let [msb, lsb] = self.read_regs::<2>(idx, REG_RTD_MSB)?;
        self.write_reg(idx, REG_CONFIG, cfg & !CFG_BIAS)?;

        if lsb & 0x01 != 0 {
            let [status] = self.read_regs::<1>(idx, REG_FAULT_STATUS)?;
            defmt::warn!("max31865[{}] fault {=u8:#x}", idx, status);
            return Err(SensorError::Fault);
        }
        Ok(u16::from_be_bytes([msb, lsb]) >> 1)
    }
}

impl<'d, T: Instance> ProbeBank for Max31865Pair<'d, T> {
    async fn read_celsius(&mut self, probe: Probe) -> Result<f32, SensorError> {
        let idx = match probe {
            Probe::T1 => 0,
            Probe::T2 => 1,
        };
        let rtd = self.read_rtd(idx).await?;
        let ohms = rtd as f32 / 32768.0 * R_REF;
        Ok(rtd_to_celsius(ohms))
    }
}

fn rtd_to_celsius(ohms: f32) -> f32 {
    let z1 = -CVD_A;
    let z2 = CVD_A * CVD_A - 4.0 * CVD_B;
    let z3 = 4.0 * CVD_B / R_NOMINAL;
    let z4 = 2.0 * CVD_B;

    let t = ((z2 + z3 * ohms).sqrt() + z1) / z4;
    if t >= 0.0 {
        return t;
    }

    // below 0 °C, polynomial fit on the PT100-normalised resistance
    let rt = ohms / R_NOMINAL * 100.0;
    let mut rpoly = rt;
    let mut t = -242.02 + 2.2228 * rpoly;
    rpoly *= rt;
    t += 2.5859e-3 * rpoly;
    rpoly *= rt;
    t -= 4.8260e-6 * rpoly;
    rpoly *= rt;
    t -= 2.8183e-8 * rpoly;
    rpoly *= rt;
    t += 1.5243e-10 * rpoly;
    t
}
