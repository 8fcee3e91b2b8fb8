use embassy_stm32::i2c::{I2c, Instance, RxDma, TxDma};

use cryo_kmeter::error::SensorError;
use cryo_kmeter::hal::PowerMonitor;

const ADDR: u8 = 0x40;
const REG_CONFIG: u8 = 0x00;
const REG_BUS_VOLTAGE: u8 = 0x02;
const REG_CURRENT: u8 = 0x04;
const REG_CALIBRATION: u8 = 0x05;

// 32 V range, /8 gain (320 mV), 12-bit bus and shunt, continuous
const CONFIG_32V_2A: u16 = 0x399F;
// 100 µA per current LSB with a 0.1 Ω shunt
const CALIBRATION_32V_2A: u16 = 4096;
const CURRENT_LSB_PER_MA: f32 = 10.0;

/// INA219 high-side monitor on the heater supply.
pub struct Ina219<'d, T: Instance, Tx, Rx> {
    i2c: I2c<'d, T, Tx, Rx>,
}

impl<'d, T: Instance, Tx: TxDma<T>, Rx: RxDma<T>> Ina219<'d, T, Tx, Rx> {
    pub fn new(i2c: I2c<'d, T, Tx, Rx>) -> Self {
        Self { i2c }
    }

    pub fn init(&mut self) -> Result<(), SensorError> {
        self.write_reg(REG_CALIBRATION, CALIBRATION_32V_2A)?;
        self.write_reg(REG_CONFIG, CONFIG_32V_2A)
    }

    fn write_reg(&mut self, reg: u8, value: u16) -> Result<(), SensorError> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .blocking_write(ADDR, &[reg, hi, lo])
            .map_err(|_| SensorError::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u16, SensorError> {
        let mut buf = [0u8; 2];
        self.i2c
            .blocking_write_read(ADDR, &[reg], &mut buf)
            .map_err(|_| SensorError::Bus)?;
        Ok(u16::from_be_bytes(buf))
    }
}

impl<'d, T: Instance, Tx: TxDma<T>, Rx: RxDma<T>> PowerMonitor for Ina219<'d, T, Tx, Rx> {
    async fn bus_voltage(&mut self) -> Result<f32, SensorError> {
        let raw = self.read_reg(REG_BUS_VOLTAGE)?;
        // bits 15..3, 4 mV per LSB
        let millivolts = (raw >> 3) as f32 * 4.0;
        Ok(millivolts / 1000.0)
    }

    async fn current_ma(&mut self) -> Result<f32, SensorError> {
        // a brownout resets calibration to zero, so rewrite it every time
        self.write_reg(REG_CALIBRATION, CALIBRATION_32V_2A)?;
        let raw = self.read_reg(REG_CURRENT)? as i16;
        Ok(raw as f32 / CURRENT_LSB_PER_MA)
    }
}
