use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::spi::{Error, Instance, Spi};
use embassy_time::{Duration, Instant, Timer};

use cryo_kmeter::calibration::OffsetStore;
use cryo_kmeter::error::StorageError;

const CMD_JEDEC_ID: u8 = 0x9F;
const CMD_READ: u8 = 0x03;
const CMD_WRITE_ENABLE: u8 = 0x06;
const CMD_READ_STATUS1: u8 = 0x05;
const CMD_PAGE_PROGRAM: u8 = 0x02;
const CMD_SECTOR_ERASE: u8 = 0x20;

const STATUS_BUSY: u8 = 0x01;

/// Sector erase is specified at 400 ms worst case.
const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

/// Offset is stored at the start of sector 0.
const OFFSET_ADDR: u32 = 0x0000_0000;

pub struct W25qxx<'d, T: Instance> {
    spi: Spi<'d, T, NoDma, NoDma>,
    cs: Output<'d, AnyPin>,
}

impl<'d, T: Instance> W25qxx<'d, T> {
    pub fn new(spi: Spi<'d, T, NoDma, NoDma>, cs: Output<'d, AnyPin>) -> Self {
        Self { spi, cs }
    }

    pub fn read_id(&mut self) -> Result<[u8; 3], Error> {
        let mut id = [0u8; 3];
        self.cs.set_low();
        let res = self
            .spi
            .blocking_write(&[CMD_JEDEC_ID])
            .and_then(|_| self.spi.blocking_read(&mut id));
        self.cs.set_high();
        res.map(|_| id)
    }

    fn command(&mut self, header: &[u8], payload: &[u8]) -> Result<(), Error> {
        self.cs.set_low();
        let res = self
            .spi
            .blocking_write(header)
            .and_then(|_| self.spi.blocking_write(payload));
        self.cs.set_high();
        res
    }

    fn status(&mut self) -> Result<u8, Error> {
        let mut rx = [0u8; 2];
        self.cs.set_low();
        let res = self.spi.blocking_transfer(&mut rx, &[CMD_READ_STATUS1, 0x00]);
        self.cs.set_high();
        res.map(|_| rx[1])
    }

    async fn wait_idle(&mut self) -> Result<(), StorageError> {
        let start = Instant::now();
        loop {
            let status = self.status().map_err(|_| StorageError::Bus)?;
            if status & STATUS_BUSY == 0 {
                return Ok(());
            }
            if start.elapsed() > BUSY_TIMEOUT {
                return Err(StorageError::Timeout);
            }
            Timer::after(Duration::from_millis(1)).await;
        }
    }

    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let [_, a2, a1, a0] = addr.to_be_bytes();
        self.cs.set_low();
        let res = self
            .spi
            .blocking_write(&[CMD_READ, a2, a1, a0])
            .and_then(|_| self.spi.blocking_read(buf));
        self.cs.set_high();
        res.map_err(|_| StorageError::Bus)
    }

    pub async fn erase_sector(&mut self, addr: u32) -> Result<(), StorageError> {
        let [_, a2, a1, a0] = addr.to_be_bytes();
        self.command(&[CMD_WRITE_ENABLE], &[]).map_err(|_| StorageError::Bus)?;
        self.command(&[CMD_SECTOR_ERASE, a2, a1, a0], &[])
            .map_err(|_| StorageError::Bus)?;
        self.wait_idle().await
    }

    /// `data` must not cross a 256-byte page boundary.
    pub async fn program(&mut self, addr: u32, data: &[u8]) -> Result<(), StorageError> {
        let [_, a2, a1, a0] = addr.to_be_bytes();
        self.command(&[CMD_WRITE_ENABLE], &[]).map_err(|_| StorageError::Bus)?;
        self.command(&[CMD_PAGE_PROGRAM, a2, a1, a0], data)
            .map_err(|_| StorageError::Bus)?;
        self.wait_idle().await
    }
}

/// Calibration offset as a little-endian f32 at the start of flash.
impl<'d, T: Instance> OffsetStore for W25qxx<'d, T> {
    async fn load(&mut self) -> Result<f32, StorageError> {
        let mut raw = [0u8; 4];
        self.read(OFFSET_ADDR, &mut raw)?;
        Ok(f32::from_le_bytes(raw))
    }

    async fn save(&mut self, value: f32) -> Result<(), StorageError> {
        self.erase_sector(OFFSET_ADDR).await?;
        self.program(OFFSET_ADDR, &value.to_le_bytes()).await
    }
}
