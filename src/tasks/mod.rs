//! Executor task wrappers. Embassy tasks cannot be generic, so each one pins
//! a core worker to the board's concrete collaborator types.

use embassy_executor::task;
use embassy_stm32::peripherals::{DMA1_CH0, DMA1_CH7, I2C1, SPI1, SPI2};

use cryo_kmeter::button::ButtonTask;
use cryo_kmeter::control::Controller;
use cryo_kmeter::indicator::{DataIndicator, LinkIndicator};
use cryo_kmeter::uplink::UplinkWorker;

use crate::board::{ButtonPin, LedPin, PwmHeater};
use crate::drivers::flash::W25qxx;
use crate::drivers::ina219::Ina219;
use crate::drivers::max31865::Max31865Pair;
use crate::link::HostUplink;

pub type Probes = Max31865Pair<'static, SPI1>;
pub type Power = Ina219<'static, I2C1, DMA1_CH7, DMA1_CH0>;
pub type OffsetFlash = W25qxx<'static, SPI2>;
pub type RigController = Controller<'static, Probes, Power, PwmHeater, LedPin, OffsetFlash>;

#[task]
pub async fn control_task(controller: RigController) -> ! {
    controller.run().await
}

#[task]
pub async fn uplink_task(worker: UplinkWorker<'static, HostUplink>) -> ! {
    worker.run().await
}

#[task]
pub async fn button_task(input: ButtonTask<'static, ButtonPin>) -> ! {
    input.run().await
}

#[task]
pub async fn link_led_task(led: LinkIndicator<'static, LedPin>) -> ! {
    led.run().await
}

#[task]
pub async fn data_led_task(led: DataIndicator<'static, LedPin>) -> ! {
    led.run().await
}
