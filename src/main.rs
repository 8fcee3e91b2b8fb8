#![no_std]
#![no_main]

mod board;
mod drivers;
mod link;
mod tasks;
mod usb;

use embassy_executor::Spawner;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pin, Pull, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::spi::{Config as SpiConfig, Spi, MODE_1};
use embassy_stm32::time::{khz, Hertz as TimeHertz};
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use cryo_kmeter::button::ButtonTask;
use cryo_kmeter::channels::{HeaterQueue, PulseQueue, SessionSignal, UplinkQueue};
use cryo_kmeter::control::{ControlLinks, Controller, RigIo};
use cryo_kmeter::indicator::{DataIndicator, LinkIndicator};
use cryo_kmeter::request::OperatorPort;
use cryo_kmeter::uplink::UplinkWorker;
use cryo_kmeter::{Geometry, RigConfig, SharedState};

use crate::board::{Board, ButtonPin, LedPin, PwmHeater};
use crate::drivers::flash::W25qxx;
use crate::drivers::ina219::Ina219;
use crate::drivers::max31865::Max31865Pair;
use crate::link::HostUplink;

// ── Shared state and inter-task channels ──────────────────────────────────────
static SHARED: SharedState = SharedState::new(Geometry::DEFAULT);

static UPLINK_QUEUE:   UplinkQueue   = Channel::new();
static PULSE_QUEUE:    PulseQueue    = Channel::new();
static HEATER_INTENTS: HeaterQueue   = Channel::new();
static SESSION:        SessionSignal = Signal::new();
static OPERATOR:       OperatorPort  = OperatorPort::new();

// ── Interrupt bindings ────────────────────────────────────────────────────────
bind_interrupts!(struct Irqs {
    I2C1_EV => embassy_stm32::i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => embassy_stm32::i2c::ErrorInterruptHandler<peripherals::I2C1>;
});

async fn park() -> ! {
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let config = RigConfig::default();

    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    let p = board.p;
    defmt::info!("boot");

    // 2. USB CDC host link
    let (usb_dev, usb_serial) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
    spawner.spawn(usb::usb_task(usb_dev)).unwrap();
    spawner.spawn(link::host_link_task(usb_serial, &SHARED, &OPERATOR)).unwrap();

    // 3. SPI1 @ 1 MHz, mode 1: two MAX31865 (SCK=PA5, MOSI=PA7, MISO=PA6, CS=PA4/PC4)
    let mut rtd_config = SpiConfig::default();
    rtd_config.frequency = TimeHertz(1_000_000);
    rtd_config.mode = MODE_1;
    let rtd_spi = Spi::new(p.SPI1, p.PA5, p.PA7, p.PA6, NoDma, NoDma, rtd_config);
    let cs_t1 = Output::new(p.PA4.degrade(), Level::High, Speed::VeryHigh);
    let cs_t2 = Output::new(p.PC4.degrade(), Level::High, Speed::VeryHigh);
    let mut probes = Max31865Pair::new(rtd_spi, cs_t1, cs_t2);
    if probes.init().is_err() {
        defmt::warn!("MAX31865 config write failed");
    }

    // 4. I2C1 @ 400 kHz: INA219 (SCL=PB8, SDA=PB9)
    let i2c = I2c::new(
        p.I2C1,
        p.PB8, p.PB9,
        Irqs,
        p.DMA1_CH7,
        p.DMA1_CH0,
        TimeHertz(400_000),
        Default::default(),
    );
    let mut power = Ina219::new(i2c);
    if let Err(e) = power.init() {
        defmt::error!("INA219 not found: {}", e);
        park().await;
    }

    // 5. SPI2 @ 10 MHz: W25Qxx offset storage (SCK=PB13, MOSI=PB15, MISO=PB14, CS=PB12)
    let mut flash_config = SpiConfig::default();
    flash_config.frequency = TimeHertz(10_000_000);
    let flash_spi = Spi::new(p.SPI2, p.PB13, p.PB15, p.PB14, NoDma, NoDma, flash_config);
    let cs_flash = Output::new(p.PB12.degrade(), Level::High, Speed::VeryHigh);
    let mut flash = W25qxx::new(flash_spi, cs_flash);
    match flash.read_id() {
        Ok(id) => defmt::info!("flash id {:x}", id),
        Err(_) => defmt::warn!("flash not responding"),
    }

    // 6. Heater PWM 5 kHz on TIM3 CH3 (PB0), LEDs PC13/PC14/PC15, button PC0
    let heater_pin = PwmPin::new_ch3(p.PB0, OutputType::PushPull);
    let pwm = SimplePwm::new(p.TIM3, None, None, Some(heater_pin), None, khz(5), Default::default());
    let heater = PwmHeater::new(pwm);

    let link_led = LedPin(Output::new(p.PC13.degrade(), Level::High, Speed::Low));
    let heater_led = LedPin(Output::new(p.PC14.degrade(), Level::Low, Speed::Low));
    let data_led = LedPin(Output::new(p.PC15.degrade(), Level::Low, Speed::Low));
    let button = ButtonPin(Input::new(p.PC0.degrade(), Pull::Down));

    // 7. Offset load, heater off, filter pre-fill
    let io = RigIo {
        probes,
        power,
        heater_drive: heater,
        heater_led,
        store: flash,
    };
    let links = ControlLinks {
        shared: &SHARED,
        uplink: UPLINK_QUEUE.sender(),
        heater: HEATER_INTENTS.receiver(),
        operator: &OPERATOR,
        session: &SESSION,
    };
    let controller = match Controller::boot(io, links, config).await {
        Ok(controller) => controller,
        Err(e) => {
            defmt::error!("sensor pre-fill failed: {}, halting", e);
            park().await
        }
    };

    // 8. Spawn workers
    spawner.spawn(tasks::button_task(ButtonTask::new(
        button,
        &SHARED,
        HEATER_INTENTS.sender(),
        &config,
    ))).unwrap();

    spawner.spawn(tasks::control_task(controller)).unwrap();

    spawner.spawn(tasks::uplink_task(UplinkWorker::new(
        HostUplink::new(&SHARED),
        UPLINK_QUEUE.receiver(),
        PULSE_QUEUE.sender(),
        &SESSION,
        &config,
    ))).unwrap();

    spawner.spawn(tasks::link_led_task(LinkIndicator::new(link_led, &SHARED, &config))).unwrap();
    spawner.spawn(tasks::data_led_task(DataIndicator::new(
        data_led,
        PULSE_QUEUE.receiver(),
        &config,
    ))).unwrap();

    defmt::info!("running");
}
