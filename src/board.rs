use embassy_stm32::gpio::{AnyPin, Input, Output};
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::rcc::*;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;
use embassy_stm32::Config;

use cryo_kmeter::hal::{HeaterDrive, Indicator, PushButton};
use cryo_kmeter::heater::HeaterDuty;

pub struct Board {
    pub p: embassy_stm32::Peripherals,
}

impl Board {
    pub fn init() -> Self {
        let mut config = Config::default();
        config.rcc.hse = Some(Hse {
            freq: TimeHertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL168,
            divp: Some(PllPDiv::DIV2), // 168 MHz
            divq: Some(PllQDiv::DIV7), // 48 MHz USB
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;

        let p = embassy_stm32::init(config);

        Self { p }
    }
}

// ── Pin adapters ──────────────────────────────────────────────────────────────

pub struct LedPin(pub Output<'static, AnyPin>);

impl Indicator for LedPin {
    fn set(&mut self, on: bool) {
        if on {
            self.0.set_high();
        } else {
            self.0.set_low();
        }
    }
}

/// Wired with an external pull-down, pressed reads high.
pub struct ButtonPin(pub Input<'static, AnyPin>);

impl PushButton for ButtonPin {
    fn is_pressed(&mut self) -> bool {
        self.0.is_high()
    }
}

/// MOSFET gate on TIM3 CH3. The driver stage is active-low, so the duty
/// value maps straight onto the compare register: 255 holds the gate off.
pub struct PwmHeater {
    pwm: SimplePwm<'static, TIM3>,
    max: u32,
}

impl PwmHeater {
    pub fn new(mut pwm: SimplePwm<'static, TIM3>) -> Self {
        let max = pwm.get_max_duty();
        // gate held off before the output is enabled
        pwm.set_duty(Channel::Ch3, max);
        pwm.enable(Channel::Ch3);
        let max = max as u32;
        Self { pwm, max }
    }
}

impl HeaterDrive for PwmHeater {
    fn write_duty(&mut self, duty: HeaterDuty) {
        let compare = self.max * duty.value() as u32 / u8::MAX as u32;
        self.pwm.set_duty(Channel::Ch3, compare as _);
    }
}
