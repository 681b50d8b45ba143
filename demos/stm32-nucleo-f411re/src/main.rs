#![no_std]
#![no_main]

use cortex_m_rt::entry;
use ltr329_rs::{Gain, Integration, Ltr329};
use panic_rtt_target as _;
use rtt_target::{rprintln, rtt_init_print};
use stm32f4xx_hal::{
    i2c::{DutyCycle, I2c, Mode},
    pac,
    prelude::*,
};

#[entry]
fn main() -> ! {
    rtt_init_print!();

    // Get access to peripherals
    let dp = pac::Peripherals::take().expect("Failed to get STM32 peripherals");
    let cp = pac::CorePeripherals::take().expect("Failed to get Cortex-M peripherals");

    // Set up and constrain our clocks
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.freeze();
    let mut delay = cp.SYST.delay(&clocks);

    // Setup GPIO pins for use by I2C
    let gpiob = dp.GPIOB.split();
    let scl = gpiob.pb8;
    let sda = gpiob.pb9;

    /* LTR-329 supports fast mode upto 400 KHz.
     * Don't expect the frequency given to actually be the frequency used,
     * using 300.kHz() here seems to work best.
     */
    let i2c = I2c::new(
        dp.I2C1,
        (scl, sda),
        Mode::Fast {
            frequency: 300.kHz(),
            duty_cycle: DutyCycle::Ratio16to9,
        },
        &clocks,
    );

    // Change settings to something other than default
    let mut ltr329 = Ltr329::new(i2c, &mut delay).expect("Failed to init sensor");
    ltr329.set_gain(Gain::X2).expect("Failed to set sensor gain");
    ltr329
        .set_integration_time(Integration::T200ms)
        .expect("Failed to set sensor integration time");

    loop {
        match ltr329.read_sample() {
            Ok(sample) => rprintln!("Lux: {}", sample.lux),
            Err(e) => rprintln!("Read failed: {:?}", e),
        }

        // Pace the loop so the sensor has a fresh reading each time round
        delay.delay(600.millis());
    }
}
