#![no_std]
#![no_main]

use core::fmt::Write;
use defmt::*;
use heapless::String;
use {defmt_rtt as _, panic_probe as _};

use embassy_executor::Spawner;
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::time::Hertz;
use embassy_stm32::usart::{Config, Uart};
use embassy_stm32::{bind_interrupts, peripherals, usart};
use embassy_time::{Delay, Timer};

use ltr329_rs::asynch::Ltr329;
use ltr329_rs::{Gain, Integration};

// For UART and I2C DMA handling
bind_interrupts!(struct Irqs {
    USART2 => usart::InterruptHandler<peripherals::USART2>;
    I2C1_EV => i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER => i2c::ErrorInterruptHandler<peripherals::I2C1>;
});

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_stm32::init(Default::default());

    // Configure UART to use DMA (non-blocking)
    let mut usart = unwrap!(Uart::new(
        p.USART2,
        p.PA3,
        p.PA2,
        Irqs,
        p.DMA1_CH6,
        p.DMA1_CH5,
        Config::default()
    ));

    /* I2C1 TX goes on stream 7 rather than stream 6, which USART2 TX
     * already occupies on DMA1.
     */
    let i2c = I2c::new(
        p.I2C1,
        p.PB8,
        p.PB9,
        Irqs,
        p.DMA1_CH7,
        p.DMA1_CH0,
        Hertz(300_000),
        Default::default(),
    );

    // Change settings to something other than default
    let mut ltr329 = Ltr329::new(i2c, &mut Delay)
        .await
        .expect("Failed to init sensor");
    ltr329
        .set_gain(Gain::X2)
        .await
        .expect("Failed to set sensor gain");
    ltr329
        .set_integration_time(Integration::T200ms)
        .await
        .expect("Failed to set sensor integration time");

    loop {
        let sample = ltr329
            .read_sample()
            .await
            .expect("Failed to read sample");

        let mut s: String<32> = String::new();
        core::write!(&mut s, "Lux: {}\r\n", sample.lux).unwrap();
        unwrap!(usart.write(s.as_bytes()).await);

        Timer::after_millis(600).await;
    }
}
