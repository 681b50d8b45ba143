/* Async twin of the blocking driver, over the async HAL traits. Register
 * semantics and the decode pipeline are shared with the crate root.
 */
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::chip;
use crate::{compute_lux, decode_gain, decode_integration_time};
use crate::{Error, Gain, Integration, MeasRate, Sample};

pub struct Ltr329<I> {
    i2c: I,
}

impl<I> Ltr329<I>
where
    I: I2c,
{
    pub async fn new<D: DelayNs>(i2c: I, delay: &mut D) -> Result<Ltr329<I>, Error<I::Error>> {
        let mut ltr329 = Ltr329 { i2c };
        ltr329.reset(delay).await?;

        let id = ltr329.get_part_id().await?;
        if id & chip::PART_ID_MASK != chip::PART_ID {
            return Err(Error::InvalidId(id));
        }
        ltr329.active().await?;

        Ok(ltr329)
    }

    pub async fn write(&mut self, reg: u8, val: u8) -> Result<(), Error<I::Error>> {
        self.i2c.write(chip::I2C_ADDR, &[reg, val]).await?;
        Ok(())
    }

    pub async fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I::Error>> {
        self.i2c.write_read(chip::I2C_ADDR, &[reg], buf).await?;
        Ok(())
    }

    pub async fn update(&mut self, reg: u8, mask: u8, val: u8) -> Result<(), Error<I::Error>> {
        let mut old_value = [0u8; 1];
        self.read(reg, &mut old_value).await?;

        let new_value = (old_value[0] & !mask) | (val & mask);
        if new_value != old_value[0] {
            self.write(reg, new_value).await?;
        }

        Ok(())
    }

    pub async fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<I::Error>> {
        self.write(chip::reg::ALS_CONTR, chip::contr::SW_RESET).await?;
        delay.delay_ms(chip::RESET_SETTLE_MS).await;

        Ok(())
    }

    pub async fn active(&mut self) -> Result<(), Error<I::Error>> {
        self.update(
            chip::reg::ALS_CONTR,
            chip::contr::MODE_MASK,
            chip::contr::MODE_ACTIVE,
        )
        .await
    }

    pub async fn standby(&mut self) -> Result<(), Error<I::Error>> {
        self.update(
            chip::reg::ALS_CONTR,
            chip::contr::MODE_MASK,
            chip::contr::MODE_STANDBY,
        )
        .await
    }

    pub async fn get_part_id(&mut self) -> Result<u8, Error<I::Error>> {
        let mut part_id = [0u8; 1];
        self.read(chip::reg::PART_ID, &mut part_id).await?;
        Ok(part_id[0])
    }

    pub async fn get_manufacturer_id(&mut self) -> Result<u8, Error<I::Error>> {
        let mut mfc_id = [0u8; 1];
        self.read(chip::reg::MANUFAC_ID, &mut mfc_id).await?;
        Ok(mfc_id[0])
    }

    pub async fn set_gain(&mut self, gain: Gain) -> Result<(), Error<I::Error>> {
        self.update(chip::reg::ALS_CONTR, chip::contr::GAIN_MASK, gain as u8)
            .await
    }

    pub async fn set_integration_time(&mut self, time: Integration) -> Result<(), Error<I::Error>> {
        self.update(
            chip::reg::ALS_MEAS_RATE,
            chip::meas_rate::INT_TIME_MASK,
            time as u8,
        )
        .await
    }

    pub async fn set_meas_rate(&mut self, rate: MeasRate) -> Result<(), Error<I::Error>> {
        self.update(
            chip::reg::ALS_MEAS_RATE,
            chip::meas_rate::RATE_MASK,
            rate as u8,
        )
        .await
    }

    pub async fn is_data_ready(&mut self) -> Result<bool, Error<I::Error>> {
        let mut status = [0u8; 1];
        self.read(chip::reg::ALS_STATUS, &mut status).await?;

        Ok(status[0] & chip::status::NEW_DATA_MASK != 0)
    }

    // Same fail-fast sample read as the blocking driver
    pub async fn read_sample(&mut self) -> Result<Sample, Error<I::Error>> {
        let mut als_data = [0u8; 4];
        self.read(chip::reg::ALS_DATA_CH1_0, &mut als_data).await?;

        let channel1 = u16::from_le_bytes([als_data[0], als_data[1]]);
        let channel0 = u16::from_le_bytes([als_data[2], als_data[3]]);

        let mut contr = [0u8; 1];
        self.read(chip::reg::ALS_CONTR, &mut contr).await?;
        let gain_code = (contr[0] & chip::contr::GAIN_MASK) >> chip::contr::GAIN_SHIFT;

        let mut status = [0u8; 1];
        self.read(chip::reg::ALS_STATUS, &mut status).await?;
        let int_time_code =
            (status[0] & chip::status::INT_TIME_MASK) >> chip::status::INT_TIME_SHIFT;

        let gain = decode_gain(gain_code).unwrap_or(0);
        let int_time_ms = decode_integration_time(int_time_code);

        Ok(Sample {
            channel0,
            channel1,
            gain_code,
            gain,
            int_time_code,
            int_time_ms,
            lux: compute_lux(channel0, channel1, gain, int_time_ms),
        })
    }

    pub fn destroy(self) -> I {
        self.i2c
    }
}
