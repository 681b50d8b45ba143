#![no_std]
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

pub mod asynch;

// Used just to combine individual bits
macro_rules! bit {
    ($n:expr) => {
        1 << $n
    };
}

#[allow(dead_code)]
pub(crate) mod chip {
    /* Useful general chip constants */
    pub const I2C_ADDR: u8 = 0x29;
    pub const PART_ID: u8 = 0xA0;
    pub const PART_ID_MASK: u8 = 0xF0;
    pub const MANUFAC_ID: u8 = 0x05;
    pub const RESET_SETTLE_MS: u32 = 25;

    /* Available registers on the chip */
    pub mod reg {
        pub const ALS_CONTR: u8 = 0x80;
        pub const ALS_MEAS_RATE: u8 = 0x85;
        pub const PART_ID: u8 = 0x86;
        pub const MANUFAC_ID: u8 = 0x87;
        pub const ALS_DATA_CH1_0: u8 = 0x88;
        pub const ALS_DATA_CH1_1: u8 = 0x89;
        pub const ALS_DATA_CH0_0: u8 = 0x8A;
        pub const ALS_DATA_CH0_1: u8 = 0x8B;
        pub const ALS_STATUS: u8 = 0x8C;
    }

    /* ALS_CONTR: (0x80): Reserved:7:5 | Gain:4:2 | SW Reset:1 | Mode:0 */
    pub mod contr {
        pub const MODE_MASK: u8 = bit!(0);
        pub const MODE_ACTIVE: u8 = bit!(0);
        pub const MODE_STANDBY: u8 = 0;
        pub const SW_RESET: u8 = bit!(1);
        pub const GAIN_MASK: u8 = bit!(4) | bit!(3) | bit!(2);
        pub const GAIN_SHIFT: u8 = 2;
    }

    /* ALS_MEAS_RATE: (0x85): Reserved:7:6 | Integration:5:3 | Rate:2:0 */
    pub mod meas_rate {
        pub const INT_TIME_MASK: u8 = bit!(5) | bit!(4) | bit!(3);
        pub const RATE_MASK: u8 = bit!(2) | bit!(1) | bit!(0);
    }

    /* ALS_STATUS: (0x8C): Valid:7 | Reserved:6 | Integration:5:3 | New Data:2 | Reserved:1:0 */
    pub mod status {
        pub const INT_TIME_MASK: u8 = bit!(5) | bit!(4) | bit!(3);
        pub const INT_TIME_SHIFT: u8 = 3;
        pub const NEW_DATA_MASK: u8 = bit!(2);
    }
}

/* Register values for the gain field, pre-shifted into ALS_CONTR bits 4:2.
 * Codes 4 and 5 are reserved by the chip and have no variant.
 */
#[derive(Clone, Copy)]
pub enum Gain {
    X1 = 0x00,
    X2 = 0x04,
    X4 = 0x08,
    X8 = 0x0C,
    X48 = 0x18,
    X96 = 0x1C,
}

// Pre-shifted into ALS_MEAS_RATE bits 5:3. Code order is the chip's, not numeric.
#[derive(Clone, Copy)]
pub enum Integration {
    T100ms = 0x00,
    T50ms = 0x08,
    T200ms = 0x10,
    T400ms = 0x18,
    T150ms = 0x20,
    T250ms = 0x28,
    T300ms = 0x30,
    T350ms = 0x38,
}

// Measurement repeat rate, ALS_MEAS_RATE bits 2:0
#[derive(Clone, Copy)]
pub enum MeasRate {
    R50ms = 0x00,
    R100ms = 0x01,
    R200ms = 0x02,
    R500ms = 0x03,
    R1000ms = 0x04,
    R2000ms = 0x05,
}

/* One complete reading. Raw channel counts and the two control codes come
 * straight off the chip; gain/int_time_ms/lux are derived from them.
 * A gain of 0 marks a reserved gain code the chip should never report.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sample {
    pub channel0: u16,
    pub channel1: u16,
    pub gain_code: u8,
    pub gain: u8,
    pub int_time_code: u8,
    pub int_time_ms: u16,
    pub lux: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Error<E> {
    I2cError(E),
    InvalidId(u8),
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::I2cError(error)
    }
}

/* Gain multiplier for a 3-bit gain code (ALS_CONTR bits 4:2).
 * Codes 4 and 5 are reserved on this part and decode to nothing.
 */
pub fn decode_gain(code: u8) -> Option<u8> {
    match code {
        0 => Some(1),
        1 => Some(2),
        2 => Some(4),
        3 => Some(8),
        6 => Some(48),
        7 => Some(96),
        _ => None,
    }
}

/* Integration time in ms for a 3-bit code (ALS_STATUS bits 5:3).
 * Unlike gain, every code is valid. The chip orders these oddly.
 */
pub fn decode_integration_time(code: u8) -> u16 {
    match code & 0b111 {
        0 => 100,
        1 => 50,
        2 => 200,
        3 => 400,
        4 => 150,
        5 => 250,
        6 => 300,
        _ => 350,
    }
}

/* Piecewise lux formula from Appendix A of the LTR-329 datasheet, selected
 * by the IR ratio ch1/(ch0+ch1). Pure; degenerate inputs and a ratio of
 * 0.85 or above (reading unreliable) yield 0.0 rather than an error.
 */
pub fn compute_lux(c0: u16, c1: u16, gain: u8, int_time_ms: u16) -> f32 {
    // Guards division by zero below; sum widened so 0xFFFF + 0xFFFF can't wrap
    if gain == 0 || int_time_ms == 0 || u32::from(c0) + u32::from(c1) == 0 {
        return 0.0;
    }

    let ratio = f32::from(c1) / (f32::from(c0) + f32::from(c1));

    // Division order (gain first, then integration time) kept as the datasheet writes it
    if ratio < 0.45 {
        (1.7743 * f32::from(c0) + 1.1059 * f32::from(c1)) / f32::from(gain) / f32::from(int_time_ms)
    } else if ratio < 0.64 {
        (4.2785 * f32::from(c0) - 1.9548 * f32::from(c1)) / f32::from(gain) / f32::from(int_time_ms)
    } else if ratio < 0.85 {
        (0.5926 * f32::from(c0) + 0.1185 * f32::from(c1)) / f32::from(gain) / f32::from(int_time_ms)
    } else {
        0.0
    }
}

#[derive(Debug)]
pub struct Ltr329<I> {
    i2c: I,
}

impl<I> Ltr329<I>
where
    I: I2c,
{
    /* Resets the chip, verifies the part ID (high nibble only, low nibble
     * is a silicon revision) and switches it from stand-by to active mode.
     * The delay is only needed here for the post-reset settle time.
     */
    pub fn new<D: DelayNs>(i2c: I, delay: &mut D) -> Result<Ltr329<I>, Error<I::Error>> {
        let mut ltr329 = Ltr329 { i2c };
        ltr329.reset(delay)?;

        let id = ltr329.get_part_id()?;
        if id & chip::PART_ID_MASK != chip::PART_ID {
            return Err(Error::InvalidId(id));
        }
        ltr329.active()?;

        Ok(ltr329)
    }

    pub fn write(&mut self, reg: u8, val: u8) -> Result<(), Error<I::Error>> {
        self.i2c.write(chip::I2C_ADDR, &[reg, val])?;
        Ok(())
    }

    pub fn read(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I::Error>> {
        self.i2c.write_read(chip::I2C_ADDR, &[reg], buf)?;
        Ok(())
    }

    pub fn update(&mut self, reg: u8, mask: u8, val: u8) -> Result<(), Error<I::Error>> {
        let mut old_value = [0u8; 1];
        self.read(reg, &mut old_value)?;

        let new_value = (old_value[0] & !mask) | (val & mask);
        if new_value != old_value[0] {
            self.write(reg, new_value)?;
        }

        Ok(())
    }

    pub fn reset<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<I::Error>> {
        self.write(chip::reg::ALS_CONTR, chip::contr::SW_RESET)?;
        delay.delay_ms(chip::RESET_SETTLE_MS);

        Ok(())
    }

    pub fn active(&mut self) -> Result<(), Error<I::Error>> {
        self.update(
            chip::reg::ALS_CONTR,
            chip::contr::MODE_MASK,
            chip::contr::MODE_ACTIVE,
        )
    }

    pub fn standby(&mut self) -> Result<(), Error<I::Error>> {
        self.update(
            chip::reg::ALS_CONTR,
            chip::contr::MODE_MASK,
            chip::contr::MODE_STANDBY,
        )
    }

    pub fn get_part_id(&mut self) -> Result<u8, Error<I::Error>> {
        let mut part_id = [0u8; 1];
        self.read(chip::reg::PART_ID, &mut part_id)?;
        Ok(part_id[0])
    }

    pub fn get_manufacturer_id(&mut self) -> Result<u8, Error<I::Error>> {
        let mut mfc_id = [0u8; 1];
        self.read(chip::reg::MANUFAC_ID, &mut mfc_id)?;
        Ok(mfc_id[0])
    }

    pub fn set_gain(&mut self, gain: Gain) -> Result<(), Error<I::Error>> {
        self.update(chip::reg::ALS_CONTR, chip::contr::GAIN_MASK, gain as u8)
    }

    pub fn set_integration_time(&mut self, time: Integration) -> Result<(), Error<I::Error>> {
        self.update(
            chip::reg::ALS_MEAS_RATE,
            chip::meas_rate::INT_TIME_MASK,
            time as u8,
        )
    }

    pub fn set_meas_rate(&mut self, rate: MeasRate) -> Result<(), Error<I::Error>> {
        self.update(
            chip::reg::ALS_MEAS_RATE,
            chip::meas_rate::RATE_MASK,
            rate as u8,
        )
    }

    pub fn is_data_ready(&mut self) -> Result<bool, Error<I::Error>> {
        let mut status = [0u8; 1];
        self.read(chip::reg::ALS_STATUS, &mut status)?;

        Ok(status[0] & chip::status::NEW_DATA_MASK != 0)
    }

    /* Reads one complete sample and derives the physical values from it.
     * Any failed bus transaction aborts the whole sample; no field is ever
     * substituted with a made-up value.
     */
    pub fn read_sample(&mut self) -> Result<Sample, Error<I::Error>> {
        /* Reads CH1 low/high then CH0 low/high in one burst starting at
         * ALS_DATA_CH1_0, so the halves of each channel stay paired and
         * CH1 is read first as the datasheet asks.
         */
        let mut als_data = [0u8; 4];
        self.read(chip::reg::ALS_DATA_CH1_0, &mut als_data)?;

        let channel1 = u16::from_le_bytes([als_data[0], als_data[1]]);
        let channel0 = u16::from_le_bytes([als_data[2], als_data[3]]);

        let mut contr = [0u8; 1];
        self.read(chip::reg::ALS_CONTR, &mut contr)?;
        let gain_code = (contr[0] & chip::contr::GAIN_MASK) >> chip::contr::GAIN_SHIFT;

        let mut status = [0u8; 1];
        self.read(chip::reg::ALS_STATUS, &mut status)?;
        let int_time_code =
            (status[0] & chip::status::INT_TIME_MASK) >> chip::status::INT_TIME_SHIFT;

        // A reserved gain code decodes to 0, which compute_lux treats as degenerate
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

    // Releases the bus, e.g. to hand it to another device sharing it
    pub fn destroy(self) -> I {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;

    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use super::*;

    const ADDR: u8 = 0x29;

    #[test]
    fn decode_gain_table() {
        assert_eq!(decode_gain(0), Some(1));
        assert_eq!(decode_gain(1), Some(2));
        assert_eq!(decode_gain(2), Some(4));
        assert_eq!(decode_gain(3), Some(8));
        assert_eq!(decode_gain(6), Some(48));
        assert_eq!(decode_gain(7), Some(96));
    }

    #[test]
    fn decode_gain_reserved_codes() {
        assert_eq!(decode_gain(4), None);
        assert_eq!(decode_gain(5), None);
    }

    #[test]
    fn decode_integration_time_table() {
        let expected = [100, 50, 200, 400, 150, 250, 300, 350];
        for (code, ms) in expected.iter().enumerate() {
            assert_eq!(decode_integration_time(code as u8), *ms);
        }
    }

    #[test]
    fn lux_degenerate_inputs() {
        assert_eq!(compute_lux(0, 0, 1, 100), 0.0);
        assert_eq!(compute_lux(1000, 200, 0, 100), 0.0);
        assert_eq!(compute_lux(1000, 200, 1, 0), 0.0);
    }

    #[test]
    fn lux_low_ratio() {
        // Worked example from Appendix A: ratio 0.1667, first formula, ~19.955 lux
        let lux = compute_lux(1000, 200, 1, 100);
        assert!((lux - 19.955).abs() < 1e-3);
    }

    #[test]
    fn lux_ratio_boundary_0_45() {
        // 45 / (55 + 45) is exactly 0.45, which belongs to the second formula
        let expected = (4.2785 * 55.0f32 - 1.9548 * 45.0) / 1.0 / 100.0;
        assert_eq!(compute_lux(55, 45, 1, 100), expected);
    }

    #[test]
    fn lux_ratio_boundary_0_64() {
        // 64 / (36 + 64) is exactly 0.64, which belongs to the third formula
        let expected = (0.5926 * 36.0f32 + 0.1185 * 64.0) / 1.0 / 100.0;
        assert_eq!(compute_lux(36, 64, 1, 100), expected);
    }

    #[test]
    fn lux_ratio_boundary_0_85() {
        // 85 / (15 + 85) is exactly 0.85, where the chip calls the reading unreliable
        assert_eq!(compute_lux(15, 85, 1, 100), 0.0);
    }

    #[test]
    fn lux_scales_with_gain_and_integration_time() {
        let base = compute_lux(1000, 200, 1, 100);
        assert!((compute_lux(1000, 200, 8, 100) - base / 8.0).abs() < 1e-6);
        assert!((compute_lux(1000, 200, 1, 400) - base / 4.0).abs() < 1e-6);
    }

    #[test]
    fn lux_is_pure() {
        assert_eq!(
            compute_lux(1234, 567, 2, 200),
            compute_lux(1234, 567, 2, 200)
        );
    }

    #[test]
    fn new_resets_checks_id_and_activates() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x80, 0x02]),
            I2cTransaction::write_read(ADDR, vec![0x86], vec![0xA0]),
            I2cTransaction::write_read(ADDR, vec![0x80], vec![0x00]),
            I2cTransaction::write(ADDR, vec![0x80, 0x01]),
        ];
        let i2c = I2cMock::new(&expectations);

        let ltr329 = Ltr329::new(i2c, &mut NoopDelay).unwrap();
        ltr329.destroy().done();
    }

    #[test]
    fn new_accepts_any_part_id_revision() {
        // Low nibble of PART_ID is a revision and must not fail the check
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x80, 0x02]),
            I2cTransaction::write_read(ADDR, vec![0x86], vec![0xA3]),
            I2cTransaction::write_read(ADDR, vec![0x80], vec![0x00]),
            I2cTransaction::write(ADDR, vec![0x80, 0x01]),
        ];
        let i2c = I2cMock::new(&expectations);

        let ltr329 = Ltr329::new(i2c, &mut NoopDelay).unwrap();
        ltr329.destroy().done();
    }

    #[test]
    fn new_rejects_wrong_part_id() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x80, 0x02]),
            I2cTransaction::write_read(ADDR, vec![0x86], vec![0x50]),
        ];
        let i2c = I2cMock::new(&expectations);
        let mut i2c_clone = i2c.clone();

        let err = Ltr329::new(i2c, &mut NoopDelay).unwrap_err();
        assert_eq!(err, Error::InvalidId(0x50));
        i2c_clone.done();
    }

    #[test]
    fn read_sample_decodes_fields_and_lux() {
        let expectations = [
            // CH1 = 200, CH0 = 1000
            I2cTransaction::write_read(ADDR, vec![0x88], vec![0xC8, 0x00, 0xE8, 0x03]),
            // Active mode, gain code 0 (1x)
            I2cTransaction::write_read(ADDR, vec![0x80], vec![0x01]),
            // New data set, integration time code 0 (100ms)
            I2cTransaction::write_read(ADDR, vec![0x8C], vec![0x04]),
        ];
        let i2c = I2cMock::new(&expectations);

        let mut ltr329 = Ltr329 { i2c };
        let sample = ltr329.read_sample().unwrap();

        assert_eq!(sample.channel0, 1000);
        assert_eq!(sample.channel1, 200);
        assert_eq!(sample.gain_code, 0);
        assert_eq!(sample.gain, 1);
        assert_eq!(sample.int_time_code, 0);
        assert_eq!(sample.int_time_ms, 100);
        assert!((sample.lux - 19.955).abs() < 1e-3);

        ltr329.destroy().done();
    }

    #[test]
    fn read_sample_extracts_codes_from_bitfields() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0x88], vec![0x10, 0x00, 0x40, 0x00]),
            // Gain bits 4:2 = 0b110 (48x), surrounded by set neighbor bits
            I2cTransaction::write_read(ADDR, vec![0x80], vec![0b0011_1011]),
            // Integration bits 5:3 = 0b011 (400ms), valid + new-data bits also set
            I2cTransaction::write_read(ADDR, vec![0x8C], vec![0b1001_1100]),
        ];
        let i2c = I2cMock::new(&expectations);

        let mut ltr329 = Ltr329 { i2c };
        let sample = ltr329.read_sample().unwrap();

        assert_eq!(sample.gain_code, 6);
        assert_eq!(sample.gain, 48);
        assert_eq!(sample.int_time_code, 3);
        assert_eq!(sample.int_time_ms, 400);

        ltr329.destroy().done();
    }

    #[test]
    fn read_sample_reserved_gain_code_gives_zero_lux() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0x88], vec![0xC8, 0x00, 0xE8, 0x03]),
            // Gain code 4 is reserved
            I2cTransaction::write_read(ADDR, vec![0x80], vec![0b0001_0001]),
            I2cTransaction::write_read(ADDR, vec![0x8C], vec![0x04]),
        ];
        let i2c = I2cMock::new(&expectations);

        let mut ltr329 = Ltr329 { i2c };
        let sample = ltr329.read_sample().unwrap();

        assert_eq!(sample.gain_code, 4);
        assert_eq!(sample.gain, 0);
        assert_eq!(sample.lux, 0.0);

        ltr329.destroy().done();
    }

    #[test]
    fn read_sample_fails_fast_on_bus_error() {
        let expectations =
            [
                I2cTransaction::write_read(ADDR, vec![0x88], vec![0, 0, 0, 0])
                    .with_error(ErrorKind::Other),
            ];
        let i2c = I2cMock::new(&expectations);

        let mut ltr329 = Ltr329 { i2c };
        assert_eq!(ltr329.read_sample(), Err(Error::I2cError(ErrorKind::Other)));

        ltr329.destroy().done();
    }

    #[test]
    fn set_gain_keeps_other_contr_bits() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0x80], vec![0x01]),
            I2cTransaction::write(ADDR, vec![0x80, 0x19]),
        ];
        let i2c = I2cMock::new(&expectations);

        let mut ltr329 = Ltr329 { i2c };
        ltr329.set_gain(Gain::X48).unwrap();

        ltr329.destroy().done();
    }

    #[test]
    fn set_integration_time_keeps_repeat_rate() {
        let expectations = [
            // Repeat rate 500ms already configured
            I2cTransaction::write_read(ADDR, vec![0x85], vec![0x03]),
            I2cTransaction::write(ADDR, vec![0x85, 0x13]),
        ];
        let i2c = I2cMock::new(&expectations);

        let mut ltr329 = Ltr329 { i2c };
        ltr329.set_integration_time(Integration::T200ms).unwrap();

        ltr329.destroy().done();
    }

    #[test]
    fn update_skips_write_when_unchanged() {
        let expectations = [I2cTransaction::write_read(ADDR, vec![0x80], vec![0x01])];
        let i2c = I2cMock::new(&expectations);

        let mut ltr329 = Ltr329 { i2c };
        ltr329.active().unwrap();

        ltr329.destroy().done();
    }

    #[test]
    fn data_ready_follows_status_bit() {
        let expectations = [
            I2cTransaction::write_read(ADDR, vec![0x8C], vec![0x04]),
            I2cTransaction::write_read(ADDR, vec![0x8C], vec![0x00]),
        ];
        let i2c = I2cMock::new(&expectations);

        let mut ltr329 = Ltr329 { i2c };
        assert!(ltr329.is_data_ready().unwrap());
        assert!(!ltr329.is_data_ready().unwrap());

        ltr329.destroy().done();
    }
}
