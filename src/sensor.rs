//! Gas sensor capability and the SGP30 adapter.
//!
//! The monitor only talks to [`GasSensor`]; the SGP30 implementation speaks
//! the Sensirion word protocol over any `embedded-hal` I2C bus, with the
//! Linux i2c-dev bus from `linux-embedded-hal` used on real hardware.

use crate::error::SensorError;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c};

/// One sampling tick's worth of sensor output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reading {
    /// Total volatile organic compounds (ppb).
    pub tvoc: u16,
    /// Equivalent CO2 (ppm).
    pub eco2: u16,
}

impl Reading {
    pub fn new(tvoc: u16, eco2: u16) -> Self {
        Self { tvoc, eco2 }
    }
}

/// IAQ drift-compensation state of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub eco2: u16,
    pub tvoc: u16,
}

impl Baseline {
    pub fn new(eco2: u16, tvoc: u16) -> Self {
        Self { eco2, tvoc }
    }

    /// Zero in either word is the "nothing stored" sentinel.
    pub fn is_valid(&self) -> bool {
        self.eco2 != 0 && self.tvoc != 0
    }
}

/// Narrow capability the calibration and sampling code needs from a sensor.
pub trait GasSensor {
    /// Probe the device and start its IAQ algorithm.
    fn begin(&mut self) -> Result<(), SensorError>;

    /// Take one IAQ measurement.
    fn measure(&mut self) -> Result<Reading, SensorError>;

    /// Read the current IAQ baseline.
    fn baseline(&mut self) -> Result<Baseline, SensorError>;

    /// Restore a previously saved IAQ baseline.
    fn set_baseline(&mut self, baseline: Baseline) -> Result<(), SensorError>;

    /// Restart the IAQ algorithm, discarding its learned baseline.
    fn reinitialize(&mut self) -> Result<(), SensorError>;
}

/// Default SGP30 I2C address.
pub const SGP30_ADDRESS: u8 = 0x58;

const CMD_IAQ_INIT: u16 = 0x2003;
const CMD_MEASURE_IAQ: u16 = 0x2008;
const CMD_GET_IAQ_BASELINE: u16 = 0x2015;
const CMD_SET_IAQ_BASELINE: u16 = 0x201E;
const CMD_GET_FEATURE_SET: u16 = 0x202F;

/// Product type nibble reported by the feature-set word.
const SGP30_PRODUCT_TYPE: u16 = 0x0020;

/// Sensirion CRC-8 (polynomial 0x31, init 0xFF) over one data word.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Sensirion SGP30 gas sensor on an I2C bus.
///
/// Commands block for the datasheet execution time via `delay`.
pub struct Sgp30<I, D> {
    i2c: I,
    delay: D,
}

impl<I: I2c, D: DelayNs> Sgp30<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self { i2c, delay }
    }

    fn command(&mut self, cmd: u16, args: &[u16], delay_ms: u32) -> Result<(), SensorError> {
        let mut frame = Vec::with_capacity(2 + args.len() * 3);
        frame.extend_from_slice(&cmd.to_be_bytes());
        for word in args {
            let bytes = word.to_be_bytes();
            frame.extend_from_slice(&bytes);
            frame.push(crc8(&bytes));
        }
        self.i2c
            .write(SGP30_ADDRESS, &frame)
            .map_err(|e| SensorError::Bus(e.kind()))?;
        self.delay.delay_ms(delay_ms);
        Ok(())
    }

    fn read_words<const N: usize>(&mut self) -> Result<[u16; N], SensorError> {
        let mut raw = vec![0u8; N * 3];
        self.i2c
            .read(SGP30_ADDRESS, &mut raw)
            .map_err(|e| SensorError::Bus(e.kind()))?;

        let mut words = [0u16; N];
        for (word, chunk) in words.iter_mut().zip(raw.chunks_exact(3)) {
            let expected = crc8(&chunk[..2]);
            if chunk[2] != expected {
                return Err(SensorError::Crc {
                    expected,
                    actual: chunk[2],
                });
            }
            *word = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Ok(words)
    }

    fn iaq_init(&mut self) -> Result<(), SensorError> {
        self.command(CMD_IAQ_INIT, &[], 10)
    }
}

impl<I: I2c, D: DelayNs> GasSensor for Sgp30<I, D> {
    fn begin(&mut self) -> Result<(), SensorError> {
        self.command(CMD_GET_FEATURE_SET, &[], 10)?;
        let [features] = self.read_words::<1>()?;
        if features & 0x00F0 != SGP30_PRODUCT_TYPE {
            return Err(SensorError::UnsupportedProduct(features));
        }
        self.iaq_init()
    }

    fn measure(&mut self) -> Result<Reading, SensorError> {
        self.command(CMD_MEASURE_IAQ, &[], 12)
            .and_then(|_| self.read_words::<2>())
            .map(|[eco2, tvoc]| Reading::new(tvoc, eco2))
            .map_err(|_| SensorError::MeasureFailed)
    }

    fn baseline(&mut self) -> Result<Baseline, SensorError> {
        self.command(CMD_GET_IAQ_BASELINE, &[], 10)
            .and_then(|_| self.read_words::<2>())
            .map(|[eco2, tvoc]| Baseline::new(eco2, tvoc))
            .map_err(|_| SensorError::BaselineReadFailed)
    }

    fn set_baseline(&mut self, baseline: Baseline) -> Result<(), SensorError> {
        // The device expects the TVOC word first.
        self.command(CMD_SET_IAQ_BASELINE, &[baseline.tvoc, baseline.eco2], 10)
            .map_err(|_| SensorError::BaselineWriteFailed {
                eco2_base: baseline.eco2,
                tvoc_base: baseline.tvoc,
            })
    }

    fn reinitialize(&mut self) -> Result<(), SensorError> {
        self.iaq_init().map_err(|_| SensorError::ReinitFailed)
    }
}

#[cfg(target_os = "linux")]
mod host {
    use super::{GasSensor, Sgp30};
    use crate::error::SensorError;
    use linux_embedded_hal::{Delay, I2cdev};

    /// SGP30 on an i2c-dev character device.
    pub type HostSgp30 = Sgp30<I2cdev, Delay>;

    impl Sgp30<I2cdev, Delay> {
        /// Open an SGP30 on `device` (e.g. `/dev/i2c-1`) and start its IAQ
        /// algorithm.
        pub fn open(device: &str) -> Result<Self, SensorError> {
            let i2c = I2cdev::new(device).map_err(|_| SensorError::NotDetected {
                device: device.to_string(),
            })?;
            let mut sensor = Self::new(i2c, Delay);
            sensor.begin()?;
            Ok(sensor)
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod host {
    use super::Sgp30;
    use crate::error::SensorError;
    use embedded_hal::delay::DelayNs;
    use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};

    /// Bus type for platforms without i2c-dev. It has no values, so a sensor
    /// over it can never be constructed.
    pub enum NoBus {}

    impl ErrorType for NoBus {
        type Error = ErrorKind;
    }

    impl I2c for NoBus {
        fn transaction(
            &mut self,
            _address: SevenBitAddress,
            _operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            match *self {}
        }
    }

    impl DelayNs for NoBus {
        fn delay_ns(&mut self, _ns: u32) {
            match *self {}
        }
    }

    pub type HostSgp30 = Sgp30<NoBus, NoBus>;

    impl Sgp30<NoBus, NoBus> {
        /// Always reports the sensor as absent.
        pub fn open(device: &str) -> Result<Self, SensorError> {
            Err(SensorError::NotDetected {
                device: device.to_string(),
            })
        }
    }
}

pub use host::HostSgp30;
