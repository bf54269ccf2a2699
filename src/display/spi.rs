//! SPI transport for the e-paper panel.
//!
//! Sends commands and data over SPI0/CE0 with the DC and optional CS lines
//! driven from [`GpioController`]. [`SpiTransport`] is the [`Transport`]
//! the driver uses on the Raspberry Pi.

use super::gpio::GpioController;
use super::inkplate2::DisplayError;
use super::transport::Transport;
use crate::config::Config;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// SPI-related errors
#[derive(Error, Debug)]
pub enum SpiError {
    #[error("SPI initialization failed: {0}")]
    InitError(#[from] rppal::spi::Error),

    #[error("SPI write failed: {0}")]
    WriteError(String),
}

/// SPI display interface
pub struct SpiDisplay {
    spi: Spi,
}

impl SpiDisplay {
    /// Initialize SPI for display communication
    ///
    /// Uses SPI0, CE0, Mode 0 (CPOL=0, CPHA=0)
    pub fn new(clock_hz: u32) -> Result<Self, SpiError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, clock_hz, Mode::Mode0)?;

        tracing::debug!(
            "SPI initialized: Bus=SPI0, SS=CE0, Speed={}Hz, Mode=0",
            clock_hz
        );

        Ok(Self { spi })
    }

    /// Write raw bytes, DC must already be set
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SpiError> {
        self.spi
            .write(bytes)
            .map_err(|e| SpiError::WriteError(e.to_string()))?;
        Ok(())
    }

    /// Send a command byte to the display
    ///
    /// Sets DC pin LOW before sending (command mode)
    pub fn write_command(&mut self, gpio: &mut GpioController, cmd: u8) -> Result<(), SpiError> {
        gpio.dc_low();
        gpio.select();
        let result = self.write(&[cmd]);
        gpio.deselect();
        result
    }

    /// Send a single data byte to the display
    ///
    /// Sets DC pin HIGH before sending (data mode)
    pub fn write_data(&mut self, gpio: &mut GpioController, data: u8) -> Result<(), SpiError> {
        gpio.dc_high();
        gpio.select();
        let result = self.write(&[data]);
        gpio.deselect();
        result
    }
}

/// [`Transport`] over the Raspberry Pi SPI bus and GPIO lines
pub struct SpiTransport {
    spi: SpiDisplay,
    gpio: GpioController,
}

impl SpiTransport {
    pub fn new(config: &Config) -> Result<Self, DisplayError> {
        let mut gpio = GpioController::new(&config.pins)?;
        let spi = SpiDisplay::new(config.spi_clock_hz)?;
        gpio.power_on();
        Ok(Self { spi, gpio })
    }
}

impl Transport for SpiTransport {
    fn command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.spi.write_command(&mut self.gpio, cmd)?;
        Ok(())
    }

    fn data(&mut self, byte: u8) -> Result<(), DisplayError> {
        self.spi.write_data(&mut self.gpio, byte)?;
        Ok(())
    }

    fn start_data(&mut self) -> Result<(), DisplayError> {
        self.gpio.dc_high();
        self.gpio.select();
        Ok(())
    }

    fn end_data(&mut self) -> Result<(), DisplayError> {
        self.gpio.deselect();
        Ok(())
    }

    fn write_array(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        self.spi.write(bytes)?;
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        thread::sleep(Duration::from_micros(us as u64));
    }

    fn reset(&mut self) -> Result<(), DisplayError> {
        self.gpio.reset();
        Ok(())
    }

    fn is_busy(&mut self) -> bool {
        self.gpio.is_busy()
    }
}
