//! Transport and clock seams between the panel driver and the hardware.
//!
//! The driver only ever talks to the panel through [`Transport`], so the
//! same code runs against the Raspberry Pi SPI bus and the recording
//! transport used in tests.

use super::inkplate2::DisplayError;
use std::time::Instant;

/// Byte-level access to the panel controller
pub trait Transport {
    /// Send a single command byte (DC low)
    fn command(&mut self, cmd: u8) -> Result<(), DisplayError>;

    /// Send a single data byte (DC high)
    fn data(&mut self, byte: u8) -> Result<(), DisplayError>;

    /// Enter data mode and select the panel for a bulk write
    fn start_data(&mut self) -> Result<(), DisplayError>;

    /// Release the panel after a bulk write
    fn end_data(&mut self) -> Result<(), DisplayError>;

    /// Write bytes inside a frame opened by [`Transport::start_data`]
    fn write_array(&mut self, bytes: &[u8]) -> Result<(), DisplayError>;

    fn delay_us(&mut self, us: u32);

    /// Pulse the hardware reset line
    fn reset(&mut self) -> Result<(), DisplayError>;

    fn is_busy(&mut self) -> bool;

    /// Send a command followed by its data bytes
    fn command_data(&mut self, cmd: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.command(cmd)?;
        for &byte in data {
            self.data(byte)?;
        }
        Ok(())
    }

    /// Write one framed chunk. The frame is closed even if the write fails.
    fn write_frame(&mut self, bytes: &[u8]) -> Result<(), DisplayError> {
        self.start_data()?;
        let written = self.write_array(bytes);
        let ended = self.end_data();
        written.and(ended)
    }
}

/// Millisecond clock used for transfer deadlines. Wraps like `millis()`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Monotonic clock counting from its creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap-around
        self.origin.elapsed().as_millis() as u32
    }
}
