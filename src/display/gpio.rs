//! GPIO controller for the e-paper panel.
//!
//! Manages the control lines next to the SPI bus:
//! - RST (Reset)
//! - DC (Data/Command)
//! - BUSY (Inkplate 2: LOW = busy, HIGH = idle)
//! - PWR (Power), optional
//! - CS (Chip Select), optional, when the panel is not on a hardware CE line

use crate::config::PinConfig;
use rppal::gpio::{Gpio, InputPin, Level, OutputPin};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// GPIO-related errors
#[derive(Error, Debug)]
pub enum GpioError {
    #[error("GPIO initialization failed: {0}")]
    InitError(#[from] rppal::gpio::Error),
}

/// GPIO controller for the e-paper panel
pub struct GpioController {
    rst: OutputPin,
    dc: OutputPin,
    busy: InputPin,
    busy_level: Level,
    pwr: Option<OutputPin>,
    cs: Option<OutputPin>,
}

impl GpioController {
    /// Claim and initialize the configured pins
    pub fn new(pins: &PinConfig) -> Result<Self, GpioError> {
        let gpio = Gpio::new()?;

        let mut rst = gpio.get(pins.rst)?.into_output();
        let mut dc = gpio.get(pins.dc)?.into_output();
        let busy = gpio.get(pins.busy)?.into_input_pullup();
        let pwr = match pins.pwr {
            Some(pin) => Some(gpio.get(pin)?.into_output_low()),
            None => None,
        };
        let cs = match pins.cs {
            Some(pin) => Some(gpio.get(pin)?.into_output_high()),
            None => None,
        };

        // Initialize pins to known state
        rst.set_high();
        dc.set_low();

        let busy_level = if pins.busy_active_low {
            Level::Low
        } else {
            Level::High
        };

        tracing::debug!(
            "GPIO initialized: RST={}, DC={}, BUSY={} (busy {:?}), PWR={:?}, CS={:?}",
            pins.rst,
            pins.dc,
            pins.busy,
            busy_level,
            pins.pwr,
            pins.cs
        );

        Ok(Self {
            rst,
            dc,
            busy,
            busy_level,
            pwr,
            cs,
        })
    }

    /// Perform hardware reset sequence
    pub fn reset(&mut self) {
        tracing::debug!("Performing hardware reset");

        self.rst.set_high();
        thread::sleep(Duration::from_millis(20));

        self.rst.set_low();
        thread::sleep(Duration::from_millis(2));

        self.rst.set_high();
        thread::sleep(Duration::from_millis(20));
    }

    /// Check if display is currently busy
    pub fn is_busy(&self) -> bool {
        self.busy.read() == self.busy_level
    }

    /// Set DC pin low (command mode)
    #[inline]
    pub fn dc_low(&mut self) {
        self.dc.set_low();
    }

    /// Set DC pin high (data mode)
    #[inline]
    pub fn dc_high(&mut self) {
        self.dc.set_high();
    }

    /// Assert chip select, if a manual CS pin is configured
    #[inline]
    pub fn select(&mut self) {
        if let Some(cs) = self.cs.as_mut() {
            cs.set_low();
        }
    }

    /// Release chip select
    #[inline]
    pub fn deselect(&mut self) {
        if let Some(cs) = self.cs.as_mut() {
            cs.set_high();
        }
    }

    /// Enable display power
    pub fn power_on(&mut self) {
        if let Some(pwr) = self.pwr.as_mut() {
            tracing::debug!("Display power ON");
            pwr.set_high();
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Disable display power
    pub fn power_off(&mut self) {
        if let Some(pwr) = self.pwr.as_mut() {
            tracing::debug!("Display power OFF");
            pwr.set_low();
        }
    }
}

impl Drop for GpioController {
    fn drop(&mut self) {
        // Ensure power is off when controller is dropped
        self.power_off();
        tracing::debug!("GPIO controller dropped");
    }
}
