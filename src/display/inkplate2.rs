//! Inkplate 2 (104x212, black/white/red) e-paper display driver.
//!
//! Two 1-bit planes (B/W and red) are kept in one framebuffer and streamed
//! to the controller with a resumable, time-bounded transfer. Power and
//! refresh steps are fixed command sequences, called in order by the update
//! sequencer.
//!
//! Based on Soldered's reference implementation:
//! https://github.com/SolderedElectronics/Inkplate-Arduino-library

use super::gpio::GpioError;
use super::planes::{Color, FrameBuffer, PanelColor};
use super::spi::SpiError;
use super::transfer::{TransferEngine, TransferLimits};
use super::transport::{Clock, Transport};
use thiserror::Error;

/// Panel dimensions
pub const WIDTH: u32 = 104;
pub const HEIGHT: u32 = 212;

/// Panel controller commands
pub mod cmd {
    pub const PANEL_SETTING: u8 = 0x00;
    pub const POWER_OFF: u8 = 0x02;
    pub const POWER_ON: u8 = 0x04;
    pub const DEEP_SLEEP: u8 = 0x07;
    pub const DATA_START_BW: u8 = 0x10;
    pub const DATA_STOP: u8 = 0x11;
    pub const DISPLAY_REFRESH: u8 = 0x12;
    pub const DATA_START_RED: u8 = 0x13;
    pub const VCOM_DATA_INTERVAL: u8 = 0x50;
    pub const RESOLUTION_SETTING: u8 = 0x61;

    /// Deep sleep check code
    pub const DEEP_SLEEP_CHECK: u8 = 0xA5;
}

/// Time the controller needs after the refresh command (at least 200µs)
const REFRESH_SETTLE_US: u32 = 500;

/// Display driver errors
#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),

    #[error("SPI error: {0}")]
    Spi(#[from] SpiError),

    #[error("Invalid panel dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Invalid transfer chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("Busy timeout: display did not respond within {0}ms")]
    BusyTimeout(u32),
}

/// Inkplate 2 driver over any [`Transport`]
pub struct Inkplate2<T, C> {
    transport: T,
    clock: C,
    buffer: FrameBuffer,
    transfer: TransferEngine,
}

impl<T: Transport, C: Clock> Inkplate2<T, C> {
    /// Create a driver with a white framebuffer of `width` x `height`
    pub fn new(
        transport: T,
        clock: C,
        width: u32,
        height: u32,
        limits: TransferLimits,
    ) -> Result<Self, DisplayError> {
        // The resolution register holds the width in a single byte
        if width == 0 || height == 0 || width > 0xFF || height > 0xFFFF {
            return Err(DisplayError::InvalidDimensions { width, height });
        }

        let transfer = TransferEngine::new(limits)?;
        let buffer = FrameBuffer::new(width, height);

        tracing::debug!(
            "Inkplate 2 driver: {}x{}, {} byte buffer, {} byte chunks, {}ms budget",
            width,
            height,
            buffer.len(),
            limits.max_chunk,
            limits.budget_ms
        );

        Ok(Self {
            transport,
            clock,
            buffer,
            transfer,
        })
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    #[allow(dead_code)]
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Current transfer position in bytes
    #[allow(dead_code)]
    pub fn transfer_cursor(&self) -> usize {
        self.transfer.cursor()
    }

    /// Forget a partly sent transfer; the next one starts from byte 0
    pub fn abort_transfer(&mut self) {
        self.transfer.reset();
    }

    pub fn now_ms(&self) -> u32 {
        self.clock.now_ms()
    }

    pub fn is_busy(&mut self) -> bool {
        self.transport.is_busy()
    }

    /// Fill both planes with one color
    pub fn fill(&mut self, color: Color) {
        self.buffer.fill(PanelColor::classify(color));
    }

    /// Clear to white, like real paper
    pub fn clear(&mut self) {
        self.fill(Color::ON);
    }

    /// Set one pixel. Coordinates outside the panel are ignored.
    pub fn draw_pixel(&mut self, x: i32, y: i32, color: Color) {
        self.buffer.set_pixel(x, y, PanelColor::classify(color));
    }

    /// Draw horizontal black, red and white bands
    pub fn test_pattern(&mut self) {
        tracing::info!("Drawing test pattern");

        let band = (self.height() / 3).max(1) as i32;
        for y in 0..self.height() as i32 {
            let color = match y / band {
                0 => Color::OFF,
                1 => Color::RED,
                _ => Color::ON,
            };
            for x in 0..self.width() as i32 {
                self.draw_pixel(x, y, color);
            }
        }
    }

    /// Hardware reset
    pub fn reset(&mut self) -> Result<(), DisplayError> {
        tracing::debug!("Reset");
        self.transport.reset()
    }

    /// Panel configuration sent after reset.
    ///
    /// Power on (0x04) has to come first on this panel: it must be powered
    /// before it accepts configuration. The caller waits for idle afterwards.
    pub fn initialise(&mut self) -> Result<(), DisplayError> {
        let width = self.width();
        let height = self.height();
        tracing::info!("Initializing Inkplate 2 display ({}x{})", width, height);

        // Power on / wake from deep sleep
        self.transport.command(cmd::POWER_ON)?;

        // Panel setting: LUT from OTP 128x296, temperature sensor and booster timing
        self.transport.command_data(cmd::PANEL_SETTING, &[0x0F, 0x89])?;

        // Resolution setting
        self.transport.command_data(
            cmd::RESOLUTION_SETTING,
            &[width as u8, (height >> 8) as u8, (height & 0xFF) as u8],
        )?;

        // VCOM and data interval setting
        self.transport.command_data(cmd::VCOM_DATA_INTERVAL, &[0x77])?;

        Ok(())
    }

    /// Intentionally sends nothing.
    ///
    /// The panel is already powered from `initialise`; the step only exists
    /// because the update sequence has one.
    pub fn power_on(&mut self) -> Result<(), DisplayError> {
        tracing::debug!("Power on (already powered during init)");
        Ok(())
    }

    pub fn power_off(&mut self) -> Result<(), DisplayError> {
        tracing::debug!("Power off");
        self.transport
            .command_data(cmd::VCOM_DATA_INTERVAL, &[0xF7])?;
        self.transport.command(cmd::POWER_OFF)
    }

    /// Stop the data transfer and start the refresh back to back.
    ///
    /// No busy wait between the two: the stop command raises BUSY until the
    /// refresh has finished, so waiting there would stall the update for
    /// the whole refresh time.
    pub fn refresh_screen(&mut self) -> Result<(), DisplayError> {
        tracing::trace!("Refresh screen");
        self.transport.command_data(cmd::DATA_STOP, &[0x00])?;
        self.transport.command(cmd::DISPLAY_REFRESH)?;
        self.transport.delay_us(REFRESH_SETTLE_US);
        Ok(())
    }

    pub fn deep_sleep(&mut self) -> Result<(), DisplayError> {
        tracing::debug!("Deep sleep");
        self.transport
            .command_data(cmd::DEEP_SLEEP, &[cmd::DEEP_SLEEP_CHECK])
    }

    /// Stream the framebuffer, bounded by the per-call time budget.
    ///
    /// Returns `Ok(false)` when the caller has to come back on a later loop.
    pub fn transfer_data(&mut self) -> Result<bool, DisplayError> {
        self.transfer
            .step(&self.buffer, &mut self.transport, &self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::transport::mock::{Event, RecordingTransport, StepClock};

    fn panel(width: u32, height: u32, limits: TransferLimits) -> Inkplate2<RecordingTransport, StepClock> {
        Inkplate2::new(RecordingTransport::new(), StepClock::frozen(), width, height, limits).unwrap()
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        for (w, h) in [(0, 10), (10, 0), (256, 10), (10, 0x1_0000)] {
            let result = Inkplate2::new(
                RecordingTransport::new(),
                StepClock::frozen(),
                w,
                h,
                TransferLimits::default(),
            );
            assert!(matches!(result, Err(DisplayError::InvalidDimensions { .. })));
        }
    }

    #[test]
    fn test_fill_and_clear() {
        let mut epd = panel(WIDTH, HEIGHT, TransferLimits::default());
        assert_eq!(epd.buffer().len(), 2 * 2756);

        epd.fill(Color::OFF);
        assert!(epd.buffer().as_bytes().iter().all(|&b| b == 0xFF));

        epd.fill(Color::rgb(250, 20, 30));
        assert!(epd.buffer().as_bytes().iter().all(|&b| b == 0x00));

        epd.clear();
        assert!(epd.buffer().bw_plane().iter().all(|&b| b == 0x00));
        assert!(epd.buffer().red_plane().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_draw_pixel_uses_color_classification() {
        let mut epd = panel(16, 8, TransferLimits::default());

        epd.draw_pixel(3, 2, Color::OFF);
        epd.draw_pixel(4, 2, Color::RED);
        epd.draw_pixel(5, 2, Color::rgb(10, 200, 10));
        // Off wins even though the channels would not be red anyway
        epd.draw_pixel(6, 2, Color::new(0, 0, 0, 0));

        assert_eq!(epd.buffer().pixel_bits(3, 2), Some((true, true)));
        assert_eq!(epd.buffer().pixel_bits(4, 2), Some((false, false)));
        assert_eq!(epd.buffer().pixel_bits(5, 2), Some((false, true)));
        assert_eq!(epd.buffer().pixel_bits(6, 2), Some((true, true)));

        let before = epd.buffer().clone();
        epd.draw_pixel(16, 0, Color::OFF);
        epd.draw_pixel(-1, 0, Color::OFF);
        assert_eq!(epd.buffer(), &before);
    }

    #[test]
    fn test_init_sequence() {
        let mut epd = panel(WIDTH, HEIGHT, TransferLimits::default());
        epd.initialise().unwrap();

        assert_eq!(
            epd.transport().events,
            vec![
                Event::Command(0x04),
                Event::Command(0x00),
                Event::Data(0x0F),
                Event::Data(0x89),
                Event::Command(0x61),
                Event::Data(104),
                Event::Data(0x00),
                Event::Data(212),
                Event::Command(0x50),
                Event::Data(0x77),
            ]
        );
    }

    #[test]
    fn test_power_steps() {
        let mut epd = panel(WIDTH, HEIGHT, TransferLimits::default());

        epd.power_on().unwrap();
        assert!(epd.transport().events.is_empty());

        epd.refresh_screen().unwrap();
        assert_eq!(
            epd.transport().events,
            vec![
                Event::Command(0x11),
                Event::Data(0x00),
                Event::Command(0x12),
                Event::DelayUs(500),
            ]
        );

        epd.transport_mut().clear();
        epd.power_off().unwrap();
        assert_eq!(
            epd.transport().events,
            vec![Event::Command(0x50), Event::Data(0xF7), Event::Command(0x02)]
        );

        epd.transport_mut().clear();
        epd.deep_sleep().unwrap();
        assert_eq!(
            epd.transport().events,
            vec![Event::Command(0x07), Event::Data(0xA5)]
        );
    }

    #[test]
    fn test_transfer_data_streams_both_planes() {
        let mut epd = panel(
            16,
            8,
            TransferLimits {
                max_chunk: 4,
                budget_ms: u32::MAX,
            },
        );
        epd.fill(Color::RED);
        epd.draw_pixel(0, 0, Color::OFF);
        epd.draw_pixel(15, 7, Color::ON);

        assert!(epd.transfer_data().unwrap());
        assert_eq!(epd.transfer_cursor(), 0);
        assert_eq!(epd.transport().commands(), vec![0x10, 0x13]);
        assert_eq!(epd.transport().streamed(), epd.buffer().as_bytes());
    }

    #[test]
    fn test_test_pattern_bands() {
        let mut epd = panel(8, 9, TransferLimits::default());
        epd.test_pattern();

        assert_eq!(epd.buffer().pixel_bits(0, 0), Some(PanelColor::Black.bits()));
        assert_eq!(epd.buffer().pixel_bits(7, 4), Some(PanelColor::Red.bits()));
        assert_eq!(epd.buffer().pixel_bits(3, 8), Some(PanelColor::White.bits()));
    }
}
