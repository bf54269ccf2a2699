//! Display module for the Inkplate 2 e-paper panel.
//!
//! The panel is a 104x212 black/white/red display driven over SPI. The
//! driver keeps two 1-bit planes in one framebuffer ([`planes`]) and streams
//! them with a resumable, time-bounded transfer ([`transfer`]). All hardware
//! access goes through the [`transport::Transport`] seam; [`spi`] and
//! [`gpio`] implement it on the Raspberry Pi.

pub mod gpio;
pub mod inkplate2;
pub mod planes;
pub mod spi;
pub mod transfer;
pub mod transport;

// Re-export main types
pub use inkplate2::{DisplayError, Inkplate2};
pub use spi::SpiTransport;
pub use transport::MonotonicClock;
