//! Two-plane framebuffer for the black/white + red panel.
//!
//! The controller takes two independent 1-bit planes. Both live in one
//! contiguous buffer: the B/W plane in the first half, the red plane in the
//! second. Pixels are packed row-major, MSB first.
//!
//! Hardware encoding: B/W plane 1=black, 0=white; Red plane 0=red, 1=no red.

/// Application-level pixel color (RGBW, 8 bits per channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
}

impl Color {
    /// Every channel lit. Rendered as white, the panel's rest color.
    pub const ON: Color = Color::new(255, 255, 255, 255);

    /// Every channel dark. Rendered as black.
    pub const OFF: Color = Color::new(0, 0, 0, 0);

    pub const RED: Color = Color::rgb(255, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8, white: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white,
        }
    }

    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::new(red, green, blue, 0)
    }

    /// A color is "on" when any channel is non-zero
    pub fn is_on(&self) -> bool {
        self.red != 0 || self.green != 0 || self.blue != 0 || self.white != 0
    }
}

/// The three colors the panel can show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelColor {
    Black,
    Red,
    White,
}

impl PanelColor {
    /// Reduce an application color to a panel color.
    ///
    /// Black is decided by the on/off state alone and wins over red.
    pub fn classify(color: Color) -> Self {
        if !color.is_on() {
            PanelColor::Black
        } else if color.red > 200 && color.green < 100 && color.blue < 100 {
            PanelColor::Red
        } else {
            PanelColor::White
        }
    }

    /// Bit values as `(bw, red)`
    pub const fn bits(self) -> (bool, bool) {
        match self {
            PanelColor::Black => (true, true),
            PanelColor::Red => (false, false),
            PanelColor::White => (false, true),
        }
    }

    /// Whole-byte fill values as `(bw, red)`
    pub const fn fill_bytes(self) -> (u8, u8) {
        let (bw, red) = self.bits();
        (broadcast(bw), broadcast(red))
    }
}

impl From<Color> for PanelColor {
    fn from(color: Color) -> Self {
        PanelColor::classify(color)
    }
}

const fn broadcast(bit: bool) -> u8 {
    if bit { 0xFF } else { 0x00 }
}

/// Bytes needed for one 1-bit plane of the given dimensions
pub fn plane_len(width: u32, height: u32) -> usize {
    (width as usize * height as usize).div_ceil(8)
}

/// Both planes in one allocation, addressed as two fixed-offset halves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Allocate a buffer for `width` x `height` pixels, cleared to white
    pub fn new(width: u32, height: u32) -> Self {
        let mut buffer = Self {
            width,
            height,
            data: vec![0; 2 * plane_len(width, height)],
        };
        buffer.fill(PanelColor::White);
        buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Full buffer length (both planes)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length of a single plane; also the offset of the red plane
    pub fn half_len(&self) -> usize {
        self.data.len() / 2
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[allow(dead_code)]
    pub fn bw_plane(&self) -> &[u8] {
        &self.data[..self.half_len()]
    }

    #[allow(dead_code)]
    pub fn red_plane(&self) -> &[u8] {
        &self.data[self.half_len()..]
    }

    /// Byte-granular broadcast of one color over both planes
    pub fn fill(&mut self, color: PanelColor) {
        let (bw_byte, red_byte) = color.fill_bytes();
        let half = self.half_len();
        let (bw, red) = self.data.split_at_mut(half);
        bw.fill(bw_byte);
        red.fill(red_byte);
    }

    /// Set a single pixel in both planes. Out-of-range coordinates are ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: PanelColor) {
        let Some((pos, mask)) = self.locate(x, y) else {
            return;
        };

        let half = self.half_len();
        let (bw, red) = color.bits();

        write_bit(&mut self.data[pos], mask, bw);
        write_bit(&mut self.data[pos + half], mask, red);
    }

    /// Raw `(bw, red)` bits of a pixel, `None` when out of range
    #[cfg(test)]
    pub fn pixel_bits(&self, x: i32, y: i32) -> Option<(bool, bool)> {
        let (pos, mask) = self.locate(x, y)?;
        Some((
            self.data[pos] & mask != 0,
            self.data[pos + self.half_len()] & mask != 0,
        ))
    }

    /// Byte offset in the B/W plane and bit mask (MSB first) of a pixel
    fn locate(&self, x: i32, y: i32) -> Option<(usize, u8)> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let pos = (x as usize + y as usize * self.width as usize) / 8;
        let mask = 1u8 << (7 - (x as u32 & 0x07));
        Some((pos, mask))
    }
}

#[inline]
fn write_bit(byte: &mut u8, mask: u8, set: bool) {
    if set {
        *byte |= mask;
    } else {
        *byte &= !mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [PanelColor; 3] = [PanelColor::Black, PanelColor::Red, PanelColor::White];

    #[test]
    fn test_classify_black_wins_over_red() {
        assert_eq!(PanelColor::classify(Color::OFF), PanelColor::Black);
        assert_eq!(PanelColor::classify(Color::RED), PanelColor::Red);
        assert_eq!(PanelColor::classify(Color::ON), PanelColor::White);
    }

    #[test]
    fn test_classify_red_thresholds() {
        assert_eq!(PanelColor::classify(Color::rgb(201, 99, 99)), PanelColor::Red);
        assert_eq!(PanelColor::classify(Color::rgb(200, 0, 0)), PanelColor::White);
        assert_eq!(PanelColor::classify(Color::rgb(255, 100, 0)), PanelColor::White);
        assert_eq!(PanelColor::classify(Color::rgb(255, 0, 100)), PanelColor::White);
        // Only the white channel lit: on, not red
        assert_eq!(
            PanelColor::classify(Color::new(0, 0, 0, 1)),
            PanelColor::White
        );
    }

    #[test]
    fn test_plane_len_rounds_up() {
        assert_eq!(plane_len(104, 212), 2756);
        assert_eq!(plane_len(3, 3), 2);
        assert_eq!(FrameBuffer::new(3, 3).len(), 4);
    }

    #[test]
    fn test_new_buffer_is_white() {
        let fb = FrameBuffer::new(16, 8);
        assert!(fb.bw_plane().iter().all(|&b| b == 0x00));
        assert!(fb.red_plane().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_fill_bytes_per_color() {
        let mut fb = FrameBuffer::new(16, 8);

        fb.fill(PanelColor::Black);
        assert!(fb.bw_plane().iter().all(|&b| b == 0xFF));
        assert!(fb.red_plane().iter().all(|&b| b == 0xFF));

        fb.fill(PanelColor::Red);
        assert!(fb.as_bytes().iter().all(|&b| b == 0x00));

        fb.fill(PanelColor::White);
        assert!(fb.bw_plane().iter().all(|&b| b == 0x00));
        assert!(fb.red_plane().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_fill_white_is_idempotent() {
        let mut once = FrameBuffer::new(10, 7);
        once.fill(PanelColor::Red);
        once.fill(PanelColor::White);
        let mut twice = once.clone();
        twice.fill(PanelColor::White);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_set_pixel_touches_only_its_bits() {
        for start in ALL {
            for color in ALL {
                for (x, y) in [(0, 0), (7, 0), (8, 1), (13, 4), (15, 7)] {
                    let mut fb = FrameBuffer::new(16, 8);
                    fb.fill(start);
                    let before = fb.clone();

                    fb.set_pixel(x, y, color);
                    assert_eq!(fb.pixel_bits(x, y), Some(color.bits()));

                    let pos = (x as usize + y as usize * 16) / 8;
                    let mask = 1u8 << (7 - (x & 7));
                    let half = fb.half_len();
                    for (i, (&a, &b)) in before.as_bytes().iter().zip(fb.as_bytes()).enumerate() {
                        let allowed = if i == pos || i == pos + half { mask } else { 0 };
                        assert_eq!((a ^ b) & !allowed, 0, "byte {} changed outside mask", i);
                    }
                }
            }
        }
    }

    #[test]
    fn test_set_pixel_msb_first() {
        let mut fb = FrameBuffer::new(16, 2);
        fb.set_pixel(0, 0, PanelColor::Black);
        fb.set_pixel(9, 1, PanelColor::Red);
        assert_eq!(fb.bw_plane(), &[0x80, 0x00, 0x00, 0x00]);
        assert_eq!(fb.red_plane(), &[0xFF, 0xFF, 0xFF, 0xBF]);
    }

    #[test]
    fn test_pixel_bits_out_of_range() {
        let fb = FrameBuffer::new(16, 8);
        assert_eq!(fb.pixel_bits(-1, 0), None);
        assert_eq!(fb.pixel_bits(16, 0), None);
        assert_eq!(fb.pixel_bits(0, 8), None);
        assert_eq!(fb.pixel_bits(15, 7), Some(PanelColor::White.bits()));
    }

    #[test]
    fn test_set_pixel_out_of_range_is_ignored() {
        let mut fb = FrameBuffer::new(16, 8);
        fb.fill(PanelColor::Red);
        let before = fb.clone();

        for (x, y) in [(-1, 0), (0, -1), (16, 0), (0, 8), (i32::MIN, i32::MAX), (100, 100)] {
            fb.set_pixel(x, y, PanelColor::Black);
        }
        assert_eq!(fb, before);
    }
}
