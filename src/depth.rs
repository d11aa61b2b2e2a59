use crate::error::{RecordError, RecordResult};

/// Shift/mask table decoding a display-native packed pixel value into
/// 8-bit RGB channels.
///
/// Selected once from the display's reported color depth and immutable for
/// the session lifetime. Each channel is extracted as
/// `((pixel >> base_shift) << left_shift) & mask`; the tables below are
/// bit-exact for the four supported depths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthProfile {
    red_shift: u32,
    green_shift: u32,
    blue_shift: u32,
    red_left_shift: u32,
    green_left_shift: u32,
    blue_left_shift: u32,
    red_mask: u32,
    green_mask: u32,
    blue_mask: u32,
}

impl DepthProfile {
    /// Build the profile for a reported color depth.
    ///
    /// Supported depths are 15, 16, 24 and 32 bits. Anything else (8 bpp
    /// palettes in particular) is a fatal configuration error: the session
    /// refuses to start rather than produce corrupted frames.
    pub fn for_depth(depth: u8) -> RecordResult<Self> {
        match depth {
            15 => Ok(Self {
                red_shift: 7,
                green_shift: 2,
                blue_shift: 3,
                red_left_shift: 0,
                green_left_shift: 0,
                blue_left_shift: 0,
                red_mask: 0xf8,
                green_mask: 0xf8,
                blue_mask: 0xf8,
            }),
            16 => Ok(Self {
                red_shift: 8,
                green_shift: 3,
                blue_shift: 0,
                red_left_shift: 0,
                green_left_shift: 0,
                blue_left_shift: 3,
                red_mask: 0xf8,
                green_mask: 0xfc,
                blue_mask: 0xf8,
            }),
            24 | 32 => Ok(Self {
                red_shift: 16,
                green_shift: 8,
                blue_shift: 0,
                red_left_shift: 0,
                green_left_shift: 0,
                blue_left_shift: 0,
                red_mask: 0xff,
                green_mask: 0xff,
                blue_mask: 0xff,
            }),
            other => Err(RecordError::UnsupportedDepth(other)),
        }
    }

    /// Decode one native pixel value into `[r, g, b]`.
    #[inline(always)]
    pub fn decode(&self, pixel: u32) -> [u8; 3] {
        [
            (((pixel >> self.red_shift) << self.red_left_shift) & self.red_mask) as u8,
            (((pixel >> self.green_shift) << self.green_left_shift) & self.green_mask) as u8,
            (((pixel >> self.blue_shift) << self.blue_left_shift) & self.blue_mask) as u8,
        ]
    }

    /// Bulk-decode a row-major rectangle of native pixels into packed RGB
    /// triplets, appended to `out` (cleared first).
    pub fn decode_rect(&self, pixels: &[u32], out: &mut Vec<u8>) {
        out.clear();
        out.reserve(pixels.len() * 3);
        for &pixel in pixels {
            out.extend_from_slice(&self.decode(pixel));
        }
    }
}
