use crate::error::{RecordError, RecordResult};
use crate::rect::DamageRect;

pub(crate) const CHANNELS: usize = 3;

/// Row/column → linear byte-offset arithmetic for a row-major RGB grid.
///
/// Shared by the scratch buffer and the cursor snapshot so the stride math
/// lives in exactly one place.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RowMajor {
    width: u32,
}

impl RowMajor {
    pub(crate) fn new(width: u32) -> Self {
        Self { width }
    }

    #[inline(always)]
    pub(crate) fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }

    #[inline(always)]
    pub(crate) fn row_bytes(&self, columns: u32) -> usize {
        columns as usize * CHANNELS
    }
}

/// Borrowed view of a finished full-resolution frame, handed to the frame
/// sink. Rows are top-down, 3 channels per pixel, no row padding.
#[derive(Clone, Copy, Debug)]
pub struct FrameRef<'a> {
    pub width: u32,
    pub height: u32,
    pub rgb: &'a [u8],
}

/// The canonical in-memory RGB frame representing current display state.
///
/// Width and height are fixed for the session lifetime. Pixels never
/// captured stay zero-initialized (black); everything else holds the last
/// captured or composited value. Mutated only through [`write_rect`] and
/// the cursor compositor.
///
/// [`write_rect`]: ScratchBuffer::write_rect
pub struct ScratchBuffer {
    width: u32,
    height: u32,
    layout: RowMajor,
    data: Vec<u8>,
}

impl ScratchBuffer {
    /// Allocate and zero-fill the canonical buffer. Called exactly once,
    /// before the capture loop starts.
    pub fn allocate(width: u32, height: u32) -> RecordResult<Self> {
        if width == 0 || height == 0 {
            return Err(RecordError::InvalidConfig(format!(
                "frame dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(CHANNELS))
            .ok_or(RecordError::BufferOverflow)?;
        Ok(Self {
            width,
            height,
            layout: RowMajor::new(width),
            data: vec![0u8; len],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Overwrite a sub-rectangle with already-converted RGB triplets,
    /// row by row. `rgb` is row-major, `rect.width * rect.height * 3`
    /// bytes. Trusts its input bounds; upstream supplies pre-clipped
    /// rectangles.
    pub fn write_rect(&mut self, rect: DamageRect, rgb: &[u8]) {
        debug_assert!(rect.x + rect.width <= self.width);
        debug_assert!(rect.y + rect.height <= self.height);
        debug_assert_eq!(rgb.len(), rect.pixel_count() * CHANNELS);

        let row_bytes = self.layout.row_bytes(rect.width);
        for row in 0..rect.height {
            let dst_start = self.layout.offset(rect.x, rect.y + row);
            let src_start = row as usize * row_bytes;
            self.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&rgb[src_start..src_start + row_bytes]);
        }
    }

    /// Copy out a sub-rectangle as row-major RGB triplets. Used by the
    /// cursor compositor to snapshot content it is about to overwrite.
    pub fn read_rect(&self, rect: DamageRect) -> Vec<u8> {
        debug_assert!(rect.x + rect.width <= self.width);
        debug_assert!(rect.y + rect.height <= self.height);

        let row_bytes = self.layout.row_bytes(rect.width);
        let mut out = Vec::with_capacity(rect.pixel_count() * CHANNELS);
        for row in 0..rect.height {
            let src_start = self.layout.offset(rect.x, rect.y + row);
            out.extend_from_slice(&self.data[src_start..src_start + row_bytes]);
        }
        out
    }

    #[inline(always)]
    pub(crate) fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let start = self.layout.offset(x, y);
        &mut self.data[start..start + CHANNELS]
    }

    /// Borrow the full frame for emission.
    pub fn frame_ref(&self) -> FrameRef<'_> {
        FrameRef {
            width: self.width,
            height: self.height,
            rgb: &self.data,
        }
    }
}
