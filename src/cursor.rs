use crate::rect::DamageRect;
use crate::scratch::ScratchBuffer;

/// Cursor shape and position fetched fresh from the display on each
/// composite. Not retained across calls.
#[derive(Clone, Debug)]
pub struct CursorImage {
    /// Image origin X in frame coordinates (hotspot position minus
    /// hotspot offset). May be negative when the cursor overlaps the
    /// left frame edge.
    pub x: i32,
    /// Image origin Y in frame coordinates.
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Hotspot offset relative to the cursor image.
    pub hotspot_x: u32,
    pub hotspot_y: u32,
    /// Row-major ARGB pixels, alpha in the top byte.
    pub pixels: Vec<u32>,
}

/// Integer alpha blend of one channel: `alpha == 0` keeps the background,
/// `alpha == 255` takes the foreground, anything between is the rounded
/// weighted average `(fg*alpha + bg*(255-alpha) + 128)` renormalized by
/// `(t + (t >> 8)) >> 8` — a division by 255 accurate to the low bit.
#[inline(always)]
pub(crate) fn blend_channel(fg: u8, alpha: u8, bg: u8) -> u8 {
    match alpha {
        0 => bg,
        255 => fg,
        _ => {
            let t = u16::from(fg) * u16::from(alpha)
                + u16::from(bg) * (255 - u16::from(alpha))
                + 128;
            ((t + (t >> 8)) >> 8) as u8
        }
    }
}

/// Result of clipping the cursor rectangle to the frame: the destination
/// rectangle in frame coordinates plus the offset into the cursor image
/// where the visible region starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CursorClip {
    dst: DamageRect,
    src_x: u32,
    src_y: u32,
}

/// Clip a cursor bounding box to the frame. The negative-origin clip and
/// the far-edge clip apply sequentially per axis, so a cursor both
/// starting before the origin and extending past the far edge is reduced
/// by both overhangs. `None` means nothing of the cursor is visible.
fn clip_cursor(x: i32, y: i32, width: u32, height: u32, frame: (u32, u32)) -> Option<CursorClip> {
    let mut dst_x = i64::from(x);
    let mut dst_y = i64::from(y);
    let mut clip_w = i64::from(width);
    let mut clip_h = i64::from(height);

    if dst_x < 0 {
        clip_w += dst_x;
        dst_x = 0;
    }
    if dst_y < 0 {
        clip_h += dst_y;
        dst_y = 0;
    }
    if dst_x + clip_w > i64::from(frame.0) {
        clip_w = i64::from(frame.0) - dst_x;
    }
    if dst_y + clip_h > i64::from(frame.1) {
        clip_h = i64::from(frame.1) - dst_y;
    }
    if clip_w <= 0 || clip_h <= 0 {
        return None;
    }

    Some(CursorClip {
        dst: DamageRect::new(dst_x as u32, dst_y as u32, clip_w as u32, clip_h as u32),
        src_x: (dst_x - i64::from(x)) as u32,
        src_y: (dst_y - i64::from(y)) as u32,
    })
}

/// The exact rectangle of scratch-buffer content overwritten by the last
/// cursor composite, plus a copy of the original pixel values.
struct CursorSnapshot {
    rect: DamageRect,
    pixels: Vec<u8>,
}

/// Save-before-overwrite cursor overlay.
///
/// At most one snapshot is live at a time: [`composite`] takes one
/// immediately before blending and [`restore`] consumes it, so the
/// canonical buffer can always be returned to its pure-capture state
/// before the next mutation.
///
/// [`composite`]: CursorCompositor::composite
/// [`restore`]: CursorCompositor::restore
#[derive(Default)]
pub struct CursorCompositor {
    snapshot: Option<CursorSnapshot>,
}

impl CursorCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Undo the previous composite, writing the backed-up pixels over the
    /// blended cursor and discarding the snapshot. No-op when no snapshot
    /// exists, so calling it twice in a row is safe.
    pub fn restore(&mut self, scratch: &mut ScratchBuffer) {
        if let Some(snapshot) = self.snapshot.take() {
            scratch.write_rect(snapshot.rect, &snapshot.pixels);
        }
    }

    /// Alpha-blend the cursor image onto the scratch buffer at its frame
    /// position, snapshotting the destination rectangle first so
    /// [`restore`](Self::restore) can undo it.
    ///
    /// Any snapshot still live from a previous composite is restored
    /// before anything else, so re-compositing without an explicit
    /// restore never captures already-blended content. A cursor clipped
    /// to nothing leaves no snapshot behind.
    pub fn composite(&mut self, scratch: &mut ScratchBuffer, image: &CursorImage) {
        self.restore(scratch);

        let Some(clip) = clip_cursor(
            image.x,
            image.y,
            image.width,
            image.height,
            scratch.dimensions(),
        ) else {
            return;
        };

        self.snapshot = Some(CursorSnapshot {
            rect: clip.dst,
            pixels: scratch.read_rect(clip.dst),
        });

        for row in 0..clip.dst.height {
            let src_row = (clip.src_y + row) as usize * image.width as usize;
            for col in 0..clip.dst.width {
                let argb = image.pixels[src_row + (clip.src_x + col) as usize];
                let alpha = (argb >> 24) as u8;
                let fg = [(argb >> 16) as u8, (argb >> 8) as u8, argb as u8];
                let px = scratch.pixel_mut(clip.dst.x + col, clip.dst.y + row);
                px[0] = blend_channel(fg[0], alpha, px[0]);
                px[1] = blend_channel(fg[1], alpha, px[1]);
                px[2] = blend_channel(fg[2], alpha, px[2]);
            }
        }
    }

    /// Whether a composite is currently live (and would be undone by the
    /// next [`restore`](Self::restore)).
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordResult;
    use crate::scratch::ScratchBuffer;

    /// Opaque single-color cursor image at the given origin.
    fn solid_cursor(x: i32, y: i32, width: u32, height: u32, rgb: [u8; 3]) -> CursorImage {
        let argb = 0xFF00_0000
            | (u32::from(rgb[0]) << 16)
            | (u32::from(rgb[1]) << 8)
            | u32::from(rgb[2]);
        CursorImage {
            x,
            y,
            width,
            height,
            hotspot_x: 0,
            hotspot_y: 0,
            pixels: vec![argb; (width * height) as usize],
        }
    }

    /// Fill the scratch buffer with a position-dependent pattern so any
    /// misplaced restore shows up as a mismatch.
    fn patterned_scratch(width: u32, height: u32) -> RecordResult<ScratchBuffer> {
        let mut scratch = ScratchBuffer::allocate(width, height)?;
        let rect = DamageRect::new(0, 0, width, height);
        let mut rgb = Vec::with_capacity(rect.pixel_count() * 3);
        for y in 0..height {
            for x in 0..width {
                rgb.extend_from_slice(&[(x * 7 + y) as u8, (y * 13 + x) as u8, (x ^ y) as u8]);
            }
        }
        scratch.write_rect(rect, &rgb);
        Ok(scratch)
    }

    #[test]
    fn blend_endpoints_short_circuit() {
        assert_eq!(blend_channel(200, 0, 100), 100);
        assert_eq!(blend_channel(200, 255, 100), 200);
    }

    #[test]
    fn blend_midpoint_matches_integer_formula() {
        // t = 200*128 + 100*127 + 128 = 38428; (t + (t >> 8)) >> 8 = 150.
        assert_eq!(blend_channel(200, 128, 100), 150);
        // Renormalization stays exact at the extremes of the inner range.
        assert_eq!(blend_channel(255, 254, 0), 254);
        assert_eq!(blend_channel(0, 1, 255), 254);
    }

    #[test]
    fn restore_after_composite_roundtrips_inside_frame() -> RecordResult<()> {
        let mut scratch = patterned_scratch(16, 16)?;
        let before = scratch.frame_ref().rgb.to_vec();

        let mut compositor = CursorCompositor::new();
        compositor.composite(&mut scratch, &solid_cursor(4, 5, 6, 6, [255, 255, 255]));
        assert!(compositor.has_snapshot());
        assert_ne!(scratch.frame_ref().rgb, &before[..]);

        compositor.restore(&mut scratch);
        assert_eq!(scratch.frame_ref().rgb, &before[..]);
        Ok(())
    }

    #[test]
    fn restore_after_partially_overlapping_composite_roundtrips() -> RecordResult<()> {
        for (x, y) in [(-3i32, -2i32), (13, 13), (-3, 13), (14, -2)] {
            let mut scratch = patterned_scratch(16, 16)?;
            let before = scratch.frame_ref().rgb.to_vec();

            let mut compositor = CursorCompositor::new();
            compositor.composite(&mut scratch, &solid_cursor(x, y, 8, 8, [1, 2, 3]));
            assert!(compositor.has_snapshot(), "cursor at ({x},{y}) should clip");

            compositor.restore(&mut scratch);
            assert_eq!(scratch.frame_ref().rgb, &before[..]);
        }
        Ok(())
    }

    #[test]
    fn fully_offscreen_cursor_is_a_noop() -> RecordResult<()> {
        let mut scratch = patterned_scratch(16, 16)?;
        let before = scratch.frame_ref().rgb.to_vec();
        let mut compositor = CursorCompositor::new();

        // Entirely negative beyond its own extent, and past the far edge.
        for (x, y) in [(-50i32, 4i32), (4, -50), (16, 4), (4, 16), (-50, -50)] {
            compositor.composite(&mut scratch, &solid_cursor(x, y, 10, 10, [9, 9, 9]));
            assert!(!compositor.has_snapshot(), "cursor at ({x},{y})");
            assert_eq!(scratch.frame_ref().rgb, &before[..]);
        }

        // Restore afterwards is a safe no-op.
        compositor.restore(&mut scratch);
        assert_eq!(scratch.frame_ref().rgb, &before[..]);
        Ok(())
    }

    #[test]
    fn recomposite_without_restore_does_not_snapshot_blended_content() -> RecordResult<()> {
        let mut scratch = patterned_scratch(16, 16)?;
        let before = scratch.frame_ref().rgb.to_vec();

        let mut compositor = CursorCompositor::new();
        compositor.composite(&mut scratch, &solid_cursor(2, 2, 5, 5, [200, 0, 0]));
        compositor.composite(&mut scratch, &solid_cursor(4, 4, 5, 5, [0, 200, 0]));

        // The second snapshot must hold pre-first-composite content, so a
        // single restore returns the buffer to its original state.
        compositor.restore(&mut scratch);
        assert_eq!(scratch.frame_ref().rgb, &before[..]);
        Ok(())
    }

    #[test]
    fn recomposite_releases_snapshot_even_when_new_position_is_offscreen() -> RecordResult<()> {
        let mut scratch = patterned_scratch(16, 16)?;
        let before = scratch.frame_ref().rgb.to_vec();

        let mut compositor = CursorCompositor::new();
        compositor.composite(&mut scratch, &solid_cursor(2, 2, 5, 5, [200, 0, 0]));
        compositor.composite(&mut scratch, &solid_cursor(-50, 0, 10, 10, [0, 200, 0]));

        // The first composite was undone and no new snapshot was taken.
        assert!(!compositor.has_snapshot());
        assert_eq!(scratch.frame_ref().rgb, &before[..]);
        Ok(())
    }

    #[test]
    fn double_restore_is_a_noop() -> RecordResult<()> {
        let mut scratch = patterned_scratch(8, 8)?;
        let before = scratch.frame_ref().rgb.to_vec();

        let mut compositor = CursorCompositor::new();
        compositor.composite(&mut scratch, &solid_cursor(1, 1, 3, 3, [50, 60, 70]));
        compositor.restore(&mut scratch);
        compositor.restore(&mut scratch);
        assert_eq!(scratch.frame_ref().rgb, &before[..]);
        Ok(())
    }

    #[test]
    fn clip_offsets_map_destination_to_source_pixels() -> RecordResult<()> {
        // 4x4 cursor with per-pixel colors encoding the source index,
        // origin at (-2, -1): frame (0,0) must show cursor pixel (2,1).
        let mut pixels = Vec::new();
        for idx in 0..16u32 {
            pixels.push(0xFF00_0000 | (idx << 16));
        }
        let image = CursorImage {
            x: -2,
            y: -1,
            width: 4,
            height: 4,
            hotspot_x: 0,
            hotspot_y: 0,
            pixels,
        };

        let mut scratch = ScratchBuffer::allocate(8, 8)?;
        let mut compositor = CursorCompositor::new();
        compositor.composite(&mut scratch, &image);

        let visible = scratch.read_rect(DamageRect::new(0, 0, 2, 3));
        let reds: Vec<u8> = visible.chunks_exact(3).map(|px| px[0]).collect();
        // Source indices (row*4+col) for rows 1..4, cols 2..4.
        assert_eq!(reds, vec![6, 7, 10, 11, 14, 15]);
        Ok(())
    }

    #[test]
    fn simultaneous_negative_and_overflow_clips_both_ends() {
        // Cursor wider than the whole frame: both the negative-origin and
        // the far-edge clip apply on the same axis.
        let clip = clip_cursor(-4, 2, 20, 3, (8, 8)).unwrap();
        assert_eq!(clip.dst, DamageRect::new(0, 2, 8, 3));
        assert_eq!((clip.src_x, clip.src_y), (4, 0));
    }
}
