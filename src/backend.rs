use std::time::Duration;

use crate::cursor::CursorImage;
use crate::error::RecordResult;
use crate::rect::DamageRect;
use crate::scratch::FrameRef;

/// Opaque token identifying pending damage at the display. The capture
/// loop acknowledges it only after the matching rectangle was read
/// successfully, so a failed grab leaves the damage pending for the next
/// notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DamageHandle(pub u32);

/// A change notification delivered by the display source.
#[derive(Clone, Debug)]
pub enum DisplayEvent {
    /// Bounding box of one or more underlying region changes.
    Damage {
        rect: DamageRect,
        /// Raw display timestamp in milliseconds.
        timestamp: u64,
        handle: DamageHandle,
    },
    /// The pointer moved; no region is necessarily damaged. Position is
    /// read separately via [`DisplaySource::cursor_image`].
    PointerMotion { timestamp: u64 },
}

impl DisplayEvent {
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Damage { timestamp, .. } | Self::PointerMotion { timestamp } => *timestamp,
        }
    }
}

/// The windowing/display collaborator, reduced to the surface the capture
/// loop needs: change notifications, raw pixel reads, cursor image
/// fetches, and the display's geometry and depth.
pub trait DisplaySource {
    /// Full display dimensions, fixed for the session lifetime.
    fn dimensions(&self) -> (u32, u32);

    /// Reported color depth; one of 15, 16, 24, 32 for supported
    /// displays. Anything else makes session initialization fail.
    fn color_depth(&self) -> u8;

    /// Block until the next notification arrives or `timeout` elapses.
    /// This is the loop's only suspension point; the bounded timeout is
    /// what keeps an external stop flag responsive.
    fn wait_event(&mut self, timeout: Duration) -> RecordResult<Option<DisplayEvent>>;

    /// Read raw native pixels for the given in-bounds rectangle,
    /// row-major. Implementations must hold exclusive display access for
    /// the duration of the read so a concurrent display-side mutation
    /// cannot tear the rectangle. A failed read is reported as the
    /// transient [`RecordError::GrabFailed`](crate::RecordError::GrabFailed).
    fn read_pixels(&mut self, rect: DamageRect) -> RecordResult<Vec<u32>>;

    /// Clear pending damage behind the handle. Called only after the
    /// matching read succeeded.
    fn acknowledge(&mut self, handle: DamageHandle) -> RecordResult<()>;

    /// Fetch the current cursor image with per-pixel alpha, or `None`
    /// when the display has no cursor to report.
    fn cursor_image(&mut self) -> RecordResult<Option<CursorImage>>;
}

/// The downstream encoder boundary: accepts finished full-resolution RGB
/// frames with session-relative timestamps.
pub trait FrameSink {
    /// Emit one frame. `relative_timestamp_ms` is non-negative and `0`
    /// for the very first frame of the session; `frame` rows are
    /// top-down, 3 channels per pixel, no row padding.
    fn write_frame(&mut self, relative_timestamp_ms: u64, frame: FrameRef<'_>) -> RecordResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_event_kinds_expose_their_raw_timestamp() {
        let damage = DisplayEvent::Damage {
            rect: DamageRect::new(0, 0, 4, 4),
            timestamp: 42,
            handle: DamageHandle(1),
        };
        assert_eq!(damage.timestamp(), 42);

        let motion = DisplayEvent::PointerMotion { timestamp: 7 };
        assert_eq!(motion.timestamp(), 7);
    }
}
