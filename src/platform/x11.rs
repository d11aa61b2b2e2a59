//! X11 display source backed by the DAMAGE and XFIXES extensions.
//!
//! Damage on the root window is reported at bounding-box granularity;
//! pointer motion is delivered via the root window's event mask. Pixel
//! reads go through `GetImage` under a scoped server grab so no client
//! can repaint the rectangle mid-read.

use std::time::{Duration, Instant};

use log::{debug, info};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::Event;
use x11rb::protocol::damage::{self, ConnectionExt as _, ReportLevel};
use x11rb::protocol::xfixes::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    ChangeWindowAttributesAux, ConnectionExt as _, EventMask, ImageFormat, ImageOrder, Window,
};
use x11rb::rust_connection::RustConnection;

use crate::backend::{DamageHandle, DisplayEvent, DisplaySource};
use crate::cursor::CursorImage;
use crate::env_config::define_env_flag;
use crate::error::{RecordError, RecordResult};
use crate::rect::DamageRect;

// Escape hatch for debugging: reads tear without the grab but the
// session stays usable while other clients keep running.
define_env_flag!(enabled_unless(
    server_grab_enabled,
    "DRIFT_CAPTURE_NO_SERVER_GRAB"
));

/// Sleep between event-queue polls while waiting for a notification.
const POLL_SLEEP: Duration = Duration::from_millis(2);

fn platform_error(context: &str, error: impl std::fmt::Display) -> RecordError {
    RecordError::Platform(anyhow::anyhow!("{context}: {error}"))
}

pub(crate) struct X11DisplaySource {
    conn: RustConnection,
    root: Window,
    width: u32,
    height: u32,
    depth: u8,
    bits_per_pixel: u8,
    scanline_pad: u8,
    lsb_first: bool,
    damage: damage::Damage,
}

impl X11DisplaySource {
    /// Connect to the default display, negotiate DAMAGE and XFIXES,
    /// create a bounding-box damage object on the root window, and
    /// subscribe to pointer motion.
    pub(crate) fn connect() -> RecordResult<Self> {
        let (conn, screen_num) = x11rb::connect(None).map_err(|error| {
            RecordError::BackendUnavailable(format!("cannot open X display: {error}"))
        })?;

        for name in [damage::X11_EXTENSION_NAME, xfixes::X11_EXTENSION_NAME] {
            let present = conn
                .extension_information(name)
                .map_err(|error| platform_error("extension_information", error))?
                .is_some();
            if !present {
                return Err(RecordError::BackendUnavailable(format!(
                    "X server lacks the {name} extension"
                )));
            }
        }
        let damage_version = conn
            .damage_query_version(1, 1)
            .map_err(|error| platform_error("damage_query_version", error))?
            .reply()
            .map_err(|error| platform_error("damage_query_version reply", error))?;
        let xfixes_version = conn
            .xfixes_query_version(4, 0)
            .map_err(|error| platform_error("xfixes_query_version", error))?
            .reply()
            .map_err(|error| platform_error("xfixes_query_version reply", error))?;
        debug!(
            "DAMAGE {}.{}, XFIXES {}.{}",
            damage_version.major_version,
            damage_version.minor_version,
            xfixes_version.major_version,
            xfixes_version.minor_version
        );

        let setup = conn.setup();
        let screen = &setup.roots[screen_num];
        let root = screen.root;
        let width = u32::from(screen.width_in_pixels);
        let height = u32::from(screen.height_in_pixels);
        let depth = screen.root_depth;
        let lsb_first = setup.image_byte_order == ImageOrder::LSB_FIRST.into();

        let format = setup
            .pixmap_formats
            .iter()
            .find(|format| format.depth == depth)
            .ok_or_else(|| {
                RecordError::Platform(anyhow::anyhow!("no pixmap format for depth {depth}"))
            })?;
        let bits_per_pixel = format.bits_per_pixel;
        let scanline_pad = format.scanline_pad;
        if !matches!(bits_per_pixel, 16 | 24 | 32) {
            return Err(RecordError::UnsupportedDepth(depth));
        }

        let damage_id = conn
            .generate_id()
            .map_err(|error| platform_error("generate_id", error))?;
        conn.damage_create(damage_id, root, ReportLevel::BOUNDING_BOX)
            .map_err(|error| platform_error("damage_create", error))?
            .check()
            .map_err(|error| platform_error("damage_create check", error))?;

        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::POINTER_MOTION),
        )
        .map_err(|error| platform_error("change_window_attributes", error))?
        .check()
        .map_err(|error| platform_error("change_window_attributes check", error))?;

        conn.flush()
            .map_err(|error| platform_error("flush", error))?;

        info!(
            "X11 source ready: {width}x{height}, depth {depth} ({bits_per_pixel} bpp, \
             {} byte order)",
            if lsb_first { "LSB" } else { "MSB" }
        );
        Ok(Self {
            conn,
            root,
            width,
            height,
            depth,
            bits_per_pixel,
            scanline_pad,
            lsb_first,
            damage: damage_id,
        })
    }
}

impl DisplaySource for X11DisplaySource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn color_depth(&self) -> u8 {
        self.depth
    }

    fn wait_event(&mut self, timeout: Duration) -> RecordResult<Option<DisplayEvent>> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(event) = self
                .conn
                .poll_for_event()
                .map_err(|error| platform_error("poll_for_event", error))?
            {
                match event {
                    Event::DamageNotify(notify) => {
                        return Ok(Some(DisplayEvent::Damage {
                            rect: DamageRect::new(
                                i32::from(notify.area.x).max(0) as u32,
                                i32::from(notify.area.y).max(0) as u32,
                                u32::from(notify.area.width),
                                u32::from(notify.area.height),
                            ),
                            timestamp: u64::from(notify.timestamp),
                            handle: DamageHandle(notify.damage),
                        }));
                    }
                    Event::MotionNotify(motion) => {
                        return Ok(Some(DisplayEvent::PointerMotion {
                            timestamp: u64::from(motion.time),
                        }));
                    }
                    _ => {}
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_SLEEP);
        }
    }

    fn read_pixels(&mut self, rect: DamageRect) -> RecordResult<Vec<u32>> {
        let grab = if server_grab_enabled() {
            Some(ServerGrab::acquire(&self.conn)?)
        } else {
            None
        };

        let reply = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                self.root,
                rect.x as i16,
                rect.y as i16,
                rect.width as u16,
                rect.height as u16,
                !0,
            )
            .map_err(|error| RecordError::GrabFailed(format!("get_image: {error}")))?
            .reply()
            .map_err(|error| RecordError::GrabFailed(format!("get_image reply: {error}")))?;
        drop(grab);

        unpack_zpixmap(
            &reply.data,
            rect,
            self.bits_per_pixel,
            self.scanline_pad,
            self.lsb_first,
        )
    }

    fn acknowledge(&mut self, handle: DamageHandle) -> RecordResult<()> {
        self.conn
            .damage_subtract(handle.0, x11rb::NONE, x11rb::NONE)
            .map_err(|error| platform_error("damage_subtract", error))?;
        self.conn
            .flush()
            .map_err(|error| platform_error("flush", error))?;
        Ok(())
    }

    fn cursor_image(&mut self) -> RecordResult<Option<CursorImage>> {
        let reply = self
            .conn
            .xfixes_get_cursor_image()
            .map_err(|error| RecordError::GrabFailed(format!("get_cursor_image: {error}")))?
            .reply()
            .map_err(|error| RecordError::GrabFailed(format!("get_cursor_image reply: {error}")))?;

        if reply.width == 0 || reply.height == 0 {
            return Ok(None);
        }
        // XFIXES reports the hotspot's screen position; the image origin
        // sits one hotspot offset up and to the left of it.
        Ok(Some(CursorImage {
            x: i32::from(reply.x) - i32::from(reply.xhot),
            y: i32::from(reply.y) - i32::from(reply.yhot),
            width: u32::from(reply.width),
            height: u32::from(reply.height),
            hotspot_x: u32::from(reply.xhot),
            hotspot_y: u32::from(reply.yhot),
            pixels: reply.cursor_image,
        }))
    }
}

impl Drop for X11DisplaySource {
    fn drop(&mut self) {
        let _ = self.conn.damage_destroy(self.damage);
        let _ = self.conn.flush();
    }
}

/// Holds the whole X server grabbed; released on drop. While held, no
/// other client can draw, so a `GetImage` inside the scope cannot tear.
struct ServerGrab<'a> {
    conn: &'a RustConnection,
}

impl<'a> ServerGrab<'a> {
    fn acquire(conn: &'a RustConnection) -> RecordResult<Self> {
        conn.grab_server()
            .map_err(|error| RecordError::GrabFailed(format!("grab_server: {error}")))?;
        conn.flush()
            .map_err(|error| RecordError::GrabFailed(format!("flush after grab: {error}")))?;
        Ok(Self { conn })
    }
}

impl Drop for ServerGrab<'_> {
    fn drop(&mut self) {
        let _ = self.conn.ungrab_server();
        let _ = self.conn.flush();
    }
}

/// Decode a ZPixmap `GetImage` reply into one `u32` per pixel. Rows in
/// the reply are padded to the pixmap format's scanline pad; the output
/// is dense.
fn unpack_zpixmap(
    data: &[u8],
    rect: DamageRect,
    bits_per_pixel: u8,
    scanline_pad: u8,
    lsb_first: bool,
) -> RecordResult<Vec<u32>> {
    let bytes_per_pixel = usize::from(bits_per_pixel) / 8;
    let pad_bytes = usize::from(scanline_pad) / 8;
    let row_used = rect.width as usize * bytes_per_pixel;
    let stride = if pad_bytes > 1 {
        row_used.div_ceil(pad_bytes) * pad_bytes
    } else {
        row_used
    };

    let mut out = Vec::with_capacity(rect.pixel_count());
    for row in 0..rect.height as usize {
        let start = row * stride;
        let row_bytes = data.get(start..start + row_used).ok_or_else(|| {
            RecordError::GrabFailed(format!(
                "short image data: {} bytes for {rect:?} at {bits_per_pixel} bpp",
                data.len()
            ))
        })?;
        for pixel in row_bytes.chunks_exact(bytes_per_pixel) {
            out.push(read_native(pixel, lsb_first));
        }
    }
    Ok(out)
}

#[inline]
fn read_native(bytes: &[u8], lsb_first: bool) -> u32 {
    let mut value = 0u32;
    if lsb_first {
        for &byte in bytes.iter().rev() {
            value = (value << 8) | u32::from(byte);
        }
    } else {
        for &byte in bytes {
            value = (value << 8) | u32::from(byte);
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_native_respects_byte_order() {
        assert_eq!(read_native(&[0x12, 0x34], false), 0x1234);
        assert_eq!(read_native(&[0x12, 0x34], true), 0x3412);
        assert_eq!(read_native(&[0xAA, 0xBB, 0xCC, 0xDD], true), 0xDDCC_BBAA);
        assert_eq!(read_native(&[0xAA, 0xBB, 0xCC, 0xDD], false), 0xAABB_CCDD);
    }

    #[test]
    fn unpack_skips_scanline_padding() -> RecordResult<()> {
        // 3x2 at 16 bpp with 32-bit scanline pad: 6 used bytes per row,
        // stride 8.
        let data = [
            0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0xEE, 0xEE, // row 0 + pad
            0x04, 0x00, 0x05, 0x00, 0x06, 0x00, 0xEE, 0xEE, // row 1 + pad
        ];
        let rect = DamageRect::new(0, 0, 3, 2);
        let pixels = unpack_zpixmap(&data, rect, 16, 32, true)?;
        assert_eq!(pixels, vec![1, 2, 3, 4, 5, 6]);
        Ok(())
    }

    #[test]
    fn unpack_handles_dense_32bpp_rows() -> RecordResult<()> {
        let data = [
            0x00, 0x00, 0xFF, 0x00, // 0x00FF0000 LSB-first
            0xFF, 0x00, 0x00, 0x00, // 0x000000FF
        ];
        let rect = DamageRect::new(0, 0, 2, 1);
        let pixels = unpack_zpixmap(&data, rect, 32, 32, true)?;
        assert_eq!(pixels, vec![0x00FF_0000, 0x0000_00FF]);
        Ok(())
    }

    #[test]
    fn unpack_rejects_truncated_data() {
        let rect = DamageRect::new(0, 0, 4, 4);
        let result = unpack_zpixmap(&[0u8; 8], rect, 32, 32, true);
        assert!(matches!(result, Err(RecordError::GrabFailed(_))));
    }
}
