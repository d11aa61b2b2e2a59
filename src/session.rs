use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, info, warn};

use crate::backend::{DisplayEvent, DisplaySource, FrameSink};
use crate::cursor::CursorCompositor;
use crate::depth::DepthProfile;
use crate::error::RecordResult;
use crate::rect::{DamageRect, clamp_damage_rect};
use crate::scratch::ScratchBuffer;

/// Behavior knobs for a recording session.
#[derive(Clone, Copy, Debug)]
pub struct RecordSessionConfig {
    /// When `true`, the hardware cursor is alpha-blended into every
    /// emitted frame (and undone again before the next capture).
    pub composite_cursor: bool,
    /// Upper bound on one `wait_event` call inside [`RecordSession::run`].
    /// Bounds how long a stop request can go unobserved.
    pub poll_interval: Duration,
}

impl Default for RecordSessionConfig {
    fn default() -> Self {
        Self {
            composite_cursor: true,
            poll_interval: Duration::from_millis(100),
        }
    }
}

pub struct RecordSessionBuilder {
    config: RecordSessionConfig,
}

impl RecordSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: RecordSessionConfig::default(),
        }
    }

    /// Enable or disable cursor compositing for the session.
    pub fn composite_cursor(mut self, enabled: bool) -> Self {
        self.config.composite_cursor = enabled;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    /// Query the display's geometry and depth, build the pixel adapter,
    /// and allocate the scratch buffer. An unsupported color depth fails
    /// here, before any event is processed.
    pub fn initialize(self, source: &dyn DisplaySource) -> RecordResult<RecordSession> {
        let (width, height) = source.dimensions();
        let depth = source.color_depth();
        let profile = DepthProfile::for_depth(depth)?;
        let scratch = ScratchBuffer::allocate(width, height)?;
        info!("record session initialized: {width}x{height} at {depth} bpp");
        Ok(RecordSession {
            config: self.config,
            profile,
            scratch,
            compositor: CursorCompositor::new(),
            first_timestamp: None,
            decode_buf: Vec::new(),
            stats: Arc::new(SessionStats::default()),
        })
    }
}

impl Default for RecordSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters updated by the capture loop and readable from any thread.
///
/// A signal-driven finalizer observes `frames_emitted` between cycles to
/// learn exactly how many frames the sink has received; the count only
/// advances after a frame was fully handed over, never mid-write.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Frames successfully handed to the sink. Exact: failed captures do
    /// not increment it.
    pub frames_emitted: AtomicU64,
    /// Change notifications dropped because their rectangle read failed.
    pub grab_failures: AtomicU64,
}

impl SessionStats {
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            grab_failures: self.grab_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of session statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStatsSnapshot {
    pub frames_emitted: u64,
    pub grab_failures: u64,
}

/// The damage-driven capture loop.
///
/// Owns the scratch buffer, cursor compositor, depth profile, frame
/// counter, and first-timestamp baseline — one writer per field, no
/// global state. Strictly sequential: all capture, compositing, and
/// emission for one event completes before the next event is looked at.
pub struct RecordSession {
    config: RecordSessionConfig,
    profile: DepthProfile,
    scratch: ScratchBuffer,
    compositor: CursorCompositor,
    /// Raw timestamp of the first emitted frame; time zero for the whole
    /// session, set once and never reset.
    first_timestamp: Option<u64>,
    /// Reused RGB conversion buffer so steady-state capture does not
    /// allocate per event.
    decode_buf: Vec<u8>,
    stats: Arc<SessionStats>,
}

impl RecordSession {
    pub fn builder() -> RecordSessionBuilder {
        RecordSessionBuilder::new()
    }

    /// Initialize with default configuration.
    pub fn initialize(source: &dyn DisplaySource) -> RecordResult<Self> {
        Self::builder().initialize(source)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.scratch.dimensions()
    }

    /// The canonical frame as of the last completed cycle.
    pub fn scratch(&self) -> &ScratchBuffer {
        &self.scratch
    }

    /// Shared live counters; clone the `Arc` into an interrupt handler
    /// to read emission progress without touching the loop.
    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    pub fn frames_emitted(&self) -> u64 {
        self.stats.frames_emitted.load(Ordering::Relaxed)
    }

    /// Run until `stop` is observed. The flag is checked between cycles,
    /// so a stop request never interrupts a frame mid-write; whatever the
    /// sink received so far is complete and consistent.
    pub fn run(
        &mut self,
        source: &mut dyn DisplaySource,
        sink: &mut dyn FrameSink,
        stop: &AtomicBool,
    ) -> RecordResult<()> {
        while !stop.load(Ordering::Acquire) {
            if let Some(event) = source.wait_event(self.config.poll_interval)? {
                self.process_event(source, sink, event)?;
            }
        }
        Ok(())
    }

    /// Handle one notification end to end. Returns whether a frame was
    /// emitted (a transiently failed rectangle read drops exactly that
    /// event's frame and reports `Ok(false)`).
    pub fn process_event(
        &mut self,
        source: &mut dyn DisplaySource,
        sink: &mut dyn FrameSink,
        event: DisplayEvent,
    ) -> RecordResult<bool> {
        match event {
            DisplayEvent::Damage {
                rect,
                timestamp,
                handle,
            } => {
                // Undo the previous composite before the buffer is
                // touched, even if the read below fails: the capture
                // must never keep stale blended cursor pixels.
                self.compositor.restore(&mut self.scratch);

                if let Some(rect) = clamp_damage_rect(rect, self.scratch.width(), self.scratch.height())
                {
                    if !self.capture_rect(source, rect)? {
                        return Ok(false);
                    }
                } else {
                    debug!("damage rect {rect:?} lies outside the frame; nothing to read");
                }
                // Damage is cleared only once the read (if any) succeeded.
                source.acknowledge(handle)?;

                self.composite_cursor(source)?;
                self.emit(sink, timestamp)
            }
            DisplayEvent::PointerMotion { timestamp } => {
                self.compositor.restore(&mut self.scratch);
                self.composite_cursor(source)?;
                self.emit(sink, timestamp)
            }
        }
    }

    /// Read, decode, and write one pre-clipped rectangle. `Ok(false)`
    /// means the read failed transiently and the event should be
    /// dropped; the scratch buffer is untouched in that case.
    fn capture_rect(
        &mut self,
        source: &mut dyn DisplaySource,
        rect: DamageRect,
    ) -> RecordResult<bool> {
        let native = match source.read_pixels(rect) {
            Ok(native) => native,
            Err(error) if error.is_transient() => {
                self.stats.grab_failures.fetch_add(1, Ordering::Relaxed);
                warn!("dropping damage event, grab failed: {error}");
                return Ok(false);
            }
            Err(error) => return Err(error),
        };

        if native.len() != rect.pixel_count() {
            self.stats.grab_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "dropping damage event, short read: got {} pixels, expected {} for {rect:?}",
                native.len(),
                rect.pixel_count()
            );
            return Ok(false);
        }

        self.profile.decode_rect(&native, &mut self.decode_buf);
        self.scratch.write_rect(rect, &self.decode_buf);
        Ok(true)
    }

    fn composite_cursor(&mut self, source: &mut dyn DisplaySource) -> RecordResult<()> {
        if !self.config.composite_cursor {
            return Ok(());
        }
        match source.cursor_image() {
            Ok(Some(image)) => self.compositor.composite(&mut self.scratch, &image),
            Ok(None) => {}
            Err(error) if error.is_transient() => {
                // A frame without its cursor is still a valid frame.
                warn!("cursor fetch failed, emitting without cursor: {error}");
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    fn emit(&mut self, sink: &mut dyn FrameSink, timestamp: u64) -> RecordResult<bool> {
        let base = *self.first_timestamp.get_or_insert(timestamp);
        let relative = timestamp.saturating_sub(base);
        sink.write_frame(relative, self.scratch.frame_ref())?;
        self.stats.frames_emitted.fetch_add(1, Ordering::Relaxed);
        debug!("emitted frame at +{relative} ms");
        Ok(true)
    }
}

/// Initialize a session with default configuration and run it until
/// `stop` is observed.
pub fn record(
    source: &mut dyn DisplaySource,
    sink: &mut dyn FrameSink,
    stop: &AtomicBool,
) -> RecordResult<()> {
    let mut session = RecordSession::initialize(source)?;
    session.run(source, sink, stop)
}
