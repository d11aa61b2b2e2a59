//! Damage-driven screen recording: converts display change notifications
//! into a stream of timestamped full-resolution RGB frames, with the
//! hardware cursor alpha-blended in.
//!
//! Instead of grabbing the whole screen per frame, a session keeps one
//! canonical scratch buffer and only re-reads the rectangles the display
//! reports as changed. Each change notification produces exactly one
//! frame at the sink.
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use drift_capture::{FrameRef, FrameSink, RecordResult, RecordSession};
//!
//! struct CountingSink(u64);
//!
//! impl FrameSink for CountingSink {
//!     fn write_frame(&mut self, _ts: u64, _frame: FrameRef<'_>) -> RecordResult<()> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> RecordResult<()> {
//!     let mut source = drift_capture::connect_display()?;
//!     let mut session = RecordSession::initialize(source.as_ref())?;
//!     let stop = AtomicBool::new(false);
//!     session.run(source.as_mut(), &mut CountingSink(0), &stop)
//! }
//! ```

pub mod backend;
pub mod cursor;
pub mod depth;
pub(crate) mod env_config;
pub mod error;
mod platform;
pub mod rect;
pub mod scratch;
pub mod session;

pub use backend::{DamageHandle, DisplayEvent, DisplaySource, FrameSink};
pub use cursor::{CursorCompositor, CursorImage};
pub use depth::DepthProfile;
pub use error::{RecordError, RecordErrorClass, RecordResult};
pub use rect::DamageRect;
pub use scratch::{FrameRef, ScratchBuffer};
pub use session::{
    RecordSession, RecordSessionBuilder, RecordSessionConfig, SessionStats, SessionStatsSnapshot,
    record,
};

/// Connect to the platform display server and return a source of change
/// notifications and pixel reads for its root surface.
pub fn connect_display() -> RecordResult<Box<dyn DisplaySource>> {
    platform::connect_source()
}
