use crate::backend::DisplaySource;
#[cfg(not(target_os = "linux"))]
use crate::error::RecordError;
use crate::error::RecordResult;

#[cfg(target_os = "linux")]
pub(crate) mod x11;

#[cfg(target_os = "linux")]
pub(crate) fn connect_source() -> RecordResult<Box<dyn DisplaySource>> {
    Ok(Box::new(x11::X11DisplaySource::connect()?))
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn connect_source() -> RecordResult<Box<dyn DisplaySource>> {
    Err(RecordError::BackendUnavailable(
        "damage-driven capture requires an X11 display".into(),
    ))
}
