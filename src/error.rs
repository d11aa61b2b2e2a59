use std::fmt;

#[derive(Debug)]
pub enum RecordError {
    /// The display reported a color depth the pixel adapter has no
    /// shift/mask profile for. Raised before the capture loop starts,
    /// never per pixel.
    UnsupportedDepth(u8),

    /// A single rectangle read from the display failed. The event's
    /// frame is dropped; the loop continues with the next notification.
    GrabFailed(String),

    /// The required display extension machinery is missing.
    BackendUnavailable(String),

    InvalidConfig(String),

    /// Frame-buffer size arithmetic overflowed.
    BufferOverflow,

    /// The frame sink refused or failed to accept an emitted frame.
    SinkClosed(String),

    Platform(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordErrorClass {
    InvalidInput,
    Unsupported,
    Transient,
    Fatal,
}

impl RecordError {
    pub fn class(&self) -> RecordErrorClass {
        match self {
            Self::InvalidConfig(_) => RecordErrorClass::InvalidInput,
            Self::UnsupportedDepth(_) | Self::BackendUnavailable(_) => {
                RecordErrorClass::Unsupported
            }
            Self::GrabFailed(_) => RecordErrorClass::Transient,
            Self::BufferOverflow | Self::SinkClosed(_) | Self::Platform(_) => {
                RecordErrorClass::Fatal
            }
        }
    }

    /// Whether the capture loop may drop the current event and carry on.
    pub fn is_transient(&self) -> bool {
        matches!(self.class(), RecordErrorClass::Transient)
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedDepth(depth) => {
                write!(f, "unsupported display color depth: {depth} bpp")
            }
            Self::GrabFailed(detail) => write!(f, "rectangle grab failed: {detail}"),
            Self::BackendUnavailable(detail) => {
                write!(f, "display backend unavailable: {detail}")
            }
            Self::InvalidConfig(message) => write!(f, "invalid session configuration: {message}"),
            Self::BufferOverflow => write!(f, "frame buffer size overflow"),
            Self::SinkClosed(detail) => write!(f, "frame sink rejected frame: {detail}"),
            Self::Platform(inner) => write!(f, "{inner}"),
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Platform(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

pub type RecordResult<T> = Result<T, RecordError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grab_failure_is_the_only_transient_class() {
        assert!(RecordError::GrabFailed("boom".into()).is_transient());
        assert!(!RecordError::UnsupportedDepth(8).is_transient());
        assert!(!RecordError::BufferOverflow.is_transient());
        assert!(!RecordError::Platform(anyhow::anyhow!("io")).is_transient());
    }

    #[test]
    fn unsupported_depth_is_classified_as_configuration() {
        assert_eq!(
            RecordError::UnsupportedDepth(8).class(),
            RecordErrorClass::Unsupported
        );
        assert_eq!(
            RecordError::InvalidConfig("x".into()).class(),
            RecordErrorClass::InvalidInput
        );
    }
}
