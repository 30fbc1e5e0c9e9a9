use std::time::Duration;

use nlprims_frame::{FrameError, MalformedFrame, UnsupportedFlag};
use nlprims_transport::TransportError;

/// Errors that can occur in endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The payload cannot be framed within the configured limits. Nothing was sent.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Received bytes failed a consistency check.
    #[error("malformed frame: {0}")]
    MalformedFrame(MalformedFrame),

    /// Transport-level failure, carrying the OS error text.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// The deadline elapsed before the operation completed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The channel shut down mid-operation.
    #[error("endpoint channel closed")]
    Closed,

    /// The requested flags ask for behaviour endpoints do not implement.
    #[error(transparent)]
    UnsupportedFlag(#[from] UnsupportedFlag),

    /// The generic family lookup did not produce an id.
    #[error("family resolution failed: {0}")]
    ResolutionFailed(String),

    /// The operation is not legal in the endpoint's current state.
    #[error("{operation} is not allowed on {state} endpoint")]
    IllegalState {
        operation: &'static str,
        state: &'static str,
    },

    /// The kernel answered with an error frame carrying this errno.
    #[error("kernel reported error: {}", errno_text(.0))]
    KernelError(i32),
}

fn errno_text(errno: &i32) -> std::io::Error {
    std::io::Error::from_raw_os_error(*errno)
}

impl From<TransportError> for EndpointError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(after) => Self::Timeout(after),
            TransportError::Closed => Self::Closed,
            err => Self::Transport(err),
        }
    }
}

impl From<FrameError> for EndpointError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge { size, max } => Self::PayloadTooLarge { size, max },
            FrameError::Malformed(err) => Self::MalformedFrame(err),
        }
    }
}

impl From<MalformedFrame> for EndpointError {
    fn from(err: MalformedFrame) -> Self {
        Self::MalformedFrame(err)
    }
}

pub type Result<T> = std::result::Result<T, EndpointError>;
