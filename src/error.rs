//! Error types for codecbench

use crate::codec::PortState;
use crate::report::Stage;
use thiserror::Error;

/// Result type alias for codecbench operations
pub type Result<T> = std::result::Result<T, Error>;

/// codecbench error type
#[derive(Error, Debug)]
pub enum Error {
    // Codec port errors
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Buffer capacity exceeded: {required} bytes requested, capacity {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },

    #[error("Invalid buffer slot: {0}")]
    InvalidSlot(usize),

    #[error("Codec port not configured")]
    NotConfigured,

    #[error("Cannot {operation} while port is {state}")]
    InvalidState {
        operation: &'static str,
        state: PortState,
    },

    #[error("Codec port closed")]
    PortClosed,

    #[error("Stalled: {0}")]
    StallTimeout(String),

    #[error("Codec failure: {0}")]
    Codec(String),

    // Processing errors
    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("Scaling error: {0}")]
    Scaling(String),

    // Artifact errors
    #[error("Malformed container: {0}")]
    Container(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Pipeline errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled before {0} stage")]
    Cancelled(Stage),

    #[error("Pipeline worker panicked")]
    WorkerPanicked,

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

/// Flat classification of [`Error`], cheap to copy into status notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    CapacityExceeded,
    InvalidSlot,
    NotConfigured,
    InvalidState,
    PortClosed,
    StallTimeout,
    Codec,
    UnsupportedPixelFormat,
    Scaling,
    Container,
    IoFailure,
    Config,
    Cancelled,
    WorkerPanicked,
}

impl Error {
    /// Kind of the underlying failure, looking through stage tags
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Error::InvalidSlot(_) => ErrorKind::InvalidSlot,
            Error::NotConfigured => ErrorKind::NotConfigured,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::PortClosed => ErrorKind::PortClosed,
            Error::StallTimeout(_) => ErrorKind::StallTimeout,
            Error::Codec(_) => ErrorKind::Codec,
            Error::UnsupportedPixelFormat(_) => ErrorKind::UnsupportedPixelFormat,
            Error::Scaling(_) => ErrorKind::Scaling,
            Error::Container(_) => ErrorKind::Container,
            Error::Io(_) => ErrorKind::IoFailure,
            Error::Config(_) => ErrorKind::Config,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::WorkerPanicked => ErrorKind::WorkerPanicked,
            Error::Stage { source, .. } => source.kind(),
        }
    }

    /// Stage the error was raised in, if it has been tagged
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            Error::Cancelled(stage) => Some(*stage),
            _ => None,
        }
    }

    /// Tag this error with the stage it aborted. Already-tagged errors keep
    /// their original stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Error::Stage { .. } | Error::Cancelled(_) => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Check if the error came from a codec capability problem rather than
    /// the data or the environment
    pub fn is_capability_issue(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedFormat | ErrorKind::UnsupportedPixelFormat
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::CapacityExceeded => "capacity exceeded",
            ErrorKind::InvalidSlot => "invalid slot",
            ErrorKind::NotConfigured => "not configured",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::PortClosed => "port closed",
            ErrorKind::StallTimeout => "stall timeout",
            ErrorKind::Codec => "codec failure",
            ErrorKind::UnsupportedPixelFormat => "unsupported pixel format",
            ErrorKind::Scaling => "scaling failure",
            ErrorKind::Container => "malformed container",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::Config => "configuration",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::WorkerPanicked => "worker panicked",
        };
        f.write_str(name)
    }
}
