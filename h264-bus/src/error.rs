//! Error kinds surfaced by the reframing protocol and the accelerator seams.

use std::io;

use thiserror::Error;

/// Why a byte stream could not be reframed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("no start code found")]
    NoStartCode,
    #[error("sequence parameter set not found")]
    SpsNotFound,
    #[error("picture parameter set not found after sequence parameter set")]
    PpsNotFound,
    #[error("picture parameter set precedes sequence parameter set")]
    PpsBeforeSps,
    #[error("header length {len} outside 1..={max}")]
    HeaderLength { len: u32, max: u32 },
    #[error("parameter sets not terminated within the first {0} bytes")]
    Unterminated(usize),
    #[error("unit of {unit_len} bytes does not start with the {block_len}-byte parameter-set block")]
    UnexpectedPrefix { unit_len: usize, block_len: usize },
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("malformed stream: {0}")]
    MalformedStream(#[from] Malformed),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("decoder rejected configuration: {0}")]
    DecoderConfig(String),

    /// The accelerator asked for another call later. Never terminal.
    #[error("accelerator not ready")]
    AcceleratorTransient,

    #[error("accelerator error: {0}")]
    Accelerator(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(#[source] io::Error),

    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StreamError::AcceleratorTransient)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, StreamError::MalformedStream(_))
    }
}

impl From<io::Error> for StreamError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe | io::ErrorKind::WriteZero => {
                StreamError::ChannelClosed(err.to_string())
            }
            _ => StreamError::Io(err),
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
