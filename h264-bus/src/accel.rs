//! Seams between the stream drivers and a hardware codec.
//!
//! Both traits follow the send/receive model of the FFmpeg codec API. A call
//! that cannot make progress right now returns
//! [`StreamError::AcceleratorTransient`](crate::error::StreamError); the
//! driver drains output and retries, it is never fatal on its own.

use crate::{
    bootstrap::DecodeContext,
    error::StreamResult,
    frame::RawPicture,
    packet::EncodedUnit,
};

pub trait EncodeAccelerator {
    /// Submit one picture. `None` starts the flush.
    fn send_picture(&mut self, picture: Option<&RawPicture>) -> StreamResult<()>;

    /// Next finished unit. `AcceleratorTransient` while more input is needed,
    /// `Ok(None)` once the encoder is fully flushed.
    fn receive_unit(&mut self) -> StreamResult<Option<EncodedUnit>>;
}

pub trait DecodeAccelerator {
    /// Configure the decoder from the bootstrap result. Must be called once
    /// before the first `send_unit`.
    fn configure(&mut self, context: &DecodeContext) -> StreamResult<()>;

    /// Submit one unit. An empty slice starts the flush.
    fn send_unit(&mut self, unit: &[u8]) -> StreamResult<()>;

    /// Next decoded picture. `AcceleratorTransient` while more input is
    /// needed, `Ok(None)` once the decoder is fully flushed.
    fn receive_picture(&mut self) -> StreamResult<Option<RawPicture>>;
}
