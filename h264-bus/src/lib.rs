//! H.264 reframing for a pipe between a hardware encoder and decoder.
//!
//! The sender captures SPS/PPS from the first encoded access unit, writes
//! them once as a length-prefixed header and then appends the same block
//! after every unit. The receiver bootstraps its decoder from that header.

pub mod accel;
pub mod bootstrap;
pub mod error;
pub mod frame;
pub mod framer;
pub mod header;
pub mod nal;
pub mod packet;
pub mod param_sets;
pub mod pipeline;
pub mod splitter;
pub mod stream;

#[cfg(feature = "vaapi")]
pub mod decoder;
#[cfg(feature = "vaapi")]
pub mod encoder;
#[cfg(feature = "vaapi")]
pub mod hw;

pub use error::{Malformed, StreamError, StreamResult};

/// Registers FFmpeg components. Call once at startup before opening a device.
#[cfg(feature = "vaapi")]
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}
