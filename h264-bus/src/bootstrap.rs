//! Receiver bootstrap: recover the decoder configuration from the head of the
//! channel before any unit is decoded.

use std::io::{Cursor, Read};

use bytes::Bytes;

use crate::{
    error::{Malformed, StreamResult},
    header::{DEFAULT_MAX_HEADER_LEN, read_header},
    param_sets::{ParameterSets, locate},
    splitter::{AccessUnits, FramedUnits, StreamUnits},
    stream::VideoStream,
};

pub const DEFAULT_PROBE_WINDOW: usize = 4096;

/// How the head of the channel is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootstrapMode {
    /// The channel starts with the length-prefixed parameter-set header.
    #[default]
    Framed,
    /// The channel is a bare Annex B stream. SPS/PPS are looked for in the
    /// first `window` bytes, which are then replayed to the decoder.
    Probe { window: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOptions {
    pub mode: BootstrapMode,
    pub max_header_len: u32,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            mode: BootstrapMode::Framed,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
        }
    }
}

/// Everything a decoder needs before its first unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeContext {
    stream: VideoStream,
}

impl DecodeContext {
    pub fn new(parameter_sets: ParameterSets) -> Self {
        Self {
            stream: VideoStream::h264(parameter_sets),
        }
    }

    pub fn stream(&self) -> &VideoStream {
        &self.stream
    }

    pub fn parameter_sets(&self) -> &ParameterSets {
        self.stream.extradata()
    }
}

/// Reads the framed header and builds the decode context. Consumes exactly
/// `4 + L` bytes; the reader is left at the first unit.
pub fn read_decode_context<R: Read>(reader: &mut R, max_header_len: u32) -> StreamResult<DecodeContext> {
    let parameter_sets = read_header(reader, max_header_len)?;
    let context = DecodeContext::new(parameter_sets);
    log::info!("decoder bootstrap: {}", context.stream());
    Ok(context)
}

/// A bootstrapped channel: the decode context plus a unit reader positioned
/// at the first unit.
pub struct Bootstrapped<R: Read> {
    pub context: DecodeContext,
    pub units: StreamUnits<std::io::Chain<Cursor<Bytes>, R>>,
}

pub fn bootstrap<R: Read>(mut reader: R, options: &BootstrapOptions) -> StreamResult<Bootstrapped<R>> {
    match options.mode {
        BootstrapMode::Framed => {
            let context = read_decode_context(&mut reader, options.max_header_len)?;
            let rest = Cursor::new(Bytes::new()).chain(reader);
            let units = StreamUnits::Framed(FramedUnits::new(rest, context.parameter_sets()));
            Ok(Bootstrapped { context, units })
        }
        BootstrapMode::Probe { window } => {
            let (context, probed) = probe(&mut reader, window)?;
            let rest = Cursor::new(probed).chain(reader);
            Ok(Bootstrapped {
                context,
                units: StreamUnits::Access(AccessUnits::new(rest)),
            })
        }
    }
}

/// Reads up to `window` bytes and pulls SPS/PPS out of them. The PPS must be
/// followed by another start code inside the window unless the channel ends
/// there. Returns the bytes read so they can be replayed.
fn probe<R: Read>(reader: &mut R, window: usize) -> StreamResult<(DecodeContext, Bytes)> {
    // one byte past the window tells a full window from a channel ending on it
    let mut head = Vec::with_capacity(window + 1);
    reader.by_ref().take(window as u64 + 1).read_to_end(&mut head)?;
    let exhausted = head.len() <= window;
    let probed = &head[..head.len().min(window)];

    let (sps, pps) = locate(probed)?;
    if pps.end == probed.len() && !exhausted {
        return Err(Malformed::Unterminated(window).into());
    }

    let mut block = Vec::with_capacity(sps.len() + pps.len());
    block.extend_from_slice(sps.bytes(probed));
    block.extend_from_slice(pps.bytes(probed));
    let context = DecodeContext::new(ParameterSets::from_block(Bytes::from(block))?);
    log::info!(
        "decoder bootstrap (probe, {} bytes read): {}",
        head.len(),
        context.stream()
    );
    Ok((context, Bytes::from(head)))
}
