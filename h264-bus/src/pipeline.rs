//! Blocking stream drivers. Each pushes one whole stream through an
//! accelerator; run them on a blocking thread.

use std::{
    io::Write,
    thread,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::{
    accel::{DecodeAccelerator, EncodeAccelerator},
    bootstrap::DecodeContext,
    error::{StreamError, StreamResult},
    frame::RawPicture,
    framer::StreamFramer,
    splitter::UnitSource,
};

/// Resubmissions of one input before the accelerator counts as stalled.
pub const MAX_TRANSIENT_RETRIES: u32 = 1000;

const RETRY_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub pictures: u64,
    pub units: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub transient_retries: u64,
    pub mismatched_units: u64,
    pub elapsed: Duration,
}

fn stalled(what: &str) -> StreamError {
    StreamError::Accelerator(format!(
        "{} still busy after {} retries",
        what, MAX_TRANSIENT_RETRIES
    ))
}

/// Encodes every picture and frames every resulting unit onto the framer's
/// writer. Returns the writer once the encoder is flushed.
///
/// Cancellation is checked between pictures. A cancelled stream still
/// flushes the encoder and frames what it returns, then fails with
/// `Cancelled`.
pub fn encode_stream<I, E, W>(
    pictures: I,
    encoder: &mut E,
    mut framer: StreamFramer<W>,
    cancel: &CancellationToken,
) -> StreamResult<(W, PipelineStats)>
where
    I: IntoIterator<Item = StreamResult<RawPicture>>,
    E: EncodeAccelerator,
    W: Write,
{
    let started = Instant::now();
    let mut stats = PipelineStats::default();

    for picture in pictures {
        if cancel.is_cancelled() {
            break;
        }
        let picture = picture?;
        stats.pictures += 1;
        stats.bytes_in += picture.size() as u64;
        send_picture(encoder, Some(&picture), &mut framer, &mut stats, started)?;
        drain_encoder(encoder, &mut framer, &mut stats, started)?;
    }

    log::debug!("flushing encoder after {} pictures", stats.pictures);
    send_picture(encoder, None, &mut framer, &mut stats, started)?;
    let mut retries = 0;
    loop {
        match encoder.receive_unit() {
            Ok(Some(unit)) => {
                framer.write_unit(unit.data())?;
                stats.units += 1;
            }
            Ok(None) => break,
            Err(e) if e.is_transient() => {
                retries += 1;
                if retries > MAX_TRANSIENT_RETRIES {
                    return Err(stalled("encoder flush"));
                }
                stats.transient_retries += 1;
                thread::sleep(RETRY_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }

    let (writer, framer_stats) = framer.finish()?;
    stats.bytes_out = framer_stats.total_bytes();
    stats.mismatched_units = framer_stats.mismatched_units;
    stats.elapsed = started.elapsed();
    if cancel.is_cancelled() {
        log::warn!("encode cancelled after {} pictures", stats.pictures);
        return Err(StreamError::Cancelled);
    }
    log::info!(
        "encode finished, pictures: {}, units: {}, bytes out: {}, elapsed: {:?}",
        stats.pictures,
        stats.units,
        stats.bytes_out,
        stats.elapsed
    );
    Ok((writer, stats))
}

/// Submits one picture, draining output in between when the encoder is full.
fn send_picture<E: EncodeAccelerator, W: Write>(
    encoder: &mut E,
    picture: Option<&RawPicture>,
    framer: &mut StreamFramer<W>,
    stats: &mut PipelineStats,
    started: Instant,
) -> StreamResult<()> {
    let mut retries = 0;
    loop {
        match encoder.send_picture(picture) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() => {
                retries += 1;
                if retries > MAX_TRANSIENT_RETRIES {
                    return Err(stalled("encoder"));
                }
                stats.transient_retries += 1;
                if drain_encoder(encoder, framer, stats, started)? == 0 {
                    thread::sleep(RETRY_BACKOFF);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Frames every unit the encoder has ready. Returns how many.
fn drain_encoder<E: EncodeAccelerator, W: Write>(
    encoder: &mut E,
    framer: &mut StreamFramer<W>,
    stats: &mut PipelineStats,
    started: Instant,
) -> StreamResult<usize> {
    let mut drained = 0;
    loop {
        match encoder.receive_unit() {
            Ok(Some(unit)) => {
                framer.write_unit(unit.data())?;
                stats.units += 1;
                drained += 1;
                log::debug!(
                    "unit {} (pts {:?}, key: {}) framed at {:?}",
                    stats.units,
                    unit.pts(),
                    unit.is_key(),
                    started.elapsed()
                );
            }
            Ok(None) => return Ok(drained),
            Err(e) if e.is_transient() => return Ok(drained),
            Err(e) => return Err(e),
        }
    }
}

/// Configures the decoder from `context`, decodes every unit from `units` and
/// writes each picture to `output` as soon as it is available. Cancellation
/// behaves as in [`encode_stream`].
pub fn decode_stream<S, D, W>(
    context: &DecodeContext,
    units: &mut S,
    decoder: &mut D,
    output: &mut W,
    cancel: &CancellationToken,
) -> StreamResult<PipelineStats>
where
    S: UnitSource,
    D: DecodeAccelerator,
    W: Write,
{
    let started = Instant::now();
    decoder.configure(context)?;
    let mut stats = PipelineStats::default();

    while !cancel.is_cancelled() {
        let Some(unit) = units.next_unit()? else {
            break;
        };
        stats.units += 1;
        stats.bytes_in += unit.len() as u64;
        send_unit(decoder, &unit, output, &mut stats)?;
        drain_decoder(decoder, output, &mut stats)?;
    }

    log::debug!("flushing decoder after {} units", stats.units);
    send_unit(decoder, &[], output, &mut stats)?;
    let mut retries = 0;
    loop {
        match decoder.receive_picture() {
            Ok(Some(picture)) => write_picture(output, &picture, &mut stats)?,
            Ok(None) => break,
            Err(e) if e.is_transient() => {
                retries += 1;
                if retries > MAX_TRANSIENT_RETRIES {
                    return Err(stalled("decoder flush"));
                }
                stats.transient_retries += 1;
                thread::sleep(RETRY_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
    output.flush()?;
    stats.elapsed = started.elapsed();
    if cancel.is_cancelled() {
        log::warn!("decode cancelled after {} units", stats.units);
        return Err(StreamError::Cancelled);
    }

    log::info!(
        "decode finished, units: {}, pictures: {}, bytes out: {}, elapsed: {:?}",
        stats.units,
        stats.pictures,
        stats.bytes_out,
        stats.elapsed
    );
    Ok(stats)
}

fn send_unit<D: DecodeAccelerator, W: Write>(
    decoder: &mut D,
    unit: &[u8],
    output: &mut W,
    stats: &mut PipelineStats,
) -> StreamResult<()> {
    let mut retries = 0;
    loop {
        match decoder.send_unit(unit) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() => {
                retries += 1;
                if retries > MAX_TRANSIENT_RETRIES {
                    return Err(stalled("decoder"));
                }
                stats.transient_retries += 1;
                if drain_decoder(decoder, output, stats)? == 0 {
                    thread::sleep(RETRY_BACKOFF);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

fn drain_decoder<D: DecodeAccelerator, W: Write>(
    decoder: &mut D,
    output: &mut W,
    stats: &mut PipelineStats,
) -> StreamResult<usize> {
    let mut drained = 0;
    loop {
        match decoder.receive_picture() {
            Ok(Some(picture)) => {
                write_picture(output, &picture, stats)?;
                drained += 1;
            }
            Ok(None) => return Ok(drained),
            Err(e) if e.is_transient() => return Ok(drained),
            Err(e) => return Err(e),
        }
    }
}

fn write_picture<W: Write>(output: &mut W, picture: &RawPicture, stats: &mut PipelineStats) -> StreamResult<()> {
    output.write_all(&picture.data)?;
    stats.pictures += 1;
    stats.bytes_out += picture.size() as u64;
    log::trace!("picture {} written, pts: {}, size: {}", stats.pictures, picture.pts, picture.size());
    Ok(())
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
