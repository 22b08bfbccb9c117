use anyhow::Context;
use h264_bus::{
    accel::{DecodeAccelerator, EncodeAccelerator},
    bootstrap::bootstrap,
    frame::RawFrameReader,
    framer::StreamFramer,
    pipeline::{PipelineStats, decode_stream, encode_stream},
};
use tokio_util::sync::CancellationToken;

use crate::{
    channel::{InputChannel, OutputChannel},
    config::{DecodeJob, EncodeJob, Job, PipeConfig},
};

/// Runs the configured job to completion on the calling thread.
#[cfg(feature = "vaapi")]
pub fn run(config: &PipeConfig, cancel: &CancellationToken) -> anyhow::Result<PipelineStats> {
    use h264_bus::{decoder::VaapiDecoder, encoder::VaapiEncoder, hw::HwDevice};

    h264_bus::init()?;
    let device = HwDevice::vaapi(config.device())?;
    match config.job() {
        Job::Encode(job) => {
            let mut encoder = VaapiEncoder::new(device, &job.encoder_settings())?;
            run_encode(job, &mut encoder, cancel)
        }
        Job::Decode(job) => {
            let mut decoder = VaapiDecoder::new(device);
            run_decode(job, &mut decoder, cancel)
        }
    }
}

#[cfg(not(feature = "vaapi"))]
pub fn run(config: &PipeConfig, _cancel: &CancellationToken) -> anyhow::Result<PipelineStats> {
    let mode = match config.job() {
        Job::Encode(_) => "encode",
        Job::Decode(_) => "decode",
    };
    anyhow::bail!("cannot {}: built without the vaapi feature", mode)
}

pub fn run_encode<E: EncodeAccelerator>(
    job: &EncodeJob,
    encoder: &mut E,
    cancel: &CancellationToken,
) -> anyhow::Result<PipelineStats> {
    let input = InputChannel::open(&job.input)?;
    let output = OutputChannel::create(&job.output)?;
    log::info!(
        "encode {} from {} to {}, {} fps",
        job.layout,
        input,
        job.output,
        job.fps
    );

    let frames = RawFrameReader::new(input, job.layout);
    let framer = StreamFramer::with_policy(output, job.prefix_policy);
    let (output, stats) = encode_stream(frames, encoder, framer, cancel)
        .with_context(|| format!("encoding {}", job.input))?;
    output.commit()?;
    if stats.mismatched_units > 0 {
        log::warn!(
            "{} units did not start with the parameter-set block",
            stats.mismatched_units
        );
    }
    Ok(stats)
}

pub fn run_decode<D: DecodeAccelerator>(
    job: &DecodeJob,
    decoder: &mut D,
    cancel: &CancellationToken,
) -> anyhow::Result<PipelineStats> {
    let input = InputChannel::open(&job.input)?;
    let mut output = OutputChannel::create(&job.output)?;
    log::info!("decode from {} to {}, {:?}", input, job.output, job.bootstrap.mode);

    let mut boot = bootstrap(input, &job.bootstrap).context("stream bootstrap failed")?;
    let stats = decode_stream(&boot.context, &mut boot.units, decoder, &mut output, cancel)
        .with_context(|| format!("decoding {}", job.input))?;
    output.commit()?;
    Ok(stats)
}

#[cfg(test)]
#[path = "pipe_test.rs"]
mod pipe_test;
