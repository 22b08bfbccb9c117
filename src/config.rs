use h264_bus::{
    bootstrap::{BootstrapMode, BootstrapOptions},
    frame::Nv12Layout,
    framer::PrefixPolicy,
};

use crate::cli::{Cli, Command, DecodeArgs, EncodeArgs, PrefixMismatch};

pub struct EncodeJob {
    pub layout: Nv12Layout,
    pub fps: u32,
    pub input: String,
    pub output: String,
    pub prefix_policy: PrefixPolicy,
    pub qmin: Option<i32>,
    pub qmax: Option<i32>,
    pub global_quality: Option<i32>,
}

impl EncodeJob {
    #[cfg(feature = "vaapi")]
    pub fn encoder_settings(&self) -> h264_bus::encoder::EncoderSettings {
        let mut settings = h264_bus::encoder::EncoderSettings::new(self.layout, self.fps);
        settings.qmin = self.qmin;
        settings.qmax = self.qmax;
        settings.global_quality = self.global_quality;
        settings
    }
}

pub struct DecodeJob {
    pub input: String,
    pub output: String,
    pub bootstrap: BootstrapOptions,
}

pub enum Job {
    Encode(EncodeJob),
    Decode(DecodeJob),
}

pub struct PipeConfig {
    device: Option<String>,
    verbose: u8,
    job: Job,
}

impl PipeConfig {
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    pub fn job(&self) -> &Job {
        &self.job
    }
}

impl TryFrom<Cli> for PipeConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> anyhow::Result<Self> {
        let job = match cli.command {
            Command::Encode(args) => Job::Encode(encode_job(args)?),
            Command::Decode(args) => Job::Decode(decode_job(args)?),
        };
        Ok(Self {
            device: cli.device.filter(|d| !d.is_empty()),
            verbose: cli.verbose,
            job,
        })
    }
}

fn encode_job(args: EncodeArgs) -> anyhow::Result<EncodeJob> {
    let layout = Nv12Layout::new(args.width, args.height)?;
    if args.fps == 0 {
        anyhow::bail!("fps must be positive");
    }
    Ok(EncodeJob {
        layout,
        fps: args.fps,
        input: args.input,
        output: args.output,
        prefix_policy: match args.on_prefix_mismatch {
            PrefixMismatch::Pass => PrefixPolicy::PassThrough,
            PrefixMismatch::Reject => PrefixPolicy::Reject,
        },
        qmin: args.qmin,
        qmax: args.qmax,
        global_quality: args.global_quality,
    })
}

fn decode_job(args: DecodeArgs) -> anyhow::Result<DecodeJob> {
    if args.max_header_len == 0 {
        anyhow::bail!("max header length must be positive");
    }
    let mode = if args.probe {
        if args.probe_window == 0 {
            anyhow::bail!("probe window must be positive");
        }
        BootstrapMode::Probe {
            window: args.probe_window,
        }
    } else {
        BootstrapMode::Framed
    };
    Ok(DecodeJob {
        input: args.input,
        output: args.output,
        bootstrap: BootstrapOptions {
            mode,
            max_header_len: args.max_header_len,
        },
    })
}
