use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "vaapi-pipe", version, about = "VAAPI H.264 encode/decode over a framed byte pipe")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// DRM render node of the VAAPI device
    #[arg(long, global = true, env = "VAAPI_DEVICE")]
    pub device: Option<String>,

    /// Log level (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Encode raw NV12 frames into the framed H.264 stream
    Encode(EncodeArgs),
    /// Decode a framed H.264 stream into raw frames
    Decode(DecodeArgs),
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Raw NV12 input, `-` for stdin
    pub input: String,
    /// Framed H.264 output, `-` for stdout
    pub output: String,

    /// Units that do not start with the captured SPS/PPS block
    #[arg(long, value_enum, default_value_t = PrefixMismatch::Pass)]
    pub on_prefix_mismatch: PrefixMismatch,

    #[arg(long)]
    pub qmin: Option<i32>,

    #[arg(long)]
    pub qmax: Option<i32>,

    /// Constant quantizer for the encoder
    #[arg(long)]
    pub global_quality: Option<i32>,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Framed H.264 input, `-` for stdin
    pub input: String,
    /// Raw frame output, `-` for stdout
    pub output: String,

    /// Input is a bare Annex B stream without the framed header
    #[arg(long)]
    pub probe: bool,

    /// Bytes searched for SPS/PPS with --probe
    #[arg(long, default_value_t = h264_bus::bootstrap::DEFAULT_PROBE_WINDOW)]
    pub probe_window: usize,

    /// Largest parameter-set header accepted
    #[arg(long, default_value_t = h264_bus::header::DEFAULT_MAX_HEADER_LEN)]
    pub max_header_len: u32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMismatch {
    /// Send the unit whole, then the block
    Pass,
    /// Stop the stream
    Reject,
}
