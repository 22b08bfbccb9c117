use std::fmt::{Display, Formatter};

use crate::param_sets::ParameterSets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    H264,
}

impl CodecId {
    pub fn name(&self) -> &'static str {
        match self {
            CodecId::H264 => "h264",
        }
    }
}

#[cfg(feature = "vaapi")]
impl From<CodecId> for ffmpeg_next::codec::Id {
    fn from(id: CodecId) -> Self {
        match id {
            CodecId::H264 => ffmpeg_next::codec::Id::H264,
        }
    }
}

/// The single logical video stream a decoder is configured for. Its
/// extradata is the canonical parameter-set block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoStream {
    index: usize,
    codec: CodecId,
    extradata: ParameterSets,
}

impl VideoStream {
    pub fn h264(extradata: ParameterSets) -> Self {
        Self {
            index: 0,
            codec: CodecId::H264,
            extradata,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn codec(&self) -> CodecId {
        self.codec
    }

    pub fn extradata(&self) -> &ParameterSets {
        &self.extradata
    }
}

impl Display for VideoStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stream index: {}, codec: {}, extradata: {} bytes (sps {}, pps {})",
            self.index,
            self.codec.name(),
            self.extradata.len(),
            self.extradata.sps().len(),
            self.extradata.pps().len()
        )
    }
}
