use bytes::Bytes;

/// One compressed access unit as returned by the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedUnit {
    data: Bytes,
    pts: Option<i64>,
    is_key: bool,
}

impl EncodedUnit {
    pub fn new(data: Bytes, pts: Option<i64>, is_key: bool) -> Self {
        Self { data, pts, is_key }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }
}

#[cfg(feature = "vaapi")]
impl From<&ffmpeg_next::codec::packet::Packet> for EncodedUnit {
    fn from(packet: &ffmpeg_next::codec::packet::Packet) -> Self {
        Self {
            data: packet
                .data()
                .map(Bytes::copy_from_slice)
                .unwrap_or_default(),
            pts: packet.pts(),
            is_key: packet.is_key(),
        }
    }
}
