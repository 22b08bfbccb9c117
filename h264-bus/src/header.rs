//! The framed header: `LEN:u32` in native byte order, then `LEN` bytes of
//! parameter-set block. Written once at the very start of the wire output.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    error::{Malformed, StreamResult},
    param_sets::ParameterSets,
};

pub const LENGTH_FIELD_SIZE: usize = 4;

/// Largest block accepted by default. Real SPS+PPS pairs are tens of bytes.
pub const DEFAULT_MAX_HEADER_LEN: u32 = 1 << 20;

/// Header bytes for `ps`, as a single buffer.
pub fn encode_header(ps: &ParameterSets) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_SIZE + ps.len());
    buf.put_slice(&ps.len_u32().to_ne_bytes());
    buf.put_slice(ps.as_bytes());
    buf.freeze()
}

/// Writes the whole header with one `write_all`.
pub fn write_header<W: Write>(writer: &mut W, ps: &ParameterSets) -> StreamResult<usize> {
    let header = encode_header(ps);
    writer.write_all(&header)?;
    Ok(header.len())
}

/// Reads exactly the length field and exactly that many block bytes. A channel
/// that closes early surfaces as `ChannelClosed`.
pub fn read_header<R: Read>(reader: &mut R, max_len: u32) -> StreamResult<ParameterSets> {
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_ne_bytes(len_buf);
    if len == 0 || len > max_len {
        return Err(Malformed::HeaderLength { len, max: max_len }.into());
    }

    let mut block = vec![0u8; len as usize];
    reader.read_exact(&mut block)?;
    log::debug!("read parameter-set header, len: {}", len);
    ParameterSets::from_block(Bytes::from(block))
}
