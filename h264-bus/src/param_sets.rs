//! Parameter-set extraction.
//!
//! The encoder only reliably emits SPS/PPS in front of its first access unit.
//! The canonical block captured from it is `[SPS][PPS]`, each unit with its
//! start code, and stays fixed for the life of the stream.

use std::ops::Range;

use bytes::{Bytes, BytesMut};

use crate::{
    error::{Malformed, StreamResult},
    nal::{NalKind, NalScanner, NalUnit},
};

/// The canonical `[SPS][PPS]` block. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    block: Bytes,
    sps: Range<usize>,
    pps: Range<usize>,
}

impl ParameterSets {
    /// Wraps a block received out of band. It must hold an SPS followed by a
    /// PPS; the bytes are kept as they are so the trailer the sender appends
    /// stays byte-identical.
    pub fn from_block(block: Bytes) -> StreamResult<Self> {
        let (sps, pps) = locate(&block)?;
        if sps.start != 0 || sps.end != pps.start || pps.end != block.len() {
            log::warn!(
                "parameter-set block of {} bytes holds only {} bytes of SPS+PPS",
                block.len(),
                sps.len() + pps.len()
            );
        }
        Ok(Self {
            sps: sps.start..sps.end,
            pps: pps.start..pps.end,
            block,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.block
    }

    /// Cheap clone of the block.
    pub fn bytes(&self) -> Bytes {
        self.block.clone()
    }

    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// Length as carried in the framed header.
    pub fn len_u32(&self) -> u32 {
        self.block.len() as u32
    }

    pub fn sps(&self) -> &[u8] {
        &self.block[self.sps.clone()]
    }

    pub fn pps(&self) -> &[u8] {
        &self.block[self.pps.clone()]
    }

    /// Whether `unit` begins with this exact block.
    pub fn is_prefix_of(&self, unit: &[u8]) -> bool {
        unit.starts_with(&self.block)
    }

    /// Offset of this exact block in `unit` when it sits among the leading
    /// non-VCL units, e.g. after an AUD or SEI. The first parameter set of
    /// the unit must open the block; nothing is searched past the first slice.
    pub fn leading_offset_in(&self, unit: &[u8]) -> Option<usize> {
        if self.is_prefix_of(unit) {
            return Some(0);
        }
        for nal in NalScanner::new(unit, 0) {
            let kind = nal.kind();
            if kind.is_vcl() {
                return None;
            }
            if kind.is_parameter_set() {
                return unit[nal.start..].starts_with(&self.block).then_some(nal.start);
            }
        }
        None
    }
}

/// Finds the first SPS and the first PPS following it in an access unit and
/// returns them concatenated. Units after the PPS are not included.
pub fn extract_parameter_sets(unit: &[u8]) -> StreamResult<ParameterSets> {
    let (sps, pps) = locate(unit)?;
    let mut block = BytesMut::with_capacity(sps.len() + pps.len());
    block.extend_from_slice(sps.bytes(unit));
    block.extend_from_slice(pps.bytes(unit));
    Ok(ParameterSets {
        block: block.freeze(),
        sps: 0..sps.len(),
        pps: sps.len()..sps.len() + pps.len(),
    })
}

/// The first SPS and the first PPS after it, as positions in `unit`.
pub(crate) fn locate(unit: &[u8]) -> StreamResult<(NalUnit, NalUnit)> {
    let mut sps: Option<NalUnit> = None;
    let mut seen_any = false;

    for nal in NalScanner::new(unit, 0) {
        seen_any = true;
        match nal.kind() {
            NalKind::Sps if sps.is_none() => sps = Some(nal),
            NalKind::Pps => {
                return match sps {
                    Some(sps) => Ok((sps, nal)),
                    None => Err(Malformed::PpsBeforeSps.into()),
                };
            }
            _ => {}
        }
    }

    let reason = if !seen_any {
        Malformed::NoStartCode
    } else if sps.is_some() {
        Malformed::PpsNotFound
    } else {
        Malformed::SpsNotFound
    };
    Err(reason.into())
}
