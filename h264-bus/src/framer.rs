//! Sender side of the reframing protocol.
//!
//! ```text
//! Header:  LEN:u32  PSBLOCK:u8[LEN]          -- once, before the first unit
//! Unit_i:  PAYLOAD_i[LEN:]  PSBLOCK          -- every access unit, i >= 0
//! ```
//!
//! The encoder repeats its parameter sets in front of every access unit when
//! every frame is an IDR. The framer drops that leading copy and appends the
//! canonical block captured from the first unit, so the receiver always sees
//! the same bytes in the same place.

use std::io::Write;

use bytes::{BufMut, BytesMut};

use crate::{
    error::{Malformed, StreamResult},
    header::write_header,
    param_sets::{ParameterSets, extract_parameter_sets},
};

/// What to do with a unit that does not carry the canonical block ahead of its
/// first slice. A block right after a leading AUD or SEI is stripped in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrefixPolicy {
    /// Write the unit whole, then the block. Nothing is cut from slice data.
    #[default]
    PassThrough,
    /// Abort the stream with `MalformedStream`.
    Reject,
}

enum FramerState {
    AwaitingFirstUnit,
    Streaming { block: ParameterSets },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FramerStats {
    pub units: u64,
    pub header_bytes: u64,
    pub unit_bytes: u64,
    pub mismatched_units: u64,
}

impl FramerStats {
    pub fn total_bytes(&self) -> u64 {
        self.header_bytes + self.unit_bytes
    }
}

pub struct StreamFramer<W: Write> {
    writer: W,
    state: FramerState,
    policy: PrefixPolicy,
    stats: FramerStats,
}

impl<W: Write> StreamFramer<W> {
    pub fn new(writer: W) -> Self {
        Self::with_policy(writer, PrefixPolicy::default())
    }

    pub fn with_policy(writer: W, policy: PrefixPolicy) -> Self {
        Self {
            writer,
            state: FramerState::AwaitingFirstUnit,
            policy,
            stats: FramerStats::default(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, FramerState::Streaming { .. })
    }

    /// The canonical block, once the first unit has been seen.
    pub fn parameter_sets(&self) -> Option<&ParameterSets> {
        match &self.state {
            FramerState::AwaitingFirstUnit => None,
            FramerState::Streaming { block } => Some(block),
        }
    }

    pub fn stats(&self) -> &FramerStats {
        &self.stats
    }

    /// Frames one encoded access unit. The first call also captures the
    /// parameter sets and writes the header; if that fails nothing is written.
    pub fn write_unit(&mut self, unit: &[u8]) -> StreamResult<()> {
        if let FramerState::AwaitingFirstUnit = self.state {
            let block = extract_parameter_sets(unit)?;
            let written = write_header(&mut self.writer, &block)?;
            self.writer.flush()?;
            log::info!("parameter-set header sent, len: {}", block.len());
            self.stats.header_bytes += written as u64;
            self.state = FramerState::Streaming { block };
        }

        let FramerState::Streaming { block } = &self.state else {
            unreachable!("framer leaves AwaitingFirstUnit above");
        };

        let (head, payload) = match block.leading_offset_in(unit) {
            Some(at) => {
                if at > 0 {
                    log::debug!("unit {}: parameter-set block stripped at offset {}", self.stats.units, at);
                }
                (&unit[..at], &unit[at + block.len()..])
            }
            None => match self.policy {
                PrefixPolicy::Reject => {
                    return Err(Malformed::UnexpectedPrefix {
                        unit_len: unit.len(),
                        block_len: block.len(),
                    }
                    .into());
                }
                PrefixPolicy::PassThrough => {
                    log::warn!(
                        "unit {} of {} bytes does not start with the parameter-set block, sent whole",
                        self.stats.units,
                        unit.len()
                    );
                    self.stats.mismatched_units += 1;
                    (&unit[..0], unit)
                }
            },
        };

        let mut wire = BytesMut::with_capacity(head.len() + payload.len() + block.len());
        wire.put_slice(head);
        wire.put_slice(payload);
        wire.put_slice(block.as_bytes());
        self.writer.write_all(&wire)?;
        self.writer.flush()?;

        self.stats.units += 1;
        self.stats.unit_bytes += wire.len() as u64;
        log::debug!("write unit: {}, size: {}, wire: {}", self.stats.units, unit.len(), wire.len());
        Ok(())
    }

    /// Flushes and hands back the writer.
    pub fn finish(mut self) -> StreamResult<(W, FramerStats)> {
        self.writer.flush()?;
        Ok((self.writer, self.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::{
        bootstrap::{BootstrapOptions, bootstrap},
        error::StreamError,
        nal::NalScanner,
        param_sets::tests::{AUD, IDR, PPS, SPS},
        splitter::UnitSource,
    };

    fn unit_with_prefix(prefix: &[u8], fill: u8, len: usize) -> Vec<u8> {
        let mut unit = prefix.to_vec();
        unit.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x65]);
        while unit.len() < len {
            unit.push(fill);
        }
        unit
    }

    fn canonical() -> Vec<u8> {
        [&SPS[..], &PPS[..]].concat()
    }

    #[test]
    fn test_scenario_324_bytes() -> anyhow::Result<()> {
        let block = canonical();
        assert_eq!(block.len(), 20);
        let units: Vec<Vec<u8>> = (0..3u8)
            .map(|i| unit_with_prefix(&block, 0x10 + i, 100))
            .collect();

        let mut framer = StreamFramer::new(Vec::new());
        for unit in &units {
            framer.write_unit(unit)?;
        }
        let (wire, stats) = framer.finish()?;

        assert_eq!(wire.len(), 324);
        assert_eq!(stats.total_bytes(), 324);
        assert_eq!(stats.units, 3);
        assert_eq!(&wire[..4], &20u32.to_ne_bytes());
        assert_eq!(&wire[4..24], block.as_slice());
        for (i, unit) in units.iter().enumerate() {
            let at = 24 + i * 100;
            assert_eq!(&wire[at..at + 80], &unit[20..]);
            assert_eq!(&wire[at + 80..at + 100], block.as_slice());
        }
        Ok(())
    }

    #[test]
    fn test_units_rewritten_and_scannable() -> anyhow::Result<()> {
        let block = canonical();
        let units: Vec<Vec<u8>> = (0..5u8)
            .map(|i| unit_with_prefix(&block, 0x20 + i, 40 + i as usize * 7))
            .collect();

        let mut framer = StreamFramer::new(Vec::new());
        let mut expected = Vec::new();
        for unit in &units {
            framer.write_unit(unit)?;
            expected.extend_from_slice(&unit[block.len()..]);
            expected.extend_from_slice(&block);
        }
        let (wire, _) = framer.finish()?;
        let body = &wire[4 + block.len()..];
        assert_eq!(body, expected.as_slice());

        // each unit contributes IDR, SPS, PPS boundaries
        assert_eq!(NalScanner::new(body, 0).count(), units.len() * 3);
        Ok(())
    }

    #[test]
    fn test_extraction_failure_writes_nothing() {
        let mut out = Vec::new();
        let mut framer = StreamFramer::new(&mut out);
        let err = framer.write_unit(&IDR).expect_err("no parameter sets");
        assert!(err.is_malformed());
        assert!(!framer.is_streaming());
        drop(framer);
        assert!(out.is_empty());
    }

    #[test]
    fn test_mismatch_pass_through() -> anyhow::Result<()> {
        let block = canonical();
        let mut framer = StreamFramer::new(Vec::new());
        framer.write_unit(&unit_with_prefix(&block, 0x11, 60))?;
        let odd = unit_with_prefix(&[], 0x22, 30);
        framer.write_unit(&odd)?;
        let (wire, stats) = framer.finish()?;

        assert_eq!(stats.mismatched_units, 1);
        let tail = &wire[wire.len() - (odd.len() + block.len())..];
        assert_eq!(&tail[..odd.len()], odd.as_slice());
        assert_eq!(&tail[odd.len()..], block.as_slice());
        Ok(())
    }

    #[test]
    fn test_mismatch_reject() -> anyhow::Result<()> {
        let block = canonical();
        let mut framer = StreamFramer::with_policy(Vec::new(), PrefixPolicy::Reject);
        framer.write_unit(&unit_with_prefix(&block, 0x11, 60))?;
        let before = framer.stats().total_bytes();

        let err = framer.write_unit(&block[..10]).expect_err("short unit");
        assert!(matches!(
            err,
            StreamError::MalformedStream(Malformed::UnexpectedPrefix { unit_len: 10, block_len: 20 })
        ));
        assert_eq!(framer.stats().total_bytes(), before);
        Ok(())
    }

    #[test]
    fn test_block_fixed_after_first_unit() -> anyhow::Result<()> {
        let block = canonical();
        let mut framer = StreamFramer::new(Vec::new());
        framer.write_unit(&unit_with_prefix(&block, 0x11, 50))?;

        let mut other_sps = SPS.to_vec();
        other_sps[6] = 0x00;
        let other = [&other_sps[..], &PPS[..]].concat();
        framer.write_unit(&unit_with_prefix(&other, 0x12, 50))?;

        assert_eq!(framer.parameter_sets().map(|p| p.as_bytes()), Some(block.as_slice()));
        assert_eq!(framer.stats().mismatched_units, 1);
        Ok(())
    }

    #[test]
    fn test_aud_prefixed_units_reach_receiver_whole() -> anyhow::Result<()> {
        let block = canonical();
        let prefix = [&AUD[..], &block[..]].concat();
        let units: Vec<Vec<u8>> = (0..3u8)
            .map(|i| unit_with_prefix(&prefix, 0x30 + i, 80))
            .collect();

        let mut framer = StreamFramer::new(Vec::new());
        for unit in &units {
            framer.write_unit(unit)?;
        }
        let (wire, stats) = framer.finish()?;
        assert_eq!(stats.mismatched_units, 0);
        assert_eq!(wire.len(), 4 + 20 + 3 * 80);

        let mut boot = bootstrap(Cursor::new(wire), &BootstrapOptions::default())?;
        assert_eq!(boot.context.parameter_sets().as_bytes(), block.as_slice());
        let mut received = Vec::new();
        while let Some(unit) = boot.units.next_unit()? {
            received.push(unit);
        }
        assert_eq!(received.len(), units.len());
        for (got, sent) in received.iter().zip(&units) {
            let expected = [&AUD[..], &sent[prefix.len()..], &block[..]].concat();
            assert_eq!(got.as_ref(), expected.as_slice());
        }
        Ok(())
    }

    #[test]
    fn test_split_parameter_sets_sent_whole() -> anyhow::Result<()> {
        let block = canonical();
        let sei = [0x00, 0x00, 0x00, 0x01, 0x06, 0x05, 0x01, 0x80];
        let mut framer = StreamFramer::new(Vec::new());
        framer.write_unit(&unit_with_prefix(&[&AUD[..], &block[..]].concat(), 0x11, 60))?;

        let split = unit_with_prefix(&[&AUD[..], &SPS[..], &sei[..], &PPS[..]].concat(), 0x22, 60);
        framer.write_unit(&split)?;
        let (wire, stats) = framer.finish()?;
        assert_eq!(stats.mismatched_units, 1);
        assert_eq!(&wire[wire.len() - 80..wire.len() - 20], split.as_slice());
        Ok(())
    }

    #[test]
    fn test_reject_accepts_aud_prefixed_block() -> anyhow::Result<()> {
        let block = canonical();
        let mut framer = StreamFramer::with_policy(Vec::new(), PrefixPolicy::Reject);
        framer.write_unit(&unit_with_prefix(&[&AUD[..], &block[..]].concat(), 0x11, 60))?;
        framer.write_unit(&unit_with_prefix(&block, 0x12, 60))?;
        assert_eq!(framer.stats().units, 2);
        Ok(())
    }
}
