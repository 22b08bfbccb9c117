//! Receiver side unit readers.
//!
//! After bootstrap the channel carries a raw elementary stream. These readers
//! cut it into pieces the decoder can take one at a time without copying any
//! parameter-set parsing onto the read path.

use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::{
    error::StreamResult,
    nal::{NalKind, START_CODE, find_start_code},
    param_sets::ParameterSets,
};

const READ_CHUNK: usize = 64 * 1024;

/// A pull source of units for the decoder. `Ok(None)` once the channel closes.
pub trait UnitSource {
    fn next_unit(&mut self) -> StreamResult<Option<Bytes>>;
}

struct ReadBuffer<R: Read> {
    reader: R,
    buf: BytesMut,
    eof: bool,
}

impl<R: Read> ReadBuffer<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::new(),
            eof: false,
        }
    }

    /// Appends at most one chunk. Sets `eof` when the reader is exhausted.
    fn fill(&mut self) -> StreamResult<()> {
        let start = self.buf.len();
        self.buf.resize(start + READ_CHUNK, 0);
        let n = loop {
            match self.reader.read(&mut self.buf[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(start);
                    return Err(e.into());
                }
            }
        };
        self.buf.truncate(start + n);
        if n == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn take_rest(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }
}

/// Cuts the framed wire stream right after every copy of the trailer block,
/// so each wire unit reaches the decoder whole, trailer included.
pub struct FramedUnits<R: Read> {
    input: ReadBuffer<R>,
    trailer: Bytes,
    search_from: usize,
}

impl<R: Read> FramedUnits<R> {
    pub fn new(reader: R, parameter_sets: &ParameterSets) -> Self {
        Self {
            input: ReadBuffer::new(reader),
            trailer: parameter_sets.bytes(),
            search_from: 0,
        }
    }
}

impl<R: Read> UnitSource for FramedUnits<R> {
    fn next_unit(&mut self) -> StreamResult<Option<Bytes>> {
        loop {
            let found = self.input.buf[self.search_from..]
                .windows(self.trailer.len())
                .position(|w| w == self.trailer.as_ref());
            if let Some(pos) = found {
                let end = self.search_from + pos + self.trailer.len();
                self.search_from = 0;
                return Ok(Some(self.input.buf.split_to(end).freeze()));
            }

            if self.input.eof {
                let rest = self.input.take_rest();
                if let Some(rest) = &rest {
                    log::warn!("channel closed inside a unit, {} trailing bytes", rest.len());
                }
                return Ok(rest);
            }

            // a trailer may straddle the chunk boundary
            self.search_from = self
                .input
                .buf
                .len()
                .saturating_sub(self.trailer.len() - 1)
                .max(self.search_from);
            self.input.fill()?;
        }
    }
}

/// Cuts a raw Annex B stream into access units: a new unit starts at an
/// AUD/SPS/PPS/SEI, or at a slice whose `first_mb_in_slice` is 0, once the
/// current unit already holds a slice.
pub struct AccessUnits<R: Read> {
    input: ReadBuffer<R>,
    scan_from: usize,
    has_slice: bool,
}

impl<R: Read> AccessUnits<R> {
    pub fn new(reader: R) -> Self {
        Self {
            input: ReadBuffer::new(reader),
            scan_from: 0,
            has_slice: false,
        }
    }
}

impl<R: Read> UnitSource for AccessUnits<R> {
    fn next_unit(&mut self) -> StreamResult<Option<Bytes>> {
        loop {
            let Some(pos) = find_start_code(&self.input.buf, self.scan_from) else {
                if self.input.eof {
                    self.scan_from = 0;
                    self.has_slice = false;
                    return Ok(self.input.take_rest());
                }
                self.scan_from = self
                    .input
                    .buf
                    .len()
                    .saturating_sub(START_CODE.len() - 1)
                    .max(self.scan_from);
                self.input.fill()?;
                continue;
            };

            // header byte plus the first slice header byte
            let header_at = pos + START_CODE.len();
            if header_at + 2 > self.input.buf.len() && !self.input.eof {
                self.scan_from = pos;
                self.input.fill()?;
                continue;
            }

            let buf = &self.input.buf;
            let kind = buf
                .get(header_at)
                .map(|h| NalKind::from_header(*h))
                .unwrap_or(NalKind::Unknown);
            let first_mb_zero = buf.get(header_at + 1).is_some_and(|b| b & 0x80 != 0);
            let starts_unit = self.has_slice
                && ((kind.is_vcl() && first_mb_zero) || kind.starts_access_unit());

            if starts_unit {
                self.has_slice = false;
                self.scan_from = 0;
                return Ok(Some(self.input.buf.split_to(pos).freeze()));
            }
            if kind.is_vcl() {
                self.has_slice = true;
            }
            self.scan_from = header_at;
        }
    }
}

/// The unit reader picked by bootstrap.
pub enum StreamUnits<R: Read> {
    Framed(FramedUnits<R>),
    Access(AccessUnits<R>),
}

impl<R: Read> UnitSource for StreamUnits<R> {
    fn next_unit(&mut self) -> StreamResult<Option<Bytes>> {
        match self {
            StreamUnits::Framed(units) => units.next_unit(),
            StreamUnits::Access(units) => units.next_unit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::param_sets::{
        extract_parameter_sets,
        tests::{PPS, SPS},
    };

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn collect(source: &mut impl UnitSource) -> anyhow::Result<Vec<Bytes>> {
        let mut units = Vec::new();
        while let Some(unit) = source.next_unit()? {
            units.push(unit);
        }
        Ok(units)
    }

    fn block() -> Vec<u8> {
        [&SPS[..], &PPS[..]].concat()
    }

    fn wire_units(n: usize) -> Vec<Vec<u8>> {
        (0..n)
            .map(|i| {
                let mut unit = vec![0x00, 0x00, 0x00, 0x01, 0x65];
                unit.resize(80, 0x30 + i as u8);
                unit.extend_from_slice(&block());
                unit
            })
            .collect()
    }

    #[test]
    fn test_framed_units_split_after_trailer() -> anyhow::Result<()> {
        let ps = extract_parameter_sets(&block())?;
        let units = wire_units(3);
        let body = units.concat();

        let mut source = FramedUnits::new(Cursor::new(body), &ps);
        let got = collect(&mut source)?;
        assert_eq!(got.len(), 3);
        for (got, want) in got.iter().zip(&units) {
            assert_eq!(got.len(), 100);
            assert_eq!(got.as_ref(), want.as_slice());
        }
        Ok(())
    }

    #[test]
    fn test_framed_units_across_small_reads() -> anyhow::Result<()> {
        let ps = extract_parameter_sets(&block())?;
        let units = wire_units(4);
        let reader = Trickle {
            data: units.concat(),
            pos: 0,
            step: 7,
        };
        let got = collect(&mut FramedUnits::new(reader, &ps))?;
        assert_eq!(got.len(), 4);
        assert!(got.iter().all(|u| u.len() == 100));
        Ok(())
    }

    #[test]
    fn test_framed_units_truncated_tail() -> anyhow::Result<()> {
        let ps = extract_parameter_sets(&block())?;
        let mut body = wire_units(2).concat();
        body.truncate(150);
        let got = collect(&mut FramedUnits::new(Cursor::new(body), &ps))?;
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].len(), 100);
        assert_eq!(got[1].len(), 50);
        Ok(())
    }

    #[test]
    fn test_access_units() -> anyhow::Result<()> {
        let idr = [0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x11, 0x22];
        let second_slice = [0x00, 0x00, 0x00, 0x01, 0x65, 0x40, 0x33];
        let p_slice = [0x00, 0x00, 0x00, 0x01, 0x41, 0x9A, 0x44];

        let first = [&SPS[..], &PPS[..], &idr[..], &second_slice[..]].concat();
        let second = p_slice.to_vec();
        let third = [&SPS[..], &PPS[..], &idr[..]].concat();
        let stream = [first.clone(), second.clone(), third.clone()].concat();

        let reader = Trickle {
            data: stream,
            pos: 0,
            step: 5,
        };
        let got = collect(&mut AccessUnits::new(reader))?;
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].as_ref(), first.as_slice());
        assert_eq!(got[1].as_ref(), second.as_slice());
        assert_eq!(got[2].as_ref(), third.as_slice());
        Ok(())
    }

    #[test]
    fn test_empty_channel() -> anyhow::Result<()> {
        let ps = extract_parameter_sets(&block())?;
        assert!(FramedUnits::new(Cursor::new(Vec::new()), &ps).next_unit()?.is_none());
        assert!(AccessUnits::new(Cursor::new(Vec::new())).next_unit()?.is_none());
        Ok(())
    }
}
