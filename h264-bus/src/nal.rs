//! Annex B NAL unit scanning.
//!
//! Only the 4-byte start code `00 00 00 01` delimits units here. Every scan is
//! bounded by the buffer length; a missing terminating start code simply means
//! the unit runs to the end of the buffer.

/// Annex B start code (4-byte)
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Returns the offset of the first start code at or after `from`.
pub fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(START_CODE.len())
        .position(|w| w == START_CODE)
        .map(|pos| from + pos)
}

/// NAL unit type, from the low five bits of the header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalKind {
    Slice,
    SliceIdr,
    Sei,
    /// Sequence parameter set, `0x67` in the streams the encoder produces.
    Sps,
    /// Picture parameter set, `0x68` in the streams the encoder produces.
    Pps,
    Aud,
    Other(u8),
    /// Forbidden bit set, or no header byte at all.
    Unknown,
}

impl NalKind {
    pub fn from_header(header: u8) -> Self {
        if header & 0x80 != 0 {
            return NalKind::Unknown;
        }
        match header & 0x1f {
            1 => NalKind::Slice,
            5 => NalKind::SliceIdr,
            6 => NalKind::Sei,
            7 => NalKind::Sps,
            8 => NalKind::Pps,
            9 => NalKind::Aud,
            t => NalKind::Other(t),
        }
    }

    pub fn is_vcl(&self) -> bool {
        matches!(self, NalKind::Slice | NalKind::SliceIdr)
            || matches!(self, NalKind::Other(t) if (2..=4).contains(t))
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NalKind::Sps | NalKind::Pps)
    }

    /// Non-VCL kinds that open a new access unit when they follow a slice.
    pub fn starts_access_unit(&self) -> bool {
        matches!(self, NalKind::Aud | NalKind::Sps | NalKind::Pps | NalKind::Sei)
            || matches!(self, NalKind::Other(t) if (14..=18).contains(t))
    }
}

/// A unit boundary inside a caller-owned buffer. `start` is the offset of the
/// start code, `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    pub start: usize,
    pub end: usize,
    /// First payload byte, `None` when the start code ends the buffer.
    pub header: Option<u8>,
}

impl NalUnit {
    pub fn kind(&self) -> NalKind {
        self.header.map(NalKind::from_header).unwrap_or(NalKind::Unknown)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn payload_start(&self) -> usize {
        self.start + START_CODE.len()
    }

    /// The unit bytes including the start code.
    pub fn bytes<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }

    /// The unit bytes after the start code.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.payload_start()..self.end]
    }
}

/// Lazy iterator over the units of a buffer, starting from a given offset.
#[derive(Debug, Clone)]
pub struct NalScanner<'a> {
    data: &'a [u8],
    next_start: Option<usize>,
    position: usize,
}

impl<'a> NalScanner<'a> {
    pub fn new(data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            next_start: find_start_code(data, offset),
            position: offset.min(data.len()),
        }
    }

    /// Offset the scan has reached: the end of the last unit returned.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Restart the scan at `offset`.
    pub fn restart(&mut self, offset: usize) {
        self.next_start = find_start_code(self.data, offset);
        self.position = offset.min(self.data.len());
    }
}

impl Iterator for NalScanner<'_> {
    type Item = NalUnit;

    fn next(&mut self) -> Option<NalUnit> {
        let start = self.next_start?;
        let payload_start = start + START_CODE.len();
        self.next_start = find_start_code(self.data, payload_start);
        let end = self.next_start.unwrap_or(self.data.len());
        self.position = end;
        Some(NalUnit {
            start,
            end,
            header: self.data.get(payload_start).copied(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_units() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, // SPS
            0x00, 0x00, 0x00, 0x01, 0x68, 0xBB, // PPS
            0x00, 0x00, 0x00, 0x01, 0x65, 0xCC, 0xDD, // IDR
        ];
        let units: Vec<NalUnit> = NalScanner::new(&data, 0).collect();
        assert_eq!(units.len(), 3);
        assert_eq!((units[0].start, units[0].end), (0, 6));
        assert_eq!((units[1].start, units[1].end), (6, 12));
        assert_eq!((units[2].start, units[2].end), (12, data.len()));
        assert_eq!(units[0].kind(), NalKind::Sps);
        assert_eq!(units[1].kind(), NalKind::Pps);
        assert_eq!(units[2].kind(), NalKind::SliceIdr);
        assert_eq!(units[2].payload(&data), &[0x65, 0xCC, 0xDD]);
    }

    #[test]
    fn test_no_start_code_is_empty() {
        let data = [0x12, 0x34, 0x00, 0x00, 0x01, 0x67];
        assert_eq!(NalScanner::new(&data, 0).count(), 0);
        assert_eq!(NalScanner::new(&[], 0).count(), 0);
    }

    #[test]
    fn test_leading_bytes_skipped() {
        let data = [0xFF, 0xEE, 0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];
        let units: Vec<NalUnit> = NalScanner::new(&data, 0).collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].start, 2);
        assert_eq!(units[0].kind(), NalKind::Aud);
    }

    #[test]
    fn test_start_code_at_buffer_end() {
        let data = [0x00, 0x00, 0x00, 0x01, 0x67, 0x00, 0x00, 0x00, 0x01];
        let units: Vec<NalUnit> = NalScanner::new(&data, 0).collect();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].header, None);
        assert_eq!(units[1].kind(), NalKind::Unknown);
        assert_eq!(units[1].len(), 4);
    }

    #[test]
    fn test_restart_from_offset() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, //
            0x00, 0x00, 0x00, 0x01, 0x68, 0xBB,
        ];
        let mut scanner = NalScanner::new(&data, 0);
        assert_eq!(scanner.next().map(|u| u.kind()), Some(NalKind::Sps));
        assert_eq!(scanner.position(), 6);

        scanner.restart(1);
        let rest: Vec<NalUnit> = scanner.collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].kind(), NalKind::Pps);

        assert_eq!(NalScanner::new(&data, 100).count(), 0);
    }

    #[test]
    fn test_three_byte_start_code_not_a_boundary() {
        let data = [0x00, 0x00, 0x00, 0x01, 0x67, 0xAA, 0x00, 0x00, 0x01, 0x68];
        let units: Vec<NalUnit> = NalScanner::new(&data, 0).collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].end, data.len());
    }

    #[test]
    fn test_kind_from_header() {
        assert_eq!(NalKind::from_header(0x67), NalKind::Sps);
        assert_eq!(NalKind::from_header(0x68), NalKind::Pps);
        assert_eq!(NalKind::from_header(0x65), NalKind::SliceIdr);
        assert_eq!(NalKind::from_header(0x41), NalKind::Slice);
        assert_eq!(NalKind::from_header(0xE7), NalKind::Unknown);
        assert!(NalKind::Slice.is_vcl());
        assert!(!NalKind::Sps.is_vcl());
        assert!(NalKind::Pps.is_parameter_set());
    }
}
